//! Basis-Handler fuer Requests und Events
//!
//! Requests:
//! - `echo`: gibt den Payload unveraendert zurueck
//! - `getTime`: `{time}` als RFC3339
//! - `calculate`: `{operation, a, b}` -> `{result}`
//!
//! Events:
//! - `chat`: an alle Clients als `chat {from, message, timestamp}`
//! - `setUsername`: speichert den Namen in den Verbindungs-Metadaten und
//!   bestaetigt nur dem Absender mit `usernameSet`

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use kollab_core::KollabError;
use kollab_protocol::{zeitstempel_ms, Event, Request};
use serde_json::{json, Value};

use crate::connection::ClientConnection;
use crate::registry::ClientRegistry;
use crate::server::SocketServer;

/// Metadaten-Schluessel fuer den Anzeigenamen
pub const META_USERNAME: &str = "username";

/// Registriert alle Basis-Handler am Server
pub fn basis_handler_registrieren(server: &SocketServer) {
    server.register_request_handler("echo", echo);
    server.register_request_handler("getTime", get_time);
    server.register_request_handler("calculate", calculate);

    // Die Registry statt des Servers halten, sonst haelt der Server sich selbst
    let clients = server.clients().clone();
    server.register_event_handler("chat", move |event, conn| {
        let clients = clients.clone();
        async move { chat(&clients, event, &conn) }
    });
    server.register_event_handler("setUsername", |event, conn| async move {
        set_username(event, &conn)
    });
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn echo(request: Request, _conn: Arc<ClientConnection>) -> anyhow::Result<Value> {
    tracing::debug!(payload = %request.payload, "Echo-Request");
    Ok(request.payload)
}

pub async fn get_time(_request: Request, _conn: Arc<ClientConnection>) -> anyhow::Result<Value> {
    Ok(json!({ "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true) }))
}

pub async fn calculate(request: Request, _conn: Arc<ClientConnection>) -> anyhow::Result<Value> {
    let ergebnis = berechnen(&request.payload)?;
    Ok(json!({ "result": ergebnis.into_json()? }))
}

/// Zahl mit exakter Ganzzahl-Arithmetik wo moeglich
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zahl {
    Ganz(i64),
    Gleit(f64),
}

impl Zahl {
    fn aus_wert(wert: &Value, feld: &str) -> Result<Self, KollabError> {
        if let Some(i) = wert.as_i64() {
            return Ok(Self::Ganz(i));
        }
        wert.as_f64().map(Self::Gleit).ok_or_else(|| {
            KollabError::UngueltigeNutzdaten(format!("Feld '{feld}' muss eine Zahl sein"))
        })
    }

    fn als_f64(self) -> f64 {
        match self {
            Self::Ganz(i) => i as f64,
            Self::Gleit(f) => f,
        }
    }

    fn ist_null(self) -> bool {
        match self {
            Self::Ganz(i) => i == 0,
            Self::Gleit(f) => f == 0.0,
        }
    }

    /// JSON-Darstellung; ganzzahlige Gleitkommawerte werden zu Integern
    pub fn into_json(self) -> Result<Value, KollabError> {
        match self {
            Self::Ganz(i) => Ok(json!(i)),
            Self::Gleit(f) if !f.is_finite() => Err(KollabError::UngueltigeNutzdaten(
                "Ergebnis ist nicht darstellbar".into(),
            )),
            Self::Gleit(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(json!(f as i64)),
            Self::Gleit(f) => Ok(json!(f)),
        }
    }
}

/// Fuehrt `{operation, a, b}` aus
pub fn berechnen(payload: &Value) -> Result<Zahl, KollabError> {
    let operation = payload
        .get("operation")
        .and_then(Value::as_str)
        .ok_or_else(|| KollabError::UngueltigeNutzdaten("Feld 'operation' fehlt".into()))?;

    if !matches!(operation, "add" | "subtract" | "multiply" | "divide") {
        return Err(KollabError::UnbekannteOperation(operation.to_string()));
    }

    let a = Zahl::aus_wert(payload.get("a").unwrap_or(&Value::Null), "a")?;
    let b = Zahl::aus_wert(payload.get("b").unwrap_or(&Value::Null), "b")?;

    if operation == "divide" && b.ist_null() {
        return Err(KollabError::DivisionDurchNull);
    }

    let ganz = match (operation, a, b) {
        ("add", Zahl::Ganz(x), Zahl::Ganz(y)) => x.checked_add(y),
        ("subtract", Zahl::Ganz(x), Zahl::Ganz(y)) => x.checked_sub(y),
        ("multiply", Zahl::Ganz(x), Zahl::Ganz(y)) => x.checked_mul(y),
        ("divide", Zahl::Ganz(x), Zahl::Ganz(y)) if x.checked_rem(y) == Some(0) => {
            x.checked_div(y)
        }
        _ => None,
    };
    if let Some(i) = ganz {
        return Ok(Zahl::Ganz(i));
    }

    let (x, y) = (a.als_f64(), b.als_f64());
    Ok(Zahl::Gleit(match operation {
        "add" => x + y,
        "subtract" => x - y,
        "multiply" => x * y,
        _ => x / y,
    }))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

fn chat(clients: &ClientRegistry, event: Event, conn: &ClientConnection) -> anyhow::Result<()> {
    let von = conn
        .get_metadata_str(META_USERNAME)
        .unwrap_or_else(|| "Anonymous".to_string());
    tracing::debug!(socket_id = %conn.id(), von = %von, "Chat-Nachricht");

    clients.event_an_alle(Event::neu(
        "chat",
        json!({
            "from": von,
            "message": event.payload,
            "timestamp": zeitstempel_ms(),
        }),
    ));
    Ok(())
}

fn set_username(event: Event, conn: &ClientConnection) -> anyhow::Result<()> {
    let name = event
        .payload
        .as_str()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            KollabError::UngueltigeNutzdaten(
                "Benutzername muss ein nicht-leerer String sein".into(),
            )
        })?
        .to_string();

    conn.set_metadata(META_USERNAME, name.clone());
    conn.emit(Event::neu(
        "usernameSet",
        json!({ "success": true, "username": name }),
    ));
    Ok(())
}
