//! Dispatcher – Routet eingehende Frames an die registrierten Handler
//!
//! Ablauf pro Frame:
//! 1. Validieren und parsen (`frame_parsen`), Fehler -> `INVALID_MESSAGE`
//! 2. Dispatch nach `kind`:
//!    - `request`: genau ein Handler pro Typ, genau eine Response mit gleicher `id`
//!    - `event`: null bis n Handler pro Typ, jeder als eigener Task, keine Antwort
//!    - `response`/`error` vom Client: protokolliert und verworfen
//!
//! Handler laufen als unabhaengige Tasks im `TaskTracker` des Servers. Fehler
//! und Panics eines Handlers beenden nie die Verbindung.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use kollab_core::ErrorCode;
use kollab_protocol::{
    fehler_abbilden, frame_parsen, ErrorMessage, ErrorPayload, Event, Message, Request, Response,
};
use serde_json::Value;
use tokio_util::task::TaskTracker;

use crate::connection::ClientConnection;

// ---------------------------------------------------------------------------
// Handler-Typen
// ---------------------------------------------------------------------------

/// Request-Handler: liefert den Payload der Erfolgs-Response
///
/// Ein `Err` wird an der Dispatch-Grenze auf `{code, message}` abgebildet.
pub type RequestHandler = Arc<
    dyn Fn(Request, Arc<ClientConnection>) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync,
>;

/// Event-Handler (fire-and-forget)
pub type EventHandler = Arc<
    dyn Fn(Event, Arc<ClientConnection>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
>;

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Handler-Tabellen pro Dispatch-Achse
#[derive(Default)]
pub struct HandlerRegistry {
    requests: DashMap<String, RequestHandler>,
    events: DashMap<String, Vec<EventHandler>>,
}

impl HandlerRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert den Request-Handler fuer einen Typ, ein vorhandener wird ersetzt
    pub fn request_registrieren<F, Fut>(&self, typ: impl Into<String>, handler: F)
    where
        F: Fn(Request, Arc<ClientConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let typ = typ.into();
        let handler: RequestHandler = Arc::new(move |req, conn| handler(req, conn).boxed());
        if self.requests.insert(typ.clone(), handler).is_some() {
            tracing::warn!(typ = %typ, "Request-Handler ersetzt");
        } else {
            tracing::debug!(typ = %typ, "Request-Handler registriert");
        }
    }

    /// Fuegt einen Event-Handler fuer einen Typ hinzu
    pub fn event_registrieren<F, Fut>(&self, typ: impl Into<String>, handler: F)
    where
        F: Fn(Event, Arc<ClientConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let typ = typ.into();
        let handler: EventHandler = Arc::new(move |event, conn| handler(event, conn).boxed());
        tracing::debug!(typ = %typ, "Event-Handler registriert");
        self.events.entry(typ).or_default().push(handler);
    }

    pub fn request_handler(&self, typ: &str) -> Option<RequestHandler> {
        self.requests.get(typ).map(|h| Arc::clone(h.value()))
    }

    pub fn event_handler(&self, typ: &str) -> Vec<EventHandler> {
        self.events
            .get(typ)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    pub fn request_typen(&self) -> Vec<String> {
        let mut typen: Vec<String> = self.requests.iter().map(|e| e.key().clone()).collect();
        typen.sort();
        typen
    }

    pub fn event_typen(&self) -> Vec<String> {
        let mut typen: Vec<String> = self.events.iter().map(|e| e.key().clone()).collect();
        typen.sort();
        typen
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Verteilt Frames einer Verbindung auf Handler-Tasks
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<HandlerRegistry>,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub fn neu(handler: Arc<HandlerRegistry>, tasks: TaskTracker) -> Self {
        Self { handler, tasks }
    }

    pub fn handler(&self) -> &HandlerRegistry {
        &self.handler
    }

    /// Verarbeitet einen eingehenden Text-Frame
    ///
    /// Kehrt sofort zurueck; Handler laufen als eigene Tasks.
    pub fn frame_verarbeiten(&self, verbindung: &Arc<ClientConnection>, frame: &str) {
        let nachricht = match frame_parsen(frame) {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(
                    socket_id = %verbindung.id(),
                    fehler = %e,
                    "Ungueltiger Frame"
                );
                verbindung.nachricht_senden(ErrorMessage::ungueltig(&e));
                return;
            }
        };

        match nachricht {
            Message::Request(request) => self.request_dispatchen(verbindung, request),
            Message::Event(event) => self.event_dispatchen(verbindung, event),
            Message::Response(r) => {
                tracing::debug!(
                    socket_id = %verbindung.id(),
                    id = %r.id,
                    "Response vom Client ignoriert"
                );
            }
            Message::Error(e) => {
                tracing::warn!(
                    socket_id = %verbindung.id(),
                    code = %e.error.code,
                    nachricht = %e.error.message,
                    "Client meldet Fehler"
                );
            }
        }
    }

    fn request_dispatchen(&self, verbindung: &Arc<ClientConnection>, request: Request) {
        let Some(handler) = self.handler.request_handler(&request.typ) else {
            tracing::debug!(
                socket_id = %verbindung.id(),
                typ = %request.typ,
                "Unbekannter Request-Typ"
            );
            let antwort = Response::fehler(
                request.id,
                ErrorCode::UnknownRequestType,
                format!("Unbekannter Request-Typ: {}", request.typ),
            )
            .mit_typ(request.typ);
            let verbindung = Arc::clone(verbindung);
            self.tasks.spawn(async move {
                verbindung.antwort_senden(antwort).await;
            });
            return;
        };

        // Responses warten bei voller Queue, statt verworfen zu werden
        let verbindung = Arc::clone(verbindung);
        self.tasks.spawn(async move {
            let antwort = request_beantworten(handler, request, Arc::clone(&verbindung)).await;
            verbindung.antwort_senden(antwort).await;
        });
    }

    fn event_dispatchen(&self, verbindung: &Arc<ClientConnection>, event: Event) {
        let handler = self.handler.event_handler(&event.typ);
        if handler.is_empty() {
            tracing::debug!(
                socket_id = %verbindung.id(),
                typ = %event.typ,
                "Kein Event-Handler registriert"
            );
            return;
        }

        // Jeder Handler unabhaengig, ein Fehler blockiert die anderen nicht
        for h in handler {
            let event = event.clone();
            let verbindung = Arc::clone(verbindung);
            self.tasks.spawn(event_ausfuehren(h, event, verbindung));
        }
    }
}

/// Fuehrt einen Request-Handler aus und erzeugt genau eine Response
pub async fn request_beantworten(
    handler: RequestHandler,
    request: Request,
    verbindung: Arc<ClientConnection>,
) -> Response {
    let id = request.id.clone();
    let typ = request.typ.clone();
    let socket_id = verbindung.id().clone();

    let ergebnis = AssertUnwindSafe(async move { handler(request, verbindung).await })
        .catch_unwind()
        .await;

    let antwort = match ergebnis {
        Ok(Ok(payload)) => Response::success(id, payload),
        Ok(Err(e)) => {
            let payload = fehler_abbilden(&e);
            if payload.code == ErrorCode::InternalError.as_str() {
                tracing::error!(socket_id = %socket_id, typ = %typ, fehler = ?e, "Request-Handler fehlgeschlagen");
            } else {
                tracing::debug!(socket_id = %socket_id, typ = %typ, code = %payload.code, "Request mit Fehler beantwortet");
            }
            Response::error(id, payload)
        }
        Err(_) => {
            tracing::error!(socket_id = %socket_id, typ = %typ, "Request-Handler mit Panic abgebrochen");
            Response::error(id, ErrorPayload::intern())
        }
    };
    antwort.mit_typ(typ)
}

async fn event_ausfuehren(handler: EventHandler, event: Event, verbindung: Arc<ClientConnection>) {
    let typ = event.typ.clone();
    let socket_id = verbindung.id().clone();

    match AssertUnwindSafe(async move { handler(event, verbindung).await })
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(socket_id = %socket_id, typ = %typ, fehler = %e, "Event-Handler fehlgeschlagen");
        }
        Err(_) => {
            tracing::error!(socket_id = %socket_id, typ = %typ, "Event-Handler mit Panic abgebrochen");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kollab_core::{KollabError, SocketId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn aufbau() -> (Dispatcher, Arc<ClientConnection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = Arc::new(ClientConnection::neu(SocketId::from("s1"), tx));
        let dispatcher = Dispatcher::neu(Arc::new(HandlerRegistry::neu()), TaskTracker::new());
        (dispatcher, conn, rx)
    }

    async fn naechster(rx: &mut mpsc::Receiver<String>) -> Value {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("Timeout")
            .expect("Queue geschlossen");
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn request_bekommt_antwort_mit_gleicher_id() {
        let (d, conn, mut rx) = aufbau();
        d.handler()
            .request_registrieren("echo", |req: Request, _| async move { Ok(req.payload) });

        d.frame_verarbeiten(&conn, r#"{"id":"r1","kind":"request","type":"echo","payload":{"a":1}}"#);
        let antwort = naechster(&mut rx).await;
        assert_eq!(antwort["id"], "r1");
        assert_eq!(antwort["kind"], "response");
        assert_eq!(antwort["type"], "echo");
        assert_eq!(antwort["status"], "success");
        assert_eq!(antwort["payload"], json!({"a": 1}));
    }

    #[tokio::test]
    async fn unbekannter_request_typ() {
        let (d, conn, mut rx) = aufbau();
        d.frame_verarbeiten(&conn, r#"{"id":"r2","kind":"request","type":"gibtsnicht"}"#);

        let antwort = naechster(&mut rx).await;
        assert_eq!(antwort["id"], "r2");
        assert_eq!(antwort["status"], "error");
        assert_eq!(antwort["error"]["code"], "UNKNOWN_REQUEST_TYPE");
    }

    #[tokio::test]
    async fn handler_fehler_werden_abgebildet() {
        let (d, conn, mut rx) = aufbau();
        d.handler().request_registrieren("teilen", |_, _| async {
            Err::<Value, _>(KollabError::DivisionDurchNull.into())
        });
        d.handler().request_registrieren("kaputt", |_, _| async {
            Err::<Value, _>(anyhow::anyhow!("geheimes Detail"))
        });

        d.frame_verarbeiten(&conn, r#"{"id":"a","kind":"request","type":"teilen"}"#);
        let a = naechster(&mut rx).await;
        assert_eq!(a["error"]["code"], "DIVISION_BY_ZERO");

        d.frame_verarbeiten(&conn, r#"{"id":"b","kind":"request","type":"kaputt"}"#);
        let b = naechster(&mut rx).await;
        assert_eq!(b["id"], "b");
        assert_eq!(b["error"]["code"], "INTERNAL_ERROR");
        assert!(!b["error"]["message"].as_str().unwrap().contains("geheim"));
    }

    #[tokio::test]
    async fn panic_im_handler_ergibt_internal_error() {
        let (d, conn, mut rx) = aufbau();
        d.handler().request_registrieren("panik", |_, _| async {
            if true {
                panic!("absichtlich");
            }
            Ok(Value::Null)
        });

        d.frame_verarbeiten(&conn, r#"{"id":"p1","kind":"request","type":"panik"}"#);
        let antwort = naechster(&mut rx).await;
        assert_eq!(antwort["id"], "p1");
        assert_eq!(antwort["error"]["code"], "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn ungueltiger_frame_ergibt_invalid_message() {
        let (d, conn, mut rx) = aufbau();
        d.frame_verarbeiten(&conn, "{kaputt");
        let fehler = naechster(&mut rx).await;
        assert_eq!(fehler["kind"], "error");
        assert_eq!(fehler["error"]["code"], "INVALID_MESSAGE");
        assert!(fehler.get("id").is_none());

        d.frame_verarbeiten(&conn, r#"{"id":"x9","kind":"request"}"#);
        let fehler = naechster(&mut rx).await;
        assert_eq!(fehler["id"], "x9");
    }

    #[tokio::test]
    async fn alle_event_handler_laufen_auch_bei_fehler() {
        let (d, conn, mut rx) = aufbau();
        let zaehler = Arc::new(AtomicUsize::new(0));

        d.handler()
            .event_registrieren("ping", |_, _| async { Err(anyhow::anyhow!("kaputt")) });
        for _ in 0..2 {
            let z = Arc::clone(&zaehler);
            d.handler().event_registrieren("ping", move |_, _| {
                let z = Arc::clone(&z);
                async move {
                    z.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        d.frame_verarbeiten(&conn, r#"{"id":"e1","kind":"event","type":"ping"}"#);
        d.tasks.close();
        d.tasks.wait().await;

        assert_eq!(zaehler.load(Ordering::SeqCst), 2);
        assert!(rx.try_recv().is_err(), "Events erzeugen keine Antwort");
    }

    #[tokio::test]
    async fn volle_queue_verliert_keine_responses() {
        let (tx, mut rx) = mpsc::channel(2);
        let conn = Arc::new(ClientConnection::neu(SocketId::from("s1"), tx));
        let d = Dispatcher::neu(Arc::new(HandlerRegistry::neu()), TaskTracker::new());
        d.handler()
            .request_registrieren("echo", |req: Request, _| async move { Ok(req.payload) });

        for i in 0..5 {
            d.frame_verarbeiten(
                &conn,
                &format!(r#"{{"id":"r{i}","kind":"request","type":"echo"}}"#),
            );
        }
        d.frame_verarbeiten(&conn, r#"{"id":"u1","kind":"request","type":"gibtsnicht"}"#);

        // Erst jetzt lesen, die Queue war zwischenzeitlich voll
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut ids = Vec::new();
        for _ in 0..6 {
            ids.push(naechster(&mut rx).await["id"].as_str().unwrap().to_string());
        }
        ids.sort();
        assert_eq!(ids, vec!["r0", "r1", "r2", "r3", "r4", "u1"]);

        d.tasks.close();
        d.tasks.wait().await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn registrierte_typen_sortiert() {
        let registry = HandlerRegistry::neu();
        registry.request_registrieren("calculate", |_, _| async { Ok(Value::Null) });
        registry.request_registrieren("echo", |_, _| async { Ok(Value::Null) });
        registry.event_registrieren("chat", |_, _| async { Ok(()) });

        assert_eq!(registry.request_typen(), vec!["calculate", "echo"]);
        assert_eq!(registry.event_typen(), vec!["chat"]);
    }
}
