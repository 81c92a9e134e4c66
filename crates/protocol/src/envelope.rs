//! Envelope-Protokoll (Client <-> Gateway)
//!
//! Jede Nachricht ist ein JSON-Objekt:
//!
//! ```text
//! { id, kind: "request"|"response"|"event"|"error", type, payload, timestamp }
//! ```
//!
//! Responses tragen zusaetzlich `status` und im Fehlerfall `error: {code, message}`.
//! `Envelope` ist die rohe Wire-Form, `Message` die geparste, typsichere
//! Variante die der Dispatcher verarbeitet.

use kollab_core::{ErrorCode, KollabError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ProtokollFehler, ProtokollResult};
use crate::zeitstempel_ms;

// ---------------------------------------------------------------------------
// Grundtypen
// ---------------------------------------------------------------------------

/// Art einer Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Event,
    Error,
}

impl MessageKind {
    /// Parst die Wire-Darstellung (`"request"`, ...)
    pub fn aus_str(s: &str) -> Option<Self> {
        match s {
            "request" => Some(Self::Request),
            "response" => Some(Self::Response),
            "event" => Some(Self::Event),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Status einer Response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Stabiles Fehlerpaar `{code, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    /// Erstellt ein Fehlerpaar aus Code und Nachricht
    pub fn neu(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Generischer, nicht-leakender interner Fehler
    pub fn intern() -> Self {
        Self::neu(ErrorCode::InternalError, "Interner Serverfehler")
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Handler koennen ein Fehlerpaar mit eigenem Code direkt zurueckgeben
impl std::error::Error for ErrorPayload {}

impl From<&KollabError> for ErrorPayload {
    fn from(e: &KollabError) -> Self {
        Self::neu(e.code(), e.to_string())
    }
}

impl From<KollabError> for ErrorPayload {
    fn from(e: KollabError) -> Self {
        Self::from(&e)
    }
}

// ---------------------------------------------------------------------------
// Rohe Wire-Form
// ---------------------------------------------------------------------------

/// Rohe Wire-Darstellung einer Nachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: MessageKind,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "zeitstempel_ms", deserialize_with = "crate::zeitstempel_lesen")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Envelope {
    /// Serialisiert den Envelope als JSON
    pub fn to_json(&self) -> ProtokollResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Typsichere Varianten
// ---------------------------------------------------------------------------

/// Anfrage eines Clients, erwartet genau eine Response mit gleicher `id`
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: String,
    pub typ: String,
    pub payload: Value,
    pub timestamp: i64,
}

impl Request {
    pub fn neu(id: impl Into<String>, typ: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            typ: typ.into(),
            payload,
            timestamp: zeitstempel_ms(),
        }
    }
}

/// Antwort auf einen Request
///
/// `typ` wird vom Dispatcher auf den Typ des Requests gesetzt falls der
/// Handler ihn leer laesst.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    pub typ: String,
    pub status: ResponseStatus,
    pub payload: Value,
    pub error: Option<ErrorPayload>,
    pub timestamp: i64,
}

impl Response {
    /// Erfolgreiche Antwort
    pub fn success(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            typ: String::new(),
            status: ResponseStatus::Success,
            payload,
            error: None,
            timestamp: zeitstempel_ms(),
        }
    }

    /// Fehler-Antwort
    pub fn error(id: impl Into<String>, fehler: impl Into<ErrorPayload>) -> Self {
        Self {
            id: id.into(),
            typ: String::new(),
            status: ResponseStatus::Error,
            payload: Value::Null,
            error: Some(fehler.into()),
            timestamp: zeitstempel_ms(),
        }
    }

    /// Fehler-Antwort aus Code und Nachricht
    pub fn fehler(
        id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::error(id, ErrorPayload::neu(code, message))
    }

    /// Setzt den Typ der Antwort
    pub fn mit_typ(mut self, typ: impl Into<String>) -> Self {
        self.typ = typ.into();
        self
    }

    pub fn ist_erfolg(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Fire-and-forget Event (beide Richtungen)
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub typ: String,
    pub payload: Value,
    pub timestamp: i64,
}

impl Event {
    /// Erstellt ein Event mit neuer zufaelliger ID
    pub fn neu(typ: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            typ: typ.into(),
            payload,
            timestamp: zeitstempel_ms(),
        }
    }
}

/// Protokoll-Fehler ohne zugehoerigen Request (z.B. unparsbarer Frame)
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub id: Option<String>,
    pub error: ErrorPayload,
    pub timestamp: i64,
}

impl ErrorMessage {
    pub fn neu(id: Option<String>, error: ErrorPayload) -> Self {
        Self {
            id,
            error,
            timestamp: zeitstempel_ms(),
        }
    }

    /// Fehlerantwort fuer einen ungueltigen Frame (`INVALID_MESSAGE`)
    pub fn ungueltig(fehler: &ProtokollFehler) -> Self {
        Self::neu(
            fehler.korrelations_id().map(str::to_string),
            ErrorPayload::neu(ErrorCode::InvalidMessage, fehler.to_string()),
        )
    }
}

/// Geparste Nachricht, Variante nach `kind`
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
    Error(ErrorMessage),
}

impl Message {
    /// Wandelt einen validierten Envelope in die konkrete Variante
    pub fn aus_envelope(env: Envelope) -> ProtokollResult<Self> {
        let Envelope {
            id,
            kind,
            typ,
            payload,
            timestamp,
            status,
            error,
        } = env;

        if kind == MessageKind::Error {
            let error = error.ok_or_else(|| ProtokollFehler::UngueltigeNachricht {
                grund: "Error-Nachricht ohne 'error'-Feld".into(),
                id: id.clone(),
            })?;
            return Ok(Self::Error(ErrorMessage {
                id,
                error,
                timestamp,
            }));
        }

        let id = id.ok_or_else(|| ProtokollFehler::ungueltig("Feld 'id' fehlt"))?;

        Ok(match kind {
            MessageKind::Request => Self::Request(Request {
                id,
                typ,
                payload,
                timestamp,
            }),
            MessageKind::Response => {
                let status = status.unwrap_or(if error.is_some() {
                    ResponseStatus::Error
                } else {
                    ResponseStatus::Success
                });
                Self::Response(Response {
                    id,
                    typ,
                    status,
                    payload,
                    error,
                    timestamp,
                })
            }
            MessageKind::Event => Self::Event(Event {
                id,
                typ,
                payload,
                timestamp,
            }),
            MessageKind::Error => unreachable!("oben behandelt"),
        })
    }

    /// Wandelt die Nachricht in ihre Wire-Form
    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::Request(r) => Envelope {
                id: Some(r.id),
                kind: MessageKind::Request,
                typ: r.typ,
                payload: r.payload,
                timestamp: r.timestamp,
                status: None,
                error: None,
            },
            Self::Response(r) => Envelope {
                id: Some(r.id),
                kind: MessageKind::Response,
                typ: r.typ,
                payload: r.payload,
                timestamp: r.timestamp,
                status: Some(r.status),
                error: r.error,
            },
            Self::Event(e) => Envelope {
                id: Some(e.id),
                kind: MessageKind::Event,
                typ: e.typ,
                payload: e.payload,
                timestamp: e.timestamp,
                status: None,
                error: None,
            },
            Self::Error(e) => Envelope {
                id: e.id,
                kind: MessageKind::Error,
                typ: "error".into(),
                payload: Value::Null,
                timestamp: e.timestamp,
                status: None,
                error: Some(e.error),
            },
        }
    }

    /// Serialisiert die Nachricht als JSON-Frame
    pub fn to_json(self) -> ProtokollResult<String> {
        self.into_envelope().to_json()
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Self::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

impl From<Event> for Message {
    fn from(e: Event) -> Self {
        Self::Event(e)
    }
}

impl From<ErrorMessage> for Message {
    fn from(e: ErrorMessage) -> Self {
        Self::Error(e)
    }
}
