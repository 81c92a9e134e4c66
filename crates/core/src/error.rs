//! Fehlertypen fuer Kollab
//!
//! `ErrorCode` sind die stabilen Codes die auf dem Wire erscheinen.
//! `KollabError` sind die "erkannten" Fehlerarten: Handler duerfen sie
//! zurueckgeben und die Dispatch-Grenze bildet sie auf `{code, message}`
//! ab. Alles andere wird dort zu `INTERNAL_ERROR`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Globaler Result-Alias fuer Kollab
pub type Result<T> = std::result::Result<T, KollabError>;

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Responses und Error-Broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Protokoll
    InvalidMessage,
    UnknownRequestType,
    // Allgemein
    InternalError,
    NotFound,
    InvalidPayload,
    // Raum / Autorisierung
    AccessDenied,
    NoRoom,
    // Rechnen
    DivisionByZero,
    UnknownOperation,
}

impl ErrorCode {
    /// Wire-Darstellung des Codes
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::UnknownRequestType => "UNKNOWN_REQUEST_TYPE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::NoRoom => "NO_ROOM",
            Self::DivisionByZero => "DIVISION_BY_ZERO",
            Self::UnknownOperation => "UNKNOWN_OPERATION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// KollabError
// ---------------------------------------------------------------------------

/// Erkannte Fehlerarten im Kollab-System
#[derive(Debug, Error)]
pub enum KollabError {
    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Unbekannter Request-Typ: {0}")]
    UnbekannterTyp(String),

    // --- Autorisierung & Raeume ---
    #[error("Zugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Raum-ID fehlt")]
    RaumFehlt,

    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    // --- Nutzdaten ---
    #[error("Ungueltige Nutzdaten: {0}")]
    UngueltigeNutzdaten(String),

    #[error("Division durch Null")]
    DivisionDurchNull,

    #[error("Unbekannte Operation: {0}")]
    UnbekannteOperation(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl KollabError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Stabiler Wire-Code dieser Fehlerart
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UngueltigeNachricht(_) => ErrorCode::InvalidMessage,
            Self::UnbekannterTyp(_) => ErrorCode::UnknownRequestType,
            Self::ZugriffVerweigert(_) => ErrorCode::AccessDenied,
            Self::RaumFehlt => ErrorCode::NoRoom,
            Self::NichtGefunden(_) => ErrorCode::NotFound,
            Self::UngueltigeNutzdaten(_) => ErrorCode::InvalidPayload,
            Self::DivisionDurchNull => ErrorCode::DivisionByZero,
            Self::UnbekannteOperation(_) => ErrorCode::UnknownOperation,
            Self::Intern(_) => ErrorCode::InternalError,
        }
    }
}
