//! Fehlertypen fuer das Gateway

use kollab_bus::BusError;
use kollab_protocol::ProtokollFehler;
use kollab_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// IO-Fehler (Bind, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// `start()` auf einem laufenden Server
    #[error("Server laeuft bereits")]
    LaeuftBereits,

    /// `stop()` ohne vorheriges `start()`
    #[error("Server ist nicht gestartet")]
    NichtGestartet,

    #[error("Bus-Fehler: {0}")]
    Bus(#[from] BusError),

    #[error("Session-Fehler: {0}")]
    Session(#[from] SessionError),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl GatewayError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Typ fuer das Gateway
pub type GatewayResult<T> = Result<T, GatewayError>;
