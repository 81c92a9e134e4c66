//! Fehlertypen fuer den Event-Processor

use kollab_auth::AuthError;
use kollab_bus::BusError;
use kollab_protocol::ProtokollFehler;
use kollab_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Bus-Fehler: {0}")]
    Bus(#[from] BusError),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    #[error("Auth-Fehler: {0}")]
    Auth(#[from] AuthError),

    #[error("Session-Fehler: {0}")]
    Session(#[from] SessionError),

    /// `broadcast_to_room` ohne gesetzten AuthProvider
    #[error("Kein AuthProvider gesetzt")]
    KeinAuthProvider,

    /// `broadcast_to_room` ohne gesetzten SessionCache
    #[error("Kein SessionCache gesetzt")]
    KeinSessionCache,

    #[error("Processor laeuft bereits")]
    LaeuftBereits,

    #[error("Processor ist nicht gestartet")]
    NichtGestartet,
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
