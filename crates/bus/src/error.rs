//! Fehlertypen fuer den Bus

use thiserror::Error;

/// Fehler beim Publizieren oder Abonnieren
#[derive(Debug, Error)]
pub enum BusError {
    /// Verbindung zum Bus verloren
    #[error("Bus-Verbindung getrennt")]
    Getrennt,

    /// Fehler des konkreten Transports
    #[error("Bus-Transportfehler: {0}")]
    Transport(String),
}

/// Result-Typ fuer den Bus
pub type BusResult<T> = Result<T, BusError>;
