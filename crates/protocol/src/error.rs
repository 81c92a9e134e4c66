//! Fehlertypen fuer das Protokoll-Crate

use kollab_core::ErrorCode;
use thiserror::Error;

/// Fehler beim Validieren, Parsen oder Serialisieren von Nachrichten
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    /// Frame ist kein gueltiger Envelope
    ///
    /// `id` enthaelt die Korrelations-ID falls sie aus dem Rohframe
    /// rekonstruiert werden konnte.
    #[error("Ungueltige Nachricht: {grund}")]
    UngueltigeNachricht { grund: String, id: Option<String> },

    /// Bus-Nachricht ist kein gueltiges Gateway- oder Broadcast-Event
    #[error("Ungueltiges Bus-Event: {0}")]
    UngueltigesBusEvent(String),

    /// Serialisierung einer ausgehenden Nachricht fehlgeschlagen
    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),
}

impl ProtokollFehler {
    /// Erstellt einen Validierungsfehler ohne wiederherstellbare ID
    pub fn ungueltig(grund: impl Into<String>) -> Self {
        Self::UngueltigeNachricht {
            grund: grund.into(),
            id: None,
        }
    }

    /// Korrelations-ID des fehlerhaften Frames, falls bekannt
    pub fn korrelations_id(&self) -> Option<&str> {
        match self {
            Self::UngueltigeNachricht { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// Stabiler Wire-Code dieser Fehlerart
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UngueltigeNachricht { .. } | Self::UngueltigesBusEvent(_) => {
                ErrorCode::InvalidMessage
            }
            Self::Serialisierung(_) => ErrorCode::InternalError,
        }
    }
}

/// Result-Typ fuer das Protokoll-Crate
pub type ProtokollResult<T> = Result<T, ProtokollFehler>;
