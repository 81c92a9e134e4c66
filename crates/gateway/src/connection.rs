//! Client-Connection – Zustand einer einzelnen Verbindung
//!
//! Jede Verbindung hat eine eindeutige `SocketId`, eine Send-Queue zum
//! Transport und einen privaten Metadaten-Beutel (z.B. `username`,
//! `userId`, `roomId`). Die Metadaten sind nur ueber die Accessoren
//! erreichbar und werden beim Trennen geleert.

use std::collections::HashMap;
use std::time::Instant;

use kollab_core::SocketId;
use kollab_protocol::{Event, Message};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    Verbunden,
    Getrennt,
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Eine verbundene Client-Verbindung
#[derive(Debug)]
pub struct ClientConnection {
    id: SocketId,
    tx: mpsc::Sender<String>,
    metadata: Mutex<HashMap<String, Value>>,
    zustand: Mutex<VerbindungsZustand>,
    verbunden_seit: Instant,
}

impl ClientConnection {
    /// Erstellt eine Verbindung mit der Send-Queue des Transports
    pub fn neu(id: SocketId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            metadata: Mutex::new(HashMap::new()),
            zustand: Mutex::new(VerbindungsZustand::Verbunden),
            verbunden_seit: Instant::now(),
        }
    }

    pub fn id(&self) -> &SocketId {
        &self.id
    }

    pub fn zustand(&self) -> VerbindungsZustand {
        *self.zustand.lock()
    }

    pub fn ist_verbunden(&self) -> bool {
        self.zustand() == VerbindungsZustand::Verbunden
    }

    /// Verbindungsdauer in Sekunden
    pub fn verbunden_sek(&self) -> u64 {
        self.verbunden_seit.elapsed().as_secs()
    }

    // -----------------------------------------------------------------------
    // Metadaten
    // -----------------------------------------------------------------------

    pub fn get_metadata(&self, key: &str) -> Option<Value> {
        self.metadata.lock().get(key).cloned()
    }

    /// Metadaten-Wert als String (nur wenn er ein JSON-String ist)
    pub fn get_metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.lock().get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.lock().insert(key.into(), value.into());
    }

    pub fn remove_metadata(&self, key: &str) -> Option<Value> {
        self.metadata.lock().remove(key)
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Reiht einen fertigen Frame nicht-blockierend in die Send-Queue ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder die Verbindung getrennt ist.
    pub fn senden(&self, frame: String) -> bool {
        if !self.ist_verbunden() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(socket_id = %self.id, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(socket_id = %self.id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Serialisiert und sendet eine Nachricht
    pub fn nachricht_senden(&self, nachricht: impl Into<Message>) -> bool {
        match nachricht.into().to_json() {
            Ok(frame) => self.senden(frame),
            Err(e) => {
                tracing::error!(socket_id = %self.id, fehler = %e, "Nachricht nicht serialisierbar");
                false
            }
        }
    }

    /// Reiht eine Antwort ein und wartet bei voller Queue auf Platz
    ///
    /// Fuer Responses, die nie verworfen werden duerfen. Gibt `false` zurueck
    /// wenn die Verbindung getrennt ist.
    pub async fn antwort_senden(&self, nachricht: impl Into<Message>) -> bool {
        if !self.ist_verbunden() {
            return false;
        }
        let frame = match nachricht.into().to_json() {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(socket_id = %self.id, fehler = %e, "Antwort nicht serialisierbar");
                return false;
            }
        };
        if self.tx.send(frame).await.is_err() {
            tracing::debug!(socket_id = %self.id, "Send-Queue geschlossen (Client getrennt)");
            return false;
        }
        true
    }

    /// Sendet ein Event an diesen Client
    pub fn emit(&self, event: Event) -> bool {
        self.nachricht_senden(event)
    }

    /// Markiert die Verbindung als getrennt und verwirft die Metadaten
    pub(crate) fn trennen(&self) {
        *self.zustand.lock() = VerbindungsZustand::Getrennt;
        self.metadata.lock().clear();
    }
}
