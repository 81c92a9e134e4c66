//! Bus-Trait-Definitionen
//!
//! Nachrichten sind bereits serialisierte JSON-Strings im Envelope-Format
//! (`GatewayEvent` bzw. `BroadcastEvent`). Der Bus selbst kennt die Inhalte
//! nicht.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BusResult;

/// Verbindungs-Konfiguration fuer einen externen Bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Verbindungs-URL (z.B. "redis://localhost:6379"), `memory://` fuer In-Process
    pub url: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "memory://".into(),
        }
    }
}

/// Publish/Subscribe-Transport
#[async_trait]
pub trait PubSubTransport: Send + Sync + 'static {
    /// Veroeffentlicht eine Nachricht auf einem Channel
    ///
    /// Gibt die Anzahl der Abonnenten zurueck die sie erhalten haben.
    async fn publish(&self, channel: &str, message: String) -> BusResult<usize>;

    /// Abonniert einen Channel
    ///
    /// Das Abonnement endet wenn die `Subscription` gedroppt wird oder der
    /// Bus die Verbindung verliert (`next()` liefert dann `None`).
    async fn subscribe(&self, channel: &str) -> BusResult<Subscription>;
}

/// Empfaenger-Seite eines Bus-Abonnements
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    /// Erstellt ein Abonnement aus einer Empfangs-Queue
    pub fn neu(channel: impl Into<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            channel: channel.into(),
            rx,
        }
    }

    /// Empfaengt die naechste Nachricht, `None` wenn das Abonnement beendet ist
    pub async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Name des abonnierten Channels
    pub fn channel(&self) -> &str {
        &self.channel
    }
}
