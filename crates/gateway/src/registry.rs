//! Client-Registry – Alle verbundenen Clients einer Gateway-Instanz
//!
//! Haelt die `ClientConnection`s indiziert nach `SocketId` und stellt die
//! Sende-Operationen bereit:
//! - An einen Client: `an_client_senden`
//! - An alle Clients: `an_alle_senden`
//! - An eine Empfaengerliste (Bus-Broadcasts): `an_sockets_senden`

use std::sync::Arc;

use dashmap::DashMap;
use kollab_core::SocketId;
use kollab_protocol::{Event, Message};

use crate::connection::ClientConnection;

/// Registry aller verbundenen Clients
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<DashMap<SocketId, Arc<ClientConnection>>>,
}

impl ClientRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn registrieren(&self, verbindung: Arc<ClientConnection>) {
        tracing::debug!(socket_id = %verbindung.id(), "Client registriert");
        self.clients.insert(verbindung.id().clone(), verbindung);
    }

    pub fn entfernen(&self, socket_id: &SocketId) -> Option<Arc<ClientConnection>> {
        let entfernt = self.clients.remove(socket_id).map(|(_, v)| v);
        if entfernt.is_some() {
            tracing::debug!(socket_id = %socket_id, "Client entfernt");
        }
        entfernt
    }

    pub fn get(&self, socket_id: &SocketId) -> Option<Arc<ClientConnection>> {
        self.clients.get(socket_id).map(|c| Arc::clone(c.value()))
    }

    pub fn ist_registriert(&self, socket_id: &SocketId) -> bool {
        self.clients.contains_key(socket_id)
    }

    pub fn anzahl(&self) -> usize {
        self.clients.len()
    }

    /// Momentaufnahme aller Verbindungen
    pub fn alle(&self) -> Vec<Arc<ClientConnection>> {
        self.clients.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Entfernt alle Clients und gibt sie zurueck
    pub fn leeren(&self) -> Vec<Arc<ClientConnection>> {
        let alle = self.alle();
        self.clients.clear();
        alle
    }

    /// Sendet einen Frame an einen einzelnen Client
    pub fn an_client_senden(&self, socket_id: &SocketId, frame: String) -> bool {
        match self.get(socket_id) {
            Some(client) => client.senden(frame),
            None => {
                tracing::debug!(socket_id = %socket_id, "Senden an unbekannten Client");
                false
            }
        }
    }

    /// Sendet einen Frame an alle zum Aufrufzeitpunkt verbundenen Clients
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, frame: &str) -> usize {
        // Momentaufnahme, damit kein Shard-Lock waehrend des Sendens gehalten wird
        self.alle()
            .iter()
            .filter(|client| client.senden(frame.to_string()))
            .count()
    }

    /// Serialisiert ein Event einmal und sendet es an alle Clients
    pub fn event_an_alle(&self, event: Event) -> usize {
        match Message::from(event).to_json() {
            Ok(frame) => self.an_alle_senden(&frame),
            Err(e) => {
                tracing::error!(fehler = %e, "Event nicht serialisierbar");
                0
            }
        }
    }

    /// Sendet einen Frame an die lokal verbundenen Sockets einer Empfaengerliste
    ///
    /// Unbekannte IDs gehoeren zu anderen Gateway-Instanzen und werden
    /// uebersprungen.
    pub fn an_sockets_senden(&self, empfaenger: &[SocketId], frame: &str) -> usize {
        empfaenger
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|client| client.senden(frame.to_string()))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn client(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientConnection::neu(SocketId::from(id), tx)), rx)
    }

    #[test]
    fn registrieren_und_senden() {
        let registry = ClientRegistry::neu();
        let (c, mut rx) = client("a");
        registry.registrieren(c);

        assert!(registry.ist_registriert(&"a".into()));
        assert!(registry.an_client_senden(&"a".into(), "hallo".into()));
        assert!(!registry.an_client_senden(&"b".into(), "hallo".into()));
        assert_eq!(rx.try_recv().unwrap(), "hallo");
    }

    #[test]
    fn an_alle_senden() {
        let registry = ClientRegistry::neu();
        let mut receivers: Vec<_> = (0..5)
            .map(|i| {
                let (c, rx) = client(&format!("s{i}"));
                registry.registrieren(c);
                rx
            })
            .collect();

        assert_eq!(registry.an_alle_senden("x"), 5);
        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[test]
    fn nur_lokale_empfaenger() {
        let registry = ClientRegistry::neu();
        let (c1, mut rx1) = client("socket1");
        let (c2, mut rx2) = client("socket2");
        registry.registrieren(c1);
        registry.registrieren(c2);

        let gesendet = registry.an_sockets_senden(&["socket2".into(), "fremd".into()], "x");
        assert_eq!(gesendet, 1);
        assert!(rx1.try_recv().is_err(), "socket1 ist kein Empfaenger");
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn entfernen_und_leeren() {
        let registry = ClientRegistry::neu();
        let (c1, _rx1) = client("a");
        let (c2, _rx2) = client("b");
        registry.registrieren(c1);
        registry.registrieren(c2);

        assert!(registry.entfernen(&"a".into()).is_some());
        assert!(registry.entfernen(&"a".into()).is_none());
        assert_eq!(registry.leeren().len(), 1);
        assert_eq!(registry.anzahl(), 0);
    }
}
