//! In-Process-Bus fuer Single-Process-Betrieb und Tests
//!
//! Jeder Abonnent bekommt eine eigene unbeschraenkte Queue, damit ein
//! langsamer Abonnent den Publisher nicht blockiert. Clone teilt den inneren
//! Zustand, mehrere "Prozesse" in einem Test haengen also am selben Bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::{BusError, BusResult};
use crate::transport::{PubSubTransport, Subscription};

/// In-Memory Publish/Subscribe-Bus
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<InMemoryBusInner>,
}

#[derive(Default)]
struct InMemoryBusInner {
    /// Channel -> Sender aller aktiven Abonnenten
    channels: DashMap<String, Vec<mpsc::UnboundedSender<String>>>,
    /// Simulierter Verbindungsverlust
    getrennt: AtomicBool,
}

impl InMemoryBus {
    /// Erstellt einen neuen leeren Bus
    pub fn neu() -> Self {
        Self::default()
    }

    /// Simuliert einen Verbindungsverlust
    ///
    /// Alle Abonnements enden, weitere Publishes schlagen mit
    /// `BusError::Getrennt` fehl.
    pub fn disconnect(&self) {
        self.inner.getrennt.store(true, Ordering::SeqCst);
        self.inner.channels.clear();
        tracing::warn!("In-Memory-Bus getrennt");
    }

    /// Hebt einen simulierten Verbindungsverlust auf (ohne alte Abonnements)
    pub fn reconnect(&self) {
        self.inner.getrennt.store(false, Ordering::SeqCst);
        tracing::info!("In-Memory-Bus wieder verbunden");
    }

    /// Anzahl der aktiven Abonnenten eines Channels
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let anzahl = self
            .inner
            .channels
            .get(channel)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0);
        if anzahl == 0 {
            self.inner
                .channels
                .remove_if(channel, |_, subs| subs.iter().all(|tx| tx.is_closed()));
        }
        anzahl
    }

    /// Anzahl der Channels mit Eintrag in der Abonnenten-Map
    pub fn channel_anzahl(&self) -> usize {
        self.inner.channels.len()
    }

    fn pruefe_verbindung(&self) -> BusResult<()> {
        if self.inner.getrennt.load(Ordering::SeqCst) {
            Err(BusError::Getrennt)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PubSubTransport for InMemoryBus {
    async fn publish(&self, channel: &str, message: String) -> BusResult<usize> {
        self.pruefe_verbindung()?;

        let Some(mut abonnenten) = self.inner.channels.get_mut(channel) else {
            tracing::trace!(channel, "Publish ohne Abonnenten");
            return Ok(0);
        };

        // Beendete Abonnements aufraeumen
        abonnenten.retain(|tx| !tx.is_closed());
        if abonnenten.is_empty() {
            drop(abonnenten);
            // Kein Abonnent mehr: Channel-Eintrag entfernen
            self.inner.channels.remove_if(channel, |_, subs| subs.is_empty());
            tracing::trace!(channel, "Publish ohne Abonnenten");
            return Ok(0);
        }

        let mut zugestellt = 0;
        for tx in abonnenten.iter() {
            if tx.send(message.clone()).is_ok() {
                zugestellt += 1;
            }
        }
        tracing::trace!(channel, zugestellt, "Nachricht veroeffentlicht");
        Ok(zugestellt)
    }

    async fn subscribe(&self, channel: &str) -> BusResult<Subscription> {
        self.pruefe_verbindung()?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        tracing::debug!(channel, "Channel abonniert");
        Ok(Subscription::neu(channel, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_erreicht_alle_abonnenten() {
        let bus = InMemoryBus::neu();
        let mut a = bus.subscribe("events:gateway").await.unwrap();
        let mut b = bus.subscribe("events:gateway").await.unwrap();

        let anzahl = bus.publish("events:gateway", "hallo".into()).await.unwrap();
        assert_eq!(anzahl, 2);
        assert_eq!(a.next().await.as_deref(), Some("hallo"));
        assert_eq!(b.next().await.as_deref(), Some("hallo"));
    }

    #[tokio::test]
    async fn keine_pufferung_fuer_spaete_abonnenten() {
        let bus = InMemoryBus::neu();
        assert_eq!(bus.publish("c", "frueh".into()).await.unwrap(), 0);

        let mut spaet = bus.subscribe("c").await.unwrap();
        bus.publish("c", "danach".into()).await.unwrap();
        assert_eq!(spaet.next().await.as_deref(), Some("danach"));
    }

    #[tokio::test]
    async fn verwaiste_channels_werden_entfernt() {
        let bus = InMemoryBus::neu();
        for i in 0..20 {
            let channel = format!("raum:{i}");
            let abo = bus.subscribe(&channel).await.unwrap();
            drop(abo);
            assert_eq!(bus.publish(&channel, "x".into()).await.unwrap(), 0);
        }
        assert_eq!(bus.channel_anzahl(), 0);

        let abo = bus.subscribe("a").await.unwrap();
        assert_eq!(bus.subscriber_count("a"), 1);
        assert_eq!(bus.channel_anzahl(), 1);
        drop(abo);
        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(bus.channel_anzahl(), 0);
    }

    #[tokio::test]
    async fn channels_sind_getrennt() {
        let bus = InMemoryBus::neu();
        let mut andere = bus.subscribe("events:broadcast").await.unwrap();
        bus.publish("events:gateway", "x".into()).await.unwrap();

        let empfangen =
            tokio::time::timeout(std::time::Duration::from_millis(50), andere.next()).await;
        assert!(empfangen.is_err(), "Fremder Channel darf nichts empfangen");
    }

    #[tokio::test]
    async fn gedropptes_abonnement_wird_entfernt() {
        let bus = InMemoryBus::neu();
        let abo = bus.subscribe("c").await.unwrap();
        assert_eq!(bus.subscriber_count("c"), 1);
        drop(abo);

        assert_eq!(bus.publish("c", "x".into()).await.unwrap(), 0);
        assert_eq!(bus.subscriber_count("c"), 0);
    }

    #[tokio::test]
    async fn verbindungsverlust_ist_sichtbar() {
        let bus = InMemoryBus::neu();
        let mut abo = bus.subscribe("c").await.unwrap();

        bus.disconnect();
        assert!(abo.next().await.is_none(), "Abonnement muss enden");
        assert!(matches!(
            bus.publish("c", "x".into()).await,
            Err(BusError::Getrennt)
        ));
        assert!(bus.subscribe("c").await.is_err());

        bus.reconnect();
        assert!(bus.subscribe("c").await.is_ok());
    }
}
