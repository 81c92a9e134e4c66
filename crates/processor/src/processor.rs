//! EventProcessor – Bus-Abonnement, Handler-Dispatch, Fan-out
//!
//! Eine Bus-Subscription pro Instanz. Jedes eingehende GatewayEvent wird als
//! eigener Task verarbeitet; zwischen Events gibt es keine
//! Reihenfolge-Garantie. Die Events eines Handlers werden in ihrer
//! Reihenfolge publiziert.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::FutureExt;
use kollab_auth::AuthProvider;
use kollab_bus::{PubSubTransport, Subscription};
use kollab_core::{RoomId, SocketId, UserId};
use kollab_protocol::{BroadcastEvent, GatewayEvent};
use kollab_session::SessionCache;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::config::ProcessorConfig;
use crate::context::EventContext;
use crate::error::{ProcessorError, ProcessorResult};
use crate::handler::{HandlerErgebnis, ProcessorHandler};

/// Verarbeitet GatewayEvents vom Bus
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventProcessor {
    inner: Arc<EventProcessorInner>,
}

struct EventProcessorInner {
    config: ProcessorConfig,
    bus: Arc<dyn PubSubTransport>,
    handler: DashMap<String, ProcessorHandler>,
    auth: RwLock<Option<Arc<dyn AuthProvider>>>,
    sessions: RwLock<Option<Arc<dyn SessionCache>>>,
    tasks: TaskTracker,
    laufzeit: Mutex<Option<Laufzeit>>,
}

struct Laufzeit {
    shutdown_tx: watch::Sender<bool>,
    schleife: JoinHandle<()>,
}

impl EventProcessor {
    pub fn neu(config: ProcessorConfig, bus: Arc<dyn PubSubTransport>) -> Self {
        Self {
            inner: Arc::new(EventProcessorInner {
                config,
                bus,
                handler: DashMap::new(),
                auth: RwLock::new(None),
                sessions: RwLock::new(None),
                tasks: TaskTracker::new(),
                laufzeit: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.inner.config
    }

    fn pipeline_logs(&self) -> bool {
        self.inner.config.logging_aktiv
    }

    // -----------------------------------------------------------------------
    // Registrierung & Provider
    // -----------------------------------------------------------------------

    /// Registriert den Handler fuer einen Event-Typ; die letzte Registrierung gilt
    pub fn register_event_handler<F, Fut, R>(&self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(EventContext, EventProcessor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerErgebnis> + 'static,
    {
        let event_type = event_type.into();
        let handler: ProcessorHandler = Arc::new(move |ctx: EventContext, processor: EventProcessor| {
            handler(ctx, processor)
                .map(|ergebnis| ergebnis.map(Into::<HandlerErgebnis>::into))
                .boxed()
        });
        if self.inner.handler.insert(event_type.clone(), handler).is_some() {
            tracing::warn!(typ = %event_type, "Processor-Handler ersetzt");
        } else {
            tracing::debug!(typ = %event_type, "Processor-Handler registriert");
        }
    }

    pub fn registered_event_types(&self) -> Vec<String> {
        let mut typen: Vec<String> = self.inner.handler.iter().map(|e| e.key().clone()).collect();
        typen.sort();
        typen
    }

    pub fn set_auth_provider(&self, provider: Arc<dyn AuthProvider>) {
        *self.inner.auth.write() = Some(provider);
    }

    pub fn set_session_cache(&self, cache: Arc<dyn SessionCache>) {
        *self.inner.sessions.write() = Some(cache);
    }

    pub fn auth_provider(&self) -> Option<Arc<dyn AuthProvider>> {
        self.inner.auth.read().clone()
    }

    pub fn session_cache(&self) -> Option<Arc<dyn SessionCache>> {
        self.inner.sessions.read().clone()
    }

    // -----------------------------------------------------------------------
    // Autorisierung & Fan-out
    // -----------------------------------------------------------------------

    /// Prueft eine Berechtigung; `false` statt Fehler bei fehlendem Provider
    pub async fn check_permission(&self, user_id: &UserId, room_id: &RoomId, permission: &str) -> bool {
        let Some(auth) = self.auth_provider() else {
            tracing::warn!(user = %user_id, raum = %room_id, "Berechtigungspruefung ohne AuthProvider");
            return false;
        };
        match auth.has_permission(user_id, room_id, permission).await {
            Ok(erlaubt) => erlaubt,
            Err(e) => {
                tracing::warn!(
                    user = %user_id,
                    raum = %room_id,
                    berechtigung = permission,
                    fehler = %e,
                    "Berechtigungspruefung fehlgeschlagen"
                );
                false
            }
        }
    }

    /// Loest die Sockets aller berechtigten Benutzer eines Raums auf
    ///
    /// Benutzer ohne Zuordnung, Benutzer in `ausser_user` und Sockets in
    /// `ausser_sockets` werden uebersprungen.
    pub async fn raum_empfaenger(
        &self,
        room_id: &RoomId,
        ausser_sockets: &[SocketId],
        ausser_user: &[UserId],
    ) -> ProcessorResult<Vec<SocketId>> {
        let auth = self.auth_provider().ok_or(ProcessorError::KeinAuthProvider)?;
        let sessions = self.session_cache().ok_or(ProcessorError::KeinSessionCache)?;

        let benutzer: Vec<UserId> = auth
            .get_authorized_users_in_room(room_id)
            .await?
            .into_iter()
            .filter(|u| !ausser_user.contains(u))
            .collect();
        let zuordnung = sessions.get_socket_ids(&benutzer, room_id).await?;

        let mut empfaenger: Vec<SocketId> = Vec::with_capacity(zuordnung.len());
        for socket in zuordnung.into_iter().filter_map(|(_, s)| s) {
            if !ausser_sockets.contains(&socket) && !empfaenger.contains(&socket) {
                empfaenger.push(socket);
            }
        }
        Ok(empfaenger)
    }

    /// Publiziert ein Event an alle erreichbaren Mitglieder eines Raums
    ///
    /// Gibt das publizierte Event zurueck, auch mit leerer Empfaengerliste.
    pub async fn broadcast_to_room(
        &self,
        room_id: &RoomId,
        typ: &str,
        payload: Value,
        exclude: &[SocketId],
    ) -> ProcessorResult<BroadcastEvent> {
        let empfaenger = self.raum_empfaenger(room_id, exclude, &[]).await?;
        let event = BroadcastEvent::neu(typ, empfaenger, payload);
        self.veroeffentlichen(&event).await?;
        if self.pipeline_logs() {
            tracing::debug!(raum = %room_id, typ, empfaenger = event.recipients.len(), "Raum-Broadcast");
        }
        Ok(event)
    }

    /// Publiziert ein BroadcastEvent auf dem Outgoing-Channel
    pub async fn veroeffentlichen(&self, event: &BroadcastEvent) -> ProcessorResult<()> {
        self.inner
            .bus
            .publish(&self.inner.config.outgoing_channel, event.to_json()?)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    /// Verarbeitet eine rohe Bus-Nachricht vollstaendig
    ///
    /// Gibt die Anzahl der publizierten BroadcastEvents zurueck.
    pub async fn event_verarbeiten(&self, nachricht: &str) -> usize {
        let event = match GatewayEvent::parsen(nachricht) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(fehler = %e, "Ungueltiges GatewayEvent verworfen");
                return 0;
            }
        };
        let ctx = EventContext::neu(event);
        let typ = ctx.event_type().to_string();

        let Some(handler) = self.inner.handler.get(&typ).map(|h| Arc::clone(h.value())) else {
            tracing::warn!(typ = %typ, user = %ctx.user_id, "Kein Handler fuer Event-Typ – verworfen");
            return 0;
        };

        if self.pipeline_logs() {
            tracing::debug!(
                typ = %typ,
                user = %ctx.user_id,
                socket_id = %ctx.socket_id,
                raum = ?ctx.room_id,
                "GatewayEvent empfangen"
            );
        }

        let processor = self.clone();
        let ergebnis = AssertUnwindSafe(async move { handler(ctx, processor).await })
            .catch_unwind()
            .await;

        let events = match ergebnis {
            Ok(Ok(ergebnis)) => ergebnis.into_events(),
            Ok(Err(e)) => {
                tracing::error!(typ = %typ, fehler = ?e, "Processor-Handler fehlgeschlagen");
                return 0;
            }
            Err(_) => {
                tracing::error!(typ = %typ, "Processor-Handler mit Panic abgebrochen");
                return 0;
            }
        };

        let mut publiziert = 0;
        for event in &events {
            match self.veroeffentlichen(event).await {
                Ok(()) => publiziert += 1,
                Err(e) => {
                    tracing::error!(typ = %event.typ, fehler = %e, "BroadcastEvent nicht publiziert");
                }
            }
        }
        if self.pipeline_logs() {
            tracing::info!(typ = %typ, publiziert, "GatewayEvent verarbeitet");
        }
        publiziert
    }

    // -----------------------------------------------------------------------
    // Start / Stop
    // -----------------------------------------------------------------------

    pub fn laeuft(&self) -> bool {
        self.inner.laufzeit.lock().is_some()
    }

    /// Abonniert den Incoming-Channel und startet die Verarbeitung
    pub async fn start(&self) -> ProcessorResult<()> {
        if self.laeuft() {
            return Err(ProcessorError::LaeuftBereits);
        }
        let abo = self
            .inner
            .bus
            .subscribe(&self.inner.config.incoming_channel)
            .await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let schleife = tokio::spawn(self.clone().empfangs_schleife(abo, shutdown_rx));

        let verloren = {
            let mut laufzeit = self.inner.laufzeit.lock();
            if laufzeit.is_some() {
                Some((shutdown_tx, schleife))
            } else {
                *laufzeit = Some(Laufzeit {
                    shutdown_tx,
                    schleife,
                });
                None
            }
        };
        if let Some((shutdown_tx, schleife)) = verloren {
            // Paralleler start() hat gewonnen, eigenes Abonnement wieder abbauen
            let _ = shutdown_tx.send(true);
            let _ = schleife.await;
            return Err(ProcessorError::LaeuftBereits);
        }

        tracing::info!(
            incoming = %self.inner.config.incoming_channel,
            outgoing = %self.inner.config.outgoing_channel,
            handler = self.inner.handler.len(),
            "EventProcessor gestartet"
        );
        Ok(())
    }

    /// Beendet das Abonnement und wartet auf laufende Handler
    pub async fn stop(&self) -> ProcessorResult<()> {
        let Some(laufzeit) = self.inner.laufzeit.lock().take() else {
            return Err(ProcessorError::NichtGestartet);
        };
        let _ = laufzeit.shutdown_tx.send(true);
        if let Err(e) = laufzeit.schleife.await {
            tracing::warn!(fehler = %e, "Empfangs-Schleife nicht sauber beendet");
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();

        tracing::info!("EventProcessor gestoppt");
        Ok(())
    }

    async fn empfangs_schleife(self, mut abo: Subscription, mut shutdown_rx: watch::Receiver<bool>) {
        let channel = abo.channel().to_string();
        loop {
            tokio::select! {
                nachricht = abo.next() => match nachricht {
                    Some(n) => {
                        let processor = self.clone();
                        self.inner.tasks.spawn(async move {
                            processor.event_verarbeiten(&n).await;
                        });
                    }
                    None => {
                        tracing::error!(channel = %channel, "Bus-Abonnement beendet – Verarbeitung gestoppt");
                        break;
                    }
                },
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kollab_bus::InMemoryBus;

    #[tokio::test]
    async fn paralleler_start_abonniert_nur_einmal() {
        let bus = InMemoryBus::neu();
        let p = EventProcessor::neu(ProcessorConfig::default(), Arc::new(bus.clone()));
        let (a, b) = tokio::join!(p.start(), p.start());
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert!(matches!(
            if a.is_err() { a } else { b },
            Err(ProcessorError::LaeuftBereits)
        ));
        assert_eq!(bus.subscriber_count("events:gateway"), 1);

        p.stop().await.unwrap();
        assert_eq!(bus.subscriber_count("events:gateway"), 0);
    }

    #[tokio::test]
    async fn ohne_provider_keine_berechtigung() {
        let p = EventProcessor::neu(ProcessorConfig::default(), Arc::new(InMemoryBus::neu()));
        assert!(!p.check_permission(&"u".into(), &"r".into(), "write").await);
        assert!(matches!(
            p.raum_empfaenger(&"r".into(), &[], &[]).await,
            Err(ProcessorError::KeinAuthProvider)
        ));
    }

    #[tokio::test]
    async fn letzte_registrierung_gilt() {
        let p = EventProcessor::neu(ProcessorConfig::default(), Arc::new(InMemoryBus::neu()));
        p.register_event_handler("x", |_, _| async { Ok(()) });
        p.register_event_handler("x", |ctx: EventContext, _| async move {
            Ok(BroadcastEvent::neu("zweiter", vec![ctx.socket_id], Value::Null))
        });
        p.register_event_handler("a", |_, _| async { Ok(()) });
        assert_eq!(p.registered_event_types(), vec!["a", "x"]);

        let n = p
            .event_verarbeiten(r#"{"eventType":"x","userId":"u","socketId":"s","payload":null}"#)
            .await;
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn start_stop_fehler() {
        let p = EventProcessor::neu(ProcessorConfig::default(), Arc::new(InMemoryBus::neu()));
        assert!(matches!(p.stop().await, Err(ProcessorError::NichtGestartet)));
        p.start().await.unwrap();
        assert!(matches!(p.start().await, Err(ProcessorError::LaeuftBereits)));
        p.stop().await.unwrap();
        assert!(!p.laeuft());
    }
}
