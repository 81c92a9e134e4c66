//! Gateway-Bridge – Anbindung des SocketServers an den Bus
//!
//! ```text
//! Client-Event (weitergeleiteter Typ)
//!     -> GatewayEvent {eventType, userId, socketId, roomId?, payload}
//!     -> Bus (incoming_channel)
//!
//! Bus (outgoing_channel)
//!     -> BroadcastEvent {type, recipients, payload}
//!     -> Event an die lokal verbundenen Empfaenger
//! ```
//!
//! `room:join {userId, roomId}` ordnet die Verbindung einem Benutzer und Raum
//! zu und schreibt die Socket-Zuordnung in den Session-Cache. Beim Trennen
//! wird die Zuordnung wieder entfernt, sofern sie noch auf diesen Socket zeigt.

use std::sync::Arc;

use kollab_bus::{PubSubTransport, Subscription};
use kollab_core::{KollabError, RoomId, UserId};
use kollab_protocol::{BroadcastEvent, Event, GatewayEvent, Message};
use kollab_session::SessionCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::connection::ClientConnection;
use crate::error::{GatewayError, GatewayResult};
use crate::registry::ClientRegistry;
use crate::server::{shutdown_abwarten, SocketServer};

/// Metadaten-Schluessel der Benutzer-ID einer Verbindung
pub const META_USER_ID: &str = "userId";
/// Metadaten-Schluessel des aktuellen Raums einer Verbindung
pub const META_ROOM_ID: &str = "roomId";

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Channel fuer Client-Events (Gateway -> Processor)
    pub incoming_channel: String,
    /// Channel fuer berechnete Events (Processor -> Gateway)
    pub outgoing_channel: String,
    /// Client-Event-Typen die an den Bus weitergeleitet werden
    pub weitergeleitete_events: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            incoming_channel: "events:gateway".into(),
            outgoing_channel: "events:broadcast".into(),
            weitergeleitete_events: vec![
                "cursor:move".into(),
                "canvas:save".into(),
                "chat:message".into(),
                "user:typing".into(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// GatewayBridge
// ---------------------------------------------------------------------------

/// Verbindet einen SocketServer mit Bus und Session-Cache
pub struct GatewayBridge {
    server: SocketServer,
    geteilt: Arc<BridgeGeteilt>,
    laufzeit: Mutex<Option<BridgeLaufzeit>>,
}

/// Von den registrierten Handlern geteilter Zustand (ohne Server-Referenz)
struct BridgeGeteilt {
    bus: Arc<dyn PubSubTransport>,
    sessions: Arc<dyn SessionCache>,
    config: BridgeConfig,
}

struct BridgeLaufzeit {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GatewayBridge {
    /// Erstellt die Bridge und registriert ihre Handler am Server
    pub fn neu(
        server: SocketServer,
        bus: Arc<dyn PubSubTransport>,
        sessions: Arc<dyn SessionCache>,
        config: BridgeConfig,
    ) -> Self {
        let bridge = Self {
            server,
            geteilt: Arc::new(BridgeGeteilt {
                bus,
                sessions,
                config,
            }),
            laufzeit: Mutex::new(None),
        };
        bridge.handler_registrieren();
        bridge
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.geteilt.config
    }

    fn handler_registrieren(&self) {
        for typ in &self.geteilt.config.weitergeleitete_events {
            let geteilt = Arc::clone(&self.geteilt);
            self.server.register_event_handler(typ.clone(), move |event, conn| {
                let geteilt = Arc::clone(&geteilt);
                async move { geteilt.weiterleiten(event, &conn).await }
            });
        }

        let geteilt = Arc::clone(&self.geteilt);
        self.server.register_event_handler("room:join", move |event, conn| {
            let geteilt = Arc::clone(&geteilt);
            async move { geteilt.raum_beitreten(event, &conn).await }
        });

        let geteilt = Arc::clone(&self.geteilt);
        self.server.on_disconnect(move |conn| {
            let geteilt = Arc::clone(&geteilt);
            async move { geteilt.zuordnung_aufheben(&conn).await }
        });
    }

    /// Abonniert den Outgoing-Channel und startet die Zustellung
    pub async fn start(&self) -> GatewayResult<()> {
        if self.laufzeit.lock().is_some() {
            return Err(GatewayError::LaeuftBereits);
        }

        let abo = self
            .geteilt
            .bus
            .subscribe(&self.geteilt.config.outgoing_channel)
            .await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(zustell_schleife(
            abo,
            self.server.clients().clone(),
            shutdown_rx,
        ));

        *self.laufzeit.lock() = Some(BridgeLaufzeit { shutdown_tx, task });
        tracing::info!(
            incoming = %self.geteilt.config.incoming_channel,
            outgoing = %self.geteilt.config.outgoing_channel,
            "Gateway-Bridge gestartet"
        );
        Ok(())
    }

    /// Beendet die Zustellung; weitergeleitete Events werden weiter publiziert
    pub async fn stop(&self) -> GatewayResult<()> {
        let Some(laufzeit) = self.laufzeit.lock().take() else {
            return Err(GatewayError::NichtGestartet);
        };
        let _ = laufzeit.shutdown_tx.send(true);
        if let Err(e) = laufzeit.task.await {
            tracing::warn!(fehler = %e, "Zustell-Task nicht sauber beendet");
        }
        tracing::info!("Gateway-Bridge gestoppt");
        Ok(())
    }
}

impl BridgeGeteilt {
    /// Client-Event als GatewayEvent auf den Bus legen
    async fn weiterleiten(&self, event: Event, conn: &ClientConnection) -> anyhow::Result<()> {
        let user_id = conn.get_metadata_str(META_USER_ID).ok_or_else(|| {
            KollabError::UngueltigeNachricht(format!(
                "'{}' vor 'room:join' – Verbindung ist keinem Benutzer zugeordnet",
                event.typ
            ))
        })?;
        let room_id = conn.get_metadata_str(META_ROOM_ID).map(RoomId::from);

        let gateway_event = GatewayEvent::neu(
            event.typ,
            UserId::from(user_id),
            conn.id().clone(),
            room_id,
            event.payload,
        );
        let empfaenger = self
            .bus
            .publish(&self.config.incoming_channel, gateway_event.to_json()?)
            .await?;
        tracing::debug!(
            socket_id = %conn.id(),
            typ = %gateway_event.event_type,
            empfaenger,
            "Event an Bus weitergeleitet"
        );
        Ok(())
    }

    async fn raum_beitreten(&self, event: Event, conn: &ClientConnection) -> anyhow::Result<()> {
        let feld = |name: &str| -> Result<String, KollabError> {
            event
                .payload
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    KollabError::UngueltigeNutzdaten(format!("Feld '{name}' fehlt oder ist leer"))
                })
        };
        let user_id = UserId::from(feld("userId")?);
        let room_id = RoomId::from(feld("roomId")?);

        // Alte Zuordnung dieser Verbindung aufheben
        self.zuordnung_aufheben(conn).await;

        conn.set_metadata(META_USER_ID, user_id.as_str());
        conn.set_metadata(META_ROOM_ID, room_id.as_str());
        self.sessions
            .set_socket_mapping(&user_id, &room_id, conn.id())
            .await?;

        tracing::info!(socket_id = %conn.id(), user = %user_id, raum = %room_id, "Raum beigetreten");
        conn.emit(Event::neu(
            "room:joined",
            json!({
                "userId": user_id,
                "roomId": room_id,
                "socketId": conn.id(),
            }),
        ));
        Ok(())
    }

    async fn zuordnung_aufheben(&self, conn: &ClientConnection) {
        let (Some(user), Some(raum)) = (
            conn.get_metadata_str(META_USER_ID),
            conn.get_metadata_str(META_ROOM_ID),
        ) else {
            return;
        };
        if let Err(e) = self
            .sessions
            .remove_socket_mapping(&UserId::from(user), &RoomId::from(raum), conn.id())
            .await
        {
            tracing::warn!(socket_id = %conn.id(), fehler = %e, "Socket-Zuordnung nicht entfernt");
        }
    }
}

// ---------------------------------------------------------------------------
// Zustellung
// ---------------------------------------------------------------------------

async fn zustell_schleife(
    mut abo: Subscription,
    clients: ClientRegistry,
    shutdown_rx: watch::Receiver<bool>,
) {
    let shutdown = shutdown_abwarten(shutdown_rx);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            nachricht = abo.next() => match nachricht {
                Some(n) => {
                    broadcast_zustellen(&clients, &n);
                }
                None => {
                    tracing::error!(channel = %abo.channel(), "Bus-Abonnement beendet – Zustellung gestoppt");
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }
}

/// Stellt ein BroadcastEvent an die lokal verbundenen Empfaenger zu
///
/// Gibt die Anzahl der lokal zugestellten Frames zurueck.
pub fn broadcast_zustellen(clients: &ClientRegistry, nachricht: &str) -> usize {
    let broadcast = match BroadcastEvent::parsen(nachricht) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(fehler = %e, "Ungueltiges BroadcastEvent verworfen");
            return 0;
        }
    };
    if broadcast.recipients.is_empty() {
        return 0;
    }

    let empfaenger = broadcast.recipients;
    let frame = match Message::from(Event::neu(broadcast.typ, broadcast.payload)).to_json() {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(fehler = %e, "Event nicht serialisierbar");
            return 0;
        }
    };
    let zugestellt = clients.an_sockets_senden(&empfaenger, &frame);
    tracing::debug!(empfaenger = empfaenger.len(), zugestellt, "BroadcastEvent zugestellt");
    zugestellt
}
