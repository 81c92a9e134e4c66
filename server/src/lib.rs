//! kollab-server – Bibliotheks-Root
//!
//! Verdrahtet Gateway, Bus-Bridge und Event-Processor je nach konfigurierter
//! Rolle und stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Result};
use config::KollabConfig;
use kollab_auth::MemoryAuthProvider;
use kollab_bus::{BusConfig, InMemoryBus};
use kollab_core::{RoomId, UserId};
use kollab_gateway::handlers::basis_handler_registrieren;
use kollab_gateway::{GatewayBridge, SocketServer};
use kollab_processor::handlers::collab_handler_registrieren;
use kollab_processor::EventProcessor;
use kollab_session::{MemoryStore, StoreSessionCache};

/// Gateway-Teil eines Prozesses
struct Gateway {
    server: SocketServer,
    bridge: GatewayBridge,
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    config: KollabConfig,
    bus: InMemoryBus,
    auth: Arc<MemoryAuthProvider>,
    gateway: Option<Gateway>,
    processor: Option<EventProcessor>,
}

/// Oeffnet den konfigurierten Bus
///
/// Nur der In-Process-Bus ist eingebaut; externe Busse werden ueber
/// `PubSubTransport` angebunden.
fn bus_verbinden(config: &BusConfig) -> Result<InMemoryBus> {
    if !config.url.starts_with("memory://") {
        bail!("Bus-URL '{}' wird nicht unterstuetzt (nur memory://)", config.url);
    }
    Ok(InMemoryBus::neu())
}

impl Server {
    /// Erstellt alle Komponenten der konfigurierten Rolle
    pub fn neu(config: KollabConfig) -> Result<Self> {
        let bus = bus_verbinden(&config.bus)?;
        let auth = Arc::new(MemoryAuthProvider::mit_rechten(config.raeume.iter().map(
            |eintrag| {
                (
                    RoomId::from(eintrag.raum.as_str()),
                    UserId::from(eintrag.user.as_str()),
                    eintrag.rechte.clone(),
                )
            },
        )));
        if !config.raeume.is_empty() {
            tracing::info!(eintraege = config.raeume.len(), "Raum-Berechtigungen vorbelegt");
        }
        let sessions = Arc::new(StoreSessionCache::neu(
            Arc::new(MemoryStore::neu()),
            config.sessions.clone(),
        ));

        let gateway = config.rolle.mit_gateway().then(|| {
            let server = SocketServer::neu(config.gateway.server.clone());
            basis_handler_registrieren(&server);
            let bridge = GatewayBridge::neu(
                server.clone(),
                Arc::new(bus.clone()),
                sessions.clone(),
                config.gateway.bridge.clone(),
            );
            Gateway { server, bridge }
        });

        let processor = config.rolle.mit_processor().then(|| {
            let processor = EventProcessor::neu(config.processor.clone(), Arc::new(bus.clone()));
            processor.set_auth_provider(auth.clone());
            processor.set_session_cache(sessions.clone());
            collab_handler_registrieren(&processor);
            processor
        });

        Ok(Self {
            config,
            bus,
            auth,
            gateway,
            processor,
        })
    }

    pub fn config(&self) -> &KollabConfig {
        &self.config
    }

    pub fn bus(&self) -> &InMemoryBus {
        &self.bus
    }

    /// Vorbelegt aus `[[raeume]]`, zur Laufzeit von aussen gepflegt
    pub fn auth(&self) -> &Arc<MemoryAuthProvider> {
        &self.auth
    }

    pub fn socket_server(&self) -> Option<&SocketServer> {
        self.gateway.as_ref().map(|g| &g.server)
    }

    pub fn processor(&self) -> Option<&EventProcessor> {
        self.processor.as_ref()
    }

    /// Startet alle Komponenten
    ///
    /// Reihenfolge:
    /// 1. Event-Processor (Incoming-Channel)
    /// 2. Bus-Bridge (Outgoing-Channel)
    /// 3. WebSocket-Listener
    ///
    /// Gibt die Adresse des Gateways zurueck, falls eines laeuft.
    pub async fn starten(&self) -> Result<Option<SocketAddr>> {
        tracing::info!(
            rolle = ?self.config.rolle,
            bus = %self.config.bus.url,
            "Server startet"
        );

        if let Some(processor) = &self.processor {
            processor.start().await?;
        }

        let Some(gateway) = &self.gateway else {
            return Ok(None);
        };
        gateway.bridge.start().await?;
        let adresse = gateway.server.start().await?;
        tracing::info!(adresse = %adresse, pfad = %self.config.gateway.server.pfad, "Gateway bereit");
        Ok(Some(adresse))
    }

    /// Stoppt alle Komponenten in umgekehrter Start-Reihenfolge
    pub async fn stoppen(&self) -> Result<()> {
        if let Some(gateway) = &self.gateway {
            gateway.server.stop().await?;
            gateway.bridge.stop().await?;
        }
        if let Some(processor) = &self.processor {
            processor.stop().await?;
        }
        tracing::info!("Server gestoppt");
        Ok(())
    }

    /// Startet, wartet auf Ctrl-C und stoppt wieder
    pub async fn laufen(&self) -> Result<()> {
        self.starten().await?;

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        self.stoppen().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Rolle;

    #[test]
    fn rolle_bestimmt_komponenten() {
        let gateway = Server::neu(KollabConfig {
            rolle: Rolle::Gateway,
            ..Default::default()
        })
        .unwrap();
        assert!(gateway.socket_server().is_some());
        assert!(gateway.processor().is_none());

        let processor = Server::neu(KollabConfig {
            rolle: Rolle::Processor,
            ..Default::default()
        })
        .unwrap();
        assert!(processor.socket_server().is_none());
        assert_eq!(
            processor.processor().unwrap().registered_event_types(),
            vec!["canvas:save", "chat:message", "cursor:move", "user:typing"]
        );
    }

    #[tokio::test]
    async fn raeume_aus_config_sind_vorbelegt() {
        use kollab_auth::AuthProvider;

        let config = KollabConfig::aus_toml(
            r#"
            [[raeume]]
            raum = "projekt-1"
            user = "alice"
            rechte = ["write"]

            [[raeume]]
            raum = "projekt-1"
            user = "bob"
            "#,
        )
        .unwrap();
        let server = Server::neu(config).unwrap();
        let raum = RoomId::from("projekt-1");
        let auth = server.auth();
        assert!(auth.has_permission(&"alice".into(), &raum, "write").await.unwrap());
        assert!(!auth.has_permission(&"bob".into(), &raum, "write").await.unwrap());
        assert_eq!(
            auth.get_authorized_users_in_room(&raum).await.unwrap(),
            vec![UserId::from("alice"), UserId::from("bob")]
        );
    }

    #[test]
    fn externer_bus_wird_abgelehnt() {
        let mut config = KollabConfig::default();
        config.bus.url = "redis://localhost:6379".into();
        assert!(Server::neu(config).is_err());
    }

    #[tokio::test]
    async fn nur_processor_startet_ohne_listener() {
        let server = Server::neu(KollabConfig {
            rolle: Rolle::Processor,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(server.starten().await.unwrap(), None);
        assert_eq!(server.bus().subscriber_count("events:gateway"), 1);
        server.stoppen().await.unwrap();
    }
}
