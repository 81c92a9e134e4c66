//! SocketServer – Verbindungen, Handler-Registrierung, Lebenszyklus
//!
//! Der Server ist transportunabhaengig: der konkrete Transport (`ws.rs`)
//! meldet nur `connection_opened`, `frame_received` und `connection_closed`.
//! Tests benutzen dieselbe Schnittstelle direkt.
//!
//! ## Shutdown
//! `stop()` signalisiert ueber einen `watch`-Channel, nimmt keine neuen
//! Verbindungen mehr an, wartet auf laufende Handler (`TaskTracker`) und
//! gibt danach den Listener frei.

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use kollab_core::SocketId;
use kollab_protocol::{Event, Request};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::connection::ClientConnection;
use crate::dispatcher::{Dispatcher, HandlerRegistry};
use crate::error::{GatewayError, GatewayResult};
use crate::registry::ClientRegistry;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// CORS-Einstellungen des WebSocket-Endpunkts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Erlaubte Origin, `*` erlaubt alle
    pub origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: "*".into(),
        }
    }
}

/// Konfiguration des SocketServers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_adresse: String,
    /// TCP-Port, 0 waehlt einen freien Port
    pub port: u16,
    /// Pfad des WebSocket-Endpunkts
    pub pfad: String,
    pub cors: CorsConfig,
    /// Groesse der Send-Queue pro Client
    pub send_queue_groesse: usize,
    /// Intervall fuer `serverStats`-Events in Sekunden (0 = aus)
    pub stats_intervall_sek: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 3000,
            pfad: "/ws".into(),
            cors: CorsConfig::default(),
            send_queue_groesse: 256,
            stats_intervall_sek: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// SocketServer
// ---------------------------------------------------------------------------

/// Hook der nach dem Trennen einer Verbindung laeuft
pub type DisconnectHook = Arc<dyn Fn(Arc<ClientConnection>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Gateway-Server fuer Client-Verbindungen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SocketServer {
    inner: Arc<SocketServerInner>,
}

struct SocketServerInner {
    config: ServerConfig,
    clients: ClientRegistry,
    dispatcher: Dispatcher,
    tasks: TaskTracker,
    disconnect_hooks: RwLock<Vec<DisconnectHook>>,
    laufzeit: Mutex<Option<Laufzeit>>,
    gestartet: Instant,
}

/// Zustand eines laufenden Servers
struct Laufzeit {
    shutdown_tx: watch::Sender<bool>,
    server_task: JoinHandle<()>,
    adresse: SocketAddr,
}

impl SocketServer {
    pub fn neu(config: ServerConfig) -> Self {
        let tasks = TaskTracker::new();
        Self {
            inner: Arc::new(SocketServerInner {
                dispatcher: Dispatcher::neu(Arc::new(HandlerRegistry::neu()), tasks.clone()),
                config,
                clients: ClientRegistry::neu(),
                tasks,
                disconnect_hooks: RwLock::new(Vec::new()),
                laufzeit: Mutex::new(None),
                gestartet: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.inner.clients
    }

    // -----------------------------------------------------------------------
    // Handler-Registrierung
    // -----------------------------------------------------------------------

    /// Registriert den Handler fuer einen Request-Typ (ersetzt einen vorhandenen)
    pub fn register_request_handler<F, Fut>(&self, typ: impl Into<String>, handler: F)
    where
        F: Fn(Request, Arc<ClientConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.inner.dispatcher.handler().request_registrieren(typ, handler);
    }

    /// Fuegt einen Handler fuer einen Event-Typ hinzu
    pub fn register_event_handler<F, Fut>(&self, typ: impl Into<String>, handler: F)
    where
        F: Fn(Event, Arc<ClientConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.dispatcher.handler().event_registrieren(typ, handler);
    }

    /// Registriert einen Hook fuer getrennte Verbindungen
    ///
    /// Hooks laufen nacheinander, nachdem die Verbindung die Registry
    /// verlassen hat und bevor ihre Metadaten verworfen werden.
    pub fn on_disconnect<F, Fut>(&self, hook: F)
    where
        F: Fn(Arc<ClientConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: DisconnectHook = Arc::new(move |conn| hook(conn).boxed());
        self.inner.disconnect_hooks.write().push(hook);
    }

    pub fn registered_request_types(&self) -> Vec<String> {
        self.inner.dispatcher.handler().request_typen()
    }

    pub fn registered_event_types(&self) -> Vec<String> {
        self.inner.dispatcher.handler().event_typen()
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Sendet ein Event an genau einen Client
    pub fn emit_to_client(&self, socket_id: &SocketId, event: Event) -> bool {
        match self.inner.clients.get(socket_id) {
            Some(client) => client.emit(event),
            None => {
                tracing::debug!(socket_id = %socket_id, typ = %event.typ, "Event an unbekannten Client");
                false
            }
        }
    }

    /// Sendet ein Event an alle zum Aufrufzeitpunkt verbundenen Clients
    pub fn emit_to_all(&self, event: Event) -> usize {
        self.inner.clients.event_an_alle(event)
    }

    pub fn connected_clients_count(&self) -> usize {
        self.inner.clients.anzahl()
    }

    /// Laufzeit des Servers in Sekunden
    pub fn uptime_sek(&self) -> f64 {
        self.inner.gestartet.elapsed().as_secs_f64()
    }

    // -----------------------------------------------------------------------
    // Verbindungs-Lebenszyklus (vom Transport aufgerufen)
    // -----------------------------------------------------------------------

    /// Registriert eine neue Verbindung mit frischer Socket-ID
    ///
    /// Der Transport liest die ausgehenden Frames aus dem Receiver.
    pub fn connection_opened(&self) -> (Arc<ClientConnection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.inner.config.send_queue_groesse.max(1));
        let verbindung = Arc::new(ClientConnection::neu(SocketId::zufaellig(), tx));
        self.inner.clients.registrieren(Arc::clone(&verbindung));
        tracing::info!(
            socket_id = %verbindung.id(),
            verbunden = self.inner.clients.anzahl(),
            "Client verbunden"
        );
        (verbindung, rx)
    }

    /// Verarbeitet einen eingehenden Text-Frame einer Verbindung
    pub fn frame_received(&self, verbindung: &Arc<ClientConnection>, frame: &str) {
        self.inner.dispatcher.frame_verarbeiten(verbindung, frame);
    }

    /// Entfernt eine Verbindung und fuehrt die Disconnect-Hooks aus
    pub async fn connection_closed(&self, socket_id: &SocketId) {
        let Some(verbindung) = self.inner.clients.entfernen(socket_id) else {
            return;
        };
        tracing::info!(
            socket_id = %socket_id,
            dauer_sek = verbindung.verbunden_sek(),
            "Client getrennt"
        );

        let hooks: Vec<DisconnectHook> = self.inner.disconnect_hooks.read().clone();
        for hook in hooks {
            let conn = Arc::clone(&verbindung);
            if AssertUnwindSafe(async move { hook(conn).await })
                .catch_unwind()
                .await
                .is_err()
            {
                tracing::error!(socket_id = %socket_id, "Disconnect-Hook mit Panic abgebrochen");
            }
        }

        verbindung.trennen();
    }

    // -----------------------------------------------------------------------
    // Start / Stop
    // -----------------------------------------------------------------------

    pub fn laeuft(&self) -> bool {
        self.inner.laufzeit.lock().is_some()
    }

    /// Gebundene Adresse des laufenden Servers
    pub fn lokale_adresse(&self) -> Option<SocketAddr> {
        self.inner.laufzeit.lock().as_ref().map(|l| l.adresse)
    }

    /// Bindet den Listener und startet den WebSocket-Transport
    ///
    /// Gibt die tatsaechlich gebundene Adresse zurueck (relevant bei Port 0).
    pub async fn start(&self) -> GatewayResult<SocketAddr> {
        if self.laeuft() {
            return Err(GatewayError::LaeuftBereits);
        }

        let bind = format!("{}:{}", self.inner.config.bind_adresse, self.inner.config.port);
        let listener = tokio::net::TcpListener::bind(bind.as_str()).await?;
        let adresse = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = crate::ws::router(self.clone(), shutdown_rx.clone());

        let server_shutdown = shutdown_rx.clone();
        let server_task = tokio::spawn(async move {
            let ergebnis = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_abwarten(server_shutdown))
                .await;
            if let Err(e) = ergebnis {
                tracing::error!(fehler = %e, "WebSocket-Server beendet mit Fehler");
            }
        });

        if self.inner.config.stats_intervall_sek > 0 {
            self.stats_starten(
                Duration::from_secs(self.inner.config.stats_intervall_sek),
                shutdown_rx,
            );
        }

        let mut laufzeit = self.inner.laufzeit.lock();
        if laufzeit.is_some() {
            // Paralleler start() hat gewonnen
            drop(laufzeit);
            let _ = shutdown_tx.send(true);
            return Err(GatewayError::LaeuftBereits);
        }
        *laufzeit = Some(Laufzeit {
            shutdown_tx,
            server_task,
            adresse,
        });

        tracing::info!(adresse = %adresse, pfad = %self.inner.config.pfad, "SocketServer gestartet");
        Ok(adresse)
    }

    /// Stoppt den Server
    ///
    /// Schliesst alle Verbindungen, wartet auf laufende Handler und gibt den
    /// Listener frei. Ohne vorheriges `start()` -> `GatewayError::NichtGestartet`.
    pub async fn stop(&self) -> GatewayResult<()> {
        let Some(laufzeit) = self.inner.laufzeit.lock().take() else {
            return Err(GatewayError::NichtGestartet);
        };
        tracing::info!("SocketServer: Shutdown eingeleitet");

        let _ = laufzeit.shutdown_tx.send(true);

        // Laufende Handler und Sessions abschliessen lassen
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();

        if let Err(e) = laufzeit.server_task.await {
            tracing::warn!(fehler = %e, "Server-Task nicht sauber beendet");
        }

        // Verbliebene Verbindungen (ohne Transport-Session) trennen
        for verbindung in self.inner.clients.leeren() {
            verbindung.trennen();
        }

        tracing::info!("SocketServer gestoppt");
        Ok(())
    }

    /// Handle fuer Transport-Sessions, damit `stop()` auf sie wartet
    pub(crate) fn session_token(&self) -> tokio_util::task::task_tracker::TaskTrackerToken {
        self.inner.tasks.token()
    }

    fn stats_starten(&self, intervall: Duration, shutdown_rx: watch::Receiver<bool>) {
        let server = self.clone();
        self.inner.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(intervall);
            // Ersten sofortigen Tick ueberspringen
            ticker.tick().await;
            let shutdown = shutdown_abwarten(shutdown_rx);
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        server.stats_senden();
                    }
                    _ = &mut shutdown => break,
                }
            }
        });
    }

    /// Sendet `serverStats` an alle Clients, sofern welche verbunden sind
    pub fn stats_senden(&self) -> usize {
        let anzahl = self.connected_clients_count();
        tracing::debug!(verbunden = anzahl, "Server-Statistik");
        if anzahl == 0 {
            return 0;
        }
        self.emit_to_all(Event::neu(
            "serverStats",
            json!({
                "connectedClients": anzahl,
                "uptime": self.uptime_sek(),
                "timestamp": kollab_protocol::zeitstempel_ms(),
            }),
        ))
    }
}

/// Wartet bis das Shutdown-Signal `true` ist oder der Sender wegfaellt
pub(crate) async fn shutdown_abwarten(mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_adresse: "127.0.0.1".into(),
            port: 0,
            stats_intervall_sek: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn emit_to_all_erreicht_nur_verbundene() {
        let server = SocketServer::neu(test_config());
        let (_a, mut rx_a) = server.connection_opened();
        let (b, mut rx_b) = server.connection_opened();
        server.connection_closed(b.id()).await;

        assert_eq!(server.emit_to_all(Event::neu("hallo", Value::Null)), 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(server.connected_clients_count(), 1);
    }

    #[tokio::test]
    async fn emit_to_client_nur_ein_empfaenger() {
        let server = SocketServer::neu(test_config());
        let (a, mut rx_a) = server.connection_opened();
        let (_b, mut rx_b) = server.connection_opened();

        assert!(server.emit_to_client(a.id(), Event::neu("nur_a", Value::Null)));
        assert!(!server.emit_to_client(&"unbekannt".into(), Event::neu("x", Value::Null)));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn socket_ids_sind_eindeutig() {
        let server = SocketServer::neu(test_config());
        let (a, _ra) = server.connection_opened();
        let (b, _rb) = server.connection_opened();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn disconnect_hook_sieht_metadaten() {
        let server = SocketServer::neu(test_config());
        let gesehen = Arc::new(Mutex::new(None));
        let g = Arc::clone(&gesehen);
        server.on_disconnect(move |conn| {
            let g = Arc::clone(&g);
            async move {
                *g.lock() = conn.get_metadata_str("userId");
            }
        });

        let (conn, _rx) = server.connection_opened();
        conn.set_metadata("userId", "user1");
        server.connection_closed(conn.id()).await;
        // Doppeltes Schliessen ist ein No-op
        server.connection_closed(conn.id()).await;

        assert_eq!(gesehen.lock().as_deref(), Some("user1"));
        assert!(conn.get_metadata("userId").is_none());
    }

    #[tokio::test]
    async fn stop_ohne_start_ist_fehler() {
        let server = SocketServer::neu(test_config());
        assert!(matches!(server.stop().await, Err(GatewayError::NichtGestartet)));
    }

    #[tokio::test]
    async fn start_stop_zyklus() {
        let server = SocketServer::neu(test_config());
        let adresse = server.start().await.unwrap();
        assert_ne!(adresse.port(), 0);
        assert!(matches!(server.start().await, Err(GatewayError::LaeuftBereits)));

        server.stop().await.unwrap();
        assert!(!server.laeuft());
        assert!(matches!(server.stop().await, Err(GatewayError::NichtGestartet)));
    }

    #[tokio::test]
    async fn stop_wartet_auf_laufende_handler() {
        let server = SocketServer::neu(test_config());
        let fertig = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fertig);
        server.register_request_handler("langsam", move |_, _| {
            let f = Arc::clone(&f);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                f.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        });

        server.start().await.unwrap();
        let (conn, _rx) = server.connection_opened();
        server.frame_received(&conn, r#"{"id":"1","kind":"request","type":"langsam"}"#);
        server.stop().await.unwrap();

        assert_eq!(fertig.load(Ordering::SeqCst), 1);
        assert_eq!(server.connected_clients_count(), 0);
    }

    #[tokio::test]
    async fn stats_nur_mit_clients() {
        let server = SocketServer::neu(test_config());
        assert_eq!(server.stats_senden(), 0);

        let (_c, mut rx) = server.connection_opened();
        assert_eq!(server.stats_senden(), 1);
        let wert: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(wert["type"], "serverStats");
        assert_eq!(wert["payload"]["connectedClients"], 1);
    }
}
