//! WebSocket-Transport (axum)
//!
//! Ein Endpunkt (`ServerConfig::pfad`), pro Verbindung eine Session:
//! - Lese-Schleife: Text-Frames -> `SocketServer::frame_received`
//! - Sende-Task: Send-Queue der Verbindung -> WebSocket
//! - Shutdown-Signal oder Close-Frame beendet die Session, danach
//!   `SocketServer::connection_closed`

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{oneshot, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::{shutdown_abwarten, CorsConfig, SocketServer};

#[derive(Clone)]
struct WsState {
    server: SocketServer,
    shutdown_rx: watch::Receiver<bool>,
}

/// Erstellt den Router mit WebSocket-Endpunkt und CORS-Layer
pub(crate) fn router(server: SocketServer, shutdown_rx: watch::Receiver<bool>) -> Router {
    let pfad = server.config().pfad.clone();
    let cors = cors_layer(&server.config().cors);

    Router::new()
        .route(&pfad, get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(WsState {
            server,
            shutdown_rx,
        })
}

/// CORS konfigurieren: `*` erlaubt jede Origin, sonst genau die konfigurierte
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.origin.trim() == "*" {
        return CorsLayer::permissive();
    }
    match config.origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(Any),
        Err(e) => {
            tracing::warn!(origin = %config.origin, fehler = %e, "Ungueltige CORS-Origin – keine Origin erlaubt");
            CorsLayer::new()
        }
    }
}

async fn ws_upgrade(State(state): State<WsState>, ws: WebSocketUpgrade) -> Response {
    // stop() wartet auf alle Sessions
    let token = state.server.session_token();
    ws.on_upgrade(move |socket| async move {
        session_ausfuehren(socket, state.server, state.shutdown_rx).await;
        drop(token);
    })
}

async fn session_ausfuehren(
    socket: WebSocket,
    server: SocketServer,
    shutdown_rx: watch::Receiver<bool>,
) {
    let (verbindung, mut ausgang_rx) = server.connection_opened();
    let socket_id = verbindung.id().clone();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Sende-Task: Queue -> WebSocket
    let (ende_tx, mut ende_rx) = oneshot::channel::<()>();
    let sende_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                frame = ausgang_rx.recv() => match frame {
                    Some(frame) => {
                        if ws_tx.send(WsMessage::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                },
                _ = &mut ende_rx => {
                    // Bereits eingereihte Frames noch zustellen
                    while let Ok(frame) = ausgang_rx.try_recv() {
                        if ws_tx.send(WsMessage::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                    break;
                }
            }
        }
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    });

    let shutdown = shutdown_abwarten(shutdown_rx);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            nachricht = ws_rx.next() => match nachricht {
                Some(Ok(WsMessage::Text(text))) => server.frame_received(&verbindung, &text),
                Some(Ok(WsMessage::Binary(daten))) => match std::str::from_utf8(&daten) {
                    Ok(text) => server.frame_received(&verbindung, text),
                    Err(_) => {
                        tracing::debug!(socket_id = %socket_id, laenge = daten.len(), "Binaer-Frame ist kein UTF-8 – verworfen");
                    }
                },
                Some(Ok(WsMessage::Close(_))) | None => break,
                // Ping/Pong beantwortet axum selbst
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(socket_id = %socket_id, fehler = %e, "WebSocket-Lesefehler");
                    break;
                }
            },
            _ = &mut shutdown => {
                tracing::debug!(socket_id = %socket_id, "Session: Shutdown-Signal empfangen");
                break;
            }
        }
    }

    server.connection_closed(&socket_id).await;
    let _ = ende_tx.send(());
    if let Err(e) = sende_task.await {
        tracing::warn!(socket_id = %socket_id, fehler = %e, "Sende-Task abgebrochen");
    }
}
