//! kollab-gateway – Verbindungsseitige Schicht
//!
//! Terminiert Client-Verbindungen, korreliert Request/Response und verteilt
//! Events. Ueber die `GatewayBridge` ist das Gateway an den Bus angebunden.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket (axum, ws.rs)
//!     |  connection_opened / frame_received / connection_closed
//!     v
//! SocketServer
//!     |
//!     +-- ClientRegistry   (verbundene Clients, Send-Queues)
//!     +-- HandlerRegistry  (Request-Handler pro Typ, Event-Handler pro Typ)
//!     +-- Dispatcher       (Validierung, Dispatch nach `kind`, Fehler-Abbildung)
//!
//! GatewayBridge
//!     +-- Client-Events   -> GatewayEvent   -> Bus (incoming)
//!     +-- Bus (outgoing)  -> BroadcastEvent -> lokale Sockets
//! ```

pub mod bridge;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod ws;

// Bequeme Re-Exporte
pub use bridge::{BridgeConfig, GatewayBridge};
pub use connection::{ClientConnection, VerbindungsZustand};
pub use error::{GatewayError, GatewayResult};
pub use registry::ClientRegistry;
pub use server::{CorsConfig, ServerConfig, SocketServer};
