//! kollab-processor – Verarbeitung von Client-Events ueber den Bus
//!
//! Der `EventProcessor` abonniert den Incoming-Channel, loest pro
//! `GatewayEvent` den registrierten Handler auf und publiziert dessen
//! `BroadcastEvent`s auf dem Outgoing-Channel. Gateway- und Processor-
//! Instanzen skalieren unabhaengig voneinander.
//!
//! ## Pipeline pro Event
//!
//! ```text
//! Bus (incoming) -> parsen -> EventContext -> Handler -> 0..n BroadcastEvent -> Bus (outgoing)
//!                      |                        |
//!                      +-- ungueltig: verwerfen +-- Fehler/Panic: loggen, nichts publizieren
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod processor;

// Bequeme Re-Exporte
pub use config::ProcessorConfig;
pub use context::EventContext;
pub use error::{ProcessorError, ProcessorResult};
pub use handler::HandlerErgebnis;
pub use processor::EventProcessor;
