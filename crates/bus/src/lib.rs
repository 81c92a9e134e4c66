//! kollab-bus – Publish/Subscribe-Transport
//!
//! Gateway- und Processor-Instanzen koordinieren sich ausschliesslich ueber
//! den Bus. Dieses Crate definiert die Schnittstelle (`PubSubTransport`) und
//! eine In-Process-Implementierung (`InMemoryBus`) fuer Single-Process-
//! Betrieb und Tests. Externe Busse (Redis, NATS) implementieren denselben
//! Trait.
//!
//! ## Semantik
//! - Nur Abonnenten die zum Publish-Zeitpunkt verbunden sind erhalten die Nachricht
//! - Keine Pufferung fuer abwesende Abonnenten
//! - Verbindungsverlust wird als `BusError::Getrennt` bzw. Ende des
//!   Abonnements sichtbar, Reconnect ist Sache des konkreten Transports

pub mod error;
pub mod memory;
pub mod transport;

pub use error::{BusError, BusResult};
pub use memory::InMemoryBus;
pub use transport::{BusConfig, PubSubTransport, Subscription};
