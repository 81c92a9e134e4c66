//! # kollab-observability
//!
//! Structured Logging fuer alle Kollab-Prozesse via tracing-subscriber.

pub mod logging;

pub use logging::{logging_initialisieren, LogFormat, LogLevel, LoggingFehler};
