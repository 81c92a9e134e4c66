//! kollab-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Kollab-Crates gemeinsam genutzt werden: die ID-Newtypes fuer
//! Benutzer, Raeume und Sockets sowie den zentralen Fehler-Enum mit den
//! stabilen Fehler-Codes des Wire-Protokolls.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{ErrorCode, KollabError, Result};
pub use types::{RoomId, SocketId, UserId};
