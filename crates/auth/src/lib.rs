//! kollab-auth – Raum-Mitgliedschaft und Berechtigungen
//!
//! Dieses Crate implementiert:
//! - `AuthProvider`: austauschbare Schnittstelle fuer Mitgliedschaft und
//!   Berechtigungen pro (Raum, Benutzer)
//! - `MemoryAuthProvider`: In-Memory-Variante fuer Single-Instance-Betrieb
//!
//! Authentifizierung (Pruefung von Zugangsdaten) ist nicht Teil dieses Crates.

pub mod error;
pub mod memory;
pub mod provider;

// Bequeme Re-Exporte
pub use error::{AuthError, AuthResult};
pub use memory::MemoryAuthProvider;
pub use provider::AuthProvider;
