//! kollab-session – Session-Affinitaet
//!
//! Bildet (Benutzer, Raum) auf die Socket-ID ab, ueber die der Benutzer
//! gerade im Raum verbunden ist. Gateways schreiben die Zuordnung, Processor
//! lesen sie um Empfaenger aufzuloesen. Der Cache liegt in einem
//! prozessuebergreifend geteilten Key-Value-Store (`KeyValueStore`).
//!
//! Eintraege koennen veraltet sein: ein fehlender oder veralteter Eintrag
//! bedeutet "kein zustellbarer Socket", nie einen Fehler.

pub mod cache;
pub mod error;
pub mod store;

pub use cache::{SessionCache, SessionCacheConfig, SocketZuordnung, StoreSessionCache};
pub use error::{SessionError, SessionResult};
pub use store::{KeyValueStore, MemoryStore};
