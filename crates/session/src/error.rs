//! Fehlertypen fuer den Session-Cache

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Store nicht erreichbar oder Operation fehlgeschlagen
    #[error("Session-Store Fehler: {0}")]
    Store(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
