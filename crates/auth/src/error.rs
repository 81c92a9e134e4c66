//! Fehlertypen fuer den Auth-Provider

use thiserror::Error;

/// Alle moeglichen Fehler eines Auth-Providers
///
/// Die In-Memory-Variante schlaegt nie fehl; externe Provider (Datenbank,
/// Auth-Service) melden Verbindungsprobleme ueber `Backend`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Auth-Backend nicht erreichbar: {0}")]
    Backend(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Alias fuer den Auth-Provider
pub type AuthResult<T> = Result<T, AuthError>;
