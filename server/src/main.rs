//! Kollab Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use kollab_observability::logging_initialisieren;
use kollab_server::{config::KollabConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("KOLLAB_CONFIG").unwrap_or_else(|_| "kollab.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = KollabConfig::laden(&config_pfad)?;

    logging_initialisieren(config.logging.level, config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Kollab Server wird initialisiert"
    );

    let server = Server::neu(config)?;
    server.laufen().await
}
