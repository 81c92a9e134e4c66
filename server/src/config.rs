//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.
//!
//! ```toml
//! rolle = "alle"
//!
//! [gateway]
//! port = 3000
//! [gateway.cors]
//! origin = "*"
//!
//! [processor]
//! logging_aktiv = true
//!
//! [logging]
//! level = "info"
//!
//! [[raeume]]
//! raum = "projekt-1"
//! user = "alice"
//! rechte = ["write"]
//! ```

use kollab_bus::BusConfig;
use kollab_gateway::{BridgeConfig, ServerConfig};
use kollab_observability::{LogFormat, LogLevel};
use kollab_processor::ProcessorConfig;
use kollab_session::SessionCacheConfig;
use serde::{Deserialize, Serialize};

/// Welche Komponenten dieser Prozess betreibt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rolle {
    Gateway,
    Processor,
    #[default]
    Alle,
}

impl Rolle {
    pub fn mit_gateway(self) -> bool {
        matches!(self, Self::Gateway | Self::Alle)
    }

    pub fn mit_processor(self) -> bool {
        matches!(self, Self::Processor | Self::Alle)
    }
}

/// Vollstaendige Prozess-Konfiguration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KollabConfig {
    pub rolle: Rolle,
    pub gateway: GatewayEinstellungen,
    pub processor: ProcessorConfig,
    pub bus: BusConfig,
    pub sessions: SessionCacheConfig,
    pub logging: LoggingEinstellungen,
    /// Vorbelegte Raum-Mitgliedschaften fuer den In-Memory-AuthProvider
    pub raeume: Vec<RaumZugriff>,
}

/// Ein `[[raeume]]`-Eintrag: Mitgliedschaft plus Berechtigungen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaumZugriff {
    pub raum: String,
    pub user: String,
    pub rechte: Vec<String>,
}

/// SocketServer plus Bus-Bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayEinstellungen {
    #[serde(flatten)]
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl KollabConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    pub fn aus_toml(inhalt: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(inhalt)?;
        // Ein gemeinsamer [bus]-Abschnitt gilt auch fuer den Processor
        config.processor.bus = config.bus.clone();
        Ok(config)
    }

    /// Bind-Adresse des WebSocket-Gateways
    pub fn gateway_bind_adresse(&self) -> String {
        format!(
            "{}:{}",
            self.gateway.server.bind_adresse, self.gateway.server.port
        )
    }
}
