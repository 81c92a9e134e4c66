//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Konfigdatei):
//! - `KOLLAB_LOG_LEVEL`: debug/info/warn/error oder eine EnvFilter-Direktive
//! - `KOLLAB_LOG_FORMAT`: text/json

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{fmt as tfmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "KOLLAB_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "KOLLAB_LOG_FORMAT";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoggingFehler {
    #[error("Unbekannter Log-Level: '{0}'")]
    UnbekannterLevel(String),

    #[error("Unbekanntes Log-Format: '{0}'")]
    UnbekanntesFormat(String),

    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Log-Level, geordnet DEBUG < INFO < WARN < ERROR
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// EnvFilter-Direktive fuer dieses Level
    pub fn filter(self) -> EnvFilter {
        EnvFilter::new(self.as_str())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggingFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(LoggingFehler::UnbekannterLevel(s.to_string())),
        }
    }
}

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(LoggingFehler::UnbekanntesFormat(s.to_string())),
        }
    }
}

/// Filter aus `KOLLAB_LOG_LEVEL` oder dem konfigurierten Level
///
/// Die Umgebungsvariable darf auch eine volle Direktive sein
/// (z.B. `kollab_gateway=debug,info`).
fn filter_bestimmen(level: LogLevel) -> EnvFilter {
    match std::env::var(ENV_LOG_LEVEL) {
        Ok(wert) => match wert.parse::<LogLevel>() {
            Ok(l) => l.filter(),
            Err(_) => EnvFilter::try_new(&wert).unwrap_or_else(|_| level.filter()),
        },
        Err(_) => level.filter(),
    }
}

fn format_bestimmen(format: LogFormat) -> LogFormat {
    std::env::var(ENV_LOG_FORMAT)
        .ok()
        .and_then(|f| f.parse().ok())
        .unwrap_or(format)
}

/// Initialisiert das Logging-System einmal pro Prozess.
///
/// Umgebungsvariablen ueberschreiben `level` und `format`.
pub fn logging_initialisieren(level: LogLevel, format: LogFormat) -> Result<(), LoggingFehler> {
    let filter = filter_bestimmen(level);

    let ergebnis = match format_bestimmen(format) {
        LogFormat::Json => tfmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => tfmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| LoggingFehler::BereitsInitialisiert(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordnung() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn level_parsen_ohne_gross_klein() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!(" Warn ".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("error".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!("".parse::<LogLevel>().is_err());
    }

    #[test]
    fn format_parsen() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn level_aus_toml() {
        #[derive(Deserialize)]
        struct Abschnitt {
            level: LogLevel,
            format: LogFormat,
        }
        let a: Abschnitt = toml::from_str("level = \"warn\"\nformat = \"json\"").unwrap();
        assert_eq!(a.level, LogLevel::Warn);
        assert_eq!(a.format, LogFormat::Json);
    }

    #[test]
    fn zweite_initialisierung_schlaegt_fehl() {
        // Erster Aufruf darf scheitern wenn ein anderer Test schon initialisiert hat
        let _ = logging_initialisieren(LogLevel::Error, LogFormat::Text);
        assert!(matches!(
            logging_initialisieren(LogLevel::Error, LogFormat::Text),
            Err(LoggingFehler::BereitsInitialisiert(_))
        ));
    }
}
