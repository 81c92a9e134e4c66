//! kollab-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Client und
//! Gateway (Envelope) sowie zwischen Gateway und Processor ueber den Bus
//! (`GatewayEvent`, `BroadcastEvent`) ausgetauscht werden.
//!
//! ## Design
//! - Request/Response Pattern: Request und Response teilen sich die `id`
//! - JSON-Serialisierung via serde, ein Objekt pro Frame bzw. Bus-Nachricht
//! - Validierung (`validator`) vor dem Parsen in die konkrete Variante
//! - Fehler-Abbildung (`error_mapping`) auf stabile `{code, message}`-Paare

pub mod bus;
pub mod envelope;
pub mod error;
pub mod error_mapping;
pub mod validator;

pub use bus::{BroadcastEvent, GatewayEvent};
pub use envelope::{
    Envelope, ErrorMessage, ErrorPayload, Event, Message, MessageKind, Request, Response,
    ResponseStatus,
};
pub use error::{ProtokollFehler, ProtokollResult};
pub use error_mapping::fehler_abbilden;
pub use validator::{frame_parsen, validieren};

/// Aktueller Zeitstempel in Millisekunden seit Unix-Epoch
pub fn zeitstempel_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Liest einen Zeitstempel aus einer beliebigen JSON-Zahl
///
/// Nachkommastellen werden abgeschnitten.
pub fn zeitstempel_lesen<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde::Deserialize;

    let zahl = serde_json::Number::deserialize(deserializer)?;
    if let Some(ganz) = zahl.as_i64() {
        return Ok(ganz);
    }
    match zahl.as_f64() {
        Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f.trunc() as i64),
        _ => Err(D::Error::custom(format!(
            "Zeitstempel ausserhalb des Wertebereichs: {zahl}"
        ))),
    }
}
