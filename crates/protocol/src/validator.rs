//! Frame-Validierung und -Parsing
//!
//! Ein eingehender Frame durchlaeuft zwei Stufen:
//! 1. `validieren` – Pflichtfelder `id`, `type`, `kind` vorhanden und korrekt typisiert
//! 2. `Message::aus_envelope` – Umwandlung in die Variante nach `kind`
//!
//! Jeder Fehler ergibt `ProtokollFehler::UngueltigeNachricht` (`INVALID_MESSAGE`).
//! Die Korrelations-ID wird mitgegeben, sobald sie aus dem Rohframe lesbar ist.

use serde_json::Value;

use crate::envelope::{Envelope, Message, MessageKind};
use crate::error::{ProtokollFehler, ProtokollResult};

/// Prueft Praesenz und Grundtypisierung von `id`, `type` und `kind`
pub fn validieren(roh: &Value) -> ProtokollResult<()> {
    let objekt = roh
        .as_object()
        .ok_or_else(|| ProtokollFehler::ungueltig("Nachricht ist kein JSON-Objekt"))?;

    let id = objekt.get("id").and_then(Value::as_str).map(str::to_string);
    let fehler = |grund: &str| ProtokollFehler::UngueltigeNachricht {
        grund: grund.to_string(),
        id: id.clone(),
    };

    match objekt.get("id") {
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(Value::String(_)) => return Err(fehler("Feld 'id' ist leer")),
        Some(_) => return Err(fehler("Feld 'id' muss ein String sein")),
        None => return Err(fehler("Feld 'id' fehlt")),
    }

    match objekt.get("type") {
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(Value::String(_)) => return Err(fehler("Feld 'type' ist leer")),
        Some(_) => return Err(fehler("Feld 'type' muss ein String sein")),
        None => return Err(fehler("Feld 'type' fehlt")),
    }

    match objekt.get("kind").and_then(Value::as_str) {
        Some(kind) if MessageKind::aus_str(kind).is_some() => Ok(()),
        Some(kind) => Err(fehler(&format!("Unbekannte Nachrichtenart '{kind}'"))),
        None => Err(fehler("Feld 'kind' fehlt oder ist kein String")),
    }
}

/// Validiert und parst einen Text-Frame in eine `Message`
pub fn frame_parsen(frame: &str) -> ProtokollResult<Message> {
    let roh: Value = serde_json::from_str(frame)
        .map_err(|e| ProtokollFehler::ungueltig(format!("Kein gueltiges JSON: {e}")))?;

    validieren(&roh)?;

    let id = roh.get("id").and_then(Value::as_str).map(str::to_string);
    let envelope: Envelope =
        serde_json::from_value(roh).map_err(|e| ProtokollFehler::UngueltigeNachricht {
            grund: e.to_string(),
            id: id.clone(),
        })?;

    Message::aus_envelope(envelope).map_err(|e| match e {
        ProtokollFehler::UngueltigeNachricht { grund, id: None } => {
            ProtokollFehler::UngueltigeNachricht { grund, id }
        }
        andere => andere,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gueltiger_request_wird_geparst() {
        let frame = r#"{"id":"r1","kind":"request","type":"calculate","payload":{"a":1},"timestamp":1}"#;
        match frame_parsen(frame).unwrap() {
            Message::Request(r) => {
                assert_eq!(r.id, "r1");
                assert_eq!(r.typ, "calculate");
                assert_eq!(r.payload["a"], 1);
            }
            andere => panic!("Erwartet Request, erhalten {andere:?}"),
        }
    }

    #[test]
    fn fehlender_timestamp_und_payload_sind_erlaubt() {
        let frame = r#"{"id":"e1","kind":"event","type":"chat"}"#;
        match frame_parsen(frame).unwrap() {
            Message::Event(e) => {
                assert_eq!(e.payload, Value::Null);
                assert!(e.timestamp > 0);
            }
            andere => panic!("Erwartet Event, erhalten {andere:?}"),
        }
    }

    #[test]
    fn gleitkomma_zeitstempel_ist_gueltig() {
        let frame = r#"{"id":"t1","kind":"request","type":"echo","timestamp":1712345678901.5}"#;
        match frame_parsen(frame).unwrap() {
            Message::Request(r) => {
                assert_eq!(r.id, "t1");
                assert_eq!(r.timestamp, 1_712_345_678_901);
            }
            andere => panic!("Erwartet Request, erhalten {andere:?}"),
        }
    }

    #[test]
    fn kein_json_ergibt_fehler_ohne_id() {
        let fehler = frame_parsen("kein json").unwrap_err();
        assert_eq!(fehler.code(), kollab_core::ErrorCode::InvalidMessage);
        assert!(fehler.korrelations_id().is_none());
    }

    #[test]
    fn fehlender_typ_behaelt_korrelations_id() {
        let fehler = frame_parsen(r#"{"id":"r7","kind":"request"}"#).unwrap_err();
        assert_eq!(fehler.korrelations_id(), Some("r7"));
    }

    #[test]
    fn unbekannte_art_wird_abgelehnt() {
        let fehler = validieren(&json!({"id":"1","kind":"stream","type":"x"})).unwrap_err();
        assert!(fehler.to_string().contains("stream"));
    }

    #[test]
    fn falsch_typisierte_id_wird_abgelehnt() {
        assert!(validieren(&json!({"id":5,"kind":"event","type":"x"})).is_err());
        assert!(validieren(&json!({"id":"","kind":"event","type":"x"})).is_err());
        assert!(validieren(&json!([1, 2, 3])).is_err());
    }
}
