//! Bus-Envelopes (Gateway <-> Processor)
//!
//! - `GatewayEvent`: Client-Aktion die ein Gateway auf den Incoming-Channel legt
//! - `BroadcastEvent`: Ergebnis der Verarbeitung auf dem Outgoing-Channel,
//!   adressiert an Socket-IDs die zu beliebigen Gateways gehoeren koennen

use kollab_core::{ErrorCode, RoomId, SocketId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ProtokollFehler, ProtokollResult};
use crate::zeitstempel_ms;

/// Vom Gateway weitergeleitete Client-Aktion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    pub event_type: String,
    pub user_id: UserId,
    pub socket_id: SocketId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "zeitstempel_ms", deserialize_with = "crate::zeitstempel_lesen")]
    pub timestamp: i64,
}

impl GatewayEvent {
    pub fn neu(
        event_type: impl Into<String>,
        user_id: UserId,
        socket_id: SocketId,
        room_id: Option<RoomId>,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            user_id,
            socket_id,
            room_id,
            payload,
            timestamp: zeitstempel_ms(),
        }
    }

    /// Parst und validiert eine Bus-Nachricht
    ///
    /// `eventType`, `userId` und `socketId` muessen nicht-leere Strings sein.
    pub fn parsen(nachricht: &str) -> ProtokollResult<Self> {
        let event: Self = serde_json::from_str(nachricht)
            .map_err(|e| ProtokollFehler::UngueltigesBusEvent(e.to_string()))?;

        if event.event_type.is_empty() {
            return Err(ProtokollFehler::UngueltigesBusEvent(
                "Feld 'eventType' ist leer".into(),
            ));
        }
        if event.user_id.as_str().is_empty() {
            return Err(ProtokollFehler::UngueltigesBusEvent(
                "Feld 'userId' ist leer".into(),
            ));
        }
        if event.socket_id.as_str().is_empty() {
            return Err(ProtokollFehler::UngueltigesBusEvent(
                "Feld 'socketId' ist leer".into(),
            ));
        }
        Ok(event)
    }

    pub fn to_json(&self) -> ProtokollResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Berechnetes Event fuer eine Menge von Empfaenger-Sockets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    #[serde(rename = "type")]
    pub typ: String,
    pub recipients: Vec<SocketId>,
    #[serde(default)]
    pub payload: Value,
}

impl BroadcastEvent {
    pub fn neu(typ: impl Into<String>, recipients: Vec<SocketId>, payload: Value) -> Self {
        Self {
            typ: typ.into(),
            recipients,
            payload,
        }
    }

    /// Fehler-Broadcast (`type: "error"`) an einen einzelnen Socket
    pub fn fehler(
        empfaenger: SocketId,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::neu(
            "error",
            vec![empfaenger],
            json!({ "code": code.into(), "message": message.into() }),
        )
    }

    /// Fehler-Broadcast mit einem Standard-Code
    pub fn fehler_code(empfaenger: SocketId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::fehler(empfaenger, code, message)
    }

    pub fn parsen(nachricht: &str) -> ProtokollResult<Self> {
        serde_json::from_str(nachricht)
            .map_err(|e| ProtokollFehler::UngueltigesBusEvent(e.to_string()))
    }

    pub fn to_json(&self) -> ProtokollResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_event_camel_case() {
        let event = GatewayEvent::neu(
            "cursor:move",
            "user1".into(),
            "socket1".into(),
            Some("room123".into()),
            json!({"x": 1}),
        );
        let wert: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(wert["eventType"], "cursor:move");
        assert_eq!(wert["userId"], "user1");
        assert_eq!(wert["socketId"], "socket1");
        assert_eq!(wert["roomId"], "room123");
    }

    #[test]
    fn gateway_event_ohne_raum() {
        let event = GatewayEvent::parsen(
            r#"{"eventType":"ping","userId":"u","socketId":"s","payload":null,"timestamp":5}"#,
        )
        .unwrap();
        assert!(event.room_id.is_none());
        assert_eq!(event.timestamp, 5);
    }

    #[test]
    fn gateway_event_mit_gleitkomma_zeitstempel() {
        let event = GatewayEvent::parsen(
            r#"{"eventType":"cursor:move","userId":"u","socketId":"s","timestamp":1712345678901.5}"#,
        )
        .unwrap();
        assert_eq!(event.timestamp, 1_712_345_678_901);
    }

    #[test]
    fn gateway_event_pflichtfelder() {
        assert!(GatewayEvent::parsen(r#"{"userId":"u","socketId":"s"}"#).is_err());
        assert!(GatewayEvent::parsen(r#"{"eventType":"","userId":"u","socketId":"s"}"#).is_err());
        assert!(GatewayEvent::parsen(r#"{"eventType":"x","userId":"","socketId":"s"}"#).is_err());
        assert!(GatewayEvent::parsen("{}{").is_err());
    }

    #[test]
    fn fehler_broadcast_form() {
        let event = BroadcastEvent::fehler_code(
            "socket2".into(),
            ErrorCode::AccessDenied,
            "Keine Schreibberechtigung",
        );
        let wert: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(wert["type"], "error");
        assert_eq!(wert["recipients"], json!(["socket2"]));
        assert_eq!(wert["payload"]["code"], "ACCESS_DENIED");
    }
}
