//! Gemeinsame Identifikationstypen fuer Kollab
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Auf dem Wire
//! sind sie einfache Strings (`#[serde(transparent)]`), da Gateway und
//! Processor die IDs von externen Clients uebernehmen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Erstellt eine ID aus einem beliebigen String
            pub fn neu(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Gibt die ID als `&str` zurueck
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Benutzer-ID (vom Client bzw. der Authentifizierung vergeben)
    UserId
);

string_id!(
    /// Raum-ID – logische Gruppe fuer Autorisierung und Broadcast
    RoomId
);

string_id!(
    /// Socket-ID – identifiziert eine einzelne Client-Verbindung eines Gateways
    SocketId
);

impl SocketId {
    /// Erstellt eine neue zufaellige SocketId
    pub fn zufaellig() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_id_eindeutig() {
        let a = SocketId::zufaellig();
        let b = SocketId::zufaellig();
        assert_ne!(a, b, "Zwei neue SocketIds muessen verschieden sein");
    }

    #[test]
    fn ids_sind_transparente_strings() {
        let uid = UserId::from("user1");
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, "\"user1\"");

        let raum: RoomId = serde_json::from_str("\"room123\"").unwrap();
        assert_eq!(raum.as_str(), "room123");
    }

    #[test]
    fn display_gibt_rohen_string_aus() {
        assert_eq!(SocketId::neu("socket1").to_string(), "socket1");
    }
}
