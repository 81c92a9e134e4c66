//! Kontext eines einzelnen GatewayEvents

use kollab_core::{KollabError, RoomId, SocketId, UserId};
use kollab_protocol::GatewayEvent;

/// Eingabe eines Processor-Handlers
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub event: GatewayEvent,
    pub user_id: UserId,
    pub socket_id: SocketId,
    pub room_id: Option<RoomId>,
}

impl EventContext {
    pub fn neu(event: GatewayEvent) -> Self {
        Self {
            user_id: event.user_id.clone(),
            socket_id: event.socket_id.clone(),
            room_id: event.room_id.clone(),
            event,
        }
    }

    /// Raum des Events, `KollabError::RaumFehlt` wenn keiner angegeben ist
    pub fn raum(&self) -> Result<&RoomId, KollabError> {
        self.room_id.as_ref().ok_or(KollabError::RaumFehlt)
    }

    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }
}
