//! AuthProvider-Trait
//!
//! Feste Faehigkeits-Schnittstelle; die Implementierung wird bei der
//! Konstruktion gewaehlt und als `Arc<dyn AuthProvider>` weitergereicht.

use async_trait::async_trait;
use kollab_core::{RoomId, UserId};

use crate::error::AuthResult;

/// Raum-Mitgliedschaft und Berechtigungen
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Fuegt einen Benutzer einem Raum hinzu (idempotent)
    async fn add_user_to_room(&self, user_id: &UserId, room_id: &RoomId) -> AuthResult<()>;

    /// Entfernt einen Benutzer samt aller Berechtigungen aus einem Raum
    async fn remove_user_from_room(&self, user_id: &UserId, room_id: &RoomId)
        -> AuthResult<()>;

    /// Erteilt eine Berechtigung; der Benutzer wird dabei Mitglied des Raums
    async fn grant_permission(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        permission: &str,
    ) -> AuthResult<()>;

    /// Entzieht eine Berechtigung, unbekannte Kombinationen sind ein No-op
    async fn revoke_permission(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        permission: &str,
    ) -> AuthResult<()>;

    /// Alle Mitglieder eines Raums, leer fuer unbekannte Raeume
    async fn get_authorized_users_in_room(&self, room_id: &RoomId) -> AuthResult<Vec<UserId>>;

    /// Reine Abfrage, veraendert nie Zustand
    ///
    /// `false` fuer unbekannte Raeume, Benutzer oder Berechtigungen.
    async fn has_permission(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        permission: &str,
    ) -> AuthResult<bool>;
}
