//! In-Memory AuthProvider
//!
//! Raum -> Benutzer -> Berechtigungen. Ein Benutzer ist Mitglied eines Raums
//! solange er einen Eintrag in dessen Map hat, auch mit leerer
//! Berechtigungsmenge.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use kollab_core::{RoomId, UserId};
use tokio::sync::RwLock;

use crate::error::AuthResult;
use crate::provider::AuthProvider;

type RaumMitglieder = HashMap<UserId, HashSet<String>>;

/// AuthProvider fuer Single-Instance-Betrieb und Tests
#[derive(Default)]
pub struct MemoryAuthProvider {
    raeume: RwLock<HashMap<RoomId, RaumMitglieder>>,
}

impl MemoryAuthProvider {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Erstellt den Provider mit vorbelegten Mitgliedschaften
    ///
    /// Jeder Eintrag macht den Benutzer zum Mitglied des Raums, auch mit
    /// leerer Rechteliste. Mehrfache Eintraege werden zusammengefuehrt.
    pub fn mit_rechten<I, R>(eintraege: I) -> Self
    where
        I: IntoIterator<Item = (RoomId, UserId, R)>,
        R: IntoIterator<Item = String>,
    {
        let mut raeume: HashMap<RoomId, RaumMitglieder> = HashMap::new();
        for (raum, user, rechte) in eintraege {
            raeume
                .entry(raum)
                .or_default()
                .entry(user)
                .or_default()
                .extend(rechte);
        }
        Self {
            raeume: RwLock::new(raeume),
        }
    }

    /// Anzahl bekannter Raeume
    pub async fn raum_anzahl(&self) -> usize {
        self.raeume.read().await.len()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn add_user_to_room(&self, user_id: &UserId, room_id: &RoomId) -> AuthResult<()> {
        let mut raeume = self.raeume.write().await;
        raeume
            .entry(room_id.clone())
            .or_default()
            .entry(user_id.clone())
            .or_default();
        tracing::debug!(user = %user_id, raum = %room_id, "Benutzer zum Raum hinzugefuegt");
        Ok(())
    }

    async fn remove_user_from_room(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> AuthResult<()> {
        let mut raeume = self.raeume.write().await;
        if let Some(mitglieder) = raeume.get_mut(room_id) {
            mitglieder.remove(user_id);
            if mitglieder.is_empty() {
                raeume.remove(room_id);
            }
            tracing::debug!(user = %user_id, raum = %room_id, "Benutzer aus Raum entfernt");
        }
        Ok(())
    }

    async fn grant_permission(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        permission: &str,
    ) -> AuthResult<()> {
        let mut raeume = self.raeume.write().await;
        raeume
            .entry(room_id.clone())
            .or_default()
            .entry(user_id.clone())
            .or_default()
            .insert(permission.to_string());
        tracing::debug!(
            user = %user_id,
            raum = %room_id,
            berechtigung = permission,
            "Berechtigung erteilt"
        );
        Ok(())
    }

    async fn revoke_permission(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        permission: &str,
    ) -> AuthResult<()> {
        let mut raeume = self.raeume.write().await;
        if let Some(rechte) = raeume
            .get_mut(room_id)
            .and_then(|mitglieder| mitglieder.get_mut(user_id))
        {
            rechte.remove(permission);
            tracing::debug!(
                user = %user_id,
                raum = %room_id,
                berechtigung = permission,
                "Berechtigung entzogen"
            );
        }
        Ok(())
    }

    async fn get_authorized_users_in_room(&self, room_id: &RoomId) -> AuthResult<Vec<UserId>> {
        let raeume = self.raeume.read().await;
        let mut benutzer: Vec<UserId> = raeume
            .get(room_id)
            .map(|mitglieder| mitglieder.keys().cloned().collect())
            .unwrap_or_default();
        // Deterministische Reihenfolge fuer Empfaengerlisten
        benutzer.sort();
        Ok(benutzer)
    }

    async fn has_permission(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        permission: &str,
    ) -> AuthResult<bool> {
        let raeume = self.raeume.read().await;
        Ok(raeume
            .get(room_id)
            .and_then(|mitglieder| mitglieder.get(user_id))
            .is_some_and(|rechte| rechte.contains(permission)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vorbelegte_rechte() {
        let auth = MemoryAuthProvider::mit_rechten(vec![
            (RoomId::from("r"), UserId::from("u1"), vec!["write".to_string()]),
            (RoomId::from("r"), UserId::from("u1"), vec!["read".to_string()]),
            (RoomId::from("r"), UserId::from("u2"), Vec::new()),
        ]);
        let r = RoomId::from("r");
        assert!(auth.has_permission(&"u1".into(), &r, "write").await.unwrap());
        assert!(auth.has_permission(&"u1".into(), &r, "read").await.unwrap());
        assert!(!auth.has_permission(&"u2".into(), &r, "read").await.unwrap());
        assert_eq!(
            auth.get_authorized_users_in_room(&r).await.unwrap(),
            vec![UserId::from("u1"), UserId::from("u2")]
        );
    }

    fn ids(user: &str, raum: &str) -> (UserId, RoomId) {
        (UserId::from(user), RoomId::from(raum))
    }

    #[tokio::test]
    async fn erteilte_berechtigung_ist_sichtbar() {
        let auth = MemoryAuthProvider::neu();
        let (u, r) = ids("user1", "room123");
        auth.grant_permission(&u, &r, "write").await.unwrap();

        assert!(auth.has_permission(&u, &r, "write").await.unwrap());
        assert!(!auth.has_permission(&u, &r, "admin").await.unwrap());
    }

    #[tokio::test]
    async fn entzogene_berechtigung_ist_weg() {
        let auth = MemoryAuthProvider::neu();
        let (u, r) = ids("user1", "room123");
        auth.grant_permission(&u, &r, "write").await.unwrap();
        auth.revoke_permission(&u, &r, "write").await.unwrap();

        assert!(!auth.has_permission(&u, &r, "write").await.unwrap());
        // Mitgliedschaft bleibt bestehen
        assert_eq!(auth.get_authorized_users_in_room(&r).await.unwrap(), vec![u]);
    }

    #[tokio::test]
    async fn unbekannter_raum_oder_benutzer_ist_false() {
        let auth = MemoryAuthProvider::neu();
        let (u, r) = ids("user1", "room123");
        assert!(!auth.has_permission(&u, &r, "write").await.unwrap());

        auth.add_user_to_room(&u, &r).await.unwrap();
        let fremd = UserId::from("user9");
        assert!(!auth.has_permission(&fremd, &r, "write").await.unwrap());
        assert_eq!(auth.raum_anzahl().await, 1, "Abfrage darf keinen Zustand anlegen");
    }

    #[tokio::test]
    async fn mitglieder_eines_raums() {
        let auth = MemoryAuthProvider::neu();
        let r = RoomId::from("room123");
        auth.add_user_to_room(&"user2".into(), &r).await.unwrap();
        auth.add_user_to_room(&"user1".into(), &r).await.unwrap();
        auth.add_user_to_room(&"user1".into(), &r).await.unwrap();
        auth.add_user_to_room(&"user3".into(), &"anderer".into()).await.unwrap();

        let mitglieder = auth.get_authorized_users_in_room(&r).await.unwrap();
        assert_eq!(mitglieder, vec![UserId::from("user1"), UserId::from("user2")]);
        assert!(auth
            .get_authorized_users_in_room(&"leer".into())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn entfernen_loescht_berechtigungen() {
        let auth = MemoryAuthProvider::neu();
        let (u, r) = ids("user1", "room123");
        auth.grant_permission(&u, &r, "write").await.unwrap();
        auth.remove_user_from_room(&u, &r).await.unwrap();

        assert!(!auth.has_permission(&u, &r, "write").await.unwrap());
        assert!(auth.get_authorized_users_in_room(&r).await.unwrap().is_empty());
        assert_eq!(auth.raum_anzahl().await, 0);

        // Unbekannte Kombination ist ein No-op
        auth.remove_user_from_room(&u, &r).await.unwrap();
        auth.revoke_permission(&u, &r, "write").await.unwrap();
    }
}
