//! SessionCache-Trait und Store-basierte Implementierung

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kollab_core::{RoomId, SocketId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::SessionResult;
use crate::store::KeyValueStore;

/// Aufgeloeste Zuordnung pro angefragtem Benutzer (`None` = kein Socket)
pub type SocketZuordnung = Vec<(UserId, Option<SocketId>)>;

/// Geteilte Abbildung (Benutzer, Raum) -> Socket-ID
#[async_trait]
pub trait SessionCache: Send + Sync + 'static {
    /// Setzt die Zuordnung, eine vorhandene wird ueberschrieben
    async fn set_socket_mapping(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        socket_id: &SocketId,
    ) -> SessionResult<()>;

    /// Loest mehrere Benutzer eines Raums auf
    ///
    /// Ergebnis in Reihenfolge von `user_ids`; ein fehlender Eintrag laesst
    /// den Batch nie fehlschlagen.
    async fn get_socket_ids(
        &self,
        user_ids: &[UserId],
        room_id: &RoomId,
    ) -> SessionResult<SocketZuordnung>;

    /// Entfernt die Zuordnung, aber nur solange sie noch auf `socket_id` zeigt
    ///
    /// Gibt `true` zurueck wenn ein Eintrag entfernt wurde.
    async fn remove_socket_mapping(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        socket_id: &SocketId,
    ) -> SessionResult<bool>;

    /// Entfernt alle Zuordnungen
    async fn clear(&self) -> SessionResult<()>;
}

/// Konfiguration des Session-Caches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCacheConfig {
    /// Key-Praefix im geteilten Store
    pub praefix: String,
    /// Lebensdauer einer Zuordnung in Sekunden (0 = unbegrenzt)
    pub ttl_sek: u64,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            praefix: "session".into(),
            ttl_sek: 0,
        }
    }
}

impl SessionCacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_sek > 0).then(|| Duration::from_secs(self.ttl_sek))
    }
}

/// SessionCache ueber einem beliebigen `KeyValueStore`
///
/// Key-Schema: `{praefix}:{len(roomId)}:{roomId}:{userId}` -> `socketId`
///
/// Die Laenge der Raum-ID macht den Key eindeutig, auch wenn IDs `:` enthalten.
pub struct StoreSessionCache<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    config: SessionCacheConfig,
}

impl<S: KeyValueStore + ?Sized> StoreSessionCache<S> {
    pub fn neu(store: Arc<S>, config: SessionCacheConfig) -> Self {
        Self { store, config }
    }

    fn schluessel(&self, user_id: &UserId, room_id: &RoomId) -> String {
        let raum = room_id.as_str();
        format!("{}:{}:{}:{}", self.config.praefix, raum.len(), raum, user_id)
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> SessionCache for StoreSessionCache<S> {
    async fn set_socket_mapping(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        socket_id: &SocketId,
    ) -> SessionResult<()> {
        self.store
            .set(
                &self.schluessel(user_id, room_id),
                socket_id.to_string(),
                self.config.ttl(),
            )
            .await?;
        tracing::debug!(
            user = %user_id,
            raum = %room_id,
            socket = %socket_id,
            "Socket-Zuordnung gesetzt"
        );
        Ok(())
    }

    async fn get_socket_ids(
        &self,
        user_ids: &[UserId],
        room_id: &RoomId,
    ) -> SessionResult<SocketZuordnung> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = user_ids
            .iter()
            .map(|u| self.schluessel(u, room_id))
            .collect();
        let werte = self.store.get_many(&keys).await?;

        Ok(user_ids
            .iter()
            .cloned()
            .zip(werte.into_iter().map(|w| w.map(SocketId::from)))
            .collect())
    }

    async fn remove_socket_mapping(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        socket_id: &SocketId,
    ) -> SessionResult<bool> {
        let entfernt = self
            .store
            .delete_if_eq(&self.schluessel(user_id, room_id), socket_id.as_str())
            .await?;
        if entfernt {
            tracing::debug!(user = %user_id, raum = %room_id, "Socket-Zuordnung entfernt");
        }
        Ok(entfernt)
    }

    async fn clear(&self) -> SessionResult<()> {
        let anzahl = self
            .store
            .delete_prefix(&format!("{}:", self.config.praefix))
            .await?;
        tracing::debug!(anzahl, "Session-Cache geleert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache() -> (Arc<MemoryStore>, StoreSessionCache<MemoryStore>) {
        let store = Arc::new(MemoryStore::neu());
        let cache = StoreSessionCache::neu(Arc::clone(&store), SessionCacheConfig::default());
        (store, cache)
    }

    #[tokio::test]
    async fn letzter_schreiber_gewinnt() {
        let (_, cache) = cache();
        let (u, r) = (UserId::from("user1"), RoomId::from("room123"));
        cache.set_socket_mapping(&u, &r, &"s1".into()).await.unwrap();
        cache.set_socket_mapping(&u, &r, &"s2".into()).await.unwrap();

        let ergebnis = cache.get_socket_ids(&[u.clone()], &r).await.unwrap();
        assert_eq!(ergebnis, vec![(u, Some(SocketId::from("s2")))]);
    }

    #[tokio::test]
    async fn fehlender_eintrag_ist_none() {
        let (_, cache) = cache();
        let r = RoomId::from("room123");
        cache
            .set_socket_mapping(&"user2".into(), &r, &"socket2".into())
            .await
            .unwrap();

        let ergebnis = cache
            .get_socket_ids(&["user1".into(), "user2".into()], &r)
            .await
            .unwrap();
        assert_eq!(
            ergebnis,
            vec![
                (UserId::from("user1"), None),
                (UserId::from("user2"), Some(SocketId::from("socket2"))),
            ]
        );
        assert!(cache.get_socket_ids(&[], &r).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zuordnung_ist_pro_raum() {
        let (_, cache) = cache();
        let u = UserId::from("user1");
        cache
            .set_socket_mapping(&u, &"a".into(), &"s1".into())
            .await
            .unwrap();

        let ergebnis = cache.get_socket_ids(&[u], &"b".into()).await.unwrap();
        assert_eq!(ergebnis[0].1, None);
    }

    #[tokio::test]
    async fn entfernen_nur_fuer_eigenen_socket() {
        let (_, cache) = cache();
        let (u, r) = (UserId::from("user1"), RoomId::from("room123"));
        cache.set_socket_mapping(&u, &r, &"alt".into()).await.unwrap();
        cache.set_socket_mapping(&u, &r, &"neu".into()).await.unwrap();

        // Der alte Socket trennt sich nach dem Reconnect
        assert!(!cache
            .remove_socket_mapping(&u, &r, &"alt".into())
            .await
            .unwrap());
        let ergebnis = cache.get_socket_ids(&[u.clone()], &r).await.unwrap();
        assert_eq!(ergebnis[0].1, Some(SocketId::from("neu")));

        assert!(cache
            .remove_socket_mapping(&u, &r, &"neu".into())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn doppelpunkte_in_ids_kollidieren_nicht() {
        let (store, cache) = cache();
        cache
            .set_socket_mapping(&"x".into(), &"r:y".into(), &"anderer_raum".into())
            .await
            .unwrap();
        cache
            .set_socket_mapping(&"y:x".into(), &"r".into(), &"eigener_raum".into())
            .await
            .unwrap();
        assert_eq!(store.len(), 2);

        let ergebnis = cache
            .get_socket_ids(&["y:x".into()], &"r".into())
            .await
            .unwrap();
        assert_eq!(ergebnis[0].1, Some(SocketId::from("eigener_raum")));

        // Entfernen trifft nur den eigenen Eintrag
        assert!(!cache
            .remove_socket_mapping(&"y:x".into(), &"r".into(), &"anderer_raum".into())
            .await
            .unwrap());
        let ergebnis = cache
            .get_socket_ids(&["x".into()], &"r:y".into())
            .await
            .unwrap();
        assert_eq!(ergebnis[0].1, Some(SocketId::from("anderer_raum")));
    }

    #[tokio::test]
    async fn clear_betrifft_nur_eigenen_praefix() {
        let (store, cache) = cache();
        store.set("fremd", "x".into(), None).await.unwrap();
        cache
            .set_socket_mapping(&"u".into(), &"r".into(), &"s".into())
            .await
            .unwrap();

        cache.clear().await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("fremd").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ttl_aus_konfiguration() {
        let store = Arc::new(MemoryStore::neu());
        let cache = StoreSessionCache::neu(
            store,
            SessionCacheConfig {
                praefix: "s".into(),
                ttl_sek: 1,
            },
        );
        assert_eq!(cache.config.ttl(), Some(Duration::from_secs(1)));
        assert_eq!(SessionCacheConfig::default().ttl(), None);
    }
}
