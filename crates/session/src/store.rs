//! Geteilter Key-Value-Store
//!
//! Minimale Schnittstelle die ein externer Store (z.B. Redis) bereitstellen
//! muss. `MemoryStore` ist die In-Process-Variante; abgelaufene Eintraege
//! werden beim Zugriff verworfen.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::SessionResult;

/// String-Key-Value-Store mit optionaler Ablaufzeit pro Eintrag
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> SessionResult<Option<String>>;

    /// Setzt einen Wert, ueberschreibt einen vorhandenen (last-write-wins)
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> SessionResult<()>;

    /// Liest mehrere Keys in einem Aufruf, Ergebnis in Reihenfolge der Keys
    async fn get_many(&self, keys: &[String]) -> SessionResult<Vec<Option<String>>>;

    /// Loescht einen Key, `true` wenn er existierte
    async fn delete(&self, key: &str) -> SessionResult<bool>;

    /// Loescht einen Key nur wenn sein Wert noch `expected` ist
    async fn delete_if_eq(&self, key: &str, expected: &str) -> SessionResult<bool>;

    /// Loescht alle Keys mit dem Praefix, gibt die Anzahl zurueck
    async fn delete_prefix(&self, prefix: &str) -> SessionResult<usize>;
}

#[derive(Debug, Clone)]
struct Eintrag {
    wert: String,
    ablauf: Option<Instant>,
}

impl Eintrag {
    fn abgelaufen(&self, jetzt: Instant) -> bool {
        self.ablauf.is_some_and(|a| a <= jetzt)
    }
}

/// In-Process Key-Value-Store
#[derive(Debug, Default)]
pub struct MemoryStore {
    eintraege: DashMap<String, Eintrag>,
}

impl MemoryStore {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Anzahl gueltiger Eintraege
    pub fn len(&self) -> usize {
        let jetzt = Instant::now();
        self.eintraege
            .iter()
            .filter(|e| !e.value().abgelaufen(jetzt))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lesen(&self, key: &str) -> Option<String> {
        let jetzt = Instant::now();
        // Abgelaufene Eintraege beim Lesen entfernen
        self.eintraege
            .remove_if(key, |_, eintrag| eintrag.abgelaufen(jetzt));
        self.eintraege.get(key).map(|e| e.wert.clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> SessionResult<Option<String>> {
        Ok(self.lesen(key))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> SessionResult<()> {
        let ablauf = ttl.map(|d| Instant::now() + d);
        self.eintraege
            .insert(key.to_string(), Eintrag { wert: value, ablauf });
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> SessionResult<Vec<Option<String>>> {
        Ok(keys.iter().map(|k| self.lesen(k)).collect())
    }

    async fn delete(&self, key: &str) -> SessionResult<bool> {
        let jetzt = Instant::now();
        Ok(self
            .eintraege
            .remove(key)
            .is_some_and(|(_, e)| !e.abgelaufen(jetzt)))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> SessionResult<bool> {
        Ok(self
            .eintraege
            .remove_if(key, |_, eintrag| eintrag.wert == expected)
            .is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> SessionResult<usize> {
        let vorher = self.eintraege.len();
        self.eintraege.retain(|key, _| !key.starts_with(prefix));
        Ok(vorher - self.eintraege.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setzen_und_lesen() {
        let store = MemoryStore::neu();
        store.set("a", "1".into(), None).await.unwrap();
        store.set("a", "2".into(), None).await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("b").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn get_many_behaelt_reihenfolge() {
        let store = MemoryStore::neu();
        store.set("x", "1".into(), None).await.unwrap();
        store.set("z", "3".into(), None).await.unwrap();

        let werte = store
            .get_many(&["z".into(), "y".into(), "x".into()])
            .await
            .unwrap();
        assert_eq!(werte, vec![Some("3".into()), None, Some("1".into())]);
    }

    #[tokio::test]
    async fn ablauf_entfernt_eintrag() {
        let store = MemoryStore::neu();
        store
            .set("kurz", "1".into(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        store.set("lang", "2".into(), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("kurz").await.unwrap(), None);
        assert_eq!(store.get("lang").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn bedingtes_loeschen() {
        let store = MemoryStore::neu();
        store.set("k", "neu".into(), None).await.unwrap();

        assert!(!store.delete_if_eq("k", "alt").await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());
        assert!(store.delete_if_eq("k", "neu").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn praefix_loeschen() {
        let store = MemoryStore::neu();
        store.set("session:r1:u1", "s1".into(), None).await.unwrap();
        store.set("session:r1:u2", "s2".into(), None).await.unwrap();
        store.set("andere:x", "y".into(), None).await.unwrap();

        assert_eq!(store.delete_prefix("session:").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.delete("andere:x").await.unwrap());
        assert!(!store.delete("andere:x").await.unwrap());
    }
}
