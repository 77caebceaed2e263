//! Cache de lecture en mémoire, avec expiration optionnelle par entrée.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Source de l'heure courante, remplaçable dans les tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Value,
    pub written_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Une entrée est valide tant qu'elle n'a pas d'expiration ou que celle-ci est dans le futur.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// Les entrées expirées ne sont retirées qu'à leur prochaine lecture.
#[derive(Debug, Default)]
pub struct Cache {
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renvoie la donnée si elle est encore valide, sinon retire l'entrée.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => Some(entry.data.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: &str, data: Value, now: DateTime<Utc>, ttl: Option<Duration>) {
        let entry = CacheEntry {
            data,
            written_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        self.entries.insert(key.to_owned(), entry);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Libère le cache et toutes ses entrées.
    pub fn dispose(self) {}

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Date d'écriture de chaque entrée, expirée ou non
    pub fn last_access(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.written_at))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-15T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_entry_without_expiry_never_expires() {
        let mut cache = Cache::new();
        cache.insert("k", json!(1), start(), None);
        assert_eq!(cache.get("k", start() + Duration::days(365)), Some(json!(1)));
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let mut cache = Cache::new();
        cache.insert("k", json!("v"), start(), Some(Duration::minutes(5)));

        assert_eq!(cache.get("k", start() + Duration::minutes(4)), Some(json!("v")));
        assert_eq!(cache.len(), 1);

        // L'expiration est exclusive: à l'instant exact, l'entrée n'est plus valide
        assert_eq!(cache.get("k", start() + Duration::minutes(5)), None);
        assert!(cache.is_empty(), "Expired entry should be evicted by the read");
    }

    #[test]
    fn test_expired_entries_are_not_swept() {
        let mut cache = Cache::new();
        cache.insert("old", json!(1), start(), Some(Duration::minutes(1)));
        cache.insert("new", json!(2), start() + Duration::hours(1), None);

        assert_eq!(cache.get("new", start() + Duration::hours(1)), Some(json!(2)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.last_access()["old"], start());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = Cache::new();
        cache.insert("a", json!(1), start(), None);
        cache.insert("b", json!(2), start(), None);

        cache.remove("a");
        assert_eq!(cache.get("a", start()), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        cache.dispose();
    }
}
