use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// String-keyed in-memory cache whose entries expire after a per-entry TTL.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live value for `key`; an entry at or past its expiry is evicted.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set_at(&self, key: impl Into<String>, value: V, ttl: Duration, now: DateTime<Utc>) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), CacheEntry { value, expires_at });
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, Utc::now());
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key).map(|entry| entry.value)
    }

    /// Drops every key starting with `prefix`, or everything when `prefix` is `None`.
    pub fn flush(&self, prefix: Option<&str>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        match prefix {
            Some(prefix) => entries.retain(|key, _| !key.starts_with(prefix)),
            None => entries.clear(),
        }
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn entry_expires_exactly_at_ttl() {
        let cache = TtlCache::new();
        cache.set_at("search:a", 1u32, Duration::from_secs(60), at(0));

        assert_eq!(cache.get_at("search:a", at(59)), Some(1));
        assert_eq!(cache.get_at("search:a", at(60)), None);
        assert!(cache.is_empty(), "expired entry is evicted on read");
    }

    #[test]
    fn flush_by_prefix_keeps_other_keys() {
        let cache = TtlCache::new();
        let ttl = Duration::from_secs(60);
        cache.set_at("search:a", 1u32, ttl, at(0));
        cache.set_at("search:b", 2u32, ttl, at(0));
        cache.set_at("consent:u1", 3u32, ttl, at(0));

        assert_eq!(cache.flush(Some("search:")), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at("consent:u1", at(1)), Some(3));

        assert_eq!(cache.flush(None), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_returns_value() {
        let cache = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(5));
        assert_eq!(cache.remove("k").as_deref(), Some("v"));
        assert_eq!(cache.get("k"), None);
    }
}
