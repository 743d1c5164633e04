//! In-memory cache with per-entry expiry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A small keyed cache where every entry expires after a fixed TTL.
///
/// Expired entries are evicted lazily on access; there is no background
/// sweeper. Suitable for short-lived conversational state, not for
/// anything durable.
#[derive(Debug)]
pub struct ExpiringCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> ExpiringCache<K, V> {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert or replace an entry, resetting its TTL.
    pub fn insert(&self, key: K, value: V) {
        let deadline = Instant::now() + self.ttl;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (deadline, value));
        }
    }

    /// Fetch a live entry; expired entries count as absent and are removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((deadline, value)) if *deadline > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remove and return a live entry.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        let (deadline, value) = entries.remove(key)?;
        (deadline > Instant::now()).then_some(value)
    }

    /// Drop every expired entry.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (deadline, _)| *deadline > now);
        }
    }

    /// Number of entries, live or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
