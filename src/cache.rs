//! Time-bounded key/value cache.
//!
//! Every entry shares one time-to-live. Expired entries are removed lazily on `get`; there is
//! no background sweeper. A TTL of zero disables caching entirely.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

use crate::error::RideError;

#[derive(Debug)]
pub struct ExpiringCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K: Eq + Hash, V: Clone> ExpiringCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        ExpiringCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Build a cache from a TTL in (fractional) seconds. Negative or non-finite values are
    /// rejected.
    pub fn from_secs(ttl: f64) -> Result<Self, RideError> {
        if !ttl.is_finite() || ttl < 0.0 {
            return Err(RideError::Data(format!(
                "cache time-to-live must be a non-negative number of seconds, got {ttl}"
            )));
        }
        Ok(Self::new(Duration::from_secs_f64(ttl)))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn put(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let expiry = Instant::now() + self.ttl;
        self.entries.lock().insert(key, (value, expiry));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expiry)) if Instant::now() < *expiry => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key).map(|(value, _)| value)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
