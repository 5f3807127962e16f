//! Result memoization
//!
//! Derived matrices are pure functions of the input records plus a handful of
//! parameters, so they are memoized under a SHA-256 hash of that content.
//! Entries are immutable once stored; the oldest entry is evicted when the
//! cache is full.

use crate::error::ComputeError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use tracing::trace;

/// Default number of entries kept per cache
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Hex SHA-256 of the JSON encoding of `value`
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, ComputeError> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Bounded map from content hash to computed value
#[derive(Debug, Clone)]
pub struct MemoCache<V> {
    entries: HashMap<String, V>,
    order: VecDeque<String>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl<V> Default for MemoCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl<V> MemoCache<V> {
    /// Create a cache holding at most `capacity` entries (0 disables caching)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&V> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                trace!(key, "cache hit");
                Some(value)
            }
            None => {
                self.misses += 1;
                trace!(key, "cache miss");
                None
            }
        }
    }

    /// Store `value` under `key`. An existing entry is left untouched.
    pub fn insert(&mut self, key: String, value: V) {
        if self.capacity == 0 || self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

impl<V: Clone> MemoCache<V> {
    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn get_or_insert_with<F>(&mut self, key: String, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value.clone();
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }
}
