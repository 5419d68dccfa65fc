//! Fingerprint-keyed cache for loaded artifacts
//!
//! Entries are keyed by an xxh3 fingerprint of (path, modification time,
//! size), so a rewritten file is a different key. Each key owns a slot
//! mutex: concurrent requests for the same fingerprint wait for a single
//! load instead of loading twice. The cache is bounded (least recently used
//! entry evicted) and entries expire after a TTL.

use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

/// A cache entry with value and metadata
#[derive(Debug)]
struct CacheEntry<V> {
    value: Arc<V>,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: Arc<V>) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
            access_count: 1,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

type Slot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Fingerprint of a file: path, modification time and size
pub fn fingerprint(path: &Path) -> Result<u64> {
    let meta = std::fs::metadata(path)?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let path_str = path.to_string_lossy();
    let mut bytes = Vec::with_capacity(path_str.len() + 24);
    bytes.extend_from_slice(path_str.as_bytes());
    bytes.extend_from_slice(&mtime.to_le_bytes());
    bytes.extend_from_slice(&meta.len().to_le_bytes());
    Ok(xxh3_64(&bytes))
}

/// Bounded, TTL-expiring cache of shared artifacts
pub struct ArtifactCache<V> {
    capacity: usize,
    ttl: Duration,
    slots: Mutex<HashMap<u64, Slot<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
}

impl<V> ArtifactCache<V> {
    /// A capacity of zero disables caching (every call loads)
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            slots: Mutex::new(HashMap::with_capacity(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the cached artifact for `path`, loading it on a miss.
    ///
    /// Load errors are returned and not cached.
    pub fn get_or_load<F>(&self, path: &Path, load: F) -> Result<Arc<V>>
    where
        F: FnOnce(&Path) -> Result<V>,
    {
        if self.capacity == 0 {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.loads.fetch_add(1, Ordering::Relaxed);
            return load(path).map(Arc::new);
        }

        let key = fingerprint(path)?;
        let slot = {
            let mut slots = self.slots.lock();
            if !slots.contains_key(&key) && slots.len() >= self.capacity {
                self.evict(&mut slots);
            }
            slots.entry(key).or_default().clone()
        };

        // Held across the load: other callers for this key wait here
        let mut guard = slot.lock();
        if let Some(entry) = guard.as_mut() {
            if !entry.is_expired(self.ttl) {
                entry.last_accessed = Instant::now();
                entry.access_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value.clone());
            }
            debug!(path = %path.display(), "Cache entry expired");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.loads.fetch_add(1, Ordering::Relaxed);
        match load(path) {
            Ok(value) => {
                let value = Arc::new(value);
                *guard = Some(CacheEntry::new(value.clone()));
                debug!(path = %path.display(), fingerprint = key, "Cached artifact");
                Ok(value)
            }
            Err(err) => {
                *guard = None;
                Err(err)
            }
        }
    }

    /// Drop expired and empty slots, then the least recently used entry
    /// if still at capacity. Slots that are mid-load are skipped.
    fn evict(&self, slots: &mut HashMap<u64, Slot<V>>) {
        let ttl = self.ttl;
        let before = slots.len();
        slots.retain(|_, slot| match slot.try_lock() {
            Some(guard) => guard.as_ref().is_some_and(|e| !e.is_expired(ttl)),
            None => true,
        });
        let mut evicted = (before - slots.len()) as u64;

        if slots.len() >= self.capacity {
            let oldest = slots
                .iter()
                .filter_map(|(k, slot)| {
                    let guard = slot.try_lock()?;
                    guard.as_ref().map(|e| (*k, e.last_accessed))
                })
                .min_by_key(|(_, accessed)| *accessed)
                .map(|(k, _)| k);
            if let Some(k) = oldest {
                slots.remove(&k);
                evicted += 1;
            }
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    pub fn invalidate(&self, path: &Path) -> bool {
        match fingerprint(path) {
            Ok(key) => self.slots.lock().remove(&key).is_some(),
            Err(_) => false,
        }
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
