//! Geocode cache shared across optimization runs.
//!
//! Entries are immutable: a lookup either returns a live entry or nothing, and
//! a fresh resolution replaces the whole entry (last write wins).

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use fxhash::FxHashMap;
use jiff::{SignedDuration, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{Accuracy, Coordinate};
use crate::traits::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCacheEntry {
    /// Normalized address key.
    pub key: String,
    pub coordinate: Coordinate,
    pub accuracy: Accuracy,
    pub confidence: f64,
    pub provider: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl GeocodeCacheEntry {
    pub fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct GeocodeCache {
    entries: RwLock<FxHashMap<String, Arc<GeocodeCacheEntry>>>,
    ttl: SignedDuration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl GeocodeCache {
    pub fn new(ttl_secs: i64, max_entries: usize) -> Self {
        Self::with_clock(ttl_secs, max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl_secs: i64, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            ttl: SignedDuration::from_secs(ttl_secs),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Returns the entry for `key` if it has not expired.
    pub fn get(&self, key: &str) -> Option<Arc<GeocodeCacheEntry>> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .cloned()
    }

    /// Writes a new entry for `key`, replacing any previous one.
    pub fn insert(
        &self,
        key: &str,
        coordinate: Coordinate,
        accuracy: Accuracy,
        confidence: f64,
        provider: &str,
    ) -> Arc<GeocodeCacheEntry> {
        let created_at = self.clock.now();
        let expires_at = created_at.checked_add(self.ttl).unwrap_or(Timestamp::MAX);
        let entry = Arc::new(GeocodeCacheEntry {
            key: key.to_string(),
            coordinate,
            accuracy,
            confidence: confidence.clamp(0.0, 1.0),
            provider: provider.to_string(),
            created_at,
            expires_at,
        });

        let mut entries = self.entries.write();
        entries.insert(key.to_string(), Arc::clone(&entry));
        if entries.len() > self.max_entries {
            Self::shrink(&mut entries, self.max_entries, created_at);
        }

        entry
    }

    /// Drops expired entries, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired geocode cache entries");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Writes every live entry to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let now = self.clock.now();
        let mut live: Vec<GeocodeCacheEntry> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.as_ref().clone())
            .collect();
        live.sort_by(|a, b| a.key.cmp(&b.key));

        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        serde_json::to_writer(&mut writer, &live)?;
        writer.flush()?;
        Ok(())
    }

    /// Loads live entries from `path`, returning how many were kept.
    pub fn load(&self, path: &Path) -> Result<usize, CacheError> {
        let file = std::fs::File::open(path)?;
        let stored: Vec<GeocodeCacheEntry> = serde_json::from_reader(file)?;
        let now = self.clock.now();

        let mut entries = self.entries.write();
        let mut kept = 0;
        for entry in stored.into_iter().filter(|entry| entry.is_live(now)) {
            entries.insert(entry.key.clone(), Arc::new(entry));
            kept += 1;
        }
        if entries.len() > self.max_entries {
            Self::shrink(&mut entries, self.max_entries, now);
        }

        debug!(kept, "loaded geocode cache");
        Ok(kept)
    }

    /// Removes expired entries, then the soonest-expiring ones, until `max` remain.
    fn shrink(entries: &mut FxHashMap<String, Arc<GeocodeCacheEntry>>, max: usize, now: Timestamp) {
        entries.retain(|_, entry| entry.is_live(now));
        if entries.len() <= max {
            return;
        }

        let mut by_expiry: Vec<(Timestamp, String)> = entries
            .iter()
            .map(|(key, entry)| (entry.expires_at, key.clone()))
            .collect();
        by_expiry.sort();

        let excess = entries.len() - max;
        for (_, key) in by_expiry.into_iter().take(excess) {
            entries.remove(&key);
        }
    }
}
