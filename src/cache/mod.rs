//! Memoized results of resolution.
//!
//! The [`ResultCache`] maps a [`CacheKey`] (value name plus parameter binding)
//! to the resolved [`Value`]. Each key is written at most once: the first
//! write wins and later writes for the same key are ignored. Entries live
//! until the cache is cleared.
//!
//! The cache can be exported as a [`CacheSnapshot`] and restored into another
//! cache, so a surrounding application can carry results across process runs
//! in whatever file format it prefers.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{Params, Value};

/// Identity of one cached value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Spec name or output name.
    pub name: String,
    /// Caller-supplied parameter binding.
    pub params: Params,
}

impl CacheKey {
    /// Build a key.
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, self.params)
        }
    }
}

/// One exported cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Spec name or output name.
    pub name: String,
    /// Parameter binding.
    #[serde(default)]
    pub params: Params,
    /// Cached value.
    pub value: Value,
}

/// Serializable copy of a cache's contents, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Entries in key order.
    pub entries: Vec<SnapshotEntry>,
}

/// Concurrent write-once store of resolved values.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<CacheKey, Value>,
}

impl ResultCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The value cached under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Whether `key` has a value.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Store `value` under `key` unless the key already has a value.
    ///
    /// Returns `true` when the value was stored.
    pub fn insert(&self, key: CacheKey, value: Value) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => {
                tracing::trace!(target: "cache", "Keeping existing entry for {}", existing.key());
                false
            }
            Entry::Vacant(slot) => {
                tracing::trace!(target: "cache", "Caching {}", slot.key());
                slot.insert(value);
                true
            }
        }
    }

    /// Number of cached values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Export every entry, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut entries: Vec<SnapshotEntry> = self
            .entries
            .iter()
            .map(|entry| SnapshotEntry {
                name: entry.key().name.clone(),
                params: entry.key().params.clone(),
                value: entry.value().clone(),
            })
            .collect();
        entries.sort_by(|a, b| (&a.name, &a.params).cmp(&(&b.name, &b.params)));
        CacheSnapshot {
            entries,
        }
    }

    /// Import entries whose keys are not cached yet.
    ///
    /// Returns the number of entries imported.
    pub fn restore(&self, snapshot: CacheSnapshot) -> usize {
        let total = snapshot.entries.len();
        let imported = snapshot
            .entries
            .into_iter()
            .filter(|entry| {
                self.insert(CacheKey::new(entry.name.clone(), entry.params.clone()), entry.value.clone())
            })
            .count();
        tracing::debug!(target: "cache", "Restored {} of {} snapshot entries", imported, total);
        imported
    }
}
