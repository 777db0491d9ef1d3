//! File-based resolution caches (address store and coordinate store).
//!
//! One flat JSON object per store: string key to value-or-null. A present
//! null is a durable negative result and must never trigger a re-fetch;
//! only a missing key may. Entries are never evicted: the dataset is
//! bounded and re-runs are expected to be served almost entirely from here.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Outcome of a cache lookup. "Attempted and failed" is distinct from
/// "never attempted"; only `Miss` is allowed to cause network I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Miss,
    NegativeHit,
    Hit(V),
}

/// A persistent key-value store with negative-result support.
pub struct CacheStore<V> {
    path: PathBuf,
    entries: HashMap<String, Option<V>>,
}

impl<V> CacheStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Load a store from `path`. A missing or corrupt file yields an empty
    /// store; the first run starts from nothing.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::read_file(&path).unwrap_or_default();
        Self { path, entries }
    }

    fn read_file(path: &Path) -> Option<HashMap<String, Option<V>>> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    pub fn get(&self, key: &str) -> Lookup<V> {
        match self.entries.get(key) {
            None => Lookup::Miss,
            Some(None) => Lookup::NegativeHit,
            Some(Some(v)) => Lookup::Hit(v.clone()),
        }
    }

    /// Record an outcome for `key`. `None` marks the key as attempted and
    /// failed so later runs skip it.
    pub fn put(&mut self, key: impl Into<String>, value: Option<V>) {
        self.entries.insert(key.into(), value);
    }

    /// Write the whole store to disk. Goes through a temp file in the same
    /// directory and renames over the target, so a crash mid-write leaves
    /// the previous file intact.
    pub fn flush(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }

    /// Total entries, negative ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that resolved to a value.
    pub fn resolved_len(&self) -> usize {
        self.entries.values().filter(|v| v.is_some()).count()
    }
}
