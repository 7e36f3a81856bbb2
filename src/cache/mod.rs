//! TTL cache of resolved definitions on top of a `KvStore`.
//!
//! Expiry is lazy: an entry older than the TTL is deleted by the read that finds it.
//! Storage failures never surface from `get`/`set`; they degrade to a miss or to
//! "returned but not cached".

pub mod store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::fetch::{ResolvedDefinition, Source};
use store::{KvStore, StoreError};

/// Namespace shared by every versioned entry key.
pub const KEY_PREFIX: &str = "ts:cache:";
/// Single-object cache layout that predates per-entry keys.
pub const LEGACY_BLOB_KEY: &str = "ts:onlineCache";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    version: String,
    term: String,
    lang: String,
    source: Source,
}

impl CacheKey {
    pub fn new(version: &str, term: &str, lang: &str, source: Source) -> Self {
        Self {
            version: version.to_string(),
            term: term.to_string(),
            lang: lang.to_string(),
            source,
        }
    }
}

/// Renders the storage key `ts:cache:{version}|{term}|{lang}|{source}`.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{KEY_PREFIX}{}|{}|{}|{}",
            self.version, self.term, self.lang, self.source
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Epoch milliseconds.
    pub stored_at: u64,
    pub value: ResolvedDefinition,
}

pub struct CacheStore {
    store: Box<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    version: String,
}

impl CacheStore {
    pub fn new(
        store: Box<dyn KvStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        version: &str,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            version: version.to_string(),
        }
    }

    pub fn key(&self, term: &str, lang: &str, source: Source) -> CacheKey {
        CacheKey::new(&self.version, term, lang, source)
    }

    /// Live entry for `key`, or `None` on miss, expiry, or storage error.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let storage_key = key.to_string();
        let raw = match self.store.get(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "discarding undecodable cache entry");
                self.evict(&storage_key).await;
                return None;
            }
        };

        let age = self.clock.now_ms().saturating_sub(entry.stored_at);
        if u128::from(age) > self.ttl.as_millis() {
            debug!(key = %storage_key, age_ms = age, "cache entry expired");
            self.evict(&storage_key).await;
            return None;
        }

        Some(entry)
    }

    /// Store `value` stamped with the current time, replacing any previous entry.
    pub async fn set(&self, key: &CacheKey, value: &ResolvedDefinition) {
        let storage_key = key.to_string();
        let entry = CacheEntry {
            stored_at: self.clock.now_ms(),
            value: value.clone(),
        };
        let result = match serde_json::to_value(&entry) {
            Ok(raw) => self.store.set(&storage_key, raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(key = %storage_key, error = %e, "cache write failed; result not cached");
        }
    }

    /// Remove every entry under the cache namespace plus the legacy blob.
    ///
    /// Returns the number of namespaced entries removed.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let mut doomed: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(KEY_PREFIX))
            .collect();
        let removed = doomed.len();
        doomed.push(LEGACY_BLOB_KEY.to_string());
        self.store.remove(&doomed).await?;
        debug!(removed, "cache cleared");
        Ok(removed)
    }

    async fn evict(&self, storage_key: &str) {
        if let Err(e) = self.store.remove(&[storage_key.to_string()]).await {
            warn!(key = %storage_key, error = %e, "failed to evict cache entry");
        }
    }
}
