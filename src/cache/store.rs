use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local key-value persistence with JSON values.
///
/// Reads are answered from memory. Mutations may touch disk, so they are async,
/// and a mutation that returns an error has not taken effect.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Remove every listed key; missing keys are ignored.
    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), StoreError>>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys()
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).set(key, value)
    }

    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).remove(keys)
    }
}

type Map = BTreeMap<String, Value>;

fn lock(map: &Mutex<Map>) -> MutexGuard<'_, Map> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<Map>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.map).get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.map).keys().cloned().collect())
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>> {
        lock(&self.map).insert(key.to_string(), value);
        future::ready(Ok(())).boxed()
    }

    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), StoreError>> {
        let mut map = lock(&self.map);
        for key in keys {
            map.remove(key);
        }
        future::ready(Ok(())).boxed()
    }
}

/// All entries in one JSON object file.
///
/// Loaded once on open. Every mutation is applied to a copy of the map, written
/// through a temp file and a rename on the blocking pool, and only then becomes
/// visible to reads. A failed write leaves both the file and memory unchanged.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    map: Mutex<Map>,
    /// Serializes writers so each commit starts from the previous one.
    writer: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let map = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = map.len(), "cache file opened");
        Ok(Self {
            path,
            map: Mutex::new(map),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `edit` to a copy of the map and persist it. `edit` returns whether
    /// anything changed; unchanged maps are not rewritten.
    async fn commit(&self, edit: impl FnOnce(&mut Map) -> bool + Send) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;

        let mut next = lock(&self.map).clone();
        if !edit(&mut next) {
            return Ok(());
        }

        let bytes = serde_json::to_vec(&next)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        *lock(&self.map) = next;
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.map).get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.map).keys().cloned().collect())
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>> {
        self.commit(move |map| {
            map.insert(key.to_string(), value);
            true
        })
        .boxed()
    }

    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), StoreError>> {
        self.commit(move |map| {
            keys.iter()
                .fold(false, |changed, key| map.remove(key).is_some() || changed)
        })
        .boxed()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Store whose every operation fails, for exercising degraded paths.
    pub(crate) struct FailingStore;

    fn broken() -> StoreError {
        StoreError::Io(std::io::Error::other("disk unavailable"))
    }

    impl KvStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Err(broken())
        }

        fn keys(&self) -> Result<Vec<String>, StoreError> {
            Err(broken())
        }

        fn set<'a>(
            &'a self,
            _key: &'a str,
            _value: Value,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            future::ready(Err(broken())).boxed()
        }

        fn remove<'a>(&'a self, _keys: &'a [String]) -> BoxFuture<'a, Result<(), StoreError>> {
            future::ready(Err(broken())).boxed()
        }
    }
}
