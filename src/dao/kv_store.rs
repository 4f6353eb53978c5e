//! Small synchronous key-value store holding the device-local state (fallback leaderboard,
//! settings, progress). Values are JSON documents addressed by typed keys.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::dao::storage::{StorageError, StorageResult};

/// Raw string-valued persistence behind the typed helpers in [`TypedStore`].
pub trait KeyValueStore: Send + Sync {
    /// Raw value under `key`, `None` when absent.
    fn get_raw(&self, key: &str) -> StorageResult<Option<String>>;
    /// Store `value` under `key`. On error the previous value stays visible.
    fn set_raw(&self, key: &str, value: String) -> StorageResult<()>;
    /// Remove `key`; removing a missing key succeeds.
    fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Name of a stored value together with the type it decodes to.
pub struct StoreKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> StoreKey<T> {
    /// Declare a key.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    /// Raw key string.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StoreKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StoreKey<T> {}

/// JSON encoding layered on top of any [`KeyValueStore`].
pub trait TypedStore {
    /// Decode the value under `key`, `None` when absent.
    fn load<T: DeserializeOwned>(&self, key: StoreKey<T>) -> StorageResult<Option<T>>;
    /// Encode and store `value` under `key`.
    fn save<T: Serialize>(&self, key: StoreKey<T>, value: &T) -> StorageResult<()>;
    /// Remove the value under `key`.
    fn remove<T>(&self, key: StoreKey<T>) -> StorageResult<()>;

    /// Decode the value under `key`, treating missing or unreadable values as the default.
    fn load_or_default<T: DeserializeOwned + Default>(&self, key: StoreKey<T>) -> T {
        match self.load(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                warn!(key = key.name(), error = %err, "local value unreadable; using default");
                T::default()
            }
        }
    }
}

impl<S: KeyValueStore + ?Sized> TypedStore for S {
    fn load<T: DeserializeOwned>(&self, key: StoreKey<T>) -> StorageResult<Option<T>> {
        let Some(raw) = self.get_raw(key.name())? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::corrupt(key.name(), source))
    }

    fn save<T: Serialize>(&self, key: StoreKey<T>, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|source| StorageError::corrupt(key.name(), source))?;
        self.set_raw(key.name(), raw)
    }

    fn remove<T>(&self, key: StoreKey<T>) -> StorageResult<()> {
        self.delete(key.name())
    }
}

/// Volatile store used by tests and by clients that opt out of persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, String>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    fn set_raw(&self, key: &str, value: String) -> StorageResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// Store persisting every key into a single JSON object on disk, written through on each change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store, starting empty when the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(values) => {
                    debug!(path = %path.display(), keys = values.len(), "loaded local store");
                    values
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "local store corrupt; starting empty");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read local store; starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> StorageResult<()> {
        let encoded = serde_json::to_string_pretty(values)
            .map_err(|source| StorageError::corrupt(self.path.display().to_string(), source))?;
        write_atomically(&self.path, &encoded)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_raw(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: String) -> StorageResult<()> {
        let mut values = self.lock();
        let mut next = values.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let mut values = self.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

/// Write `contents` next to `path` and rename over it so readers never see a torn file.
pub(crate) fn write_atomically(path: &Path, contents: &str) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| {
            StorageError::unavailable(format!("creating {}", parent.display()), source)
        })?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).map_err(|source| {
        StorageError::unavailable(format!("writing {}", tmp.display()), source)
    })?;
    fs::rename(&tmp, path).map_err(|source| {
        StorageError::unavailable(format!("replacing {}", path.display()), source)
    })
}
