//! Durable session storage for period state.
//!
//! Values are JSON records stored under string keys. Two backends are provided:
//! [`SledStorage`] for state that must survive restarts and [`MemoryStorage`]
//! for ephemeral sessions and tests.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sled::{Db, Tree};
use tracing::warn;

use crate::error::StorageError;

pub const KEY_FISCAL_YEAR: &str = "fiscal_year";
pub const KEY_MONTH: &str = "month";
pub const KEY_LAST_IMPORT: &str = "last_import";
pub const KEY_HISTORY: &str = "period_history";

const TREE_SESSION: &str = "period_session";

/// String-keyed JSON storage.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Sled-backed implementation of [`SessionStorage`]
#[derive(Clone)]
pub struct SledStorage {
    db: Db,
    tree: Tree,
}

impl SledStorage {
    /// Open (or create) a sled database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::Unavailable(format!("Failed to open sled database: {}", e))
        })?;
        Self::new(db)
    }

    pub fn new(db: Db) -> Result<Self, StorageError> {
        let tree = db.open_tree(TREE_SESSION).map_err(to_storage_io)?;
        Ok(Self { db, tree })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}

impl SessionStorage for SledStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let Some(raw) = self.tree.get(key.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(|e| StorageError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(parsed))
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.tree
            .insert(key.as_bytes(), bytes)
            .map_err(to_storage_io)?;
        self.tree.flush().map_err(to_storage_io)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.tree.remove(key.as_bytes()).map_err(to_storage_io)?;
        self.tree.flush().map_err(to_storage_io)?;
        Ok(())
    }
}

/// In-memory implementation of [`SessionStorage`]
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Read and decode `key`. Missing keys, backend failures and malformed values
/// all yield `None`; the latter two are logged.
pub fn load_best_effort<T: DeserializeOwned>(storage: &dyn SessionStorage, key: &str) -> Option<T> {
    let value = match storage.get(key) {
        Ok(Some(value)) => value,
        Ok(None) => return None,
        Err(err) => {
            warn!(key = %key, error = %err, "failed to read session storage");
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(key = %key, error = %err, "discarding malformed session storage value");
            None
        }
    }
}

/// Encode and write `value` under `key`, logging instead of failing.
pub fn store_best_effort<T: Serialize>(storage: &dyn SessionStorage, key: &str, value: &T) -> bool {
    let encoded = match serde_json::to_value(value) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(key = %key, error = %err, "failed to encode session storage value");
            return false;
        }
    };
    match storage.set(key, &encoded) {
        Ok(()) => true,
        Err(err) => {
            warn!(key = %key, error = %err, "failed to persist session storage value");
            false
        }
    }
}

/// Remove `key`, logging instead of failing.
pub fn remove_best_effort(storage: &dyn SessionStorage, key: &str) {
    if let Err(err) = storage.remove(key) {
        warn!(key = %key, error = %err, "failed to remove session storage value");
    }
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}
