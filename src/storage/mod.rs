//! Key-value persistence
//!
//! The session state (tab list, active tab, visit history) is stored as JSON
//! blobs under fixed keys. Read and write failures are logged and degrade to
//! defaults; they never take the session down.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::utils::{Result, StorageError};

/// Storage key for the ordered tab list
pub const TABS_KEY: &str = "tabs";
/// Storage key for the active tab id
pub const ACTIVE_TAB_KEY: &str = "active_tab";
/// Storage key for the visit history log
pub const HISTORY_KEY: &str = "history";

/// Blob storage keyed by string
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete the value stored under `key`
    fn remove(&self, key: &str) -> Result<()>;
}

/// Decode the JSON value stored under `key`
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes).map_err(|source| StorageError::Decode {
        key: key.to_string(),
        source,
    })?;
    Ok(Some(value))
}

/// Decode the value under `key`, falling back to `T::default()` on any failure
pub fn load_or_default<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> T {
    match load_json(store, key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            log::warn!("Discarding stored '{}': {}", key, e);
            T::default()
        }
    }
}

/// Encode `value` as JSON and store it under `key`
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, &bytes)
}

/// Like [`save_json`], but failures are only logged
pub fn persist<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) {
    if let Err(e) = save_json(store, key, value) {
        log::warn!("Failed to persist '{}': {}", key, e);
    }
}
