//! Persistent key/value state shared by every worker of an installation.
//!
//! All cross-request coordination (the update process flag, the next-check
//! marker, cached catalogs and notices) goes through a [`KeyValueStore`];
//! in-process variables cannot see other workers.

mod clock;
mod entry;
mod error;
mod file;
pub mod keys;
mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;

use chrono::TimeDelta;
use serde_json::Value;

/// Closure handed to [`KeyValueStore::update`]. Receives the current value
/// (`None` when absent or expired) and returns the value to store, or `None`
/// to delete the key.
pub type UpdateFn<'a> = dyn FnMut(Option<Value>) -> Option<Value> + 'a;

/// TTL-capable persistent cache.
///
/// Implementations must make [`add`](Self::add), [`take`](Self::take) and
/// [`update`](Self::update) atomic with respect to every other process using
/// the same backing storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Expired entries read as `None`.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or overwrite a value. `ttl = None` never expires.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be written.
    fn set(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<(), StoreError>;

    /// Set-if-absent. Returns `false` without writing when a live entry
    /// already exists.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be read or written.
    fn add(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<bool, StoreError>;

    /// Remove a key. Returns whether a live entry was removed.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be written.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Read and remove a key in one step.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be read or written.
    fn take(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Remove a key only when its live value satisfies `matches`, leaving
    /// any other value and its expiry untouched. Returns whether it was
    /// removed.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be read or written.
    fn delete_if(
        &self,
        key: &str,
        matches: &mut dyn FnMut(&Value) -> bool,
    ) -> Result<bool, StoreError>;

    /// Read-modify-write a key in one step. The entry keeps `ttl` from this
    /// call; the previous expiry is not carried over.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be read or written.
    fn update(
        &self,
        key: &str,
        ttl: Option<TimeDelta>,
        apply: &mut UpdateFn<'_>,
    ) -> Result<(), StoreError>;

    /// Whether a live entry exists for `key`.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be read.
    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}
