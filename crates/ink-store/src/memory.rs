use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::TimeDelta;
use serde_json::Value;

use crate::entry::StoredEntry;
use crate::{Clock, KeyValueStore, StoreError, SystemClock, UpdateFn};

/// Process-local store. Only safe as a lock medium when every worker lives in
/// the same process; hosts with several worker processes use [`FileStore`].
///
/// [`FileStore`]: crate::FileStore
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn live_value(
        &self,
        entries: &mut HashMap<String, StoredEntry>,
        key: &str,
    ) -> Option<Value> {
        let now = self.clock.now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut entries = self.entries();
        Ok(self.live_value(&mut entries, key))
    }

    fn set(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<(), StoreError> {
        let entry = StoredEntry::new(value, ttl, self.clock.now());
        self.entries().insert(key.to_string(), entry);
        Ok(())
    }

    fn add(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<bool, StoreError> {
        let mut entries = self.entries();
        if self.live_value(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredEntry::new(value, ttl, self.clock.now()),
        );
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries();
        let existed = self.live_value(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    fn take(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut entries = self.entries();
        let value = self.live_value(&mut entries, key);
        entries.remove(key);
        Ok(value)
    }

    fn delete_if(
        &self,
        key: &str,
        matches: &mut dyn FnMut(&Value) -> bool,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries();
        let Some(value) = self.live_value(&mut entries, key) else {
            return Ok(false);
        };
        if !matches(&value) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    fn update(
        &self,
        key: &str,
        ttl: Option<TimeDelta>,
        apply: &mut UpdateFn<'_>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries();
        let current = self.live_value(&mut entries, key);
        match apply(current) {
            Some(value) => {
                entries.insert(
                    key.to_string(),
                    StoredEntry::new(value, ttl, self.clock.now()),
                );
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(())
    }
}
