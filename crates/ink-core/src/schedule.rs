use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use ink_store::{Clock, KeyValueStore, StoreError, keys};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckMarker {
    last_checked_at: DateTime<Utc>,
    ttl_hours: i64,
}

/// The "checked recently" marker. While it is live no catalog request is
/// made.
#[derive(Clone)]
pub struct CheckSchedule {
    store: Arc<dyn KeyValueStore>,
    interval: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl CheckSchedule {
    pub fn new(store: Arc<dyn KeyValueStore>, interval: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            interval,
            clock,
        }
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn is_due(&self) -> Result<bool, StoreError> {
        Ok(!self.store.contains(keys::UPDATE_CHECK)?)
    }

    /// Hold off the next check for one interval and drop the cached catalog,
    /// which is only valid for the cycle that fetched it.
    ///
    /// # Errors
    /// Returns an error when the store cannot be written.
    pub fn rearm(&self) -> Result<(), StoreError> {
        let marker = CheckMarker {
            last_checked_at: self.clock.now(),
            ttl_hours: self.interval.num_hours(),
        };
        let value =
            serde_json::to_value(&marker).map_err(|source| StoreError::Serialize {
                context: "failed to encode check marker",
                source,
            })?;
        self.store
            .set(keys::UPDATE_CHECK, value, Some(self.interval))?;
        self.store.delete(keys::UPDATE_CATALOG)?;
        debug!("Next update check in {} hours", marker.ttl_hours);
        Ok(())
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn last_checked_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(value) = self.store.get(keys::UPDATE_CHECK)? else {
            return Ok(None);
        };
        Ok(serde_json::from_value::<CheckMarker>(value)
            .ok()
            .map(|marker| marker.last_checked_at))
    }
}
