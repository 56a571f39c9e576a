use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::TimeDelta;
use ink_store::{KeyValueStore, StoreError, keys};
use log::{debug, error, info};
use serde_json::{Value, json};

static ACQUIRE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Cross-process mutual exclusion for applying an update, backed by the
/// `update-process-flag` entry of the shared store.
///
/// The flag carries a TTL so a worker that dies mid-apply cannot hold it
/// forever.
#[derive(Clone)]
pub struct ProcessLock {
    store: Arc<dyn KeyValueStore>,
    ttl: TimeDelta,
}

impl ProcessLock {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: TimeDelta) -> Self {
        Self { store, ttl }
    }

    /// Set the flag if nobody holds it. `Ok(None)` means another apply is in
    /// progress.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read or written.
    pub fn try_acquire(&self, label: &str) -> Result<Option<LockToken>, StoreError> {
        let owner = new_owner_id();
        let marker = json!({
            "owner": owner,
            "label": label,
            "pid": std::process::id(),
        });

        if !self.store.add(keys::UPDATE_PROCESS, marker, Some(self.ttl))? {
            debug!("Update process flag already held; skipping {label}");
            return Ok(None);
        }

        info!("Acquired update process flag for {label}");
        Ok(Some(LockToken {
            store: Arc::clone(&self.store),
            owner,
            released: false,
        }))
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn is_held(&self) -> Result<bool, StoreError> {
        self.store.contains(keys::UPDATE_PROCESS)
    }
}

/// Proof of holding the update process flag. Dropping the token releases
/// the flag; [`release`](Self::release) does the same and reports failures.
pub struct LockToken {
    store: Arc<dyn KeyValueStore>,
    owner: String,
    released: bool,
}

impl LockToken {
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// # Errors
    /// Returns an error when the store cannot be written. The flag then
    /// expires with its TTL.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        release_flag(self.store.as_ref(), &self.owner)
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = release_flag(self.store.as_ref(), &self.owner) {
            error!("Failed to release update process flag: {err}");
        }
    }
}

/// Delete the flag only while it still names `owner`; after a TTL takeover
/// it belongs to someone else.
fn release_flag(store: &dyn KeyValueStore, owner: &str) -> Result<(), StoreError> {
    let ours = store.delete_if(keys::UPDATE_PROCESS, &mut |marker| {
        marker.get("owner").and_then(Value::as_str) == Some(owner)
    })?;

    if ours {
        debug!("Released update process flag");
    } else {
        debug!("Update process flag no longer ours; left in place");
    }
    Ok(())
}

fn new_owner_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let seq = ACQUIRE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{nanos:x}-{seq}", std::process::id())
}
