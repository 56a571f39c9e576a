use std::sync::Arc;

use ink_store::KeyValueStore;
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::notice::{Notice, NoticeKind, NoticeSet, content_hash};
use crate::scope::{ActorId, NoticeScope};
use crate::NoticeError;

/// Notices of a single scope on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct NoticeStore {
    store: Arc<dyn KeyValueStore>,
    scope: NoticeScope,
}

impl NoticeStore {
    pub fn new(store: Arc<dyn KeyValueStore>, scope: NoticeScope) -> Self {
        Self { store, scope }
    }

    pub fn broadcast(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, NoticeScope::Broadcast)
    }

    pub fn actor(store: Arc<dyn KeyValueStore>, actor: ActorId) -> Self {
        Self::new(store, NoticeScope::Actor(actor))
    }

    #[must_use]
    pub fn scope(&self) -> &NoticeScope {
        &self.scope
    }

    /// Add a notice and return its hash.
    ///
    /// Persistent notices are upserted by content hash. Non-persistent ones
    /// are appended to the transient queue without deduplication.
    ///
    /// # Errors
    /// Returns an error when the backing store cannot be updated.
    pub fn add(
        &self,
        text: impl Into<String>,
        kind: NoticeKind,
        persistent: bool,
    ) -> Result<String, NoticeError> {
        let notice = Notice::new(text, kind);
        let hash = notice.hash();
        let entry = notice_to_value(&notice);

        if persistent {
            self.store
                .update(&self.scope.persistent_key(), None, &mut |current| {
                    let mut notices = as_object(current);
                    notices.insert(hash.clone(), entry.clone());
                    Some(Value::Object(notices))
                })?;
            debug!("Stored {} notice {hash}", notice.kind);
        } else {
            self.store
                .update(&self.scope.transient_key(), None, &mut |current| {
                    let mut queue = match current {
                        Some(Value::Array(queue)) => queue,
                        _ => Vec::new(),
                    };
                    queue.push(entry.clone());
                    Some(Value::Array(queue))
                })?;
        }

        Ok(hash)
    }

    /// Persisted notices of this scope. A malformed stored value reads as an
    /// empty set.
    ///
    /// # Errors
    /// Returns an error when the backing store cannot be read.
    pub fn list(&self) -> Result<NoticeSet, NoticeError> {
        let stored = self.store.get(&self.scope.persistent_key())?;
        Ok(parse_set(stored))
    }

    /// # Errors
    /// Returns an error when the backing store cannot be read.
    pub fn contains(&self, hash: &str) -> Result<bool, NoticeError> {
        Ok(self.list()?.contains_key(hash))
    }

    /// Remove the notice with `hash`. Unknown hashes are a no-op.
    ///
    /// # Errors
    /// Returns an error when the backing store cannot be updated.
    pub fn delete(&self, hash: &str) -> Result<bool, NoticeError> {
        if hash.is_empty() {
            return Ok(false);
        }

        let mut removed = false;
        self.store
            .update(&self.scope.persistent_key(), None, &mut |current| {
                let mut notices = match current {
                    Some(Value::Object(notices)) => notices,
                    Some(other) => return Some(other),
                    None => return None,
                };
                removed = notices.remove(hash).is_some();
                Some(Value::Object(notices))
            })?;

        if removed {
            debug!("Dismissed notice {hash}");
        }
        Ok(removed)
    }

    /// Hand out the transient queue and clear it in the same store operation,
    /// so a notice is never delivered twice even if the caller drops the
    /// result.
    ///
    /// # Errors
    /// Returns an error when the backing store cannot be updated.
    pub fn drain_transient(&self) -> Result<Vec<Notice>, NoticeError> {
        let Some(queue) = self.store.take(&self.scope.transient_key())? else {
            return Ok(Vec::new());
        };

        let Value::Array(entries) = queue else {
            warn!("Discarding malformed transient notice queue");
            return Ok(Vec::new());
        };

        Ok(entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<Notice>(entry).ok())
            .collect())
    }
}

fn notice_to_value(notice: &Notice) -> Value {
    let mut object = Map::new();
    object.insert("text".to_string(), Value::String(notice.text.clone()));
    object.insert(
        "type".to_string(),
        Value::String(notice.kind.as_str().to_string()),
    );
    Value::Object(object)
}

fn as_object(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(object)) => object,
        _ => Map::new(),
    }
}

fn parse_set(value: Option<Value>) -> NoticeSet {
    as_object(value)
        .into_iter()
        .filter_map(|(hash, entry)| {
            let notice = serde_json::from_value::<Notice>(entry).ok()?;
            // Entries written by hand may carry a stale hash.
            (content_hash(&notice.text) == hash).then_some((hash, notice))
        })
        .collect()
}
