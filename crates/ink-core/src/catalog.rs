use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ink_store::{KeyValueStore, keys};
use log::{debug, info, warn};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UpdaterError;
use crate::transport::{Transport, TransportError};

/// Upgrade target for one installed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub version: String,
    pub url: String,
}

/// Remote mapping from installed version to upgrade target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Interpret a decoded catalog document. Returns `None` when the document
    /// is not an object; entries that are not `{version, url}` are dropped.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Object(object) = value else {
            return None;
        };

        let entries = object
            .iter()
            .filter_map(|(installed, entry)| {
                match serde_json::from_value::<CatalogEntry>(entry.clone()) {
                    Ok(entry) => Some((installed.clone(), entry)),
                    Err(error) => {
                        warn!("Ignoring catalog entry for {installed}: {error}");
                        None
                    }
                }
            })
            .collect();

        Some(Self { entries })
    }

    /// The upgrade offered to `installed`. A `v` prefix on either side is
    /// ignored when there is no exact match.
    #[must_use]
    pub fn entry_for(&self, installed: &str) -> Option<&CatalogEntry> {
        if let Some(entry) = self.entries.get(installed) {
            return Some(entry);
        }
        let bare = installed.strip_prefix('v').unwrap_or(installed);
        self.entries
            .get(bare)
            .or_else(|| self.entries.get(&format!("v{bare}")))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Serve a cached catalog when one exists.
    PreferCache,
    /// Always go to the endpoint.
    Refresh,
}

/// Reads the catalog through the shared store. The cached copy has no expiry
/// of its own; [`CheckSchedule`](crate::CheckSchedule) drops it whenever the
/// next check is re-armed.
#[derive(Clone)]
pub struct CatalogFetcher {
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    endpoint: Url,
    timeout: Duration,
}

impl CatalogFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        endpoint: Url,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            endpoint,
            timeout,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// # Errors
    /// Returns [`UpdaterError::Unreachable`] when the endpoint cannot be
    /// reached or answers with an empty body. A body that is not a JSON
    /// object yields an empty catalog instead.
    pub async fn get_catalog(&self, policy: CachePolicy) -> Result<Catalog, UpdaterError> {
        if policy == CachePolicy::PreferCache
            && let Some(catalog) = self.cached()?
        {
            debug!("Using cached catalog ({} entries)", catalog.len());
            return Ok(catalog);
        }

        let url = self.endpoint.as_str();
        info!("Fetching update catalog from {url}");
        let body = self
            .transport
            .get(url, self.timeout)
            .await
            .map_err(|error| UpdaterError::unreachable(url, error))?;

        if body.is_empty() {
            return Err(UpdaterError::unreachable(
                url,
                TransportError::EmptyBody {
                    context: "catalog request",
                },
            ));
        }

        let value = match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(error) => {
                warn!("Catalog from {url} is not valid JSON: {error}");
                return Ok(Catalog::default());
            }
        };

        let Some(catalog) = Catalog::from_value(&value) else {
            warn!("Catalog from {url} is not an object");
            return Ok(Catalog::default());
        };

        self.store.set(keys::UPDATE_CATALOG, value, None)?;
        Ok(catalog)
    }

    /// # Errors
    /// Returns an error when the store cannot be written.
    pub fn invalidate(&self) -> Result<(), UpdaterError> {
        self.store.delete(keys::UPDATE_CATALOG)?;
        Ok(())
    }

    fn cached(&self) -> Result<Option<Catalog>, UpdaterError> {
        let Some(value) = self.store.get(keys::UPDATE_CATALOG)? else {
            return Ok(None);
        };
        let catalog = Catalog::from_value(&value);
        if catalog.is_none() {
            warn!("Discarding cached catalog that is not an object");
        }
        Ok(catalog)
    }
}
