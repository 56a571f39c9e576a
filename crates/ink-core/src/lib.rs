//! Update check/apply machinery for a single installed product.
//!
//! - [`VersionGate`] decides whether a catalog entry is an upgrade.
//! - [`CatalogFetcher`] reads the remote catalog through the shared cache.
//! - [`UpdatePipeline`] drives check, notify, download, install and cleanup
//!   under the cross-process [`ProcessLock`].
//! - [`MaintenanceGate`] turns away unprivileged traffic while an archive is
//!   being downloaded or installed.

mod catalog;
mod config;
mod download;
mod error;
mod install;
mod lock;
mod maintenance;
mod pipeline;
mod product;
mod schedule;
mod token;
mod transport;
mod version;

pub use catalog::{CachePolicy, Catalog, CatalogEntry, CatalogFetcher};
pub use config::{
    ConfigError, DEFAULT_CHECK_INTERVAL_HOURS, LOCK_TTL_MARGIN, MIN_CHECK_INTERVAL_HOURS, UpdaterConfig,
    normalize_check_interval,
};
pub use download::{archive_path, download_to};
pub use error::UpdaterError;
pub use install::{InstallError, extract_zip, install_archive};
pub use lock::{LockToken, ProcessLock};
pub use maintenance::{MaintenanceGate, MaintenanceGuard};
pub use pipeline::{
    ACTION_APPLY, ACTION_PARAM, ActionOutcome, ApplyOutcome, CheckOutcome, DASHBOARD_SCREEN,
    PipelineState, TOKEN_PARAM, UpdatePipeline, ViewContext,
};
pub use product::ProductInfo;
pub use reqwest::Url;
pub use schedule::CheckSchedule;
pub use token::{APPLY_UPDATE_ACTION, CapabilityTokens, TokenAge};
pub use transport::{HttpTransport, Transport, TransportError};
pub use version::{Decision, VersionGate, is_newer_version};
