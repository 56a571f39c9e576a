use ink_notices::NoticeError;
use ink_store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::install::InstallError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("Invalid configuration. {0}")]
    Config(#[from] ConfigError),
    #[error("{url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("Error extracting the archive: {0}")]
    InstallFailure(#[source] InstallError),
    #[error("update state unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("notice store unavailable: {0}")]
    Notices(#[from] NoticeError),
}

impl UpdaterError {
    pub(crate) fn unreachable(url: impl Into<String>, source: TransportError) -> Self {
        Self::Unreachable {
            url: url.into(),
            source,
        }
    }

    /// Whether this failure should be reported to the operator as a notice.
    /// Network failures only count when they interrupt an apply; the caller
    /// decides that.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Unreachable { .. } | Self::InstallFailure(_)
        )
    }
}
