use ink_core::{ConfigError, TransportError, UpdaterError};
use ink_notices::NoticeError;
use ink_platform::AppPathsError;
use ink_store::StoreError;
use thiserror::Error;

use crate::settings::SettingsError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Invalid configuration. {0}")]
    Config(#[from] ConfigError),
    #[error("failed to resolve application paths: {0}")]
    Paths(#[from] AppPathsError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Notices(#[from] NoticeError),
    #[error(transparent)]
    Updater(#[from] UpdaterError),
}

impl HostError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}
