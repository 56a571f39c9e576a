use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use ink_core::{
    ConfigError, DEFAULT_CHECK_INTERVAL_HOURS, UpdaterConfig, Url, normalize_check_interval,
};
use ink_platform::{AppPaths, ProductKind};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of `settings.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InkSettings {
    /// Key for capability tokens. At least 16 characters.
    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub site_name: Option<String>,

    /// Where the host sends the browser after an update applied from the
    /// action link.
    #[serde(default)]
    pub landing_url: Option<String>,

    /// Root of the installation's content: `plugins/` and `themes/` live
    /// below it.
    #[serde(default)]
    pub content_dir: Option<PathBuf>,

    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Leave out to run without the updater.
    #[serde(default)]
    pub updater: Option<UpdaterSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub min_level: LogLevel,

    #[serde(default = "default_log_file_name")]
    pub file_name: String,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::Debug,
            Self::Info => LevelFilter::Info,
            Self::Warn => LevelFilter::Warn,
            Self::Error => LevelFilter::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdaterSettings {
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub product_file: Option<PathBuf>,

    #[serde(default)]
    pub product_name: String,

    /// `plugin` or `theme`.
    #[serde(default)]
    pub product_kind: Option<String>,

    #[serde(default)]
    pub auto_update: bool,

    #[serde(default = "default_check_interval")]
    pub update_check_interval_hours: u64,

    #[serde(default = "default_catalog_timeout")]
    pub catalog_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_minutes: u32,
}

fn default_true() -> bool {
    true
}

fn default_log_file_name() -> String {
    "ink-debug.log".to_string()
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_HOURS
}

fn default_catalog_timeout() -> u64 {
    5
}

fn default_download_timeout() -> u64 {
    300
}

fn default_lock_ttl() -> u32 {
    60
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_level: LogLevel::default(),
            file_name: default_log_file_name(),
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

/// Settings after validation. `errors` lists every problem found; when the
/// updater section has any, `updater` is `None`.
#[derive(Debug, Clone, Default)]
pub struct ValidatedSettings {
    pub updater: Option<UpdaterConfig>,
    pub landing_url: Option<Url>,
    pub errors: Vec<ConfigError>,
}

impl InkSettings {
    /// # Errors
    /// Returns an error when the file cannot be read or is not a valid
    /// settings document. Unknown fields are rejected.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn site_name(&self) -> &str {
        match (&self.site_name, &self.updater) {
            (Some(name), _) if !name.trim().is_empty() => name,
            (_, Some(updater)) if !updater.product_name.trim().is_empty() => {
                &updater.product_name
            }
            _ => "This site",
        }
    }

    /// Check everything at once. Problems are collected rather than stopping
    /// at the first.
    #[must_use]
    pub fn validate(&self, paths: &AppPaths) -> ValidatedSettings {
        let mut validated = ValidatedSettings::default();

        match self.landing_url.as_deref().map(str::trim) {
            None | Some("") => {}
            Some(raw) => match Url::parse(raw) {
                Ok(url) => validated.landing_url = Some(url),
                Err(_) => validated
                    .errors
                    .push(ConfigError::InvalidLandingUrl(raw.to_string())),
            },
        }

        if let Some(updater) = &self.updater {
            match self.updater_config(updater, paths) {
                Ok(config) => validated.updater = Some(config),
                Err(errors) => validated.errors.extend(errors),
            }
        }

        validated
    }

    fn updater_config(
        &self,
        updater: &UpdaterSettings,
        paths: &AppPaths,
    ) -> Result<UpdaterConfig, Vec<ConfigError>> {
        let mut errors = Vec::new();

        let endpoint = match updater.endpoint.trim() {
            "" => {
                errors.push(ConfigError::MissingEndpoint);
                None
            }
            raw => Url::parse(raw)
                .map_err(|_| errors.push(ConfigError::InvalidEndpoint(raw.to_string())))
                .ok(),
        };

        let product_file = updater
            .product_file
            .clone()
            .filter(|path| !path.as_os_str().is_empty());
        if product_file.is_none() {
            errors.push(ConfigError::MissingProductFile);
        }

        let product_name = updater.product_name.trim();
        if product_name.is_empty() {
            errors.push(ConfigError::MissingProductName);
        }

        let product_kind = match updater.product_kind.as_deref() {
            None => {
                errors.push(ConfigError::MissingProductKind);
                None
            }
            Some(raw) => raw
                .parse::<ProductKind>()
                .map_err(|error| errors.push(error.into()))
                .ok(),
        };

        let content_dir = match &self.content_dir {
            None => {
                errors.push(ConfigError::MissingContentDir);
                None
            }
            Some(dir) if !dir.is_dir() => {
                errors.push(ConfigError::ContentDirNotFound(dir.clone()));
                None
            }
            Some(dir) => Some(dir.clone()),
        };

        let (Some(endpoint), Some(product_file), Some(product_kind), Some(content_dir), true) = (
            endpoint,
            product_file,
            product_kind,
            content_dir,
            errors.is_empty(),
        ) else {
            return Err(errors);
        };

        let mut config = UpdaterConfig::for_product(
            endpoint,
            product_file,
            product_name,
            product_kind,
            content_dir,
        );
        config.auto_update = updater.auto_update;
        config.check_interval = normalize_check_interval(updater.update_check_interval_hours);
        config.scratch_dir = self
            .scratch_dir
            .clone()
            .unwrap_or_else(|| paths.scratch_dir());
        config.site_name = self.site_name().to_string();
        config.catalog_timeout = Duration::from_secs(updater.catalog_timeout_secs.max(1));
        config.download_timeout = Duration::from_secs(updater.download_timeout_secs.max(1));
        config.lock_ttl = TimeDelta::minutes(i64::from(updater.lock_ttl_minutes.max(1)));
        config.check_limits().map(|()| config)
    }
}
