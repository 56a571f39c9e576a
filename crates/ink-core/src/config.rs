use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use ink_platform::{ProductKind, ProductKindParseError};
use reqwest::Url;
use thiserror::Error;

pub const DEFAULT_CHECK_INTERVAL_HOURS: u64 = 12;
pub const MIN_CHECK_INTERVAL_HOURS: u64 = 4;

const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_LOCK_TTL_MINUTES: i64 = 60;
/// Slack the process flag must keep beyond the network timeouts, covering
/// extraction and cleanup.
pub const LOCK_TTL_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Please set up the update endpoint.")]
    MissingEndpoint,
    #[error("The update endpoint '{0}' is not a valid URL.")]
    InvalidEndpoint(String),
    #[error("Please specify the path to the product file.")]
    MissingProductFile,
    #[error("Please specify the product name to get updates for.")]
    MissingProductName,
    #[error("Please specify the product type.")]
    MissingProductKind,
    #[error("Please specify a valid product type: {0}.")]
    InvalidProductKind(#[from] ProductKindParseError),
    #[error("Please provide the system path to the content directory.")]
    MissingContentDir,
    #[error("The content directory {} does not exist.", .0.display())]
    ContentDirNotFound(PathBuf),
    #[error("The signing secret must be at least 16 characters long.")]
    WeakSecret,
    #[error("The landing URL '{0}' is not a valid URL.")]
    InvalidLandingUrl(String),
    #[error("Cannot read the product file {}: {details}", .path.display())]
    ProductFileUnreadable { path: PathBuf, details: String },
    #[error("The product file {} has no Version header.", .0.display())]
    MissingVersionHeader(PathBuf),
    #[error(
        "The update lock lifetime ({lock_ttl_secs}s) must be longer than the catalog and \
         download timeouts plus {margin_secs}s ({required_secs}s)."
    )]
    LockTtlTooShort {
        lock_ttl_secs: i64,
        required_secs: u64,
        margin_secs: u64,
    },
    #[error(
        "The scratch directory {} overlaps the installed content in {}; cleanup would delete it.",
        .scratch_dir.display(),
        .content_dir.display()
    )]
    UnsafeScratchDir {
        scratch_dir: PathBuf,
        content_dir: PathBuf,
    },
}

/// Validated updater configuration. Built once per host start; every field
/// is already checked.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub endpoint: Url,
    pub product_file: PathBuf,
    pub product_name: String,
    pub product_kind: ProductKind,
    pub auto_update: bool,
    pub check_interval: TimeDelta,
    pub content_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub site_name: String,
    pub catalog_timeout: Duration,
    pub download_timeout: Duration,
    pub lock_ttl: TimeDelta,
}

impl UpdaterConfig {
    /// Configuration with every optional knob at its default: no auto-apply,
    /// 12 hour checks, scratch files under `<content_dir>/uploads/ink-fw`.
    pub fn for_product(
        endpoint: Url,
        product_file: impl Into<PathBuf>,
        product_name: impl Into<String>,
        product_kind: ProductKind,
        content_dir: impl Into<PathBuf>,
    ) -> Self {
        let content_dir = content_dir.into();
        let product_name = product_name.into();
        Self {
            endpoint,
            product_file: product_file.into(),
            scratch_dir: content_dir.join("uploads").join("ink-fw"),
            site_name: product_name.clone(),
            product_name,
            product_kind,
            auto_update: false,
            check_interval: normalize_check_interval(DEFAULT_CHECK_INTERVAL_HOURS),
            content_dir,
            catalog_timeout: DEFAULT_CATALOG_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            lock_ttl: TimeDelta::minutes(DEFAULT_LOCK_TTL_MINUTES),
        }
    }

    /// Directory the archive for this product is extracted into.
    #[must_use]
    pub fn install_dir(&self) -> PathBuf {
        self.content_dir.join(self.product_kind.content_subdir())
    }

    /// Cross-field checks on the knobs that keep applies apart.
    ///
    /// The process flag has to outlive a full catalog fetch and download, or
    /// a second worker can take it over mid-apply. The scratch directory is
    /// removed after every apply, so it must not be or contain the content
    /// directory, nor sit inside the install directory.
    ///
    /// # Errors
    /// Returns every violated constraint.
    pub fn check_limits(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        let required = self.catalog_timeout + self.download_timeout + LOCK_TTL_MARGIN;
        let required_secs = required.as_secs();
        if self.lock_ttl.num_seconds() <= i64::try_from(required_secs).unwrap_or(i64::MAX) {
            errors.push(ConfigError::LockTtlTooShort {
                lock_ttl_secs: self.lock_ttl.num_seconds(),
                required_secs,
                margin_secs: LOCK_TTL_MARGIN.as_secs(),
            });
        }

        if self.content_dir.starts_with(&self.scratch_dir)
            || self.scratch_dir.starts_with(self.install_dir())
        {
            errors.push(ConfigError::UnsafeScratchDir {
                scratch_dir: self.scratch_dir.clone(),
                content_dir: self.content_dir.clone(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Hours between checks, with anything below the minimum replaced by the
/// default.
#[must_use]
pub fn normalize_check_interval(hours: u64) -> TimeDelta {
    let hours = if hours < MIN_CHECK_INTERVAL_HOURS {
        DEFAULT_CHECK_INTERVAL_HOURS
    } else {
        hours
    };
    TimeDelta::hours(i64::try_from(hours).unwrap_or(i64::from(u16::MAX)))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::TimeDelta;
    use ink_platform::ProductKind;
    use reqwest::Url;

    use super::{ConfigError, UpdaterConfig, normalize_check_interval};

    fn gallery_config() -> UpdaterConfig {
        UpdaterConfig::for_product(
            Url::parse("https://updates.example.com/catalog.json").expect("url should parse"),
            "/srv/content/plugins/gallery/gallery.php",
            "Gallery",
            ProductKind::Plugin,
            "/srv/content",
        )
    }

    #[test]
    fn short_intervals_fall_back_to_default() {
        assert_eq!(normalize_check_interval(0), TimeDelta::hours(12));
        assert_eq!(normalize_check_interval(3), TimeDelta::hours(12));
        assert_eq!(normalize_check_interval(4), TimeDelta::hours(4));
        assert_eq!(normalize_check_interval(48), TimeDelta::hours(48));
    }

    #[test]
    fn install_dir_depends_on_product_kind() {
        let endpoint =
            Url::parse("https://updates.example.com/catalog.json").expect("url should parse");
        let mut config = UpdaterConfig::for_product(
            endpoint,
            "/srv/content/plugins/gallery/gallery.php",
            "Gallery",
            ProductKind::Plugin,
            "/srv/content",
        );
        assert_eq!(config.install_dir(), Path::new("/srv/content/plugins"));

        config.product_kind = ProductKind::Theme;
        assert_eq!(config.install_dir(), Path::new("/srv/content/themes"));
        assert_eq!(
            config.scratch_dir,
            Path::new("/srv/content/uploads/ink-fw")
        );
    }

    #[test]
    fn defaults_pass_the_limit_checks() {
        assert_eq!(gallery_config().check_limits(), Ok(()));
    }

    #[test]
    fn lock_must_outlive_the_network_timeouts() {
        let mut config = gallery_config();
        config.lock_ttl = TimeDelta::minutes(1);
        assert_eq!(
            config.check_limits(),
            Err(vec![ConfigError::LockTtlTooShort {
                lock_ttl_secs: 60,
                required_secs: 365,
                margin_secs: 60,
            }])
        );

        config.lock_ttl = TimeDelta::seconds(365);
        assert!(config.check_limits().is_err());
        config.lock_ttl = TimeDelta::seconds(366);
        assert_eq!(config.check_limits(), Ok(()));
    }

    #[test]
    fn scratch_dir_must_stay_clear_of_installed_content() {
        let mut config = gallery_config();
        for scratch in [
            "/srv/content",
            "/srv",
            "/srv/content/plugins",
            "/srv/content/plugins/ink-fw",
        ] {
            config.scratch_dir = scratch.into();
            assert_eq!(
                config.check_limits(),
                Err(vec![ConfigError::UnsafeScratchDir {
                    scratch_dir: scratch.into(),
                    content_dir: "/srv/content".into(),
                }]),
                "{scratch} should be rejected"
            );
        }

        for scratch in ["/srv/content/uploads/ink-fw", "/tmp/ink-fw", "/srv/content-scratch"] {
            config.scratch_dir = scratch.into();
            assert_eq!(config.check_limits(), Ok(()), "{scratch} should be accepted");
        }
    }
}
