use log::warn;
use semver::Version;

use crate::catalog::CatalogEntry;
use crate::product::ProductInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No catalog entry for the installed version; try again after the TTL.
    Defer,
    UpToDate,
    UpdateAvailable {
        target_version: String,
        archive_url: String,
    },
}

pub struct VersionGate;

impl VersionGate {
    /// Decide whether `entry` is an upgrade for `product`.
    ///
    /// The offer is suppressed when it is not newer than the installed
    /// version, or not newer than an installed patch.
    #[must_use]
    pub fn evaluate(product: &ProductInfo, entry: Option<&CatalogEntry>) -> Decision {
        let Some(entry) = entry else {
            return Decision::Defer;
        };

        let newer_than_installed = is_newer_version(&entry.version, &product.version);
        let newer_than_patch = product
            .patch
            .as_deref()
            .is_none_or(|patch| is_newer_version(&entry.version, patch));

        if newer_than_installed && newer_than_patch {
            Decision::UpdateAvailable {
                target_version: entry.version.clone(),
                archive_url: entry.url.clone(),
            }
        } else {
            Decision::UpToDate
        }
    }
}

#[must_use]
pub fn is_newer_version(latest: &str, current: &str) -> bool {
    match (parse_semver(latest), parse_semver(current)) {
        (Some(latest), Some(current)) => latest > current,
        _ => {
            warn!("Comparing unparseable versions '{latest}' and '{current}' as strings");
            latest.trim() != current.trim()
        }
    }
}

fn parse_semver(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut numbers = Vec::with_capacity(3);
    for part in core.split('.') {
        // "1.2.x" must not read as 1.2.0.
        numbers.push(part.parse::<u64>().ok()?);
    }

    let normalized = match numbers.as_slice() {
        [major] => format!("{major}.0.0{suffix}"),
        [major, minor] => format!("{major}.{minor}.0{suffix}"),
        [major, minor, patch] => format!("{major}.{minor}.{patch}{suffix}"),
        _ => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: &str) -> CatalogEntry {
        CatalogEntry {
            version: version.to_string(),
            url: format!("https://updates.example.com/gallery-{version}.zip"),
        }
    }

    #[test]
    fn test_version_comparison() {
        assert!(is_newer_version("1.0.1", "1.0.0"));
        assert!(is_newer_version("1.1.0", "1.0.0"));
        assert!(is_newer_version("2.0.0", "1.9.9"));
        assert!(is_newer_version("1.2", "1.1.9"));
        assert!(is_newer_version("1", "0.99.0"));
        assert!(is_newer_version("1.10.0", "1.9.0"));
        assert!(is_newer_version("v1.0.1", "1.0.0"));
        assert!(is_newer_version("1.0.0", "1.0.0-beta.2"));
        assert!(!is_newer_version("1.0.0", "1.0.0"));
        assert!(!is_newer_version("1.2", "1.2.0"));
        assert!(!is_newer_version("1.0.0-beta.2", "1.0.0-beta.10"));
        assert!(!is_newer_version("1.0.0", "1.0.1"));
        assert!(!is_newer_version("0.9.0", "1.0.0"));
    }

    #[test]
    fn non_numeric_components_are_not_padded() {
        assert_eq!(parse_semver("1.2.x"), None);
        assert_eq!(parse_semver("1.x"), None);
        assert_eq!(parse_semver("1."), None);
        assert_eq!(parse_semver("1.2.3.4"), None);
        assert_eq!(parse_semver("v1.2"), Version::parse("1.2.0").ok());
        assert_eq!(parse_semver("1-rc.1"), Version::parse("1.0.0-rc.1").ok());
        // Falls back to string inequality instead of comparing equal.
        assert!(is_newer_version("1.2.x", "1.2.0"));
    }

    #[test]
    fn unparseable_versions_compare_by_inequality() {
        assert!(is_newer_version("nightly-2", "nightly-1"));
        assert!(!is_newer_version("nightly", "nightly"));
    }

    #[test]
    fn missing_entry_defers() {
        let product = ProductInfo::new("1.0.0", None);
        assert_eq!(VersionGate::evaluate(&product, None), Decision::Defer);
    }

    #[test]
    fn same_version_is_up_to_date() {
        let product = ProductInfo::new("1.0.0", None);
        assert_eq!(
            VersionGate::evaluate(&product, Some(&entry("1.0.0"))),
            Decision::UpToDate
        );
    }

    #[test]
    fn newer_entry_is_offered() {
        let product = ProductInfo::new("1.0.0", None);
        assert_eq!(
            VersionGate::evaluate(&product, Some(&entry("1.2.0"))),
            Decision::UpdateAvailable {
                target_version: "1.2.0".to_string(),
                archive_url: "https://updates.example.com/gallery-1.2.0.zip".to_string(),
            }
        );
    }

    #[test]
    fn installed_patch_suppresses_equal_or_older_offer() {
        let patched = ProductInfo::new("1.0.0", Some("1.2.0".to_string()));
        assert_eq!(
            VersionGate::evaluate(&patched, Some(&entry("1.2.0"))),
            Decision::UpToDate
        );
        assert_eq!(
            VersionGate::evaluate(&patched, Some(&entry("1.1.5"))),
            Decision::UpToDate
        );
        assert!(matches!(
            VersionGate::evaluate(&patched, Some(&entry("1.2.1"))),
            Decision::UpdateAvailable { .. }
        ));
    }

    #[test]
    fn older_entry_is_never_offered() {
        let product = ProductInfo::new("2.0.0", None);
        assert_eq!(
            VersionGate::evaluate(&product, Some(&entry("1.9.9"))),
            Decision::UpToDate
        );
    }
}
