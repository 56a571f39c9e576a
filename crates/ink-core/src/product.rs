use std::io::Read;
use std::path::Path;

use crate::config::ConfigError;

/// Only the start of the product file is scanned for headers.
const HEADER_SCAN_BYTES: u64 = 8 * 1024;

/// Version metadata of the installed product, read from the header block of
/// its main file:
///
/// ```text
/// /*
///  * Plugin Name: Gallery
///  * Version: 1.4.0
///  * Patch: 1.4.2
///  */
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub version: String,
    pub patch: Option<String>,
}

impl ProductInfo {
    pub fn new(version: impl Into<String>, patch: Option<String>) -> Self {
        Self {
            version: version.into(),
            patch,
        }
    }

    /// Read the `Version` and `Patch` headers from `path`.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or has no `Version`
    /// header.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let unreadable = |error: std::io::Error| ConfigError::ProductFileUnreadable {
            path: path.to_path_buf(),
            details: error.to_string(),
        };

        let file = std::fs::File::open(path).map_err(unreadable)?;
        let mut head = Vec::new();
        file.take(HEADER_SCAN_BYTES)
            .read_to_end(&mut head)
            .map_err(unreadable)?;

        Self::parse(&String::from_utf8_lossy(&head))
            .ok_or_else(|| ConfigError::MissingVersionHeader(path.to_path_buf()))
    }

    #[must_use]
    pub fn parse(header_block: &str) -> Option<Self> {
        let version = header_value(header_block, "Version")?;
        let patch = header_value(header_block, "Patch");
        Some(Self { version, patch })
    }
}

/// Value of the first `name:` line. An empty first match hides later ones.
fn header_value(text: &str, name: &str) -> Option<String> {
    let value = text.lines().find_map(|line| {
        let line = line.trim_start_matches([' ', '\t', '/', '*', '#', '@']);
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name)
            .then(|| strip_comment_close(value).trim())
    })?;
    (!value.is_empty()).then(|| value.to_string())
}

fn strip_comment_close(value: &str) -> &str {
    let end = [value.find("*/"), value.find("?>")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(value.len());
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::ProductInfo;
    use crate::config::ConfigError;

    #[test]
    fn reads_version_and_patch_headers() {
        let header = "<?php\n/**\n * Plugin Name: Gallery\n * Version: 1.4.0\n * Patch: 1.4.2\n */\n";
        let info = ProductInfo::parse(header).expect("headers should parse");
        assert_eq!(info.version, "1.4.0");
        assert_eq!(info.patch.as_deref(), Some("1.4.2"));
    }

    #[test]
    fn patch_is_optional_and_empty_patch_is_none() {
        let info = ProductInfo::parse("Version: 2.0\nPatch:   \n").expect("headers should parse");
        assert_eq!(info.version, "2.0");
        assert_eq!(info.patch, None);
    }

    #[test]
    fn header_names_are_case_insensitive_and_comment_close_is_dropped() {
        let info =
            ProductInfo::parse("/* version: 3.1.0 */").expect("inline header should parse");
        assert_eq!(info.version, "3.1.0");
    }

    #[test]
    fn only_the_first_matching_line_counts() {
        let header = "/*\n * Version:\n * Patch: 1.0.1\n */\n// Version: 9.9.9\n";
        assert!(ProductInfo::parse(header).is_none());

        let info = ProductInfo::parse("Version: 1.0.0\nPatch:\n// Patch: 2.0.0\n")
            .expect("headers should parse");
        assert_eq!(info.patch, None);
    }

    #[test]
    fn similarly_named_headers_do_not_match() {
        assert!(ProductInfo::parse("Requires PHP Version: 7.4\n").is_none());
    }

    #[test]
    fn read_reports_missing_version_header() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("style.css");
        std::fs::write(&path, "/*\nTheme Name: Quill\n*/\n").expect("product file should be written");

        assert_eq!(
            ProductInfo::read(&path),
            Err(ConfigError::MissingVersionHeader(path.clone()))
        );
    }

    #[test]
    fn read_reports_unreadable_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let result = ProductInfo::read(&temp.path().join("missing.php"));
        assert!(matches!(
            result,
            Err(ConfigError::ProductFileUnreadable { .. })
        ));
    }
}
