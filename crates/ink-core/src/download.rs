use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::transport::{Transport, TransportError};

const FALLBACK_FILE_NAME: &str = "update-download";

/// Where `url` is downloaded to inside `dir`: the last path segment of the
/// URL, or `update-download` when that is empty or unsafe.
#[must_use]
pub fn archive_path(dir: &Path, url: &str) -> PathBuf {
    let raw_name = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or(FALLBACK_FILE_NAME);
    let file_name = Path::new(raw_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && !name.contains(".."))
        .unwrap_or(FALLBACK_FILE_NAME);
    dir.join(file_name)
}

/// Fetch `url` into `dest`, replacing a leftover file from an earlier cycle.
/// An empty body removes the file and fails.
///
/// # Errors
/// Returns an error when the directory cannot be created, the transfer fails
/// or the body is empty.
pub async fn download_to(
    transport: &dyn Transport,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<u64, TransportError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|error| {
            TransportError::io_with_path("failed to create download directory", parent, &error)
        })?;
    }

    info!("Downloading {url} to {}", dest.display());
    let written = transport.download(url, dest, timeout).await?;
    if written == 0 {
        if let Err(error) = tokio::fs::remove_file(dest).await
            && error.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove empty download {}: {error}", dest.display());
        }
        return Err(TransportError::EmptyBody {
            context: "archive download",
        });
    }
    Ok(written)
}
