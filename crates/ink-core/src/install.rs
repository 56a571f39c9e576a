use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
}

impl InstallError {
    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

/// Unpack `archive` into `install_dir`. The archive carries the product
/// directory itself, so files land at `install_dir/<product>/...`, replacing
/// whatever is there.
///
/// # Errors
/// Returns an error when the directory cannot be created or the archive
/// cannot be read or extracted.
pub fn install_archive(archive: &Path, install_dir: &Path) -> Result<PathBuf, InstallError> {
    std::fs::create_dir_all(install_dir).map_err(|error| {
        InstallError::io_with_path("failed to create install directory", install_dir, &error)
    })?;
    info!(
        "Installing {} into {}",
        archive.display(),
        install_dir.display()
    );
    extract_zip(archive, install_dir)?;
    Ok(install_dir.to_path_buf())
}

/// Extract every entry of `zip_path` below `dest`. Entries whose path would
/// leave `dest` are skipped.
///
/// # Errors
/// Returns an error when the archive is unreadable or a file cannot be
/// written.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), InstallError> {
    let file = std::fs::File::open(zip_path).map_err(|error| {
        InstallError::io_with_path("failed to open zip file", zip_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| InstallError::zip("failed to read zip archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| InstallError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                InstallError::io_with_path("failed to create extraction directory", &out_path, &error)
            })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    InstallError::io_with_path(
                        "failed to create extraction parent directory",
                        parent,
                        &error,
                    )
                })?;
            }
            let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
                InstallError::io_with_path("failed to create extracted file", &out_path, &error)
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|error| {
                InstallError::io_with_path("failed to extract archive entry", &out_path, &error)
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ =
                        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
                }
            }
        }
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}
