use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::TimeDelta;
use fs2::FileExt;
use log::{debug, warn};
use serde_json::Value;

use crate::entry::StoredEntry;
use crate::{Clock, KeyValueStore, StoreError, SystemClock, UpdateFn};

const LOCK_FILE_NAME: &str = ".store.lock";

/// One JSON file per key below `root`.
///
/// Every operation holds an advisory lock on `root/.store.lock` (shared for
/// reads, exclusive for writes), so set-if-absent and read-modify-write are
/// atomic across worker processes. Files are replaced atomically and never
/// appended to, so a file left behind by a crashed writer is simply
/// overwritten.
pub struct FileStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

struct DirLock {
    file: File,
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    ///
    /// # Errors
    /// Returns an error if the root directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    /// # Errors
    /// Returns an error if the root directory cannot be created.
    pub fn with_clock(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|error| {
            StoreError::io_with_path("failed to create store directory", &root, &error)
        })?;
        Ok(Self { root, clock })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.json", encode_key(key)?)))
    }

    fn lock(&self, exclusive: bool) -> Result<DirLock, StoreError> {
        let path = self.root.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|error| {
                StoreError::io_with_path("failed to open store lock file", &path, &error)
            })?;

        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|error| StoreError::io("failed to lock store", error))?;

        Ok(DirLock { file })
    }

    fn read_entry(&self, path: &Path) -> Result<Option<StoredEntry>, StoreError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(StoreError::io_with_path(
                    "failed to read store entry",
                    path,
                    &error,
                ));
            }
        };

        match serde_json::from_str::<StoredEntry>(&data) {
            Ok(entry) => Ok(Some(entry)),
            Err(error) => {
                warn!("Ignoring corrupted store entry {}: {error}", path.display());
                Ok(None)
            }
        }
    }

    fn read_live(&self, path: &Path) -> Result<Option<StoredEntry>, StoreError> {
        let now = self.clock.now();
        Ok(self.read_entry(path)?.filter(|entry| entry.is_live(now)))
    }

    fn write_entry(&self, path: &Path, entry: &StoredEntry) -> Result<(), StoreError> {
        let data = serde_json::to_vec(entry)
            .map_err(|error| StoreError::serialize("failed to encode store entry", error))?;
        write_atomic(path, &data)
            .map_err(|error| StoreError::io_with_path("failed to write store entry", path, &error))
    }

    fn remove(path: &Path) -> Result<(), StoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::io_with_path(
                "failed to remove store entry",
                path,
                &error,
            )),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(false)?;
        Ok(self.read_live(&path)?.map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(true)?;
        self.write_entry(&path, &StoredEntry::new(value, ttl, self.clock.now()))
    }

    fn add(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(true)?;
        if self.read_live(&path)?.is_some() {
            debug!("Store key {key} already present, add skipped");
            return Ok(false);
        }
        self.write_entry(&path, &StoredEntry::new(value, ttl, self.clock.now()))?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(true)?;
        let existed = self.read_live(&path)?.is_some();
        Self::remove(&path)?;
        Ok(existed)
    }

    fn take(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(true)?;
        let value = self.read_live(&path)?.map(|entry| entry.value);
        Self::remove(&path)?;
        Ok(value)
    }

    fn delete_if(
        &self,
        key: &str,
        matches: &mut dyn FnMut(&Value) -> bool,
    ) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(true)?;
        let Some(entry) = self.read_live(&path)? else {
            return Ok(false);
        };
        if !matches(&entry.value) {
            return Ok(false);
        }
        Self::remove(&path)?;
        Ok(true)
    }

    fn update(
        &self,
        key: &str,
        ttl: Option<TimeDelta>,
        apply: &mut UpdateFn<'_>,
    ) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(true)?;
        let current = self.read_live(&path)?.map(|entry| entry.value);
        match apply(current) {
            Some(value) => {
                self.write_entry(&path, &StoredEntry::new(value, ttl, self.clock.now()))
            }
            None => Self::remove(&path),
        }
    }
}

/// Map a key onto a file stem. Unreserved characters pass through, anything
/// else is percent-encoded so actor identities cannot escape the store root.
fn encode_key(key: &str) -> Result<String, StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }

    let mut encoded = String::with_capacity(key.len());
    for (index, byte) in key.bytes().enumerate() {
        let unreserved = byte.is_ascii_alphanumeric()
            || byte == b'-'
            || byte == b'_'
            || (byte == b'.' && index > 0);
        if unreserved {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    Ok(encoded)
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "store path has no parent")
    })?;

    let file_name = path
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("entry");
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let pid = std::process::id();

    let mut tmp_path = None;
    for attempt in 0..16_u8 {
        let candidate = parent.join(format!(".{file_name}.{pid}.{timestamp}.{attempt}.tmp"));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                file.write_all(data)?;
                file.sync_all()?;
                tmp_path = Some(candidate);
                break;
            }
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(error) => return Err(error),
        }
    }

    let Some(tmp_path) = tmp_path else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "failed to create unique store temp file",
        ));
    };

    if let Err(error) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(error);
    }

    Ok(())
}
