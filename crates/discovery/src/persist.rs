//! Atomic persistence of the cache file.
//!
//! The full file content is marshalled, written to a temp sibling with
//! mode 0600, and renamed over the target, so an interrupted write can
//! never corrupt the live file. An advisory lock file serializes writers
//! across processes.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use wh_domain::error::{Error, Result};

use crate::cache::CacheEntry;

pub const CACHE_FILE_VERSION: u32 = 1;

/// The persisted document: a versioned map of provider name → entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub providers: HashMap<String, CacheEntry>,
}

impl CacheFile {
    pub fn empty() -> Self {
        Self {
            version: CACHE_FILE_VERSION,
            updated_at: Utc::now(),
            providers: HashMap::new(),
        }
    }
}

/// Load the cache file; a missing file is an empty cache, a malformed or
/// version-mismatched file is discarded with a warning.
pub fn load(path: &Path) -> CacheFile {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(_) => return CacheFile::empty(),
    };
    match serde_json::from_slice::<CacheFile>(&raw) {
        Ok(file) if file.version == CACHE_FILE_VERSION => file,
        Ok(file) => {
            tracing::warn!(
                path = %path.display(),
                version = file.version,
                "cache file version mismatch, starting fresh"
            );
            CacheFile::empty()
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "cache file is malformed, starting fresh"
            );
            CacheFile::empty()
        }
    }
}

/// Atomically write the full cache file.
pub fn store(path: &Path, file: &CacheFile) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::validation("cache path has no parent directory"))?;
    std::fs::create_dir_all(dir)?;

    let _guard = FileLockGuard::acquire(path)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, file)
        .map_err(|e| Error::unknown(format!("failed to encode cache file: {e}")).with_cause(e))?;
    tmp.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path)
        .map_err(|e| Error::unknown(format!("failed to replace cache file: {e}")))?;
    Ok(())
}

/// Advisory cross-process lock on `<path>.lock`, released on drop.
struct FileLockGuard {
    file: std::fs::File,
}

impl FileLockGuard {
    fn acquire(target: &Path) -> Result<Self> {
        let lock_path = target.with_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
