use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use scribo_core::models::User;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local snapshot of the signed-in user.
///
/// Only a hint: the session controller shows it until the remote
/// verification answers, then overwrites or clears it.
pub trait UserCache: Send + Sync {
    fn load(&self) -> Result<Option<User>, CacheError>;
    fn store(&self, user: &User) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

/// User cache persisted as JSON on disk (mode 0600 on unix).
#[derive(Debug, Clone)]
pub struct FileUserCache {
    path: PathBuf,
}

impl FileUserCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UserCache for FileUserCache {
    fn load(&self) -> Result<Option<User>, CacheError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn store(&self, user: &User) -> Result<(), CacheError> {
        let data = serde_json::to_string_pretty(user)?;
        write_private(&self.path, data.as_bytes())?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process cache for embedders that have no disk to write to.
#[derive(Debug, Default)]
pub struct MemoryUserCache {
    slot: Mutex<Option<User>>,
}

impl MemoryUserCache {
    pub fn with_user(user: User) -> Self {
        Self {
            slot: Mutex::new(Some(user)),
        }
    }
}

impl UserCache for MemoryUserCache {
    fn load(&self) -> Result<Option<User>, CacheError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn store(&self, user: &User) -> Result<(), CacheError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Write `data` to `path`, creating parent directories, readable by the
/// owner only.
pub(crate) fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    Ok(())
}

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}
