//! File-backed coordination backend
//!
//! Address form: `file:///var/lib/shardline/coord`. Each node is a directory
//! under the base path; node data lives in a `.data` file written through a
//! temp file and an atomic rename. Locks are exclusive lock files under
//! `.locks/`, polled until the caller's timeout.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CoordinationError;
use crate::paths;
use crate::session::{CoordinationLock, CoordinationSession, Connector};

const SCHEME: &str = "file://";
const DATA_FILE: &str = ".data";
const LOCK_DIR: &str = ".locks";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Distinguishes temp files of concurrent writers in one process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Connector for `file://` addresses
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCoordinator;

impl FileCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Address for a base directory
    pub fn address_for(dir: impl AsRef<Path>) -> String {
        format!("{}{}", SCHEME, dir.as_ref().display())
    }
}

#[async_trait]
impl Connector for FileCoordinator {
    async fn connect(
        &self,
        address: &str,
    ) -> Result<Arc<dyn CoordinationSession>, CoordinationError> {
        let dir = address
            .strip_prefix(SCHEME)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| CoordinationError::Connect {
                address: address.to_string(),
                reason: format!("expected {}<directory>", SCHEME),
            })?;
        let base_dir = PathBuf::from(dir);
        fs::create_dir_all(base_dir.join(LOCK_DIR))
            .await
            .map_err(|e| CoordinationError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        info!("Opened file coordination session at {:?}", base_dir);
        Ok(Arc::new(FileSession {
            base_dir,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session rooted at a base directory
#[derive(Debug)]
pub struct FileSession {
    base_dir: PathBuf,
    closed: AtomicBool,
}

impl FileSession {
    fn check_open(&self) -> Result<(), CoordinationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoordinationError::Closed);
        }
        Ok(())
    }

    /// Directory of a node
    fn node_dir(&self, path: &str) -> Result<PathBuf, CoordinationError> {
        paths::validate(path)?;
        let mut dir = self.base_dir.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment.starts_with('.') {
                return Err(CoordinationError::InvalidPath(path.to_string()));
            }
            dir.push(segment);
        }
        Ok(dir)
    }

    async fn is_node(dir: &Path) -> Result<bool, CoordinationError> {
        match fs::metadata(dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Removes the lock file when dropped
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {:?}: {}", self.path, e);
        }
    }
}

#[async_trait]
impl CoordinationSession for FileSession {
    async fn ensure_node(&self, path: &str) -> Result<(), CoordinationError> {
        self.check_open()?;
        let dir = self.node_dir(path)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, CoordinationError> {
        self.check_open()?;
        let dir = self.node_dir(path)?;
        Self::is_node(&dir).await
    }

    async fn read_children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
        self.check_open()?;
        let dir = self.node_dir(path)?;
        if !Self::is_node(&dir).await? {
            return Err(CoordinationError::NotFound(path.to_string()));
        }
        let mut entries = fs::read_dir(&dir).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                children.push(name);
            }
        }
        children.sort();
        Ok(children)
    }

    async fn read_node(&self, path: &str) -> Result<Vec<u8>, CoordinationError> {
        self.check_open()?;
        let dir = self.node_dir(path)?;
        if !Self::is_node(&dir).await? {
            return Err(CoordinationError::NotFound(path.to_string()));
        }
        match fs::read(dir.join(DATA_FILE)).await {
            Ok(data) => Ok(data),
            // Node created without data
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_node(&self, path: &str, data: &[u8]) -> Result<(), CoordinationError> {
        self.check_open()?;
        let dir = self.node_dir(path)?;
        fs::create_dir_all(&dir).await?;

        // Write to temp file first, then atomically rename
        let data_path = dir.join(DATA_FILE);
        let temp_path = dir.join(format!(
            "{}.tmp.{}.{}",
            DATA_FILE,
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &data_path).await?;
        debug!("Wrote {} bytes to {:?}", data.len(), data_path);
        Ok(())
    }

    async fn acquire_lock(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<CoordinationLock, CoordinationError> {
        self.check_open()?;
        paths::validate_segment(name)?;
        let path = self.base_dir.join(LOCK_DIR).join(format!("{}.lock", name));
        let deadline = Instant::now() + timeout;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    debug!("Acquired lock file {:?}", path);
                    return Ok(CoordinationLock::new(name, LockFile { path }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(CoordinationError::LockTimeout(name.to_string()));
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn close(&self) -> Result<(), CoordinationError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Closed file coordination session at {:?}", self.base_dir);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
