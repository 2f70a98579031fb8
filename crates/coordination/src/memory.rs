//! In-process coordination backend
//!
//! All sessions connected through one [`MemoryCoordinator`] (or its clones)
//! share one node tree and one lock table, so several cluster managers in a
//! process behave like independent processes against one service.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::error::CoordinationError;
use crate::paths;
use crate::session::{CoordinationLock, CoordinationSession, Connector};

#[derive(Debug, Default)]
struct MemoryStore {
    nodes: RwLock<BTreeMap<String, Vec<u8>>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
}

impl MemoryStore {
    fn ensure_ancestors(nodes: &mut BTreeMap<String, Vec<u8>>, path: &str) {
        for ancestor in paths::ancestors(path) {
            nodes.entry(ancestor.to_string()).or_default();
        }
    }

    /// Drop a lock entry nobody holds or waits on
    fn prune_lock(&self, name: &str) {
        let mut locks = self.locks.lock();
        if locks.get(name).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(name);
        }
    }
}

/// Held lock; its table entry goes away with the last user
struct MemoryLock {
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
    store: Arc<MemoryStore>,
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        self.guard.take();
        self.store.prune_lock(&self.name);
    }
}

/// Shared in-memory coordination service
#[derive(Debug, Clone, Default)]
pub struct MemoryCoordinator {
    store: Arc<MemoryStore>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions opened so far
    pub fn sessions_opened(&self) -> usize {
        self.store.sessions_opened.load(Ordering::SeqCst)
    }

    /// Sessions closed so far
    pub fn sessions_closed(&self) -> usize {
        self.store.sessions_closed.load(Ordering::SeqCst)
    }

    /// Lock names currently held or awaited
    pub fn lock_count(&self) -> usize {
        self.store.locks.lock().len()
    }

    /// Snapshot of every node path
    pub fn node_paths(&self) -> Vec<String> {
        self.store.nodes.read().keys().cloned().collect()
    }
}

#[async_trait]
impl Connector for MemoryCoordinator {
    async fn connect(
        &self,
        address: &str,
    ) -> Result<Arc<dyn CoordinationSession>, CoordinationError> {
        let id = self.store.sessions_opened.fetch_add(1, Ordering::SeqCst);
        info!("Opened in-memory coordination session {} for {}", id, address);
        Ok(Arc::new(MemorySession {
            id,
            store: self.store.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session against a [`MemoryCoordinator`]
#[derive(Debug)]
pub struct MemorySession {
    id: usize,
    store: Arc<MemoryStore>,
    closed: AtomicBool,
}

impl MemorySession {
    fn check_open(&self) -> Result<(), CoordinationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoordinationError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationSession for MemorySession {
    async fn ensure_node(&self, path: &str) -> Result<(), CoordinationError> {
        self.check_open()?;
        paths::validate(path)?;
        let mut nodes = self.store.nodes.write();
        MemoryStore::ensure_ancestors(&mut nodes, path);
        nodes.entry(path.to_string()).or_default();
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, CoordinationError> {
        self.check_open()?;
        paths::validate(path)?;
        Ok(path == "/" || self.store.nodes.read().contains_key(path))
    }

    async fn read_children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
        self.check_open()?;
        paths::validate(path)?;
        let nodes = self.store.nodes.read();
        if path != "/" && !nodes.contains_key(path) {
            return Err(CoordinationError::NotFound(path.to_string()));
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        let children = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(children)
    }

    async fn read_node(&self, path: &str) -> Result<Vec<u8>, CoordinationError> {
        self.check_open()?;
        paths::validate(path)?;
        self.store
            .nodes
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| CoordinationError::NotFound(path.to_string()))
    }

    async fn write_node(&self, path: &str, data: &[u8]) -> Result<(), CoordinationError> {
        self.check_open()?;
        paths::validate(path)?;
        let mut nodes = self.store.nodes.write();
        MemoryStore::ensure_ancestors(&mut nodes, path);
        nodes.insert(path.to_string(), data.to_vec());
        debug!("Session {} wrote {} bytes to {}", self.id, data.len(), path);
        Ok(())
    }

    async fn acquire_lock(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<CoordinationLock, CoordinationError> {
        self.check_open()?;
        paths::validate_segment(name)?;
        let mutex = self
            .store
            .locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        let acquired = tokio::time::timeout(timeout, mutex.lock_owned()).await;
        let guard = match acquired {
            Ok(guard) => guard,
            Err(_) => {
                self.store.prune_lock(name);
                return Err(CoordinationError::LockTimeout(name.to_string()));
            }
        };
        debug!("Session {} acquired lock {}", self.id, name);
        Ok(CoordinationLock::new(
            name,
            MemoryLock {
                name: name.to_string(),
                guard: Some(guard),
                store: self.store.clone(),
            },
        ))
    }

    async fn close(&self) -> Result<(), CoordinationError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.store.sessions_closed.fetch_add(1, Ordering::SeqCst);
            info!("Closed in-memory coordination session {}", self.id);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
