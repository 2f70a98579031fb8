//! Coordination session interface

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoordinationError;

/// Opens sessions against a coordination service address
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
    ) -> Result<Arc<dyn CoordinationSession>, CoordinationError>;
}

/// Session with the coordination service
///
/// Paths are absolute and `/` separated. Every operation on a closed
/// session fails with [`CoordinationError::Closed`], except `close` itself.
#[async_trait]
pub trait CoordinationSession: Send + Sync + fmt::Debug {
    /// Create the node and any missing ancestors; existing nodes are kept
    async fn ensure_node(&self, path: &str) -> Result<(), CoordinationError>;

    async fn exists(&self, path: &str) -> Result<bool, CoordinationError>;

    /// Child names, sorted
    async fn read_children(&self, path: &str) -> Result<Vec<String>, CoordinationError>;

    async fn read_node(&self, path: &str) -> Result<Vec<u8>, CoordinationError>;

    /// Create the node (and ancestors) or overwrite its data
    async fn write_node(&self, path: &str, data: &[u8]) -> Result<(), CoordinationError>;

    /// Acquire a named cross-process lock, waiting at most `timeout`
    async fn acquire_lock(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<CoordinationLock, CoordinationError>;

    /// Close the session. Closing twice is a no-op.
    async fn close(&self) -> Result<(), CoordinationError>;

    fn is_closed(&self) -> bool;
}

/// Backend specific state that releases the lock when dropped
pub(crate) trait LockHandle: Send + Sync {}

impl<T: Send + Sync> LockHandle for T {}

/// Held lock; released on drop
pub struct CoordinationLock {
    name: String,
    _handle: Box<dyn LockHandle>,
}

impl CoordinationLock {
    pub(crate) fn new(name: impl Into<String>, handle: impl LockHandle + 'static) -> Self {
        Self {
            name: name.into(),
            _handle: Box::new(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release explicitly
    pub fn release(self) {
        tracing::debug!("Released lock {}", self.name);
    }
}

impl fmt::Debug for CoordinationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinationLock")
            .field("name", &self.name)
            .finish()
    }
}
