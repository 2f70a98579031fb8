//! Connection providers
//!
//! The manager never builds connections itself. It asks an injected
//! [`ConnectionProvider`] to open one connection per descriptor at startup
//! and to close it at shutdown. Pools, drivers and retries are the
//! provider's business.

use async_trait::async_trait;
use parking_lot::RwLock;
use shardline_core::{ConnectionDescriptor, Endpoint};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Error reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Connection refused: {0}")]
    Refused(String),
    #[error("Unknown resource: {0}")]
    UnknownResource(String),
    #[error("Unsupported endpoint: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Other(String),
}

/// Opens and closes backing-store connections
#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self::Connection, ProviderError>;

    async fn close(&self, connection: &Self::Connection) -> Result<(), ProviderError>;
}

/// Resolves named endpoints against resources registered by the embedding
/// application. The application keeps ownership, so closing is a no-op.
pub struct NamedResourceProvider<C> {
    resources: RwLock<HashMap<String, Arc<C>>>,
}

impl<C> NamedResourceProvider<C> {
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace a resource
    pub fn register(&self, name: impl Into<String>, resource: Arc<C>) {
        self.resources.write().insert(name.into(), resource);
    }

    pub fn with_resource(self, name: impl Into<String>, resource: C) -> Self {
        self.register(name, Arc::new(resource));
        self
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> Default for NamedResourceProvider<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> ConnectionProvider for NamedResourceProvider<C> {
    type Connection = Arc<C>;

    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self::Connection, ProviderError> {
        match descriptor.endpoint() {
            Endpoint::Named { resource } => {
                let found = self.resources.read().get(resource).cloned();
                debug!("Resolved {} to resource {}", descriptor.id(), resource);
                found.ok_or_else(|| ProviderError::UnknownResource(resource.clone()))
            }
            other @ Endpoint::Direct { .. } => Err(ProviderError::Unsupported(other.to_string())),
        }
    }

    async fn close(&self, _connection: &Self::Connection) -> Result<(), ProviderError> {
        Ok(())
    }
}
