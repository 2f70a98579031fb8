//! Cluster manager errors
//!
//! Every failure surfaces as a [`ClusterError`]; [`ClusterError::kind`]
//! folds it into the coarse taxonomy callers branch on.

use shardline_coordination::CoordinationError;
use shardline_core::{RegistryError, TopologyError};
use shardline_router::RoutingError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigError, ShardInfoSource};
use crate::manager::LifecycleState;
use crate::provider::ProviderError;

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed topology or settings; fatal at startup
    Configuration,
    /// Backing store or coordination service unreachable
    Connectivity,
    /// Key outside capacity, unknown cluster or table
    Routing,
    /// An explicitly requested slave does not exist
    ReplicaNotConfigured,
    /// Operation not allowed in the manager's current state
    InvalidState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Routing => "routing",
            ErrorKind::ReplicaNotConfigured => "replica not configured",
            ErrorKind::InvalidState => "invalid state",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("Table registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),
    #[error("Failed to open connection {id}: {source}")]
    Connect {
        id: String,
        #[source]
        source: ProviderError,
    },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },
    #[error("No table shard info resolved from {0:?} source")]
    NoTables(ShardInfoSource),
    #[error("Schema sync of {table} failed on {id}: {reason}")]
    SchemaSync {
        id: String,
        table: String,
        reason: String,
    },
}

impl ClusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::Config(_)
            | ClusterError::Topology(_)
            | ClusterError::Registry(_)
            | ClusterError::NoTables(_) => ErrorKind::Configuration,
            ClusterError::Routing(RoutingError::ReplicaNotConfigured { .. }) => {
                ErrorKind::ReplicaNotConfigured
            }
            ClusterError::Routing(RoutingError::UnknownStrategy(_)) => ErrorKind::Configuration,
            ClusterError::Routing(_) => ErrorKind::Routing,
            ClusterError::Coordination(CoordinationError::Corrupt { .. })
            | ClusterError::Coordination(CoordinationError::InvalidPath(_))
            | ClusterError::Coordination(CoordinationError::Serialization(_)) => {
                ErrorKind::Configuration
            }
            ClusterError::Coordination(_)
            | ClusterError::Connect { .. }
            | ClusterError::Timeout { .. }
            | ClusterError::SchemaSync { .. } => ErrorKind::Connectivity,
            ClusterError::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }
}
