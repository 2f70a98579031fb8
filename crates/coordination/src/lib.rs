//! Coordination service access
//!
//! Processes sharing a cluster agree on table shard counts and serialize
//! schema changes through an external coordination service. This crate
//! defines the session interface the rest of shardline consumes, two
//! backends, and the publication format for shard counts.
//!
//! # Backends
//! - [`MemoryCoordinator`]: shared in-process store; every session connected
//!   through the same instance sees the same nodes and locks
//! - [`FileCoordinator`]: nodes persisted as directories under a base path,
//!   shared by processes on one host
//!
//! # Usage Example
//! ```ignore
//! use shardline_coordination::{Connector, MemoryCoordinator, Namespace, ShardInfoStore};
//!
//! let session = MemoryCoordinator::new().connect("memory://local").await?;
//! let store = ShardInfoStore::new(session, Namespace::default());
//! store.publish(registry.iter()).await?;
//! ```

pub mod error;
pub mod file;
pub mod memory;
pub mod paths;
pub mod session;
pub mod shard_info;

pub use error::CoordinationError;
pub use file::FileCoordinator;
pub use memory::MemoryCoordinator;
pub use paths::Namespace;
pub use session::{CoordinationLock, CoordinationSession, Connector};
pub use shard_info::{ShardInfoRecord, ShardInfoStore};
