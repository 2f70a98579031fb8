//! Shardline core types
//!
//! Pure data shared by every other shardline crate:
//! - Capacity ranges over the sharding-key domain
//! - Cluster topology (clusters, regions, replica sets, connection descriptors)
//! - Hash algorithms used to turn string keys into numeric positions
//! - Table shard counts and the registry that answers lookups against them

pub mod capacity;
pub mod error;
pub mod hash;
pub mod table;
pub mod topology;

pub use capacity::{Capacity, KeyRange};
pub use error::{RegistryError, TopologyError};
pub use hash::HashAlgorithm;
pub use table::{TableShardInfo, TableShardRegistry};
pub use topology::{
    ClusterInfo, ClusterStats, ConnectionDescriptor, Endpoint, RegionInfo, ReplicaRole, Topology,
};
