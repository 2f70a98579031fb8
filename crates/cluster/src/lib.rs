//! Cluster manager
//!
//! Ties the pieces together: loads the topology, opens one connection per
//! descriptor through a [`ConnectionProvider`], resolves table shard counts
//! (publishing local definitions or reading them from the coordination
//! service), builds a router per cluster and hands out [`ResourceHandle`]s.
//!
//! # Usage Example
//! ```ignore
//! use shardline_cluster::{ClusterManager, ManagerConfig, YamlTopologyLoader};
//! use shardline_coordination::MemoryCoordinator;
//! use shardline_router::ShardingKey;
//!
//! let manager = ClusterManager::builder(
//!     Arc::new(YamlTopologyLoader::new("topology.yaml")),
//!     Arc::new(provider),
//!     Arc::new(MemoryCoordinator::new()),
//! )
//! .config(ManagerConfig::from_file("manager.yaml")?)
//! .tables(tables)
//! .build();
//!
//! manager.startup().await?;
//! let handle = manager.sharded_master("orders", &ShardingKey::new("C1", 123456u64))?;
//! println!("{} -> {}", handle.physical_table(), handle.connection_id());
//! manager.shutdown().await?;
//! ```

pub mod config;
mod connections;
pub mod error;
pub mod manager;
pub mod provider;
pub mod resource;
pub mod schema;

pub use config::{
    ClusterConfig, ConfigError, ConfigLoader, DescriptorConfig, GlobalConfig, ManagerConfig,
    RegionConfig, ShardInfoSource, StaticTopologyLoader, SyncAction, TopologyConfig,
    YamlTopologyLoader,
};
pub use error::{ClusterError, ErrorKind};
pub use manager::{ClusterManager, ClusterManagerBuilder, LifecycleState};
pub use provider::{ConnectionProvider, NamedResourceProvider, ProviderError};
pub use resource::{physical_table_name, RegionDiagnostics, ResourceHandle};
pub use schema::{SchemaSynchronizer, SyncReport};
