//! Configuration for the cluster manager
//!
//! Two documents, both YAML:
//! - [`ManagerConfig`]: how the manager behaves (coordination namespace,
//!   shard-info authority, timeouts, schema synchronization)
//! - [`TopologyConfig`]: the clusters themselves, loaded through a
//!   [`ConfigLoader`]
//!
//! Example topology:
//!
//! ```yaml
//! hash_algorithm: bernstein
//! coordination_address: memory://local
//! clusters:
//!   - name: users
//!     router: modulo
//!     global:
//!       master: { type: direct, url: "db://g0/users", username: app, password: secret }
//!       slaves:
//!         - { type: named, resource: users-global-ro }
//!     regions:
//!       - capacity: "0-1000000"
//!         masters:
//!           - { type: named, resource: users-m0 }
//!           - { type: named, resource: users-m1 }
//!         slaves:
//!           - - { type: named, resource: users-s0-0 }
//!             - { type: named, resource: users-s0-1 }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shardline_core::{
    Capacity, ClusterInfo, ConnectionDescriptor, Endpoint, HashAlgorithm, RegionInfo, Topology,
    TopologyError,
};
use shardline_coordination::paths::DEFAULT_ROOT;
use shardline_coordination::Namespace;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Where table shard counts come from at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardInfoSource {
    /// Use local table definitions and publish them to the coordination service
    #[default]
    Local,
    /// Read what another process published
    Remote,
}

/// Schema work performed after shard counts are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    #[default]
    None,
    /// Create missing tables
    Create,
    /// Create missing tables and apply column changes
    Update,
}

/// Cluster manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Root node of everything written to the coordination service
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub shard_info_source: ShardInfoSource,
    /// Per connection attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per coordination service call
    #[serde(default = "default_coordination_timeout_ms")]
    pub coordination_timeout_ms: u64,
    #[serde(default)]
    pub sync_action: SyncAction,
    /// Coordination lock held during schema synchronization
    #[serde(default = "default_schema_lock")]
    pub schema_lock: String,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            shard_info_source: ShardInfoSource::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            coordination_timeout_ms: default_coordination_timeout_ms(),
            sync_action: SyncAction::default(),
            schema_lock: default_schema_lock(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to YAML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let yaml =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(&mut self, other: ManagerConfig) {
        if !other.namespace.is_empty() {
            self.namespace = other.namespace;
        }
        if other.shard_info_source != ShardInfoSource::default() {
            self.shard_info_source = other.shard_info_source;
        }
        if other.connect_timeout_ms > 0 {
            self.connect_timeout_ms = other.connect_timeout_ms;
        }
        if other.coordination_timeout_ms > 0 {
            self.coordination_timeout_ms = other.coordination_timeout_ms;
        }
        if other.sync_action != SyncAction::default() {
            self.sync_action = other.sync_action;
        }
        if !other.schema_lock.is_empty() {
            self.schema_lock = other.schema_lock;
        }
        if other.lock_timeout_ms > 0 {
            self.lock_timeout_ms = other.lock_timeout_ms;
        }
    }

    pub fn namespace(&self) -> Result<Namespace, ConfigError> {
        Namespace::new(self.namespace.clone()).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn coordination_timeout(&self) -> Duration {
        Duration::from_millis(self.coordination_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Endpoint plus per-descriptor properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorConfig {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl DescriptorConfig {
    fn into_descriptor(self) -> ConnectionDescriptor {
        self.properties
            .into_iter()
            .fold(ConnectionDescriptor::new(self.endpoint), |d, (k, v)| {
                d.with_property(k, v)
            })
    }
}

/// Global (un-sharded) connections of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub master: DescriptorConfig,
    #[serde(default)]
    pub slaves: Vec<DescriptorConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// `"start-end,start-end"`
    pub capacity: String,
    pub masters: Vec<DescriptorConfig>,
    /// Slave sets, each with one entry per master
    #[serde(default)]
    pub slaves: Vec<Vec<DescriptorConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    /// Routing strategy name; the manager's default when absent
    #[serde(default)]
    pub router: Option<String>,
    #[serde(default)]
    pub global: Option<GlobalConfig>,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

/// Serializable topology document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    pub coordination_address: String,
    pub clusters: Vec<ClusterConfig>,
}

impl TopologyConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Parse capacities and algorithm names, then validate
    pub fn into_topology(self) -> Result<Topology, ConfigError> {
        let hash: HashAlgorithm = self.hash_algorithm.parse()?;
        let mut clusters = Vec::with_capacity(self.clusters.len());
        for cluster in self.clusters {
            let mut info = ClusterInfo::new(cluster.name);
            if let Some(router) = cluster.router {
                info = info.with_router(router);
            }
            if let Some(global) = cluster.global {
                info = info.with_global_master(global.master.into_descriptor());
                for slave in global.slaves {
                    info = info.with_global_slave(slave.into_descriptor());
                }
            }
            for region in cluster.regions {
                let capacity = Capacity::parse(&region.capacity)?;
                let masters = region
                    .masters
                    .into_iter()
                    .map(DescriptorConfig::into_descriptor)
                    .collect();
                let mut region_info = RegionInfo::new(capacity, masters);
                for set in region.slaves {
                    region_info = region_info.with_slave_set(
                        set.into_iter().map(DescriptorConfig::into_descriptor).collect(),
                    );
                }
                info = info.with_region(region_info);
            }
            clusters.push(info);
        }
        Ok(Topology::new(clusters, hash, self.coordination_address)?)
    }
}

/// Source of the cluster topology
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    async fn load_topology(&self) -> Result<Topology, ConfigError>;
}

/// Reads a [`TopologyConfig`] YAML file
#[derive(Debug, Clone)]
pub struct YamlTopologyLoader {
    path: PathBuf,
}

impl YamlTopologyLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigLoader for YamlTopologyLoader {
    async fn load_topology(&self) -> Result<Topology, ConfigError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::IoError(format!("{}: {}", self.path.display(), e)))?;
        let topology = TopologyConfig::from_yaml(&content)?.into_topology()?;
        info!(
            "Loaded topology from {:?}: {} clusters, {} regions, {} connections",
            self.path,
            topology.clusters().len(),
            topology.region_count(),
            topology.connection_count()
        );
        Ok(topology)
    }
}

/// Hands out a topology built in code
#[derive(Debug, Clone)]
pub struct StaticTopologyLoader {
    topology: Topology,
}

impl StaticTopologyLoader {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }
}

#[async_trait]
impl ConfigLoader for StaticTopologyLoader {
    async fn load_topology(&self) -> Result<Topology, ConfigError> {
        Ok(self.topology.clone())
    }
}

// Default value functions

fn default_namespace() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000 // 5 seconds
}

fn default_coordination_timeout_ms() -> u64 {
    3000 // 3 seconds
}

fn default_schema_lock() -> String {
    "schema-sync".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    30000 // 30 seconds
}

fn default_hash_algorithm() -> String {
    HashAlgorithm::default().name().to_string()
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}
