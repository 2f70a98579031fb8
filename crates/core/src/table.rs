//! Table shard counts
//!
//! [`TableShardInfo`] records how many partitions a table is split into per
//! physical database. [`TableShardRegistry`] is the lookup built once at
//! startup, either from local table definitions or from the coordination
//! service, and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::error::RegistryError;
use crate::topology::Topology;

/// Shard count and key field of one (cluster, table) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableShardInfo {
    pub cluster: String,
    pub table: String,
    /// Number of table partitions; 0 means a global table
    pub shard_count: u32,
    /// Field holding the sharding key
    #[serde(default)]
    pub sharding_field: Option<String>,
}

impl TableShardInfo {
    /// Un-sharded table
    pub fn global(cluster: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            table: table.into(),
            shard_count: 0,
            sharding_field: None,
        }
    }

    /// Table split into `shard_count` partitions on `field`
    pub fn sharded(
        cluster: impl Into<String>,
        table: impl Into<String>,
        shard_count: u32,
        field: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            table: table.into(),
            shard_count,
            sharding_field: Some(field.into()),
        }
    }

    pub fn is_global(&self) -> bool {
        self.shard_count == 0
    }

    fn check(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidTable {
            cluster: self.cluster.clone(),
            table: self.table.clone(),
            reason: reason.to_string(),
        };
        if self.cluster.trim().is_empty() {
            return Err(invalid("cluster name must not be blank"));
        }
        if self.table.trim().is_empty() {
            return Err(invalid("table name must not be blank"));
        }
        if !self.is_global()
            && self
                .sharding_field
                .as_deref()
                .map_or(true, |f| f.trim().is_empty())
        {
            return Err(invalid("sharded table requires a sharding field"));
        }
        Ok(())
    }
}

/// Lookup of table shard counts, keyed by cluster then table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableShardRegistry {
    tables: HashMap<String, BTreeMap<String, TableShardInfo>>,
}

impl TableShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from table definitions, rejecting duplicates
    pub fn from_tables<I>(tables: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = TableShardInfo>,
    {
        let mut registry = Self::new();
        for info in tables {
            info.check()?;
            let per_cluster = registry.tables.entry(info.cluster.clone()).or_default();
            if per_cluster.contains_key(&info.table) {
                return Err(RegistryError::Duplicate {
                    cluster: info.cluster,
                    table: info.table,
                });
            }
            debug!(
                "Registered table {}.{} with {} shards",
                info.cluster, info.table, info.shard_count
            );
            per_cluster.insert(info.table.clone(), info);
        }
        Ok(registry)
    }

    /// Full info for a (cluster, table) pair
    pub fn info(&self, cluster: &str, table: &str) -> Result<&TableShardInfo, RegistryError> {
        self.tables
            .get(cluster)
            .and_then(|t| t.get(table))
            .ok_or_else(|| RegistryError::NotFound {
                cluster: cluster.to_string(),
                table: table.to_string(),
            })
    }

    /// Number of partitions of `table` in `cluster`
    pub fn table_number(&self, cluster: &str, table: &str) -> Result<u32, RegistryError> {
        self.info(cluster, table).map(|i| i.shard_count)
    }

    /// Same value as [`Self::table_number`]
    pub fn shard_count(&self, cluster: &str, table: &str) -> Result<u32, RegistryError> {
        self.table_number(cluster, table)
    }

    pub fn sharding_field(
        &self,
        cluster: &str,
        table: &str,
    ) -> Result<Option<&str>, RegistryError> {
        self.info(cluster, table).map(|i| i.sharding_field.as_deref())
    }

    /// Tables of one cluster, ordered by name
    pub fn tables_in(&self, cluster: &str) -> Vec<&TableShardInfo> {
        self.tables
            .get(cluster)
            .map(|t| t.values().collect())
            .unwrap_or_default()
    }

    /// Clusters defining `table`, ordered by name
    pub fn clusters_of(&self, table: &str) -> Vec<&str> {
        let mut clusters: Vec<&str> = self
            .tables
            .iter()
            .filter(|(_, t)| t.contains_key(table))
            .map(|(c, _)| c.as_str())
            .collect();
        clusters.sort_unstable();
        clusters
    }

    /// Every table, ordered by cluster then name
    pub fn iter(&self) -> impl Iterator<Item = &TableShardInfo> {
        let mut clusters: Vec<&String> = self.tables.keys().collect();
        clusters.sort();
        clusters
            .into_iter()
            .flat_map(move |c| self.tables[c].values())
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn global_table_count(&self) -> usize {
        self.iter().filter(|i| i.is_global()).count()
    }

    /// Check that every table belongs to a known cluster and that sharded
    /// tables have regions to live in
    pub fn check_topology(&self, topology: &Topology) -> Result<(), RegistryError> {
        for info in self.iter() {
            let cluster = topology
                .cluster(&info.cluster)
                .ok_or_else(|| RegistryError::UnknownCluster {
                    cluster: info.cluster.clone(),
                    table: info.table.clone(),
                })?;
            if !info.is_global() && cluster.regions().is_empty() {
                return Err(RegistryError::NoRegions {
                    cluster: info.cluster.clone(),
                    table: info.table.clone(),
                });
            }
        }
        Ok(())
    }
}
