//! Sharding router
//!
//! Routing a sharded table is done in four steps:
//! 1. the key value is hashed (text) and mapped into the cluster's domain
//!    by the cluster's strategy; regions are scanned in configured order and
//!    the first one containing the position wins
//! 2. the table partition is `position % shard_count`; a shard count of 0
//!    means a global table and short-circuits to the global connections
//! 3. the strategy picks a physical database in the region; the same index
//!    picks the database in every slave set
//! 4. the replica role is resolved (master, a given slave, or automatic)

use rand::Rng;
use serde::Serialize;
use shardline_core::{ClusterInfo, HashAlgorithm, ReplicaRole, TableShardRegistry, Topology};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::RoutingError;
use crate::key::ShardingKey;
use crate::role::{Role, SlaveSelector};
use crate::strategy::{RoutingStrategy, StrategyRegistry};

/// Where a row lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Placement {
    /// Un-sharded table on the cluster's global connections
    Global,
    /// Partition of a sharded table
    Sharded {
        region_index: usize,
        database_index: usize,
        table_index: u32,
    },
}

/// Router output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteResult {
    pub cluster: String,
    pub table: String,
    pub placement: Placement,
    /// Resolved replica; automatic slave selection is already applied
    pub role: ReplicaRole,
}

impl RouteResult {
    pub fn is_global(&self) -> bool {
        matches!(self.placement, Placement::Global)
    }

    pub fn region_index(&self) -> Option<usize> {
        match self.placement {
            Placement::Sharded { region_index, .. } => Some(region_index),
            Placement::Global => None,
        }
    }

    pub fn database_index(&self) -> Option<usize> {
        match self.placement {
            Placement::Sharded { database_index, .. } => Some(database_index),
            Placement::Global => None,
        }
    }

    pub fn table_index(&self) -> Option<u32> {
        match self.placement {
            Placement::Sharded { table_index, .. } => Some(table_index),
            Placement::Global => None,
        }
    }
}

/// Router for one cluster
#[derive(Debug, Clone)]
pub struct ShardingRouter {
    cluster: Arc<ClusterInfo>,
    strategy: Arc<dyn RoutingStrategy>,
    hash: HashAlgorithm,
    tables: Arc<TableShardRegistry>,
}

impl ShardingRouter {
    pub fn new(
        cluster: Arc<ClusterInfo>,
        strategy: Arc<dyn RoutingStrategy>,
        hash: HashAlgorithm,
        tables: Arc<TableShardRegistry>,
    ) -> Self {
        Self {
            cluster,
            strategy,
            hash,
            tables,
        }
    }

    pub fn cluster(&self) -> &ClusterInfo {
        &self.cluster
    }

    pub fn strategy(&self) -> &dyn RoutingStrategy {
        self.strategy.as_ref()
    }

    /// Route to the master holding `key`
    pub fn select_master(
        &self,
        table: &str,
        key: &ShardingKey,
    ) -> Result<RouteResult, RoutingError> {
        self.route_with_rng(table, key, Role::Master, &mut rand::rng())
    }

    /// Route to a slave holding `key`
    pub fn select_slave(
        &self,
        table: &str,
        key: &ShardingKey,
        selector: SlaveSelector,
    ) -> Result<RouteResult, RoutingError> {
        self.select_slave_with_rng(table, key, selector, &mut rand::rng())
    }

    pub fn select_slave_with_rng<R: Rng + ?Sized>(
        &self,
        table: &str,
        key: &ShardingKey,
        selector: SlaveSelector,
        rng: &mut R,
    ) -> Result<RouteResult, RoutingError> {
        self.route_with_rng(table, key, selector.into(), rng)
    }

    /// Route with any role
    pub fn route(
        &self,
        table: &str,
        key: &ShardingKey,
        role: Role,
    ) -> Result<RouteResult, RoutingError> {
        self.route_with_rng(table, key, role, &mut rand::rng())
    }

    pub fn route_with_rng<R: Rng + ?Sized>(
        &self,
        table: &str,
        key: &ShardingKey,
        role: Role,
        rng: &mut R,
    ) -> Result<RouteResult, RoutingError> {
        let cluster = self.cluster.name();
        if key.cluster() != cluster {
            return Err(RoutingError::UnknownCluster(key.cluster().to_string()));
        }

        let shard_count = self.tables.table_number(cluster, table)?;
        if shard_count == 0 {
            return self.global_route(table, role, rng);
        }

        if self.cluster.regions().is_empty() {
            return Err(RoutingError::NoRegions(cluster.to_string()));
        }

        let raw = key.value().raw_position(self.hash);
        let position = self.strategy.position(raw, &self.cluster);
        let (region_index, region) =
            self.cluster
                .find_region(position)
                .ok_or_else(|| RoutingError::OutOfCapacity {
                    cluster: cluster.to_string(),
                    position,
                })?;

        let database_index = self
            .strategy
            .select_database(position, region.database_count());
        let table_index = (position % shard_count as u64) as u32;
        let role = resolve_role(cluster, Some(region_index), region.slave_count(), role, rng)?;

        debug!(
            "Routed {}.{} key={} position={} -> region={} db={} table_index={} role={}",
            cluster, table, key, position, region_index, database_index, table_index, role
        );

        Ok(RouteResult {
            cluster: cluster.to_string(),
            table: table.to_string(),
            placement: Placement::Sharded {
                region_index,
                database_index,
                table_index,
            },
            role,
        })
    }

    /// Route an un-sharded table to the global connections
    pub fn select_global(&self, table: &str, role: Role) -> Result<RouteResult, RoutingError> {
        self.global_route(table, role, &mut rand::rng())
    }

    pub fn select_global_with_rng<R: Rng + ?Sized>(
        &self,
        table: &str,
        role: Role,
        rng: &mut R,
    ) -> Result<RouteResult, RoutingError> {
        self.global_route(table, role, rng)
    }

    fn global_route<R: Rng + ?Sized>(
        &self,
        table: &str,
        role: Role,
        rng: &mut R,
    ) -> Result<RouteResult, RoutingError> {
        let cluster = self.cluster.name();
        if self.cluster.global_master().is_none() {
            return Err(RoutingError::GlobalNotConfigured(cluster.to_string()));
        }
        let role = resolve_role(cluster, None, self.cluster.global_slaves().len(), role, rng)?;
        Ok(RouteResult {
            cluster: cluster.to_string(),
            table: table.to_string(),
            placement: Placement::Global,
            role,
        })
    }

    /// Every partition of `table`: region order, then database order, then
    /// table index ascending. The first error aborts the enumeration.
    pub fn all_shards(&self, table: &str, role: Role) -> Result<Vec<RouteResult>, RoutingError> {
        self.all_shards_with_rng(table, role, &mut rand::rng())
    }

    pub fn all_shards_with_rng<R: Rng + ?Sized>(
        &self,
        table: &str,
        role: Role,
        rng: &mut R,
    ) -> Result<Vec<RouteResult>, RoutingError> {
        let cluster = self.cluster.name();
        let shard_count = self.tables.table_number(cluster, table)?;
        if shard_count == 0 {
            return Ok(vec![self.global_route(table, role, rng)?]);
        }
        if self.cluster.regions().is_empty() {
            return Err(RoutingError::NoRegions(cluster.to_string()));
        }

        let mut routes = Vec::new();
        for (region_index, region) in self.cluster.regions().iter().enumerate() {
            // One replica per region for the whole scatter read
            let resolved =
                resolve_role(cluster, Some(region_index), region.slave_count(), role, rng)?;
            for database_index in 0..region.database_count() {
                for table_index in 0..shard_count {
                    routes.push(RouteResult {
                        cluster: cluster.to_string(),
                        table: table.to_string(),
                        placement: Placement::Sharded {
                            region_index,
                            database_index,
                            table_index,
                        },
                        role: resolved,
                    });
                }
            }
        }
        Ok(routes)
    }
}

/// Resolve the requested role against `slave_count` configured slaves
fn resolve_role<R: Rng + ?Sized>(
    cluster: &str,
    region: Option<usize>,
    slave_count: usize,
    role: Role,
    rng: &mut R,
) -> Result<ReplicaRole, RoutingError> {
    match role {
        Role::Master => Ok(ReplicaRole::Master),
        Role::Slave(slave) => {
            if slave < slave_count {
                Ok(ReplicaRole::Slave(slave))
            } else {
                Err(RoutingError::ReplicaNotConfigured {
                    cluster: cluster.to_string(),
                    region,
                    slave,
                })
            }
        }
        Role::AutoSlave if slave_count == 0 => Ok(ReplicaRole::Master),
        Role::AutoSlave => Ok(ReplicaRole::Slave(rng.random_range(0..slave_count))),
    }
}

/// One router per cluster of a topology
#[derive(Debug, Clone, Default)]
pub struct RouterSet {
    routers: HashMap<String, ShardingRouter>,
}

impl RouterSet {
    /// Build routers, resolving each cluster's strategy by name
    pub fn build(
        topology: &Topology,
        tables: Arc<TableShardRegistry>,
        strategies: &StrategyRegistry,
    ) -> Result<Self, RoutingError> {
        let mut routers = HashMap::new();
        for cluster in topology.clusters() {
            let strategy = strategies.create(cluster.router())?;
            info!(
                "Built router for cluster {}: strategy={}, hash={}, regions={}",
                cluster.name(),
                strategy.name(),
                topology.hash_algorithm(),
                cluster.regions().len()
            );
            let router = ShardingRouter::new(
                Arc::new(cluster.clone()),
                strategy,
                topology.hash_algorithm(),
                tables.clone(),
            );
            routers.insert(cluster.name().to_string(), router);
        }
        Ok(Self { routers })
    }

    pub fn router(&self, cluster: &str) -> Result<&ShardingRouter, RoutingError> {
        self.routers
            .get(cluster)
            .ok_or_else(|| RoutingError::UnknownCluster(cluster.to_string()))
    }

    pub fn select_master(
        &self,
        table: &str,
        key: &ShardingKey,
    ) -> Result<RouteResult, RoutingError> {
        self.router(key.cluster())?.select_master(table, key)
    }

    pub fn select_slave(
        &self,
        table: &str,
        key: &ShardingKey,
        selector: SlaveSelector,
    ) -> Result<RouteResult, RoutingError> {
        self.router(key.cluster())?.select_slave(table, key, selector)
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }
}
