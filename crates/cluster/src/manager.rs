//! Cluster manager
//!
//! Owns the topology, table shard counts, routers and live connections for
//! the lifetime of the application.
//!
//! # Lifecycle
//! `Unstarted -> Starting -> Running -> ShuttingDown -> Stopped`, with
//! `Failed` as a terminal state when startup aborts. Startup runs once;
//! concurrent or repeated calls while running are no-ops. Shutdown is
//! idempotent and safe in every state.
//!
//! # Startup
//! 1. load the topology through the [`ConfigLoader`]
//! 2. open a coordination session and ensure the namespace root exists
//! 3. open one connection per descriptor
//! 4. resolve table shard counts (local definitions published, or remote)
//! 5. build one router per cluster
//! 6. synchronize schemas when configured
//!
//! Any failure releases what was opened and leaves the manager `Failed`.
//!
//! After startup everything lives in one immutable runtime snapshot; request
//! paths clone an `Arc` to it and never block on I/O.

use parking_lot::RwLock;
use shardline_coordination::{
    CoordinationLock, CoordinationSession, Connector, Namespace, ShardInfoStore,
};
use shardline_core::{
    ClusterInfo, ClusterStats, ReplicaRole, TableShardInfo, TableShardRegistry, Topology,
};
use shardline_router::{
    Placement, Role, RouteResult, RouterSet, RoutingError, ShardingKey, SlaveSelector,
    StrategyRegistry,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ManagerConfig, ShardInfoSource, SyncAction};
use crate::connections::{Bound, ConnectionSet};
use crate::error::ClusterError;
use crate::provider::ConnectionProvider;
use crate::resource::{RegionDiagnostics, ResourceHandle};
use crate::schema::{self, SchemaSynchronizer, SyncReport};

/// Manager lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Unstarted,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State built by a successful startup
struct ClusterRuntime<C> {
    topology: Topology,
    registry: Arc<TableShardRegistry>,
    routers: RouterSet,
    connections: ConnectionSet<C>,
    session: Arc<dyn CoordinationSession>,
    sync_report: Option<SyncReport>,
}

/// Builder for [`ClusterManager`]
pub struct ClusterManagerBuilder<P: ConnectionProvider> {
    config: ManagerConfig,
    loader: Arc<dyn ConfigLoader>,
    provider: Arc<P>,
    connector: Arc<dyn Connector>,
    strategies: Arc<StrategyRegistry>,
    tables: Vec<TableShardInfo>,
    synchronizer: Option<Arc<dyn SchemaSynchronizer<P::Connection>>>,
}

impl<P: ConnectionProvider> ClusterManagerBuilder<P> {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Local table definitions, used in local-authority mode
    pub fn tables<I: IntoIterator<Item = TableShardInfo>>(mut self, tables: I) -> Self {
        self.tables.extend(tables);
        self
    }

    pub fn strategies(mut self, strategies: Arc<StrategyRegistry>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn schema_synchronizer(
        mut self,
        synchronizer: Arc<dyn SchemaSynchronizer<P::Connection>>,
    ) -> Self {
        self.synchronizer = Some(synchronizer);
        self
    }

    pub fn build(self) -> ClusterManager<P> {
        ClusterManager {
            config: self.config,
            loader: self.loader,
            provider: self.provider,
            connector: self.connector,
            strategies: self.strategies,
            tables: self.tables,
            synchronizer: self.synchronizer,
            lifecycle: Mutex::new(()),
            state: RwLock::new(LifecycleState::Unstarted),
            runtime: RwLock::new(None),
        }
    }
}

/// Cluster manager, parameterized by the connection provider
pub struct ClusterManager<P: ConnectionProvider> {
    config: ManagerConfig,
    loader: Arc<dyn ConfigLoader>,
    provider: Arc<P>,
    connector: Arc<dyn Connector>,
    strategies: Arc<StrategyRegistry>,
    tables: Vec<TableShardInfo>,
    synchronizer: Option<Arc<dyn SchemaSynchronizer<P::Connection>>>,
    /// Serializes startup and shutdown
    lifecycle: Mutex<()>,
    state: RwLock<LifecycleState>,
    runtime: RwLock<Option<Arc<ClusterRuntime<P::Connection>>>>,
}

impl<P: ConnectionProvider> ClusterManager<P> {
    pub fn builder(
        loader: Arc<dyn ConfigLoader>,
        provider: Arc<P>,
        connector: Arc<dyn Connector>,
    ) -> ClusterManagerBuilder<P> {
        ClusterManagerBuilder {
            config: ManagerConfig::default(),
            loader,
            provider,
            connector,
            strategies: Arc::new(StrategyRegistry::new()),
            tables: Vec::new(),
            synchronizer: None,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        debug!("Cluster manager state {} -> {}", previous, state);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Build everything. A no-op when already running.
    pub async fn startup(&self) -> Result<(), ClusterError> {
        if self.state() == LifecycleState::Running {
            return Ok(());
        }

        let _guard = self.lifecycle.lock().await;
        match self.state() {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Unstarted => {}
            state => {
                return Err(ClusterError::InvalidState {
                    operation: "startup",
                    state,
                })
            }
        }

        self.set_state(LifecycleState::Starting);
        info!("Starting cluster manager");

        match self.build_runtime().await {
            Ok(runtime) => {
                let stats = stats_of(&runtime);
                *self.runtime.write() = Some(Arc::new(runtime));
                self.set_state(LifecycleState::Running);
                info!(
                    "Cluster manager running: {} clusters, {} regions, {} connections, {} tables ({} global)",
                    stats.clusters,
                    stats.regions,
                    stats.connections,
                    stats.tables,
                    stats.global_tables
                );
                Ok(())
            }
            Err(e) => {
                self.set_state(LifecycleState::Failed);
                error!("Cluster manager startup failed: {}", e);
                Err(e)
            }
        }
    }

    async fn build_runtime(&self) -> Result<ClusterRuntime<P::Connection>, ClusterError> {
        let topology = self.loader.load_topology().await?;
        info!(
            "Loaded topology: {} clusters, hash={}, coordination={}",
            topology.clusters().len(),
            topology.hash_algorithm(),
            topology.coordination_address()
        );

        let namespace = self.config.namespace()?;
        let session = self
            .coordination("connect", self.connector.connect(topology.coordination_address()))
            .await?;

        if let Err(e) = self
            .coordination("ensure namespace", session.ensure_node(namespace.root()))
            .await
        {
            close_session(session.as_ref()).await;
            return Err(e);
        }

        let connections = match ConnectionSet::open(
            &topology,
            self.provider.as_ref(),
            self.config.connect_timeout(),
        )
        .await
        {
            Ok(connections) => connections,
            Err(e) => {
                close_session(session.as_ref()).await;
                return Err(e);
            }
        };

        let finished = self
            .finish_runtime(&topology, &connections, session.clone(), &namespace)
            .await;
        match finished {
            Ok((registry, routers, sync_report)) => Ok(ClusterRuntime {
                topology,
                registry,
                routers,
                connections,
                session,
                sync_report,
            }),
            Err(e) => {
                connections.close_all(self.provider.as_ref()).await;
                close_session(session.as_ref()).await;
                Err(e)
            }
        }
    }

    async fn finish_runtime(
        &self,
        topology: &Topology,
        connections: &ConnectionSet<P::Connection>,
        session: Arc<dyn CoordinationSession>,
        namespace: &Namespace,
    ) -> Result<(Arc<TableShardRegistry>, RouterSet, Option<SyncReport>), ClusterError> {
        let store = ShardInfoStore::new(session.clone(), namespace.clone());
        let registry = Arc::new(self.resolve_registry(topology, &store).await?);
        let routers = RouterSet::build(topology, registry.clone(), &self.strategies)?;

        let sync_report = match (&self.synchronizer, self.config.sync_action) {
            (_, SyncAction::None) => None,
            (None, action) => {
                warn!("Sync action {:?} configured without a schema synchronizer", action);
                None
            }
            (Some(synchronizer), action) => Some(
                schema::run(
                    synchronizer.as_ref(),
                    session.as_ref(),
                    &self.config.schema_lock,
                    self.config.lock_timeout(),
                    &registry,
                    connections,
                    action,
                )
                .await?,
            ),
        };

        Ok((registry, routers, sync_report))
    }

    async fn resolve_registry(
        &self,
        topology: &Topology,
        store: &ShardInfoStore,
    ) -> Result<TableShardRegistry, ClusterError> {
        let registry = match self.config.shard_info_source {
            ShardInfoSource::Local => {
                let registry = TableShardRegistry::from_tables(self.tables.iter().cloned())?;
                if registry.is_empty() {
                    return Err(ClusterError::NoTables(ShardInfoSource::Local));
                }
                registry.check_topology(topology)?;
                self.coordination("publish shard info", store.publish(registry.iter()))
                    .await?;
                registry
            }
            ShardInfoSource::Remote => {
                let names: Vec<&str> = topology.cluster_names().collect();
                let tables = self
                    .coordination("load shard info", store.load(names.as_slice()))
                    .await?;
                let registry = TableShardRegistry::from_tables(tables)?;
                if registry.is_empty() {
                    return Err(ClusterError::NoTables(ShardInfoSource::Remote));
                }
                registry.check_topology(topology)?;
                registry
            }
        };
        info!(
            "Resolved {} tables from {:?} shard info",
            registry.len(),
            self.config.shard_info_source
        );
        Ok(registry)
    }

    /// Run a coordination call under the configured timeout
    async fn coordination<T, E, F>(&self, operation: &str, call: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, E>>,
        ClusterError: From<E>,
    {
        let timeout = self.config.coordination_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(ClusterError::from),
            Err(_) => Err(ClusterError::Timeout {
                operation: operation.to_string(),
                timeout,
            }),
        }
    }

    /// Release connections and the coordination session. Safe in any state.
    pub async fn shutdown(&self) -> Result<(), ClusterError> {
        let _guard = self.lifecycle.lock().await;

        let runtime = self.runtime.write().take();
        let Some(runtime) = runtime else {
            if self.state() == LifecycleState::Unstarted {
                self.set_state(LifecycleState::Stopped);
            }
            debug!("Shutdown with nothing to release ({})", self.state());
            return Ok(());
        };

        self.set_state(LifecycleState::ShuttingDown);
        info!("Shutting down cluster manager");

        // No caches are owned by the manager; connections go first
        let closed = runtime.connections.close_all(self.provider.as_ref()).await;
        info!("Closed {} of {} connections", closed, runtime.connections.len());

        close_session(runtime.session.as_ref()).await;

        self.set_state(LifecycleState::Stopped);
        info!("Cluster manager stopped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resource access
    // ------------------------------------------------------------------

    fn runtime(
        &self,
        operation: &'static str,
    ) -> Result<Arc<ClusterRuntime<P::Connection>>, ClusterError> {
        self.runtime
            .read()
            .clone()
            .ok_or_else(|| ClusterError::InvalidState {
                operation,
                state: self.state(),
            })
    }

    /// Master connection of a global table
    pub fn global_master(
        &self,
        cluster: &str,
        table: &str,
    ) -> Result<ResourceHandle<P::Connection>, ClusterError> {
        self.global_resource(cluster, table, Role::Master)
    }

    /// Slave connection of a global table
    pub fn global_slave(
        &self,
        cluster: &str,
        table: &str,
        selector: SlaveSelector,
    ) -> Result<ResourceHandle<P::Connection>, ClusterError> {
        self.global_resource(cluster, table, selector.into())
    }

    /// Global table resource with any role
    pub fn global_resource(
        &self,
        cluster: &str,
        table: &str,
        role: Role,
    ) -> Result<ResourceHandle<P::Connection>, ClusterError> {
        let runtime = self.runtime("access global resource")?;
        let route = runtime.routers.router(cluster)?.select_global(table, role)?;
        bind(&*runtime, &route)
    }

    /// Master holding `key`
    pub fn sharded_master(
        &self,
        table: &str,
        key: &ShardingKey,
    ) -> Result<ResourceHandle<P::Connection>, ClusterError> {
        self.sharded_resource(table, key, Role::Master)
    }

    /// Slave holding `key`
    pub fn sharded_slave(
        &self,
        table: &str,
        key: &ShardingKey,
        selector: SlaveSelector,
    ) -> Result<ResourceHandle<P::Connection>, ClusterError> {
        self.sharded_resource(table, key, selector.into())
    }

    /// Resource holding `key` with any role
    pub fn sharded_resource(
        &self,
        table: &str,
        key: &ShardingKey,
        role: Role,
    ) -> Result<ResourceHandle<P::Connection>, ClusterError> {
        let runtime = self.runtime("access sharded resource")?;
        let route = runtime.routers.router(key.cluster())?.route(table, key, role)?;
        bind(&*runtime, &route)
    }

    /// Every master partition of `table`
    pub fn all_master_shards(
        &self,
        table: &str,
    ) -> Result<Vec<ResourceHandle<P::Connection>>, ClusterError> {
        self.all_shard_resources(table, Role::Master)
    }

    /// Every slave partition of `table`
    pub fn all_slave_shards(
        &self,
        table: &str,
        selector: SlaveSelector,
    ) -> Result<Vec<ResourceHandle<P::Connection>>, ClusterError> {
        self.all_shard_resources(table, selector.into())
    }

    /// Every partition of `table`, ordered by region, database, then table
    /// index. The table must be defined in exactly one cluster; use
    /// [`Self::all_shard_resources_in`] otherwise.
    pub fn all_shard_resources(
        &self,
        table: &str,
        role: Role,
    ) -> Result<Vec<ResourceHandle<P::Connection>>, ClusterError> {
        let runtime = self.runtime("enumerate shards")?;
        let clusters = runtime.registry.clusters_of(table);
        let cluster = match clusters.as_slice() {
            [cluster] => cluster.to_string(),
            [] => {
                return Err(RoutingError::UnknownTable {
                    cluster: "*".to_string(),
                    table: table.to_string(),
                }
                .into())
            }
            _ => {
                return Err(RoutingError::AmbiguousTable {
                    table: table.to_string(),
                    clusters: clusters.iter().map(|c| c.to_string()).collect(),
                }
                .into())
            }
        };
        enumerate(&*runtime, &cluster, table, role)
    }

    /// Every partition of `table` in `cluster`
    pub fn all_shard_resources_in(
        &self,
        cluster: &str,
        table: &str,
        role: Role,
    ) -> Result<Vec<ResourceHandle<P::Connection>>, ClusterError> {
        let runtime = self.runtime("enumerate shards")?;
        enumerate(&*runtime, cluster, table, role)
    }

    /// Whether `cluster` has global slaves
    pub fn has_global_slaves(&self, cluster: &str) -> Result<bool, ClusterError> {
        Ok(self.cluster_info(cluster)?.has_global_slaves())
    }

    /// Whether any region of `cluster` has slaves
    pub fn has_sharded_slaves(&self, cluster: &str) -> Result<bool, ClusterError> {
        Ok(self.cluster_info(cluster)?.has_region_slaves())
    }

    /// Copy of a cluster's topology
    pub fn cluster_info(&self, name: &str) -> Result<ClusterInfo, ClusterError> {
        let runtime = self.runtime("read cluster info")?;
        runtime
            .topology
            .cluster(name)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownCluster(name.to_string()).into())
    }

    /// Shard counts resolved at startup
    pub fn table_registry(&self) -> Result<Arc<TableShardRegistry>, ClusterError> {
        Ok(self.runtime("read table registry")?.registry.clone())
    }

    /// Result of the startup schema synchronization, if one ran
    pub fn sync_report(&self) -> Result<Option<SyncReport>, ClusterError> {
        Ok(self.runtime("read sync report")?.sync_report)
    }

    pub fn stats(&self) -> Result<ClusterStats, ClusterError> {
        Ok(stats_of(&*self.runtime("read stats")?))
    }

    /// Acquire a cross-process lock through the coordination service
    pub async fn create_lock(&self, name: &str) -> Result<CoordinationLock, ClusterError> {
        let runtime = self.runtime("create lock")?;
        let lock = runtime
            .session
            .acquire_lock(name, self.config.lock_timeout())
            .await?;
        Ok(lock)
    }
}

fn stats_of<C>(runtime: &ClusterRuntime<C>) -> ClusterStats {
    ClusterStats {
        clusters: runtime.topology.clusters().len(),
        regions: runtime.topology.region_count(),
        connections: runtime.connections.len(),
        tables: runtime.registry.len(),
        global_tables: runtime.registry.global_table_count(),
    }
}

async fn close_session(session: &dyn CoordinationSession) {
    if let Err(e) = session.close().await {
        warn!("Failed to close coordination session: {}", e);
    }
}

fn enumerate<C>(
    runtime: &ClusterRuntime<C>,
    cluster: &str,
    table: &str,
    role: Role,
) -> Result<Vec<ResourceHandle<C>>, ClusterError> {
    let routes = runtime.routers.router(cluster)?.all_shards(table, role)?;
    routes.iter().map(|route| bind(runtime, route)).collect()
}

/// Resolve route coordinates into a bound connection
fn bind<C>(
    runtime: &ClusterRuntime<C>,
    route: &RouteResult,
) -> Result<ResourceHandle<C>, ClusterError> {
    let cluster = runtime
        .connections
        .cluster(&route.cluster)
        .ok_or_else(|| RoutingError::UnknownCluster(route.cluster.clone()))?;
    let missing = |region: Option<usize>, slave: usize| RoutingError::ReplicaNotConfigured {
        cluster: route.cluster.clone(),
        region,
        slave,
    };

    match route.placement {
        Placement::Global => {
            let bound: &Bound<C> = match route.role {
                ReplicaRole::Master => cluster
                    .global_master
                    .as_ref()
                    .ok_or_else(|| RoutingError::GlobalNotConfigured(route.cluster.clone()))?,
                ReplicaRole::Slave(s) => {
                    cluster.global_slaves.get(s).ok_or_else(|| missing(None, s))?
                }
            };
            Ok(ResourceHandle::global(
                bound.connection.clone(),
                bound.id.clone(),
                &route.cluster,
                &route.table,
                route.role,
            ))
        }
        Placement::Sharded {
            region_index,
            database_index,
            table_index,
        } => {
            let region = cluster
                .regions
                .get(region_index)
                .ok_or_else(|| RoutingError::NoRegions(route.cluster.clone()))?;
            let bound = match route.role {
                ReplicaRole::Master => region.masters.get(database_index),
                ReplicaRole::Slave(s) => region
                    .slaves
                    .get(s)
                    .ok_or_else(|| missing(Some(region_index), s))?
                    .get(database_index),
            }
            .ok_or_else(|| RoutingError::DatabaseNotConfigured {
                cluster: route.cluster.clone(),
                region: region_index,
                database: database_index,
            })?;
            let capacity = runtime
                .topology
                .cluster(&route.cluster)
                .and_then(|c| c.region(region_index))
                .map(|r| r.capacity().clone())
                .ok_or_else(|| RoutingError::NoRegions(route.cluster.clone()))?;
            Ok(ResourceHandle::sharded(
                bound.connection.clone(),
                bound.id.clone(),
                &route.cluster,
                &route.table,
                table_index,
                route.role,
                RegionDiagnostics {
                    region_index,
                    database_index,
                    capacity,
                },
            ))
        }
    }
}
