#![allow(dead_code)]

pub mod mock_provider;

use mock_provider::{MockProvider, RecordingSynchronizer};
use shardline_cluster::{ClusterManager, ManagerConfig, StaticTopologyLoader};
use shardline_coordination::MemoryCoordinator;
use shardline_core::{
    Capacity, ClusterInfo, ConnectionDescriptor, HashAlgorithm, RegionInfo, TableShardInfo,
    Topology,
};
use std::path::PathBuf;
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn dbs(prefix: &str, n: usize) -> Vec<ConnectionDescriptor> {
    (0..n)
        .map(|i| ConnectionDescriptor::named(format!("{}{}", prefix, i)))
        .collect()
}

/// C1: global master with two slaves; region 0 `[0, 1_000_000)` with two
/// databases and one slave set; region 1 `[1_000_000, 2_000_000)` with two
/// databases and no slaves.
/// C2: one region `[0, 100)` with a single database, no global connections.
pub fn clusters() -> Vec<ClusterInfo> {
    vec![
        ClusterInfo::new("C1")
            .with_global_master(ConnectionDescriptor::named("c1-global"))
            .with_global_slave(ConnectionDescriptor::named("c1-global-s0"))
            .with_global_slave(ConnectionDescriptor::named("c1-global-s1"))
            .with_region(
                RegionInfo::new(Capacity::single(0, 1_000_000).unwrap(), dbs("c1-r0-m", 2))
                    .with_slave_set(dbs("c1-r0-s0-", 2)),
            )
            .with_region(RegionInfo::new(
                Capacity::single(1_000_000, 2_000_000).unwrap(),
                dbs("c1-r1-m", 2),
            )),
        ClusterInfo::new("C2").with_region(RegionInfo::new(
            Capacity::single(0, 100).unwrap(),
            dbs("c2-r0-m", 1),
        )),
    ]
}

/// Connections in [`clusters`]
pub const CONNECTION_COUNT: usize = 10;

pub fn topology_at(address: &str, clusters: Vec<ClusterInfo>) -> Topology {
    Topology::new(clusters, HashAlgorithm::default(), address).unwrap()
}

pub fn topology() -> Topology {
    topology_at("memory://test", clusters())
}

pub fn tables() -> Vec<TableShardInfo> {
    vec![
        TableShardInfo::sharded("C1", "orders", 4, "user_id"),
        TableShardInfo::global("C1", "countries"),
        TableShardInfo::sharded("C2", "events", 2, "tenant_id"),
    ]
}

pub fn fast_config() -> ManagerConfig {
    ManagerConfig {
        connect_timeout_ms: 1000,
        coordination_timeout_ms: 1000,
        lock_timeout_ms: 1000,
        ..ManagerConfig::default()
    }
}

/// Everything a manager under test needs, shared so tests can inspect it
pub struct Harness {
    pub provider: Arc<MockProvider>,
    pub coordinator: MemoryCoordinator,
    pub synchronizer: Arc<RecordingSynchronizer>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            provider: Arc::new(MockProvider::new()),
            coordinator: MemoryCoordinator::new(),
            synchronizer: Arc::new(RecordingSynchronizer::new()),
        }
    }

    pub fn manager(&self) -> ClusterManager<MockProvider> {
        self.manager_with(topology(), fast_config(), tables())
    }

    pub fn manager_with(
        &self,
        topology: Topology,
        config: ManagerConfig,
        tables: Vec<TableShardInfo>,
    ) -> ClusterManager<MockProvider> {
        ClusterManager::builder(
            Arc::new(StaticTopologyLoader::new(topology)),
            self.provider.clone(),
            Arc::new(self.coordinator.clone()),
        )
        .config(config)
        .tables(tables)
        .schema_synchronizer(self.synchronizer.clone())
        .build()
    }
}

pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shardline_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
