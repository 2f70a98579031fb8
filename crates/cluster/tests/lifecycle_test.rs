mod common;

use common::{fast_config, tables, topology, topology_at, Harness, CONNECTION_COUNT};
use shardline_cluster::{ClusterError, ErrorKind, LifecycleState, ShardInfoSource};
use shardline_core::{Capacity, ClusterInfo, RegionInfo, TableShardInfo};
use shardline_router::ShardingKey;
use std::time::Duration;

#[tokio::test]
async fn test_startup_and_shutdown() {
    let harness = Harness::new();
    let manager = harness.manager();
    assert_eq!(manager.state(), LifecycleState::Unstarted);

    manager.startup().await.unwrap();
    assert_eq!(manager.state(), LifecycleState::Running);
    assert_eq!(harness.provider.opened(), CONNECTION_COUNT);
    assert_eq!(harness.coordinator.sessions_opened(), 1);

    let stats = manager.stats().unwrap();
    assert_eq!(stats.clusters, 2);
    assert_eq!(stats.regions, 3);
    assert_eq!(stats.connections, CONNECTION_COUNT);
    assert_eq!(stats.tables, 3);
    assert_eq!(stats.global_tables, 1);

    manager.shutdown().await.unwrap();
    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert_eq!(harness.provider.closed(), CONNECTION_COUNT);
    assert_eq!(harness.coordinator.sessions_closed(), 1);

    // Connections close in reverse open order
    let mut reversed = harness.provider.open_order();
    reversed.reverse();
    assert_eq!(harness.provider.close_order(), reversed);
}

#[tokio::test]
async fn test_startup_is_idempotent() {
    let harness = Harness::new();
    let manager = harness.manager();

    manager.startup().await.unwrap();
    manager.startup().await.unwrap();
    assert_eq!(harness.provider.opened(), CONNECTION_COUNT);
    assert_eq!(harness.coordinator.sessions_opened(), 1);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_startup_builds_once() {
    let harness = Harness::new();
    harness.provider.delay_opens(Duration::from_millis(2));
    let manager = harness.manager();

    let (a, b, c) = tokio::join!(manager.startup(), manager.startup(), manager.startup());
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(manager.state(), LifecycleState::Running);
    assert_eq!(harness.provider.opened(), CONNECTION_COUNT);
    assert_eq!(harness.coordinator.sessions_opened(), 1);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_twice() {
    let harness = Harness::new();
    let manager = harness.manager();
    manager.startup().await.unwrap();

    manager.shutdown().await.unwrap();
    manager.shutdown().await.unwrap();
    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert_eq!(harness.provider.closed(), CONNECTION_COUNT);
    assert_eq!(harness.coordinator.sessions_closed(), 1);
}

#[tokio::test]
async fn test_shutdown_before_startup() {
    let harness = Harness::new();
    let manager = harness.manager();

    manager.shutdown().await.unwrap();
    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert_eq!(harness.provider.opened(), 0);

    let err = manager.startup().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(err.to_string(), "Cannot startup while stopped");
}

#[tokio::test]
async fn test_access_requires_running_manager() {
    let harness = Harness::new();
    let manager = harness.manager();

    let err = manager
        .sharded_master("orders", &ShardingKey::new("C1", 1u64))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(manager.stats().unwrap_err().kind(), ErrorKind::InvalidState);

    manager.startup().await.unwrap();
    manager.shutdown().await.unwrap();
    let err = manager.global_master("C1", "countries").unwrap_err();
    assert!(matches!(
        err,
        ClusterError::InvalidState {
            state: LifecycleState::Stopped,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_connection_releases_everything() {
    let harness = Harness::new();
    harness.provider.fail_on("C1/region1/master/db1");
    let manager = harness.manager();

    let err = manager.startup().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert!(matches!(err, ClusterError::Connect { ref id, .. } if id == "C1/region1/master/db1"));
    assert_eq!(manager.state(), LifecycleState::Failed);

    // Everything opened before the failure was closed again
    assert!(harness.provider.opened() > 0);
    assert_eq!(harness.provider.closed(), harness.provider.opened());
    assert_eq!(harness.coordinator.sessions_closed(), 1);

    let err = manager.startup().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // Shutdown after a failed startup is a no-op
    manager.shutdown().await.unwrap();
    assert_eq!(manager.state(), LifecycleState::Failed);
}

#[tokio::test]
async fn test_connect_timeout() {
    let harness = Harness::new();
    harness.provider.delay_opens(Duration::from_millis(200));
    let mut config = fast_config();
    config.connect_timeout_ms = 20;
    let manager = harness.manager_with(topology(), config, tables());

    let err = manager.startup().await.unwrap_err();
    assert!(matches!(err, ClusterError::Timeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert_eq!(manager.state(), LifecycleState::Failed);
    assert_eq!(harness.provider.opened(), 0);
}

#[tokio::test]
async fn test_unknown_strategy_fails_startup() {
    let harness = Harness::new();
    let clusters = vec![ClusterInfo::new("C1")
        .with_router("consistent")
        .with_region(RegionInfo::new(
            Capacity::single(0, 100).unwrap(),
            common::dbs("m", 1),
        ))];
    let manager = harness.manager_with(
        topology_at("memory://test", clusters),
        fast_config(),
        vec![TableShardInfo::sharded("C1", "orders", 2, "id")],
    );

    let err = manager.startup().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(manager.state(), LifecycleState::Failed);
    assert_eq!(harness.provider.opened(), 1);
    assert_eq!(harness.provider.closed(), 1);
}

#[tokio::test]
async fn test_table_in_unknown_cluster_fails_startup() {
    let harness = Harness::new();
    let mut tables = tables();
    tables.push(TableShardInfo::sharded("C9", "ghosts", 2, "id"));
    let manager = harness.manager_with(topology(), fast_config(), tables);

    let err = manager.startup().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(harness.provider.closed(), CONNECTION_COUNT);
    assert_eq!(harness.coordinator.sessions_closed(), 1);
}

#[tokio::test]
async fn test_invalid_namespace_fails_before_connecting() {
    let harness = Harness::new();
    let mut config = fast_config();
    config.namespace = "no-leading-slash".to_string();
    let manager = harness.manager_with(topology(), config, tables());

    let err = manager.startup().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(harness.coordinator.sessions_opened(), 0);
    assert_eq!(harness.provider.opened(), 0);
}

#[tokio::test]
async fn test_no_tables_fails_startup() {
    let harness = Harness::new();
    let manager = harness.manager_with(topology(), fast_config(), Vec::new());

    let err = manager.startup().await.unwrap_err();
    assert!(matches!(
        err,
        ClusterError::NoTables(ShardInfoSource::Local)
    ));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(manager.state(), LifecycleState::Failed);
    assert_eq!(harness.provider.closed(), harness.provider.opened());
    // Nothing was published for remote readers
    assert!(!harness
        .coordinator
        .node_paths()
        .iter()
        .any(|p| p.starts_with("/shardline/shardinginfo/")));
}
