mod common;

use common::mock_provider::MockProvider;
use common::{
    clusters, fast_config, tables, temp_dir, topology, topology_at, Harness, CONNECTION_COUNT,
};
use shardline_cluster::{
    ClusterError, ClusterManager, ErrorKind, LifecycleState, ManagerConfig, NamedResourceProvider,
    ShardInfoSource, StaticTopologyLoader, SyncAction, SyncReport, YamlTopologyLoader,
};
use shardline_coordination::{CoordinationError, FileCoordinator};
use shardline_core::TableShardInfo;
use shardline_router::ShardingKey;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_local_definitions_are_published_for_remote_readers() {
    let harness = Harness::new();
    let writer = harness.manager();
    writer.startup().await.unwrap();

    let paths = harness.coordinator.node_paths();
    assert!(paths.contains(&"/shardline/shardinginfo/C1/orders".to_string()));
    assert!(paths.contains(&"/shardline/shardinginfo/C2/events".to_string()));

    let mut config = fast_config();
    config.shard_info_source = ShardInfoSource::Remote;
    let reader = harness.manager_with(topology(), config, Vec::new());
    reader.startup().await.unwrap();

    assert_eq!(
        *reader.table_registry().unwrap(),
        *writer.table_registry().unwrap()
    );
    let key = ShardingKey::new("C1", 123456u64);
    assert_eq!(
        reader.sharded_master("orders", &key).unwrap().connection_id(),
        writer.sharded_master("orders", &key).unwrap().connection_id()
    );

    writer.shutdown().await.unwrap();
    reader.shutdown().await.unwrap();
    assert_eq!(harness.coordinator.sessions_closed(), 2);
}

#[tokio::test]
async fn test_remote_without_publication_fails_startup() {
    let harness = Harness::new();
    let mut config = fast_config();
    config.shard_info_source = ShardInfoSource::Remote;
    let manager = harness.manager_with(topology(), config, tables());

    let err = manager.startup().await.unwrap_err();
    assert!(matches!(
        err,
        ClusterError::NoTables(ShardInfoSource::Remote)
    ));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(manager.state(), LifecycleState::Failed);
    assert_eq!(harness.provider.closed(), CONNECTION_COUNT);
    assert_eq!(harness.coordinator.sessions_closed(), 1);
}

#[tokio::test]
async fn test_custom_namespace() {
    let harness = Harness::new();
    let mut config = fast_config();
    config.namespace = "/apps/billing".to_string();
    let manager = harness.manager_with(topology(), config, tables());
    manager.startup().await.unwrap();

    let paths = harness.coordinator.node_paths();
    assert!(paths.contains(&"/apps/billing/shardinginfo/C1/countries".to_string()));
    assert!(!paths.iter().any(|p| p.starts_with("/shardline")));
}

#[tokio::test]
async fn test_file_coordinator_shares_shard_info() {
    common::init_tracing();
    let dir = temp_dir("file_coordination");
    let address = FileCoordinator::address_for(dir.join("coord"));

    let provider = Arc::new(MockProvider::new());
    let build = |config: ManagerConfig, tables: Vec<TableShardInfo>| {
        ClusterManager::builder(
            Arc::new(StaticTopologyLoader::new(topology_at(&address, clusters()))),
            provider.clone(),
            Arc::new(FileCoordinator::new()),
        )
        .config(config)
        .tables(tables)
        .build()
    };

    let writer = build(fast_config(), tables());
    writer.startup().await.unwrap();
    writer.shutdown().await.unwrap();

    let mut config = fast_config();
    config.shard_info_source = ShardInfoSource::Remote;
    let reader = build(config, Vec::new());
    reader.startup().await.unwrap();
    let registry = reader.table_registry().unwrap();
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.table_number("C2", "events").unwrap(), 2);
    assert_eq!(registry.sharding_field("C1", "orders").unwrap(), Some("user_id"));
    reader.shutdown().await.unwrap();

    assert_eq!(provider.opened(), 2 * CONNECTION_COUNT);
    assert_eq!(provider.closed(), 2 * CONNECTION_COUNT);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_schema_sync_covers_every_connection() {
    let harness = Harness::new();
    let mut config = fast_config();
    config.sync_action = SyncAction::Create;
    let manager = harness.manager_with(topology(), config, tables());
    manager.startup().await.unwrap();

    // orders: region 0 masters + slaves (4) and region 1 masters (2), 4 tables each
    // countries: global master + 2 slaves, 1 table each
    // events: one master, 2 tables
    assert_eq!(
        manager.sync_report().unwrap(),
        Some(SyncReport {
            calls: 10,
            physical_tables: 29
        })
    );

    let calls = harness.synchronizer.calls();
    assert!(calls.iter().all(|c| c.action == SyncAction::Create));
    let orders = calls
        .iter()
        .find(|c| c.table == "orders" && c.connection == "C1/region0/slave0/db1")
        .unwrap();
    assert_eq!(
        orders.physical_tables,
        vec!["orders_0", "orders_1", "orders_2", "orders_3"]
    );
    let countries: Vec<&str> = calls
        .iter()
        .filter(|c| c.table == "countries")
        .map(|c| c.connection.as_str())
        .collect();
    assert_eq!(
        countries,
        vec!["C1/global/master", "C1/global/slave0", "C1/global/slave1"]
    );

    // The schema lock was released
    let lock = manager.create_lock("schema-sync").await.unwrap();
    assert_eq!(lock.name(), "schema-sync");
}

#[tokio::test]
async fn test_schema_sync_skipped_without_action() {
    let harness = Harness::new();
    let manager = harness.manager();
    manager.startup().await.unwrap();

    assert_eq!(manager.sync_report().unwrap(), None);
    assert!(harness.synchronizer.calls().is_empty());
}

#[tokio::test]
async fn test_schema_sync_failure_fails_startup() {
    let harness = Harness::new();
    harness.synchronizer.fail_on("C1/region1/master/db0");
    let mut config = fast_config();
    config.sync_action = SyncAction::Update;
    let manager = harness.manager_with(topology(), config, tables());

    let err = manager.startup().await.unwrap_err();
    assert!(matches!(
        err,
        ClusterError::SchemaSync { ref id, ref table, .. }
            if id == "C1/region1/master/db0" && table == "orders"
    ));
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert_eq!(manager.state(), LifecycleState::Failed);
    assert_eq!(harness.provider.closed(), CONNECTION_COUNT);
}

#[tokio::test]
async fn test_locks_exclude_other_managers() {
    let harness = Harness::new();
    let first = harness.manager();
    first.startup().await.unwrap();

    let mut config = fast_config();
    config.lock_timeout_ms = 20;
    let second = harness.manager_with(topology(), config, tables());
    second.startup().await.unwrap();

    let held = first.create_lock("rebalance").await.unwrap();
    let err = second.create_lock("rebalance").await.unwrap_err();
    assert!(matches!(
        err,
        ClusterError::Coordination(CoordinationError::LockTimeout(_))
    ));
    assert_eq!(err.kind(), ErrorKind::Connectivity);

    held.release();
    let lock = tokio::time::timeout(Duration::from_secs(1), second.create_lock("rebalance"))
        .await
        .unwrap()
        .unwrap();
    drop(lock);

    let err = first.create_lock("bad/name").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_yaml_topology_with_named_resources() {
    common::init_tracing();
    let dir = temp_dir("yaml_topology");
    let path = dir.join("topology.yaml");
    std::fs::write(
        &path,
        r#"
coordination_address: memory://yaml
clusters:
  - name: users
    global:
      master: { type: named, resource: users-global }
    regions:
      - capacity: "0-1000"
        masters:
          - { type: named, resource: users-m0 }
          - { type: named, resource: users-m1 }
"#,
    )
    .unwrap();

    let provider = NamedResourceProvider::new()
        .with_resource("users-global", "global pool".to_string())
        .with_resource("users-m0", "pool 0".to_string())
        .with_resource("users-m1", "pool 1".to_string());
    let manager = ClusterManager::builder(
        Arc::new(YamlTopologyLoader::new(&path)),
        Arc::new(provider),
        Arc::new(shardline_coordination::MemoryCoordinator::new()),
    )
    .config(fast_config())
    .tables(vec![
        TableShardInfo::sharded("users", "profiles", 2, "user_id"),
        TableShardInfo::global("users", "plans"),
    ])
    .build();
    manager.startup().await.unwrap();

    let handle = manager
        .sharded_master("profiles", &ShardingKey::new("users", 1001u64))
        .unwrap();
    // 1001 % 1000 = 1 -> database 1, partition 1
    assert_eq!(handle.connection().as_str(), "pool 1");
    assert_eq!(handle.physical_table(), "profiles_1");

    let global = manager.global_master("users", "plans").unwrap();
    assert_eq!(global.connection().as_str(), "global pool");

    manager.shutdown().await.unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_missing_named_resource_fails_startup() {
    let harness = Harness::new();
    let provider =
        NamedResourceProvider::<String>::new().with_resource("c1-global", "g".to_string());
    let manager = ClusterManager::builder(
        Arc::new(StaticTopologyLoader::new(topology())),
        Arc::new(provider),
        Arc::new(harness.coordinator.clone()),
    )
    .config(fast_config())
    .tables(tables())
    .build();

    let err = manager.startup().await.unwrap_err();
    assert!(matches!(err, ClusterError::Connect { ref id, .. } if id == "C1/global/slave0"));
    assert_eq!(err.kind(), ErrorKind::Connectivity);
}
