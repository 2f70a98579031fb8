//! Schema synchronization
//!
//! After shard counts are resolved, every table is synchronized on every
//! connection that holds it: sharded tables on each region master and slave
//! with one physical table per partition, global tables on the global
//! master and slaves. Statement generation is left to the injected
//! [`SchemaSynchronizer`]. The whole pass runs under a coordination lock so
//! only one process changes schemas at a time.

use async_trait::async_trait;
use shardline_core::{TableShardInfo, TableShardRegistry};
use shardline_coordination::CoordinationSession;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SyncAction;
use crate::connections::{Bound, ConnectionSet};
use crate::error::ClusterError;
use crate::provider::ProviderError;
use crate::resource::physical_table_name;

/// Applies table definitions to one connection
#[async_trait]
pub trait SchemaSynchronizer<C>: Send + Sync {
    async fn sync_table(
        &self,
        connection: &C,
        table: &TableShardInfo,
        physical_tables: &[String],
        action: SyncAction,
    ) -> Result<(), ProviderError>;
}

/// Outcome of a synchronization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// `sync_table` calls made
    pub calls: usize,
    /// Physical tables covered
    pub physical_tables: usize,
}

pub(crate) async fn run<C: Send + Sync + 'static>(
    synchronizer: &dyn SchemaSynchronizer<C>,
    session: &dyn CoordinationSession,
    lock_name: &str,
    lock_timeout: Duration,
    registry: &TableShardRegistry,
    connections: &ConnectionSet<C>,
    action: SyncAction,
) -> Result<SyncReport, ClusterError> {
    let lock = session.acquire_lock(lock_name, lock_timeout).await?;
    info!("Acquired schema lock {}, sync action {:?}", lock_name, action);

    let mut report = SyncReport::default();
    for table in registry.iter() {
        let Some(cluster) = connections.cluster(&table.cluster) else {
            continue;
        };

        if table.is_global() {
            let names = vec![physical_table_name(&table.table, None)];
            let targets = cluster.global_master.iter().chain(cluster.global_slaves.iter());
            for bound in targets {
                sync_one(synchronizer, bound, table, &names, action, &mut report).await?;
            }
            continue;
        }

        let names: Vec<String> = (0..table.shard_count)
            .map(|i| physical_table_name(&table.table, Some(i)))
            .collect();
        for region in &cluster.regions {
            let targets = region.masters.iter().chain(region.slaves.iter().flatten());
            for bound in targets {
                sync_one(synchronizer, bound, table, &names, action, &mut report).await?;
            }
        }
    }

    lock.release();
    info!(
        "Schema sync finished: {} calls, {} physical tables",
        report.calls, report.physical_tables
    );
    Ok(report)
}

async fn sync_one<C: Send + Sync + 'static>(
    synchronizer: &dyn SchemaSynchronizer<C>,
    bound: &Bound<C>,
    table: &TableShardInfo,
    names: &[String],
    action: SyncAction,
    report: &mut SyncReport,
) -> Result<(), ClusterError> {
    synchronizer
        .sync_table(&bound.connection, table, names, action)
        .await
        .map_err(|e| ClusterError::SchemaSync {
            id: bound.id.clone(),
            table: table.table.clone(),
            reason: e.to_string(),
        })?;
    debug!("Synced {} ({} tables) on {}", table.table, names.len(), bound.id);
    report.calls += 1;
    report.physical_tables += names.len();
    Ok(())
}
