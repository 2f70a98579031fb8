//! Publication of table shard counts
//!
//! Each (cluster, table) pair is one node at
//! `<root>/shardinginfo/<cluster>/<table>` holding a JSON [`ShardInfoRecord`].
//! Publishing is an upsert, so every process that owns schema lifecycle can
//! publish on startup without checking what is already there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shardline_core::TableShardInfo;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CoordinationError;
use crate::paths::Namespace;
use crate::session::CoordinationSession;

/// Stored form of a table's shard info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfoRecord {
    #[serde(flatten)]
    pub info: TableShardInfo,
    pub published_at: DateTime<Utc>,
}

/// Reads and writes shard info nodes
#[derive(Debug, Clone)]
pub struct ShardInfoStore {
    session: Arc<dyn CoordinationSession>,
    namespace: Namespace,
}

impl ShardInfoStore {
    pub fn new(session: Arc<dyn CoordinationSession>, namespace: Namespace) -> Self {
        Self { session, namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Upsert one table's node
    pub async fn publish_one(&self, info: &TableShardInfo) -> Result<(), CoordinationError> {
        let path = self.namespace.table_path(&info.cluster, &info.table)?;
        let record = ShardInfoRecord {
            info: info.clone(),
            published_at: Utc::now(),
        };
        let data = serde_json::to_vec(&record)
            .map_err(|e| CoordinationError::Serialization(e.to_string()))?;
        self.session.write_node(&path, &data).await?;
        debug!(
            "Published {}.{} shard_count={}",
            info.cluster, info.table, info.shard_count
        );
        Ok(())
    }

    /// Upsert every table; returns how many were written
    pub async fn publish<'a, I>(&self, infos: I) -> Result<usize, CoordinationError>
    where
        I: IntoIterator<Item = &'a TableShardInfo>,
    {
        self.session
            .ensure_node(&self.namespace.shard_info_root())
            .await?;
        let mut count = 0;
        for info in infos {
            self.publish_one(info).await?;
            count += 1;
        }
        info!(
            "Published shard info for {} tables under {}",
            count,
            self.namespace.shard_info_root()
        );
        Ok(count)
    }

    /// Read one table's record
    pub async fn load_record(
        &self,
        cluster: &str,
        table: &str,
    ) -> Result<ShardInfoRecord, CoordinationError> {
        let path = self.namespace.table_path(cluster, table)?;
        let data = self.session.read_node(&path).await?;
        let record: ShardInfoRecord =
            serde_json::from_slice(&data).map_err(|e| CoordinationError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if record.info.cluster != cluster || record.info.table != table {
            return Err(CoordinationError::Corrupt {
                path,
                reason: format!(
                    "record names {}.{}",
                    record.info.cluster, record.info.table
                ),
            });
        }
        Ok(record)
    }

    pub async fn load_one(
        &self,
        cluster: &str,
        table: &str,
    ) -> Result<TableShardInfo, CoordinationError> {
        Ok(self.load_record(cluster, table).await?.info)
    }

    /// Every published table of `clusters`, ordered by cluster then table.
    /// Clusters with nothing published yield no entries.
    pub async fn load<S: AsRef<str>>(
        &self,
        clusters: &[S],
    ) -> Result<Vec<TableShardInfo>, CoordinationError> {
        let mut infos = Vec::new();
        let mut clusters: Vec<&str> = clusters.iter().map(|c| c.as_ref()).collect();
        clusters.sort_unstable();
        for cluster in clusters {
            let cluster_path = self.namespace.cluster_path(cluster)?;
            let tables = match self.session.read_children(&cluster_path).await {
                Ok(tables) => tables,
                Err(CoordinationError::NotFound(_)) => {
                    warn!("No shard info published for cluster {}", cluster);
                    continue;
                }
                Err(e) => return Err(e),
            };
            for table in tables {
                infos.push(self.load_one(cluster, &table).await?);
            }
        }
        info!("Loaded shard info for {} tables", infos.len());
        Ok(infos)
    }
}
