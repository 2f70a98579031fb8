//! Routing errors

use shardline_core::RegistryError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Cluster not found: {0}")]
    UnknownCluster(String),
    #[error("Table not found: cluster={cluster}, table={table}")]
    UnknownTable { cluster: String, table: String },
    #[error("Table {table} is defined in several clusters: {}", .clusters.join(", "))]
    AmbiguousTable { table: String, clusters: Vec<String> },
    #[error("Cluster {0} has no regions")]
    NoRegions(String),
    #[error("Sharding value {position} is outside the capacity of cluster {cluster}")]
    OutOfCapacity { cluster: String, position: u64 },
    #[error("Cluster {cluster} has no slave {slave}{}", region_suffix(.region))]
    ReplicaNotConfigured {
        cluster: String,
        region: Option<usize>,
        slave: usize,
    },
    #[error("Cluster {cluster} region {region} has no database {database}")]
    DatabaseNotConfigured {
        cluster: String,
        region: usize,
        database: usize,
    },
    #[error("Cluster {0} has no global connection")]
    GlobalNotConfigured(String),
    #[error("Unknown routing strategy: {0}")]
    UnknownStrategy(String),
}

impl From<RegistryError> for RoutingError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { cluster, table } => {
                RoutingError::UnknownTable { cluster, table }
            }
            RegistryError::UnknownCluster { cluster, .. } => RoutingError::UnknownCluster(cluster),
            RegistryError::NoRegions { cluster, .. } => RoutingError::NoRegions(cluster),
            RegistryError::Duplicate { cluster, table }
            | RegistryError::InvalidTable { cluster, table, .. } => {
                RoutingError::UnknownTable { cluster, table }
            }
        }
    }
}

fn region_suffix(region: &Option<usize>) -> String {
    region
        .map(|r| format!(" in region {}", r))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let slave = RoutingError::ReplicaNotConfigured {
            cluster: "C1".to_string(),
            region: None,
            slave: 2,
        };
        assert_eq!(slave.to_string(), "Cluster C1 has no slave 2");

        let database = RoutingError::DatabaseNotConfigured {
            cluster: "C1".to_string(),
            region: 1,
            database: 3,
        };
        assert_eq!(database.to_string(), "Cluster C1 region 1 has no database 3");
    }
}
