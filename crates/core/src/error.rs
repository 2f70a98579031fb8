//! Error types for topology construction and registry lookups

use thiserror::Error;

/// Raised while parsing or validating a topology. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Invalid capacity '{input}': {reason}")]
    InvalidCapacity { input: String, reason: String },
    #[error("Cluster name must not be blank")]
    BlankClusterName,
    #[error("Duplicate cluster: {0}")]
    DuplicateCluster(String),
    #[error("Cluster {cluster} region {region} has no master connections")]
    EmptyRegion { cluster: String, region: usize },
    #[error(
        "Cluster {cluster} region {region} slave set {slave} has {actual} connections, expected {expected}"
    )]
    SlaveSetMismatch {
        cluster: String,
        region: usize,
        slave: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Cluster {cluster} regions {first} and {second} have overlapping capacity")]
    OverlappingCapacity {
        cluster: String,
        first: usize,
        second: usize,
    },
    #[error("Cluster {cluster} leaves positions {start}-{end} outside every region")]
    CapacityGap { cluster: String, start: u64, end: u64 },
    #[error("Cluster {0} has global slaves but no global master")]
    GlobalSlavesWithoutMaster(String),
    #[error("Invalid connection descriptor {id}: {reason}")]
    InvalidDescriptor { id: String, reason: String },
    #[error("Unknown hash algorithm: {0}")]
    UnknownHashAlgorithm(String),
}

/// Raised by the table-shard registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Table not found: cluster={cluster}, table={table}")]
    NotFound { cluster: String, table: String },
    #[error("Duplicate table definition: cluster={cluster}, table={table}")]
    Duplicate { cluster: String, table: String },
    #[error("Table {table} references unknown cluster {cluster}")]
    UnknownCluster { cluster: String, table: String },
    #[error("Sharded table {table} belongs to cluster {cluster} which has no regions")]
    NoRegions { cluster: String, table: String },
    #[error("Invalid table definition {cluster}.{table}: {reason}")]
    InvalidTable {
        cluster: String,
        table: String,
        reason: String,
    },
}
