//! Resource handles
//!
//! A [`ResourceHandle`] binds one live connection to one physical table for
//! a single operation. Handles are cheap to clone and should not be kept
//! across calls: the provider may recycle the connection underneath.

use serde::Serialize;
use shardline_core::{Capacity, ReplicaRole};
use std::fmt;
use std::sync::Arc;

/// Region coordinates, for logging and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionDiagnostics {
    pub region_index: usize,
    pub database_index: usize,
    pub capacity: Capacity,
}

/// Physical table name: `orders_3` for partition 3, `orders` when global
pub fn physical_table_name(table: &str, table_index: Option<u32>) -> String {
    match table_index {
        Some(index) => format!("{}_{}", table, index),
        None => table.to_string(),
    }
}

/// One (connection, physical table) pair
pub struct ResourceHandle<C> {
    connection: Arc<C>,
    connection_id: String,
    cluster: String,
    table: String,
    physical_table: String,
    table_index: Option<u32>,
    role: ReplicaRole,
    region: Option<RegionDiagnostics>,
}

impl<C> ResourceHandle<C> {
    pub(crate) fn global(
        connection: Arc<C>,
        connection_id: String,
        cluster: &str,
        table: &str,
        role: ReplicaRole,
    ) -> Self {
        Self {
            connection,
            connection_id,
            cluster: cluster.to_string(),
            table: table.to_string(),
            physical_table: physical_table_name(table, None),
            table_index: None,
            role,
            region: None,
        }
    }

    pub(crate) fn sharded(
        connection: Arc<C>,
        connection_id: String,
        cluster: &str,
        table: &str,
        table_index: u32,
        role: ReplicaRole,
        region: RegionDiagnostics,
    ) -> Self {
        Self {
            connection,
            connection_id,
            cluster: cluster.to_string(),
            table: table.to_string(),
            physical_table: physical_table_name(table, Some(table_index)),
            table_index: Some(table_index),
            role,
            region: Some(region),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Shared handle to the connection
    pub fn connection_arc(&self) -> Arc<C> {
        self.connection.clone()
    }

    /// Descriptor id of the bound connection
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Logical table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Table name to use in statements
    pub fn physical_table(&self) -> &str {
        &self.physical_table
    }

    pub fn table_index(&self) -> Option<u32> {
        self.table_index
    }

    pub fn role(&self) -> ReplicaRole {
        self.role
    }

    pub fn region(&self) -> Option<&RegionDiagnostics> {
        self.region.as_ref()
    }

    pub fn is_global(&self) -> bool {
        self.table_index.is_none()
    }
}

impl<C> Clone for ResourceHandle<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            connection_id: self.connection_id.clone(),
            cluster: self.cluster.clone(),
            table: self.table.clone(),
            physical_table: self.physical_table.clone(),
            table_index: self.table_index,
            role: self.role,
            region: self.region.clone(),
        }
    }
}

impl<C> fmt::Debug for ResourceHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("connection_id", &self.connection_id)
            .field("cluster", &self.cluster)
            .field("physical_table", &self.physical_table)
            .field("role", &self.role)
            .field("region", &self.region)
            .finish()
    }
}

impl<C> fmt::Display for ResourceHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} on {} ({})",
            self.cluster, self.physical_table, self.connection_id, self.role
        )?;
        if let Some(region) = &self.region {
            write!(f, " region {} [{}]", region.region_index, region.capacity)?;
        }
        Ok(())
    }
}
