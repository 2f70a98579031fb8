use async_trait::async_trait;
use parking_lot::Mutex;
use shardline_cluster::{ConnectionProvider, ProviderError, SchemaSynchronizer, SyncAction};
use shardline_core::{ConnectionDescriptor, TableShardInfo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Connection handed out by [`MockProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConnection {
    pub id: String,
    pub endpoint: String,
}

/// Counts opens and closes; can refuse or stall selected descriptors
#[derive(Default)]
pub struct MockProvider {
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_order: Mutex<Vec<String>>,
    close_order: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to open the descriptor with this id
    pub fn fail_on(&self, id: &str) {
        *self.fail_on.lock() = Some(id.to_string());
    }

    /// Stall every open by `delay`
    pub fn delay_opens(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_order(&self) -> Vec<String> {
        self.open_order.lock().clone()
    }

    pub fn close_order(&self) -> Vec<String> {
        self.close_order.lock().clone()
    }
}

#[async_trait]
impl ConnectionProvider for MockProvider {
    type Connection = MockConnection;

    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<MockConnection, ProviderError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.lock().as_deref() == Some(descriptor.id()) {
            return Err(ProviderError::Refused(descriptor.id().to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.open_order.lock().push(descriptor.id().to_string());
        Ok(MockConnection {
            id: descriptor.id().to_string(),
            endpoint: descriptor.endpoint().to_string(),
        })
    }

    async fn close(&self, connection: &MockConnection) -> Result<(), ProviderError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.close_order.lock().push(connection.id.clone());
        Ok(())
    }
}

/// One `sync_table` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCall {
    pub connection: String,
    pub table: String,
    pub physical_tables: Vec<String>,
    pub action: SyncAction,
}

/// Records schema calls instead of issuing statements
#[derive(Default)]
pub struct RecordingSynchronizer {
    calls: Mutex<Vec<SyncCall>>,
    fail_on: Mutex<Option<String>>,
}

impl RecordingSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when syncing on the connection with this id
    pub fn fail_on(&self, id: &str) {
        *self.fail_on.lock() = Some(id.to_string());
    }

    pub fn calls(&self) -> Vec<SyncCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SchemaSynchronizer<MockConnection> for RecordingSynchronizer {
    async fn sync_table(
        &self,
        connection: &MockConnection,
        table: &TableShardInfo,
        physical_tables: &[String],
        action: SyncAction,
    ) -> Result<(), ProviderError> {
        if self.fail_on.lock().as_deref() == Some(connection.id.as_str()) {
            return Err(ProviderError::Other(format!("cannot alter {}", table.table)));
        }
        self.calls.lock().push(SyncCall {
            connection: connection.id.clone(),
            table: table.table.clone(),
            physical_tables: physical_tables.to_vec(),
            action,
        });
        Ok(())
    }
}
