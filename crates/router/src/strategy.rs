//! Pluggable routing strategies
//!
//! A strategy decides two things: where a raw key value lands in the
//! cluster's key domain, and which physical database of a region serves a
//! position. Strategies are looked up by name in a [`StrategyRegistry`].

use parking_lot::RwLock;
use shardline_core::ClusterInfo;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::RoutingError;

/// Placement policy for one cluster
pub trait RoutingStrategy: Send + Sync + fmt::Debug {
    /// Registry name
    fn name(&self) -> &str;

    /// Map a raw key value into the cluster's key domain
    fn position(&self, raw: u64, cluster: &ClusterInfo) -> u64;

    /// Pick a physical database for `position` among `database_count`
    fn select_database(&self, position: u64, database_count: usize) -> usize;
}

/// Value modulo domain size, offset by the domain start, for the region
/// scan; position modulo database count for the database. Default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuloStrategy;

impl RoutingStrategy for ModuloStrategy {
    fn name(&self) -> &str {
        "modulo"
    }

    fn position(&self, raw: u64, cluster: &ClusterInfo) -> u64 {
        match cluster.domain_size() {
            0 => raw,
            domain => cluster.domain_start() + raw % domain,
        }
    }

    fn select_database(&self, position: u64, database_count: usize) -> usize {
        if database_count == 0 {
            return 0;
        }
        (position % database_count as u64) as usize
    }
}

/// Raw value is the position; values past the configured capacity fail
/// to route instead of wrapping around.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectStrategy;

impl RoutingStrategy for DirectStrategy {
    fn name(&self) -> &str {
        "direct"
    }

    fn position(&self, raw: u64, _cluster: &ClusterInfo) -> u64 {
        raw
    }

    fn select_database(&self, position: u64, database_count: usize) -> usize {
        ModuloStrategy.select_database(position, database_count)
    }
}

type StrategyFactory = Arc<dyn Fn() -> Arc<dyn RoutingStrategy> + Send + Sync>;

/// Named strategy constructors
pub struct StrategyRegistry {
    factories: RwLock<HashMap<String, StrategyFactory>>,
}

impl StrategyRegistry {
    /// Registry with no strategies
    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the built-in `modulo` and `direct` strategies
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register("modulo", || Arc::new(ModuloStrategy) as Arc<dyn RoutingStrategy>);
        registry.register("direct", || Arc::new(DirectStrategy) as Arc<dyn RoutingStrategy>);
        registry
    }

    /// Register or replace a strategy constructor
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn RoutingStrategy> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registered routing strategy {}", name);
        self.factories.write().insert(name, Arc::new(factory));
    }

    /// Instantiate a strategy by name
    pub fn create(&self, name: &str) -> Result<Arc<dyn RoutingStrategy>, RoutingError> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownStrategy(name.to_string()))?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
