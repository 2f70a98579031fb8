//! Sharding router
//!
//! Turns a (table, sharding key, role) triple into placement coordinates:
//! region, physical database within the region, table partition index and
//! the replica to use. Routing is a pure function of the inputs and the
//! topology snapshot; only automatic slave selection is randomized.

pub mod error;
pub mod key;
pub mod role;
pub mod router;
pub mod strategy;

pub use error::RoutingError;
pub use key::{ShardingKey, ShardingValue};
pub use role::{Role, SlaveSelector};
pub use router::{Placement, RouteResult, RouterSet, ShardingRouter};
pub use strategy::{DirectStrategy, ModuloStrategy, RoutingStrategy, StrategyRegistry};
