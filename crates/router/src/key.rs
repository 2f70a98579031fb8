//! Sharding keys

use serde::{Deserialize, Serialize};
use shardline_core::HashAlgorithm;
use std::fmt;

/// Raw value used to place a row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardingValue {
    Number(u64),
    Text(String),
}

impl ShardingValue {
    /// Numeric values are used as-is, text goes through `hash`
    pub fn raw_position(&self, hash: HashAlgorithm) -> u64 {
        match self {
            ShardingValue::Number(n) => *n,
            ShardingValue::Text(s) => hash.position(s),
        }
    }
}

impl fmt::Display for ShardingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardingValue::Number(n) => write!(f, "{}", n),
            ShardingValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<u64> for ShardingValue {
    fn from(v: u64) -> Self {
        ShardingValue::Number(v)
    }
}

impl From<u32> for ShardingValue {
    fn from(v: u32) -> Self {
        ShardingValue::Number(v as u64)
    }
}

impl From<usize> for ShardingValue {
    fn from(v: usize) -> Self {
        ShardingValue::Number(v as u64)
    }
}

impl From<&str> for ShardingValue {
    fn from(v: &str) -> Self {
        ShardingValue::Text(v.to_string())
    }
}

impl From<String> for ShardingValue {
    fn from(v: String) -> Self {
        ShardingValue::Text(v)
    }
}

/// Sharding value bound to the cluster it lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardingKey {
    cluster: String,
    value: ShardingValue,
}

impl ShardingKey {
    pub fn new(cluster: impl Into<String>, value: impl Into<ShardingValue>) -> Self {
        Self {
            cluster: cluster.into(),
            value: value.into(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn value(&self) -> &ShardingValue {
        &self.value
    }
}

impl fmt::Display for ShardingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cluster, self.value)
    }
}
