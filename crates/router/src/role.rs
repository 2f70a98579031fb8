//! Replica selection

use serde::{Deserialize, Serialize};

/// Which slave set to read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlaveSelector {
    /// A specific slave index; missing slaves are an error
    Index(usize),
    /// Uniform random choice over configured slaves, master if there are none
    Auto,
}

/// Requested replica role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Master,
    Slave(usize),
    AutoSlave,
}

impl Role {
    pub fn slave_selector(&self) -> Option<SlaveSelector> {
        match self {
            Role::Master => None,
            Role::Slave(index) => Some(SlaveSelector::Index(*index)),
            Role::AutoSlave => Some(SlaveSelector::Auto),
        }
    }
}

impl From<SlaveSelector> for Role {
    fn from(selector: SlaveSelector) -> Self {
        match selector {
            SlaveSelector::Index(index) => Role::Slave(index),
            SlaveSelector::Auto => Role::AutoSlave,
        }
    }
}
