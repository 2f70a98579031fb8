//! Node paths
//!
//! Layout under the namespace root (default `/shardline`):
//!
//! ```text
//! /shardline
//! ├── shardinginfo/<cluster>/<table>   table shard counts
//! └── locks/<name>                     cross-process locks
//! ```

use crate::error::CoordinationError;

pub const DEFAULT_ROOT: &str = "/shardline";
const SHARD_INFO: &str = "shardinginfo";

/// Validate an absolute, normalized node path
pub fn validate(path: &str) -> Result<(), CoordinationError> {
    let invalid = || CoordinationError::InvalidPath(path.to_string());
    if path == "/" {
        return Ok(());
    }
    let rest = path.strip_prefix('/').ok_or_else(invalid)?;
    for segment in rest.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Validate a single path segment (cluster, table or lock name)
pub fn validate_segment(segment: &str) -> Result<(), CoordinationError> {
    if segment.is_empty() || segment.contains('/') || segment == "." || segment == ".." {
        return Err(CoordinationError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

/// Parent of a validated path, `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Every ancestor of `path` from the top down, excluding `/` and `path`
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p == "/" {
            break;
        }
        result.push(p);
        current = parent(p);
    }
    result.reverse();
    result
}

pub fn join(base: &str, segment: &str) -> String {
    if base == "/" {
        format!("/{}", segment)
    } else {
        format!("{}/{}", base, segment)
    }
}

/// Namespace root shared by every node this crate writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    root: String,
}

impl Namespace {
    pub fn new(root: impl Into<String>) -> Result<Self, CoordinationError> {
        let root = root.into();
        validate(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn shard_info_root(&self) -> String {
        join(&self.root, SHARD_INFO)
    }

    pub fn cluster_path(&self, cluster: &str) -> Result<String, CoordinationError> {
        validate_segment(cluster)?;
        Ok(join(&self.shard_info_root(), cluster))
    }

    pub fn table_path(&self, cluster: &str, table: &str) -> Result<String, CoordinationError> {
        validate_segment(table)?;
        Ok(join(&self.cluster_path(cluster)?, table))
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
        }
    }
}
