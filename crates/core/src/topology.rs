//! Cluster topology model
//!
//! A [`Topology`] is a validated, immutable set of [`ClusterInfo`]s. Each
//! cluster may own a global master with slaves (for un-sharded tables) and
//! an ordered list of [`RegionInfo`]s. A region maps a [`Capacity`] to one
//! master per physical database, plus any number of slave sets that mirror
//! the master list positionally.
//!
//! Descriptors are pure configuration. Live connections are bound by the
//! cluster manager in a structure that mirrors this one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::capacity::{Capacity, KeyRange};
use crate::error::TopologyError;
use crate::hash::HashAlgorithm;

/// Default routing strategy name for clusters that don't set one
pub const DEFAULT_ROUTER: &str = "modulo";

/// Replica role of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReplicaRole {
    Master,
    Slave(usize),
}

impl ReplicaRole {
    pub fn is_master(&self) -> bool {
        matches!(self, ReplicaRole::Master)
    }
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaRole::Master => f.write_str("master"),
            ReplicaRole::Slave(index) => write!(f, "slave{}", index),
        }
    }
}

/// How to reach a backing store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Endpoint {
    /// Explicit address and credentials; the provider builds a pool for it
    Direct {
        url: String,
        username: String,
        password: String,
        /// Pool tuning options, passed through to the provider
        #[serde(default)]
        pool: BTreeMap<String, String>,
    },
    /// Lookup of a resource registered by the embedding application
    Named { resource: String },
}

impl Endpoint {
    fn check(&self) -> Result<(), String> {
        match self {
            Endpoint::Direct {
                url,
                username,
                password,
                ..
            } => {
                if url.trim().is_empty() {
                    return Err("url must not be blank".to_string());
                }
                if username.trim().is_empty() {
                    return Err("username must not be blank".to_string());
                }
                if password.trim().is_empty() {
                    return Err("password must not be blank".to_string());
                }
                Ok(())
            }
            Endpoint::Named { resource } => {
                if resource.trim().is_empty() {
                    return Err("resource name must not be blank".to_string());
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print credentials
        match self {
            Endpoint::Direct { url, username, .. } => write!(f, "{}@{}", username, url),
            Endpoint::Named { resource } => write!(f, "resource:{}", resource),
        }
    }
}

/// One physical backing-store endpoint placed in the topology
///
/// `id`, `cluster` and `role` are stamped when the topology is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    id: String,
    endpoint: Endpoint,
    cluster: String,
    role: ReplicaRole,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            id: String::new(),
            endpoint,
            cluster: String::new(),
            role: ReplicaRole::Master,
            properties: BTreeMap::new(),
        }
    }

    /// Descriptor with explicit credentials
    pub fn direct(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(Endpoint::Direct {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            pool: BTreeMap::new(),
        })
    }

    /// Descriptor resolved by resource name
    pub fn named(resource: impl Into<String>) -> Self {
        Self::new(Endpoint::Named {
            resource: resource.into(),
        })
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Stable identifier, e.g. `users/region0/slave1/db2`
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn role(&self) -> ReplicaRole {
        self.role
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    fn place(&mut self, cluster: &str, role: ReplicaRole, id: String) {
        self.cluster = cluster.to_string();
        self.role = role;
        self.id = id;
    }

    /// Validate a placed descriptor
    pub fn check(&self) -> Result<(), TopologyError> {
        let invalid = |reason: String| TopologyError::InvalidDescriptor {
            id: self.id.clone(),
            reason,
        };
        if self.cluster.trim().is_empty() {
            return Err(invalid("cluster name must not be blank".to_string()));
        }
        self.endpoint.check().map_err(invalid)
    }
}

/// Range-partitioned group of physical databases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    capacity: Capacity,
    masters: Vec<ConnectionDescriptor>,
    #[serde(default)]
    slaves: Vec<Vec<ConnectionDescriptor>>,
}

impl RegionInfo {
    pub fn new(capacity: Capacity, masters: Vec<ConnectionDescriptor>) -> Self {
        Self {
            capacity,
            masters,
            slaves: Vec::new(),
        }
    }

    /// Append a slave set. Must hold one descriptor per master.
    pub fn with_slave_set(mut self, slaves: Vec<ConnectionDescriptor>) -> Self {
        self.slaves.push(slaves);
        self
    }

    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    pub fn masters(&self) -> &[ConnectionDescriptor] {
        &self.masters
    }

    /// Slave sets, indexed by slave index, each mirroring `masters`
    pub fn slave_sets(&self) -> &[Vec<ConnectionDescriptor>] {
        &self.slaves
    }

    /// Number of physical databases in this region
    pub fn database_count(&self) -> usize {
        self.masters.len()
    }

    pub fn slave_count(&self) -> usize {
        self.slaves.len()
    }

    pub fn has_slaves(&self) -> bool {
        !self.slaves.is_empty()
    }

    pub fn master(&self, database_index: usize) -> Option<&ConnectionDescriptor> {
        self.masters.get(database_index)
    }

    pub fn slave(
        &self,
        slave_index: usize,
        database_index: usize,
    ) -> Option<&ConnectionDescriptor> {
        self.slaves.get(slave_index)?.get(database_index)
    }

    fn descriptors(&self) -> impl Iterator<Item = &ConnectionDescriptor> {
        self.masters.iter().chain(self.slaves.iter().flatten())
    }
}

/// One logical cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    name: String,
    #[serde(default = "default_router")]
    router: String,
    #[serde(default)]
    global_master: Option<ConnectionDescriptor>,
    #[serde(default)]
    global_slaves: Vec<ConnectionDescriptor>,
    #[serde(default)]
    regions: Vec<RegionInfo>,
}

fn default_router() -> String {
    DEFAULT_ROUTER.to_string()
}

impl ClusterInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            router: default_router(),
            global_master: None,
            global_slaves: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Select the routing strategy by registry name
    pub fn with_router(mut self, router: impl Into<String>) -> Self {
        self.router = router.into();
        self
    }

    pub fn with_global_master(mut self, master: ConnectionDescriptor) -> Self {
        self.global_master = Some(master);
        self
    }

    pub fn with_global_slave(mut self, slave: ConnectionDescriptor) -> Self {
        self.global_slaves.push(slave);
        self
    }

    pub fn with_region(mut self, region: RegionInfo) -> Self {
        self.regions.push(region);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routing strategy name
    pub fn router(&self) -> &str {
        &self.router
    }

    pub fn global_master(&self) -> Option<&ConnectionDescriptor> {
        self.global_master.as_ref()
    }

    pub fn global_slaves(&self) -> &[ConnectionDescriptor] {
        &self.global_slaves
    }

    pub fn regions(&self) -> &[RegionInfo] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<&RegionInfo> {
        self.regions.get(index)
    }

    pub fn has_global_slaves(&self) -> bool {
        !self.global_slaves.is_empty()
    }

    /// True if any region carries at least one slave set
    pub fn has_region_slaves(&self) -> bool {
        self.regions.iter().any(RegionInfo::has_slaves)
    }

    /// Lowest position any region covers
    pub fn domain_start(&self) -> u64 {
        self.regions
            .iter()
            .map(|r| r.capacity.start())
            .min()
            .unwrap_or(0)
    }

    /// Number of positions between the lowest and highest covered ones.
    /// Sealed clusters cover this span without gaps.
    pub fn domain_size(&self) -> u64 {
        self.regions
            .iter()
            .map(|r| r.capacity.end())
            .max()
            .map_or(0, |end| end - self.domain_start())
    }

    /// First region, in configured order, whose capacity contains `position`
    pub fn find_region(&self, position: u64) -> Option<(usize, &RegionInfo)> {
        self.regions
            .iter()
            .enumerate()
            .find(|(_, r)| r.capacity.contains(position))
    }

    /// Every descriptor in the cluster
    pub fn descriptors(&self) -> impl Iterator<Item = &ConnectionDescriptor> {
        self.global_master
            .iter()
            .chain(self.global_slaves.iter())
            .chain(self.regions.iter().flat_map(RegionInfo::descriptors))
    }

    /// Stamp cluster name, role and id on every descriptor, then validate
    fn seal(&mut self) -> Result<(), TopologyError> {
        if self.name.trim().is_empty() {
            return Err(TopologyError::BlankClusterName);
        }
        if self.global_master.is_none() && !self.global_slaves.is_empty() {
            return Err(TopologyError::GlobalSlavesWithoutMaster(self.name.clone()));
        }

        let name = self.name.clone();
        if let Some(master) = self.global_master.as_mut() {
            master.place(&name, ReplicaRole::Master, format!("{}/global/master", name));
        }
        for (s, slave) in self.global_slaves.iter_mut().enumerate() {
            slave.place(&name, ReplicaRole::Slave(s), format!("{}/global/slave{}", name, s));
        }

        for (r, region) in self.regions.iter_mut().enumerate() {
            if region.masters.is_empty() {
                return Err(TopologyError::EmptyRegion {
                    cluster: name.clone(),
                    region: r,
                });
            }
            let expected = region.masters.len();
            for (s, set) in region.slaves.iter().enumerate() {
                if set.len() != expected {
                    return Err(TopologyError::SlaveSetMismatch {
                        cluster: name.clone(),
                        region: r,
                        slave: s,
                        expected,
                        actual: set.len(),
                    });
                }
            }
            for (d, master) in region.masters.iter_mut().enumerate() {
                master.place(
                    &name,
                    ReplicaRole::Master,
                    format!("{}/region{}/master/db{}", name, r, d),
                );
            }
            for (s, set) in region.slaves.iter_mut().enumerate() {
                for (d, slave) in set.iter_mut().enumerate() {
                    slave.place(
                        &name,
                        ReplicaRole::Slave(s),
                        format!("{}/region{}/slave{}/db{}", name, r, s, d),
                    );
                }
            }
        }

        for (i, a) in self.regions.iter().enumerate() {
            for (j, b) in self.regions.iter().enumerate().skip(i + 1) {
                if a.capacity.overlaps(&b.capacity) {
                    return Err(TopologyError::OverlappingCapacity {
                        cluster: name.clone(),
                        first: i,
                        second: j,
                    });
                }
            }
        }

        let mut ranges: Vec<&KeyRange> = self
            .regions
            .iter()
            .flat_map(|r| r.capacity.ranges())
            .collect();
        ranges.sort_by_key(|range| range.start);
        for pair in ranges.windows(2) {
            if pair[1].start != pair[0].end {
                return Err(TopologyError::CapacityGap {
                    cluster: name.clone(),
                    start: pair[0].end,
                    end: pair[1].start,
                });
            }
        }

        for descriptor in self.descriptors() {
            descriptor.check()?;
        }
        Ok(())
    }
}

/// Counts used for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub clusters: usize,
    pub regions: usize,
    pub connections: usize,
    pub tables: usize,
    pub global_tables: usize,
}

/// Validated set of clusters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    clusters: Vec<ClusterInfo>,
    #[serde(default)]
    hash_algorithm: HashAlgorithm,
    #[serde(default)]
    coordination_address: String,
}

impl Topology {
    /// Seal and validate clusters
    pub fn new(
        mut clusters: Vec<ClusterInfo>,
        hash_algorithm: HashAlgorithm,
        coordination_address: impl Into<String>,
    ) -> Result<Self, TopologyError> {
        let mut seen = HashSet::new();
        for cluster in clusters.iter_mut() {
            cluster.seal()?;
            if !seen.insert(cluster.name.clone()) {
                return Err(TopologyError::DuplicateCluster(cluster.name.clone()));
            }
        }
        Ok(Self {
            clusters,
            hash_algorithm,
            coordination_address: coordination_address.into(),
        })
    }

    pub fn clusters(&self) -> &[ClusterInfo] {
        &self.clusters
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterInfo> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn cluster_names(&self) -> impl Iterator<Item = &str> {
        self.clusters.iter().map(|c| c.name.as_str())
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn coordination_address(&self) -> &str {
        &self.coordination_address
    }

    /// Total number of descriptors across all clusters
    pub fn connection_count(&self) -> usize {
        self.clusters.iter().map(|c| c.descriptors().count()).sum()
    }

    pub fn region_count(&self) -> usize {
        self.clusters.iter().map(|c| c.regions.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn db(n: usize) -> ConnectionDescriptor {
        ConnectionDescriptor::direct(format!("db://host{}/app", n), "app", "secret")
    }

    fn region(start: u64, end: u64, dbs: usize) -> RegionInfo {
        RegionInfo::new(
            Capacity::single(start, end).unwrap(),
            (0..dbs).map(db).collect(),
        )
    }

    #[test]
    fn test_seal_stamps_descriptors() {
        let cluster = ClusterInfo::new("users")
            .with_global_master(db(0))
            .with_global_slave(db(1))
            .with_region(region(0, 1000, 2).with_slave_set(vec![db(2), db(3)]));
        let topology = Topology::new(vec![cluster], HashAlgorithm::default(), "mem://").unwrap();

        let cluster = topology.cluster("users").unwrap();
        let master = cluster.global_master().unwrap();
        assert_eq!(master.cluster(), "users");
        assert_eq!(master.role(), ReplicaRole::Master);
        assert_eq!(master.id(), "users/global/master");
        assert_eq!(cluster.global_slaves()[0].role(), ReplicaRole::Slave(0));

        let region = cluster.region(0).unwrap();
        assert_eq!(region.slave(0, 1).unwrap().id(), "users/region0/slave0/db1");
        assert_eq!(region.slave(0, 1).unwrap().role(), ReplicaRole::Slave(0));
        assert_eq!(region.master(1).unwrap().id(), "users/region0/master/db1");
        assert_eq!(topology.connection_count(), 6);
        assert_eq!(cluster.router(), DEFAULT_ROUTER);
    }

    #[test]
    fn test_rejects_slave_set_mismatch() {
        let cluster =
            ClusterInfo::new("c").with_region(region(0, 100, 2).with_slave_set(vec![db(9)]));
        let err = Topology::new(vec![cluster], HashAlgorithm::default(), "").unwrap_err();
        assert!(matches!(
            err,
            TopologyError::SlaveSetMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_overlap_between_regions() {
        let cluster = ClusterInfo::new("c")
            .with_region(region(0, 100, 1))
            .with_region(region(50, 150, 1));
        let err = Topology::new(vec![cluster], HashAlgorithm::default(), "").unwrap_err();
        assert!(matches!(
            err,
            TopologyError::OverlappingCapacity {
                first: 0,
                second: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_adjacent_regions_are_allowed() {
        let cluster = ClusterInfo::new("c")
            .with_region(region(0, 100, 1))
            .with_region(region(100, 200, 1));
        let topology = Topology::new(vec![cluster], HashAlgorithm::default(), "").unwrap();
        let cluster = topology.cluster("c").unwrap();
        assert_eq!(cluster.find_region(99).unwrap().0, 0);
        assert_eq!(cluster.find_region(100).unwrap().0, 1);
        assert!(cluster.find_region(200).is_none());
        assert_eq!(cluster.domain_size(), 200);
    }

    #[test]
    fn test_rejects_gaps_in_capacity() {
        let cluster = ClusterInfo::new("c")
            .with_region(region(0, 100, 1))
            .with_region(region(200, 300, 1));
        let err = Topology::new(vec![cluster], HashAlgorithm::default(), "").unwrap_err();
        assert_eq!(
            err,
            TopologyError::CapacityGap {
                cluster: "c".to_string(),
                start: 100,
                end: 200,
            }
        );

        // A gap inside one region's capacity counts too
        let split = ClusterInfo::new("c").with_region(RegionInfo::new(
            Capacity::parse("0-10,20-30").unwrap(),
            vec![db(0)],
        ));
        assert!(matches!(
            Topology::new(vec![split], HashAlgorithm::default(), ""),
            Err(TopologyError::CapacityGap { start: 10, end: 20, .. })
        ));
    }

    #[test]
    fn test_domain_may_start_above_zero() {
        // Regions declared out of order still tile the span
        let cluster = ClusterInfo::new("c")
            .with_region(region(1500, 2000, 1))
            .with_region(region(1000, 1500, 1));
        let topology = Topology::new(vec![cluster], HashAlgorithm::default(), "").unwrap();
        let cluster = topology.cluster("c").unwrap();
        assert_eq!(cluster.domain_start(), 1000);
        assert_eq!(cluster.domain_size(), 1000);
        assert_eq!(cluster.find_region(1000).unwrap().0, 1);
        assert!(cluster.find_region(5).is_none());

        let global_only = ClusterInfo::new("g");
        assert_eq!(global_only.domain_start(), 0);
        assert_eq!(global_only.domain_size(), 0);
    }

    #[test]
    fn test_rejects_blank_and_duplicate_clusters() {
        let err =
            Topology::new(vec![ClusterInfo::new("  ")], HashAlgorithm::default(), "").unwrap_err();
        assert_eq!(err, TopologyError::BlankClusterName);

        let err = Topology::new(
            vec![ClusterInfo::new("a"), ClusterInfo::new("a")],
            HashAlgorithm::default(),
            "",
        )
        .unwrap_err();
        assert_eq!(err, TopologyError::DuplicateCluster("a".to_string()));
    }

    #[test]
    fn test_rejects_empty_region_and_orphan_slaves() {
        let empty = ClusterInfo::new("c").with_region(region(0, 10, 0));
        assert!(matches!(
            Topology::new(vec![empty], HashAlgorithm::default(), ""),
            Err(TopologyError::EmptyRegion { region: 0, .. })
        ));

        let orphan = ClusterInfo::new("c").with_global_slave(db(1));
        assert_eq!(
            Topology::new(vec![orphan], HashAlgorithm::default(), "").unwrap_err(),
            TopologyError::GlobalSlavesWithoutMaster("c".to_string())
        );
    }

    #[test]
    fn test_descriptor_check() {
        let blank_password = ClusterInfo::new("c")
            .with_global_master(ConnectionDescriptor::direct("db://x", "user", " "));
        assert!(matches!(
            Topology::new(vec![blank_password], HashAlgorithm::default(), ""),
            Err(TopologyError::InvalidDescriptor { .. })
        ));

        let blank_name = ClusterInfo::new("c").with_global_master(ConnectionDescriptor::named(""));
        assert!(matches!(
            Topology::new(vec![blank_name], HashAlgorithm::default(), ""),
            Err(TopologyError::InvalidDescriptor { .. })
        ));

        let named =
            ClusterInfo::new("c").with_global_master(ConnectionDescriptor::named("jdbc/main"));
        assert!(Topology::new(vec![named], HashAlgorithm::default(), "").is_ok());
    }

    #[test]
    fn test_endpoint_display_hides_password() {
        let shown = db(1).endpoint().to_string();
        assert_eq!(shown, "app@db://host1/app");
        assert!(!shown.contains("secret"));
    }

    proptest! {
        #[test]
        fn prop_sealed_regions_keep_slave_sets_aligned(
            shapes in proptest::collection::vec((1usize..5, 0usize..4), 1..6),
        ) {
            let mut cluster = ClusterInfo::new("c");
            let mut start = 0u64;
            for (dbs, slave_sets) in &shapes {
                let mut r = region(start, start + 100, *dbs);
                for _ in 0..*slave_sets {
                    r = r.with_slave_set((0..*dbs).map(db).collect());
                }
                cluster = cluster.with_region(r);
                start += 100;
            }
            let topology = Topology::new(vec![cluster], HashAlgorithm::default(), "").unwrap();
            for region in topology.cluster("c").unwrap().regions() {
                for set in region.slave_sets() {
                    prop_assert_eq!(set.len(), region.masters().len());
                }
            }
        }

        #[test]
        fn prop_overlapping_regions_rejected(
            a in 0u64..1000,
            len in 1u64..500,
            offset in 0u64..500,
        ) {
            let offset = offset % len;
            let cluster = ClusterInfo::new("c")
                .with_region(region(a, a + len, 1))
                .with_region(region(a + offset, a + offset + len, 1));
            let is_overlap_error = matches!(
                Topology::new(vec![cluster], HashAlgorithm::default(), ""),
                Err(TopologyError::OverlappingCapacity { .. })
            );
            prop_assert!(is_overlap_error);
        }
    }
}
