//! Live connections bound to a topology
//!
//! [`ConnectionSet`] mirrors the topology shape (global master and slaves,
//! then per region masters and slave sets) with one opened connection per
//! descriptor. Opening is all-or-nothing: if any descriptor fails, the ones
//! already opened are closed before the error is returned.

use shardline_core::{ConnectionDescriptor, Topology};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ClusterError;
use crate::provider::ConnectionProvider;

/// Opened connection and the descriptor it came from
pub(crate) struct Bound<C> {
    pub id: String,
    pub connection: Arc<C>,
}

impl<C> Clone for Bound<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            connection: self.connection.clone(),
        }
    }
}

pub(crate) struct RegionConnections<C> {
    pub masters: Vec<Bound<C>>,
    pub slaves: Vec<Vec<Bound<C>>>,
}

pub(crate) struct ClusterConnections<C> {
    pub global_master: Option<Bound<C>>,
    pub global_slaves: Vec<Bound<C>>,
    pub regions: Vec<RegionConnections<C>>,
}

/// Every connection of a topology
pub(crate) struct ConnectionSet<C> {
    clusters: HashMap<String, ClusterConnections<C>>,
    /// Open order, closed in reverse
    opened: Vec<Bound<C>>,
    closed: AtomicBool,
}

impl<C: Send + Sync + 'static> ConnectionSet<C> {
    /// Open a connection for every descriptor, each attempt bounded by `timeout`
    pub async fn open<P>(
        topology: &Topology,
        provider: &P,
        timeout: Duration,
    ) -> Result<Self, ClusterError>
    where
        P: ConnectionProvider<Connection = C>,
    {
        let mut opener = Opener {
            provider,
            timeout,
            opened: Vec::with_capacity(topology.connection_count()),
        };
        let mut clusters = HashMap::new();

        for cluster in topology.clusters() {
            let built = async {
                let global_master = match cluster.global_master() {
                    Some(d) => Some(opener.open(d).await?),
                    None => None,
                };
                let mut global_slaves = Vec::with_capacity(cluster.global_slaves().len());
                for d in cluster.global_slaves() {
                    global_slaves.push(opener.open(d).await?);
                }
                let mut regions = Vec::with_capacity(cluster.regions().len());
                for region in cluster.regions() {
                    let mut masters = Vec::with_capacity(region.database_count());
                    for d in region.masters() {
                        masters.push(opener.open(d).await?);
                    }
                    let mut slaves = Vec::with_capacity(region.slave_count());
                    for set in region.slave_sets() {
                        let mut bound = Vec::with_capacity(set.len());
                        for d in set {
                            bound.push(opener.open(d).await?);
                        }
                        slaves.push(bound);
                    }
                    regions.push(RegionConnections { masters, slaves });
                }
                Ok::<_, ClusterError>(ClusterConnections {
                    global_master,
                    global_slaves,
                    regions,
                })
            }
            .await;

            match built {
                Ok(connections) => {
                    clusters.insert(cluster.name().to_string(), connections);
                }
                Err(e) => {
                    warn!(
                        "Opening connections failed, closing {} already opened: {}",
                        opener.opened.len(),
                        e
                    );
                    close_bound(provider, &opener.opened).await;
                    return Err(e);
                }
            }
        }

        info!("Opened {} connections", opener.opened.len());
        Ok(Self {
            clusters,
            opened: opener.opened,
            closed: AtomicBool::new(false),
        })
    }

    /// Close every connection once; later calls do nothing
    pub async fn close_all<P>(&self, provider: &P) -> usize
    where
        P: ConnectionProvider<Connection = C>,
    {
        if self.closed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        close_bound(provider, &self.opened).await
    }
}

impl<C> ConnectionSet<C> {
    pub fn cluster(&self, name: &str) -> Option<&ClusterConnections<C>> {
        self.clusters.get(name)
    }

    pub fn len(&self) -> usize {
        self.opened.len()
    }
}

struct Opener<'a, P: ConnectionProvider> {
    provider: &'a P,
    timeout: Duration,
    opened: Vec<Bound<P::Connection>>,
}

impl<P: ConnectionProvider> Opener<'_, P> {
    async fn open(
        &mut self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Bound<P::Connection>, ClusterError> {
        let id = descriptor.id().to_string();
        let connection = tokio::time::timeout(self.timeout, self.provider.open(descriptor))
            .await
            .map_err(|_| ClusterError::Timeout {
                operation: format!("open connection {}", id),
                timeout: self.timeout,
            })?
            .map_err(|source| ClusterError::Connect {
                id: id.clone(),
                source,
            })?;
        debug!("Opened connection {} ({})", id, descriptor.endpoint());
        let bound = Bound {
            id,
            connection: Arc::new(connection),
        };
        self.opened.push(bound.clone());
        Ok(bound)
    }
}

/// Close in reverse open order, logging failures; returns how many closed cleanly
async fn close_bound<P: ConnectionProvider>(provider: &P, bound: &[Bound<P::Connection>]) -> usize {
    let mut closed = 0;
    for b in bound.iter().rev() {
        match provider.close(&b.connection).await {
            Ok(()) => {
                closed += 1;
                debug!("Closed connection {}", b.id);
            }
            Err(e) => warn!("Failed to close connection {}: {}", b.id, e),
        }
    }
    closed
}
