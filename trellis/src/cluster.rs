//! Static cluster directory.
//!
//! The directory is built once from configuration and never changes at
//! runtime: a table of `{node id → network address}` plus the identity of
//! the local node. Each remote node carries a lazily-initialized client
//! handle; clients are dialled during `run()` and read-only afterwards.
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::serializer::Serializer;
use crate::transport::Client;

pub type NodeId = u32;

/// Pause between dial attempts to a peer.
pub(crate) const DIAL_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// One member of the cluster.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub addr: String,
    client: OnceCell<Client>,
}

impl Node {
    /// The connected client for this peer. Errors if `run()` has not
    /// dialled it yet.
    pub(crate) fn client(&self) -> Result<&Client> {
        self.client
            .get()
            .ok_or_else(|| Error::Config(format!("no connection to node {}; app not running", self.id)))
    }

    /// Dials this peer, retrying up to `num_retries` additional attempts
    /// with a fixed pause. Exhausting the attempts is fatal for startup.
    pub(crate) async fn connect_with_retry(
        &self,
        num_retries: u32,
        serializer: Serializer,
        deadline: Option<Duration>,
    ) -> Result<()> {
        for attempt in 0..=num_retries {
            if attempt > 0 {
                tokio::time::sleep(DIAL_RETRY_INTERVAL).await;
            }
            info!(addr = %self.addr, attempt, "connecting to peer");
            match Client::connect(&self.addr, serializer, deadline).await {
                Ok(client) => {
                    info!(addr = %self.addr, "connected");
                    let _ = self.client.set(client);
                    return Ok(());
                }
                Err(e) => warn!(addr = %self.addr, error = %e, "dial failed"),
            }
        }
        Err(Error::Config(format!(
            "cannot connect to peer {} after {} attempts",
            self.addr,
            num_retries + 1
        )))
    }
}

/// The full directory, identifying the local node.
#[derive(Debug)]
pub struct Cluster {
    pub name: String,
    nodes: Vec<Node>,
    local_id: NodeId,
}

impl Cluster {
    /// Builds the directory, checking that `local_id` names a configured
    /// node and that ids are unique.
    pub fn from_config(config: &ClusterConfig, local_id: NodeId) -> Result<Self> {
        let nodes: Vec<Node> = config
            .nodes
            .iter()
            .map(|n| Node {
                id: n.id,
                addr: n.addr.clone(),
                client: OnceCell::new(),
            })
            .collect();
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].iter().any(|other| other.id == node.id) {
                return Err(Error::Config(format!("duplicate node id {}", node.id)));
            }
        }
        if !nodes.iter().any(|n| n.id == local_id) {
            return Err(Error::Config(format!(
                "local node {local_id} is not in the cluster"
            )));
        }
        Ok(Self {
            name: config.name.clone(),
            nodes,
            local_id,
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// True if `id` names the local node.
    pub fn is_local(&self, id: NodeId) -> bool {
        id == self.local_id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn local_node(&self) -> &Node {
        self.node(self.local_id)
            .expect("local id validated at construction")
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Every node except the local one.
    pub fn peers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.id != self.local_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    fn two_nodes() -> ClusterConfig {
        ClusterConfig {
            name: "test".to_string(),
            nodes: vec![
                NodeConfig {
                    id: 0,
                    addr: "127.0.0.1:33330".to_string(),
                },
                NodeConfig {
                    id: 1,
                    addr: "127.0.0.1:33331".to_string(),
                },
            ],
        }
    }

    #[test]
    fn identifies_local_node() {
        let cluster = Cluster::from_config(&two_nodes(), 1).unwrap();
        assert!(cluster.is_local(1));
        assert!(!cluster.is_local(0));
        assert_eq!(cluster.local_node().addr, "127.0.0.1:33331");
        assert_eq!(cluster.peers().count(), 1);
        assert_eq!(cluster.peers().next().unwrap().id, 0);
    }

    #[test]
    fn unknown_local_id_is_rejected() {
        let err = Cluster::from_config(&two_nodes(), 7).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut config = two_nodes();
        config.nodes[1].id = 0;
        let err = Cluster::from_config(&config, 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
