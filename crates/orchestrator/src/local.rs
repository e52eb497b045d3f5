//! In-process peer transport
//!
//! Routes peer calls straight to other nodes in the same process. Nodes are
//! held weakly so the mesh never keeps them alive.

use async_trait::async_trait;
use dashmap::DashMap;
use sbcc_consensus::{
    ConsensusError, PeerInfo, PeerTransport, QuorumSignal, Result, SignalAck, Transaction,
    ValidatorNode, Vote, VoteAck,
};
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Default)]
pub struct LocalTransport {
    nodes: DashMap<String, Weak<ValidatorNode>>,
    /// Simulated one-way network latency
    latency: Option<Duration>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            nodes: DashMap::new(),
            latency: Some(latency),
        }
    }

    /// Make `node` reachable by its node id
    pub fn attach(&self, node: &Arc<ValidatorNode>) {
        self.nodes
            .insert(node.node_id().to_string(), Arc::downgrade(node));
    }

    /// Take a node off the mesh; later calls to it fail as unreachable
    pub fn detach(&self, node_id: &str) {
        self.nodes.remove(node_id);
    }

    async fn resolve(&self, peer: &PeerInfo) -> Result<Arc<ValidatorNode>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.nodes
            .get(&peer.node_id)
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| ConsensusError::unreachable(&peer.node_id, "not attached to local mesh"))
    }
}

#[async_trait]
impl PeerTransport for LocalTransport {
    async fn send_vote(&self, peer: &PeerInfo, vote: &Vote) -> Result<VoteAck> {
        self.resolve(peer).await?.receive_vote(vote.clone())
    }

    async fn send_signal(&self, peer: &PeerInfo, signal: &QuorumSignal) -> Result<SignalAck> {
        self.resolve(peer).await?.receive_signal(signal.clone())
    }

    async fn fetch_transaction(&self, peer: &PeerInfo, tx_id: &str) -> Result<Option<Transaction>> {
        Ok(self.resolve(peer).await?.transaction(tx_id))
    }
}
