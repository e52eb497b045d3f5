//! Peer transport abstraction
//!
//! Nodes never share memory; everything crosses a `PeerTransport`. The HTTP
//! implementation lives in the RPC crate, the in-process one in the
//! orchestrator.

use crate::error::{ConsensusError, Result};
use crate::types::{PeerInfo, QuorumSignal, SignalAck, Transaction, Vote, VoteAck};
use async_trait::async_trait;

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Deliver a vote to `peer`
    async fn send_vote(&self, peer: &PeerInfo, vote: &Vote) -> Result<VoteAck>;

    /// Deliver a quorum signal to `peer`
    async fn send_signal(&self, peer: &PeerInfo, signal: &QuorumSignal) -> Result<SignalAck>;

    /// Pull a transaction body from `peer`; `Ok(None)` if the peer does not know it
    async fn fetch_transaction(&self, peer: &PeerInfo, tx_id: &str) -> Result<Option<Transaction>>;
}

/// Transport for isolated nodes: every peer is unreachable
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

#[async_trait]
impl PeerTransport for NullTransport {
    async fn send_vote(&self, peer: &PeerInfo, _vote: &Vote) -> Result<VoteAck> {
        Err(ConsensusError::unreachable(&peer.node_id, "no transport configured"))
    }

    async fn send_signal(&self, peer: &PeerInfo, _signal: &QuorumSignal) -> Result<SignalAck> {
        Err(ConsensusError::unreachable(&peer.node_id, "no transport configured"))
    }

    async fn fetch_transaction(&self, peer: &PeerInfo, _tx_id: &str) -> Result<Option<Transaction>> {
        Err(ConsensusError::unreachable(&peer.node_id, "no transport configured"))
    }
}
