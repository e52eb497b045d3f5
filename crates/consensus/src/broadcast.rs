//! Peer table and best-effort vote/signal fan-out
//!
//! Broadcast runs on a spawned task so the submitter never waits on peers.
//! Each delivery is independent, bounded by a timeout, and never retried.

use crate::error::{ConsensusError, Result};
use crate::transport::PeerTransport;
use crate::types::{PeerInfo, QuorumSignal, Transaction, Vote, VoteAck};
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Outcome of one broadcast round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub peers: usize,
    pub votes_delivered: usize,
    pub signals_delivered: usize,
    /// Peers that did not know the transaction yet and will pull it
    pub pending_fetch: usize,
    pub failures: usize,
}

#[derive(Debug, Default)]
struct NetworkCounters {
    broadcasts: AtomicU64,
    deliveries_ok: AtomicU64,
    deliveries_failed: AtomicU64,
    fetches_ok: AtomicU64,
    fetches_failed: AtomicU64,
}

/// Snapshot of network counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub broadcasts: u64,
    pub deliveries_ok: u64,
    pub deliveries_failed: u64,
    pub fetches_ok: u64,
    pub fetches_failed: u64,
}

/// Known peers of one node plus the transport used to reach them
pub struct PeerNetwork {
    node_id: String,
    peers: DashMap<String, PeerInfo>,
    transport: Arc<dyn PeerTransport>,
    timeout: Duration,
    limiter: Arc<Semaphore>,
    counters: Arc<NetworkCounters>,
}

impl PeerNetwork {
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<dyn PeerTransport>,
        timeout: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            peers: DashMap::new(),
            transport,
            timeout,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
            counters: Arc::new(NetworkCounters::default()),
        }
    }

    /// Insert or refresh a peer. Returns true if the peer was new.
    pub fn register_peer(&self, node_id: &str, url: &str) -> Result<bool> {
        if node_id.trim().is_empty() || url.trim().is_empty() {
            return Err(ConsensusError::validation(
                "peer registration requires node_id and url",
            ));
        }
        if node_id == self.node_id {
            return Err(ConsensusError::validation(format!(
                "refusing to register self ({}) as a peer",
                node_id
            )));
        }

        let previous = self
            .peers
            .insert(node_id.to_string(), PeerInfo::new(node_id, url));
        match &previous {
            None => tracing::info!("Registered peer {} at {}", node_id, url),
            Some(old) if old.url != url => {
                tracing::info!("Peer {} moved from {} to {}", node_id, old.url, url)
            }
            Some(_) => tracing::debug!("Peer {} already registered", node_id),
        }
        Ok(previous.is_none())
    }

    pub fn remove_peer(&self, node_id: &str) -> Option<PeerInfo> {
        self.peers.remove(node_id).map(|(_, peer)| peer)
    }

    /// Known peers, sorted by node id
    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.peers.iter().map(|p| p.value().clone()).collect();
        peers.sort();
        peers
    }

    pub fn peer(&self, node_id: &str) -> Option<PeerInfo> {
        self.peers.get(node_id).map(|p| p.value().clone())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Send a vote and its signal to every peer on a background task
    pub fn broadcast(&self, vote: Vote, signal: QuorumSignal) -> JoinHandle<BroadcastReport> {
        let peers: Vec<PeerInfo> = self
            .peers()
            .into_iter()
            .filter(|p| p.node_id != self.node_id)
            .collect();
        let transport = self.transport.clone();
        let limiter = self.limiter.clone();
        let counters = self.counters.clone();
        let timeout = self.timeout;
        let node_id = self.node_id.clone();
        counters.broadcasts.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let vote = Arc::new(vote);
            let signal = Arc::new(signal);
            let deliveries = peers.into_iter().map(|peer| {
                let transport = transport.clone();
                let limiter = limiter.clone();
                let vote = vote.clone();
                let signal = signal.clone();
                async move {
                    // Closed only on shutdown
                    let _permit = limiter.acquire_owned().await.ok();
                    let signal_result =
                        with_timeout(timeout, &peer, transport.send_signal(&peer, &signal)).await;
                    let vote_result =
                        with_timeout(timeout, &peer, transport.send_vote(&peer, &vote)).await;
                    (peer, signal_result.map(|_| ()), vote_result)
                }
            });

            let mut report = BroadcastReport::default();
            for (peer, signal_result, vote_result) in join_all(deliveries).await {
                report.peers += 1;
                match signal_result {
                    Ok(()) => report.signals_delivered += 1,
                    Err(e) => {
                        report.failures += 1;
                        tracing::warn!("Signal for {} to {} failed: {}", signal.tx_id, peer.node_id, e);
                    }
                }
                match vote_result {
                    Ok(ack) => {
                        report.votes_delivered += 1;
                        if matches!(ack, VoteAck::PendingFetch { .. }) {
                            report.pending_fetch += 1;
                        }
                    }
                    Err(e) => {
                        report.failures += 1;
                        tracing::warn!("Vote for {} to {} failed: {}", vote.tx_id, peer.node_id, e);
                    }
                }
            }

            let ok = (report.votes_delivered + report.signals_delivered) as u64;
            counters.deliveries_ok.fetch_add(ok, Ordering::Relaxed);
            counters
                .deliveries_failed
                .fetch_add(report.failures as u64, Ordering::Relaxed);

            tracing::debug!(
                "{} broadcast {} to {} peers ({} failures)",
                node_id,
                vote.tx_id,
                report.peers,
                report.failures
            );
            report
        })
    }

    /// Pull a transaction body, trying `origin` first and then every other peer
    pub async fn fetch_transaction(&self, tx_id: &str, origin: Option<&str>) -> Result<Transaction> {
        let mut candidates = self.peers();
        if let Some(origin) = origin {
            if let Some(pos) = candidates.iter().position(|p| p.node_id == origin) {
                let first = candidates.remove(pos);
                candidates.insert(0, first);
            }
        }

        for peer in candidates {
            match with_timeout(
                self.timeout,
                &peer,
                self.transport.fetch_transaction(&peer, tx_id),
            )
            .await
            {
                Ok(Some(tx)) if tx.tx_id == tx_id => {
                    self.counters.fetches_ok.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Fetched {} from {}", tx_id, peer.node_id);
                    return Ok(tx);
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Fetch of {} from {} failed: {}", tx_id, peer.node_id, e);
                }
            }
        }

        self.counters.fetches_failed.fetch_add(1, Ordering::Relaxed);
        Err(ConsensusError::UnknownTransaction(tx_id.to_string()))
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            deliveries_ok: self.counters.deliveries_ok.load(Ordering::Relaxed),
            deliveries_failed: self.counters.deliveries_failed.load(Ordering::Relaxed),
            fetches_ok: self.counters.fetches_ok.load(Ordering::Relaxed),
            fetches_failed: self.counters.fetches_failed.load(Ordering::Relaxed),
        }
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    peer: &PeerInfo,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ConsensusError::unreachable(
            &peer.node_id,
            format!("timed out after {:?}", timeout),
        )),
    }
}
