//! Validator node - the service layer tying a validator to its peers

use crate::broadcast::{BroadcastReport, PeerNetwork};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::strategy::VotingStrategy;
use crate::transport::{NullTransport, PeerTransport};
use crate::types::{
    unix_now, ConsensusMetrics, ConsensusStatus, HealthReport, NetworkMetrics, NodeMetrics,
    PeerInfo, QuorumSignal, RegisterPeerResponse, SignalAck, SubmitResponse, Transaction,
    ValidatorInfo, Vote, VoteAck,
};
use crate::validator::{Delivery, Validator};
use dashmap::DashSet;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Result of a local submission: the response plus the in-flight broadcast
pub struct Submission {
    pub response: SubmitResponse,
    /// Resolves once every peer delivery finished or timed out
    pub broadcast: JoinHandle<BroadcastReport>,
}

/// One validator process: local voting plus peer gossip
pub struct ValidatorNode {
    validator: Validator,
    network: PeerNetwork,
    /// Transactions with a body pull in flight
    pending_fetches: DashSet<String>,
    started: Instant,
}

impl ValidatorNode {
    pub fn new(validator: Validator, transport: Arc<dyn PeerTransport>) -> Self {
        let config = validator.config();
        let network = PeerNetwork::new(
            config.node_id.clone(),
            transport,
            config.peer_timeout(),
            config.broadcast_concurrency,
        );
        Self {
            validator,
            network,
            pending_fetches: DashSet::new(),
            started: Instant::now(),
        }
    }

    pub fn node_id(&self) -> &str {
        self.validator.node_id()
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn network(&self) -> &PeerNetwork {
        &self.network
    }

    /// Every validator this node knows, itself included
    fn known_validators(&self) -> usize {
        self.network.peer_count() + 1
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            node_id: self.node_id().to_string(),
            validator_type: self.validator.identity().validator_type,
            processed_count: self.validator.processed_count(),
            uptime_seconds: self.uptime().as_secs_f64(),
            peer_count: self.network.peer_count(),
            rolling_hash: self.validator.rolling_hash_prefix(),
        }
    }

    /// Process a transaction locally and start broadcasting the vote
    pub async fn submit(&self, tx: Transaction) -> Result<Submission> {
        let record = self
            .validator
            .process_transaction(tx, self.known_validators())
            .await?;

        let response = SubmitResponse {
            tx_id: record.vote.tx_id.clone(),
            validator_id: self.node_id().to_string(),
            vote: record.vote.vote,
            confidence: record.confidence,
            finality_tier: record.finality_tier,
            processing_time: record.processing_time,
            quorum_strength: record.quorum_strength,
            rolling_hash: record.rolling_hash,
            peer_count: self.network.peer_count(),
        };
        let broadcast = self.network.broadcast(record.vote, record.signal);

        Ok(Submission {
            response,
            broadcast,
        })
    }

    /// Submit and leave the broadcast running in the background
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<SubmitResponse> {
        self.submit(tx).await.map(|submission| submission.response)
    }

    /// Fold in a peer's vote. Unknown transactions are buffered and pulled
    /// from the voter in the background.
    pub fn receive_vote(self: &Arc<Self>, vote: Vote) -> Result<VoteAck> {
        vote.validate()?;
        let tx_id = vote.tx_id.clone();
        let origin = vote.validator_id.clone();

        match self.validator.record_vote(vote, self.known_validators()) {
            Delivery::Applied(evaluation) => Ok(VoteAck::Recorded {
                tx_id,
                new_confidence: evaluation.confidence,
                finality_tier: evaluation.finality_tier,
            }),
            Delivery::Buffered => {
                self.schedule_fetch(&tx_id, Some(origin));
                Ok(VoteAck::PendingFetch { tx_id })
            }
        }
    }

    pub fn receive_signal(&self, signal: QuorumSignal) -> Result<SignalAck> {
        signal.validate()?;
        let tx_id = signal.tx_id.clone();

        match self.validator.record_signal(signal, self.known_validators()) {
            Delivery::Applied(evaluation) => Ok(SignalAck::Updated {
                tx_id,
                updated_confidence: evaluation.confidence,
                finality_tier: evaluation.finality_tier,
            }),
            Delivery::Buffered => Ok(SignalAck::Queued { tx_id }),
        }
    }

    /// Confidence of a transaction recomputed at the current time
    pub fn consensus_status(&self, tx_id: &str) -> Option<ConsensusStatus> {
        let evaluation = self.validator.status(tx_id, self.known_validators())?;
        Some(ConsensusStatus {
            tx_id: evaluation.tx_id,
            confidence: evaluation.confidence,
            finality_tier: evaluation.finality_tier,
            vote_count: evaluation.vote_count,
            quorum_strength: evaluation.quorum_strength,
            consensus_achieved: evaluation.finality_tier.is_final(),
            rolling_hash: self.validator.rolling_hash_prefix(),
            timestamp: unix_now(),
        })
    }

    pub fn transaction(&self, tx_id: &str) -> Option<Transaction> {
        self.validator.transaction(tx_id)
    }

    pub fn register_peer(&self, node_id: &str, url: &str) -> Result<RegisterPeerResponse> {
        let newly_added = self.network.register_peer(node_id, url)?;
        Ok(RegisterPeerResponse {
            status: "registered".to_string(),
            peer_id: node_id.to_string(),
            newly_added,
        })
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.network.peers()
    }

    /// Stop broadcasting to a peer
    pub fn remove_peer(&self, node_id: &str) -> Option<PeerInfo> {
        let removed = self.network.remove_peer(node_id);
        if removed.is_some() {
            tracing::info!("{} removed peer {}", self.node_id(), node_id);
        }
        removed
    }

    pub fn metrics(&self) -> NodeMetrics {
        let stats = self.validator.stats();
        let network = self.network.stats();
        let identity = self.validator.identity();
        let uptime = self.uptime().as_secs_f64();

        let total = stats.finality_distribution.total();
        let finalized = stats.finality_distribution.finalized();
        let finality_rate = if total > 0 {
            finalized as f64 / total as f64
        } else {
            0.0
        };
        let throughput_tps = if uptime > 0.0 {
            stats.processed as f64 / uptime
        } else {
            0.0
        };

        NodeMetrics {
            node_id: identity.node_id.clone(),
            validator_info: ValidatorInfo {
                validator_type: identity.validator_type,
                reputation: identity.reputation,
                stake_weight: identity.stake_weight,
                quorum_participation: identity.quorum_participation,
                lambda_base: identity.lambda_base,
            },
            consensus_metrics: ConsensusMetrics {
                processed_transactions: stats.processed,
                active_transactions: stats.active_transactions,
                orphaned_transactions: stats.orphaned_transactions,
                consensus_achievements: stats.achievements,
                finality_distribution: stats.finality_distribution,
                total_finalized: finalized,
                finality_rate,
                average_confidence: stats.average_confidence,
                average_processing_time: stats.average_processing_time,
                throughput_tps,
                votes_received: stats.votes_received,
                signals_received: stats.signals_received,
                orphan_votes_dropped: stats.orphan_votes_dropped,
            },
            network_state: NetworkMetrics {
                peer_count: self.network.peer_count(),
                broadcasts: network.broadcasts,
                deliveries_ok: network.deliveries_ok,
                deliveries_failed: network.deliveries_failed,
                fetches_ok: network.fetches_ok,
                fetches_failed: network.fetches_failed,
                rolling_hash: stats.rolling_hash,
                rolling_hash_sequence: stats.rolling_hash_sequence,
                uptime_seconds: uptime,
            },
        }
    }

    /// Pull an unknown transaction body in the background, at most one
    /// pull per transaction at a time
    fn schedule_fetch(self: &Arc<Self>, tx_id: &str, origin: Option<String>) {
        if !self.pending_fetches.insert(tx_id.to_string()) {
            return;
        }
        let node = Arc::clone(self);
        let tx_id = tx_id.to_string();
        tokio::spawn(async move {
            match node.network.fetch_transaction(&tx_id, origin.as_deref()).await {
                Ok(tx) => match node.validator.adopt_transaction(tx, node.known_validators()) {
                    Ok(evaluation) => tracing::debug!(
                        "{} adopted {} with {} buffered votes, confidence {:.4}",
                        node.node_id(),
                        tx_id,
                        evaluation.vote_count,
                        evaluation.confidence
                    ),
                    Err(e) => tracing::warn!("{} rejected pulled {}: {}", node.node_id(), tx_id, e),
                },
                // Buffered votes stay until the orphan TTL expires
                Err(e) => tracing::warn!("{} could not pull {}: {}", node.node_id(), tx_id, e),
            }
            node.pending_fetches.remove(&tx_id);
        });
    }

    /// Periodically drop orphan buffers older than the configured TTL.
    /// Stops once the node is dropped.
    pub fn spawn_orphan_janitor(self: &Arc<Self>) -> JoinHandle<()> {
        let ttl = self.validator.config().orphan_ttl();
        let period = (ttl / 2).max(Duration::from_millis(100));
        let weak: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(node) = weak.upgrade() else {
                    break;
                };
                let dropped = node.validator.purge_expired_orphans(ttl);
                if dropped > 0 {
                    tracing::info!(
                        "{} dropped {} orphaned votes after {:?}",
                        node.node_id(),
                        dropped,
                        ttl
                    );
                }
            }
        })
    }
}

/// Builder for ValidatorNode
pub struct ValidatorNodeBuilder {
    config: NodeConfig,
    transport: Option<Arc<dyn PeerTransport>>,
    strategy: Option<Box<dyn VotingStrategy>>,
}

impl ValidatorNodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            transport: None,
            strategy: None,
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.config.node_id = node_id.into();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the voting strategy implied by the validator type
    pub fn strategy(mut self, strategy: Box<dyn VotingStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Validate the configuration and build the node
    pub fn build(self) -> Result<ValidatorNode> {
        self.config.validate()?;
        let validator = match self.strategy {
            Some(strategy) => Validator::with_strategy(self.config, strategy),
            None => Validator::new(self.config),
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(NullTransport) as Arc<dyn PeerTransport>);

        tracing::info!(
            "Built {} validator {}",
            validator.identity().validator_type,
            validator.node_id()
        );
        Ok(ValidatorNode::new(validator, transport))
    }
}

impl Default for ValidatorNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsensusError;
    use crate::types::ValidatorType;
    use async_trait::async_trait;

    fn node(node_id: &str) -> Arc<ValidatorNode> {
        let mut config = NodeConfig::new(node_id, ValidatorType::Honest).without_delay();
        config.rng_seed = Some(1);
        Arc::new(ValidatorNodeBuilder::new().config(config).build().unwrap())
    }

    /// Peer that never answers
    struct StallingTransport;

    #[async_trait]
    impl PeerTransport for StallingTransport {
        async fn send_vote(&self, _peer: &PeerInfo, _vote: &Vote) -> Result<VoteAck> {
            futures::future::pending().await
        }

        async fn send_signal(&self, _peer: &PeerInfo, _signal: &QuorumSignal) -> Result<SignalAck> {
            futures::future::pending().await
        }

        async fn fetch_transaction(&self, _peer: &PeerInfo, _tx_id: &str) -> Result<Option<Transaction>> {
            futures::future::pending().await
        }
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = NodeConfig::default();
        config.thresholds.provisional = 0.99;
        assert!(matches!(
            ValidatorNodeBuilder::new().config(config).build(),
            Err(ConsensusError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_and_status() {
        let node = node("validator_0");
        let tx = Transaction::new("tx_1", "a", "b", 5.0).with_risk_score(0.1);

        let response = node.submit_transaction(tx.clone()).await.unwrap();
        assert_eq!(response.tx_id, "tx_1");
        assert_eq!(response.validator_id, "validator_0");
        assert_eq!(response.peer_count, 0);

        let status = node.consensus_status("tx_1").unwrap();
        assert_eq!(status.vote_count, 1);
        assert!(status.confidence >= response.confidence);
        assert_eq!(node.transaction("tx_1").unwrap(), tx);
        assert!(node.consensus_status("unknown").is_none());

        let health = node.health();
        assert_eq!(health.processed_count, 1);
        assert_eq!(health.rolling_hash.len(), 16);
    }

    #[tokio::test]
    async fn test_submit_does_not_wait_for_peers() {
        let mut config = NodeConfig::new("validator_0", ValidatorType::Honest).without_delay();
        config.peer_timeout_ms = 10_000;
        let node = ValidatorNodeBuilder::new()
            .config(config)
            .transport(Arc::new(StallingTransport))
            .build()
            .unwrap();
        for i in 0..8 {
            node.register_peer(&format!("peer_{}", i), "http://10.255.255.1:9")
                .unwrap();
        }

        let started = Instant::now();
        let submission = node
            .submit(Transaction::new("tx_1", "a", "b", 1.0))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(submission.response.peer_count, 8);
        submission.broadcast.abort();
    }

    #[tokio::test]
    async fn test_receive_vote_unknown_schedules_fetch() {
        let node = node("validator_0");
        let vote = Vote {
            tx_id: "tx_remote".to_string(),
            validator_id: "validator_1".to_string(),
            vote: true,
            confidence: 0.8,
            reputation: 0.9,
            stake_weight: 2.0,
            timestamp: unix_now(),
            signature: String::new(),
        };

        let ack = node.receive_vote(vote).unwrap();
        assert_eq!(
            ack,
            VoteAck::PendingFetch {
                tx_id: "tx_remote".to_string()
            }
        );
        assert_eq!(node.validator().orphan_votes("tx_remote"), 1);
    }

    #[tokio::test]
    async fn test_receive_signal_before_tx_is_queued() {
        let node = node("validator_0");
        let signal = QuorumSignal {
            validator_id: "validator_1".to_string(),
            tx_id: "tx_later".to_string(),
            signal_strength: 0.6,
            network_state_hash: String::new(),
            timestamp: unix_now(),
        };
        assert!(matches!(
            node.receive_signal(signal.clone()).unwrap(),
            SignalAck::Queued { .. }
        ));

        node.submit_transaction(Transaction::new("tx_later", "a", "b", 1.0))
            .await
            .unwrap();
        assert!(matches!(
            node.receive_signal(signal).unwrap(),
            SignalAck::Updated { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_vote_rejected() {
        let node = node("validator_0");
        let vote = Vote {
            tx_id: String::new(),
            validator_id: "validator_1".to_string(),
            vote: true,
            confidence: 0.8,
            reputation: 0.9,
            stake_weight: 1.0,
            timestamp: unix_now(),
            signature: String::new(),
        };
        assert!(matches!(
            node.receive_vote(vote),
            Err(ConsensusError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_metrics_report() {
        let node = node("validator_0");
        node.register_peer("validator_1", "http://127.0.0.1:1").unwrap();
        for i in 0..3 {
            node.submit_transaction(Transaction::new(format!("tx_{}", i), "a", "b", 1.0))
                .await
                .unwrap();
        }

        let metrics = node.metrics();
        assert_eq!(metrics.node_id, "validator_0");
        assert_eq!(metrics.consensus_metrics.processed_transactions, 3);
        assert_eq!(metrics.consensus_metrics.active_transactions, 3);
        assert_eq!(metrics.network_state.peer_count, 1);
        assert_eq!(metrics.network_state.rolling_hash_sequence, 3);
        assert_eq!(
            metrics.consensus_metrics.finality_distribution.total(),
            3
        );
        assert!(metrics.consensus_metrics.finality_rate <= 1.0);
    }

    #[tokio::test]
    async fn test_register_peer_idempotent() {
        let node = node("validator_0");
        let first = node.register_peer("validator_1", "http://a").unwrap();
        let second = node.register_peer("validator_1", "http://a").unwrap();
        assert!(first.newly_added);
        assert!(!second.newly_added);
        assert_eq!(node.peers().len(), 1);
        assert!(node.register_peer("validator_0", "http://self").is_err());
    }

    #[tokio::test]
    async fn test_removed_peer_gets_no_broadcast() {
        let node = node("validator_0");
        node.register_peer("validator_1", "http://a").unwrap();
        node.register_peer("validator_2", "http://b").unwrap();

        let removed = node.remove_peer("validator_1").unwrap();
        assert_eq!(removed.url, "http://a");
        assert!(node.remove_peer("validator_1").is_none());
        assert_eq!(node.peers().len(), 1);

        let response = node
            .submit_transaction(Transaction::new("tx_1", "a", "b", 1.0))
            .await
            .unwrap();
        assert_eq!(response.peer_count, 1);
    }
}
