//! In-process network scenarios
//!
//! Covers the behaviour of whole networks wired through `LocalTransport`:
//! - Byzantine resilience against an all-Byzantine control
//! - Convergence of a single transaction processed everywhere
//! - Vote for an unknown transaction pulled and folded in
//! - Submission retries and the scalability sweep

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use sbcc_consensus::{
    ConsensusError, ConsensusStatus, FinalityTier, HealthReport, NodeConfig, NodeMetrics,
    PeerInfo, SubmitResponse, Transaction, Validator, ValidatorType,
};

use crate::client::{ClientError, ClientResult, ValidatorClient};
use crate::experiment::{ExperimentConfig, ExperimentReport, Injection, NetworkOrchestrator};
use crate::local::LocalTransport;
use crate::network::{LocalNetwork, NetworkSpec};

fn fast_template() -> NodeConfig {
    NodeConfig::default().without_delay()
}

fn fast_experiment(transactions: usize, injection: Injection) -> ExperimentConfig {
    ExperimentConfig {
        transactions,
        injection,
        pacing: Duration::ZERO,
        settle: Duration::from_millis(300),
        risk_range: (0.0, 0.3),
        ..ExperimentConfig::default()
    }
}

async fn run_local(spec: &NetworkSpec, config: &ExperimentConfig, seed: u64) -> ExperimentReport {
    let network = LocalNetwork::build(spec).unwrap();
    let orchestrator = NetworkOrchestrator::new(network.clients(), Some(seed));
    orchestrator.wire_mesh().await;
    orchestrator.run(config).await
}

#[tokio::test]
async fn test_byzantine_resilience() {
    let config = fast_experiment(50, Injection::Entry);

    let mixed = NetworkSpec::new(10, 0.2)
        .with_seed(11)
        .with_template(fast_template());
    let mixed_report = run_local(&mixed, &config, 11).await;

    let control = NetworkSpec::new(10, 1.0)
        .with_seed(11)
        .with_template(fast_template());
    let control_report = run_local(&control, &config, 11).await;

    assert_eq!(mixed_report.byzantine_validators, 2);
    assert_eq!(control_report.byzantine_validators, 10);
    assert_eq!(mixed_report.successful_submissions, 50);
    assert_eq!(control_report.successful_submissions, 50);

    println!(
        "honest majority {:.4} vs all-Byzantine {:.4}",
        mixed_report.average_confidence, control_report.average_confidence
    );
    assert!(
        mixed_report.average_confidence - control_report.average_confidence > 0.2,
        "honest majority {} should beat control {}",
        mixed_report.average_confidence,
        control_report.average_confidence
    );
}

#[tokio::test]
async fn test_distributed_convergence() {
    let config = ExperimentConfig {
        transactions: 1,
        injection: Injection::All,
        pacing: Duration::ZERO,
        settle: Duration::from_millis(1000),
        risk_range: (0.3, 0.3),
        ..ExperimentConfig::default()
    };

    let trials = (0..20u64).map(|trial| {
        let config = config.clone();
        async move {
            let spec = NetworkSpec::new(10, 0.2).with_seed(100 + trial);
            let report = run_local(&spec, &config, trial).await;
            report.transactions[0].finality_tier
        }
    });
    let tiers = join_all(trials).await;

    let converged = tiers
        .iter()
        .filter(|tier| **tier >= FinalityTier::Provisional)
        .count();
    assert!(converged >= 19, "only {}/20 trials converged: {:?}", converged, tiers);
}

#[tokio::test]
async fn test_every_node_learns_entry_transactions() {
    let spec = NetworkSpec::new(5, 0.0)
        .with_seed(5)
        .with_template(fast_template());
    let report = run_local(&spec, &fast_experiment(10, Injection::Entry), 5).await;

    assert_eq!(report.num_validators, 5);
    assert_eq!(report.validator_metrics.len(), 5);
    for outcome in &report.transactions {
        assert_eq!(outcome.entry_validators.len(), 1);
        assert_eq!(outcome.validators_reporting, 5, "{} not everywhere", outcome.tx_id);
    }
    let processed: u64 = report
        .validator_metrics
        .values()
        .map(|m| m.consensus_metrics.processed_transactions)
        .sum();
    assert_eq!(processed, 10);
}

#[tokio::test]
async fn test_orphan_vote_pulled_and_folded() {
    let transport = Arc::new(LocalTransport::new());
    let network = LocalNetwork::build_with_transport(
        &NetworkSpec::new(2, 0.0)
            .with_seed(3)
            .with_template(fast_template()),
        transport.clone(),
    )
    .unwrap();
    let (a, b) = (&network.nodes[0], &network.nodes[1]);
    a.register_peer(b.node_id(), "local://validator_1").unwrap();
    b.register_peer(a.node_id(), "local://validator_0").unwrap();

    let tx = Transaction::new("orphan_tx", "addr_1", "addr_2", 50.0).with_risk_score(0.1);
    let submission = a.submit(tx).await.unwrap();
    let report = submission.broadcast.await.unwrap();
    assert_eq!(report.pending_fetch, 1);

    for _ in 0..50 {
        if b.validator().knows("orphan_tx") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let status = b.consensus_status("orphan_tx").expect("pulled from origin");
    assert_eq!(status.vote_count, 1);
    assert_eq!(b.validator().orphan_votes("orphan_tx"), 0);
    assert!(b.transaction("orphan_tx").is_some());
}

#[tokio::test]
async fn test_detached_peer_counts_as_failure() {
    let transport = Arc::new(LocalTransport::new());
    let network = LocalNetwork::build_with_transport(
        &NetworkSpec::new(2, 0.0).with_template(fast_template()),
        transport.clone(),
    )
    .unwrap();
    let (a, b) = (&network.nodes[0], &network.nodes[1]);
    a.register_peer(b.node_id(), "local://validator_1").unwrap();
    transport.detach(b.node_id());

    let tx = Transaction::new("lost_tx", "addr_1", "addr_2", 5.0);
    let report = a.submit(tx).await.unwrap().broadcast.await.unwrap();
    assert_eq!(report.votes_delivered, 0);
    assert!(report.failures >= 1);
    assert!(!b.validator().knows("lost_tx"));
}

#[tokio::test]
async fn test_scalability_sweep() {
    let network = LocalNetwork::build(
        &NetworkSpec::new(6, 0.0)
            .with_seed(9)
            .with_template(fast_template()),
    )
    .unwrap();
    let orchestrator = NetworkOrchestrator::new(network.clients(), Some(9));

    let report = orchestrator.scalability(&[2, 4, 6, 10]).await;
    let counts: Vec<usize> = report.points.iter().map(|p| p.validator_count).collect();
    assert_eq!(counts, vec![2, 4, 6]);
    for point in &report.points {
        assert_eq!(point.successful_validations, point.validator_count);
    }
    assert!((-1.0..=1.0).contains(&report.linear_correlation));
}

#[test]
fn test_single_node_votes_valid_on_low_risk() {
    let mut config = NodeConfig::new("validator_0", ValidatorType::Honest).without_delay();
    config.reputation = 0.95;
    config.rng_seed = Some(21);
    let validator = Validator::new(config);

    let tx = Transaction::new("single_node_tx", "addr_1", "addr_2", 100.0).with_risk_score(0.1);
    let valid = (0..200)
        .filter(|_| validator.decide_vote(&tx).0)
        .count();
    assert!(valid > 170, "only {}/200 votes were valid", valid);
}

/// Fails a fixed number of submissions before accepting
struct FlakyClient {
    failures: u32,
    attempts: AtomicU32,
    retryable: bool,
}

impl FlakyClient {
    fn new(failures: u32, retryable: bool) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
            retryable,
        }
    }
}

#[async_trait]
impl ValidatorClient for FlakyClient {
    fn node_id(&self) -> &str {
        "flaky"
    }

    fn url(&self) -> &str {
        "local://flaky"
    }

    async fn health(&self) -> ClientResult<HealthReport> {
        Err(ConsensusError::unreachable("flaky", "no health").into())
    }

    async fn submit(&self, tx: &Transaction) -> ClientResult<SubmitResponse> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(if self.retryable {
                ConsensusError::unreachable("flaky", "down").into()
            } else {
                ClientError::Rejected {
                    status: 400,
                    message: "bad transaction".to_string(),
                }
            });
        }
        Ok(SubmitResponse {
            tx_id: tx.tx_id.clone(),
            validator_id: "flaky".to_string(),
            vote: true,
            confidence: 0.5,
            finality_tier: FinalityTier::None,
            processing_time: 0.0,
            quorum_strength: 0.0,
            rolling_hash: String::new(),
            peer_count: 0,
        })
    }

    async fn status(&self, _tx_id: &str) -> ClientResult<Option<ConsensusStatus>> {
        Ok(None)
    }

    async fn metrics(&self) -> ClientResult<NodeMetrics> {
        Err(ConsensusError::unreachable("flaky", "no metrics").into())
    }

    async fn register_peer(&self, _peer: &PeerInfo) -> ClientResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_submit_retries_transient_failures() {
    let tx = Transaction::new("retry_tx", "addr_1", "addr_2", 1.0);

    let recovers = FlakyClient::new(2, true);
    assert!(NetworkOrchestrator::submit_with_retry(&recovers, &tx, 2).await.is_ok());
    assert_eq!(recovers.attempts.load(Ordering::SeqCst), 3);

    // Retries are capped at two whatever the caller asks for
    let stays_down = FlakyClient::new(5, true);
    assert!(NetworkOrchestrator::submit_with_retry(&stays_down, &tx, 10).await.is_err());
    assert_eq!(stays_down.attempts.load(Ordering::SeqCst), 3);

    let rejected = FlakyClient::new(1, false);
    assert!(NetworkOrchestrator::submit_with_retry(&rejected, &tx, 2).await.is_err());
    assert_eq!(rejected.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_submissions_are_reported() {
    let clients: Vec<Arc<dyn ValidatorClient>> = vec![Arc::new(FlakyClient::new(100, false))];
    let orchestrator = NetworkOrchestrator::new(clients, Some(1));
    let report = orchestrator
        .run(&ExperimentConfig {
            settle: Duration::ZERO,
            ..fast_experiment(3, Injection::Entry)
        })
        .await;

    assert_eq!(report.successful_submissions, 0);
    assert_eq!(report.failed_submissions, 3);
    assert_eq!(report.average_confidence, 0.0);
    assert!(report.validator_metrics.is_empty());
}
