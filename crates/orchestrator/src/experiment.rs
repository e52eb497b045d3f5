//! Consensus experiments
//!
//! `NetworkOrchestrator` wires validators into a full mesh, injects a stream
//! of transactions, waits for votes to propagate and then polls every
//! validator for its view of each transaction.

use crate::client::{ClientResult, ValidatorClient};
use futures::future::join_all;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sbcc_consensus::{
    unix_now, FinalityTier, NodeMetrics, PeerInfo, SubmitResponse, TierCounts, Transaction,
    ValidatorType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Submissions are retried at most this many times
pub const MAX_SUBMIT_RETRIES: u32 = 2;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Where each transaction enters the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Injection {
    /// One randomly chosen validator per transaction
    Entry,
    /// Every validator processes every transaction
    All,
}

#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub transactions: usize,
    pub injection: Injection,
    /// Pause between consecutive transactions
    pub pacing: Duration,
    /// Wait after the last submission before polling results
    pub settle: Duration,
    /// Clamped to `MAX_SUBMIT_RETRIES`
    pub max_retries: u32,
    /// Risk scores are drawn uniformly from this range
    pub risk_range: (f64, f64),
    /// `None` generates UUID transaction ids
    pub tx_prefix: Option<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            transactions: 50,
            injection: Injection::Entry,
            pacing: Duration::from_millis(100),
            settle: Duration::from_secs(5),
            max_retries: MAX_SUBMIT_RETRIES,
            risk_range: (0.0, 1.0),
            tx_prefix: Some("dist_tx".to_string()),
        }
    }
}

/// What the network concluded about one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub tx_id: String,
    pub risk_score: f64,
    pub entry_validators: Vec<String>,
    /// Confidence returned by the first entry validator at submission
    pub submit_confidence: f64,
    /// Mean confidence across validators that know the transaction
    pub average_confidence: f64,
    /// Tier reported by the first entry validator after settling
    pub finality_tier: FinalityTier,
    pub validators_reporting: usize,
    pub validators_finalized: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_type: String,
    pub num_validators: usize,
    pub byzantine_validators: usize,
    pub num_transactions: usize,
    pub successful_submissions: usize,
    pub failed_submissions: usize,
    pub transactions: Vec<TransactionOutcome>,
    pub average_confidence: f64,
    pub finality_distribution: TierCounts,
    pub total_finality_rate: f64,
    /// Fraction of submitted transactions that reached any tier
    pub consensus_efficiency: f64,
    pub throughput_tps: f64,
    pub total_time_secs: f64,
    pub validator_metrics: BTreeMap<String, NodeMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalabilityPoint {
    pub validator_count: usize,
    pub processing_time: f64,
    pub successful_validations: usize,
    pub throughput_per_validator: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalabilityReport {
    pub points: Vec<ScalabilityPoint>,
    /// Pearson correlation of validator count against throughput
    pub linear_correlation: f64,
    pub scaling_efficiency: f64,
}

/// Drives a set of validators through an experiment
pub struct NetworkOrchestrator {
    clients: Vec<Arc<dyn ValidatorClient>>,
    rng: Mutex<StdRng>,
}

impl NetworkOrchestrator {
    pub fn new(clients: Vec<Arc<dyn ValidatorClient>>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            clients,
            rng: Mutex::new(rng),
        }
    }

    pub fn clients(&self) -> &[Arc<dyn ValidatorClient>] {
        &self.clients
    }

    /// Register every validator with every other one. Returns the number of
    /// successful registrations.
    pub async fn wire_mesh(&self) -> usize {
        let registrations = self.clients.iter().flat_map(|client| {
            self.clients
                .iter()
                .filter(move |peer| peer.node_id() != client.node_id())
                .map(move |peer| {
                    let info = PeerInfo::new(peer.node_id(), peer.url());
                    async move {
                        let result = client.register_peer(&info).await;
                        if let Err(e) = &result {
                            tracing::warn!(
                                "Failed to register {} with {}: {}",
                                info.node_id,
                                client.node_id(),
                                e
                            );
                        }
                        result.is_ok()
                    }
                })
        });

        let wired = join_all(registrations)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        tracing::info!("Wired mesh: {} peer registrations", wired);
        wired
    }

    pub fn generate_transaction(&self, index: usize, config: &ExperimentConfig) -> Transaction {
        let mut rng = self.rng.lock();
        let tx_id = match &config.tx_prefix {
            Some(prefix) => format!("{}_{}", prefix, index),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let (low, high) = config.risk_range;
        let risk = if high > low {
            rng.gen_range(low..high)
        } else {
            low
        };
        Transaction::new(
            tx_id,
            format!("addr_{}", rng.gen_range(0..=50)),
            format!("addr_{}", rng.gen_range(0..=50)),
            rng.gen_range(10.0..10_000.0),
        )
        .with_risk_score(risk)
        .with_complexity(rng.gen_range(1..=3))
    }

    /// Submit with bounded retries on transient failures
    pub async fn submit_with_retry(
        client: &dyn ValidatorClient,
        tx: &Transaction,
        max_retries: u32,
    ) -> ClientResult<SubmitResponse> {
        let retries = max_retries.min(MAX_SUBMIT_RETRIES);
        let mut attempt = 0;
        loop {
            match client.submit(tx).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < retries && e.is_retryable() => {
                    attempt += 1;
                    tracing::warn!(
                        "Submit of {} to {} failed (attempt {}): {}",
                        tx.tx_id,
                        client.node_id(),
                        attempt,
                        e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn entry_points(&self, injection: Injection) -> Vec<Arc<dyn ValidatorClient>> {
        match injection {
            Injection::All => self.clients.clone(),
            Injection::Entry => {
                let mut rng = self.rng.lock();
                self.clients
                    .choose(&mut *rng)
                    .cloned()
                    .into_iter()
                    .collect()
            }
        }
    }

    /// Run one experiment end to end
    pub async fn run(&self, config: &ExperimentConfig) -> ExperimentReport {
        let started = Instant::now();
        let mut submitted: Vec<(Transaction, Vec<String>, SubmitResponse)> = Vec::new();
        let mut failed = 0;

        for i in 0..config.transactions {
            let tx = self.generate_transaction(i, config);
            let entries = self.entry_points(config.injection);

            let results = join_all(
                entries
                    .iter()
                    .map(|client| Self::submit_with_retry(&**client, &tx, config.max_retries)),
            )
            .await;

            let mut entry_ids = Vec::new();
            let mut first_response = None;
            for (client, result) in entries.iter().zip(results) {
                match result {
                    Ok(response) => {
                        entry_ids.push(client.node_id().to_string());
                        first_response.get_or_insert(response);
                    }
                    Err(e) => {
                        tracing::error!("Failed to send {} to {}: {}", tx.tx_id, client.node_id(), e)
                    }
                }
            }
            match first_response {
                Some(response) => {
                    tracing::debug!(
                        "{} -> {:?}: confidence {:.3}",
                        tx.tx_id,
                        entry_ids,
                        response.confidence
                    );
                    submitted.push((tx, entry_ids, response));
                }
                None => failed += 1,
            }

            if (i + 1) % 10 == 0 {
                tracing::info!("Submitted {}/{} transactions", i + 1, config.transactions);
            }
            if !config.pacing.is_zero() {
                tokio::time::sleep(config.pacing).await;
            }
        }
        let submit_secs = started.elapsed().as_secs_f64();

        tokio::time::sleep(config.settle).await;

        let mut transactions = Vec::with_capacity(submitted.len());
        for (tx, entry_ids, response) in submitted {
            transactions.push(self.poll_outcome(tx, entry_ids, response).await);
        }

        let mut distribution = TierCounts::default();
        for outcome in &transactions {
            distribution.record(outcome.finality_tier);
        }
        let successful = transactions.len();
        let average_confidence = if successful > 0 {
            transactions.iter().map(|t| t.average_confidence).sum::<f64>() / successful as f64
        } else {
            0.0
        };
        let finalized = distribution.finalized() as f64;
        let validator_metrics = self.collect_metrics().await;
        let byzantine_validators = validator_metrics
            .values()
            .filter(|m| m.validator_info.validator_type == ValidatorType::Byzantine)
            .count();

        let report = ExperimentReport {
            experiment_type: match config.injection {
                Injection::Entry => "distributed_consensus".to_string(),
                Injection::All => "multi_validator_consensus".to_string(),
            },
            num_validators: self.clients.len(),
            byzantine_validators,
            num_transactions: config.transactions,
            successful_submissions: successful,
            failed_submissions: failed,
            average_confidence,
            finality_distribution: distribution,
            total_finality_rate: finalized / config.transactions.max(1) as f64,
            consensus_efficiency: if successful > 0 {
                finalized / successful as f64
            } else {
                0.0
            },
            throughput_tps: if submit_secs > 0.0 {
                successful as f64 / submit_secs
            } else {
                0.0
            },
            total_time_secs: started.elapsed().as_secs_f64(),
            transactions,
            validator_metrics,
        };

        tracing::info!(
            "Experiment finished: {}/{} submitted, average confidence {:.4}, finality rate {:.2}",
            report.successful_submissions,
            report.num_transactions,
            report.average_confidence,
            report.total_finality_rate
        );
        report
    }

    async fn poll_outcome(
        &self,
        tx: Transaction,
        entry_ids: Vec<String>,
        response: SubmitResponse,
    ) -> TransactionOutcome {
        let statuses = join_all(self.clients.iter().map(|client| client.status(&tx.tx_id))).await;

        let mut confidences = Vec::new();
        let mut finalized = 0;
        let mut entry_tier = None;
        for (client, status) in self.clients.iter().zip(statuses) {
            match status {
                Ok(Some(status)) => {
                    confidences.push(status.confidence);
                    if status.finality_tier.is_final() {
                        finalized += 1;
                    }
                    if entry_ids.first().map(String::as_str) == Some(client.node_id()) {
                        entry_tier = Some(status.finality_tier);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    "Status of {} from {} failed: {}",
                    tx.tx_id,
                    client.node_id(),
                    e
                ),
            }
        }

        let average_confidence = if confidences.is_empty() {
            response.confidence
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        TransactionOutcome {
            tx_id: tx.tx_id,
            risk_score: tx.risk_score,
            entry_validators: entry_ids,
            submit_confidence: response.confidence,
            average_confidence,
            finality_tier: entry_tier.unwrap_or(response.finality_tier),
            validators_reporting: confidences.len(),
            validators_finalized: finalized,
        }
    }

    /// Detailed metrics of every reachable validator
    pub async fn collect_metrics(&self) -> BTreeMap<String, NodeMetrics> {
        let responses = join_all(self.clients.iter().map(|client| client.metrics())).await;
        let mut metrics = BTreeMap::new();
        for (client, response) in self.clients.iter().zip(responses) {
            match response {
                Ok(m) => {
                    metrics.insert(client.node_id().to_string(), m);
                }
                Err(e) => tracing::error!("Failed to get metrics from {}: {}", client.node_id(), e),
            }
        }
        metrics
    }

    /// Process one transaction on growing subsets of the validators
    pub async fn scalability(&self, sizes: &[usize]) -> ScalabilityReport {
        let mut points = Vec::new();
        for &size in sizes.iter().filter(|&&s| s > 0 && s <= self.clients.len()) {
            let tx = Transaction::new(
                format!("scalability_test_{}_{}", size, (unix_now() * 1e6) as u64),
                "test_addr_1",
                "test_addr_2",
                1000.0,
            )
            .with_risk_score(0.3);
            let started = Instant::now();
            let results =
                join_all(self.clients[..size].iter().map(|client| client.submit(&tx))).await;
            let processing_time = started.elapsed().as_secs_f64();
            let successful = results.iter().filter(|r| r.is_ok()).count();

            points.push(ScalabilityPoint {
                validator_count: size,
                processing_time,
                successful_validations: successful,
                throughput_per_validator: if processing_time > 0.0 {
                    successful as f64 / processing_time
                } else {
                    0.0
                },
            });
        }

        let counts: Vec<f64> = points.iter().map(|p| p.validator_count as f64).collect();
        let throughputs: Vec<f64> = points.iter().map(|p| p.throughput_per_validator).collect();
        let scaling_efficiency = match (throughputs.first(), throughputs.last()) {
            (Some(first), Some(last)) if *first > 0.0 => last / first,
            _ => 0.0,
        };

        ScalabilityReport {
            linear_correlation: pearson(&counts, &throughputs),
            scaling_efficiency,
            points,
        }
    }
}

/// Pearson correlation coefficient; 0.0 when undefined
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        0.0
    } else {
        cov / (var_x.sqrt() * var_y.sqrt())
    }
}
