//! Validator - votes on transactions and tracks per-transaction confidence

use crate::confidence::ConfidenceModel;
use crate::config::{NodeConfig, VotePolicy};
use crate::error::Result;
use crate::rolling_hash::RollingHash;
use crate::strategy::{strategy_for, VotingStrategy};
use crate::types::{
    unix_now, FinalityTier, QuorumSignal, TierCounts, Transaction, ValidatorIdentity, Vote,
    VoteRecord,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything one node knows about one transaction
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub tx: Transaction,
    pub votes: Vec<Vote>,
    /// Latest signal strength per validator
    pub signals: BTreeMap<String, f64>,
    /// Highest confidence reported so far
    pub reported: f64,
}

impl TxRecord {
    fn new(tx: Transaction) -> Self {
        Self {
            tx,
            votes: Vec::new(),
            signals: BTreeMap::new(),
            reported: 0.0,
        }
    }

    fn add_vote(&mut self, vote: Vote, policy: VotePolicy) {
        match policy {
            VotePolicy::Accumulate => self.votes.push(vote),
            VotePolicy::LatestPerValidator => {
                match self
                    .votes
                    .iter_mut()
                    .find(|v| v.validator_id == vote.validator_id)
                {
                    Some(existing) if existing.timestamp <= vote.timestamp => *existing = vote,
                    Some(_) => {}
                    None => self.votes.push(vote),
                }
            }
        }
    }
}

/// Votes and signals that arrived before their transaction
#[derive(Debug)]
struct OrphanEntry {
    votes: Vec<Vote>,
    signals: BTreeMap<String, f64>,
    first_seen: Instant,
}

impl OrphanEntry {
    fn new() -> Self {
        Self {
            votes: Vec::new(),
            signals: BTreeMap::new(),
            first_seen: Instant::now(),
        }
    }

    fn is_empty(&self) -> bool {
        self.votes.is_empty() && self.signals.is_empty()
    }
}

/// Confidence view of one transaction after an update
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub tx_id: String,
    /// High-water mark of the computed confidence
    pub confidence: f64,
    pub finality_tier: FinalityTier,
    pub quorum_strength: f64,
    pub vote_count: usize,
}

/// Where an inbound vote or signal ended up
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Applied(Evaluation),
    /// Transaction unknown; held in the orphan buffer
    Buffered,
}

#[derive(Debug, Default)]
struct Sums {
    confidence: f64,
    processing_time: f64,
}

/// Snapshot of validator counters
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorStats {
    pub processed: u64,
    pub achievements: TierCounts,
    pub finality_distribution: TierCounts,
    pub average_confidence: f64,
    pub average_processing_time: f64,
    pub active_transactions: usize,
    pub orphaned_transactions: usize,
    pub votes_received: u64,
    pub signals_received: u64,
    pub orphan_votes_dropped: u64,
    pub rolling_hash: String,
    pub rolling_hash_sequence: u64,
}

/// Single validator: decides votes, owns per-transaction state
pub struct Validator {
    identity: ValidatorIdentity,
    config: NodeConfig,
    model: ConfidenceModel,
    strategy: Box<dyn VotingStrategy>,
    rng: Mutex<StdRng>,
    ledger: DashMap<String, Arc<Mutex<TxRecord>>>,
    orphans: DashMap<String, OrphanEntry>,
    rolling_hash: Mutex<RollingHash>,
    processed: AtomicU64,
    votes_received: AtomicU64,
    signals_received: AtomicU64,
    orphan_votes_dropped: AtomicU64,
    achievements: Mutex<TierCounts>,
    sums: Mutex<Sums>,
}

impl Validator {
    /// Create a validator using the default strategy for its type
    pub fn new(config: NodeConfig) -> Self {
        let strategy = strategy_for(
            config.validator_type,
            config.validity_threshold,
            config.byzantine_intensity,
        );
        Self::with_strategy(config, strategy)
    }

    pub fn with_strategy(config: NodeConfig, strategy: Box<dyn VotingStrategy>) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            identity: config.identity(),
            model: config.model(),
            rolling_hash: Mutex::new(RollingHash::genesis(&config.node_id)),
            config,
            strategy,
            rng: Mutex::new(rng),
            ledger: DashMap::new(),
            orphans: DashMap::new(),
            processed: AtomicU64::new(0),
            votes_received: AtomicU64::new(0),
            signals_received: AtomicU64::new(0),
            orphan_votes_dropped: AtomicU64::new(0),
            achievements: Mutex::new(TierCounts::default()),
            sums: Mutex::new(Sums::default()),
        }
    }

    pub fn identity(&self) -> &ValidatorIdentity {
        &self.identity
    }

    pub fn node_id(&self) -> &str {
        &self.identity.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn model(&self) -> &ConfidenceModel {
        &self.model
    }

    /// Decide this validator's vote on `tx`
    pub fn decide_vote(&self, tx: &Transaction) -> (bool, f64) {
        let mut rng = self.rng.lock();
        let decision = self.strategy.decide(&self.identity, tx, &mut *rng);
        (decision.vote, decision.confidence)
    }

    fn processing_delay(&self) -> Duration {
        let ms = self
            .rng
            .lock()
            .gen_range(self.identity.min_delay_ms..=self.identity.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Vote on a transaction and fold the vote into local state.
    ///
    /// `known_validators` counts every validator this node knows, itself
    /// included.
    pub async fn process_transaction(
        &self,
        tx: Transaction,
        known_validators: usize,
    ) -> Result<VoteRecord> {
        tx.validate()?;
        let started = Instant::now();

        let delay = self.processing_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (vote_value, self_confidence) = self.decide_vote(&tx);
        let now = unix_now();
        let vote = Vote {
            tx_id: tx.tx_id.clone(),
            validator_id: self.identity.node_id.clone(),
            vote: vote_value,
            confidence: self_confidence,
            reputation: self.identity.reputation,
            stake_weight: self.identity.stake_weight,
            timestamp: now,
            signature: Vote::sign(&tx.tx_id, vote_value, &self.identity.node_id, now),
        };

        let raw_strength = self.identity.quorum_participation * self_confidence;
        let strength = {
            let mut rng = self.rng.lock();
            self.strategy.degrade_signal(raw_strength, &mut *rng)
        }
        .clamp(0.0, 1.0);
        let signal = QuorumSignal {
            validator_id: self.identity.node_id.clone(),
            tx_id: tx.tx_id.clone(),
            signal_strength: strength,
            network_state_hash: self.rolling_hash.lock().current().to_string(),
            timestamp: now,
        };

        let tx_id = tx.tx_id.clone();
        let record = self.insert_record(tx);
        let orphans = self.take_orphans(&tx_id);
        let evaluation = {
            let mut guard = record.lock();
            guard.add_vote(vote.clone(), self.config.vote_policy);
            guard
                .signals
                .insert(signal.validator_id.clone(), signal.signal_strength);
            self.fold_orphans(&mut guard, orphans);
            self.evaluate(&mut guard, known_validators, unix_now())
        };

        let rolling_hash = self.update_rolling_hash(&tx_id, evaluation.confidence);
        let processing_time = started.elapsed().as_secs_f64();

        self.processed.fetch_add(1, Ordering::Relaxed);
        self.achievements.lock().record(evaluation.finality_tier);
        {
            let mut sums = self.sums.lock();
            sums.confidence += evaluation.confidence;
            sums.processing_time += processing_time;
        }

        tracing::debug!(
            "{} processed {}: vote {}, confidence {:.4}, tier {}",
            self.identity.node_id,
            tx_id,
            vote.vote,
            evaluation.confidence,
            evaluation.finality_tier
        );

        Ok(VoteRecord {
            vote,
            signal,
            confidence: evaluation.confidence,
            finality_tier: evaluation.finality_tier,
            processing_time,
            quorum_strength: evaluation.quorum_strength,
            rolling_hash,
        })
    }

    /// Fold a processed transaction into the rolling hash, returning its prefix
    pub fn update_rolling_hash(&self, tx_id: &str, confidence: f64) -> String {
        let mut hash = self.rolling_hash.lock();
        hash.update(tx_id, confidence, unix_now());
        hash.prefix()
    }

    /// Apply a peer's vote, or buffer it if the transaction is unknown
    pub fn record_vote(&self, vote: Vote, known_validators: usize) -> Delivery {
        self.votes_received.fetch_add(1, Ordering::Relaxed);
        if let Some(record) = self.record(&vote.tx_id) {
            let mut guard = record.lock();
            guard.add_vote(vote, self.config.vote_policy);
            return Delivery::Applied(self.evaluate(&mut guard, known_validators, unix_now()));
        }

        // Hold the orphan slot while re-checking the ledger so a concurrent
        // adoption either sees this vote or is seen by it.
        let tx_id = vote.tx_id.clone();
        let mut vote = Some(vote);
        {
            let mut entry = self
                .orphans
                .entry(tx_id.clone())
                .or_insert_with(OrphanEntry::new);
            if self.ledger.get(&tx_id).is_none() {
                if entry.votes.len() >= self.config.orphan_capacity {
                    self.orphan_votes_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "{} orphan buffer for {} is full, dropping vote",
                        self.identity.node_id,
                        tx_id
                    );
                } else if let Some(vote) = vote.take() {
                    entry.votes.push(vote);
                }
                return Delivery::Buffered;
            }
        }
        self.orphans.remove_if(&tx_id, |_, entry| entry.is_empty());

        match (self.record(&tx_id), vote) {
            (Some(record), Some(vote)) => {
                let mut guard = record.lock();
                guard.add_vote(vote, self.config.vote_policy);
                Delivery::Applied(self.evaluate(&mut guard, known_validators, unix_now()))
            }
            _ => Delivery::Buffered,
        }
    }

    /// Apply a peer's quorum signal, or queue it if the transaction is unknown
    pub fn record_signal(&self, signal: QuorumSignal, known_validators: usize) -> Delivery {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
        if let Some(record) = self.record(&signal.tx_id) {
            let mut guard = record.lock();
            guard
                .signals
                .insert(signal.validator_id, signal.signal_strength);
            return Delivery::Applied(self.evaluate(&mut guard, known_validators, unix_now()));
        }

        let tx_id = signal.tx_id.clone();
        {
            let mut entry = self
                .orphans
                .entry(tx_id.clone())
                .or_insert_with(OrphanEntry::new);
            if self.ledger.get(&tx_id).is_none() {
                entry
                    .signals
                    .insert(signal.validator_id, signal.signal_strength);
                return Delivery::Buffered;
            }
        }
        self.orphans.remove_if(&tx_id, |_, entry| entry.is_empty());

        match self.record(&tx_id) {
            Some(record) => {
                let mut guard = record.lock();
                guard
                    .signals
                    .insert(signal.validator_id, signal.signal_strength);
                Delivery::Applied(self.evaluate(&mut guard, known_validators, unix_now()))
            }
            None => Delivery::Buffered,
        }
    }

    /// Adopt a transaction body pulled from a peer and fold in any buffered
    /// votes and signals. Idempotent: a known transaction keeps its body.
    pub fn adopt_transaction(&self, tx: Transaction, known_validators: usize) -> Result<Evaluation> {
        tx.validate()?;
        let tx_id = tx.tx_id.clone();
        let record = self.insert_record(tx);
        let orphans = self.take_orphans(&tx_id);

        let mut guard = record.lock();
        self.fold_orphans(&mut guard, orphans);
        Ok(self.evaluate(&mut guard, known_validators, unix_now()))
    }

    /// Recompute confidence of a known transaction at the current time
    pub fn status(&self, tx_id: &str, known_validators: usize) -> Option<Evaluation> {
        let record = self.record(tx_id)?;
        let mut guard = record.lock();
        Some(self.evaluate(&mut guard, known_validators, unix_now()))
    }

    pub fn transaction(&self, tx_id: &str) -> Option<Transaction> {
        self.record(tx_id).map(|record| record.lock().tx.clone())
    }

    pub fn knows(&self, tx_id: &str) -> bool {
        self.ledger.contains_key(tx_id)
    }

    /// Number of votes buffered for an unknown transaction
    pub fn orphan_votes(&self, tx_id: &str) -> usize {
        self.orphans.get(tx_id).map(|e| e.votes.len()).unwrap_or(0)
    }

    /// Drop orphan buffers older than `ttl`, returning the number of votes lost
    pub fn purge_expired_orphans(&self, ttl: Duration) -> usize {
        let mut dropped = 0;
        self.orphans.retain(|tx_id, entry| {
            let keep = entry.first_seen.elapsed() < ttl;
            if !keep {
                tracing::debug!(
                    "{} expiring {} orphaned votes for {}",
                    self.identity.node_id,
                    entry.votes.len(),
                    tx_id
                );
                dropped += entry.votes.len();
            }
            keep
        });
        self.orphan_votes_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn rolling_hash_prefix(&self) -> String {
        self.rolling_hash.lock().prefix()
    }

    pub fn stats(&self) -> ValidatorStats {
        let processed = self.processed_count();
        let sums = {
            let sums = self.sums.lock();
            (sums.confidence, sums.processing_time)
        };
        let average = |sum: f64| if processed > 0 { sum / processed as f64 } else { 0.0 };

        let mut distribution = TierCounts::default();
        let records: Vec<Arc<Mutex<TxRecord>>> =
            self.ledger.iter().map(|r| r.value().clone()).collect();
        for record in records {
            let reported = record.lock().reported;
            distribution.record(self.model.thresholds.tier_for(reported));
        }

        let (rolling_hash, rolling_hash_sequence) = {
            let hash = self.rolling_hash.lock();
            (hash.prefix(), hash.sequence())
        };

        ValidatorStats {
            processed,
            achievements: *self.achievements.lock(),
            finality_distribution: distribution,
            average_confidence: average(sums.0),
            average_processing_time: average(sums.1),
            active_transactions: self.ledger.len(),
            orphaned_transactions: self.orphans.len(),
            votes_received: self.votes_received.load(Ordering::Relaxed),
            signals_received: self.signals_received.load(Ordering::Relaxed),
            orphan_votes_dropped: self.orphan_votes_dropped.load(Ordering::Relaxed),
            rolling_hash,
            rolling_hash_sequence,
        }
    }

    // ============ Internals ============

    fn record(&self, tx_id: &str) -> Option<Arc<Mutex<TxRecord>>> {
        self.ledger.get(tx_id).map(|r| r.value().clone())
    }

    fn insert_record(&self, tx: Transaction) -> Arc<Mutex<TxRecord>> {
        self.ledger
            .entry(tx.tx_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(TxRecord::new(tx))))
            .value()
            .clone()
    }

    fn take_orphans(&self, tx_id: &str) -> Option<OrphanEntry> {
        self.orphans.remove(tx_id).map(|(_, entry)| entry)
    }

    fn fold_orphans(&self, record: &mut TxRecord, orphans: Option<OrphanEntry>) {
        let Some(orphans) = orphans else {
            return;
        };
        if !orphans.votes.is_empty() {
            tracing::debug!(
                "{} folding {} buffered votes into {}",
                self.identity.node_id,
                orphans.votes.len(),
                record.tx.tx_id
            );
        }
        for vote in orphans.votes {
            record.add_vote(vote, self.config.vote_policy);
        }
        // Signals observed directly take precedence over queued ones
        for (validator_id, strength) in orphans.signals {
            record.signals.entry(validator_id).or_insert(strength);
        }
    }

    fn evaluate(&self, record: &mut TxRecord, known_validators: usize, now: f64) -> Evaluation {
        let computed = self.model.compute(
            &record.tx,
            &record.votes,
            &record.signals,
            known_validators,
            now,
        );
        record.reported = record.reported.max(computed.score);
        Evaluation {
            tx_id: record.tx.tx_id.clone(),
            confidence: record.reported,
            finality_tier: self.model.thresholds.tier_for(record.reported),
            quorum_strength: computed.quorum_strength,
            vote_count: record.votes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidatorType;

    fn config(node_id: &str, validator_type: ValidatorType) -> NodeConfig {
        let mut config = NodeConfig::new(node_id, validator_type).without_delay();
        config.rng_seed = Some(42);
        config
    }

    fn peer_vote(tx_id: &str, validator: &str, valid: bool, timestamp: f64) -> Vote {
        Vote {
            tx_id: tx_id.to_string(),
            validator_id: validator.to_string(),
            vote: valid,
            confidence: 0.85,
            reputation: 0.9,
            stake_weight: 2.0,
            timestamp,
            signature: Vote::sign(tx_id, valid, validator, timestamp),
        }
    }

    fn signal(tx_id: &str, validator: &str, strength: f64) -> QuorumSignal {
        QuorumSignal {
            validator_id: validator.to_string(),
            tx_id: tx_id.to_string(),
            signal_strength: strength,
            network_state_hash: String::new(),
            timestamp: unix_now(),
        }
    }

    #[tokio::test]
    async fn test_process_transaction() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        let tx = Transaction::new("tx_1", "a", "b", 10.0).with_risk_score(0.1);

        let record = validator.process_transaction(tx, 1).await.unwrap();
        assert_eq!(record.vote.tx_id, "tx_1");
        assert_eq!(record.vote.validator_id, "validator_0");
        assert_eq!(record.signal.network_state_hash.len(), 64);
        assert!(record.confidence >= 0.0 && record.confidence < 1.0);
        assert_eq!(record.rolling_hash.len(), 16);
        assert_eq!(validator.processed_count(), 1);
        assert!(validator.knows("tx_1"));
    }

    #[tokio::test]
    async fn test_malformed_transaction_rejected() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        let tx = Transaction::new("tx_1", "a", "b", 10.0).with_risk_score(3.0);

        assert!(validator.process_transaction(tx, 1).await.is_err());
        assert_eq!(validator.processed_count(), 0);
        assert!(!validator.knows("tx_1"));
    }

    #[tokio::test]
    async fn test_rolling_hash_advances() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        let before = validator.rolling_hash_prefix();
        validator
            .process_transaction(Transaction::new("tx_1", "a", "b", 1.0), 1)
            .await
            .unwrap();
        assert_ne!(before, validator.rolling_hash_prefix());
        assert_eq!(validator.stats().rolling_hash_sequence, 1);
    }

    #[test]
    fn test_orphan_vote_buffered_then_adopted() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        let tx = Transaction::new("tx_1", "a", "b", 1.0).with_timestamp(unix_now() - 2.0);

        let delivery = validator.record_vote(peer_vote("tx_1", "validator_1", true, unix_now()), 3);
        assert_eq!(delivery, Delivery::Buffered);
        assert_eq!(validator.orphan_votes("tx_1"), 1);
        assert!(validator.record_signal(signal("tx_1", "validator_1", 0.8), 3) == Delivery::Buffered);

        let evaluation = validator.adopt_transaction(tx, 3).unwrap();
        assert_eq!(evaluation.vote_count, 1);
        assert!(evaluation.confidence > 0.0);
        assert!((evaluation.quorum_strength - 0.8).abs() < 1e-12);
        assert_eq!(validator.orphan_votes("tx_1"), 0);
        assert_eq!(validator.stats().orphaned_transactions, 0);
    }

    #[test]
    fn test_adopt_is_idempotent() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        let tx = Transaction::new("tx_1", "a", "b", 1.0);
        validator.adopt_transaction(tx.clone(), 1).unwrap();

        let mut altered = tx;
        altered.value = 99.0;
        validator.adopt_transaction(altered, 1).unwrap();
        assert_eq!(validator.transaction("tx_1").unwrap().value, 1.0);
    }

    #[test]
    fn test_high_water_mark_never_regresses() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        let tx = Transaction::new("tx_1", "a", "b", 1.0).with_timestamp(unix_now() - 5.0);
        validator.adopt_transaction(tx, 4).unwrap();

        let now = unix_now();
        let first = match validator.record_vote(peer_vote("tx_1", "v1", true, now), 4) {
            Delivery::Applied(evaluation) => evaluation,
            Delivery::Buffered => panic!("tx is known"),
        };
        // A heavy negative vote lowers the raw score
        let mut negative = peer_vote("tx_1", "v2", false, now);
        negative.stake_weight = 50.0;
        let second = match validator.record_vote(negative, 4) {
            Delivery::Applied(evaluation) => evaluation,
            Delivery::Buffered => panic!("tx is known"),
        };
        assert!(second.confidence >= first.confidence);
        assert!(second.finality_tier >= first.finality_tier);
    }

    #[test]
    fn test_latest_per_validator_policy() {
        let mut cfg = config("validator_0", ValidatorType::Honest);
        cfg.vote_policy = VotePolicy::LatestPerValidator;
        let validator = Validator::new(cfg);
        validator
            .adopt_transaction(Transaction::new("tx_1", "a", "b", 1.0), 2)
            .unwrap();

        validator.record_vote(peer_vote("tx_1", "v1", true, 10.0), 2);
        validator.record_vote(peer_vote("tx_1", "v1", false, 11.0), 2);
        // Stale redelivery is ignored
        validator.record_vote(peer_vote("tx_1", "v1", true, 9.0), 2);

        let status = validator.status("tx_1", 2).unwrap();
        assert_eq!(status.vote_count, 1);
    }

    #[test]
    fn test_accumulate_policy_counts_every_vote() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        validator
            .adopt_transaction(Transaction::new("tx_1", "a", "b", 1.0), 2)
            .unwrap();
        validator.record_vote(peer_vote("tx_1", "v1", true, 10.0), 2);
        validator.record_vote(peer_vote("tx_1", "v1", true, 11.0), 2);
        assert_eq!(validator.status("tx_1", 2).unwrap().vote_count, 2);
    }

    #[test]
    fn test_orphan_capacity_and_ttl() {
        let mut cfg = config("validator_0", ValidatorType::Honest);
        cfg.orphan_capacity = 2;
        let validator = Validator::new(cfg);

        for i in 0..4 {
            validator.record_vote(peer_vote("tx_9", &format!("v{}", i), true, 1.0), 5);
        }
        assert_eq!(validator.orphan_votes("tx_9"), 2);
        assert_eq!(validator.stats().orphan_votes_dropped, 2);

        assert_eq!(validator.purge_expired_orphans(Duration::from_secs(60)), 0);
        assert_eq!(validator.purge_expired_orphans(Duration::ZERO), 2);
        assert_eq!(validator.orphan_votes("tx_9"), 0);
        assert_eq!(validator.stats().orphan_votes_dropped, 4);
    }

    #[test]
    fn test_status_unknown_is_none() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        assert!(validator.status("missing", 1).is_none());
        assert!(validator.transaction("missing").is_none());
    }

    #[tokio::test]
    async fn test_stats_track_processing() {
        let validator = Validator::new(config("validator_0", ValidatorType::Honest));
        for i in 0..5 {
            let tx = Transaction::new(format!("tx_{}", i), "a", "b", 1.0);
            validator.process_transaction(tx, 1).await.unwrap();
        }
        let stats = validator.stats();
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.achievements.total(), 5);
        assert_eq!(stats.finality_distribution.total(), 5);
        assert_eq!(stats.active_transactions, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orphans_and_adoption_lose_no_votes() {
        const TASKS: usize = 8;
        const VOTES_PER_TASK: usize = 25;

        let validator = Arc::new(Validator::new(config("validator_0", ValidatorType::Honest)));
        let tx = Transaction::new("tx_race", "a", "b", 1.0).with_risk_score(0.1);

        let mut handles = Vec::new();
        for task in 0..TASKS {
            let validator = validator.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..VOTES_PER_TASK {
                    let voter = format!("peer_{}_{}", task, i);
                    validator.record_vote(peer_vote("tx_race", &voter, true, unix_now()), 10);
                    tokio::task::yield_now().await;
                }
            }));
        }
        let adopter = {
            let validator = validator.clone();
            let tx = tx.clone();
            tokio::spawn(async move { validator.adopt_transaction(tx, 10).map(|_| ()) })
        };
        let processor = {
            let validator = validator.clone();
            tokio::spawn(async move { validator.process_transaction(tx, 10).await.map(|_| ()) })
        };

        for handle in handles {
            handle.await.unwrap();
        }
        adopter.await.unwrap().unwrap();
        processor.await.unwrap().unwrap();

        let status = validator.status("tx_race", 10).unwrap();
        assert_eq!(status.vote_count, TASKS * VOTES_PER_TASK + 1);
        assert_eq!(validator.orphan_votes("tx_race"), 0);
        assert_eq!(validator.stats().orphan_votes_dropped, 0);
    }
}
