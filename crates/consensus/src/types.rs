//! Core types for votes, quorum signals and consensus reporting

use crate::error::{ConsensusError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Current wall-clock time as fractional unix seconds
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Complexity class of transactions built with `Transaction::new`
pub const DEFAULT_COMPLEXITY: u8 = 1;

/// Security level of transactions built with `Transaction::new`
pub const DEFAULT_SECURITY_LEVEL: u8 = 2;

fn default_stake() -> f64 {
    1.0
}

/// A transaction flowing through the validator network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction id
    pub tx_id: String,
    /// Sender address
    pub from_addr: String,
    /// Receiver address
    pub to_addr: String,
    /// Transferred value
    pub value: f64,
    /// Arrival timestamp (unix seconds); confidence grows with time since this instant
    pub timestamp: f64,
    /// Risk score in [0, 1]; honest validators reject risky transactions.
    /// Required on the wire.
    pub risk_score: f64,
    /// Complexity class (1-3), required on the wire
    pub complexity_class: u8,
    /// Security level (ordinal), required on the wire
    pub security_level: u8,
    #[serde(default)]
    pub nonce: u64,
}

impl Transaction {
    /// Create a transaction stamped with the current time
    pub fn new(
        tx_id: impl Into<String>,
        from_addr: impl Into<String>,
        to_addr: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            tx_id: tx_id.into(),
            from_addr: from_addr.into(),
            to_addr: to_addr.into(),
            value,
            timestamp: unix_now(),
            risk_score: 0.0,
            complexity_class: DEFAULT_COMPLEXITY,
            security_level: DEFAULT_SECURITY_LEVEL,
            nonce: 0,
        }
    }

    pub fn with_risk_score(mut self, risk_score: f64) -> Self {
        self.risk_score = risk_score;
        self
    }

    pub fn with_complexity(mut self, complexity_class: u8) -> Self {
        self.complexity_class = complexity_class;
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Reject malformed transactions instead of defaulting their fields
    pub fn validate(&self) -> Result<()> {
        if self.tx_id.trim().is_empty() {
            return Err(ConsensusError::validation("tx_id must not be empty"));
        }
        if self.from_addr.trim().is_empty() || self.to_addr.trim().is_empty() {
            return Err(ConsensusError::validation(format!(
                "transaction {} is missing sender or receiver",
                self.tx_id
            )));
        }
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(ConsensusError::validation(format!(
                "transaction {} has invalid value {}",
                self.tx_id, self.value
            )));
        }
        if !self.timestamp.is_finite() || self.timestamp <= 0.0 {
            return Err(ConsensusError::validation(format!(
                "transaction {} has invalid timestamp {}",
                self.tx_id, self.timestamp
            )));
        }
        if !(0.0..=1.0).contains(&self.risk_score) {
            return Err(ConsensusError::validation(format!(
                "transaction {} risk_score {} outside [0, 1]",
                self.tx_id, self.risk_score
            )));
        }
        if !(1..=3).contains(&self.complexity_class) {
            return Err(ConsensusError::validation(format!(
                "transaction {} complexity_class {} outside 1..=3",
                self.tx_id, self.complexity_class
            )));
        }
        Ok(())
    }
}

/// Validator behaviour class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorType {
    Honest,
    Byzantine,
}

impl ValidatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Honest => "honest",
            Self::Byzantine => "byzantine",
        }
    }
}

impl fmt::Display for ValidatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValidatorType {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "honest" => Ok(Self::Honest),
            "byzantine" => Ok(Self::Byzantine),
            other => Err(ConsensusError::Configuration(format!(
                "unknown validator type '{}'",
                other
            ))),
        }
    }
}

/// Finality tier derived from a confidence score.
///
/// Ordered: `None < Provisional < Economic < Absolute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalityTier {
    None,
    Provisional,
    Economic,
    Absolute,
}

impl FinalityTier {
    /// Whether any finality threshold has been met
    pub fn is_final(&self) -> bool {
        *self != FinalityTier::None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Provisional => "provisional",
            Self::Economic => "economic",
            Self::Absolute => "absolute",
        }
    }
}

impl Default for FinalityTier {
    fn default() -> Self {
        FinalityTier::None
    }
}

impl fmt::Display for FinalityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed identity of a validator for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorIdentity {
    pub node_id: String,
    pub validator_type: ValidatorType,
    pub reputation: f64,
    pub stake_weight: f64,
    pub quorum_participation: f64,
    pub lambda_base: f64,
    /// Simulated processing latency range, milliseconds
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// A validator's vote on one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub tx_id: String,
    pub validator_id: String,
    pub vote: bool,
    /// Self-reported confidence of the voter
    pub confidence: f64,
    /// Voter reputation at cast time
    pub reputation: f64,
    /// Voter stake at cast time
    #[serde(default = "default_stake")]
    pub stake_weight: f64,
    pub timestamp: f64,
    /// Opaque signature, never verified
    #[serde(default)]
    pub signature: String,
}

impl Vote {
    /// Opaque vote signature: truncated SHA-256 over the vote identity
    pub fn sign(tx_id: &str, vote: bool, validator_id: &str, timestamp: f64) -> String {
        let digest = Sha256::digest(format!("{}_{}_{}_{}", tx_id, vote, validator_id, timestamp));
        hex::encode(digest)[..16].to_string()
    }

    pub fn validate(&self) -> Result<()> {
        if self.tx_id.trim().is_empty() || self.validator_id.trim().is_empty() {
            return Err(ConsensusError::validation(
                "vote requires tx_id and validator_id",
            ));
        }
        for (name, value) in [("confidence", self.confidence), ("reputation", self.reputation)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConsensusError::validation(format!(
                    "vote {} outside [0, 1]: {}",
                    name, value
                )));
            }
        }
        if !self.stake_weight.is_finite() || self.stake_weight < 0.0 {
            return Err(ConsensusError::validation(format!(
                "vote stake_weight must be non-negative, got {}",
                self.stake_weight
            )));
        }
        Ok(())
    }
}

/// Lightweight participation signal sent alongside every vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuorumSignal {
    pub validator_id: String,
    pub tx_id: String,
    /// Participation x confidence, in [0, 1]
    pub signal_strength: f64,
    /// Sender's rolling hash when the signal was produced
    #[serde(default)]
    pub network_state_hash: String,
    pub timestamp: f64,
}

impl QuorumSignal {
    pub fn validate(&self) -> Result<()> {
        if self.tx_id.trim().is_empty() || self.validator_id.trim().is_empty() {
            return Err(ConsensusError::validation(
                "quorum signal requires tx_id and validator_id",
            ));
        }
        if !(0.0..=1.0).contains(&self.signal_strength) {
            return Err(ConsensusError::validation(format!(
                "signal_strength outside [0, 1]: {}",
                self.signal_strength
            )));
        }
        Ok(())
    }
}

/// Outcome of processing one transaction on one validator
#[derive(Debug, Clone, PartialEq)]
pub struct VoteRecord {
    pub vote: Vote,
    pub signal: QuorumSignal,
    pub confidence: f64,
    pub finality_tier: FinalityTier,
    /// Wall time spent processing, seconds
    pub processing_time: f64,
    pub quorum_strength: f64,
    /// Rolling hash after folding this transaction in
    pub rolling_hash: String,
}

/// Known peer endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerInfo {
    pub node_id: String,
    pub url: String,
}

impl PeerInfo {
    pub fn new(node_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            url: url.into(),
        }
    }
}

/// Parses `node_id=url`
impl std::str::FromStr for PeerInfo {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((id, url)) if !id.trim().is_empty() && !url.trim().is_empty() => {
                Ok(Self::new(id.trim(), url.trim()))
            }
            _ => Err(ConsensusError::validation(format!(
                "expected node_id=url, got '{}'",
                s
            ))),
        }
    }
}

// ============ Wire Types ============

/// Response to a transaction submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub tx_id: String,
    pub validator_id: String,
    pub vote: bool,
    pub confidence: f64,
    pub finality_tier: FinalityTier,
    pub processing_time: f64,
    pub quorum_strength: f64,
    pub rolling_hash: String,
    pub peer_count: usize,
}

/// Acknowledgement of a peer vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VoteAck {
    /// Vote folded into a known transaction
    Recorded {
        tx_id: String,
        new_confidence: f64,
        finality_tier: FinalityTier,
    },
    /// Transaction unknown locally; vote buffered and body fetch scheduled
    PendingFetch { tx_id: String },
}

/// Acknowledgement of a peer quorum signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignalAck {
    Updated {
        tx_id: String,
        updated_confidence: f64,
        finality_tier: FinalityTier,
    },
    /// Signal arrived before the transaction; kept until it shows up
    Queued { tx_id: String },
}

/// Consensus view of one transaction on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub tx_id: String,
    pub confidence: f64,
    pub finality_tier: FinalityTier,
    pub vote_count: usize,
    pub quorum_strength: f64,
    pub consensus_achieved: bool,
    pub rolling_hash: String,
    pub timestamp: f64,
}

/// Peer registration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPeerRequest {
    pub node_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPeerResponse {
    pub status: String,
    pub peer_id: String,
    /// False when the peer was already known and only its address was refreshed
    pub newly_added: bool,
}

/// Cheap liveness report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub node_id: String,
    pub validator_type: ValidatorType,
    pub processed_count: u64,
    pub uptime_seconds: f64,
    pub peer_count: usize,
    pub rolling_hash: String,
}

/// Per-tier counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub none: u64,
    pub provisional: u64,
    pub economic: u64,
    pub absolute: u64,
}

impl TierCounts {
    pub fn record(&mut self, tier: FinalityTier) {
        match tier {
            FinalityTier::None => self.none += 1,
            FinalityTier::Provisional => self.provisional += 1,
            FinalityTier::Economic => self.economic += 1,
            FinalityTier::Absolute => self.absolute += 1,
        }
    }

    /// Count of entries that reached any finality tier
    pub fn finalized(&self) -> u64 {
        self.provisional + self.economic + self.absolute
    }

    pub fn total(&self) -> u64 {
        self.none + self.finalized()
    }
}

/// Validator parameters as reported in metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub validator_type: ValidatorType,
    pub reputation: f64,
    pub stake_weight: f64,
    pub quorum_participation: f64,
    pub lambda_base: f64,
}

/// Consensus-side metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMetrics {
    pub processed_transactions: u64,
    pub active_transactions: usize,
    pub orphaned_transactions: usize,
    /// Tier reached when each locally submitted transaction was processed
    pub consensus_achievements: TierCounts,
    /// Current tier of every transaction this node knows about
    pub finality_distribution: TierCounts,
    pub total_finalized: u64,
    pub finality_rate: f64,
    pub average_confidence: f64,
    pub average_processing_time: f64,
    pub throughput_tps: f64,
    pub votes_received: u64,
    pub signals_received: u64,
    pub orphan_votes_dropped: u64,
}

/// Network-side metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub peer_count: usize,
    pub broadcasts: u64,
    pub deliveries_ok: u64,
    pub deliveries_failed: u64,
    pub fetches_ok: u64,
    pub fetches_failed: u64,
    pub rolling_hash: String,
    pub rolling_hash_sequence: u64,
    pub uptime_seconds: f64,
}

/// Full node metrics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub node_id: String,
    pub validator_info: ValidatorInfo,
    pub consensus_metrics: ConsensusMetrics,
    pub network_state: NetworkMetrics,
}

/// Error body returned by the HTTP surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}
