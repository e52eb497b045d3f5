//! Validator node configuration

use crate::confidence::{ConfidenceModel, CONFIDENCE_CAP};
use crate::error::{ConsensusError, Result};
use crate::types::{FinalityTier, ValidatorIdentity, ValidatorType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Confidence thresholds for each finality tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalityThresholds {
    pub provisional: f64,
    pub economic: f64,
    pub absolute: f64,
}

impl Default for FinalityThresholds {
    fn default() -> Self {
        Self {
            provisional: 0.80,
            economic: 0.95,
            absolute: 0.99,
        }
    }
}

impl FinalityThresholds {
    /// Highest tier whose threshold is met
    pub fn tier_for(&self, confidence: f64) -> FinalityTier {
        if confidence >= self.absolute {
            FinalityTier::Absolute
        } else if confidence >= self.economic {
            FinalityTier::Economic
        } else if confidence >= self.provisional {
            FinalityTier::Provisional
        } else {
            FinalityTier::None
        }
    }

    pub fn threshold(&self, tier: FinalityTier) -> f64 {
        match tier {
            FinalityTier::None => 0.0,
            FinalityTier::Provisional => self.provisional,
            FinalityTier::Economic => self.economic,
            FinalityTier::Absolute => self.absolute,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.provisional
            && self.provisional < self.economic
            && self.economic < self.absolute)
        {
            return Err(ConsensusError::Configuration(format!(
                "thresholds must satisfy 0 < provisional < economic < absolute, got {} / {} / {}",
                self.provisional, self.economic, self.absolute
            )));
        }
        // Unreachable tier otherwise
        if self.absolute > CONFIDENCE_CAP {
            return Err(ConsensusError::Configuration(format!(
                "absolute threshold {} exceeds confidence cap {}",
                self.absolute, CONFIDENCE_CAP
            )));
        }
        Ok(())
    }
}

/// How repeated votes from the same validator on one transaction are folded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotePolicy {
    /// Every received vote counts
    #[default]
    Accumulate,
    /// A validator's newer vote replaces its older one
    LatestPerValidator,
}

impl std::str::FromStr for VotePolicy {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "accumulate" => Ok(Self::Accumulate),
            "latest_per_validator" | "latest" => Ok(Self::LatestPerValidator),
            other => Err(ConsensusError::Configuration(format!(
                "unknown vote policy '{}'",
                other
            ))),
        }
    }
}

/// Full configuration of one validator node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    pub validator_type: ValidatorType,
    pub reputation: f64,
    pub stake_weight: f64,
    pub quorum_participation: f64,
    pub lambda_base: f64,
    pub time_scaling_factor: f64,
    pub thresholds: FinalityThresholds,
    /// Probability a Byzantine validator votes "valid"
    pub byzantine_intensity: f64,
    /// Honest validators treat `risk_score` below this as valid
    pub validity_threshold: f64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub vote_policy: VotePolicy,
    pub peer_timeout_ms: u64,
    pub broadcast_concurrency: usize,
    pub orphan_ttl_secs: u64,
    /// Maximum buffered orphan votes per transaction
    pub orphan_capacity: usize,
    pub rng_seed: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: format!("validator_{:04}", rand::random::<u16>() % 10_000),
            validator_type: ValidatorType::Honest,
            reputation: 0.9,
            stake_weight: 2.0,
            quorum_participation: 0.85,
            lambda_base: 8.0,
            time_scaling_factor: 10.0,
            thresholds: FinalityThresholds::default(),
            byzantine_intensity: 0.3,
            validity_threshold: 0.65,
            min_delay_ms: 10,
            max_delay_ms: 30,
            vote_policy: VotePolicy::Accumulate,
            peer_timeout_ms: 3_000,
            broadcast_concurrency: 32,
            orphan_ttl_secs: 30,
            orphan_capacity: 256,
            rng_seed: None,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: impl Into<String>, validator_type: ValidatorType) -> Self {
        Self {
            node_id: node_id.into(),
            validator_type,
            ..Self::default()
        }
    }

    /// Check every field once at startup
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(ConsensusError::Configuration(
                "node_id must not be empty".to_string(),
            ));
        }
        let unit_fields = [
            ("reputation", self.reputation),
            ("quorum_participation", self.quorum_participation),
            ("byzantine_intensity", self.byzantine_intensity),
            ("validity_threshold", self.validity_threshold),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConsensusError::Configuration(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !self.stake_weight.is_finite() || self.stake_weight < 0.0 {
            return Err(ConsensusError::Configuration(format!(
                "stake_weight must be non-negative, got {}",
                self.stake_weight
            )));
        }
        if !self.lambda_base.is_finite() || self.lambda_base <= 0.0 {
            return Err(ConsensusError::Configuration(format!(
                "lambda_base must be positive, got {}",
                self.lambda_base
            )));
        }
        if !self.time_scaling_factor.is_finite() || self.time_scaling_factor <= 0.0 {
            return Err(ConsensusError::Configuration(format!(
                "time_scaling_factor must be positive, got {}",
                self.time_scaling_factor
            )));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConsensusError::Configuration(format!(
                "processing delay range inverted: {}ms > {}ms",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if self.peer_timeout_ms == 0 {
            return Err(ConsensusError::Configuration(
                "peer_timeout_ms must be positive".to_string(),
            ));
        }
        if self.broadcast_concurrency == 0 {
            return Err(ConsensusError::Configuration(
                "broadcast_concurrency must be positive".to_string(),
            ));
        }
        if self.orphan_capacity == 0 {
            return Err(ConsensusError::Configuration(
                "orphan_capacity must be positive".to_string(),
            ));
        }
        self.thresholds.validate()
    }

    pub fn identity(&self) -> ValidatorIdentity {
        ValidatorIdentity {
            node_id: self.node_id.clone(),
            validator_type: self.validator_type,
            reputation: self.reputation,
            stake_weight: self.stake_weight,
            quorum_participation: self.quorum_participation,
            lambda_base: self.lambda_base,
            min_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }

    pub fn model(&self) -> ConfidenceModel {
        ConfidenceModel::new(self.lambda_base, self.time_scaling_factor, self.thresholds)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn orphan_ttl(&self) -> Duration {
        Duration::from_secs(self.orphan_ttl_secs)
    }

    /// Zero-delay settings for tests and in-process simulations
    pub fn without_delay(mut self) -> Self {
        self.min_delay_ms = 0;
        self.max_delay_ms = 0;
        self
    }
}
