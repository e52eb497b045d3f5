//! Confidence model
//!
//! Folds a transaction's votes and quorum signals into a confidence score:
//!
//! ```text
//! time_weight = ln(1 + max(now - tx.timestamp, ε) · time_scaling)
//! V           = Σ(stake · vote · reputation · time_weight · quorum_weight) / Σ stake · |votes|
//! λ           = λ_base · (1 + 0.3 · participation) · (1 + 0.2 · quorum_strength)
//! C           = min(1 - exp(-λ · V), 0.999)
//! ```
//!
//! The model is pure: same inputs, same output.

use crate::config::FinalityThresholds;
use crate::types::{FinalityTier, Transaction, Vote};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence never reaches certainty
pub const CONFIDENCE_CAP: f64 = 0.999;

/// Floor for elapsed time, seconds
pub const MIN_ELAPSED_SECS: f64 = 0.001;

/// Quorum weight of a voter that has not signalled, and the
/// quorum strength used for λ when no signals exist
pub const DEFAULT_QUORUM_WEIGHT: f64 = 0.5;

const PARTICIPATION_GAIN: f64 = 0.3;
const QUORUM_GAIN: f64 = 0.2;

/// Result of one confidence evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub score: f64,
    pub tier: FinalityTier,
    /// Aggregated validation weight V
    pub validation_weight: f64,
    /// Effective decay rate λ
    pub lambda: f64,
    /// Mean signal strength, 0.0 when no signals were seen
    pub quorum_strength: f64,
}

impl Confidence {
    pub fn zero() -> Self {
        Self {
            score: 0.0,
            tier: FinalityTier::None,
            validation_weight: 0.0,
            lambda: 0.0,
            quorum_strength: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceModel {
    pub lambda_base: f64,
    pub time_scaling_factor: f64,
    pub thresholds: FinalityThresholds,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self::new(8.0, 10.0, FinalityThresholds::default())
    }
}

impl ConfidenceModel {
    pub fn new(lambda_base: f64, time_scaling_factor: f64, thresholds: FinalityThresholds) -> Self {
        Self {
            lambda_base,
            time_scaling_factor,
            thresholds,
        }
    }

    /// Logarithmic time weight since the transaction's own timestamp
    pub fn time_weight(&self, tx: &Transaction, now: f64) -> f64 {
        let elapsed = (now - tx.timestamp).max(MIN_ELAPSED_SECS);
        (1.0 + elapsed * self.time_scaling_factor).ln()
    }

    /// Compute confidence for `tx`.
    ///
    /// `signals` maps validator id to its latest signal strength for this
    /// transaction. `known_validators` counts every validator the evaluating
    /// node knows, itself included.
    pub fn compute(
        &self,
        tx: &Transaction,
        votes: &[Vote],
        signals: &BTreeMap<String, f64>,
        known_validators: usize,
        now: f64,
    ) -> Confidence {
        let quorum_strength = mean_signal(signals).unwrap_or(0.0);
        if votes.is_empty() {
            return Confidence {
                quorum_strength,
                ..Confidence::zero()
            };
        }

        let time_weight = self.time_weight(tx, now);
        let mut total_stake = 0.0;
        let mut weighted = 0.0;
        for vote in votes {
            total_stake += vote.stake_weight;
            if !vote.vote {
                continue;
            }
            let quorum_weight = signals
                .get(&vote.validator_id)
                .copied()
                .unwrap_or(DEFAULT_QUORUM_WEIGHT);
            weighted += vote.stake_weight * vote.reputation * time_weight * quorum_weight;
        }

        let validation_weight = if total_stake > 0.0 {
            weighted / total_stake * votes.len() as f64
        } else {
            0.0
        };

        let participation = votes.len() as f64 / known_validators.max(1) as f64;
        let lambda_quorum = mean_signal(signals).unwrap_or(DEFAULT_QUORUM_WEIGHT);
        let lambda = self.lambda_base
            * (1.0 + PARTICIPATION_GAIN * participation)
            * (1.0 + QUORUM_GAIN * lambda_quorum);

        let score = (1.0 - (-lambda * validation_weight).exp()).clamp(0.0, CONFIDENCE_CAP);

        Confidence {
            score,
            tier: self.thresholds.tier_for(score),
            validation_weight,
            lambda,
            quorum_strength,
        }
    }
}

/// Mean of all signal strengths, `None` when there are none
pub fn mean_signal(signals: &BTreeMap<String, f64>) -> Option<f64> {
    if signals.is_empty() {
        None
    } else {
        Some(signals.values().sum::<f64>() / signals.len() as f64)
    }
}
