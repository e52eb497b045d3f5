//! Voting strategies
//!
//! Honest validators vote on the transaction's risk score; Byzantine
//! validators ignore the content and vote randomly.

use crate::types::{Transaction, ValidatorIdentity, ValidatorType};
use rand::{Rng, RngCore};

/// A vote together with the voter's self-reported confidence in it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteDecision {
    pub vote: bool,
    pub confidence: f64,
}

/// Decides how a validator votes and how strongly it signals
pub trait VotingStrategy: Send + Sync {
    fn decide(
        &self,
        identity: &ValidatorIdentity,
        tx: &Transaction,
        rng: &mut dyn RngCore,
    ) -> VoteDecision;

    /// Adjust the raw signal strength before it leaves the node
    fn degrade_signal(&self, strength: f64, _rng: &mut dyn RngCore) -> f64 {
        strength
    }

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct HonestStrategy {
    /// Transactions with `risk_score` below this are considered valid
    pub validity_threshold: f64,
}

impl Default for HonestStrategy {
    fn default() -> Self {
        Self {
            validity_threshold: 0.65,
        }
    }
}

impl VotingStrategy for HonestStrategy {
    fn decide(
        &self,
        identity: &ValidatorIdentity,
        tx: &Transaction,
        rng: &mut dyn RngCore,
    ) -> VoteDecision {
        let base_validity = tx.risk_score < self.validity_threshold;
        let bias = if base_validity { 1.2 } else { 0.3 };
        let p = (identity.reputation * bias).clamp(0.0, 1.0);
        let vote = rng.gen_bool(p);
        let agreement = if vote == base_validity { 0.9 } else { 0.4 };

        VoteDecision {
            vote,
            confidence: identity.reputation * agreement,
        }
    }

    fn name(&self) -> &'static str {
        "honest"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ByzantineStrategy {
    /// Probability of voting "valid" regardless of content
    pub intensity: f64,
}

impl Default for ByzantineStrategy {
    fn default() -> Self {
        Self { intensity: 0.3 }
    }
}

impl VotingStrategy for ByzantineStrategy {
    fn decide(
        &self,
        _identity: &ValidatorIdentity,
        _tx: &Transaction,
        rng: &mut dyn RngCore,
    ) -> VoteDecision {
        VoteDecision {
            vote: rng.gen_bool(self.intensity.clamp(0.0, 1.0)),
            confidence: rng.gen_range(0.1..0.4),
        }
    }

    fn degrade_signal(&self, strength: f64, rng: &mut dyn RngCore) -> f64 {
        strength * rng.gen_range(0.1..0.6)
    }

    fn name(&self) -> &'static str {
        "byzantine"
    }
}

/// Default strategy for a validator type
pub fn strategy_for(
    validator_type: ValidatorType,
    validity_threshold: f64,
    byzantine_intensity: f64,
) -> Box<dyn VotingStrategy> {
    match validator_type {
        ValidatorType::Honest => Box::new(HonestStrategy { validity_threshold }),
        ValidatorType::Byzantine => Box::new(ByzantineStrategy {
            intensity: byzantine_intensity,
        }),
    }
}
