//! Validator Configuration
//!
//! Every option can be given as a flag or through its `SBCC_*` environment
//! variable.

use clap::{Args, ValueEnum};
use sbcc_consensus::{FinalityThresholds, NodeConfig, ValidatorType, VotePolicy};

/// Validator behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Behaviour {
    /// Votes on transaction content
    Honest,
    /// Votes randomly and signals weakly
    Byzantine,
}

impl From<Behaviour> for ValidatorType {
    fn from(b: Behaviour) -> Self {
        match b {
            Behaviour::Honest => ValidatorType::Honest,
            Behaviour::Byzantine => ValidatorType::Byzantine,
        }
    }
}

/// Duplicate vote handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Policy {
    /// Every received vote counts
    Accumulate,
    /// A validator's newer vote replaces its older one
    LatestPerValidator,
}

impl From<Policy> for VotePolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Accumulate => VotePolicy::Accumulate,
            Policy::LatestPerValidator => VotePolicy::LatestPerValidator,
        }
    }
}

/// Consensus parameters of this node
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Node id (random `validator_NNNN` when omitted)
    #[arg(long, env = "SBCC_NODE_ID")]
    pub node_id: Option<String>,

    #[arg(long, env = "SBCC_VALIDATOR_TYPE", value_enum, default_value = "honest")]
    pub validator_type: Behaviour,

    #[arg(long, env = "SBCC_REPUTATION", default_value_t = 0.9)]
    pub reputation: f64,

    #[arg(long, env = "SBCC_STAKE_WEIGHT", default_value_t = 2.0)]
    pub stake_weight: f64,

    #[arg(long, env = "SBCC_QUORUM_PARTICIPATION", default_value_t = 0.85)]
    pub quorum_participation: f64,

    #[arg(long, env = "SBCC_LAMBDA_BASE", default_value_t = 8.0)]
    pub lambda_base: f64,

    #[arg(long, env = "SBCC_TIME_SCALING", default_value_t = 10.0)]
    pub time_scaling: f64,

    #[arg(long, env = "SBCC_PROVISIONAL_THRESHOLD", default_value_t = 0.80)]
    pub provisional_threshold: f64,

    #[arg(long, env = "SBCC_ECONOMIC_THRESHOLD", default_value_t = 0.95)]
    pub economic_threshold: f64,

    #[arg(long, env = "SBCC_ABSOLUTE_THRESHOLD", default_value_t = 0.99)]
    pub absolute_threshold: f64,

    /// Probability a Byzantine node votes "valid"
    #[arg(long, env = "SBCC_BYZANTINE_INTENSITY", default_value_t = 0.3)]
    pub byzantine_intensity: f64,

    /// Honest nodes accept transactions with risk below this
    #[arg(long, env = "SBCC_VALIDITY_THRESHOLD", default_value_t = 0.65)]
    pub validity_threshold: f64,

    #[arg(long, env = "SBCC_DELAY_MIN_MS", default_value_t = 10)]
    pub delay_min_ms: u64,

    #[arg(long, env = "SBCC_DELAY_MAX_MS", default_value_t = 30)]
    pub delay_max_ms: u64,

    #[arg(long, env = "SBCC_VOTE_POLICY", value_enum, default_value = "accumulate")]
    pub vote_policy: Policy,

    /// Per-call timeout for peer requests
    #[arg(long, env = "SBCC_PEER_TIMEOUT_MS", default_value_t = 3000)]
    pub peer_timeout_ms: u64,

    /// Maximum peer deliveries in flight
    #[arg(long, env = "SBCC_BROADCAST_CONCURRENCY", default_value_t = 32)]
    pub broadcast_concurrency: usize,

    /// How long votes for unknown transactions are kept
    #[arg(long, env = "SBCC_ORPHAN_TTL_SECS", default_value_t = 30)]
    pub orphan_ttl_secs: u64,

    /// Seed for reproducible voting
    #[arg(long, env = "SBCC_RNG_SEED")]
    pub rng_seed: Option<u64>,
}

impl NodeArgs {
    /// Build and validate the node configuration
    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let defaults = NodeConfig::default();
        let config = NodeConfig {
            node_id: self.node_id.clone().unwrap_or(defaults.node_id),
            validator_type: self.validator_type.into(),
            reputation: self.reputation,
            stake_weight: self.stake_weight,
            quorum_participation: self.quorum_participation,
            lambda_base: self.lambda_base,
            time_scaling_factor: self.time_scaling,
            thresholds: FinalityThresholds {
                provisional: self.provisional_threshold,
                economic: self.economic_threshold,
                absolute: self.absolute_threshold,
            },
            byzantine_intensity: self.byzantine_intensity,
            validity_threshold: self.validity_threshold,
            min_delay_ms: self.delay_min_ms,
            max_delay_ms: self.delay_max_ms,
            vote_policy: self.vote_policy.into(),
            peer_timeout_ms: self.peer_timeout_ms,
            broadcast_concurrency: self.broadcast_concurrency,
            orphan_ttl_secs: self.orphan_ttl_secs,
            orphan_capacity: defaults.orphan_capacity,
            rng_seed: self.rng_seed,
        };
        config.validate()?;
        Ok(config)
    }
}
