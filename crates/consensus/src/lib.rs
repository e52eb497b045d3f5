//! SBCC Consensus - blockless, confidence-based transaction finality
//!
//! Architecture:
//! - Each validator votes on a transaction independently (honest or Byzantine strategy)
//! - Votes and quorum signals are broadcast best-effort to every known peer
//! - Every node folds the votes it has seen into a confidence score
//!   `C = 1 - exp(-λ·V)` and buckets it into a finality tier
//! - No blocks, no leader, no global order: nodes converge on their own local views

pub mod broadcast;
pub mod confidence;
pub mod config;
pub mod error;
pub mod node;
pub mod rolling_hash;
pub mod strategy;
pub mod transport;
pub mod types;
pub mod validator;

pub use broadcast::{BroadcastReport, NetworkStats, PeerNetwork};
pub use confidence::{Confidence, ConfidenceModel};
pub use config::{FinalityThresholds, NodeConfig, VotePolicy};
pub use error::{ConsensusError, Result};
pub use node::{Submission, ValidatorNode, ValidatorNodeBuilder};
pub use rolling_hash::RollingHash;
pub use strategy::{strategy_for, ByzantineStrategy, HonestStrategy, VoteDecision, VotingStrategy};
pub use transport::{NullTransport, PeerTransport};
pub use types::*;
pub use validator::{Delivery, Evaluation, TxRecord, Validator, ValidatorStats};
