//! Consensus errors

use thiserror::Error;

/// Errors raised by the consensus core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    /// Malformed or missing request fields. Surfaced to the direct caller.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A peer call failed or timed out. Recovered locally, never escalated.
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// Transaction not known locally and not fetchable from any peer
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    /// Invalid node configuration, raised at startup
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ConsensusError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unreachable(peer: impl Into<String>, reason: impl ToString) -> Self {
        Self::PeerUnreachable {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable kind, used in wire error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PeerUnreachable { .. } => "peer_unreachable",
            Self::UnknownTransaction(_) => "unknown_transaction",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
