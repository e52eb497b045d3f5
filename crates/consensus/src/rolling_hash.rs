//! Per-node rolling hash over processed transactions

use sha2::{Digest, Sha256};

/// Length of the hash prefix exposed on the wire
pub const HASH_PREFIX_LEN: usize = 16;

/// Running SHA-256 commitment: `h' = sha256(h || tx_id || confidence || now)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingHash {
    current: String,
    sequence: u64,
}

impl RollingHash {
    pub fn genesis(node_id: &str) -> Self {
        Self {
            current: hex::encode(Sha256::digest(format!("genesis_{}", node_id))),
            sequence: 0,
        }
    }

    /// Fold one processed transaction into the hash
    pub fn update(&mut self, tx_id: &str, confidence: f64, now: f64) -> &str {
        let input = format!("{}{}{}{}", self.current, tx_id, confidence, now);
        self.current = hex::encode(Sha256::digest(input));
        self.sequence += 1;
        &self.current
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn prefix(&self) -> String {
        self.current[..HASH_PREFIX_LEN].to_string()
    }

    /// Number of updates applied since genesis
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
