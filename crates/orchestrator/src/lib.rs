//! SBCC Orchestrator
//!
//! Builds validator networks (in-process or over loopback HTTP), connects
//! to remote ones, and runs consensus experiments against them:
//! - Distributed: each transaction enters at one random validator and
//!   spreads through vote broadcast and peer pulls
//! - Multi-validator: every validator processes every transaction
//! - Scalability: one transaction over growing validator subsets

pub mod client;
pub mod experiment;
pub mod local;
pub mod network;

#[cfg(test)]
mod tests;

pub use client::{ClientError, ClientResult, HttpValidatorClient, LocalClient, ValidatorClient};
pub use experiment::{
    pearson, ExperimentConfig, ExperimentReport, Injection, NetworkOrchestrator,
    ScalabilityPoint, ScalabilityReport, TransactionOutcome, MAX_SUBMIT_RETRIES,
};
pub use local::LocalTransport;
pub use network::{HttpNetwork, LocalNetwork, NetworkSpec};
