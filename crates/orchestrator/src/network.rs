//! Network construction
//!
//! Generates validator identities for a network of a given size and
//! Byzantine fraction, and brings the validators up either in-process or
//! behind loopback HTTP servers.

use crate::client::{HttpValidatorClient, LocalClient, ValidatorClient};
use crate::local::LocalTransport;
use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sbcc_consensus::{NodeConfig, ValidatorNode, ValidatorNodeBuilder, ValidatorType};
use sbcc_rpc::{HttpPeerTransport, HttpRpcServer, RpcContext};
use std::sync::Arc;

/// Byzantine validators are configured weak
pub const BYZANTINE_REPUTATION: f64 = 0.2;
pub const BYZANTINE_PARTICIPATION: f64 = 0.1;

/// Shape of a simulated validator network
#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub validators: usize,
    /// Fraction of validators that are Byzantine, rounded down
    pub byzantine_fraction: f64,
    pub seed: Option<u64>,
    /// Settings shared by every node (thresholds, delays, timeouts)
    pub template: NodeConfig,
}

impl NetworkSpec {
    pub fn new(validators: usize, byzantine_fraction: f64) -> Self {
        Self {
            validators,
            byzantine_fraction,
            seed: None,
            template: NodeConfig::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_template(mut self, template: NodeConfig) -> Self {
        self.template = template;
        self
    }

    pub fn byzantine_count(&self) -> usize {
        (self.validators as f64 * self.byzantine_fraction).floor() as usize
    }

    /// One configuration per validator; the first `byzantine_count` are Byzantine
    pub fn node_configs(&self) -> anyhow::Result<Vec<NodeConfig>> {
        if self.validators == 0 {
            anyhow::bail!("network needs at least one validator");
        }
        if !(0.0..=1.0).contains(&self.byzantine_fraction) {
            anyhow::bail!(
                "byzantine fraction must be in [0, 1], got {}",
                self.byzantine_fraction
            );
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let byzantine = self.byzantine_count();

        let configs = (0..self.validators)
            .map(|i| {
                let mut config = self.template.clone();
                config.node_id = format!("validator_{}", i);
                config.stake_weight = rng.gen_range(1.0..3.0);
                if i < byzantine {
                    config.validator_type = ValidatorType::Byzantine;
                    config.reputation = BYZANTINE_REPUTATION;
                    config.quorum_participation = BYZANTINE_PARTICIPATION;
                } else {
                    config.validator_type = ValidatorType::Honest;
                    config.reputation = rng.gen_range(0.85..0.98);
                    config.quorum_participation = rng.gen_range(0.8..0.95);
                }
                config.rng_seed = self.seed.map(|seed| seed.wrapping_add(i as u64 + 1));
                config
            })
            .collect();
        Ok(configs)
    }
}

/// Validators running in this process, wired through a `LocalTransport`
pub struct LocalNetwork {
    pub transport: Arc<LocalTransport>,
    pub nodes: Vec<Arc<ValidatorNode>>,
}

impl LocalNetwork {
    pub fn build(spec: &NetworkSpec) -> anyhow::Result<Self> {
        Self::build_with_transport(spec, Arc::new(LocalTransport::new()))
    }

    pub fn build_with_transport(
        spec: &NetworkSpec,
        transport: Arc<LocalTransport>,
    ) -> anyhow::Result<Self> {
        let mut nodes = Vec::with_capacity(spec.validators);
        for config in spec.node_configs()? {
            let node = Arc::new(
                ValidatorNodeBuilder::new()
                    .config(config)
                    .transport(transport.clone())
                    .build()?,
            );
            transport.attach(&node);
            nodes.push(node);
        }
        tracing::info!(
            "Built local network: {} validators, {} Byzantine",
            spec.validators,
            spec.byzantine_count()
        );
        Ok(Self { transport, nodes })
    }

    pub fn clients(&self) -> Vec<Arc<dyn ValidatorClient>> {
        self.nodes
            .iter()
            .map(|node| Arc::new(LocalClient::new(node.clone())) as Arc<dyn ValidatorClient>)
            .collect()
    }
}

/// Validators served over HTTP on loopback, talking to each other over HTTP
pub struct HttpNetwork {
    pub nodes: Vec<Arc<ValidatorNode>>,
    pub urls: Vec<String>,
}

impl HttpNetwork {
    pub async fn spawn(spec: &NetworkSpec) -> anyhow::Result<Self> {
        let mut nodes = Vec::with_capacity(spec.validators);
        let mut urls = Vec::with_capacity(spec.validators);
        for config in spec.node_configs()? {
            let transport = Arc::new(
                HttpPeerTransport::new(config.peer_timeout())
                    .context("failed to build peer transport")?,
            );
            let node = Arc::new(
                ValidatorNodeBuilder::new()
                    .config(config)
                    .transport(transport)
                    .build()?,
            );
            let addr = HttpRpcServer::new(Arc::new(RpcContext::new(node.clone())))
                .spawn("127.0.0.1")
                .await?;
            node.spawn_orphan_janitor();
            tracing::info!("{} serving on http://{}", node.node_id(), addr);
            urls.push(format!("http://{}", addr));
            nodes.push(node);
        }
        Ok(Self { nodes, urls })
    }

    pub fn clients(&self) -> anyhow::Result<Vec<Arc<dyn ValidatorClient>>> {
        self.nodes
            .iter()
            .zip(&self.urls)
            .map(|(node, url)| {
                let client = HttpValidatorClient::new(node.node_id(), url.clone())?;
                Ok(Arc::new(client) as Arc<dyn ValidatorClient>)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_generation() {
        let spec = NetworkSpec::new(10, 0.2).with_seed(1);
        let configs = spec.node_configs().unwrap();
        assert_eq!(configs.len(), 10);

        let byzantine: Vec<_> = configs
            .iter()
            .filter(|c| c.validator_type == ValidatorType::Byzantine)
            .collect();
        assert_eq!(byzantine.len(), 2);
        for config in &byzantine {
            assert_eq!(config.reputation, BYZANTINE_REPUTATION);
            assert_eq!(config.quorum_participation, BYZANTINE_PARTICIPATION);
        }
        for config in configs.iter().filter(|c| c.validator_type == ValidatorType::Honest) {
            assert!((0.85..0.98).contains(&config.reputation));
            assert!((0.8..0.95).contains(&config.quorum_participation));
            assert!((1.0..3.0).contains(&config.stake_weight));
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = NetworkSpec::new(5, 0.4).with_seed(7).node_configs().unwrap();
        let b = NetworkSpec::new(5, 0.4).with_seed(7).node_configs().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_byzantine_count_rounds_down() {
        assert_eq!(NetworkSpec::new(10, 0.25).byzantine_count(), 2);
        assert_eq!(NetworkSpec::new(3, 0.3).byzantine_count(), 0);
        assert_eq!(NetworkSpec::new(4, 1.0).byzantine_count(), 4);
    }

    #[test]
    fn test_invalid_network_shape_rejected() {
        assert!(NetworkSpec::new(0, 0.2).node_configs().is_err());
        assert!(NetworkSpec::new(5, 1.5).node_configs().is_err());
    }

    #[tokio::test]
    async fn test_local_network_builds() {
        let network = LocalNetwork::build(&NetworkSpec::new(4, 0.25).with_seed(3)).unwrap();
        assert_eq!(network.nodes.len(), 4);
        assert_eq!(network.clients().len(), 4);
        assert_eq!(network.clients()[2].url(), "local://validator_2");
    }
}
