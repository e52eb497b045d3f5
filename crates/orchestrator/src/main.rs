//! SBCC Orchestrator
//!
//! Builds or connects to a validator network, runs a consensus experiment
//! and prints the report as JSON.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use sbcc_consensus::{NodeConfig, PeerInfo};
use sbcc_orchestrator::{
    ExperimentConfig, HttpNetwork, HttpValidatorClient, Injection, LocalNetwork,
    NetworkOrchestrator, NetworkSpec, ValidatorClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where the validators run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// In this process, wired through an in-memory transport
    Local,
    /// In this process, each behind its own loopback HTTP server
    Http,
    /// Already running elsewhere, given with `--validator`
    Remote,
}

/// Transaction entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Entry {
    /// One random validator per transaction
    Random,
    /// Every validator
    All,
}

impl From<Entry> for Injection {
    fn from(e: Entry) -> Self {
        match e {
            Entry::Random => Injection::Entry,
            Entry::All => Injection::All,
        }
    }
}

/// Consensus experiment runner
#[derive(Parser, Debug)]
#[command(name = "sbcc-orchestrator")]
#[command(about = "Runs confidence-consensus experiments against a validator network", long_about = None)]
struct Args {
    #[arg(long, value_enum, default_value = "local")]
    mode: Mode,

    /// Number of validators to start (local and http modes)
    #[arg(long, env = "SBCC_VALIDATORS", default_value_t = 10)]
    validators: usize,

    /// Fraction of started validators that are Byzantine
    #[arg(long, env = "SBCC_BYZANTINE_FRACTION", default_value_t = 0.2)]
    byzantine_fraction: f64,

    /// Remote validators as node_id=url (remote mode)
    #[arg(long = "validator", env = "SBCC_VALIDATOR_URLS", value_delimiter = ',')]
    remote: Vec<PeerInfo>,

    #[arg(long, env = "SBCC_TRANSACTIONS", default_value_t = 50)]
    transactions: usize,

    #[arg(long, value_enum, default_value = "random")]
    entry: Entry,

    /// Pause between transactions
    #[arg(long, default_value_t = 100)]
    pacing_ms: u64,

    /// Propagation wait before results are polled
    #[arg(long, default_value_t = 5000)]
    settle_ms: u64,

    /// Submission retries on transient failures (at most 2)
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Seed for identities and transactions
    #[arg(long, env = "SBCC_RNG_SEED")]
    seed: Option<u64>,

    /// Skip per-validator processing delays
    #[arg(long)]
    no_delay: bool,

    /// Run the scalability sweep after the experiment
    #[arg(long)]
    scalability: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn network_spec(&self) -> NetworkSpec {
        let mut template = NodeConfig::default();
        if self.no_delay {
            template = template.without_delay();
        }
        let spec =
            NetworkSpec::new(self.validators, self.byzantine_fraction).with_template(template);
        match self.seed {
            Some(seed) => spec.with_seed(seed),
            None => spec,
        }
    }

    fn experiment(&self) -> ExperimentConfig {
        ExperimentConfig {
            transactions: self.transactions,
            injection: self.entry.into(),
            pacing: Duration::from_millis(self.pacing_ms),
            settle: Duration::from_millis(self.settle_ms),
            max_retries: self.max_retries,
            ..ExperimentConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting SBCC orchestrator in {:?} mode", args.mode);

    // Networks stay alive until the experiment is over
    let mut _local = None;
    let mut _http = None;
    let clients: Vec<Arc<dyn ValidatorClient>> = match args.mode {
        Mode::Local => {
            let network = LocalNetwork::build(&args.network_spec())?;
            let clients = network.clients();
            _local = Some(network);
            clients
        }
        Mode::Http => {
            let network = HttpNetwork::spawn(&args.network_spec()).await?;
            let clients = network.clients()?;
            _http = Some(network);
            clients
        }
        Mode::Remote => {
            if args.remote.is_empty() {
                anyhow::bail!("remote mode needs at least one --validator node_id=url");
            }
            let mut clients: Vec<Arc<dyn ValidatorClient>> =
                Vec::with_capacity(args.remote.len());
            for peer in &args.remote {
                let client = HttpValidatorClient::new(&peer.node_id, &peer.url)?;
                match client.health().await {
                    Ok(health) => tracing::info!(
                        "{} is {} ({}, {} processed)",
                        peer.node_id,
                        health.status,
                        health.validator_type,
                        health.processed_count
                    ),
                    Err(e) => tracing::warn!("{} health check failed: {}", peer.node_id, e),
                }
                clients.push(Arc::new(client));
            }
            clients
        }
    };

    let orchestrator = NetworkOrchestrator::new(clients, args.seed);
    orchestrator.wire_mesh().await;

    let report = orchestrator.run(&args.experiment()).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.scalability {
        let sizes: Vec<usize> = [5, 10, 15, 20]
            .into_iter()
            .filter(|&size| size <= orchestrator.clients().len())
            .collect();
        let scalability = orchestrator.scalability(&sizes).await;
        tracing::info!(
            "Scalability: correlation {:.3}, efficiency {:.3}",
            scalability.linear_correlation,
            scalability.scaling_efficiency
        );
        println!("{}", serde_json::to_string_pretty(&scalability)?);
    }

    tracing::info!("Orchestrator finished");

    Ok(())
}
