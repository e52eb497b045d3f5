//! SBCC Validator
//!
//! Runs one confidence-consensus validator behind its HTTP surface. Peers
//! can be given up front or registered later through `/peers/register`.

use anyhow::Result;
use clap::Parser;
use sbcc_consensus::{PeerInfo, ValidatorNodeBuilder};
use sbcc_rpc::{HttpPeerTransport, HttpRpcServer, RpcContext, RpcServerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::NodeArgs;

/// Stream-based confidence consensus validator
#[derive(Parser, Debug)]
#[command(name = "sbcc-validator")]
#[command(about = "Blockless validator with probabilistic, confidence-based finality", long_about = None)]
struct Args {
    #[command(flatten)]
    node: NodeArgs,

    /// HTTP bind host
    #[arg(long, env = "SBCC_HOST", default_value = "0.0.0.0")]
    host: String,

    /// HTTP bind port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Initial peers as node_id=url, repeatable or comma separated
    #[arg(long = "peer", env = "SBCC_PEERS", value_delimiter = ',')]
    peers: Vec<PeerInfo>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.node.node_config()?;
    let server_config = RpcServerConfig::new(&args.host, args.port);

    tracing::info!("Starting SBCC validator {}", config.node_id);
    tracing::info!("  Type: {}", config.validator_type);
    tracing::info!(
        "  Reputation: {}, stake: {}, participation: {}",
        config.reputation,
        config.stake_weight,
        config.quorum_participation
    );
    tracing::info!("  HTTP: {}", server_config.http_addr);
    tracing::debug!("  Config: {}", serde_json::to_string(&config)?);

    let transport = Arc::new(HttpPeerTransport::new(config.peer_timeout())?);
    let node = Arc::new(
        ValidatorNodeBuilder::new()
            .config(config)
            .transport(transport)
            .build()?,
    );

    for peer in &args.peers {
        if let Err(e) = node.register_peer(&peer.node_id, &peer.url) {
            tracing::warn!("Skipping peer {}: {}", peer.node_id, e);
        }
    }

    let janitor = node.spawn_orphan_janitor();

    let context = Arc::new(RpcContext::new(node.clone()));
    let listener = TcpListener::bind(&server_config.http_addr).await?;
    tracing::info!("HTTP server listening on {}", server_config.http_addr);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let http_server = tokio::spawn(async move {
        let server = HttpRpcServer::new(context);
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = server.serve_with_shutdown(listener, shutdown).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tracing::info!("Validator running with {} peers.", node.peers().len());
    tracing::info!("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(());
    janitor.abort();
    if let Err(e) = http_server.await {
        tracing::error!("HTTP server task failed: {}", e);
    }

    let metrics = node.metrics();
    tracing::info!(
        "Processed {} transactions, {} finalized, average confidence {:.4}",
        metrics.consensus_metrics.processed_transactions,
        metrics.consensus_metrics.total_finalized,
        metrics.consensus_metrics.average_confidence
    );

    tracing::info!("Validator stopped");

    Ok(())
}
