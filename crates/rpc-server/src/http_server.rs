//! HTTP Server
//!
//! Client and peer routes served from one axum router.

use crate::methods::{
    handle_consensus_status, handle_get_transaction, handle_health, handle_list_peers,
    handle_metrics, handle_propose, handle_receive_signal, handle_receive_vote,
    handle_register_peer, handle_remove_peer, RpcContext,
};
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// HTTP server for one validator node
pub struct HttpRpcServer {
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    pub fn new(context: Arc<RpcContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser dashboards
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", get(handle_health))
            .route("/health", get(handle_health))
            .route("/transaction/propose", post(handle_propose))
            .route("/transaction/:tx_id", get(handle_get_transaction))
            .route("/validation/receive", post(handle_receive_vote))
            .route("/quorum/receive", post(handle_receive_signal))
            .route("/consensus/:tx_id", get(handle_consensus_status))
            .route("/peers/register", post(handle_register_peer))
            .route("/peers", get(handle_list_peers))
            .route("/peers/:node_id", delete(handle_remove_peer))
            .route("/metrics/detailed", get(handle_metrics))
            .layer(cors)
            .with_state(self.context)
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Serve until `shutdown` resolves
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    /// Bind an ephemeral port and serve in the background, returning the address
    pub async fn spawn(self, host: &str) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind((host, 0)).await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = self.serve(listener).await {
                tracing::error!("HTTP server on {} stopped: {}", addr, e);
            }
        });
        Ok(addr)
    }
}
