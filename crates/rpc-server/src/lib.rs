//! RPC Server - HTTP surface of an SBCC validator
//!
//! Provides:
//! - Client routes: propose a transaction, query consensus status and metrics
//! - Peer routes: receive votes and quorum signals, serve transaction bodies
//! - `HttpPeerTransport`: the reqwest client side of the peer routes

pub mod http_server;
pub mod methods;
pub mod peer_client;

pub use http_server::HttpRpcServer;
pub use methods::{RpcContext, RpcError};
pub use peer_client::HttpPeerTransport;

/// RPC Server configuration
#[derive(Clone, Debug)]
pub struct RpcServerConfig {
    /// HTTP bind address
    pub http_addr: String,
}

impl RpcServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            http_addr: format!("{}:{}", host, port),
        }
    }
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self::new("0.0.0.0", 8080)
    }
}
