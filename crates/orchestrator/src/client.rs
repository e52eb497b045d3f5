//! Validator clients
//!
//! The orchestrator drives validators through `ValidatorClient`, either
//! in-process or over HTTP.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sbcc_consensus::{
    ConsensusError, ConsensusStatus, ErrorBody, HealthReport, NodeMetrics, PeerInfo,
    RegisterPeerRequest, SubmitResponse, Transaction, ValidatorNode,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to a validator
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Validator rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl ClientError {
    /// Whether repeating the request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Rejected { status, .. } => *status >= 500,
            Self::Consensus(e) => matches!(e, ConsensusError::PeerUnreachable { .. }),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[async_trait]
pub trait ValidatorClient: Send + Sync {
    fn node_id(&self) -> &str;

    /// Address other validators use to reach this one
    fn url(&self) -> &str;

    async fn health(&self) -> ClientResult<HealthReport>;

    async fn submit(&self, tx: &Transaction) -> ClientResult<SubmitResponse>;

    /// `Ok(None)` when the validator does not know the transaction
    async fn status(&self, tx_id: &str) -> ClientResult<Option<ConsensusStatus>>;

    async fn metrics(&self) -> ClientResult<NodeMetrics>;

    async fn register_peer(&self, peer: &PeerInfo) -> ClientResult<()>;
}

// ============ In-process ============

/// Client for a node living in this process
pub struct LocalClient {
    node: Arc<ValidatorNode>,
    url: String,
}

impl LocalClient {
    pub fn new(node: Arc<ValidatorNode>) -> Self {
        let url = format!("local://{}", node.node_id());
        Self { node, url }
    }

    pub fn node(&self) -> &Arc<ValidatorNode> {
        &self.node
    }
}

#[async_trait]
impl ValidatorClient for LocalClient {
    fn node_id(&self) -> &str {
        self.node.node_id()
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn health(&self) -> ClientResult<HealthReport> {
        Ok(self.node.health())
    }

    async fn submit(&self, tx: &Transaction) -> ClientResult<SubmitResponse> {
        Ok(self.node.submit_transaction(tx.clone()).await?)
    }

    async fn status(&self, tx_id: &str) -> ClientResult<Option<ConsensusStatus>> {
        Ok(self.node.consensus_status(tx_id))
    }

    async fn metrics(&self) -> ClientResult<NodeMetrics> {
        Ok(self.node.metrics())
    }

    async fn register_peer(&self, peer: &PeerInfo) -> ClientResult<()> {
        self.node.register_peer(&peer.node_id, &peer.url)?;
        Ok(())
    }
}

// ============ HTTP ============

/// Client for a validator behind its HTTP surface
pub struct HttpValidatorClient {
    node_id: String,
    base_url: String,
    client: Client,
}

impl HttpValidatorClient {
    pub fn new(node_id: impl Into<String>, base_url: impl Into<String>) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            node_id: node_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn rejected(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => "no error body".to_string(),
    };
    ClientError::Rejected { status, message }
}

#[async_trait]
impl ValidatorClient for HttpValidatorClient {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn url(&self) -> &str {
        &self.base_url
    }

    async fn health(&self) -> ClientResult<HealthReport> {
        let response = self.client.get(self.endpoint("/health")).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(response.json().await?)
    }

    async fn submit(&self, tx: &Transaction) -> ClientResult<SubmitResponse> {
        let response = self
            .client
            .post(self.endpoint("/transaction/propose"))
            .json(tx)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(response.json().await?)
    }

    async fn status(&self, tx_id: &str) -> ClientResult<Option<ConsensusStatus>> {
        let response = self
            .client
            .get(self.endpoint(&format!("/consensus/{}", tx_id)))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(rejected(response).await),
        }
    }

    async fn metrics(&self) -> ClientResult<NodeMetrics> {
        let response = self
            .client
            .get(self.endpoint("/metrics/detailed"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(response.json().await?)
    }

    async fn register_peer(&self, peer: &PeerInfo) -> ClientResult<()> {
        let request = RegisterPeerRequest {
            node_id: peer.node_id.clone(),
            url: peer.url.clone(),
        };
        let response = self
            .client
            .post(self.endpoint("/peers/register"))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let unreachable = ClientError::from(ConsensusError::unreachable("v1", "down"));
        assert!(unreachable.is_retryable());

        let invalid = ClientError::from(ConsensusError::validation("bad tx"));
        assert!(!invalid.is_retryable());

        let rejected = ClientError::Rejected {
            status: 400,
            message: "bad".to_string(),
        };
        assert!(!rejected.is_retryable());

        let overloaded = ClientError::Rejected {
            status: 503,
            message: "busy".to_string(),
        };
        assert!(overloaded.is_retryable());
    }

    #[test]
    fn test_http_client_trims_url() {
        let client = HttpValidatorClient::new("validator_0", "http://127.0.0.1:8080/").unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:8080");
        assert_eq!(client.endpoint("/health"), "http://127.0.0.1:8080/health");
    }
}
