//! HTTP peer transport
//!
//! Client side of the peer routes. A 404 on a vote is not a failure: the
//! peer buffered the vote and will pull the transaction body.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sbcc_consensus::{
    ConsensusError, PeerInfo, PeerTransport, QuorumSignal, Result, SignalAck, Transaction, Vote,
    VoteAck,
};
use std::time::Duration;

pub struct HttpPeerTransport {
    client: Client,
}

impl HttpPeerTransport {
    pub fn new(timeout: Duration) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(2)))
            .build()?;
        Ok(Self { client })
    }

    fn endpoint(peer: &PeerInfo, path: &str) -> String {
        format!("{}{}", peer.url.trim_end_matches('/'), path)
    }
}

fn unreachable(peer: &PeerInfo, e: reqwest::Error) -> ConsensusError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("cannot connect to {}", peer.url)
    } else {
        e.to_string()
    };
    ConsensusError::unreachable(&peer.node_id, reason)
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn send_vote(&self, peer: &PeerInfo, vote: &Vote) -> Result<VoteAck> {
        let response = self
            .client
            .post(Self::endpoint(peer, "/validation/receive"))
            .json(vote)
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(|e| unreachable(peer, e)),
            StatusCode::NOT_FOUND => Ok(response.json().await.unwrap_or(VoteAck::PendingFetch {
                tx_id: vote.tx_id.clone(),
            })),
            status => Err(ConsensusError::unreachable(
                &peer.node_id,
                format!("vote rejected with status {}", status),
            )),
        }
    }

    async fn send_signal(&self, peer: &PeerInfo, signal: &QuorumSignal) -> Result<SignalAck> {
        let response = self
            .client
            .post(Self::endpoint(peer, "/quorum/receive"))
            .json(signal)
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;

        if !response.status().is_success() {
            return Err(ConsensusError::unreachable(
                &peer.node_id,
                format!("signal rejected with status {}", response.status()),
            ));
        }
        response.json().await.map_err(|e| unreachable(peer, e))
    }

    async fn fetch_transaction(&self, peer: &PeerInfo, tx_id: &str) -> Result<Option<Transaction>> {
        let response = self
            .client
            .get(Self::endpoint(peer, &format!("/transaction/{}", tx_id)))
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map(Some)
                .map_err(|e| unreachable(peer, e)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ConsensusError::unreachable(
                &peer.node_id,
                format!("fetch failed with status {}", status),
            )),
        }
    }
}
