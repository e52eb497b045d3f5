//! Route handlers
//!
//! Each handler is a thin adapter from HTTP to a `ValidatorNode` operation.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sbcc_consensus::{
    ConsensusError, ConsensusStatus, ErrorBody, HealthReport, NodeMetrics, PeerInfo,
    QuorumSignal, RegisterPeerRequest, RegisterPeerResponse, SignalAck, SubmitResponse,
    Transaction, ValidatorNode, Vote, VoteAck,
};
use std::sync::Arc;

/// RPC context shared across handlers
pub struct RpcContext {
    pub node: Arc<ValidatorNode>,
}

impl RpcContext {
    pub fn new(node: Arc<ValidatorNode>) -> Self {
        Self { node }
    }
}

type Ctx = State<Arc<RpcContext>>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, RpcError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| RpcError::InvalidParams(rejection.body_text()))
}

// ============ Client Routes ============

pub async fn handle_health(State(ctx): Ctx) -> Json<HealthReport> {
    Json(ctx.node.health())
}

pub async fn handle_propose(
    State(ctx): Ctx,
    payload: Result<Json<Transaction>, JsonRejection>,
) -> Result<Json<SubmitResponse>, RpcError> {
    let tx = body(payload)?;
    tracing::debug!("Proposal {} received by {}", tx.tx_id, ctx.node.node_id());
    let response = ctx.node.submit_transaction(tx).await?;
    Ok(Json(response))
}

pub async fn handle_consensus_status(
    State(ctx): Ctx,
    Path(tx_id): Path<String>,
) -> Result<Json<ConsensusStatus>, RpcError> {
    ctx.node
        .consensus_status(&tx_id)
        .map(Json)
        .ok_or_else(|| RpcError::NotFound(format!("transaction {} not found", tx_id)))
}

pub async fn handle_metrics(State(ctx): Ctx) -> Json<NodeMetrics> {
    Json(ctx.node.metrics())
}

// ============ Peer Routes ============

/// Unknown transactions answer 404 with a `pending_fetch` body
pub async fn handle_receive_vote(
    State(ctx): Ctx,
    payload: Result<Json<Vote>, JsonRejection>,
) -> Result<Response, RpcError> {
    let vote = body(payload)?;
    let ack = ctx.node.receive_vote(vote)?;
    let status = match ack {
        VoteAck::Recorded { .. } => StatusCode::OK,
        VoteAck::PendingFetch { .. } => StatusCode::NOT_FOUND,
    };
    Ok((status, Json(ack)).into_response())
}

pub async fn handle_receive_signal(
    State(ctx): Ctx,
    payload: Result<Json<QuorumSignal>, JsonRejection>,
) -> Result<Json<SignalAck>, RpcError> {
    let signal = body(payload)?;
    Ok(Json(ctx.node.receive_signal(signal)?))
}

pub async fn handle_get_transaction(
    State(ctx): Ctx,
    Path(tx_id): Path<String>,
) -> Result<Json<Transaction>, RpcError> {
    ctx.node
        .transaction(&tx_id)
        .map(Json)
        .ok_or_else(|| RpcError::NotFound(format!("transaction {} not found", tx_id)))
}

pub async fn handle_register_peer(
    State(ctx): Ctx,
    payload: Result<Json<RegisterPeerRequest>, JsonRejection>,
) -> Result<Json<RegisterPeerResponse>, RpcError> {
    let request = body(payload)?;
    Ok(Json(ctx.node.register_peer(&request.node_id, &request.url)?))
}

pub async fn handle_list_peers(State(ctx): Ctx) -> Json<Vec<PeerInfo>> {
    Json(ctx.node.peers())
}

pub async fn handle_remove_peer(
    State(ctx): Ctx,
    Path(node_id): Path<String>,
) -> Result<Json<PeerInfo>, RpcError> {
    ctx.node
        .remove_peer(&node_id)
        .map(Json)
        .ok_or_else(|| RpcError::NotFound(format!("peer {} not registered", node_id)))
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RpcError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParams(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PeerUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::PeerUnreachable(_) => "peer_unreachable",
            Self::InternalError(_) => "internal_error",
        }
    }
}

impl From<ConsensusError> for RpcError {
    fn from(e: ConsensusError) -> Self {
        match e {
            ConsensusError::Validation(msg) => Self::InvalidParams(msg),
            ConsensusError::UnknownTransaction(tx_id) => {
                Self::NotFound(format!("transaction {} not found", tx_id))
            }
            e @ ConsensusError::PeerUnreachable { .. } => Self::PeerUnreachable(e.to_string()),
            ConsensusError::Configuration(msg) => Self::InternalError(msg),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        if matches!(self, Self::InternalError(_)) {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err: RpcError = ConsensusError::validation("bad").into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "validation_error");

        let err: RpcError = ConsensusError::UnknownTransaction("tx".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: RpcError = ConsensusError::unreachable("peer", "down").into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
