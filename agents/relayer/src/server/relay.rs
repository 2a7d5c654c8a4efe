use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bossfight_core::{SubmissionKind, SubmissionRequest};

use crate::relayer::{QueueStatus, StatusReport};
use crate::server::utils::{
    ServerErrorBody, ServerErrorResponse, ServerResult, ServerSuccessResponse,
};
use crate::server::ServerState;

const MISSING_FIELDS: &str = "Transaction type and account address are required";
const UNSUPPORTED_TYPE: &str = "Unsupported transaction type";
const MISSING_COIN_COUNT: &str = "Coin count is required for reward token transactions";
const INVALID_COIN_COUNT: &str = "Coin count must be a non-negative integer";

/// Request Body
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub account: Option<String>,
    /// Number, numeric string or absent
    pub coin_count: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub message: String,
    pub queue_length: usize,
    pub queue_status: QueueStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusResponse {
    pub data: StatusReport,
}

fn parse_coin_count(value: Option<&Value>) -> Result<Option<u64>, &'static str> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or(INVALID_COIN_COUNT),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| INVALID_COIN_COUNT),
        Some(_) => Err(INVALID_COIN_COUNT),
    }
}

/// Validate a raw POST body into a queueable request
fn parse_submission(body: &[u8]) -> Result<SubmissionRequest, &'static str> {
    let body: RequestBody = serde_json::from_slice(body).map_err(|_| MISSING_FIELDS)?;
    let (kind, account) = match (body.kind.as_deref(), body.account) {
        (Some(kind), Some(account)) if !kind.is_empty() && !account.is_empty() => (kind, account),
        _ => return Err(MISSING_FIELDS),
    };
    match SubmissionKind::from_wire(kind).ok_or(UNSUPPORTED_TYPE)? {
        SubmissionKind::BossHit => Ok(SubmissionRequest::boss_hit(account)),
        SubmissionKind::RewardToken => {
            let coin_count = parse_coin_count(body.coin_count.as_ref())?.ok_or(MISSING_COIN_COUNT)?;
            Ok(SubmissionRequest::reward_token(account, coin_count))
        }
    }
}

/// Queue a game event for on-chain submission.
///
/// Example request
/// ```json
/// { "type": "rewardToken", "account": "0x5aAe...", "coinCount": 12 }
/// ```
pub async fn enqueue_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> ServerResult<ServerSuccessResponse<EnqueueResponse>> {
    let request = parse_submission(&body).map_err(|error| {
        tracing::debug!(error, "Rejected submission");
        ServerErrorResponse::bad_request(error)
    })?;

    state.service.enqueue(request);

    // the request stays queued if the chain is not reachable right now
    state.service.ensure_ready().await.map_err(|err| {
        tracing::warn!(?err, "Relayer not ready, request kept in queue");
        ServerErrorResponse::from(err)
    })?;

    state.service.trigger();

    Ok(ServerSuccessResponse::new(EnqueueResponse {
        message: "Transaction added to queue".to_owned(),
        queue_length: state.service.queue_length(),
        queue_status: state.service.queue_status(),
    }))
}

/// Report pool, queue and counter state. Never mutates anything.
pub async fn status_handler(
    State(state): State<ServerState>,
) -> ServerResult<ServerSuccessResponse<StatusResponse>> {
    Ok(ServerSuccessResponse::new(StatusResponse {
        data: state.service.status(),
    }))
}

pub async fn options_handler() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> impl IntoResponse {
    ServerErrorResponse::new(
        StatusCode::METHOD_NOT_ALLOWED,
        ServerErrorBody {
            error: "Method not allowed".to_owned(),
            details: None,
        },
    )
}
