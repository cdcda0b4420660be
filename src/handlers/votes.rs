//! # Poll Vote Handlers

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorType};
use crate::server::AppState;
use crate::votes::{PollTally, VoteOutcome, VoteResult};

/// Request body for casting a vote
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CastVoteRequest {
    /// Scenario number, 1 to 5
    #[schema(example = 3)]
    pub scenario: i64,
}

/// Cast a vote for one scenario of a poll
///
/// A voter (identified by a salted hash of the client address) may vote once per scenario.
/// Repeats answer `200` with `alreadyVoted: true` and leave the count unchanged.
#[utoipa::path(
    post,
    path = "/api/polls/{id}/votes",
    params(("id" = String, Path, description = "Poll identifier")),
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote counted or already recorded", body = VoteOutcome, example = json!({
            "success": true,
            "newCount": 42
        })),
        (status = 400, description = "Invalid scenario number", body = VoteOutcome, example = json!({
            "success": false,
            "error": "invalid scenario number"
        })),
        (status = 500, description = "Vote could not be stored", body = VoteOutcome)
    ),
    tag = "votes"
)]
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<CastVoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VoteOutcome>), ApiError> {
    let Json(request) = body?;

    let voter_hash = state.votes.voter_key_for(&headers).map_err(|err| {
        tracing::error!(error = %err, "Failed to fingerprint voter");
        ApiError::from(ErrorType::InternalServerError)
    })?;

    let result = state
        .votes
        .cast_vote(&poll_id, request.scenario, &voter_hash)
        .await;

    let status = match result {
        VoteResult::Counted { .. } | VoteResult::AlreadyVoted => StatusCode::OK,
        VoteResult::Invalid => StatusCode::BAD_REQUEST,
        VoteResult::RecordFailed | VoteResult::CountFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };

    Ok((status, Json(result.outcome())))
}

/// Current vote counts of a poll
#[utoipa::path(
    get,
    path = "/api/polls/{id}/votes",
    params(("id" = String, Path, description = "Poll identifier")),
    responses(
        (status = 200, description = "Counts for scenarios 1 to 5", body = PollTally),
        (status = 404, description = "Poll not found", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    ),
    tag = "votes"
)]
pub async fn poll_tally(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Json<PollTally>, ApiError> {
    let tally = state.votes.tally(&poll_id).await.inspect_err(|err| {
        tracing::warn!(poll_id = %poll_id, error = %err, "Failed to load tally");
    })?;

    Ok(Json(tally))
}
