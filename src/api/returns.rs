//! Return negotiation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{ReturnDetail, ReturnSuggestion},
    AppState,
};

use super::AuthenticatedUser;

/// Return counter-proposal
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SuggestReturnRequest {
    /// Proposed return time, HH:MM
    #[validate(length(equal = 5, message = "Time must be formatted HH:MM"))]
    pub time: String,
    #[validate(length(min = 1, max = 255))]
    pub location: String,
}

#[utoipa::path(
    post,
    path = "/borrows/{id}/return/suggestions",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    request_body = SuggestReturnRequest,
    responses(
        (status = 201, description = "Suggestion created", body = ReturnSuggestion),
        (status = 403, description = "Caller is not a party"),
        (status = 409, description = "Not lending, or caller already has a pending suggestion")
    )
)]
pub async fn suggest(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<SuggestReturnRequest>,
) -> AppResult<(StatusCode, Json<ReturnSuggestion>)> {
    request.validate()?;

    let suggestion = state
        .services
        .returns
        .suggest_return(claims.user_id, id, &request.time, &request.location)
        .await?;
    Ok((StatusCode::CREATED, Json(suggestion)))
}

#[utoipa::path(
    post,
    path = "/borrows/{id}/return/suggestions/confirm",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    responses(
        (status = 200, description = "Return handoff updated", body = ReturnDetail),
        (status = 403, description = "Caller wrote the latest suggestion"),
        (status = 409, description = "No pending suggestion")
    )
)]
pub async fn confirm_suggestion(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ReturnDetail>> {
    let detail = state
        .services
        .returns
        .confirm_return_suggestion(claims.user_id, id)
        .await?;
    Ok(Json(detail))
}

#[utoipa::path(
    post,
    path = "/borrows/{id}/return/suggestions/reject",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    responses(
        (status = 200, description = "Suggestions rejected", body = ReturnDetail),
        (status = 403, description = "Caller wrote the latest suggestion"),
        (status = 409, description = "No pending suggestion")
    )
)]
pub async fn reject_suggestion(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ReturnDetail>> {
    let detail = state
        .services
        .returns
        .reject_return_suggestion(claims.user_id, id)
        .await?;
    Ok(Json(detail))
}
