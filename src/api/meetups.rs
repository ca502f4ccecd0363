//! Meetup negotiation endpoints

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
    models::{MeetupDetail, MeetupSuggestion},
    AppState,
};

use super::AuthenticatedUser;

/// Meetup counter-proposal
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SuggestMeetupRequest {
    /// Proposed handoff time, HH:MM within 07:00-17:00
    #[validate(length(equal = 5, message = "Time must be formatted HH:MM"))]
    pub time: String,
    #[validate(length(min = 1, max = 255))]
    pub location: String,
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
}

/// Borrower confirms the lender's meetup
#[utoipa::path(
    post,
    path = "/borrows/{id}/meetup/confirm",
    tag = "meetups",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    responses(
        (status = 200, description = "Meetup confirmed", body = MeetupDetail),
        (status = 403, description = "Caller is not the borrower"),
        (status = 409, description = "Event not accepted or meetup already settled")
    )
)]
pub async fn confirm(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MeetupDetail>> {
    let meetup = state.services.meetups.confirm_meetup(claims.user_id, id).await?;
    Ok(Json(meetup))
}

/// Propose another meetup time and place
#[utoipa::path(
    post,
    path = "/borrows/{id}/meetup/suggestions",
    tag = "meetups",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    request_body = SuggestMeetupRequest,
    responses(
        (status = 201, description = "Suggestion created", body = MeetupSuggestion),
        (status = 400, description = "Invalid time or empty fields"),
        (status = 403, description = "Caller is not a party"),
        (status = 409, description = "Caller already has a pending suggestion")
    )
)]
pub async fn suggest(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<SuggestMeetupRequest>,
) -> AppResult<(StatusCode, Json<MeetupSuggestion>)> {
    request.validate()?;

    let suggestion = state
        .services
        .meetups
        .suggest_meetup(
            claims.user_id,
            id,
            &request.time,
            &request.location,
            &request.reason,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(suggestion)))
}

/// Accept the latest meetup suggestion
#[utoipa::path(
    post,
    path = "/borrows/{id}/meetup/suggestions/confirm",
    tag = "meetups",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    responses(
        (status = 200, description = "Meetup updated and confirmed", body = MeetupDetail),
        (status = 403, description = "Caller wrote the latest suggestion"),
        (status = 409, description = "No pending suggestion")
    )
)]
pub async fn confirm_suggestion(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MeetupDetail>> {
    let meetup = state
        .services
        .meetups
        .confirm_meetup_suggestion(claims.user_id, id)
        .await?;
    Ok(Json(meetup))
}

/// Decline the pending meetup suggestions
#[utoipa::path(
    post,
    path = "/borrows/{id}/meetup/suggestions/reject",
    tag = "meetups",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    responses(
        (status = 200, description = "Suggestions rejected", body = MeetupDetail),
        (status = 403, description = "Caller wrote the latest suggestion"),
        (status = 409, description = "No pending suggestion")
    )
)]
pub async fn reject_suggestion(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MeetupDetail>> {
    let meetup = state
        .services
        .meetups
        .reject_meetup_suggestion(claims.user_id, id)
        .await?;
    Ok(Json(meetup))
}
