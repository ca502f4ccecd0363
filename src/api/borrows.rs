//! Borrow lifecycle endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{BorrowEvent, BorrowEventDetails, BorrowRequest, Report},
    AppState,
};

use super::AuthenticatedUser;

/// Borrow request body
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBorrowRequest {
    #[validate(range(min = 1, message = "Invalid book id"))]
    pub book_id: i64,
    /// First day of the borrowing window (must be in the future)
    pub start_date: NaiveDate,
    /// Last day of the borrowing window; also the return date
    pub end_date: NaiveDate,
}

/// Accept request body
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AcceptRequest {
    /// Handoff time, HH:MM
    #[validate(length(equal = 5, message = "Time must be formatted HH:MM"))]
    pub final_time: String,
    #[validate(length(min = 1, max = 255))]
    pub final_location: String,
}

/// Book received body, setting the return handoff
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReceiveRequest {
    /// Return time, HH:MM
    #[validate(length(equal = 5, message = "Time must be formatted HH:MM"))]
    pub return_time: String,
    #[validate(length(min = 1, max = 255))]
    pub return_location: String,
}

/// Body for reject, cancel and report
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
}

/// Request to borrow a book
#[utoipa::path(
    post,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowRequest,
    responses(
        (status = 201, description = "Borrow request created", body = BorrowEvent),
        (status = 400, description = "Invalid dates or own book"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book unavailable or request already open"),
        (status = 422, description = "Too many active borrow events")
    )
)]
pub async fn request_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowEvent>)> {
    request.validate()?;

    let event = state
        .services
        .borrows
        .request_borrow(
            claims.user_id,
            BorrowRequest {
                book_id: request.book_id,
                start_date: request.start_date,
                end_date: request.end_date,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// Get a borrow event with its negotiation details
#[utoipa::path(
    get,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    responses(
        (status = 200, description = "Borrow event", body = BorrowEventDetails),
        (status = 404, description = "Borrow event not found")
    )
)]
pub async fn get_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<BorrowEventDetails>> {
    let details = state.services.borrows.get_event(claims.user_id, id).await?;
    Ok(Json(details))
}

/// Pending requests on the caller's books
#[utoipa::path(
    get,
    path = "/borrows/incoming",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Incoming requests", body = Vec<BorrowEvent>))
)]
pub async fn list_incoming(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowEvent>>> {
    let events = state
        .services
        .borrows
        .list_incoming_requests(claims.user_id)
        .await?;
    Ok(Json(events))
}

/// Ongoing borrow events of the caller, either side
#[utoipa::path(
    get,
    path = "/borrows/active",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Active borrow events", body = Vec<BorrowEvent>))
)]
pub async fn list_active(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowEvent>>> {
    let events = state.services.borrows.list_active_events(claims.user_id).await?;
    Ok(Json(events))
}

/// Finished borrow events of the caller
#[utoipa::path(
    get,
    path = "/borrows/history",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Rejected, completed and cancelled events", body = Vec<BorrowEvent>))
)]
pub async fn list_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowEvent>>> {
    let events = state.services.borrows.list_history(claims.user_id).await?;
    Ok(Json(events))
}

/// Accept a pending request and set the meetup
#[utoipa::path(
    post,
    path = "/borrows/{id}/accept",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    request_body = AcceptRequest,
    responses(
        (status = 200, description = "Request accepted", body = BorrowEvent),
        (status = 400, description = "Time outside 07:00-17:00 or empty location"),
        (status = 403, description = "Caller is not the lender"),
        (status = 409, description = "Event not pending or book already lent")
    )
)]
pub async fn accept(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<AcceptRequest>,
) -> AppResult<Json<BorrowEvent>> {
    request.validate()?;

    let event = state
        .services
        .borrows
        .accept_and_set_meetup(claims.user_id, id, &request.final_time, &request.final_location)
        .await?;
    Ok(Json(event))
}

/// Reject a pending request
#[utoipa::path(
    post,
    path = "/borrows/{id}/reject",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Request rejected", body = BorrowEvent),
        (status = 403, description = "Caller is not the lender"),
        (status = 409, description = "Event not pending")
    )
)]
pub async fn reject(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<ReasonRequest>,
) -> AppResult<Json<BorrowEvent>> {
    request.validate()?;

    let event = state
        .services
        .borrows
        .reject_request(claims.user_id, id, &request.reason)
        .await?;
    Ok(Json(event))
}

/// Borrower confirms pick-up and sets the return handoff
#[utoipa::path(
    post,
    path = "/borrows/{id}/receive",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    request_body = ReceiveRequest,
    responses(
        (status = 200, description = "Lending in progress", body = BorrowEvent),
        (status = 403, description = "Caller is not the borrower"),
        (status = 409, description = "Event not accepted")
    )
)]
pub async fn receive(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<ReceiveRequest>,
) -> AppResult<Json<BorrowEvent>> {
    request.validate()?;

    let event = state
        .services
        .borrows
        .receive_book_and_set_return(
            claims.user_id,
            id,
            &request.return_time,
            &request.return_location,
        )
        .await?;
    Ok(Json(event))
}

/// Lender confirms the book came back
#[utoipa::path(
    post,
    path = "/borrows/{id}/complete",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    responses(
        (status = 200, description = "Borrow event completed", body = BorrowEvent),
        (status = 403, description = "Caller is not the lender"),
        (status = 409, description = "Event already finished")
    )
)]
pub async fn complete(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<BorrowEvent>> {
    let event = state
        .services
        .borrows
        .confirm_received_book(claims.user_id, id)
        .await?;
    Ok(Json(event))
}

/// Cancel a borrow event
#[utoipa::path(
    post,
    path = "/borrows/{id}/cancel",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Borrow event cancelled", body = BorrowEvent),
        (status = 403, description = "Caller is not a party"),
        (status = 409, description = "Event already finished")
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<ReasonRequest>,
) -> AppResult<Json<BorrowEvent>> {
    request.validate()?;

    let event = state
        .services
        .borrows
        .cancel_event(claims.user_id, id, &request.reason)
        .await?;
    Ok(Json(event))
}

/// Report a problem with a borrow event
#[utoipa::path(
    post,
    path = "/borrows/{id}/report",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    request_body = ReasonRequest,
    responses(
        (status = 201, description = "Report filed", body = Report),
        (status = 403, description = "Caller is not a party"),
        (status = 409, description = "Event cannot be reported in its status")
    )
)]
pub async fn report(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<ReasonRequest>,
) -> AppResult<(StatusCode, Json<Report>)> {
    request.validate()?;

    let report = state
        .services
        .borrows
        .report_event(claims.user_id, id, &request.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// Mark a report resolved (administrators)
#[utoipa::path(
    post,
    path = "/borrows/{id}/report/resolve",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow event ID")),
    responses(
        (status = 200, description = "Report resolved", body = Report),
        (status = 403, description = "Administrator rights required"),
        (status = 404, description = "No report on this event")
    )
)]
pub async fn resolve_report(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Report>> {
    let report = state.services.borrows.resolve_report(&claims, id).await?;
    Ok(Json(report))
}
