//! Administrator triggers for the reconciliation sweeps

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::{AppError, AppResult},
    models::{Sweep, SweepReport},
    AppState,
};

use super::AuthenticatedUser;

/// Run every sweep now
#[utoipa::path(
    post,
    path = "/admin/sweeps",
    tag = "sweeps",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "One report per sweep", body = Vec<SweepReport>),
        (status = 403, description = "Administrator rights required")
    )
)]
pub async fn run_all(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<SweepReport>>> {
    let reports = state.services.sweeps.trigger(&claims, None).await?;
    Ok(Json(reports))
}

/// Run a single sweep now
#[utoipa::path(
    post,
    path = "/admin/sweeps/{name}",
    tag = "sweeps",
    security(("bearer_auth" = [])),
    params(
        ("name" = String, Path, description = "unaccepted_request, unconfirmed_meetup, overdue_accepted, return_due or overdue_return")
    ),
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 403, description = "Administrator rights required"),
        (status = 404, description = "Unknown sweep")
    )
)]
pub async fn run_one(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(name): Path<String>,
) -> AppResult<Json<SweepReport>> {
    claims.require_admin()?;
    let sweep = Sweep::from_name(&name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown sweep '{}'", name)))?;

    let report = state
        .services
        .sweeps
        .trigger(&claims, Some(sweep))
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("Sweep produced no report".to_string()))?;
    Ok(Json(report))
}
