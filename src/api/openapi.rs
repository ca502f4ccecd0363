//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{borrows, health, meetups, returns, sweeps};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ShelfShare API",
        version = "1.0.0",
        description = "Peer-to-peer book lending: borrow requests, handoff negotiation and reconciliation",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Borrows
        borrows::request_borrow,
        borrows::get_borrow,
        borrows::list_incoming,
        borrows::list_active,
        borrows::list_history,
        borrows::accept,
        borrows::reject,
        borrows::receive,
        borrows::complete,
        borrows::cancel,
        borrows::report,
        borrows::resolve_report,
        // Meetups
        meetups::confirm,
        meetups::suggest,
        meetups::confirm_suggestion,
        meetups::reject_suggestion,
        // Returns
        returns::suggest,
        returns::confirm_suggestion,
        returns::reject_suggestion,
        // Sweeps
        sweeps::run_all,
        sweeps::run_one,
    ),
    components(
        schemas(
            // Borrows
            borrows::CreateBorrowRequest,
            borrows::AcceptRequest,
            borrows::ReceiveRequest,
            borrows::ReasonRequest,
            crate::models::BorrowEvent,
            crate::models::BorrowEventDetails,
            crate::models::BorrowStatus,
            crate::models::Party,
            crate::models::CancelReason,
            crate::models::RejectReason,
            crate::models::Report,
            // Meetups
            meetups::SuggestMeetupRequest,
            crate::models::MeetupDetail,
            crate::models::MeetupDetails,
            crate::models::MeetupStatus,
            crate::models::MeetupSuggestion,
            crate::models::SuggestionStatus,
            // Returns
            returns::SuggestReturnRequest,
            crate::models::ReturnDetail,
            crate::models::ReturnDetails,
            crate::models::ReturnStatus,
            crate::models::ReturnSuggestion,
            // Sweeps
            crate::models::Sweep,
            crate::models::SweepReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "borrows", description = "Borrow lifecycle"),
        (name = "meetups", description = "Meetup negotiation"),
        (name = "returns", description = "Return negotiation"),
        (name = "sweeps", description = "Reconciliation sweeps")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
