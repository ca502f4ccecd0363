//! ShelfShare Server - peer-to-peer book lending
//!
//! REST API server for the borrow lifecycle.

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfshare_server::{
    api,
    clock::SystemClock,
    config::AppConfig,
    repository::{MemoryStore, Repository},
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("shelfshare_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting ShelfShare Server v{}", env!("CARGO_PKG_VERSION"));

    let repository = if config.database.url == "memory" {
        tracing::warn!("Using the in-memory borrow store; nothing will be persisted");
        Repository::with_store(Arc::new(MemoryStore::new()))
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await?;

        tracing::info!("Connected to database");

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Database migrations completed");
        Repository::new(pool)
    };

    let services = Services::new(repository, &config.borrowing, Arc::new(SystemClock))?;

    if config.scheduler.enabled {
        let interval = Duration::from_secs(config.scheduler.interval_secs.max(1));
        tracing::info!("Sweep scheduler running every {:?}", interval);
        services.sweeps.clone().spawn_scheduler(interval);
    }

    // Save server address before moving config
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state);

    let addr = SocketAddr::new(server_host.parse()?, server_port);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Borrow lifecycle
        .route("/borrows", post(api::borrows::request_borrow))
        .route("/borrows/incoming", get(api::borrows::list_incoming))
        .route("/borrows/active", get(api::borrows::list_active))
        .route("/borrows/history", get(api::borrows::list_history))
        .route("/borrows/:id", get(api::borrows::get_borrow))
        .route("/borrows/:id/accept", post(api::borrows::accept))
        .route("/borrows/:id/reject", post(api::borrows::reject))
        .route("/borrows/:id/receive", post(api::borrows::receive))
        .route("/borrows/:id/complete", post(api::borrows::complete))
        .route("/borrows/:id/cancel", post(api::borrows::cancel))
        .route("/borrows/:id/report", post(api::borrows::report))
        .route("/borrows/:id/report/resolve", post(api::borrows::resolve_report))
        // Meetup negotiation
        .route("/borrows/:id/meetup/confirm", post(api::meetups::confirm))
        .route("/borrows/:id/meetup/suggestions", post(api::meetups::suggest))
        .route(
            "/borrows/:id/meetup/suggestions/confirm",
            post(api::meetups::confirm_suggestion),
        )
        .route(
            "/borrows/:id/meetup/suggestions/reject",
            post(api::meetups::reject_suggestion),
        )
        // Return negotiation
        .route("/borrows/:id/return/suggestions", post(api::returns::suggest))
        .route(
            "/borrows/:id/return/suggestions/confirm",
            post(api::returns::confirm_suggestion),
        )
        .route(
            "/borrows/:id/return/suggestions/reject",
            post(api::returns::reject_suggestion),
        )
        // Sweeps
        .route("/admin/sweeps", post(api::sweeps::run_all))
        .route("/admin/sweeps/:name", post(api::sweeps::run_one))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
