//! ShelfShare lending server
//!
//! Peer-to-peer book lending: the borrow lifecycle state machine, the meetup
//! and return negotiations, and the reconciliation sweeps that resolve
//! stalled events, exposed as a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
