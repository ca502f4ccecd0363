//! Book reference as seen by the lending engine

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::Availability;

/// Owner and availability flag of a listed book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookRef {
    pub id: i64,
    pub owner_id: i64,
    pub availability: Availability,
}
