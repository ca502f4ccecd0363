//! Return handoff negotiation records

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::{ReturnStatus, SuggestionStatus};

/// Scheduled return and agreed handoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnDetail {
    pub id: i64,
    pub borrow_event_id: i64,
    pub return_date: NaiveDate,
    #[schema(value_type = Option<String>, example = "16:00:00")]
    pub return_time: Option<NaiveTime>,
    pub return_location: Option<String>,
    pub status: ReturnStatus,
}

/// Counter-proposal for the return; `status` is the latest history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnSuggestion {
    pub id: i64,
    pub return_detail_id: i64,
    pub suggested_by: i64,
    #[schema(value_type = String, example = "09:15:00")]
    pub suggested_time: NaiveTime,
    pub suggested_location: String,
    pub created_at: DateTime<Utc>,
    pub status: SuggestionStatus,
}

/// Insert payload for a return suggestion
#[derive(Debug, Clone)]
pub struct NewReturnSuggestion {
    pub return_detail_id: i64,
    pub suggested_by: i64,
    pub suggested_time: NaiveTime,
    pub suggested_location: String,
    pub created_at: DateTime<Utc>,
}

/// Return detail with its suggestions, oldest first
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnDetails {
    pub detail: ReturnDetail,
    pub suggestions: Vec<ReturnSuggestion>,
}
