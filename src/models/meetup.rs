//! Meetup (loan start handoff) negotiation records

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::{MeetupStatus, SuggestionStatus};

/// Negotiated borrow window and agreed handoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MeetupDetail {
    pub id: i64,
    pub borrow_event_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[schema(value_type = Option<String>, example = "10:00:00")]
    pub final_time: Option<NaiveTime>,
    pub final_location: Option<String>,
    pub status: MeetupStatus,
}

/// Counter-proposal for the handoff; `status` is the latest history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MeetupSuggestion {
    pub id: i64,
    pub meetup_detail_id: i64,
    pub suggested_by: i64,
    #[schema(value_type = String, example = "14:30:00")]
    pub suggested_time: NaiveTime,
    pub suggested_location: String,
    pub suggested_reason: String,
    pub created_at: DateTime<Utc>,
    pub status: SuggestionStatus,
}

/// Insert payload for a meetup suggestion
#[derive(Debug, Clone)]
pub struct NewMeetupSuggestion {
    pub meetup_detail_id: i64,
    pub suggested_by: i64,
    pub suggested_time: NaiveTime,
    pub suggested_location: String,
    pub suggested_reason: String,
    pub created_at: DateTime<Utc>,
}

/// Meetup detail with its suggestions, oldest first
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MeetupDetails {
    pub detail: MeetupDetail,
    pub suggestions: Vec<MeetupSuggestion>,
}
