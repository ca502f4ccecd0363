//! Borrow event aggregate and its terminal records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::enums::BorrowStatus;
use super::meetup::MeetupDetails;
use super::return_detail::ReturnDetails;

/// Side of a borrow event a user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Borrower,
    Lender,
}

/// Borrow event with its current status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BorrowEvent {
    pub id: i64,
    pub borrower_id: i64,
    pub lender_id: i64,
    pub book_id: i64,
    pub status: BorrowStatus,
    pub created_at: DateTime<Utc>,
    pub status_updated_at: DateTime<Utc>,
}

impl BorrowEvent {
    /// Which side `user_id` is on, if any
    pub fn party_of(&self, user_id: i64) -> Option<Party> {
        if user_id == self.borrower_id {
            Some(Party::Borrower)
        } else if user_id == self.lender_id {
            Some(Party::Lender)
        } else {
            None
        }
    }

    pub fn is_party(&self, user_id: i64) -> bool {
        self.party_of(user_id).is_some()
    }
}

/// Insert payload for a new borrow event
#[derive(Debug, Clone)]
pub struct NewBorrowEvent {
    pub borrower_id: i64,
    pub lender_id: i64,
    pub book_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Borrow request input
#[derive(Debug, Clone)]
pub struct BorrowRequest {
    pub book_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Why and by whom an event was cancelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CancelReason {
    pub id: i64,
    pub borrow_event_id: i64,
    pub cancelled_by: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Why the lender rejected a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RejectReason {
    pub id: i64,
    pub borrow_event_id: i64,
    pub rejected_by: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Dispute report; `reported_by` is `None` for reports raised by a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Report {
    pub id: i64,
    pub borrow_event_id: i64,
    pub reported_by: Option<i64>,
    pub reason: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// Full view of one borrow event
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowEventDetails {
    pub event: BorrowEvent,
    /// Absent once the event has been cancelled
    pub meetup: Option<MeetupDetails>,
    /// Absent once the event has been cancelled
    pub return_detail: Option<ReturnDetails>,
    pub reject_reason: Option<RejectReason>,
    pub cancel_reason: Option<CancelReason>,
    pub report: Option<Report>,
}

/// Filter for the user-facing event listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventListing {
    /// Pending requests waiting on the user as lender
    Incoming,
    /// Non-terminal events the user takes part in
    Active,
    /// Rejected, completed and cancelled events
    History,
}

impl EventListing {
    /// Statuses listed for a user on the given side
    pub fn statuses(self, party: Party) -> &'static [BorrowStatus] {
        match (self, party) {
            (EventListing::Incoming, Party::Lender) => &[BorrowStatus::Pending],
            (EventListing::Incoming, Party::Borrower) => &[],
            (EventListing::Active, Party::Borrower) => &BorrowStatus::ACTIVE,
            (EventListing::Active, Party::Lender) => &BorrowStatus::HOLDING,
            (EventListing::History, _) => &BorrowStatus::TERMINAL,
        }
    }
}
