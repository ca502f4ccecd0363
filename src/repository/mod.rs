//! Repository layer for borrow lifecycle persistence
//!
//! Services talk to storage through [`BorrowStore`] and the transactional
//! handle it hands out, [`BorrowTx`]. Every mutation happens on a handle;
//! dropping a handle without calling [`BorrowTx::commit`] discards all of
//! its writes.

pub mod borrows;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        Availability, BookRef, BorrowEvent, BorrowEventDetails, BorrowStatus, CancelReason,
        MeetupDetail, MeetupStatus, MeetupSuggestion, NewBorrowEvent, NewMeetupSuggestion,
        NewReturnSuggestion, Party, RejectReason, Report, ReturnDetail, ReturnStatus,
        ReturnSuggestion, SuggestionStatus, Sweep,
    },
};

pub use borrows::PgBorrowStore;
pub use memory::MemoryStore;

/// Entry point to borrow lifecycle storage
#[async_trait]
pub trait BorrowStore: Send + Sync {
    /// Check that storage answers
    async fn ping(&self) -> AppResult<()>;

    /// Open a transaction
    async fn begin(&self) -> AppResult<Box<dyn BorrowTx>>;

    /// Full aggregate of one event, outside any transaction
    async fn event_details(&self, event_id: i64) -> AppResult<Option<BorrowEventDetails>>;

    /// Events where `user_id` is on the given side, newest first
    async fn list_events(
        &self,
        user_id: i64,
        party: Party,
        statuses: &[BorrowStatus],
    ) -> AppResult<Vec<BorrowEvent>>;

    /// Ids of the events a sweep should look at on `today`, oldest first
    async fn sweep_candidates(&self, sweep: Sweep, today: NaiveDate) -> AppResult<Vec<i64>>;
}

/// Transactional handle over the borrow lifecycle tables
#[async_trait]
pub trait BorrowTx: Send {
    // ---- Books ----

    /// Book owner and availability, locked until the transaction ends
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<BookRef>>;

    async fn set_availability(&mut self, book_id: i64, availability: Availability) -> AppResult<()>;

    /// Other events on the book in a status that keeps the book out
    async fn count_holding_events(&mut self, book_id: i64, except_event_id: i64) -> AppResult<i64>;

    // ---- Borrowers ----

    /// Serialize request creation for one borrower
    async fn lock_borrower(&mut self, borrower_id: i64) -> AppResult<()>;

    async fn count_active_borrows(&mut self, borrower_id: i64) -> AppResult<i64>;

    async fn has_active_borrow_of(&mut self, borrower_id: i64, book_id: i64) -> AppResult<bool>;

    // ---- Events ----

    /// Insert the event together with its status cell set to Pending
    async fn insert_event(&mut self, event: &NewBorrowEvent) -> AppResult<BorrowEvent>;

    /// Event and status, locked until the transaction ends
    async fn lock_event(&mut self, event_id: i64) -> AppResult<Option<BorrowEvent>>;

    /// Overwrite the status cell
    async fn set_status(
        &mut self,
        event_id: i64,
        status: BorrowStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    // ---- Meetup negotiation ----

    /// Insert the meetup detail with its status cell set to Pending
    async fn insert_meetup_detail(
        &mut self,
        event_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AppResult<MeetupDetail>;

    async fn meetup_detail(&mut self, event_id: i64) -> AppResult<Option<MeetupDetail>>;

    async fn set_meetup_final(
        &mut self,
        meetup_id: i64,
        time: NaiveTime,
        location: &str,
    ) -> AppResult<()>;

    async fn set_meetup_status(&mut self, meetup_id: i64, status: MeetupStatus) -> AppResult<()>;

    /// Suggestions oldest first, each carrying its latest status row
    async fn meetup_suggestions(&mut self, meetup_id: i64) -> AppResult<Vec<MeetupSuggestion>>;

    /// Insert a suggestion and its first (Pending) status row
    async fn insert_meetup_suggestion(
        &mut self,
        suggestion: &NewMeetupSuggestion,
    ) -> AppResult<MeetupSuggestion>;

    /// Append a status row to a suggestion's history
    async fn push_meetup_suggestion_status(
        &mut self,
        suggestion_id: i64,
        status: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    // ---- Return negotiation ----

    /// Insert the return detail with its status cell set to Pending
    async fn insert_return_detail(
        &mut self,
        event_id: i64,
        return_date: NaiveDate,
    ) -> AppResult<ReturnDetail>;

    async fn return_detail(&mut self, event_id: i64) -> AppResult<Option<ReturnDetail>>;

    async fn set_return_handoff(
        &mut self,
        return_id: i64,
        time: NaiveTime,
        location: &str,
    ) -> AppResult<()>;

    async fn set_return_status(&mut self, return_id: i64, status: ReturnStatus) -> AppResult<()>;

    /// Suggestions oldest first, each carrying its latest status row
    async fn return_suggestions(&mut self, return_id: i64) -> AppResult<Vec<ReturnSuggestion>>;

    /// Insert a suggestion and its first (Pending) status row
    async fn insert_return_suggestion(
        &mut self,
        suggestion: &NewReturnSuggestion,
    ) -> AppResult<ReturnSuggestion>;

    /// Append a status row to a suggestion's history
    async fn push_return_suggestion_status(
        &mut self,
        suggestion_id: i64,
        status: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Drop meetup and return details, their status cells and suggestions
    async fn delete_negotiation(&mut self, event_id: i64) -> AppResult<()>;

    // ---- Terminal records ----

    async fn insert_cancel_reason(
        &mut self,
        event_id: i64,
        cancelled_by: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<CancelReason>;

    async fn insert_reject_reason(
        &mut self,
        event_id: i64,
        rejected_by: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<RejectReason>;

    async fn insert_report(
        &mut self,
        event_id: i64,
        reported_by: Option<i64>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Report>;

    /// Mark the event's report resolved; `false` when there is none
    async fn resolve_report(&mut self, event_id: i64) -> AppResult<bool>;

    /// Make every write of this handle visible at once
    async fn commit(&mut self) -> AppResult<()>;
}

/// Storage handles shared by all services
#[derive(Clone)]
pub struct Repository {
    pub borrows: Arc<dyn BorrowStore>,
}

impl Repository {
    /// Create a repository backed by Postgres
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            borrows: Arc::new(PgBorrowStore::new(pool)),
        }
    }

    /// Create a repository over any store implementation
    pub fn with_store(store: Arc<dyn BorrowStore>) -> Self {
        Self { borrows: store }
    }
}
