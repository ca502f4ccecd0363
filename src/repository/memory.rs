//! In-process borrow store
//!
//! Backs `database.url = "memory"` and the test suites. A transaction takes
//! the state lock for its whole lifetime and works on a copy; commit swaps
//! the copy in, drop throws it away.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::{AppError, AppResult},
    models::{
        Availability, BookRef, BorrowEvent, BorrowEventDetails, BorrowStatus, CancelReason,
        MeetupDetail, MeetupDetails, MeetupStatus, MeetupSuggestion, NewBorrowEvent,
        NewMeetupSuggestion, NewReturnSuggestion, Party, RejectReason, Report, ReturnDetail,
        ReturnDetails, ReturnStatus, ReturnSuggestion, SuggestionStatus, Sweep,
    },
};

use super::{BorrowStore, BorrowTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    books: BTreeMap<i64, BookRef>,
    events: BTreeMap<i64, BorrowEvent>,
    /// Keyed by meetup detail id
    meetups: BTreeMap<i64, MeetupDetail>,
    meetup_suggestions: BTreeMap<i64, MeetupSuggestion>,
    meetup_history: BTreeMap<i64, Vec<SuggestionStatus>>,
    /// Keyed by return detail id
    returns: BTreeMap<i64, ReturnDetail>,
    return_suggestions: BTreeMap<i64, ReturnSuggestion>,
    return_history: BTreeMap<i64, Vec<SuggestionStatus>>,
    /// Terminal records, keyed by event id
    cancel_reasons: BTreeMap<i64, CancelReason>,
    reject_reasons: BTreeMap<i64, RejectReason>,
    reports: BTreeMap<i64, Report>,
    /// Events whose status writes fail
    failing: BTreeSet<i64>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn meetup_of(&self, event_id: i64) -> Option<&MeetupDetail> {
        self.meetups.values().find(|m| m.borrow_event_id == event_id)
    }

    fn return_of(&self, event_id: i64) -> Option<&ReturnDetail> {
        self.returns.values().find(|r| r.borrow_event_id == event_id)
    }

    fn meetup_suggestions_of(&self, meetup_id: i64) -> Vec<MeetupSuggestion> {
        let mut list: Vec<_> = self
            .meetup_suggestions
            .values()
            .filter(|s| s.meetup_detail_id == meetup_id)
            .cloned()
            .collect();
        list.sort_by_key(|s| (s.created_at, s.id));
        list
    }

    fn return_suggestions_of(&self, return_id: i64) -> Vec<ReturnSuggestion> {
        let mut list: Vec<_> = self
            .return_suggestions
            .values()
            .filter(|s| s.return_detail_id == return_id)
            .cloned()
            .collect();
        list.sort_by_key(|s| (s.created_at, s.id));
        list
    }

    fn details(&self, event_id: i64) -> Option<BorrowEventDetails> {
        let event = self.events.get(&event_id)?.clone();

        let meetup = self.meetup_of(event_id).map(|detail| MeetupDetails {
            suggestions: self.meetup_suggestions_of(detail.id),
            detail: detail.clone(),
        });
        let return_detail = self.return_of(event_id).map(|detail| ReturnDetails {
            suggestions: self.return_suggestions_of(detail.id),
            detail: detail.clone(),
        });

        Some(BorrowEventDetails {
            event,
            meetup,
            return_detail,
            reject_reason: self.reject_reasons.get(&event_id).cloned(),
            cancel_reason: self.cancel_reasons.get(&event_id).cloned(),
            report: self.reports.get(&event_id).cloned(),
        })
    }
}

/// Borrow store kept entirely in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an available book and return its id
    pub async fn add_book(&self, owner_id: i64) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.books.insert(
            id,
            BookRef {
                id,
                owner_id,
                availability: Availability::Available,
            },
        );
        id
    }

    pub async fn availability(&self, book_id: i64) -> Option<Availability> {
        let state = self.state.lock().await;
        state.books.get(&book_id).map(|b| b.availability)
    }

    /// Overwrite a book's availability outside the lifecycle
    pub async fn set_book_availability(&self, book_id: i64, availability: Availability) {
        let mut state = self.state.lock().await;
        if let Some(book) = state.books.get_mut(&book_id) {
            book.availability = availability;
        }
    }

    /// Full status history of a meetup suggestion, oldest first
    pub async fn meetup_suggestion_history(&self, suggestion_id: i64) -> Vec<SuggestionStatus> {
        let state = self.state.lock().await;
        state
            .meetup_history
            .get(&suggestion_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Full status history of a return suggestion, oldest first
    pub async fn return_suggestion_history(&self, suggestion_id: i64) -> Vec<SuggestionStatus> {
        let state = self.state.lock().await;
        state
            .return_history
            .get(&suggestion_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every status write on `event_id` fail
    pub async fn inject_failure(&self, event_id: i64) {
        let mut state = self.state.lock().await;
        state.failing.insert(event_id);
    }

    /// Overwrite the dates of an event's meetup detail
    pub async fn set_meetup_dates(&self, event_id: i64, start_date: NaiveDate, end_date: NaiveDate) {
        let mut state = self.state.lock().await;
        if let Some(m) = state
            .meetups
            .values_mut()
            .find(|m| m.borrow_event_id == event_id)
        {
            m.start_date = start_date;
            m.end_date = end_date;
        }
    }

    pub async fn event_count(&self) -> usize {
        self.state.lock().await.events.len()
    }
}

#[async_trait]
impl BorrowStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn begin(&self) -> AppResult<Box<dyn BorrowTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = (*guard).clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            work,
        }))
    }

    async fn event_details(&self, event_id: i64) -> AppResult<Option<BorrowEventDetails>> {
        let state = self.state.lock().await;
        Ok(state.details(event_id))
    }

    async fn list_events(
        &self,
        user_id: i64,
        party: Party,
        statuses: &[BorrowStatus],
    ) -> AppResult<Vec<BorrowEvent>> {
        let state = self.state.lock().await;
        let mut list: Vec<BorrowEvent> = state
            .events
            .values()
            .filter(|e| e.party_of(user_id) == Some(party) && statuses.contains(&e.status))
            .cloned()
            .collect();
        list.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(list)
    }

    async fn sweep_candidates(&self, sweep: Sweep, today: NaiveDate) -> AppResult<Vec<i64>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .values()
            .filter(|e| {
                sweep.matches(e, state.meetup_of(e.id), state.return_of(e.id), today)
            })
            .map(|e| e.id)
            .collect())
    }
}

/// Transaction over a private copy of the store state.
///
/// The guard is released on commit so the store can be read again while
/// the handle is still in scope.
pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    work: MemoryState,
}

impl MemoryTx {
    fn state(&mut self) -> AppResult<&mut MemoryState> {
        if self.guard.is_none() {
            return Err(AppError::Internal(
                "Transaction already committed".to_string(),
            ));
        }
        Ok(&mut self.work)
    }
}

fn suggestion_missing(id: i64) -> AppError {
    AppError::NotFound(format!("Suggestion {} not found", id))
}

#[async_trait]
impl BorrowTx for MemoryTx {
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<BookRef>> {
        Ok(self.state()?.books.get(&book_id).cloned())
    }

    async fn set_availability(&mut self, book_id: i64, availability: Availability) -> AppResult<()> {
        if let Some(book) = self.state()?.books.get_mut(&book_id) {
            book.availability = availability;
        }
        Ok(())
    }

    async fn count_holding_events(&mut self, book_id: i64, except_event_id: i64) -> AppResult<i64> {
        let state = self.state()?;
        Ok(state
            .events
            .values()
            .filter(|e| e.book_id == book_id && e.id != except_event_id && e.status.holds_book())
            .count() as i64)
    }

    async fn lock_borrower(&mut self, _borrower_id: i64) -> AppResult<()> {
        // The state lock already serializes every transaction
        self.state().map(|_| ())
    }

    async fn count_active_borrows(&mut self, borrower_id: i64) -> AppResult<i64> {
        let state = self.state()?;
        Ok(state
            .events
            .values()
            .filter(|e| e.borrower_id == borrower_id && e.status.is_active())
            .count() as i64)
    }

    async fn has_active_borrow_of(&mut self, borrower_id: i64, book_id: i64) -> AppResult<bool> {
        let state = self.state()?;
        Ok(state
            .events
            .values()
            .any(|e| e.borrower_id == borrower_id && e.book_id == book_id && e.status.is_active()))
    }

    async fn insert_event(&mut self, event: &NewBorrowEvent) -> AppResult<BorrowEvent> {
        let state = self.state()?;
        let id = state.next_id();
        let created = BorrowEvent {
            id,
            borrower_id: event.borrower_id,
            lender_id: event.lender_id,
            book_id: event.book_id,
            status: BorrowStatus::Pending,
            created_at: event.created_at,
            status_updated_at: event.created_at,
        };
        state.events.insert(id, created.clone());
        Ok(created)
    }

    async fn lock_event(&mut self, event_id: i64) -> AppResult<Option<BorrowEvent>> {
        Ok(self.state()?.events.get(&event_id).cloned())
    }

    async fn set_status(
        &mut self,
        event_id: i64,
        status: BorrowStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let state = self.state()?;
        if state.failing.contains(&event_id) {
            return Err(AppError::Internal(format!(
                "Injected failure on borrow event {}",
                event_id
            )));
        }
        let event = state.events.get_mut(&event_id).ok_or_else(|| {
            AppError::NotFound(format!("Status of borrow event {} not found", event_id))
        })?;
        event.status = status;
        event.status_updated_at = at;
        Ok(())
    }

    async fn insert_meetup_detail(
        &mut self,
        event_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AppResult<MeetupDetail> {
        let state = self.state()?;
        let id = state.next_id();
        let detail = MeetupDetail {
            id,
            borrow_event_id: event_id,
            start_date,
            end_date,
            final_time: None,
            final_location: None,
            status: MeetupStatus::Pending,
        };
        state.meetups.insert(id, detail.clone());
        Ok(detail)
    }

    async fn meetup_detail(&mut self, event_id: i64) -> AppResult<Option<MeetupDetail>> {
        Ok(self.state()?.meetup_of(event_id).cloned())
    }

    async fn set_meetup_final(
        &mut self,
        meetup_id: i64,
        time: NaiveTime,
        location: &str,
    ) -> AppResult<()> {
        if let Some(m) = self.state()?.meetups.get_mut(&meetup_id) {
            m.final_time = Some(time);
            m.final_location = Some(location.to_string());
        }
        Ok(())
    }

    async fn set_meetup_status(&mut self, meetup_id: i64, status: MeetupStatus) -> AppResult<()> {
        if let Some(m) = self.state()?.meetups.get_mut(&meetup_id) {
            m.status = status;
        }
        Ok(())
    }

    async fn meetup_suggestions(&mut self, meetup_id: i64) -> AppResult<Vec<MeetupSuggestion>> {
        Ok(self.state()?.meetup_suggestions_of(meetup_id))
    }

    async fn insert_meetup_suggestion(
        &mut self,
        suggestion: &NewMeetupSuggestion,
    ) -> AppResult<MeetupSuggestion> {
        let state = self.state()?;
        let id = state.next_id();
        let created = MeetupSuggestion {
            id,
            meetup_detail_id: suggestion.meetup_detail_id,
            suggested_by: suggestion.suggested_by,
            suggested_time: suggestion.suggested_time,
            suggested_location: suggestion.suggested_location.clone(),
            suggested_reason: suggestion.suggested_reason.clone(),
            created_at: suggestion.created_at,
            status: SuggestionStatus::Pending,
        };
        state.meetup_suggestions.insert(id, created.clone());
        state.meetup_history.insert(id, vec![SuggestionStatus::Pending]);
        Ok(created)
    }

    async fn push_meetup_suggestion_status(
        &mut self,
        suggestion_id: i64,
        status: SuggestionStatus,
        _at: DateTime<Utc>,
    ) -> AppResult<()> {
        let state = self.state()?;
        let suggestion = state
            .meetup_suggestions
            .get_mut(&suggestion_id)
            .ok_or_else(|| suggestion_missing(suggestion_id))?;
        suggestion.status = status;
        state
            .meetup_history
            .entry(suggestion_id)
            .or_default()
            .push(status);
        Ok(())
    }

    async fn insert_return_detail(
        &mut self,
        event_id: i64,
        return_date: NaiveDate,
    ) -> AppResult<ReturnDetail> {
        let state = self.state()?;
        let id = state.next_id();
        let detail = ReturnDetail {
            id,
            borrow_event_id: event_id,
            return_date,
            return_time: None,
            return_location: None,
            status: ReturnStatus::Pending,
        };
        state.returns.insert(id, detail.clone());
        Ok(detail)
    }

    async fn return_detail(&mut self, event_id: i64) -> AppResult<Option<ReturnDetail>> {
        Ok(self.state()?.return_of(event_id).cloned())
    }

    async fn set_return_handoff(
        &mut self,
        return_id: i64,
        time: NaiveTime,
        location: &str,
    ) -> AppResult<()> {
        if let Some(r) = self.state()?.returns.get_mut(&return_id) {
            r.return_time = Some(time);
            r.return_location = Some(location.to_string());
        }
        Ok(())
    }

    async fn set_return_status(&mut self, return_id: i64, status: ReturnStatus) -> AppResult<()> {
        if let Some(r) = self.state()?.returns.get_mut(&return_id) {
            r.status = status;
        }
        Ok(())
    }

    async fn return_suggestions(&mut self, return_id: i64) -> AppResult<Vec<ReturnSuggestion>> {
        Ok(self.state()?.return_suggestions_of(return_id))
    }

    async fn insert_return_suggestion(
        &mut self,
        suggestion: &NewReturnSuggestion,
    ) -> AppResult<ReturnSuggestion> {
        let state = self.state()?;
        let id = state.next_id();
        let created = ReturnSuggestion {
            id,
            return_detail_id: suggestion.return_detail_id,
            suggested_by: suggestion.suggested_by,
            suggested_time: suggestion.suggested_time,
            suggested_location: suggestion.suggested_location.clone(),
            created_at: suggestion.created_at,
            status: SuggestionStatus::Pending,
        };
        state.return_suggestions.insert(id, created.clone());
        state.return_history.insert(id, vec![SuggestionStatus::Pending]);
        Ok(created)
    }

    async fn push_return_suggestion_status(
        &mut self,
        suggestion_id: i64,
        status: SuggestionStatus,
        _at: DateTime<Utc>,
    ) -> AppResult<()> {
        let state = self.state()?;
        let suggestion = state
            .return_suggestions
            .get_mut(&suggestion_id)
            .ok_or_else(|| suggestion_missing(suggestion_id))?;
        suggestion.status = status;
        state
            .return_history
            .entry(suggestion_id)
            .or_default()
            .push(status);
        Ok(())
    }

    async fn delete_negotiation(&mut self, event_id: i64) -> AppResult<()> {
        let state = self.state()?;

        let meetup_ids: Vec<i64> = state
            .meetups
            .values()
            .filter(|m| m.borrow_event_id == event_id)
            .map(|m| m.id)
            .collect();
        for meetup_id in meetup_ids {
            state.meetups.remove(&meetup_id);
            let doomed: Vec<i64> = state
                .meetup_suggestions
                .values()
                .filter(|s| s.meetup_detail_id == meetup_id)
                .map(|s| s.id)
                .collect();
            for id in doomed {
                state.meetup_suggestions.remove(&id);
                state.meetup_history.remove(&id);
            }
        }

        let return_ids: Vec<i64> = state
            .returns
            .values()
            .filter(|r| r.borrow_event_id == event_id)
            .map(|r| r.id)
            .collect();
        for return_id in return_ids {
            state.returns.remove(&return_id);
            let doomed: Vec<i64> = state
                .return_suggestions
                .values()
                .filter(|s| s.return_detail_id == return_id)
                .map(|s| s.id)
                .collect();
            for id in doomed {
                state.return_suggestions.remove(&id);
                state.return_history.remove(&id);
            }
        }

        Ok(())
    }

    async fn insert_cancel_reason(
        &mut self,
        event_id: i64,
        cancelled_by: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<CancelReason> {
        let state = self.state()?;
        if state.cancel_reasons.contains_key(&event_id) {
            return Err(AppError::Conflict(format!(
                "Borrow event {} already has a cancel reason",
                event_id
            )));
        }
        let record = CancelReason {
            id: state.next_id(),
            borrow_event_id: event_id,
            cancelled_by,
            reason: reason.to_string(),
            created_at: at,
        };
        state.cancel_reasons.insert(event_id, record.clone());
        Ok(record)
    }

    async fn insert_reject_reason(
        &mut self,
        event_id: i64,
        rejected_by: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<RejectReason> {
        let state = self.state()?;
        if state.reject_reasons.contains_key(&event_id) {
            return Err(AppError::Conflict(format!(
                "Borrow event {} already has a reject reason",
                event_id
            )));
        }
        let record = RejectReason {
            id: state.next_id(),
            borrow_event_id: event_id,
            rejected_by,
            reason: reason.to_string(),
            created_at: at,
        };
        state.reject_reasons.insert(event_id, record.clone());
        Ok(record)
    }

    async fn insert_report(
        &mut self,
        event_id: i64,
        reported_by: Option<i64>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Report> {
        let state = self.state()?;
        if state.reports.contains_key(&event_id) {
            return Err(AppError::Conflict(format!(
                "Borrow event {} already has a report",
                event_id
            )));
        }
        let record = Report {
            id: state.next_id(),
            borrow_event_id: event_id,
            reported_by,
            reason: reason.to_string(),
            resolved: false,
            created_at: at,
        };
        state.reports.insert(event_id, record.clone());
        Ok(record)
    }

    async fn resolve_report(&mut self, event_id: i64) -> AppResult<bool> {
        match self.state()?.reports.get_mut(&event_id) {
            Some(report) => {
                report.resolved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn commit(&mut self) -> AppResult<()> {
        let mut guard = self.guard.take().ok_or_else(|| {
            AppError::Internal("Transaction already committed".to_string())
        })?;
        *guard = std::mem::take(&mut self.work);
        Ok(())
    }
}
