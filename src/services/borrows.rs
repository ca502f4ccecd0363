//! Borrow lifecycle service: requests, acceptance, handoffs, termination

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        Availability, BorrowEvent, BorrowEventDetails, BorrowRequest, BorrowStatus,
        EventListing, NewBorrowEvent, Party, Report, ReturnStatus, UserClaims,
    },
    repository::{BorrowTx, Repository},
};

use super::{parse_time, required_text, LendingRules};

/// Statuses a dispute may be opened from
const REPORTABLE: [BorrowStatus; 3] = [
    BorrowStatus::Accepted,
    BorrowStatus::InProgress,
    BorrowStatus::ReadyForReturn,
];

#[derive(Clone)]
pub struct BorrowService {
    repository: Repository,
    rules: LendingRules,
    clock: Arc<dyn Clock>,
}

impl BorrowService {
    pub fn new(repository: Repository, rules: LendingRules, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            rules,
            clock,
        }
    }

    /// Open a borrow request on someone else's available book
    pub async fn request_borrow(
        &self,
        borrower_id: i64,
        request: BorrowRequest,
    ) -> AppResult<BorrowEvent> {
        self.rules
            .check_borrow_dates(request.start_date, request.end_date, self.clock.today())?;
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        tx.lock_borrower(borrower_id).await?;

        let book = tx
            .lock_book(request.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", request.book_id)))?;

        if tx.has_active_borrow_of(borrower_id, book.id).await? {
            return Err(AppError::Conflict(
                "You already have an active request for this book".to_string(),
            ));
        }
        let active = tx.count_active_borrows(borrower_id).await?;
        if active >= self.rules.max_active_borrows {
            tracing::debug!(borrower_id, active, "Borrow request refused at cap");
            return Err(AppError::LimitExceeded(format!(
                "You cannot have more than {} active borrow requests",
                self.rules.max_active_borrows
            )));
        }
        if book.availability != Availability::Available {
            return Err(AppError::Conflict(format!(
                "Book {} is not available",
                book.id
            )));
        }
        if book.owner_id == borrower_id {
            return Err(AppError::Validation(
                "You cannot borrow your own book".to_string(),
            ));
        }

        let event = tx
            .insert_event(&NewBorrowEvent {
                borrower_id,
                lender_id: book.owner_id,
                book_id: book.id,
                created_at: now,
            })
            .await?;
        tx.insert_meetup_detail(event.id, request.start_date, request.end_date)
            .await?;
        tx.insert_return_detail(event.id, request.end_date).await?;
        tx.commit().await?;

        tracing::info!(
            event_id = event.id,
            borrower_id,
            book_id = book.id,
            "Borrow requested"
        );
        Ok(event)
    }

    /// Lender accepts a pending request and fixes the first handoff
    pub async fn accept_and_set_meetup(
        &self,
        lender_id: i64,
        event_id: i64,
        final_time: &str,
        final_location: &str,
    ) -> AppResult<BorrowEvent> {
        let time = parse_time(final_time)?;
        self.rules.check_handoff_window(time)?;
        let location = required_text("Meetup location", final_location)?;
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let mut event = load_event(&mut *tx, event_id).await?;
        require_lender(&event, lender_id)?;
        require_status(&event, &[BorrowStatus::Pending], "accepted")?;

        let book = tx
            .lock_book(event.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", event.book_id)))?;
        if book.availability != Availability::Available {
            return Err(AppError::Conflict(format!(
                "Book {} is already lent out",
                book.id
            )));
        }

        let meetup = tx
            .meetup_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Meetup", event.id))?;
        tx.set_meetup_final(meetup.id, time, &location).await?;
        tx.set_availability(book.id, Availability::Unavailable)
            .await?;
        tx.set_status(event.id, BorrowStatus::Accepted, now).await?;
        tx.commit().await?;

        event.status = BorrowStatus::Accepted;
        event.status_updated_at = now;
        tracing::info!(event_id, lender_id, "Borrow request accepted");
        Ok(event)
    }

    /// Lender turns a pending request down
    pub async fn reject_request(
        &self,
        lender_id: i64,
        event_id: i64,
        reason: &str,
    ) -> AppResult<BorrowEvent> {
        let reason = required_text("Reason", reason)?;
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let mut event = load_event(&mut *tx, event_id).await?;
        require_lender(&event, lender_id)?;
        require_status(&event, &[BorrowStatus::Pending], "rejected")?;

        tx.set_status(event.id, BorrowStatus::Rejected, now).await?;
        release_book(&mut *tx, &event).await?;
        tx.insert_reject_reason(event.id, lender_id, &reason, now)
            .await?;
        tx.commit().await?;

        event.status = BorrowStatus::Rejected;
        event.status_updated_at = now;
        tracing::info!(event_id, lender_id, "Borrow request rejected");
        Ok(event)
    }

    /// Borrower picked the book up and sets the return handoff
    pub async fn receive_book_and_set_return(
        &self,
        borrower_id: i64,
        event_id: i64,
        return_time: &str,
        return_location: &str,
    ) -> AppResult<BorrowEvent> {
        let time = parse_time(return_time)?;
        let location = required_text("Return location", return_location)?;
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let mut event = load_event(&mut *tx, event_id).await?;
        require_borrower(&event, borrower_id)?;
        require_status(&event, &[BorrowStatus::Accepted], "marked as received")?;

        let detail = tx
            .return_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Return", event.id))?;
        if detail.status != ReturnStatus::Pending {
            return Err(AppError::State(format!(
                "Return details of borrow event {} are already set",
                event.id
            )));
        }

        tx.set_return_handoff(detail.id, time, &location).await?;
        tx.set_return_status(detail.id, ReturnStatus::AwaitingConfirmation)
            .await?;
        tx.set_status(event.id, BorrowStatus::InProgress, now)
            .await?;
        tx.commit().await?;

        event.status = BorrowStatus::InProgress;
        event.status_updated_at = now;
        tracing::info!(event_id, borrower_id, "Book received by borrower");
        Ok(event)
    }

    /// Lender got the book back; closes the event
    pub async fn confirm_received_book(
        &self,
        lender_id: i64,
        event_id: i64,
    ) -> AppResult<BorrowEvent> {
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let mut event = load_event(&mut *tx, event_id).await?;
        require_lender(&event, lender_id)?;
        require_active(&event, "completed")?;

        tx.set_status(event.id, BorrowStatus::Completed, now)
            .await?;
        release_book(&mut *tx, &event).await?;
        tx.commit().await?;

        event.status = BorrowStatus::Completed;
        event.status_updated_at = now;
        tracing::info!(event_id, lender_id, "Book returned to lender");
        Ok(event)
    }

    /// Either party walks away from a non-terminal event
    pub async fn cancel_event(
        &self,
        user_id: i64,
        event_id: i64,
        reason: &str,
    ) -> AppResult<BorrowEvent> {
        let reason = required_text("Reason", reason)?;
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let mut event = load_event(&mut *tx, event_id).await?;
        require_party(&event, user_id)?;

        cancel_locked(&mut *tx, &event, user_id, &reason, now).await?;
        tx.commit().await?;

        event.status = BorrowStatus::Cancelled;
        event.status_updated_at = now;
        tracing::info!(event_id, user_id, "Borrow event cancelled");
        Ok(event)
    }

    /// Either party opens a dispute; the book stays out
    pub async fn report_event(
        &self,
        user_id: i64,
        event_id: i64,
        reason: &str,
    ) -> AppResult<Report> {
        let reason = required_text("Reason", reason)?;
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let event = load_event(&mut *tx, event_id).await?;
        require_party(&event, user_id)?;
        require_status(&event, &REPORTABLE, "reported")?;

        tx.set_status(event.id, BorrowStatus::Deposit, now).await?;
        let report = tx
            .insert_report(event.id, Some(user_id), &reason, now)
            .await?;
        tx.commit().await?;

        tracing::info!(event_id, user_id, "Borrow event reported");
        Ok(report)
    }

    /// Administrator closes a dispute
    pub async fn resolve_report(&self, admin: &UserClaims, event_id: i64) -> AppResult<Report> {
        admin.require_admin()?;

        let mut tx = self.repository.borrows.begin().await?;
        load_event(&mut *tx, event_id).await?;
        if !tx.resolve_report(event_id).await? {
            return Err(AppError::NotFound(format!(
                "Borrow event {} has no report",
                event_id
            )));
        }
        tx.commit().await?;

        tracing::info!(event_id, admin_id = admin.user_id, "Report resolved");
        self.repository
            .borrows
            .event_details(event_id)
            .await?
            .and_then(|details| details.report)
            .ok_or_else(|| AppError::NotFound(format!("Borrow event {} has no report", event_id)))
    }

    // ---- Read side ----

    /// Storage round-trip for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.borrows.ping().await
    }

    /// Full aggregate of an event; only its parties may see it
    pub async fn get_event(&self, user_id: i64, event_id: i64) -> AppResult<BorrowEventDetails> {
        self.repository
            .borrows
            .event_details(event_id)
            .await?
            .filter(|details| details.event.is_party(user_id))
            .ok_or_else(|| AppError::NotFound(format!("Borrow event {} not found", event_id)))
    }

    pub async fn list_incoming_requests(&self, lender_id: i64) -> AppResult<Vec<BorrowEvent>> {
        self.list(lender_id, EventListing::Incoming).await
    }

    pub async fn list_active_events(&self, user_id: i64) -> AppResult<Vec<BorrowEvent>> {
        self.list(user_id, EventListing::Active).await
    }

    pub async fn list_history(&self, user_id: i64) -> AppResult<Vec<BorrowEvent>> {
        self.list(user_id, EventListing::History).await
    }

    async fn list(&self, user_id: i64, listing: EventListing) -> AppResult<Vec<BorrowEvent>> {
        let mut events = Vec::new();
        for party in [Party::Borrower, Party::Lender] {
            let statuses = listing.statuses(party);
            if statuses.is_empty() {
                continue;
            }
            events.extend(
                self.repository
                    .borrows
                    .list_events(user_id, party, statuses)
                    .await?,
            );
        }
        events.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Transaction helpers shared with the negotiation and sweep services
// ---------------------------------------------------------------------------

/// Lock an event, NotFound when it does not exist
pub(crate) async fn load_event(tx: &mut dyn BorrowTx, event_id: i64) -> AppResult<BorrowEvent> {
    tx.lock_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Borrow event {} not found", event_id)))
}

/// Put the book back on the shelf unless another event still holds it
pub(crate) async fn release_book(tx: &mut dyn BorrowTx, event: &BorrowEvent) -> AppResult<()> {
    tx.lock_book(event.book_id).await?;
    if tx.count_holding_events(event.book_id, event.id).await? == 0 {
        tx.set_availability(event.book_id, Availability::Available)
            .await?;
    }
    Ok(())
}

/// Cancel a locked event, attributing it to `cancelled_by`
pub(crate) async fn cancel_locked(
    tx: &mut dyn BorrowTx,
    event: &BorrowEvent,
    cancelled_by: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    require_active(event, "cancelled")?;

    tx.set_status(event.id, BorrowStatus::Cancelled, now).await?;
    release_book(tx, event).await?;
    tx.delete_negotiation(event.id).await?;
    tx.insert_cancel_reason(event.id, cancelled_by, reason, now)
        .await?;
    Ok(())
}

pub(crate) fn require_lender(event: &BorrowEvent, user_id: i64) -> AppResult<()> {
    if event.lender_id != user_id {
        tracing::debug!(event_id = event.id, user_id, "Caller is not the lender");
        return Err(AppError::Authorization(
            "Only the lender can do this".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn require_borrower(event: &BorrowEvent, user_id: i64) -> AppResult<()> {
    if event.borrower_id != user_id {
        tracing::debug!(event_id = event.id, user_id, "Caller is not the borrower");
        return Err(AppError::Authorization(
            "Only the borrower can do this".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn require_party(event: &BorrowEvent, user_id: i64) -> AppResult<Party> {
    event.party_of(user_id).ok_or_else(|| {
        tracing::debug!(event_id = event.id, user_id, "Caller is not a party");
        AppError::Authorization("You are not part of this borrow event".to_string())
    })
}

pub(crate) fn require_status(
    event: &BorrowEvent,
    allowed: &[BorrowStatus],
    action: &str,
) -> AppResult<()> {
    if !allowed.contains(&event.status) {
        tracing::debug!(event_id = event.id, status = %event.status, "Illegal transition");
        return Err(AppError::State(format!(
            "Borrow event {} cannot be {} while {}",
            event.id, action, event.status
        )));
    }
    Ok(())
}

fn require_active(event: &BorrowEvent, action: &str) -> AppResult<()> {
    if event.status.is_terminal() {
        return Err(AppError::State(format!(
            "Borrow event {} cannot be {} while {}",
            event.id, action, event.status
        )));
    }
    Ok(())
}

pub(crate) fn missing_detail(kind: &str, event_id: i64) -> AppError {
    AppError::NotFound(format!("{} details of borrow event {} not found", kind, event_id))
}
