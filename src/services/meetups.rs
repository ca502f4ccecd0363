//! Meetup negotiation: confirming the first handoff and counter-proposals

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        BorrowStatus, MeetupDetail, MeetupStatus, MeetupSuggestion, NewMeetupSuggestion,
        SuggestionStatus,
    },
    repository::Repository,
};

use super::{
    borrows::{load_event, missing_detail, require_borrower, require_party, require_status},
    negotiation, parse_time, required_text, LendingRules,
};

#[derive(Clone)]
pub struct MeetupService {
    repository: Repository,
    rules: LendingRules,
    clock: Arc<dyn Clock>,
}

impl MeetupService {
    pub fn new(repository: Repository, rules: LendingRules, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            rules,
            clock,
        }
    }

    /// Borrower agrees to the lender's handoff; the borrow status stays Accepted
    pub async fn confirm_meetup(&self, borrower_id: i64, event_id: i64) -> AppResult<MeetupDetail> {
        let mut tx = self.repository.borrows.begin().await?;
        let event = load_event(&mut *tx, event_id).await?;
        require_borrower(&event, borrower_id)?;
        require_status(&event, &[BorrowStatus::Accepted], "confirmed")?;

        let mut meetup = tx
            .meetup_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Meetup", event.id))?;
        if meetup.status != MeetupStatus::Pending {
            return Err(AppError::State(format!(
                "Meetup of borrow event {} is already {}",
                event.id, meetup.status
            )));
        }

        tx.set_meetup_status(meetup.id, MeetupStatus::Confirmed)
            .await?;
        tx.commit().await?;

        meetup.status = MeetupStatus::Confirmed;
        tracing::info!(event_id, borrower_id, "Meetup confirmed");
        Ok(meetup)
    }

    /// Counter-propose the handoff time and place
    pub async fn suggest_meetup(
        &self,
        user_id: i64,
        event_id: i64,
        time: &str,
        location: &str,
        reason: &str,
    ) -> AppResult<MeetupSuggestion> {
        let time = parse_time(time)?;
        self.rules.check_handoff_window(time)?;
        let location = required_text("Meetup location", location)?;
        let reason = required_text("Reason", reason)?;
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let event = load_event(&mut *tx, event_id).await?;
        require_party(&event, user_id)?;
        require_status(&event, &[BorrowStatus::Accepted], "renegotiated")?;

        let meetup = tx
            .meetup_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Meetup", event.id))?;
        let existing = tx.meetup_suggestions(meetup.id).await?;
        negotiation::ensure_no_pending_from(&existing, user_id)?;

        let suggestion = tx
            .insert_meetup_suggestion(&NewMeetupSuggestion {
                meetup_detail_id: meetup.id,
                suggested_by: user_id,
                suggested_time: time,
                suggested_location: location,
                suggested_reason: reason,
                created_at: now,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            event_id,
            user_id,
            suggestion_id = suggestion.id,
            "Meetup suggested"
        );
        Ok(suggestion)
    }

    /// Counterparty accepts; the latest suggestion becomes the agreed handoff
    pub async fn confirm_meetup_suggestion(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> AppResult<MeetupDetail> {
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let event = load_event(&mut *tx, event_id).await?;
        require_party(&event, user_id)?;
        require_status(&event, &[BorrowStatus::Accepted], "renegotiated")?;

        let mut meetup = tx
            .meetup_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Meetup", event.id))?;
        let suggestions = tx.meetup_suggestions(meetup.id).await?;
        let chosen = negotiation::answerable(&suggestions, user_id)?;

        for id in negotiation::pending_ids(&suggestions) {
            tx.push_meetup_suggestion_status(id, SuggestionStatus::Accepted, now)
                .await?;
        }
        tx.set_meetup_final(meetup.id, chosen.suggested_time, &chosen.suggested_location)
            .await?;
        tx.set_meetup_status(meetup.id, MeetupStatus::Confirmed)
            .await?;
        tx.commit().await?;

        meetup.final_time = Some(chosen.suggested_time);
        meetup.final_location = Some(chosen.suggested_location.clone());
        meetup.status = MeetupStatus::Confirmed;
        tracing::info!(
            event_id,
            user_id,
            suggestion_id = chosen.id,
            "Meetup suggestion confirmed"
        );
        Ok(meetup)
    }

    /// Counterparty declines every open suggestion
    pub async fn reject_meetup_suggestion(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> AppResult<MeetupDetail> {
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let event = load_event(&mut *tx, event_id).await?;
        require_party(&event, user_id)?;
        require_status(&event, &[BorrowStatus::Accepted], "renegotiated")?;

        let mut meetup = tx
            .meetup_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Meetup", event.id))?;
        let suggestions = tx.meetup_suggestions(meetup.id).await?;
        negotiation::answerable(&suggestions, user_id)?;

        for id in negotiation::pending_ids(&suggestions) {
            tx.push_meetup_suggestion_status(id, SuggestionStatus::Rejected, now)
                .await?;
        }
        tx.set_meetup_status(meetup.id, MeetupStatus::Rejected)
            .await?;
        tx.commit().await?;

        meetup.status = MeetupStatus::Rejected;
        tracing::info!(event_id, user_id, "Meetup suggestions rejected");
        Ok(meetup)
    }
}
