//! Return negotiation, mirroring the meetup flow for the loan end

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::AppResult,
    models::{
        BorrowStatus, NewReturnSuggestion, ReturnDetail, ReturnStatus, ReturnSuggestion,
        SuggestionStatus,
    },
    repository::Repository,
};

use super::{
    borrows::{load_event, missing_detail, require_party, require_status},
    negotiation, parse_time, required_text,
};

/// Statuses during which the return handoff can be renegotiated
const LENDING: [BorrowStatus; 2] = [BorrowStatus::InProgress, BorrowStatus::ReadyForReturn];

#[derive(Clone)]
pub struct ReturnService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl ReturnService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn suggest_return(
        &self,
        user_id: i64,
        event_id: i64,
        time: &str,
        location: &str,
    ) -> AppResult<ReturnSuggestion> {
        let time = parse_time(time)?;
        let location = required_text("Return location", location)?;
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let event = load_event(&mut *tx, event_id).await?;
        require_party(&event, user_id)?;
        require_status(&event, &LENDING, "renegotiated")?;

        let detail = tx
            .return_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Return", event.id))?;
        let existing = tx.return_suggestions(detail.id).await?;
        negotiation::ensure_no_pending_from(&existing, user_id)?;

        let suggestion = tx
            .insert_return_suggestion(&NewReturnSuggestion {
                return_detail_id: detail.id,
                suggested_by: user_id,
                suggested_time: time,
                suggested_location: location,
                created_at: now,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            event_id,
            user_id,
            suggestion_id = suggestion.id,
            "Return suggested"
        );
        Ok(suggestion)
    }

    pub async fn confirm_return_suggestion(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> AppResult<ReturnDetail> {
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let event = load_event(&mut *tx, event_id).await?;
        require_party(&event, user_id)?;
        require_status(&event, &LENDING, "renegotiated")?;

        let mut detail = tx
            .return_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Return", event.id))?;
        let suggestions = tx.return_suggestions(detail.id).await?;
        let chosen = negotiation::answerable(&suggestions, user_id)?;

        for id in negotiation::pending_ids(&suggestions) {
            tx.push_return_suggestion_status(id, SuggestionStatus::Accepted, now)
                .await?;
        }
        tx.set_return_handoff(detail.id, chosen.suggested_time, &chosen.suggested_location)
            .await?;
        tx.set_return_status(detail.id, ReturnStatus::AwaitingConfirmation)
            .await?;
        tx.commit().await?;

        detail.return_time = Some(chosen.suggested_time);
        detail.return_location = Some(chosen.suggested_location.clone());
        detail.status = ReturnStatus::AwaitingConfirmation;
        tracing::info!(
            event_id,
            user_id,
            suggestion_id = chosen.id,
            "Return suggestion confirmed"
        );
        Ok(detail)
    }

    pub async fn reject_return_suggestion(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> AppResult<ReturnDetail> {
        let now = self.clock.now();

        let mut tx = self.repository.borrows.begin().await?;
        let event = load_event(&mut *tx, event_id).await?;
        require_party(&event, user_id)?;
        require_status(&event, &LENDING, "renegotiated")?;

        let mut detail = tx
            .return_detail(event.id)
            .await?
            .ok_or_else(|| missing_detail("Return", event.id))?;
        let suggestions = tx.return_suggestions(detail.id).await?;
        negotiation::answerable(&suggestions, user_id)?;

        for id in negotiation::pending_ids(&suggestions) {
            tx.push_return_suggestion_status(id, SuggestionStatus::Rejected, now)
                .await?;
        }
        tx.set_return_status(detail.id, ReturnStatus::Rejected)
            .await?;
        tx.commit().await?;

        detail.status = ReturnStatus::Rejected;
        tracing::info!(event_id, user_id, "Return suggestions rejected");
        Ok(detail)
    }
}
