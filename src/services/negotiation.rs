//! Rules shared by the meetup and return counter-proposal flows

use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{MeetupSuggestion, ReturnSuggestion, SuggestionStatus},
};

pub(crate) trait Proposal {
    fn id(&self) -> i64;
    fn suggested_by(&self) -> i64;
    fn created_at(&self) -> DateTime<Utc>;
    fn status(&self) -> SuggestionStatus;

    fn is_pending(&self) -> bool {
        self.status() == SuggestionStatus::Pending
    }
}

impl Proposal for MeetupSuggestion {
    fn id(&self) -> i64 {
        self.id
    }
    fn suggested_by(&self) -> i64 {
        self.suggested_by
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn status(&self) -> SuggestionStatus {
        self.status
    }
}

impl Proposal for ReturnSuggestion {
    fn id(&self) -> i64 {
        self.id
    }
    fn suggested_by(&self) -> i64 {
        self.suggested_by
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn status(&self) -> SuggestionStatus {
        self.status
    }
}

/// One open suggestion per user
pub(crate) fn ensure_no_pending_from<P: Proposal>(suggestions: &[P], user_id: i64) -> AppResult<()> {
    if suggestions
        .iter()
        .any(|s| s.suggested_by() == user_id && s.is_pending())
    {
        return Err(AppError::Conflict(
            "You already have a pending suggestion".to_string(),
        ));
    }
    Ok(())
}

/// Latest suggestion by creation time across every suggester, ids break ties
pub(crate) fn latest<P: Proposal>(suggestions: &[P]) -> Option<&P> {
    suggestions
        .iter()
        .max_by_key(|s| (s.created_at(), s.id()))
}

/// The suggestion a counterparty answer applies to.
///
/// Needs at least one pending suggestion; the latest one overall is the one
/// answered, and its author cannot answer it.
pub(crate) fn answerable<P: Proposal>(suggestions: &[P], user_id: i64) -> AppResult<&P> {
    if !suggestions.iter().any(Proposal::is_pending) {
        return Err(AppError::State("There is no pending suggestion".to_string()));
    }
    let target = latest(suggestions)
        .filter(|s| s.is_pending())
        .ok_or_else(|| AppError::State("The latest suggestion is no longer pending".to_string()))?;
    if target.suggested_by() == user_id {
        return Err(AppError::Authorization(
            "You cannot answer your own suggestion".to_string(),
        ));
    }
    Ok(target)
}

/// Ids of the suggestions still waiting for an answer
pub(crate) fn pending_ids<P: Proposal>(suggestions: &[P]) -> Vec<i64> {
    suggestions
        .iter()
        .filter(|s| s.is_pending())
        .map(Proposal::id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, NaiveTime, TimeZone};

    fn suggestion(id: i64, by: i64, minutes: i64, status: SuggestionStatus) -> ReturnSuggestion {
        let base = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        ReturnSuggestion {
            id,
            return_detail_id: 1,
            suggested_by: by,
            suggested_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            suggested_location: format!("Spot {}", id),
            created_at: base + Duration::minutes(minutes),
            status,
        }
    }

    #[test]
    fn test_latest_is_by_creation_time_not_id() {
        let list = vec![
            suggestion(5, 1, 10, SuggestionStatus::Pending),
            suggestion(3, 2, 20, SuggestionStatus::Pending),
        ];
        assert_eq!(latest(&list).map(|s| s.id), Some(3));
    }

    #[test]
    fn test_equal_timestamps_fall_back_to_id() {
        let list = vec![
            suggestion(8, 1, 0, SuggestionStatus::Pending),
            suggestion(9, 2, 0, SuggestionStatus::Pending),
        ];
        assert_eq!(latest(&list).map(|s| s.id), Some(9));
    }

    #[test]
    fn test_answerable_rules() {
        let empty: Vec<ReturnSuggestion> = Vec::new();
        assert!(matches!(answerable(&empty, 1), Err(AppError::State(_))));

        let list = vec![
            suggestion(1, 1, 0, SuggestionStatus::Pending),
            suggestion(2, 2, 5, SuggestionStatus::Pending),
        ];
        // user 2 wrote the latest one
        assert!(matches!(
            answerable(&list, 2),
            Err(AppError::Authorization(_))
        ));
        assert_eq!(answerable(&list, 1).unwrap().id, 2);

        let settled = vec![suggestion(1, 1, 0, SuggestionStatus::Accepted)];
        assert!(matches!(answerable(&settled, 2), Err(AppError::State(_))));
    }

    #[test]
    fn test_one_pending_per_user() {
        let list = vec![
            suggestion(1, 1, 0, SuggestionStatus::Rejected),
            suggestion(2, 2, 5, SuggestionStatus::Pending),
        ];
        assert!(ensure_no_pending_from(&list, 1).is_ok());
        assert!(matches!(
            ensure_no_pending_from(&list, 2),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(pending_ids(&list), vec![2]);
    }
}
