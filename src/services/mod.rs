//! Business logic services

pub mod borrows;
pub mod meetups;
mod negotiation;
pub mod returns;
pub mod sweeps;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use crate::{
    clock::Clock,
    config::BorrowingConfig,
    error::{AppError, AppResult},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub borrows: borrows::BorrowService,
    pub meetups: meetups::MeetupService,
    pub returns: returns::ReturnService,
    pub sweeps: sweeps::SweepService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        borrowing: &BorrowingConfig,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let rules = LendingRules::from_config(borrowing)?;

        Ok(Self {
            borrows: borrows::BorrowService::new(repository.clone(), rules.clone(), clock.clone()),
            meetups: meetups::MeetupService::new(repository.clone(), rules, clock.clone()),
            returns: returns::ReturnService::new(repository.clone(), clock.clone()),
            sweeps: sweeps::SweepService::new(repository, clock),
        })
    }
}

/// Business-rule constants of the lifecycle engine
#[derive(Debug, Clone)]
pub struct LendingRules {
    pub max_active_borrows: i64,
    pub max_borrow_days: i64,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
}

impl LendingRules {
    pub fn from_config(config: &BorrowingConfig) -> AppResult<Self> {
        let (window_start, window_end) = config.meetup_window().map_err(AppError::Internal)?;
        Ok(Self {
            max_active_borrows: config.max_active_borrows,
            max_borrow_days: config.max_borrow_days,
            window_start,
            window_end,
        })
    }

    /// Start strictly after `today`, end after start, window no longer than allowed
    pub fn check_borrow_dates(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        today: NaiveDate,
    ) -> AppResult<()> {
        if start_date <= today {
            return Err(AppError::Validation(
                "Start date must be in the future".to_string(),
            ));
        }
        if end_date <= start_date {
            return Err(AppError::Validation(
                "End date must be after the start date".to_string(),
            ));
        }
        if (end_date - start_date).num_days() > self.max_borrow_days {
            return Err(AppError::Validation(format!(
                "Borrowing period cannot exceed {} days",
                self.max_borrow_days
            )));
        }
        Ok(())
    }

    /// Handoff times must fall inside the business window, bounds included
    pub fn check_handoff_window(&self, time: NaiveTime) -> AppResult<()> {
        if time < self.window_start || time > self.window_end {
            return Err(AppError::Validation(format!(
                "Meetup time must be between {} and {}",
                self.window_start.format("%H:%M"),
                self.window_end.format("%H:%M")
            )));
        }
        Ok(())
    }
}

impl Default for LendingRules {
    fn default() -> Self {
        Self {
            max_active_borrows: 3,
            max_borrow_days: 14,
            window_start: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            window_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
        }
    }
}

/// Parse an `HH:MM` handoff time
pub fn parse_time(value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| AppError::Validation(format!("Invalid time '{}', expected HH:MM", value)))
}

/// Trimmed, non-empty text of at most 255 characters
pub fn required_text(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if value.chars().count() > 255 {
        return Err(AppError::Validation(format!(
            "{} cannot be longer than 255 characters",
            field
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    #[test]
    fn test_borrow_dates() {
        let rules = LendingRules::default();
        let today = date(1);

        assert!(rules.check_borrow_dates(date(2), date(5), today).is_ok());
        assert!(rules.check_borrow_dates(date(2), date(16), today).is_ok());
        // start today
        assert!(rules.check_borrow_dates(date(1), date(5), today).is_err());
        // 15 days
        assert!(rules.check_borrow_dates(date(2), date(17), today).is_err());
        // end before start
        assert!(rules.check_borrow_dates(date(5), date(4), today).is_err());
    }

    #[test]
    fn test_handoff_window_is_inclusive() {
        let rules = LendingRules::default();
        for (value, ok) in [
            ("07:00", true),
            ("17:00", true),
            ("12:30", true),
            ("06:59", false),
            ("17:01", false),
        ] {
            let time = parse_time(value).unwrap();
            assert_eq!(rules.check_handoff_window(time).is_ok(), ok, "{}", value);
        }
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time("10:00").is_ok());
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("ten").is_err());
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("Location", "  Library ").unwrap(), "Library");
        assert!(matches!(
            required_text("Location", "   "),
            Err(AppError::Validation(_))
        ));
        assert!(required_text("Reason", &"x".repeat(256)).is_err());
    }

    #[test]
    fn test_rules_from_config() {
        let rules = LendingRules::from_config(&BorrowingConfig::default()).unwrap();
        assert_eq!(rules.max_active_borrows, 3);
        assert_eq!(rules.window_end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());

        let broken = BorrowingConfig {
            meetup_window_start: "late".to_string(),
            ..BorrowingConfig::default()
        };
        assert!(matches!(
            LendingRules::from_config(&broken),
            Err(AppError::Internal(_))
        ));
    }
}
