//! Reconciliation sweeps: which stalled events they pick up and what they do

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::borrow_event::{BorrowEvent, Party};
use super::enums::{BorrowStatus, MeetupStatus, ReturnStatus};
use super::meetup::MeetupDetail;
use super::return_detail::ReturnDetail;

/// One scheduled reconciliation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sweep {
    /// Pending requests whose start date arrived without the lender accepting
    UnacceptedRequest,
    /// Accepted events whose start date arrived without the borrower confirming
    UnconfirmedMeetup,
    /// Accepted events whose start date passed without the handoff happening
    OverdueAccepted,
    /// Lending periods whose return date has been reached
    ReturnDue,
    /// Returns past their date that the lender never confirmed
    OverdueReturn,
}

/// Effect of a sweep on a matching event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Cancel, attributing the cancellation to one party
    Cancel { attributed_to: Party, reason: &'static str },
    /// Plain status change
    Transition(BorrowStatus),
    /// Move to Deposit and file a system report
    Escalate { reason: &'static str },
}

impl Sweep {
    /// Order used when all sweeps run together
    pub const ALL: [Sweep; 5] = [
        Sweep::UnacceptedRequest,
        Sweep::UnconfirmedMeetup,
        Sweep::OverdueAccepted,
        Sweep::ReturnDue,
        Sweep::OverdueReturn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Sweep::UnacceptedRequest => "unaccepted_request",
            Sweep::UnconfirmedMeetup => "unconfirmed_meetup",
            Sweep::OverdueAccepted => "overdue_accepted",
            Sweep::ReturnDue => "return_due",
            Sweep::OverdueReturn => "overdue_return",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Borrow statuses a candidate may be in
    pub fn candidate_statuses(self) -> &'static [BorrowStatus] {
        match self {
            Sweep::UnacceptedRequest => &[BorrowStatus::Pending],
            Sweep::UnconfirmedMeetup | Sweep::OverdueAccepted => &[BorrowStatus::Accepted],
            Sweep::ReturnDue => &[BorrowStatus::InProgress],
            Sweep::OverdueReturn => &[BorrowStatus::InProgress, BorrowStatus::ReadyForReturn],
        }
    }

    /// Whether the event is stalled as far as this sweep is concerned.
    ///
    /// Terminal events never match, which keeps every sweep idempotent.
    pub fn matches(
        self,
        event: &BorrowEvent,
        meetup: Option<&MeetupDetail>,
        return_detail: Option<&ReturnDetail>,
        today: NaiveDate,
    ) -> bool {
        if !self.candidate_statuses().contains(&event.status) {
            return false;
        }

        match self {
            Sweep::UnacceptedRequest => meetup.is_some_and(|m| m.start_date <= today),
            Sweep::UnconfirmedMeetup => {
                meetup.is_some_and(|m| m.start_date <= today && m.status == MeetupStatus::Pending)
            }
            Sweep::OverdueAccepted => meetup.is_some_and(|m| m.start_date < today),
            Sweep::ReturnDue => return_detail.is_some_and(|r| r.return_date <= today),
            Sweep::OverdueReturn => return_detail.is_some_and(|r| {
                r.return_date < today && r.status == ReturnStatus::AwaitingConfirmation
            }),
        }
    }

    pub fn action(self) -> SweepAction {
        match self {
            Sweep::UnacceptedRequest => SweepAction::Cancel {
                attributed_to: Party::Borrower,
                reason: "Borrow request has been cancelled because the lender didn't accept the request.",
            },
            Sweep::UnconfirmedMeetup => SweepAction::Cancel {
                attributed_to: Party::Lender,
                reason: "Borrow event cancelled due to borrower not accepting meetup details on the scheduled start date.",
            },
            Sweep::OverdueAccepted => SweepAction::Cancel {
                attributed_to: Party::Lender,
                reason: "Borrow event has been cancelled because both lender and borrower did not come.",
            },
            Sweep::ReturnDue => SweepAction::Transition(BorrowStatus::ReadyForReturn),
            Sweep::OverdueReturn => SweepAction::Escalate {
                reason: "Borrow event has been converted to deposit status due to overdue return.",
            },
        }
    }
}

/// Outcome counters of one sweep run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    pub sweep: Sweep,
    pub today: NaiveDate,
    /// Candidates returned by the scan
    pub found: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Candidates that no longer matched once locked
    pub skipped: usize,
    /// Ids of the events that were changed
    pub processed: Vec<i64>,
}

impl SweepReport {
    pub fn new(sweep: Sweep, today: NaiveDate) -> Self {
        Self {
            sweep,
            today,
            found: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            processed: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn event(status: BorrowStatus) -> BorrowEvent {
        let now = Utc::now();
        BorrowEvent {
            id: 1,
            borrower_id: 1,
            lender_id: 2,
            book_id: 3,
            status,
            created_at: now,
            status_updated_at: now,
        }
    }

    fn meetup(start: NaiveDate, status: MeetupStatus) -> MeetupDetail {
        MeetupDetail {
            id: 1,
            borrow_event_id: 1,
            start_date: start,
            end_date: start + chrono::Duration::days(3),
            final_time: NaiveTime::from_hms_opt(10, 0, 0),
            final_location: Some("Library".to_string()),
            status,
        }
    }

    fn ret(return_date: NaiveDate, status: ReturnStatus) -> ReturnDetail {
        ReturnDetail {
            id: 1,
            borrow_event_id: 1,
            return_date,
            return_time: None,
            return_location: None,
            status,
        }
    }

    #[test]
    fn test_unaccepted_request_on_start_date() {
        let m = meetup(date(10), MeetupStatus::Pending);
        let e = event(BorrowStatus::Pending);
        assert!(!Sweep::UnacceptedRequest.matches(&e, Some(&m), None, date(9)));
        assert!(Sweep::UnacceptedRequest.matches(&e, Some(&m), None, date(10)));
        assert!(Sweep::UnacceptedRequest.matches(&e, Some(&m), None, date(11)));
    }

    #[test]
    fn test_unconfirmed_meetup_requires_pending_meetup() {
        let e = event(BorrowStatus::Accepted);
        let pending = meetup(date(10), MeetupStatus::Pending);
        let confirmed = meetup(date(10), MeetupStatus::Confirmed);
        assert!(Sweep::UnconfirmedMeetup.matches(&e, Some(&pending), None, date(10)));
        assert!(!Sweep::UnconfirmedMeetup.matches(&e, Some(&confirmed), None, date(10)));
    }

    #[test]
    fn test_overdue_accepted_is_strictly_after_start() {
        let e = event(BorrowStatus::Accepted);
        let m = meetup(date(10), MeetupStatus::Confirmed);
        assert!(!Sweep::OverdueAccepted.matches(&e, Some(&m), None, date(10)));
        assert!(Sweep::OverdueAccepted.matches(&e, Some(&m), None, date(11)));
    }

    #[test]
    fn test_overdue_return_needs_awaiting_confirmation() {
        let e = event(BorrowStatus::ReadyForReturn);
        let awaiting = ret(date(10), ReturnStatus::AwaitingConfirmation);
        let rejected = ret(date(10), ReturnStatus::Rejected);
        assert!(!Sweep::OverdueReturn.matches(&e, None, Some(&awaiting), date(10)));
        assert!(Sweep::OverdueReturn.matches(&e, None, Some(&awaiting), date(11)));
        assert!(!Sweep::OverdueReturn.matches(&e, None, Some(&rejected), date(11)));
    }

    #[test]
    fn test_terminal_events_never_match() {
        let m = meetup(date(1), MeetupStatus::Pending);
        let r = ret(date(1), ReturnStatus::AwaitingConfirmation);
        for status in BorrowStatus::TERMINAL {
            let e = event(status);
            for sweep in Sweep::ALL {
                assert!(!sweep.matches(&e, Some(&m), Some(&r), date(20)));
            }
        }
    }

    #[test]
    fn test_names_round_trip() {
        for sweep in Sweep::ALL {
            assert_eq!(Sweep::from_name(sweep.name()), Some(sweep));
        }
        assert_eq!(Sweep::from_name("nope"), None);
    }
}
