//! Reconciliation sweeps driven by a simulated calendar

mod common;

use common::*;
use shelfshare_server::{
    error::AppError,
    models::{Availability, BorrowStatus, ReturnStatus, Sweep},
};

#[tokio::test]
async fn test_unaccepted_request_cancelled_on_start_date() {
    let h = Harness::new();
    let event = h.pending().await;
    let sweeps = &h.services.sweeps;

    let early = sweeps.run(Sweep::UnacceptedRequest).await.unwrap();
    assert_eq!(early.found, 0);
    assert_eq!(h.status(event.id).await, BorrowStatus::Pending);

    h.go_to_day(1);
    let report = sweeps.run(Sweep::UnacceptedRequest).await.unwrap();
    assert_eq!((report.found, report.succeeded, report.failed), (1, 1, 0));
    assert_eq!(report.processed, vec![event.id]);

    let details = h.details(event.id).await;
    assert_eq!(details.event.status, BorrowStatus::Cancelled);
    let reason = details.cancel_reason.unwrap();
    assert_eq!(reason.cancelled_by, BORROWER);
    assert!(reason.reason.contains("didn't accept"));
    assert!(details.meetup.is_none());

    let again = sweeps.run(Sweep::UnacceptedRequest).await.unwrap();
    assert_eq!(again.found, 0);
}

#[tokio::test]
async fn test_overdue_accepted_waits_until_after_start() {
    let h = Harness::new();
    let event = h.accepted().await;
    h.services.meetups.confirm_meetup(BORROWER, event.id).await.unwrap();

    h.go_to_day(1);
    let report = h.services.sweeps.run(Sweep::OverdueAccepted).await.unwrap();
    assert_eq!(report.found, 0);
    // confirmed meetups are left alone by the start-date check
    let report = h.services.sweeps.run(Sweep::UnconfirmedMeetup).await.unwrap();
    assert_eq!(report.found, 0);

    h.go_to_day(2);
    let report = h.services.sweeps.run(Sweep::OverdueAccepted).await.unwrap();
    assert_eq!(report.succeeded, 1);

    let details = h.details(event.id).await;
    assert_eq!(details.event.status, BorrowStatus::Cancelled);
    assert_eq!(details.cancel_reason.unwrap().cancelled_by, LENDER);
    assert_eq!(h.availability(event.book_id).await, Availability::Available);
}

#[tokio::test]
async fn test_return_due_marks_ready_for_return() {
    let h = Harness::new();
    let event = h.in_progress().await;

    h.go_to_day(3);
    assert_eq!(h.services.sweeps.run(Sweep::ReturnDue).await.unwrap().found, 0);

    h.go_to_day(4);
    let report = h.services.sweeps.run(Sweep::ReturnDue).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(h.status(event.id).await, BorrowStatus::ReadyForReturn);
    assert_eq!(h.availability(event.book_id).await, Availability::Unavailable);
}

#[tokio::test]
async fn test_overdue_return_escalates_to_deposit() {
    let h = Harness::new();
    let event = h.in_progress().await;

    h.go_to_day(4);
    h.services.sweeps.run(Sweep::ReturnDue).await.unwrap();
    assert_eq!(
        h.services.sweeps.run(Sweep::OverdueReturn).await.unwrap().found,
        0
    );

    h.go_to_day(5);
    let report = h.services.sweeps.run(Sweep::OverdueReturn).await.unwrap();
    assert_eq!(report.succeeded, 1);

    let details = h.details(event.id).await;
    assert_eq!(details.event.status, BorrowStatus::Deposit);
    let report = details.report.unwrap();
    assert_eq!(report.reported_by, None);
    assert!(!report.resolved);
    assert_eq!(h.availability(event.book_id).await, Availability::Unavailable);
}

#[tokio::test]
async fn test_overdue_return_also_catches_in_progress() {
    let h = Harness::new();
    let event = h.in_progress().await;

    h.go_to_day(6);
    let report = h.services.sweeps.run(Sweep::OverdueReturn).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(h.status(event.id).await, BorrowStatus::Deposit);
}

#[tokio::test]
async fn test_overdue_return_skips_rejected_returns() {
    let h = Harness::new();
    let event = h.in_progress().await;
    h.services
        .returns
        .suggest_return(LENDER, event.id, "08:00", "Home")
        .await
        .unwrap();
    let detail = h
        .services
        .returns
        .reject_return_suggestion(BORROWER, event.id)
        .await
        .unwrap();
    assert_eq!(detail.status, ReturnStatus::Rejected);

    h.go_to_day(6);
    let report = h.services.sweeps.run(Sweep::OverdueReturn).await.unwrap();
    assert_eq!(report.found, 0);
    assert_eq!(h.status(event.id).await, BorrowStatus::InProgress);
}

#[tokio::test]
async fn test_failure_on_one_event_does_not_stop_the_sweep() {
    let h = Harness::new();
    let broken = h.pending().await;
    let healthy = h.pending().await;
    h.store.inject_failure(broken.id).await;

    h.go_to_day(1);
    let report = h.services.sweeps.run(Sweep::UnacceptedRequest).await.unwrap();
    assert_eq!(report.found, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, vec![healthy.id]);

    // the failed event was rolled back completely
    let details = h.details(broken.id).await;
    assert_eq!(details.event.status, BorrowStatus::Pending);
    assert!(details.meetup.is_some());
    assert!(details.cancel_reason.is_none());
    assert_eq!(h.status(healthy.id).await, BorrowStatus::Cancelled);
}

#[tokio::test]
async fn test_running_all_sweeps_twice_is_idempotent() {
    let h = Harness::new();
    let pending = h.pending().await;
    let accepted = h.accepted().await;
    let lending = h.in_progress().await;

    h.go_to_day(6);
    let first = h.services.sweeps.run_all().await.unwrap();
    assert_eq!(first.len(), Sweep::ALL.len());
    // the lent book goes through ReturnDue and then OverdueReturn
    assert_eq!(first.iter().map(|r| r.succeeded).sum::<usize>(), 4);

    let snapshot = [
        h.status(pending.id).await,
        h.status(accepted.id).await,
        h.status(lending.id).await,
    ];
    assert_eq!(
        snapshot,
        [
            BorrowStatus::Cancelled,
            BorrowStatus::Cancelled,
            BorrowStatus::Deposit
        ]
    );

    let second = h.services.sweeps.run_all().await.unwrap();
    assert!(second.iter().all(|r| r.found == 0));
    assert_eq!(h.status(lending.id).await, BorrowStatus::Deposit);
}

#[tokio::test]
async fn test_trigger_requires_admin() {
    let h = Harness::new();
    assert!(matches!(
        h.services.sweeps.trigger(&member(LENDER), None).await,
        Err(AppError::Authorization(_))
    ));
    let reports = h
        .services
        .sweeps
        .trigger(&admin(), Some(Sweep::ReturnDue))
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].sweep, Sweep::ReturnDue);
}
