//! Postgres store tests
//!
//! Each test gets a fresh database with the migrations applied.
//! Run with: DATABASE_URL=postgres://... cargo test --test postgres -- --ignored

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use sqlx::PgPool;

use shelfshare_server::{
    clock::{Clock, FixedClock},
    config::BorrowingConfig,
    error::AppError,
    models::{Availability, BorrowEvent, BorrowRequest, BorrowStatus, Sweep},
    repository::{BorrowStore, BorrowTx, PgBorrowStore, Repository},
    services::Services,
};

const LENDER: i64 = 10;

struct PgHarness {
    pool: PgPool,
    store: PgBorrowStore,
    clock: FixedClock,
    services: Services,
    start: NaiveDate,
}

impl PgHarness {
    fn new(pool: PgPool) -> Self {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let clock = FixedClock::at_date(start);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let services = Services::new(
            Repository::new(pool.clone()),
            &BorrowingConfig::default(),
            shared,
        )
        .unwrap();

        Self {
            store: PgBorrowStore::new(pool.clone()),
            pool,
            clock,
            services,
            start,
        }
    }

    fn day(&self, offset: i64) -> NaiveDate {
        self.start + Duration::days(offset)
    }

    async fn book(&self, owner_id: i64) -> i64 {
        let id: i64 = sqlx::query_scalar("INSERT INTO books (owner_id) VALUES ($1) RETURNING id")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO book_availabilities (book_id) VALUES ($1)")
            .bind(id)
            .execute(&self.pool)
            .await
            .unwrap();
        id
    }

    async fn availability(&self, book_id: i64) -> Availability {
        let id: i16 = sqlx::query_scalar(
            "SELECT availability_id FROM book_availabilities WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .unwrap();
        Availability::try_from(id).unwrap()
    }

    /// Pending request on a fresh book, days `start` to `end`
    async fn pending(&self, borrower_id: i64, start: i64, end: i64) -> BorrowEvent {
        let book = self.book(LENDER).await;
        self.services
            .borrows
            .request_borrow(
                borrower_id,
                BorrowRequest {
                    book_id: book,
                    start_date: self.day(start),
                    end_date: self.day(end),
                },
            )
            .await
            .unwrap()
    }

    async fn accepted(&self, borrower_id: i64) -> BorrowEvent {
        let event = self.pending(borrower_id, 1, 4).await;
        self.services
            .borrows
            .accept_and_set_meetup(LENDER, event.id, "10:00", "Library")
            .await
            .unwrap()
    }

    async fn in_progress(&self, borrower_id: i64) -> BorrowEvent {
        let event = self.accepted(borrower_id).await;
        self.services
            .borrows
            .receive_book_and_set_return(borrower_id, event.id, "16:00", "Library")
            .await
            .unwrap()
    }

    async fn status(&self, event_id: i64) -> BorrowStatus {
        self.store
            .event_details(event_id)
            .await
            .unwrap()
            .expect("event exists")
            .event
            .status
    }

    /// Events among `ids` that the in-process predicate selects
    async fn matching(&self, ids: &[i64], sweep: Sweep, today: NaiveDate) -> Vec<i64> {
        let mut selected = Vec::new();
        for &id in ids {
            let details = self.store.event_details(id).await.unwrap().unwrap();
            let meetup = details.meetup.as_ref().map(|m| &m.detail);
            let ret = details.return_detail.as_ref().map(|r| &r.detail);
            if sweep.matches(&details.event, meetup, ret, today) {
                selected.push(id);
            }
        }
        selected
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_sweep_queries_agree_with_predicates(pool: PgPool) {
    let h = PgHarness::new(pool);
    let mut ids = Vec::new();

    ids.push(h.pending(20, 1, 4).await.id);
    ids.push(h.pending(21, 3, 6).await.id);
    ids.push(h.accepted(22).await.id);

    let confirmed = h.accepted(23).await;
    h.services
        .meetups
        .confirm_meetup(23, confirmed.id)
        .await
        .unwrap();
    ids.push(confirmed.id);

    ids.push(h.in_progress(24).await.id);

    let rejected_return = h.in_progress(25).await;
    h.services
        .returns
        .suggest_return(LENDER, rejected_return.id, "08:00", "Home")
        .await
        .unwrap();
    h.services
        .returns
        .reject_return_suggestion(25, rejected_return.id)
        .await
        .unwrap();
    ids.push(rejected_return.id);

    let ready = h.in_progress(26).await;
    sqlx::query("UPDATE borrow_event_borrow_status SET borrow_status_id = $2 WHERE borrow_event_id = $1")
        .bind(ready.id)
        .bind(BorrowStatus::ReadyForReturn.id())
        .execute(&h.pool)
        .await
        .unwrap();
    ids.push(ready.id);

    let reported = h.in_progress(27).await;
    h.services
        .borrows
        .report_event(27, reported.id, "Damaged cover")
        .await
        .unwrap();
    ids.push(reported.id);

    let cancelled = h.pending(28, 1, 4).await;
    h.services
        .borrows
        .cancel_event(28, cancelled.id, "Never mind")
        .await
        .unwrap();
    ids.push(cancelled.id);

    let rejected = h.pending(29, 1, 4).await;
    h.services
        .borrows
        .reject_request(LENDER, rejected.id, "No")
        .await
        .unwrap();
    ids.push(rejected.id);

    for sweep in Sweep::ALL {
        let mut hits = 0;
        for offset in 0..=7 {
            let today = h.day(offset);
            let from_sql = h.store.sweep_candidates(sweep, today).await.unwrap();
            let from_predicate = h.matching(&ids, sweep, today).await;
            assert_eq!(from_sql, from_predicate, "{} on day {}", sweep.name(), offset);
            hits += from_sql.len();
        }
        assert!(hits > 0, "{} never selected anything", sweep.name());
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_sweeps_run_against_postgres(pool: PgPool) {
    let h = PgHarness::new(pool);
    let pending = h.pending(20, 1, 4).await;
    let lending = h.in_progress(21).await;

    h.clock.set_date(h.day(6));
    let reports = h.services.sweeps.run_all().await.unwrap();
    assert_eq!(reports.iter().map(|r| r.failed).sum::<usize>(), 0);

    assert_eq!(h.status(pending.id).await, BorrowStatus::Cancelled);
    assert_eq!(h.status(lending.id).await, BorrowStatus::Deposit);
    assert_eq!(h.availability(pending.book_id).await, Availability::Available);
    assert_eq!(h.availability(lending.book_id).await, Availability::Unavailable);

    let again = h.services.sweeps.run_all().await.unwrap();
    assert!(again.iter().all(|r| r.found == 0));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_cancel_and_accept_are_serialized(pool: PgPool) {
    let h = PgHarness::new(pool);
    let event = h.pending(20, 1, 4).await;

    let (cancelled, accepted) = tokio::join!(
        h.services.borrows.cancel_event(20, event.id, "Never mind"),
        h.services
            .borrows
            .accept_and_set_meetup(LENDER, event.id, "10:00", "Library"),
    );

    // cancel succeeds either way; accept only if it locked the event first
    assert!(cancelled.is_ok());
    if let Err(e) = accepted {
        assert!(matches!(e, AppError::State(_)));
    }
    assert_eq!(h.status(event.id).await, BorrowStatus::Cancelled);
    assert_eq!(h.availability(event.book_id).await, Availability::Available);

    let details = h.store.event_details(event.id).await.unwrap().unwrap();
    assert!(details.meetup.is_none());
    assert!(details.return_detail.is_none());
    assert_eq!(details.cancel_reason.unwrap().cancelled_by, 20);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_reject_and_cancel_have_one_winner(pool: PgPool) {
    let h = PgHarness::new(pool);
    let event = h.pending(20, 1, 4).await;

    let (rejected, cancelled) = tokio::join!(
        h.services.borrows.reject_request(LENDER, event.id, "No"),
        h.services.borrows.cancel_event(20, event.id, "Never mind"),
    );

    match (rejected, cancelled) {
        (Ok(_), Err(AppError::State(_))) => {
            assert_eq!(h.status(event.id).await, BorrowStatus::Rejected)
        }
        (Err(AppError::State(_)), Ok(_)) => {
            assert_eq!(h.status(event.id).await, BorrowStatus::Cancelled)
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_borrower_cap_holds_under_concurrent_requests(pool: PgPool) {
    let h = PgHarness::new(pool);
    let mut books = Vec::new();
    for _ in 0..4 {
        books.push(h.book(LENDER).await);
    }
    let request = |book_id| BorrowRequest {
        book_id,
        start_date: h.day(1),
        end_date: h.day(4),
    };

    let borrows = &h.services.borrows;
    let (a, b, c, d) = tokio::join!(
        borrows.request_borrow(20, request(books[0])),
        borrows.request_borrow(20, request(books[1])),
        borrows.request_borrow(20, request(books[2])),
        borrows.request_borrow(20, request(books[3])),
    );

    let results = [a, b, c, d];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::LimitExceeded(_)))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_second_terminal_record_is_a_conflict(pool: PgPool) {
    let h = PgHarness::new(pool);
    let now = h.clock.now();

    let cancelled = h.pending(20, 1, 4).await;
    h.services
        .borrows
        .cancel_event(20, cancelled.id, "Never mind")
        .await
        .unwrap();
    let mut tx = h.store.begin().await.unwrap();
    assert!(matches!(
        tx.insert_cancel_reason(cancelled.id, LENDER, "Again", now).await,
        Err(AppError::Conflict(_))
    ));
    drop(tx);

    let rejected = h.pending(21, 1, 4).await;
    h.services
        .borrows
        .reject_request(LENDER, rejected.id, "No")
        .await
        .unwrap();
    let mut tx = h.store.begin().await.unwrap();
    assert!(matches!(
        tx.insert_reject_reason(rejected.id, LENDER, "Still no", now).await,
        Err(AppError::Conflict(_))
    ));
    drop(tx);

    let reported = h.in_progress(22).await;
    h.services
        .borrows
        .report_event(22, reported.id, "Damaged cover")
        .await
        .unwrap();
    let mut tx = h.store.begin().await.unwrap();
    assert!(matches!(
        tx.insert_report(reported.id, None, "Overdue", now).await,
        Err(AppError::Conflict(_))
    ));
}
