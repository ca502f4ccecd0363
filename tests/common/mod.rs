//! Shared fixtures: services over the in-memory store with a settable clock

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use shelfshare_server::{
    clock::{Clock, FixedClock},
    config::BorrowingConfig,
    models::{Availability, BorrowEvent, BorrowEventDetails, BorrowRequest, BorrowStatus, UserClaims},
    repository::{BorrowStore, MemoryStore, Repository},
    services::Services,
};

pub const LENDER: i64 = 10;
pub const BORROWER: i64 = 20;
pub const OTHER_BORROWER: i64 = 30;
pub const STRANGER: i64 = 99;

pub struct Harness {
    pub store: MemoryStore,
    pub clock: FixedClock,
    pub services: Services,
    start: NaiveDate,
}

impl Harness {
    pub fn new() -> Self {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let store = MemoryStore::new();
        let clock = FixedClock::at_date(start);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let services = Services::new(
            Repository::with_store(Arc::new(store.clone())),
            &BorrowingConfig::default(),
            shared,
        )
        .unwrap();

        Self {
            store,
            clock,
            services,
            start,
        }
    }

    /// Date `offset` days after the first day of the test
    pub fn day(&self, offset: i64) -> NaiveDate {
        self.start + Duration::days(offset)
    }

    pub fn go_to_day(&self, offset: i64) {
        self.clock.set_date(self.day(offset));
    }

    pub async fn book(&self, owner_id: i64) -> i64 {
        self.store.add_book(owner_id).await
    }

    pub async fn availability(&self, book_id: i64) -> Availability {
        self.store.availability(book_id).await.unwrap()
    }

    /// Request `book_id` from day `start` to day `end`
    pub async fn request(&self, borrower_id: i64, book_id: i64, start: i64, end: i64) -> BorrowEvent {
        self.services
            .borrows
            .request_borrow(
                borrower_id,
                BorrowRequest {
                    book_id,
                    start_date: self.day(start),
                    end_date: self.day(end),
                },
            )
            .await
            .unwrap()
    }

    /// Pending request on a fresh book, days 1 to 4
    pub async fn pending(&self) -> BorrowEvent {
        let book = self.book(LENDER).await;
        self.request(BORROWER, book, 1, 4).await
    }

    /// Accepted event on a fresh book, meetup at 10:00 in the library
    pub async fn accepted(&self) -> BorrowEvent {
        let event = self.pending().await;
        self.services
            .borrows
            .accept_and_set_meetup(LENDER, event.id, "10:00", "Library")
            .await
            .unwrap()
    }

    /// Event whose book is with the borrower, return on day 4
    pub async fn in_progress(&self) -> BorrowEvent {
        let event = self.accepted().await;
        self.services
            .borrows
            .receive_book_and_set_return(BORROWER, event.id, "16:00", "Library")
            .await
            .unwrap()
    }

    pub async fn details(&self, event_id: i64) -> BorrowEventDetails {
        self.store
            .event_details(event_id)
            .await
            .unwrap()
            .expect("event exists")
    }

    pub async fn status(&self, event_id: i64) -> BorrowStatus {
        self.details(event_id).await.event.status
    }
}

pub fn admin() -> UserClaims {
    UserClaims {
        sub: "admin".to_string(),
        user_id: 1,
        is_admin: true,
        exp: 0,
        iat: 0,
    }
}

pub fn member(user_id: i64) -> UserClaims {
    UserClaims {
        sub: format!("user{}", user_id),
        user_id,
        is_admin: false,
        exp: 0,
        iat: 0,
    }
}
