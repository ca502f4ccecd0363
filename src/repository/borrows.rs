//! Postgres borrow lifecycle repository

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgConnection, Pool, Postgres, Transaction};

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

const EVENT_SELECT: &str = r#"
    SELECT e.id, e.borrower_id, e.lender_id, e.book_id, e.created_at,
           s.borrow_status_id AS status_id, s.updated_at AS status_updated_at
    FROM borrow_events e
    JOIN borrow_event_borrow_status s ON s.borrow_event_id = e.id
"#;

#[derive(FromRow)]
struct EventRow {
    id: i64,
    borrower_id: i64,
    lender_id: i64,
    book_id: i64,
    created_at: DateTime<Utc>,
    status_id: i16,
    status_updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for BorrowEvent {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(BorrowEvent {
            id: row.id,
            borrower_id: row.borrower_id,
            lender_id: row.lender_id,
            book_id: row.book_id,
            status: BorrowStatus::try_from(row.status_id)?,
            created_at: row.created_at,
            status_updated_at: row.status_updated_at,
        })
    }
}

#[derive(FromRow)]
struct BookRow {
    id: i64,
    owner_id: i64,
    availability_id: i16,
}

#[derive(FromRow)]
struct MeetupRow {
    id: i64,
    borrow_event_id: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    final_time: Option<NaiveTime>,
    final_location: Option<String>,
    status_id: i16,
}

impl TryFrom<MeetupRow> for MeetupDetail {
    type Error = AppError;

    fn try_from(row: MeetupRow) -> Result<Self, Self::Error> {
        Ok(MeetupDetail {
            id: row.id,
            borrow_event_id: row.borrow_event_id,
            start_date: row.start_date,
            end_date: row.end_date,
            final_time: row.final_time,
            final_location: row.final_location,
            status: MeetupStatus::try_from(row.status_id)?,
        })
    }
}

#[derive(FromRow)]
struct MeetupSuggestionRow {
    id: i64,
    meet_up_detail_id: i64,
    suggested_by: i64,
    suggested_time: NaiveTime,
    suggested_location: String,
    suggested_reason: String,
    created_at: DateTime<Utc>,
    status_id: Option<i16>,
}

impl TryFrom<MeetupSuggestionRow> for MeetupSuggestion {
    type Error = AppError;

    fn try_from(row: MeetupSuggestionRow) -> Result<Self, Self::Error> {
        Ok(MeetupSuggestion {
            id: row.id,
            meetup_detail_id: row.meet_up_detail_id,
            suggested_by: row.suggested_by,
            suggested_time: row.suggested_time,
            suggested_location: row.suggested_location,
            suggested_reason: row.suggested_reason,
            created_at: row.created_at,
            status: row
                .status_id
                .map(SuggestionStatus::try_from)
                .transpose()?
                .unwrap_or(SuggestionStatus::Pending),
        })
    }
}

#[derive(FromRow)]
struct ReturnRow {
    id: i64,
    borrow_event_id: i64,
    return_date: NaiveDate,
    return_time: Option<NaiveTime>,
    return_location: Option<String>,
    status_id: i16,
}

impl TryFrom<ReturnRow> for ReturnDetail {
    type Error = AppError;

    fn try_from(row: ReturnRow) -> Result<Self, Self::Error> {
        Ok(ReturnDetail {
            id: row.id,
            borrow_event_id: row.borrow_event_id,
            return_date: row.return_date,
            return_time: row.return_time,
            return_location: row.return_location,
            status: ReturnStatus::try_from(row.status_id)?,
        })
    }
}

#[derive(FromRow)]
struct ReturnSuggestionRow {
    id: i64,
    return_detail_id: i64,
    suggested_by: i64,
    suggested_time: NaiveTime,
    suggested_location: String,
    created_at: DateTime<Utc>,
    status_id: Option<i16>,
}

impl TryFrom<ReturnSuggestionRow> for ReturnSuggestion {
    type Error = AppError;

    fn try_from(row: ReturnSuggestionRow) -> Result<Self, Self::Error> {
        Ok(ReturnSuggestion {
            id: row.id,
            return_detail_id: row.return_detail_id,
            suggested_by: row.suggested_by,
            suggested_time: row.suggested_time,
            suggested_location: row.suggested_location,
            created_at: row.created_at,
            status: row
                .status_id
                .map(SuggestionStatus::try_from)
                .transpose()?
                .unwrap_or(SuggestionStatus::Pending),
        })
    }
}

// ---------------------------------------------------------------------------
// Queries shared by the pool and transaction paths
// ---------------------------------------------------------------------------

async fn fetch_event(
    conn: &mut PgConnection,
    event_id: i64,
    for_update: bool,
) -> AppResult<Option<BorrowEvent>> {
    let sql = if for_update {
        format!("{} WHERE e.id = $1 FOR UPDATE OF e, s", EVENT_SELECT)
    } else {
        format!("{} WHERE e.id = $1", EVENT_SELECT)
    };

    sqlx::query_as::<_, EventRow>(&sql)
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(BorrowEvent::try_from)
        .transpose()
}

async fn fetch_meetup(conn: &mut PgConnection, event_id: i64) -> AppResult<Option<MeetupDetail>> {
    sqlx::query_as::<_, MeetupRow>(
        r#"
        SELECT m.id, m.borrow_event_id, m.start_date, m.end_date,
               m.final_time, m.final_location, ms.meet_up_status_id AS status_id
        FROM meet_up_details m
        JOIN meet_up_detail_meet_up_status ms ON ms.meet_up_detail_id = m.id
        WHERE m.borrow_event_id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(&mut *conn)
    .await?
    .map(MeetupDetail::try_from)
    .transpose()
}

async fn fetch_meetup_suggestions(
    conn: &mut PgConnection,
    meetup_id: i64,
) -> AppResult<Vec<MeetupSuggestion>> {
    let rows = sqlx::query_as::<_, MeetupSuggestionRow>(
        r#"
        SELECT sg.id, sg.meet_up_detail_id, sg.suggested_by, sg.suggested_time,
               sg.suggested_location, sg.suggested_reason, sg.created_at,
               (SELECT st.suggestion_status_id
                FROM meet_up_suggestion_statuses st
                WHERE st.meet_up_suggestion_id = sg.id
                ORDER BY st.id DESC
                LIMIT 1) AS status_id
        FROM meet_up_suggestions sg
        WHERE sg.meet_up_detail_id = $1
        ORDER BY sg.created_at, sg.id
        "#,
    )
    .bind(meetup_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(MeetupSuggestion::try_from).collect()
}

async fn fetch_return(conn: &mut PgConnection, event_id: i64) -> AppResult<Option<ReturnDetail>> {
    sqlx::query_as::<_, ReturnRow>(
        r#"
        SELECT r.id, r.borrow_event_id, r.return_date, r.return_time,
               r.return_location, rs.return_status_id AS status_id
        FROM return_details r
        JOIN return_detail_return_status rs ON rs.return_detail_id = r.id
        WHERE r.borrow_event_id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(&mut *conn)
    .await?
    .map(ReturnDetail::try_from)
    .transpose()
}

async fn fetch_return_suggestions(
    conn: &mut PgConnection,
    return_id: i64,
) -> AppResult<Vec<ReturnSuggestion>> {
    let rows = sqlx::query_as::<_, ReturnSuggestionRow>(
        r#"
        SELECT sg.id, sg.return_detail_id, sg.suggested_by, sg.suggested_time,
               sg.suggested_location, sg.created_at,
               (SELECT st.suggestion_status_id
                FROM return_suggestion_statuses st
                WHERE st.return_suggestion_id = sg.id
                ORDER BY st.id DESC
                LIMIT 1) AS status_id
        FROM return_suggestions sg
        WHERE sg.return_detail_id = $1
        ORDER BY sg.created_at, sg.id
        "#,
    )
    .bind(return_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(ReturnSuggestion::try_from).collect()
}

/// Unique violations on the one-per-event terminal records become Conflict
fn duplicate_as_conflict(message: String) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        let unique = matches!(
            &e,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
        );
        if unique {
            AppError::Conflict(message)
        } else {
            AppError::Database(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgBorrowStore {
    pool: Pool<Postgres>,
}

impl PgBorrowStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn sweep_query(sweep: Sweep) -> String {
        let condition = match sweep {
            Sweep::UnacceptedRequest => {
                "JOIN meet_up_details m ON m.borrow_event_id = e.id \
                 WHERE s.borrow_status_id = ANY($2) AND m.start_date <= $1"
                    .to_string()
            }
            Sweep::UnconfirmedMeetup => format!(
                "JOIN meet_up_details m ON m.borrow_event_id = e.id \
                 JOIN meet_up_detail_meet_up_status ms ON ms.meet_up_detail_id = m.id \
                 WHERE s.borrow_status_id = ANY($2) AND m.start_date <= $1 \
                 AND ms.meet_up_status_id = {}",
                MeetupStatus::Pending.id()
            ),
            Sweep::OverdueAccepted => {
                "JOIN meet_up_details m ON m.borrow_event_id = e.id \
                 WHERE s.borrow_status_id = ANY($2) AND m.start_date < $1"
                    .to_string()
            }
            Sweep::ReturnDue => {
                "JOIN return_details r ON r.borrow_event_id = e.id \
                 WHERE s.borrow_status_id = ANY($2) AND r.return_date <= $1"
                    .to_string()
            }
            Sweep::OverdueReturn => format!(
                "JOIN return_details r ON r.borrow_event_id = e.id \
                 JOIN return_detail_return_status rs ON rs.return_detail_id = r.id \
                 WHERE s.borrow_status_id = ANY($2) AND r.return_date < $1 \
                 AND rs.return_status_id = {}",
                ReturnStatus::AwaitingConfirmation.id()
            ),
        };

        format!(
            "SELECT e.id FROM borrow_events e \
             JOIN borrow_event_borrow_status s ON s.borrow_event_id = e.id \
             {} ORDER BY e.id",
            condition
        )
    }
}

#[async_trait]
impl BorrowStore for PgBorrowStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> AppResult<Box<dyn BorrowTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBorrowTx { tx: Some(tx) }))
    }

    async fn event_details(&self, event_id: i64) -> AppResult<Option<BorrowEventDetails>> {
        let mut conn = self.pool.acquire().await?;

        let Some(event) = fetch_event(&mut conn, event_id, false).await? else {
            return Ok(None);
        };

        let meetup = match fetch_meetup(&mut conn, event_id).await? {
            Some(detail) => {
                let suggestions = fetch_meetup_suggestions(&mut conn, detail.id).await?;
                Some(MeetupDetails { detail, suggestions })
            }
            None => None,
        };

        let return_detail = match fetch_return(&mut conn, event_id).await? {
            Some(detail) => {
                let suggestions = fetch_return_suggestions(&mut conn, detail.id).await?;
                Some(ReturnDetails { detail, suggestions })
            }
            None => None,
        };

        let reject_reason = sqlx::query_as::<_, RejectReason>(
            "SELECT id, borrow_event_id, rejected_by, reason, created_at \
             FROM borrow_event_reject_reasons WHERE borrow_event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;

        let cancel_reason = sqlx::query_as::<_, CancelReason>(
            "SELECT id, borrow_event_id, cancelled_by, reason, created_at \
             FROM borrow_event_cancel_reasons WHERE borrow_event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;

        let report = sqlx::query_as::<_, Report>(
            "SELECT id, borrow_event_id, reported_by, reason, resolved, created_at \
             FROM borrow_event_reports WHERE borrow_event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(Some(BorrowEventDetails {
            event,
            meetup,
            return_detail,
            reject_reason,
            cancel_reason,
            report,
        }))
    }

    async fn list_events(
        &self,
        user_id: i64,
        party: Party,
        statuses: &[BorrowStatus],
    ) -> AppResult<Vec<BorrowEvent>> {
        let column = match party {
            Party::Borrower => "e.borrower_id",
            Party::Lender => "e.lender_id",
        };
        let sql = format!(
            "{} WHERE {} = $1 AND s.borrow_status_id = ANY($2) ORDER BY e.created_at DESC, e.id DESC",
            EVENT_SELECT, column
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(user_id)
            .bind(BorrowStatus::ids(statuses))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(BorrowEvent::try_from).collect()
    }

    async fn sweep_candidates(&self, sweep: Sweep, today: NaiveDate) -> AppResult<Vec<i64>> {
        let sql = Self::sweep_query(sweep);
        let ids = sqlx::query_scalar::<_, i64>(&sql)
            .bind(today)
            .bind(BorrowStatus::ids(sweep.candidate_statuses()))
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Open Postgres transaction; rolled back on drop unless committed
pub struct PgBorrowTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgBorrowTx {
    fn conn(&mut self) -> AppResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("Transaction already committed".to_string()))
    }
}

#[async_trait]
impl BorrowTx for PgBorrowTx {
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<BookRef>> {
        let conn = self.conn()?;
        let row = sqlx::query_as::<_, BookRow>(
            r#"
            SELECT b.id, b.owner_id, a.availability_id
            FROM books b
            JOIN book_availabilities a ON a.book_id = b.id
            WHERE b.id = $1
            FOR UPDATE OF b, a
            "#,
        )
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|r| {
            Ok(BookRef {
                id: r.id,
                owner_id: r.owner_id,
                availability: Availability::try_from(r.availability_id)?,
            })
        })
        .transpose()
    }

    async fn set_availability(&mut self, book_id: i64, availability: Availability) -> AppResult<()> {
        let conn = self.conn()?;
        sqlx::query(
            "UPDATE book_availabilities SET availability_id = $2, updated_at = NOW() WHERE book_id = $1",
        )
        .bind(book_id)
        .bind(availability.id())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn count_holding_events(&mut self, book_id: i64, except_event_id: i64) -> AppResult<i64> {
        let conn = self.conn()?;
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM borrow_events e
            JOIN borrow_event_borrow_status s ON s.borrow_event_id = e.id
            WHERE e.book_id = $1 AND e.id <> $2 AND s.borrow_status_id = ANY($3)
            "#,
        )
        .bind(book_id)
        .bind(except_event_id)
        .bind(BorrowStatus::ids(&BorrowStatus::HOLDING))
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    async fn lock_borrower(&mut self, borrower_id: i64) -> AppResult<()> {
        let conn = self.conn()?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(borrower_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn count_active_borrows(&mut self, borrower_id: i64) -> AppResult<i64> {
        let conn = self.conn()?;
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM borrow_events e
            JOIN borrow_event_borrow_status s ON s.borrow_event_id = e.id
            WHERE e.borrower_id = $1 AND s.borrow_status_id = ANY($2)
            "#,
        )
        .bind(borrower_id)
        .bind(BorrowStatus::ids(&BorrowStatus::ACTIVE))
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    async fn has_active_borrow_of(&mut self, borrower_id: i64, book_id: i64) -> AppResult<bool> {
        let conn = self.conn()?;
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM borrow_events e
                JOIN borrow_event_borrow_status s ON s.borrow_event_id = e.id
                WHERE e.borrower_id = $1 AND e.book_id = $2 AND s.borrow_status_id = ANY($3)
            )
            "#,
        )
        .bind(borrower_id)
        .bind(book_id)
        .bind(BorrowStatus::ids(&BorrowStatus::ACTIVE))
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    async fn insert_event(&mut self, event: &NewBorrowEvent) -> AppResult<BorrowEvent> {
        let conn = self.conn()?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO borrow_events (borrower_id, lender_id, book_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(event.borrower_id)
        .bind(event.lender_id)
        .bind(event.book_id)
        .bind(event.created_at)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO borrow_event_borrow_status (borrow_event_id, borrow_status_id, updated_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(BorrowStatus::Pending.id())
        .bind(event.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(BorrowEvent {
            id,
            borrower_id: event.borrower_id,
            lender_id: event.lender_id,
            book_id: event.book_id,
            status: BorrowStatus::Pending,
            created_at: event.created_at,
            status_updated_at: event.created_at,
        })
    }

    async fn lock_event(&mut self, event_id: i64) -> AppResult<Option<BorrowEvent>> {
        let conn = self.conn()?;
        fetch_event(conn, event_id, true).await
    }

    async fn set_status(
        &mut self,
        event_id: i64,
        status: BorrowStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let conn = self.conn()?;
        let result = sqlx::query(
            "UPDATE borrow_event_borrow_status SET borrow_status_id = $2, updated_at = $3 \
             WHERE borrow_event_id = $1",
        )
        .bind(event_id)
        .bind(status.id())
        .bind(at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Status of borrow event {} not found",
                event_id
            )));
        }
        Ok(())
    }

    async fn insert_meetup_detail(
        &mut self,
        event_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AppResult<MeetupDetail> {
        let conn = self.conn()?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO meet_up_details (borrow_event_id, start_date, end_date) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(event_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO meet_up_detail_meet_up_status (meet_up_detail_id, meet_up_status_id) \
             VALUES ($1, $2)",
        )
        .bind(id)
        .bind(MeetupStatus::Pending.id())
        .execute(&mut *conn)
        .await?;

        Ok(MeetupDetail {
            id,
            borrow_event_id: event_id,
            start_date,
            end_date,
            final_time: None,
            final_location: None,
            status: MeetupStatus::Pending,
        })
    }

    async fn meetup_detail(&mut self, event_id: i64) -> AppResult<Option<MeetupDetail>> {
        let conn = self.conn()?;
        fetch_meetup(conn, event_id).await
    }

    async fn set_meetup_final(
        &mut self,
        meetup_id: i64,
        time: NaiveTime,
        location: &str,
    ) -> AppResult<()> {
        let conn = self.conn()?;
        sqlx::query(
            "UPDATE meet_up_details SET final_time = $2, final_location = $3 WHERE id = $1",
        )
        .bind(meetup_id)
        .bind(time)
        .bind(location)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn set_meetup_status(&mut self, meetup_id: i64, status: MeetupStatus) -> AppResult<()> {
        let conn = self.conn()?;
        sqlx::query(
            "UPDATE meet_up_detail_meet_up_status SET meet_up_status_id = $2 \
             WHERE meet_up_detail_id = $1",
        )
        .bind(meetup_id)
        .bind(status.id())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn meetup_suggestions(&mut self, meetup_id: i64) -> AppResult<Vec<MeetupSuggestion>> {
        let conn = self.conn()?;
        fetch_meetup_suggestions(conn, meetup_id).await
    }

    async fn insert_meetup_suggestion(
        &mut self,
        suggestion: &NewMeetupSuggestion,
    ) -> AppResult<MeetupSuggestion> {
        let conn = self.conn()?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO meet_up_suggestions (
                meet_up_detail_id, suggested_by, suggested_time,
                suggested_location, suggested_reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(suggestion.meetup_detail_id)
        .bind(suggestion.suggested_by)
        .bind(suggestion.suggested_time)
        .bind(&suggestion.suggested_location)
        .bind(&suggestion.suggested_reason)
        .bind(suggestion.created_at)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO meet_up_suggestion_statuses (meet_up_suggestion_id, suggestion_status_id, created_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(SuggestionStatus::Pending.id())
        .bind(suggestion.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(MeetupSuggestion {
            id,
            meetup_detail_id: suggestion.meetup_detail_id,
            suggested_by: suggestion.suggested_by,
            suggested_time: suggestion.suggested_time,
            suggested_location: suggestion.suggested_location.clone(),
            suggested_reason: suggestion.suggested_reason.clone(),
            created_at: suggestion.created_at,
            status: SuggestionStatus::Pending,
        })
    }

    async fn push_meetup_suggestion_status(
        &mut self,
        suggestion_id: i64,
        status: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let conn = self.conn()?;
        sqlx::query(
            "INSERT INTO meet_up_suggestion_statuses (meet_up_suggestion_id, suggestion_status_id, created_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(suggestion_id)
        .bind(status.id())
        .bind(at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn insert_return_detail(
        &mut self,
        event_id: i64,
        return_date: NaiveDate,
    ) -> AppResult<ReturnDetail> {
        let conn = self.conn()?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO return_details (borrow_event_id, return_date) VALUES ($1, $2) RETURNING id",
        )
        .bind(event_id)
        .bind(return_date)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO return_detail_return_status (return_detail_id, return_status_id) \
             VALUES ($1, $2)",
        )
        .bind(id)
        .bind(ReturnStatus::Pending.id())
        .execute(&mut *conn)
        .await?;

        Ok(ReturnDetail {
            id,
            borrow_event_id: event_id,
            return_date,
            return_time: None,
            return_location: None,
            status: ReturnStatus::Pending,
        })
    }

    async fn return_detail(&mut self, event_id: i64) -> AppResult<Option<ReturnDetail>> {
        let conn = self.conn()?;
        fetch_return(conn, event_id).await
    }

    async fn set_return_handoff(
        &mut self,
        return_id: i64,
        time: NaiveTime,
        location: &str,
    ) -> AppResult<()> {
        let conn = self.conn()?;
        sqlx::query(
            "UPDATE return_details SET return_time = $2, return_location = $3 WHERE id = $1",
        )
        .bind(return_id)
        .bind(time)
        .bind(location)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn set_return_status(&mut self, return_id: i64, status: ReturnStatus) -> AppResult<()> {
        let conn = self.conn()?;
        sqlx::query(
            "UPDATE return_detail_return_status SET return_status_id = $2 WHERE return_detail_id = $1",
        )
        .bind(return_id)
        .bind(status.id())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn return_suggestions(&mut self, return_id: i64) -> AppResult<Vec<ReturnSuggestion>> {
        let conn = self.conn()?;
        fetch_return_suggestions(conn, return_id).await
    }

    async fn insert_return_suggestion(
        &mut self,
        suggestion: &NewReturnSuggestion,
    ) -> AppResult<ReturnSuggestion> {
        let conn = self.conn()?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO return_suggestions (
                return_detail_id, suggested_by, suggested_time, suggested_location, created_at
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(suggestion.return_detail_id)
        .bind(suggestion.suggested_by)
        .bind(suggestion.suggested_time)
        .bind(&suggestion.suggested_location)
        .bind(suggestion.created_at)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO return_suggestion_statuses (return_suggestion_id, suggestion_status_id, created_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(SuggestionStatus::Pending.id())
        .bind(suggestion.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(ReturnSuggestion {
            id,
            return_detail_id: suggestion.return_detail_id,
            suggested_by: suggestion.suggested_by,
            suggested_time: suggestion.suggested_time,
            suggested_location: suggestion.suggested_location.clone(),
            created_at: suggestion.created_at,
            status: SuggestionStatus::Pending,
        })
    }

    async fn push_return_suggestion_status(
        &mut self,
        suggestion_id: i64,
        status: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let conn = self.conn()?;
        sqlx::query(
            "INSERT INTO return_suggestion_statuses (return_suggestion_id, suggestion_status_id, created_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(suggestion_id)
        .bind(status.id())
        .bind(at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn delete_negotiation(&mut self, event_id: i64) -> AppResult<()> {
        let conn = self.conn()?;

        // Status cells first, then the details (suggestions cascade)
        sqlx::query(
            "DELETE FROM meet_up_detail_meet_up_status WHERE meet_up_detail_id IN \
             (SELECT id FROM meet_up_details WHERE borrow_event_id = $1)",
        )
        .bind(event_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "DELETE FROM return_detail_return_status WHERE return_detail_id IN \
             (SELECT id FROM return_details WHERE borrow_event_id = $1)",
        )
        .bind(event_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM meet_up_details WHERE borrow_event_id = $1")
            .bind(event_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("DELETE FROM return_details WHERE borrow_event_id = $1")
            .bind(event_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn insert_cancel_reason(
        &mut self,
        event_id: i64,
        cancelled_by: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<CancelReason> {
        let conn = self.conn()?;
        let row = sqlx::query_as::<_, CancelReason>(
            r#"
            INSERT INTO borrow_event_cancel_reasons (borrow_event_id, cancelled_by, reason, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, borrow_event_id, cancelled_by, reason, created_at
            "#,
        )
        .bind(event_id)
        .bind(cancelled_by)
        .bind(reason)
        .bind(at)
        .fetch_one(&mut *conn)
        .await
        .map_err(duplicate_as_conflict(format!(
            "Borrow event {} already has a cancel reason",
            event_id
        )))?;
        Ok(row)
    }

    async fn insert_reject_reason(
        &mut self,
        event_id: i64,
        rejected_by: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<RejectReason> {
        let conn = self.conn()?;
        let row = sqlx::query_as::<_, RejectReason>(
            r#"
            INSERT INTO borrow_event_reject_reasons (borrow_event_id, rejected_by, reason, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, borrow_event_id, rejected_by, reason, created_at
            "#,
        )
        .bind(event_id)
        .bind(rejected_by)
        .bind(reason)
        .bind(at)
        .fetch_one(&mut *conn)
        .await
        .map_err(duplicate_as_conflict(format!(
            "Borrow event {} already has a reject reason",
            event_id
        )))?;
        Ok(row)
    }

    async fn insert_report(
        &mut self,
        event_id: i64,
        reported_by: Option<i64>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Report> {
        let conn = self.conn()?;
        let row = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO borrow_event_reports (borrow_event_id, reported_by, reason, resolved, created_at)
            VALUES ($1, $2, $3, FALSE, $4)
            RETURNING id, borrow_event_id, reported_by, reason, resolved, created_at
            "#,
        )
        .bind(event_id)
        .bind(reported_by)
        .bind(reason)
        .bind(at)
        .fetch_one(&mut *conn)
        .await
        .map_err(duplicate_as_conflict(format!(
            "Borrow event {} already has a report",
            event_id
        )))?;
        Ok(row)
    }

    async fn resolve_report(&mut self, event_id: i64) -> AppResult<bool> {
        let conn = self.conn()?;
        let result = sqlx::query(
            "UPDATE borrow_event_reports SET resolved = TRUE WHERE borrow_event_id = $1",
        )
        .bind(event_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(&mut self) -> AppResult<()> {
        match self.tx.take() {
            Some(tx) => {
                tx.commit().await?;
                Ok(())
            }
            None => Err(AppError::Internal(
                "Transaction already committed".to_string(),
            )),
        }
    }
}
