//! Reconciliation sweeps over stalled borrow events
//!
//! A sweep scans for candidates once, then handles each event in its own
//! transaction. The predicate is evaluated again after the event is locked,
//! so a candidate that moved on in the meantime is skipped rather than
//! clobbered. One event failing never stops the sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinHandle;

use crate::{
    clock::Clock,
    error::AppResult,
    models::{BorrowStatus, Party, Sweep, SweepAction, SweepReport, UserClaims},
    repository::Repository,
};

use super::borrows::cancel_locked;

#[derive(Clone)]
pub struct SweepService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl SweepService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Run one sweep as of the clock's current date
    pub async fn run(&self, sweep: Sweep) -> AppResult<SweepReport> {
        let today = self.clock.today();
        let candidates = self
            .repository
            .borrows
            .sweep_candidates(sweep, today)
            .await?;

        let mut report = SweepReport::new(sweep, today);
        report.found = candidates.len();

        for event_id in candidates {
            match self.process(sweep, event_id, today).await {
                Ok(true) => {
                    tracing::info!(sweep = sweep.name(), event_id, "Sweep processed event");
                    report.succeeded += 1;
                    report.processed.push(event_id);
                }
                Ok(false) => {
                    tracing::debug!(sweep = sweep.name(), event_id, "Candidate no longer matches");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(sweep = sweep.name(), event_id, error = %e, "Sweep failed on event");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            sweep = sweep.name(),
            %today,
            found = report.found,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Sweep finished"
        );
        Ok(report)
    }

    /// Run every sweep in order
    pub async fn run_all(&self) -> AppResult<Vec<SweepReport>> {
        let mut reports = Vec::with_capacity(Sweep::ALL.len());
        for sweep in Sweep::ALL {
            reports.push(self.run(sweep).await?);
        }
        Ok(reports)
    }

    /// Administrator-triggered run of one sweep, or all of them
    pub async fn trigger(
        &self,
        admin: &UserClaims,
        sweep: Option<Sweep>,
    ) -> AppResult<Vec<SweepReport>> {
        admin.require_admin()?;
        tracing::info!(
            admin_id = admin.user_id,
            sweep = sweep.map(Sweep::name).unwrap_or("all"),
            "Sweep triggered"
        );
        match sweep {
            Some(sweep) => Ok(vec![self.run(sweep).await?]),
            None => self.run_all().await,
        }
    }

    /// Run all sweeps every `interval` until the runtime shuts down
    pub fn spawn_scheduler(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_all().await {
                    tracing::error!(error = %e, "Scheduled sweep run failed");
                }
            }
        })
    }

    /// Apply the sweep to one event; `false` when it no longer qualifies
    async fn process(&self, sweep: Sweep, event_id: i64, today: NaiveDate) -> AppResult<bool> {
        let now = self.clock.now();
        let mut tx = self.repository.borrows.begin().await?;

        let Some(event) = tx.lock_event(event_id).await? else {
            return Ok(false);
        };
        let meetup = tx.meetup_detail(event_id).await?;
        let return_detail = tx.return_detail(event_id).await?;
        if !sweep.matches(&event, meetup.as_ref(), return_detail.as_ref(), today) {
            return Ok(false);
        }

        match sweep.action() {
            SweepAction::Cancel {
                attributed_to,
                reason,
            } => {
                let cancelled_by = match attributed_to {
                    Party::Borrower => event.borrower_id,
                    Party::Lender => event.lender_id,
                };
                cancel_locked(&mut *tx, &event, cancelled_by, reason, now).await?;
            }
            SweepAction::Transition(status) => {
                tx.set_status(event.id, status, now).await?;
            }
            SweepAction::Escalate { reason } => {
                tx.set_status(event.id, BorrowStatus::Deposit, now).await?;
                tx.insert_report(event.id, None, reason, now).await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }
}
