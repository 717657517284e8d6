//! Background tickers for recurring credits.
//!
//! A [`Ticker`] repeatedly asks its [`RecurringJob`] for due schedules and
//! fires each one. The two jobs, [`AllowanceJob`] and [`InterestJob`], differ
//! only in what a firing credits; finding work and advancing `next_run_at`
//! follow the same rules:
//!
//! - The slot being paid is the schedule's `next_run_at` at firing time.
//! - A slot already credited (crash between credit and advance) is not
//!   credited again; the schedule is only advanced.
//! - The next slot is `next_after_execution(slot)`, or the first slot after
//!   now when that is already past. Missed periods are not back-filled.
//! - The advance is a compare-and-set on the cadence the schedule fired with,
//!   so an edit made during the firing keeps its own `next_run_at`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use kidbank_core::{
    calendar, AllowanceSchedule, DaySpec, Frequency, InterestSchedule, ScheduleId, ScheduleKind,
};
use kidbank_store::{
    AccrualOutcome, AllowanceRegistry, InterestAccrual, InterestRegistry, Ledger, LedgerEntry,
    Store, StoreError,
};

/// What a firing did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credit {
    /// A row was written.
    Posted(LedgerEntry),
    /// The slot had already been credited.
    AlreadyCredited,
    /// Interest rounded below one cent.
    BelowOneCent,
}

/// Result of firing one schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    /// The ledger side.
    pub credit: Credit,
    /// The slot the schedule was moved to.
    pub next_run_at: DateTime<Utc>,
    /// `false` when an edit changed the schedule during the firing and its
    /// own `next_run_at` was kept.
    pub advanced: bool,
}

/// Counts from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Schedules returned by the due query.
    pub due: usize,
    /// Firings that wrote a ledger row.
    pub fired: usize,
    /// Firings that wrote nothing but advanced the schedule.
    pub skipped: usize,
    /// Firings that returned an error; retried on the next scan.
    pub failed: usize,
}

/// One kind of recurring credit.
#[async_trait]
pub trait RecurringJob: Send + Sync {
    /// Schedule row type.
    type Schedule: Send + Sync;

    /// Used in logs.
    const KIND: ScheduleKind;

    /// Active schedules with `next_run_at <= now`, oldest first.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Self::Schedule>, StoreError>;

    /// The schedule's ID.
    fn schedule_id(schedule: &Self::Schedule) -> ScheduleId;

    /// Credit one schedule and advance it.
    async fn execute_one(
        &self,
        schedule: &Self::Schedule,
        now: DateTime<Utc>,
    ) -> Result<Firing, StoreError>;
}

/// The slot after `slot`, never at or before `now`.
#[must_use]
pub fn following_slot(
    frequency: Frequency,
    day: DaySpec,
    slot: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let next = calendar::next_after_execution(frequency, day, slot);
    if next <= now {
        calendar::next_run(frequency, day, now)
    } else {
        next
    }
}

/// Periodic scanner for one job.
pub struct Ticker<J> {
    job: J,
    interval: Duration,
}

impl<J: RecurringJob> Ticker<J> {
    /// Create a ticker that scans every `interval` (must be non-zero).
    #[must_use]
    pub const fn new(job: J, interval: Duration) -> Self {
        Self { job, interval }
    }

    /// The wrapped job.
    pub const fn job(&self) -> &J {
        &self.job
    }

    /// Fire everything due at `now`.
    pub async fn scan(&self, now: DateTime<Utc>) -> ScanReport {
        self.scan_until(now, None).await
    }

    async fn scan_until(
        &self,
        now: DateTime<Utc>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> ScanReport {
        let kind = J::KIND.as_str();
        let mut report = ScanReport::default();

        let due = match self.job.list_due(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(kind, error = %e, "Failed to list due schedules");
                return report;
            }
        };
        report.due = due.len();

        for schedule in &due {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!(kind, "Shutdown requested, stopping scan");
                break;
            }

            let schedule_id = J::schedule_id(schedule);
            match self.job.execute_one(schedule, now).await {
                Ok(firing) => {
                    if !firing.advanced {
                        tracing::warn!(
                            kind,
                            schedule_id = %schedule_id,
                            "Schedule changed during firing, keeping its new next_run_at"
                        );
                    }
                    match &firing.credit {
                        Credit::Posted(entry) => {
                            report.fired += 1;
                            tracing::info!(
                                kind,
                                schedule_id = %schedule_id,
                                child_id = %entry.transaction.child_id,
                                amount_cents = entry.transaction.amount_cents,
                                balance_cents = entry.balance_cents,
                                next_run_at = %firing.next_run_at,
                                "Recurring credit posted"
                            );
                        }
                        skipped => {
                            report.skipped += 1;
                            tracing::debug!(
                                kind,
                                schedule_id = %schedule_id,
                                reason = ?skipped,
                                next_run_at = %firing.next_run_at,
                                "Recurring credit skipped"
                            );
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        kind,
                        schedule_id = %schedule_id,
                        error = %e,
                        "Recurring credit failed"
                    );
                }
            }
        }

        if report.due > 0 {
            tracing::info!(
                kind,
                due = report.due,
                fired = report.fired,
                skipped = report.skipped,
                failed = report.failed,
                "Scan complete"
            );
        }
        report
    }

    /// Scan now, then every interval, until `shutdown` becomes `true` or its
    /// sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let kind = J::KIND.as_str();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(kind, interval_secs = self.interval.as_secs(), "Ticker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }
            self.scan_until(Utc::now(), Some(&shutdown)).await;
        }

        tracing::info!(kind, "Ticker stopped");
    }
}

// =============================================================================
// Allowance
// =============================================================================

/// Credits allowances.
#[derive(Clone)]
pub struct AllowanceJob {
    store: Arc<dyn Store>,
}

impl AllowanceJob {
    /// Create the job.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecurringJob for AllowanceJob {
    type Schedule = AllowanceSchedule;

    const KIND: ScheduleKind = ScheduleKind::Allowance;

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<AllowanceSchedule>, StoreError> {
        self.store.list_due_allowances(now).await
    }

    fn schedule_id(schedule: &AllowanceSchedule) -> ScheduleId {
        schedule.id
    }

    async fn execute_one(
        &self,
        schedule: &AllowanceSchedule,
        now: DateTime<Utc>,
    ) -> Result<Firing, StoreError> {
        let slot = schedule.next_run_at.unwrap_or(now);

        let credit = if self.store.has_schedule_credit_for(schedule.id, slot).await? {
            Credit::AlreadyCredited
        } else {
            let entry = self
                .store
                .credit_allowance(
                    schedule.child_id,
                    schedule.owner_id,
                    schedule.amount_cents,
                    schedule.id,
                    schedule.note.clone(),
                    slot,
                )
                .await?;
            Credit::Posted(entry)
        };

        let next_run_at = following_slot(schedule.frequency, schedule.day, slot, now);
        let advanced = self
            .store
            .advance_allowance(
                schedule.id,
                slot,
                (schedule.frequency, schedule.day),
                next_run_at,
            )
            .await?;

        Ok(Firing {
            credit,
            next_run_at,
            advanced,
        })
    }
}

// =============================================================================
// Interest
// =============================================================================

/// Accrues interest on the child's current balance and rate.
#[derive(Clone)]
pub struct InterestJob {
    store: Arc<dyn Store>,
}

impl InterestJob {
    /// Create the job.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

fn interest_note(frequency: Frequency) -> String {
    let period = match frequency {
        Frequency::Weekly => "Weekly",
        Frequency::Biweekly => "Biweekly",
        Frequency::Monthly => "Monthly",
    };
    format!("{period} interest")
}

#[async_trait]
impl RecurringJob for InterestJob {
    type Schedule = InterestSchedule;

    const KIND: ScheduleKind = ScheduleKind::Interest;

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<InterestSchedule>, StoreError> {
        self.store.list_due_interest(now).await
    }

    fn schedule_id(schedule: &InterestSchedule) -> ScheduleId {
        schedule.id
    }

    async fn execute_one(
        &self,
        schedule: &InterestSchedule,
        now: DateTime<Utc>,
    ) -> Result<Firing, StoreError> {
        let slot = schedule.next_run_at.unwrap_or(now);

        let accrual = InterestAccrual {
            child_id: schedule.child_id,
            actor_id: schedule.owner_id,
            schedule_id: schedule.id,
            frequency: schedule.frequency,
            slot,
            note: Some(interest_note(schedule.frequency)),
        };
        let credit = match self.store.accrue_interest(&accrual).await? {
            AccrualOutcome::Credited(entry) => Credit::Posted(entry),
            AccrualOutcome::AlreadyCredited => Credit::AlreadyCredited,
            AccrualOutcome::BelowOneCent => Credit::BelowOneCent,
        };

        let next_run_at = following_slot(schedule.frequency, schedule.day, slot, now);
        let advanced = self
            .store
            .advance_interest(
                schedule.id,
                slot,
                (schedule.frequency, schedule.day),
                next_run_at,
            )
            .await?;

        Ok(Firing {
            credit,
            next_run_at,
            advanced,
        })
    }
}
