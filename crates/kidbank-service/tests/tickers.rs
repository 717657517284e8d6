//! Allowance and interest ticker tests.
//!
//! Scans are driven with explicit instants so every firing is deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

use kidbank_core::{
    Child, DaySpec, Family, Frequency, Parent, ScheduleId, ScheduleKind, ScheduleStatus,
    TransactionKind,
};
use kidbank_service::ticker::{Credit, Firing};
use kidbank_service::{AllowanceJob, InterestJob, RecurringJob, ScanReport, Ticker};
use kidbank_store::{
    AccountStore, AllowanceFields, AllowanceRegistry, InterestRegistry, Ledger, NewAllowance,
    NewInterest, SqliteStore, Store, StoreError,
};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

const MINUTE: StdDuration = StdDuration::from_secs(60);

struct Fixture {
    store: Arc<SqliteStore>,
    parent: Parent,
    child: Child,
}

impl Fixture {
    async fn new(balance_cents: i64, rate_bps: i64) -> Self {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let family = Family::new("Lovelace");
        let parent = Parent::new(family.id, "Ada");
        let child = Child::new(family.id, "Byron", rate_bps);
        store.create_family(&family).await.unwrap();
        store.create_parent(&parent).await.unwrap();
        store.create_child(&child).await.unwrap();
        if balance_cents > 0 {
            store
                .deposit(child.id, parent.id, balance_cents, None)
                .await
                .unwrap();
        }
        Self {
            store,
            parent,
            child,
        }
    }

    fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    fn allowance_ticker(&self) -> Ticker<AllowanceJob> {
        Ticker::new(AllowanceJob::new(self.dyn_store()), MINUTE)
    }

    fn interest_ticker(&self) -> Ticker<InterestJob> {
        Ticker::new(InterestJob::new(self.dyn_store()), MINUTE)
    }

    async fn allowance(
        &self,
        amount_cents: i64,
        frequency: Frequency,
        day: DaySpec,
        now: DateTime<Utc>,
    ) -> ScheduleId {
        let new = NewAllowance {
            child_id: self.child.id,
            owner_id: self.parent.id,
            amount_cents,
            frequency,
            day,
            note: Some("Allowance".into()),
        };
        self.store.create_allowance(&new, now).await.unwrap().id
    }

    async fn interest(&self, frequency: Frequency, day: DaySpec, now: DateTime<Utc>) -> ScheduleId {
        let new = NewInterest {
            child_id: self.child.id,
            owner_id: self.parent.id,
            frequency,
            day,
        };
        self.store.create_interest(&new, now).await.unwrap().id
    }

    async fn balance(&self) -> i64 {
        self.store
            .get_child(self.child.id)
            .await
            .unwrap()
            .unwrap()
            .balance_cents
    }

    async fn rows_of(&self, kind: TransactionKind) -> Vec<i64> {
        self.store
            .list_by_child(self.child.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.amount_cents)
            .collect()
    }

    async fn allowance_next(&self, id: ScheduleId) -> Option<DateTime<Utc>> {
        self.store
            .get_allowance(id)
            .await
            .unwrap()
            .unwrap()
            .next_run_at
    }

    async fn interest_next(&self, id: ScheduleId) -> Option<DateTime<Utc>> {
        self.store
            .get_interest(id)
            .await
            .unwrap()
            .unwrap()
            .next_run_at
    }
}

// ============================================================================
// Allowance
// ============================================================================

#[tokio::test]
async fn resumed_weekly_allowance_fires_once() {
    let fx = Fixture::new(0, 0).await;
    let friday = DaySpec::DayOfWeek(5);
    let id = fx
        .allowance(1500, Frequency::Weekly, friday, at(2025, 1, 17, 12, 0))
        .await;
    fx.store
        .update_allowance_status(id, ScheduleStatus::Paused, at(2025, 1, 18, 9, 0))
        .await
        .unwrap();
    let resumed = fx
        .store
        .update_allowance_status(id, ScheduleStatus::Active, at(2025, 1, 20, 9, 0))
        .await
        .unwrap();
    assert_eq!(resumed.next_run_at, Some(at(2025, 1, 24, 0, 0)));

    let ticker = fx.allowance_ticker();

    // Not due yet.
    let report = ticker.scan(at(2025, 1, 23, 23, 59)).await;
    assert_eq!(report, ScanReport::default());

    let now = at(2025, 1, 24, 0, 1);
    let report = ticker.scan(now).await;
    assert_eq!(
        report,
        ScanReport {
            due: 1,
            fired: 1,
            skipped: 0,
            failed: 0
        }
    );

    assert_eq!(fx.rows_of(TransactionKind::Allowance).await, [1500]);
    assert_eq!(fx.balance().await, 1500);
    assert_eq!(fx.allowance_next(id).await, Some(at(2025, 1, 31, 0, 0)));
    assert!(fx.store.list_due_allowances(now).await.unwrap().is_empty());

    // A second scan at the same instant finds nothing.
    assert_eq!(ticker.scan(now).await.due, 0);
    assert_eq!(fx.balance().await, 1500);
}

#[tokio::test]
async fn allowance_row_links_schedule_and_owner() {
    let fx = Fixture::new(0, 0).await;
    let id = fx
        .allowance(
            250,
            Frequency::Weekly,
            DaySpec::DayOfWeek(5),
            at(2025, 1, 17, 12, 0),
        )
        .await;

    fx.allowance_ticker().scan(at(2025, 1, 24, 6, 0)).await;

    let rows = fx.store.list_by_child(fx.child.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].schedule_id, Some(id));
    assert_eq!(rows[0].actor_id, fx.parent.id);
    assert_eq!(rows[0].note.as_deref(), Some("Allowance"));
    assert_eq!(rows[0].period_at, Some(at(2025, 1, 24, 0, 0)));
    assert!(rows[0].created_at > at(2025, 1, 24, 6, 0));
}

#[tokio::test]
async fn allowance_row_lists_after_a_deposit_made_during_the_scan() {
    let fx = Fixture::new(0, 0).await;
    let created = Utc::now() - chrono::Duration::days(8);
    fx.allowance(500, Frequency::Weekly, DaySpec::DayOfWeek(5), created)
        .await;

    let scan_now = Utc::now();
    tokio::time::sleep(StdDuration::from_millis(5)).await;
    fx.store
        .deposit(fx.child.id, fx.parent.id, 100, None)
        .await
        .unwrap();
    let report = fx.allowance_ticker().scan(scan_now).await;
    assert_eq!(report.fired, 1);

    let rows = fx.store.list_by_child(fx.child.id).await.unwrap();
    let kinds: Vec<_> = rows.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, [TransactionKind::Allowance, TransactionKind::Deposit]);
    assert!(rows[0].created_at >= rows[1].created_at);
    assert!(rows[0].id > rows[1].id);
}

#[tokio::test]
async fn monthly_allowance_clamps_through_february() {
    let fx = Fixture::new(0, 0).await;
    let id = fx
        .allowance(
            1000,
            Frequency::Monthly,
            DaySpec::DayOfMonth(31),
            at(2025, 1, 15, 0, 0),
        )
        .await;
    assert_eq!(fx.allowance_next(id).await, Some(at(2025, 1, 31, 0, 0)));

    let ticker = fx.allowance_ticker();

    ticker.scan(at(2025, 1, 31, 0, 0)).await;
    assert_eq!(fx.allowance_next(id).await, Some(at(2025, 2, 28, 0, 0)));

    ticker.scan(at(2025, 2, 28, 0, 30)).await;
    assert_eq!(fx.allowance_next(id).await, Some(at(2025, 3, 31, 0, 0)));

    assert_eq!(fx.rows_of(TransactionKind::Allowance).await, [1000, 1000]);
    assert_eq!(fx.balance().await, 2000);
}

#[tokio::test]
async fn downtime_fires_once_and_skips_missed_weeks() {
    let fx = Fixture::new(0, 0).await;
    let id = fx
        .allowance(
            500,
            Frequency::Weekly,
            DaySpec::DayOfWeek(5),
            at(2025, 1, 17, 12, 0),
        )
        .await;

    // Down from before 01-24 until Thursday 02-20.
    let now = at(2025, 2, 20, 10, 0);
    let report = fx.allowance_ticker().scan(now).await;

    assert_eq!(report.fired, 1);
    assert_eq!(fx.rows_of(TransactionKind::Allowance).await, [500]);
    assert_eq!(fx.allowance_next(id).await, Some(at(2025, 2, 21, 0, 0)));
    assert!(fx.store.list_due_allowances(now).await.unwrap().is_empty());
}

#[tokio::test]
async fn credited_slot_is_not_paid_twice() {
    let fx = Fixture::new(0, 0).await;
    let id = fx
        .allowance(
            500,
            Frequency::Weekly,
            DaySpec::DayOfWeek(5),
            at(2025, 1, 17, 12, 0),
        )
        .await;
    let ticker = fx.allowance_ticker();
    ticker.scan(at(2025, 1, 24, 0, 5)).await;

    // As if the process died between the credit and the advance.
    fx.store
        .update_allowance_next_run_at(id, at(2025, 1, 24, 0, 0))
        .await
        .unwrap();

    let report = ticker.scan(at(2025, 1, 24, 0, 6)).await;
    assert_eq!(report.due, 1);
    assert_eq!(report.fired, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(fx.rows_of(TransactionKind::Allowance).await, [500]);
    assert_eq!(fx.allowance_next(id).await, Some(at(2025, 1, 31, 0, 0)));
}

#[tokio::test]
async fn paused_allowance_never_fires() {
    let fx = Fixture::new(0, 0).await;
    let id = fx
        .allowance(
            500,
            Frequency::Weekly,
            DaySpec::DayOfWeek(5),
            at(2025, 1, 17, 12, 0),
        )
        .await;
    fx.store
        .update_allowance_status(id, ScheduleStatus::Paused, at(2025, 1, 18, 0, 0))
        .await
        .unwrap();

    let report = fx.allowance_ticker().scan(at(2025, 3, 1, 0, 0)).await;

    assert_eq!(report.due, 0);
    assert_eq!(fx.balance().await, 0);
}

#[tokio::test]
async fn edit_during_firing_keeps_the_edit() {
    let fx = Fixture::new(0, 0).await;
    let id = fx
        .allowance(
            500,
            Frequency::Weekly,
            DaySpec::DayOfWeek(5),
            at(2025, 1, 17, 12, 0),
        )
        .await;
    let now = at(2025, 1, 24, 0, 1);
    let job = AllowanceJob::new(fx.dyn_store());

    let snapshot = job.list_due(now).await.unwrap().remove(0);

    // A parent switches to Mondays and doubles the amount mid-firing.
    let edit = AllowanceFields {
        amount_cents: 1000,
        frequency: Frequency::Weekly,
        day: DaySpec::DayOfWeek(1),
        note: None,
    };
    let edited = fx
        .store
        .update_allowance_fields(id, &edit, now)
        .await
        .unwrap();
    assert_eq!(edited.next_run_at, Some(at(2025, 1, 27, 0, 0)));

    let firing = job.execute_one(&snapshot, now).await.unwrap();

    // Fired with the values it was scheduled with...
    assert!(matches!(firing.credit, Credit::Posted(ref e) if e.transaction.amount_cents == 500));
    // ...and the edit's own next_run_at stands.
    assert!(!firing.advanced);
    assert_eq!(fx.allowance_next(id).await, Some(at(2025, 1, 27, 0, 0)));
    assert!(fx.store.list_due_allowances(now).await.unwrap().is_empty());
}

// ============================================================================
// Interest
// ============================================================================

#[tokio::test]
async fn monthly_interest_rounds_to_cents() {
    let fx = Fixture::new(10_000, 1_000).await;
    let id = fx
        .interest(
            Frequency::Monthly,
            DaySpec::DayOfMonth(1),
            at(2025, 1, 15, 0, 0),
        )
        .await;
    assert_eq!(fx.interest_next(id).await, Some(at(2025, 2, 1, 0, 0)));

    let now = at(2025, 2, 1, 0, 5);
    let report = fx.interest_ticker().scan(now).await;

    assert_eq!(report.fired, 1);
    assert_eq!(fx.rows_of(TransactionKind::Interest).await, [83]);
    assert_eq!(fx.balance().await, 10_083);
    assert_eq!(fx.interest_next(id).await, Some(at(2025, 3, 1, 0, 0)));

    let rows = fx.store.list_by_child(fx.child.id).await.unwrap();
    assert_eq!(rows[0].period_at, Some(at(2025, 2, 1, 0, 0)));
    let child = fx.store.get_child(fx.child.id).await.unwrap().unwrap();
    assert_eq!(child.last_interest_at, Some(rows[0].created_at));
}

#[tokio::test]
async fn interest_row_lists_after_a_deposit_made_during_the_scan() {
    let fx = Fixture::new(10_000, 1_000).await;
    let created = Utc::now() - chrono::Duration::days(40);
    fx.interest(Frequency::Monthly, DaySpec::DayOfMonth(1), created)
        .await;

    let scan_now = Utc::now();
    tokio::time::sleep(StdDuration::from_millis(5)).await;
    fx.store
        .deposit(fx.child.id, fx.parent.id, 100, None)
        .await
        .unwrap();
    let report = fx.interest_ticker().scan(scan_now).await;
    assert_eq!(report.fired, 1);

    let rows = fx.store.list_by_child(fx.child.id).await.unwrap();
    let kinds: Vec<_> = rows.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        [
            TransactionKind::Interest,
            TransactionKind::Deposit,
            TransactionKind::Deposit
        ]
    );
    assert!(rows.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let child = fx.store.get_child(fx.child.id).await.unwrap().unwrap();
    assert_eq!(child.last_interest_at, Some(rows[0].created_at));
    assert!(rows[0].created_at > scan_now);
}

#[tokio::test]
async fn interest_compounds_on_current_balance() {
    let fx = Fixture::new(10_000, 1_000).await;
    fx.interest(
        Frequency::Monthly,
        DaySpec::DayOfMonth(1),
        at(2025, 1, 15, 0, 0),
    )
    .await;
    let ticker = fx.interest_ticker();

    ticker.scan(at(2025, 2, 1, 0, 5)).await;
    // A deposit between firings is part of the next accrual.
    fx.store
        .deposit(fx.child.id, fx.parent.id, 1_917, None)
        .await
        .unwrap();
    ticker.scan(at(2025, 3, 1, 0, 5)).await;

    // 12_000 * 1000 / 12 / 10_000 = 100
    assert_eq!(fx.rows_of(TransactionKind::Interest).await, [100, 83]);
    assert_eq!(fx.balance().await, 12_100);
}

#[tokio::test]
async fn sub_cent_interest_writes_nothing_but_advances() {
    let fx = Fixture::new(100, 500).await;
    let id = fx
        .interest(
            Frequency::Monthly,
            DaySpec::DayOfMonth(1),
            at(2025, 1, 15, 0, 0),
        )
        .await;

    let report = fx.interest_ticker().scan(at(2025, 2, 1, 0, 5)).await;

    assert_eq!(report.due, 1);
    assert_eq!(report.fired, 0);
    assert_eq!(report.skipped, 1);
    assert!(fx.rows_of(TransactionKind::Interest).await.is_empty());
    assert_eq!(fx.balance().await, 100);
    assert_eq!(fx.interest_next(id).await, Some(at(2025, 3, 1, 0, 0)));

    let child = fx.store.get_child(fx.child.id).await.unwrap().unwrap();
    assert!(child.last_interest_at.is_none());
}

#[tokio::test]
async fn interest_slot_guard_survives_a_reset() {
    let fx = Fixture::new(10_000, 1_000).await;
    let id = fx
        .interest(
            Frequency::Monthly,
            DaySpec::DayOfMonth(1),
            at(2025, 1, 15, 0, 0),
        )
        .await;
    let ticker = fx.interest_ticker();
    ticker.scan(at(2025, 2, 1, 0, 5)).await;

    fx.store
        .update_interest_next_run_at(id, at(2025, 2, 1, 0, 0))
        .await
        .unwrap();
    let report = ticker.scan(at(2025, 2, 1, 0, 10)).await;

    assert_eq!(report.skipped, 1);
    assert_eq!(fx.rows_of(TransactionKind::Interest).await, [83]);
    assert_eq!(fx.interest_next(id).await, Some(at(2025, 3, 1, 0, 0)));
}

#[tokio::test]
async fn late_month_end_interest_does_not_cost_the_next_month() {
    let fx = Fixture::new(10_000, 1_000).await;
    let id = fx
        .interest(
            Frequency::Monthly,
            DaySpec::DayOfMonth(31),
            at(2025, 1, 15, 0, 0),
        )
        .await;
    let ticker = fx.interest_ticker();

    // The January slot is only reached in February.
    ticker.scan(at(2025, 2, 3, 9, 0)).await;
    assert_eq!(fx.interest_next(id).await, Some(at(2025, 2, 28, 0, 0)));

    let report = ticker.scan(at(2025, 2, 28, 0, 5)).await;
    assert_eq!(report.fired, 1);
    assert_eq!(fx.rows_of(TransactionKind::Interest).await, [84, 83]);
    assert_eq!(fx.interest_next(id).await, Some(at(2025, 3, 31, 0, 0)));
}

#[tokio::test]
async fn biweekly_interest_uses_26_periods() {
    // 26_000 * 1000 / 26 / 10_000 = 100
    let fx = Fixture::new(26_000, 1_000).await;
    let id = fx
        .interest(
            Frequency::Biweekly,
            DaySpec::DayOfWeek(5),
            at(2025, 1, 17, 12, 0),
        )
        .await;
    assert_eq!(fx.interest_next(id).await, Some(at(2025, 1, 31, 0, 0)));

    fx.interest_ticker().scan(at(2025, 1, 31, 1, 0)).await;

    assert_eq!(fx.rows_of(TransactionKind::Interest).await, [100]);
    assert_eq!(fx.interest_next(id).await, Some(at(2025, 2, 14, 0, 0)));
}

// ============================================================================
// Scan loop
// ============================================================================

/// Allowance job that fails for one schedule.
struct Poisoned {
    inner: AllowanceJob,
    poisoned: ScheduleId,
}

#[async_trait]
impl RecurringJob for Poisoned {
    type Schedule = <AllowanceJob as RecurringJob>::Schedule;

    const KIND: ScheduleKind = ScheduleKind::Allowance;

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Self::Schedule>, StoreError> {
        self.inner.list_due(now).await
    }

    fn schedule_id(schedule: &Self::Schedule) -> ScheduleId {
        schedule.id
    }

    async fn execute_one(
        &self,
        schedule: &Self::Schedule,
        now: DateTime<Utc>,
    ) -> Result<Firing, StoreError> {
        if schedule.id == self.poisoned {
            return Err(StoreError::Database("disk I/O error".into()));
        }
        self.inner.execute_one(schedule, now).await
    }
}

#[tokio::test]
async fn one_failure_does_not_stop_the_scan() {
    let fx = Fixture::new(0, 0).await;
    let created = at(2025, 1, 17, 12, 0);
    let first = fx
        .allowance(100, Frequency::Weekly, DaySpec::DayOfWeek(5), created)
        .await;

    let sibling = Child::new(fx.child.family_id, "Annabella", 0);
    fx.store.create_child(&sibling).await.unwrap();
    let new = NewAllowance {
        child_id: sibling.id,
        owner_id: fx.parent.id,
        amount_cents: 200,
        frequency: Frequency::Weekly,
        day: DaySpec::DayOfWeek(5),
        note: None,
    };
    fx.store.create_allowance(&new, created).await.unwrap();

    let ticker = Ticker::new(
        Poisoned {
            inner: AllowanceJob::new(fx.dyn_store()),
            poisoned: first,
        },
        MINUTE,
    );
    let now = at(2025, 1, 24, 0, 1);
    let report = ticker.scan(now).await;

    assert_eq!(report.due, 2);
    assert_eq!(report.fired, 1);
    assert_eq!(report.failed, 1);

    // The failed one is retried next scan.
    let due = fx.store.list_due_allowances(now).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, first);
    assert_eq!(fx.balance().await, 0);

    let report = fx.allowance_ticker().scan(now).await;
    assert_eq!(report.fired, 1);
    assert_eq!(fx.balance().await, 100);
}

/// Counts calls; optionally requests shutdown on the first firing.
struct Counting {
    due: usize,
    scans: Arc<AtomicUsize>,
    fired: Arc<AtomicUsize>,
    stop: Option<watch::Sender<bool>>,
}

#[async_trait]
impl RecurringJob for Counting {
    type Schedule = ScheduleId;

    const KIND: ScheduleKind = ScheduleKind::Interest;

    async fn list_due(&self, _now: DateTime<Utc>) -> Result<Vec<ScheduleId>, StoreError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.due).map(|_| ScheduleId::generate()).collect())
    }

    fn schedule_id(schedule: &ScheduleId) -> ScheduleId {
        *schedule
    }

    async fn execute_one(
        &self,
        _schedule: &ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<Firing, StoreError> {
        self.fired.fetch_add(1, Ordering::SeqCst);
        if let Some(stop) = &self.stop {
            let _ = stop.send(true);
        }
        Ok(Firing {
            credit: Credit::AlreadyCredited,
            next_run_at: now,
            advanced: true,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn run_scans_immediately_then_every_interval() {
    let scans = Arc::new(AtomicUsize::new(0));
    let job = Counting {
        due: 0,
        scans: Arc::clone(&scans),
        fired: Arc::new(AtomicUsize::new(0)),
        stop: None,
    };
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(Ticker::new(job, MINUTE).run(rx));

    tokio::time::sleep(StdDuration::from_secs(150)).await;
    assert_eq!(scans.load(Ordering::SeqCst), 3);

    tx.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(scans.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_between_schedules() {
    let (tx, rx) = watch::channel(false);
    let scans = Arc::new(AtomicUsize::new(0));
    let fired = Arc::new(AtomicUsize::new(0));
    let job = Counting {
        due: 3,
        scans: Arc::clone(&scans),
        fired: Arc::clone(&fired),
        stop: Some(tx.clone()),
    };

    Ticker::new(job, MINUTE).run(rx).await;

    assert_eq!(scans.load(Ordering::SeqCst), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn dropped_sender_stops_the_ticker() {
    let (tx, rx) = watch::channel(false);
    let job = Counting {
        due: 0,
        scans: Arc::new(AtomicUsize::new(0)),
        fired: Arc::new(AtomicUsize::new(0)),
        stop: None,
    };
    let handle = tokio::spawn(Ticker::new(job, MINUTE).run(rx));

    drop(tx);
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("ticker exits")
        .unwrap();
}
