//! SQLite storage layer for kidbank.
//!
//! This crate persists families, children, the ledger and both schedule
//! families, and provides the atomic money primitives the HTTP handlers and
//! the tickers share.
//!
//! # Architecture
//!
//! The storage is split into four traits, one per component, all implemented
//! by [`SqliteStore`]:
//!
//! - [`AccountStore`]: families, parents, children
//! - [`Ledger`]: deposits, withdrawals, recurring credits, listing
//! - [`AllowanceRegistry`]: allowance schedules
//! - [`InterestRegistry`]: interest schedules
//!
//! [`Store`] is the union of the four and is what services hold as
//! `Arc<dyn Store>`.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> kidbank_store::Result<()> {
//! use kidbank_core::{Child, Family, Parent};
//! use kidbank_store::{AccountStore, Ledger, SqliteStore};
//!
//! let store = SqliteStore::connect("sqlite://kidbank.db", 5).await?;
//!
//! let family = Family::new("Lovelace");
//! store.create_family(&family).await?;
//! let parent = Parent::new(family.id, "Ada");
//! store.create_parent(&parent).await?;
//! let child = Child::new(family.id, "Byron", 500);
//! store.create_child(&child).await?;
//!
//! let entry = store.deposit(child.id, parent.id, 2_500, None).await?;
//! assert_eq!(entry.balance_cents, 2_500);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod accounts;
pub mod error;
mod ledger;
pub mod locks;
pub mod model;
mod schedules;
pub mod schema;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use model::{
    AccrualOutcome, AllowanceFields, ChildUpdate, FamilySchedule, InterestAccrual, LedgerEntry,
    NewAllowance, NewInterest,
};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kidbank_core::{
    AllowanceSchedule, Child, ChildId, DaySpec, Family, FamilyId, Frequency, InterestSchedule,
    Parent, ParentId, ScheduleId, ScheduleStatus, Transaction,
};

/// Family, parent and child persistence.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a family.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn create_family(&self, family: &Family) -> Result<()>;

    /// Get a family by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_family(&self, family_id: FamilyId) -> Result<Option<Family>>;

    /// Delete a family with its parents, children, ledgers and schedules.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the family doesn't exist.
    async fn delete_family(&self, family_id: FamilyId) -> Result<()>;

    /// Insert a parent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the family doesn't exist.
    async fn create_parent(&self, parent: &Parent) -> Result<()>;

    /// Get a parent by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_parent(&self, parent_id: ParentId) -> Result<Option<Parent>>;

    /// Insert a child.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateName` if the family already has a child with that name.
    /// - `StoreError::NotFound` if the family doesn't exist.
    async fn create_child(&self, child: &Child) -> Result<()>;

    /// Get a child by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_child(&self, child_id: ChildId) -> Result<Option<Child>>;

    /// List a family's children, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_children_by_family(&self, family_id: FamilyId) -> Result<Vec<Child>>;

    /// Rename a child and/or change its interest rate.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the child doesn't exist.
    /// - `StoreError::DuplicateName` if the new name is taken in the family.
    async fn update_child(&self, child_id: ChildId, update: &ChildUpdate) -> Result<Child>;

    /// Delete a child with its ledger and schedules.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the child doesn't exist.
    async fn delete_child(&self, child_id: ChildId) -> Result<()>;
}

/// The append-only ledger and the balance it drives.
///
/// Every mutating call is atomic per child: the row insert and the balance
/// update commit together, and calls for the same child are totally ordered.
/// Amounts must be positive; a non-positive amount is a
/// `StoreError::Precondition`.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Credit a manual deposit.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the child doesn't exist.
    async fn deposit(
        &self,
        child_id: ChildId,
        actor_id: ParentId,
        amount_cents: i64,
        note: Option<String>,
    ) -> Result<LedgerEntry>;

    /// Debit a manual withdrawal.
    ///
    /// # Errors
    ///
    /// - `StoreError::InsufficientFunds` (carrying the unchanged balance) if
    ///   the balance is below `amount_cents`.
    /// - `StoreError::NotFound` if the child doesn't exist.
    async fn withdraw(
        &self,
        child_id: ChildId,
        actor_id: ParentId,
        amount_cents: i64,
        note: Option<String>,
    ) -> Result<LedgerEntry>;

    /// Credit an allowance firing, linked to its schedule and recording the
    /// slot it pays as `period_at`.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the child doesn't exist.
    async fn credit_allowance(
        &self,
        child_id: ChildId,
        actor_id: ParentId,
        amount_cents: i64,
        schedule_id: ScheduleId,
        note: Option<String>,
        period_at: DateTime<Utc>,
    ) -> Result<LedgerEntry>;

    /// Credit interest for the slot `period_at` and set the child's
    /// `last_interest_at` to the row's commit time.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the child doesn't exist.
    async fn credit_interest(
        &self,
        child_id: ChildId,
        actor_id: ParentId,
        amount_cents: i64,
        schedule_id: Option<ScheduleId>,
        note: Option<String>,
        period_at: DateTime<Utc>,
    ) -> Result<LedgerEntry>;

    /// Read the child's balance and rate, prorate, and credit, all under the
    /// child's lock. Skips when the amount is below one cent or when the
    /// child's latest interest row already pays this slot or a later one
    /// (for monthly cadences, any slot in the same UTC month).
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the child doesn't exist.
    async fn accrue_interest(&self, accrual: &InterestAccrual) -> Result<AccrualOutcome>;

    /// All rows for a child, newest first (ties broken by descending id).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_by_child(&self, child_id: ChildId) -> Result<Vec<Transaction>>;

    /// Whether a row linked to `schedule_id` pays `slot` or a later one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn has_schedule_credit_for(
        &self,
        schedule_id: ScheduleId,
        slot: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Allowance schedules, at most one per child.
#[async_trait]
pub trait AllowanceRegistry: Send + Sync {
    /// Create an active schedule with `next_run_at` computed from `now`.
    ///
    /// # Errors
    ///
    /// - `StoreError::ScheduleConflict` if the child already has one.
    /// - `StoreError::NotFound` if the child doesn't exist.
    async fn create_allowance(
        &self,
        new: &NewAllowance,
        now: DateTime<Utc>,
    ) -> Result<AllowanceSchedule>;

    /// Get a schedule by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_allowance(&self, id: ScheduleId) -> Result<Option<AllowanceSchedule>>;

    /// Get the child's schedule, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_allowance_by_child(&self, child_id: ChildId)
        -> Result<Option<AllowanceSchedule>>;

    /// Every schedule in a family with its child's name, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_allowances_by_family(
        &self,
        family_id: FamilyId,
    ) -> Result<Vec<FamilySchedule<AllowanceSchedule>>>;

    /// The child's active schedules (zero or one).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_active_allowances_by_child(
        &self,
        child_id: ChildId,
    ) -> Result<Vec<AllowanceSchedule>>;

    /// Replace amount, cadence and note. A cadence change on an active
    /// schedule recomputes `next_run_at` from `now`.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the schedule doesn't exist.
    async fn update_allowance_fields(
        &self,
        id: ScheduleId,
        fields: &AllowanceFields,
        now: DateTime<Utc>,
    ) -> Result<AllowanceSchedule>;

    /// Pause or resume. Resuming recomputes `next_run_at` from `now`; pausing
    /// leaves it as is.
    ///
    /// # Errors
    ///
    /// - `StoreError::AlreadyPaused` / `StoreError::AlreadyActive` for no-op transitions.
    /// - `StoreError::NotFound` if the schedule doesn't exist.
    async fn update_allowance_status(
        &self,
        id: ScheduleId,
        status: ScheduleStatus,
        now: DateTime<Utc>,
    ) -> Result<AllowanceSchedule>;

    /// Overwrite `next_run_at`.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the schedule doesn't exist.
    async fn update_allowance_next_run_at(
        &self,
        id: ScheduleId,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Move `next_run_at` from `fired_at` to `next`, but only if the schedule
    /// still has the cadence it fired with. Returns `false` when an edit got
    /// there first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn advance_allowance(
        &self,
        id: ScheduleId,
        fired_at: DateTime<Utc>,
        cadence: (Frequency, DaySpec),
        next: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete a schedule.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the schedule doesn't exist.
    async fn delete_allowance(&self, id: ScheduleId) -> Result<()>;

    /// Active schedules with `next_run_at <= now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_due_allowances(&self, now: DateTime<Utc>) -> Result<Vec<AllowanceSchedule>>;
}

/// Interest schedules, at most one per child.
#[async_trait]
pub trait InterestRegistry: Send + Sync {
    /// Create an active schedule with `next_run_at` computed from `now`.
    ///
    /// # Errors
    ///
    /// - `StoreError::ScheduleConflict` if the child already has one.
    /// - `StoreError::NotFound` if the child doesn't exist.
    async fn create_interest(
        &self,
        new: &NewInterest,
        now: DateTime<Utc>,
    ) -> Result<InterestSchedule>;

    /// Get a schedule by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_interest(&self, id: ScheduleId) -> Result<Option<InterestSchedule>>;

    /// Get the child's schedule, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_interest_by_child(&self, child_id: ChildId) -> Result<Option<InterestSchedule>>;

    /// Every schedule in a family with its child's name, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_interest_by_family(
        &self,
        family_id: FamilyId,
    ) -> Result<Vec<FamilySchedule<InterestSchedule>>>;

    /// The child's active schedules (zero or one).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_active_interest_by_child(
        &self,
        child_id: ChildId,
    ) -> Result<Vec<InterestSchedule>>;

    /// Replace the cadence. On an active schedule a change recomputes
    /// `next_run_at` from `now`.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the schedule doesn't exist.
    async fn update_interest_fields(
        &self,
        id: ScheduleId,
        frequency: Frequency,
        day: DaySpec,
        now: DateTime<Utc>,
    ) -> Result<InterestSchedule>;

    /// Pause or resume. Resuming recomputes `next_run_at` from `now`.
    ///
    /// # Errors
    ///
    /// - `StoreError::AlreadyPaused` / `StoreError::AlreadyActive` for no-op transitions.
    /// - `StoreError::NotFound` if the schedule doesn't exist.
    async fn update_interest_status(
        &self,
        id: ScheduleId,
        status: ScheduleStatus,
        now: DateTime<Utc>,
    ) -> Result<InterestSchedule>;

    /// Overwrite `next_run_at`.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the schedule doesn't exist.
    async fn update_interest_next_run_at(
        &self,
        id: ScheduleId,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Compare-and-set advance; see [`AllowanceRegistry::advance_allowance`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn advance_interest(
        &self,
        id: ScheduleId,
        fired_at: DateTime<Utc>,
        cadence: (Frequency, DaySpec),
        next: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete a schedule.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the schedule doesn't exist.
    async fn delete_interest(&self, id: ScheduleId) -> Result<()>;

    /// Active schedules with `next_run_at <= now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_due_interest(&self, now: DateTime<Utc>) -> Result<Vec<InterestSchedule>>;
}

/// Everything the service needs from storage.
pub trait Store: AccountStore + Ledger + AllowanceRegistry + InterestRegistry {}

impl<T> Store for T where T: AccountStore + Ledger + AllowanceRegistry + InterestRegistry {}
