//! Inputs and outputs of store operations that are not domain types.

use chrono::{DateTime, Utc};

use kidbank_core::{ChildId, DaySpec, Frequency, ParentId, ScheduleId, Transaction};

/// A committed ledger row together with the balance it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// The row just written.
    pub transaction: Transaction,
    /// Balance after the row landed, in cents.
    pub balance_cents: i64,
}

/// Changes to a child; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildUpdate {
    /// New display name (already validated).
    pub name: Option<String>,
    /// New annual rate in basis points (already validated).
    pub interest_rate_bps: Option<i64>,
}

/// A new allowance schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAllowance {
    /// Receiving child.
    pub child_id: ChildId,
    /// Owning parent.
    pub owner_id: ParentId,
    /// Amount per firing, in cents.
    pub amount_cents: i64,
    /// Cadence.
    pub frequency: Frequency,
    /// Fire day.
    pub day: DaySpec,
    /// Note copied onto each credit.
    pub note: Option<String>,
}

/// Editable allowance fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceFields {
    /// Amount per firing, in cents.
    pub amount_cents: i64,
    /// Cadence.
    pub frequency: Frequency,
    /// Fire day.
    pub day: DaySpec,
    /// Note copied onto each credit.
    pub note: Option<String>,
}

impl From<&NewAllowance> for AllowanceFields {
    fn from(new: &NewAllowance) -> Self {
        Self {
            amount_cents: new.amount_cents,
            frequency: new.frequency,
            day: new.day,
            note: new.note.clone(),
        }
    }
}

/// A new interest schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewInterest {
    /// Accruing child.
    pub child_id: ChildId,
    /// Owning parent.
    pub owner_id: ParentId,
    /// Cadence.
    pub frequency: Frequency,
    /// Fire day.
    pub day: DaySpec,
}

/// A schedule row joined with its child's name, for family listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilySchedule<S> {
    /// The schedule.
    pub schedule: S,
    /// Display name of the schedule's child.
    pub child_name: String,
}

/// One interest firing for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestAccrual {
    /// Accruing child.
    pub child_id: ChildId,
    /// Schedule owner, recorded as the actor.
    pub actor_id: ParentId,
    /// The schedule firing.
    pub schedule_id: ScheduleId,
    /// Used to prorate the annual rate.
    pub frequency: Frequency,
    /// The slot being paid: the schedule's `next_run_at` at firing time.
    pub slot: DateTime<Utc>,
    /// Note on the ledger row.
    pub note: Option<String>,
}

/// What an interest firing did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// A row was written.
    Credited(LedgerEntry),
    /// The prorated amount rounded below one cent; nothing was written.
    BelowOneCent,
    /// Interest was already credited for this slot; nothing was written.
    AlreadyCredited,
}
