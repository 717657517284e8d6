//! Recurring-credit schedules.
//!
//! A child has at most one allowance schedule and at most one interest
//! schedule. Both share a cadence (frequency plus day-spec), a status and a
//! `next_run_at` instant; the allowance additionally carries an amount and a
//! note, while the interest rate lives on the child.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::{ChildId, ParentId, ScheduleId};

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Every week on a weekday.
    Weekly,
    /// Every other week on a weekday.
    Biweekly,
    /// Every month on a day of the month (clamped to the month's length).
    Monthly,
}

impl Frequency {
    /// Number of accrual periods in a year, used to prorate annual interest.
    #[must_use]
    pub const fn periods_per_year(self) -> i64 {
        match self {
            Self::Weekly => 52,
            Self::Biweekly => 26,
            Self::Monthly => 12,
        }
    }

    /// Stable lowercase name, as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }

    /// Whether the day-spec for this frequency is a weekday.
    #[must_use]
    pub const fn uses_weekday(self) -> bool {
        matches!(self, Self::Weekly | Self::Biweekly)
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "biweekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(CoreError::UnknownFrequency(other.to_string())),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The day a schedule fires on.
///
/// Weekly and biweekly schedules use a weekday (0 = Sunday .. 6 = Saturday);
/// monthly schedules use a day of the month (1..=31).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaySpec {
    /// Day of the week, 0 = Sunday.
    DayOfWeek(u8),
    /// Day of the month, 1..=31.
    DayOfMonth(u8),
}

impl DaySpec {
    /// Build a day-spec from the two nullable columns, checking that exactly
    /// the one matching `frequency` is set and in range.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFrequencyDayCombination`] when the wrong
    /// field is set, both or neither are set, or the value is out of range.
    pub fn for_frequency(
        frequency: Frequency,
        day_of_week: Option<i64>,
        day_of_month: Option<i64>,
    ) -> Result<Self, CoreError> {
        let invalid = |msg: String| Err(CoreError::InvalidFrequencyDayCombination(msg));

        match (frequency.uses_weekday(), day_of_week, day_of_month) {
            (true, Some(dow), None) => match u8::try_from(dow) {
                Ok(d) if d <= 6 => Ok(Self::DayOfWeek(d)),
                _ => invalid(format!("day_of_week must be 0-6, got {dow}")),
            },
            (false, None, Some(dom)) => match u8::try_from(dom) {
                Ok(d) if (1..=31).contains(&d) => Ok(Self::DayOfMonth(d)),
                _ => invalid(format!("day_of_month must be 1-31, got {dom}")),
            },
            (true, _, _) => invalid(format!(
                "{frequency} schedules need day_of_week and no day_of_month"
            )),
            (false, _, _) => invalid(format!(
                "{frequency} schedules need day_of_month and no day_of_week"
            )),
        }
    }

    /// Weekday, if this is a weekday spec.
    #[must_use]
    pub const fn day_of_week(self) -> Option<u8> {
        match self {
            Self::DayOfWeek(d) => Some(d),
            Self::DayOfMonth(_) => None,
        }
    }

    /// Day of month, if this is a month-day spec.
    #[must_use]
    pub const fn day_of_month(self) -> Option<u8> {
        match self {
            Self::DayOfWeek(_) => None,
            Self::DayOfMonth(d) => Some(d),
        }
    }
}

/// Whether a schedule is currently firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Fires when due.
    Active,
    /// Never due, whatever `next_run_at` says.
    Paused,
}

impl ScheduleStatus {
    /// Stable lowercase name, as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }

    /// Parse a stored status name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// The two schedule families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Fixed-amount allowance.
    Allowance,
    /// Interest on the child's balance.
    Interest,
}

impl ScheduleKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowance => "allowance",
            Self::Interest => "interest",
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceSchedule {
    /// Schedule ID.
    pub id: ScheduleId,

    /// The child receiving the allowance.
    pub child_id: ChildId,

    /// The parent who owns the schedule; recorded as the actor of each credit.
    pub owner_id: ParentId,

    /// Amount credited per firing, in cents.
    pub amount_cents: i64,

    /// Cadence.
    pub frequency: Frequency,

    /// Day the schedule fires on.
    pub day: DaySpec,

    /// Note copied onto each ledger row.
    pub note: Option<String>,

    /// Active or paused.
    pub status: ScheduleStatus,

    /// Next fire instant. Always set while active.
    pub next_run_at: Option<DateTime<Utc>>,

    /// When the schedule was created.
    pub created_at: DateTime<Utc>,

    /// When the schedule was last changed.
    pub updated_at: DateTime<Utc>,
}

/// A recurring interest accrual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestSchedule {
    /// Schedule ID.
    pub id: ScheduleId,

    /// The child accruing interest.
    pub child_id: ChildId,

    /// The parent who owns the schedule.
    pub owner_id: ParentId,

    /// Cadence.
    pub frequency: Frequency,

    /// Day the schedule fires on.
    pub day: DaySpec,

    /// Active or paused.
    pub status: ScheduleStatus,

    /// Next fire instant. Always set while active.
    pub next_run_at: Option<DateTime<Utc>>,

    /// When the schedule was created.
    pub created_at: DateTime<Utc>,

    /// When the schedule was last changed.
    pub updated_at: DateTime<Utc>,
}
