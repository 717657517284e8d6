//! Ledger rows.
//!
//! Every change to a child's balance is recorded as a [`Transaction`]. Rows are
//! append-only: they are never updated and only disappear when their child does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChildId, ParentId, ScheduleId, TransactionId};

/// A ledger row representing one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned, strictly increasing ID.
    pub id: TransactionId,

    /// The child whose balance was affected.
    pub child_id: ChildId,

    /// The parent on whose behalf the change was made. For recurring credits
    /// this is the schedule owner.
    pub actor_id: ParentId,

    /// Amount in cents. Always positive; the sign comes from `kind`.
    pub amount_cents: i64,

    /// What kind of change this was.
    pub kind: TransactionKind,

    /// Optional free-text note (trimmed, at most 500 characters).
    pub note: Option<String>,

    /// The schedule that produced this row, for allowance and interest rows.
    pub schedule_id: Option<ScheduleId>,

    /// The schedule slot this row pays, for allowance and interest rows.
    pub period_at: Option<DateTime<Utc>>,

    /// When the row was committed. Never earlier than the child's previous row.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Amount with its sign applied: negative for withdrawals.
    #[must_use]
    pub const fn signed_amount(&self) -> i64 {
        if self.kind.is_debit() {
            -self.amount_cents
        } else {
            self.amount_cents
        }
    }
}

/// Kind of ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Manual deposit by a parent.
    Deposit,

    /// Manual withdrawal by a parent.
    Withdrawal,

    /// Recurring allowance credit.
    Allowance,

    /// Recurring interest accrual.
    Interest,
}

impl TransactionKind {
    /// Check if this kind removes money from the balance.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Withdrawal)
    }

    /// Stable lowercase name, as stored and serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Allowance => "allowance",
            Self::Interest => "interest",
        }
    }

    /// Parse a stored kind name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "withdrawal" => Some(Self::Withdrawal),
            "allowance" => Some(Self::Allowance),
            "interest" => Some(Self::Interest),
            _ => None,
        }
    }
}
