//! Family, parent and child account types.
//!
//! A family is the tenant. Parents act on the children of their own family;
//! a child holds the balance that every ledger row and recurring credit moves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChildId, FamilyId, ParentId};

/// Longest accepted child display name, in characters.
pub const MAX_CHILD_NAME_CHARS: usize = 100;

/// A family (tenant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    /// Family ID.
    pub id: FamilyId,

    /// Display name.
    pub name: String,

    /// When the family was created.
    pub created_at: DateTime<Utc>,
}

impl Family {
    /// Create a new family.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FamilyId::generate(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A parent belonging to a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    /// Parent ID.
    pub id: ParentId,

    /// The family this parent administers.
    pub family_id: FamilyId,

    /// Display name.
    pub display_name: String,

    /// When the parent was created.
    pub created_at: DateTime<Utc>,
}

impl Parent {
    /// Create a new parent in a family.
    #[must_use]
    pub fn new(family_id: FamilyId, display_name: impl Into<String>) -> Self {
        Self {
            id: ParentId::generate(),
            family_id,
            display_name: display_name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A child account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    /// Child ID.
    pub id: ChildId,

    /// Owning family.
    pub family_id: FamilyId,

    /// Display name, unique within the family (case-sensitive).
    pub name: String,

    /// Current balance in cents. Never negative.
    pub balance_cents: i64,

    /// Annual interest rate in basis points (0..=10000).
    pub interest_rate_bps: i64,

    /// When interest was last credited, if ever.
    pub last_interest_at: Option<DateTime<Utc>>,

    /// When the child was created.
    pub created_at: DateTime<Utc>,
}

impl Child {
    /// Create a new child with a zero balance.
    #[must_use]
    pub fn new(family_id: FamilyId, name: impl Into<String>, interest_rate_bps: i64) -> Self {
        Self {
            id: ChildId::generate(),
            family_id,
            name: name.into(),
            balance_cents: 0,
            interest_rate_bps,
            last_interest_at: None,
            created_at: Utc::now(),
        }
    }

    /// Check if the balance covers a withdrawal.
    #[must_use]
    pub fn can_withdraw(&self, amount_cents: i64) -> bool {
        self.balance_cents >= amount_cents
    }
}
