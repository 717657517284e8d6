//! Authorization predicates.
//!
//! Access to a child is decided from the caller's family and role alone:
//!
//! - a parent of the child's family may read and mutate everything;
//! - the child may read its own balance, ledger and schedules;
//! - everyone else is denied.
//!
//! A child outside the caller's family is reported as [`AccessDenied::NotFound`]
//! so that ids from other families cannot be probed. A caller inside the family
//! but with the wrong role gets [`AccessDenied::Forbidden`].

use serde::{Deserialize, Serialize};

use crate::{Child, ChildId, FamilyId, ParentId};

/// Who is making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// The caller's family.
    pub family_id: FamilyId,
    /// The caller's role and identity.
    pub role: Role,
}

/// The caller's role and identity within the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Role {
    /// A parent.
    Parent(ParentId),
    /// A child, signed in to see its own account.
    Child(ChildId),
}

/// What the caller wants to do with a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Balance, ledger, schedules, upcoming fires.
    Read,
    /// Deposits, withdrawals, schedule and child edits.
    Mutate,
}

/// Why access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    /// The target does not exist or belongs to another family.
    #[error("not found")]
    NotFound,
    /// The target is visible but the caller's role may not do this.
    #[error("forbidden")]
    Forbidden,
}

impl Actor {
    /// A parent actor.
    #[must_use]
    pub const fn parent(family_id: FamilyId, parent_id: ParentId) -> Self {
        Self {
            family_id,
            role: Role::Parent(parent_id),
        }
    }

    /// A child actor.
    #[must_use]
    pub const fn child(family_id: FamilyId, child_id: ChildId) -> Self {
        Self {
            family_id,
            role: Role::Child(child_id),
        }
    }

    /// The parent id, or `Forbidden` for child callers.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::Forbidden`] when the caller is a child.
    pub const fn require_parent(&self) -> Result<ParentId, AccessDenied> {
        match self.role {
            Role::Parent(id) => Ok(id),
            Role::Child(_) => Err(AccessDenied::Forbidden),
        }
    }

    /// Decide whether the caller may perform `access` on the child identified
    /// by `child_id` in `child_family`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::NotFound`] across families and
    /// [`AccessDenied::Forbidden`] for a wrong role inside the family.
    pub fn check(
        &self,
        child_family: FamilyId,
        child_id: ChildId,
        access: Access,
    ) -> Result<(), AccessDenied> {
        if child_family != self.family_id {
            return Err(AccessDenied::NotFound);
        }
        match (self.role, access) {
            (Role::Parent(_), _) => Ok(()),
            (Role::Child(own), Access::Read) if own == child_id => Ok(()),
            (Role::Child(_), _) => Err(AccessDenied::Forbidden),
        }
    }

    /// [`Actor::check`] against an optional, freshly loaded child.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::NotFound`] when `child` is `None`.
    pub fn check_child<'a>(
        &self,
        child: Option<&'a Child>,
        access: Access,
    ) -> Result<&'a Child, AccessDenied> {
        let child = child.ok_or(AccessDenied::NotFound)?;
        self.check(child.family_id, child.id, access)?;
        Ok(child)
    }

    /// Whether the caller may read the child.
    #[must_use]
    pub fn can_read(&self, child: &Child) -> bool {
        self.check(child.family_id, child.id, Access::Read).is_ok()
    }

    /// Whether the caller may mutate the child.
    #[must_use]
    pub fn can_mutate(&self, child: &Child) -> bool {
        self.check(child.family_id, child.id, Access::Mutate).is_ok()
    }
}
