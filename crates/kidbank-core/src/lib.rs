//! Core types and rules for kidbank.
//!
//! This crate provides the foundational pieces shared by the store and the HTTP
//! service:
//!
//! - **Identifiers**: `FamilyId`, `ParentId`, `ChildId`, `ScheduleId`, `TransactionId`
//! - **Accounts**: `Family`, `Parent`, `Child`
//! - **Ledger**: `Transaction`, `TransactionKind`
//! - **Schedules**: `AllowanceSchedule`, `InterestSchedule`, `Frequency`, `DaySpec`
//! - **Calendar**: next-fire computation for recurring credits
//! - **Interest**: annual-rate proration into per-period cents
//! - **Authorization**: `Actor` and the per-child access predicates
//!
//! # Money
//!
//! All amounts are `i64` integer cents. Floating point appears only inside
//! [`interest::prorate`], and the result is rounded to whole cents before it
//! leaves that function.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod authz;
pub mod calendar;
pub mod error;
pub mod ids;
pub mod interest;
pub mod schedule;
pub mod transaction;
pub mod validate;

pub use account::{Child, Family, Parent, MAX_CHILD_NAME_CHARS};
pub use authz::{Access, AccessDenied, Actor, Role};
pub use error::{CoreError, Result};
pub use ids::{ChildId, FamilyId, IdError, ParentId, ScheduleId, TransactionId};
pub use schedule::{
    AllowanceSchedule, DaySpec, Frequency, InterestSchedule, ScheduleKind, ScheduleStatus,
};
pub use transaction::{Transaction, TransactionKind};
