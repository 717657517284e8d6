//! Database schema definitions.
//!
//! The schema itself lives in `migrations/` and is embedded at build time.

use sqlx::migrate::Migrator;

/// Embedded migrations, applied on every open.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Table names.
pub mod table {
    /// Families (tenants).
    pub const FAMILIES: &str = "families";

    /// Parents, keyed by id, scoped to a family.
    pub const PARENTS: &str = "parents";

    /// Child accounts holding the balance.
    pub const CHILDREN: &str = "children";

    /// Append-only ledger rows.
    pub const TRANSACTIONS: &str = "transactions";

    /// Allowance schedules, at most one per child.
    pub const ALLOWANCE_SCHEDULES: &str = "allowance_schedules";

    /// Interest schedules, at most one per child.
    pub const INTEREST_SCHEDULES: &str = "interest_schedules";
}

/// Returns all table names, parents before dependants.
#[must_use]
pub fn all_tables() -> Vec<&'static str> {
    vec![
        table::FAMILIES,
        table::PARENTS,
        table::CHILDREN,
        table::TRANSACTIONS,
        table::ALLOWANCE_SCHEDULES,
        table::INTEREST_SCHEDULES,
    ]
}
