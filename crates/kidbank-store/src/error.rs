//! Error types for kidbank storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be turned back into a domain value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Withdrawal larger than the balance.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance in cents (unchanged by the failed call).
        balance: i64,
        /// Requested amount in cents.
        required: i64,
    },

    /// The child already has a schedule of this kind.
    #[error("child {child_id} already has an {kind} schedule")]
    ScheduleConflict {
        /// Schedule kind.
        kind: kidbank_core::ScheduleKind,
        /// The child.
        child_id: String,
    },

    /// Pause requested on a paused schedule.
    #[error("schedule is already paused")]
    AlreadyPaused,

    /// Resume requested on an active schedule.
    #[error("schedule is already active")]
    AlreadyActive,

    /// A child with this name already exists in the family.
    #[error("a child named {0:?} already exists in this family")]
    DuplicateName(String),

    /// Caller broke an operation's precondition (e.g. a non-positive amount).
    #[error("precondition violated: {0}")]
    Precondition(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("migration failed: {err}"))
    }
}

impl From<kidbank_core::CoreError> for StoreError {
    fn from(err: kidbank_core::CoreError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Whether a database error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
