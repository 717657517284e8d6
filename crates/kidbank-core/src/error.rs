//! Error types for kidbank core rules.

use crate::ids::IdError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while validating input against the domain rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Amount outside the accepted range.
    #[error("amount must be between {min} and {max} cents, got {got}")]
    InvalidAmount {
        /// Smallest accepted amount.
        min: i64,
        /// Largest accepted amount.
        max: i64,
        /// The rejected value.
        got: i64,
    },

    /// Frequency string is not one of weekly, biweekly, monthly.
    #[error("unknown frequency: {0}")]
    UnknownFrequency(String),

    /// The day-spec does not match the frequency.
    #[error("invalid frequency/day combination: {0}")]
    InvalidFrequencyDayCombination(String),

    /// Note longer than allowed after trimming.
    #[error("note must be at most {max} characters, got {got}")]
    InvalidNote {
        /// Maximum length in characters.
        max: usize,
        /// Length of the rejected note.
        got: usize,
    },

    /// Interest rate outside 0..=10000 basis points.
    #[error("interest rate must be between 0 and {max} bps, got {got}")]
    InvalidRate {
        /// Maximum rate in basis points.
        max: i64,
        /// The rejected value.
        got: i64,
    },

    /// Child display name empty or too long.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
