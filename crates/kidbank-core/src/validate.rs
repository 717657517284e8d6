//! Input validation shared by the HTTP boundary and the store.

use crate::account::MAX_CHILD_NAME_CHARS;
use crate::error::{CoreError, Result};
use crate::interest::MAX_RATE_BPS;

/// Smallest amount accepted at the boundary, in cents.
pub const MIN_AMOUNT_CENTS: i64 = 1;

/// Largest amount accepted at the boundary, in cents.
pub const MAX_AMOUNT_CENTS: i64 = 99_999_999;

/// Longest note accepted after trimming, in characters.
pub const MAX_NOTE_CHARS: usize = 500;

/// Check a deposit, withdrawal or allowance amount.
///
/// # Errors
///
/// Returns [`CoreError::InvalidAmount`] outside `1..=99_999_999`.
pub fn amount(amount_cents: i64) -> Result<i64> {
    if (MIN_AMOUNT_CENTS..=MAX_AMOUNT_CENTS).contains(&amount_cents) {
        Ok(amount_cents)
    } else {
        Err(CoreError::InvalidAmount {
            min: MIN_AMOUNT_CENTS,
            max: MAX_AMOUNT_CENTS,
            got: amount_cents,
        })
    }
}

/// Trim a note. Empty notes become `None`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidNote`] if the trimmed note is too long.
pub fn note(note: Option<&str>) -> Result<Option<String>> {
    let Some(trimmed) = note.map(str::trim) else {
        return Ok(None);
    };
    let len = trimmed.chars().count();
    if len > MAX_NOTE_CHARS {
        return Err(CoreError::InvalidNote {
            max: MAX_NOTE_CHARS,
            got: len,
        });
    }
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Check an annual interest rate in basis points.
///
/// # Errors
///
/// Returns [`CoreError::InvalidRate`] outside `0..=10_000`.
pub fn rate_bps(rate_bps: i64) -> Result<i64> {
    if (0..=MAX_RATE_BPS).contains(&rate_bps) {
        Ok(rate_bps)
    } else {
        Err(CoreError::InvalidRate {
            max: MAX_RATE_BPS,
            got: rate_bps,
        })
    }
}

/// Trim a child display name.
///
/// # Errors
///
/// Returns [`CoreError::InvalidName`] if the trimmed name is empty or too long.
pub fn child_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidName("name must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_CHILD_NAME_CHARS {
        return Err(CoreError::InvalidName(format!(
            "name must be at most {MAX_CHILD_NAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
