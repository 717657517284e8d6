//! Interest proration.
//!
//! The child's rate is an annual rate in basis points. Each firing credits
//! `round(balance × rate_bps / periods_per_year / 10_000)` cents, rounding half
//! away from zero. Results below one cent are not credited.

use crate::schedule::Frequency;

/// Largest accepted annual rate, in basis points (100%).
pub const MAX_RATE_BPS: i64 = 10_000;

/// Interest owed for one period, in whole cents.
///
/// Returns 0 for empty balances, zero rates and any non-positive input.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn prorate(balance_cents: i64, rate_bps: i64, frequency: Frequency) -> i64 {
    if balance_cents <= 0 || rate_bps <= 0 {
        return 0;
    }
    let periods = frequency.periods_per_year() as f64;
    let raw = balance_cents as f64 * rate_bps as f64 / periods / 10_000.0;
    // f64::round rounds half away from zero.
    raw.round() as i64
}
