//! API handlers.

pub mod allowance;
pub mod children;
pub mod health;
pub mod interest;
pub mod ledger;

use kidbank_core::{Access, Actor, Child, ChildId, DaySpec, Frequency};
use kidbank_store::AccountStore;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Load a child and check the caller's access to it.
pub(crate) async fn authorized_child(
    state: &AppState,
    actor: &Actor,
    child_id: ChildId,
    access: Access,
) -> Result<Child, ApiError> {
    let child = state.store.get_child(child_id).await?;
    Ok(actor.check_child(child.as_ref(), access)?.clone())
}

/// Cadence fields shared by both schedule request bodies.
#[derive(Debug, Deserialize)]
pub struct CadenceInput {
    /// weekly, biweekly or monthly.
    pub frequency: String,
    /// 0 = Sunday .. 6 = Saturday, for weekly and biweekly.
    #[serde(default)]
    pub day_of_week: Option<i64>,
    /// 1..=31, for monthly.
    #[serde(default)]
    pub day_of_month: Option<i64>,
}

impl CadenceInput {
    /// Validate into a frequency and day-spec.
    pub(crate) fn parse(&self) -> Result<(Frequency, DaySpec), ApiError> {
        let frequency: Frequency = self.frequency.parse()?;
        let day = DaySpec::for_frequency(frequency, self.day_of_week, self.day_of_month)?;
        Ok((frequency, day))
    }
}
