//! Interest schedule handlers.
//!
//! Mirrors the allowance routes. The rate itself lives on the child; the
//! create and upsert bodies may carry an `interest_rate_bps` that is written
//! to the child in the same request.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kidbank_core::{
    validate, Access, Actor, Child, ChildId, InterestSchedule, ScheduleId, ScheduleStatus,
};
use kidbank_store::{
    AccountStore, ChildUpdate, FamilySchedule, InterestRegistry, NewInterest, StoreError,
};

use crate::auth::AuthActor;
use crate::error::{ApiError, ApiJson, ApiPath};
use crate::handlers::{authorized_child, CadenceInput};
use crate::state::AppState;

/// Interest schedule response.
#[derive(Debug, Serialize)]
pub struct InterestResponse {
    /// Schedule ID.
    pub id: String,
    /// Accruing child.
    pub child_id: String,
    /// Child display name (family listings only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_name: Option<String>,
    /// The child's annual rate, when the child was loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate_bps: Option<i64>,
    /// Owning parent.
    pub owner_id: String,
    /// weekly, biweekly or monthly.
    pub frequency: &'static str,
    /// Weekday for weekly and biweekly.
    pub day_of_week: Option<u8>,
    /// Month day for monthly.
    pub day_of_month: Option<u8>,
    /// active or paused.
    pub status: &'static str,
    /// Next fire instant.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&InterestSchedule> for InterestResponse {
    fn from(s: &InterestSchedule) -> Self {
        Self {
            id: s.id.to_string(),
            child_id: s.child_id.to_string(),
            child_name: None,
            interest_rate_bps: None,
            owner_id: s.owner_id.to_string(),
            frequency: s.frequency.as_str(),
            day_of_week: s.day.day_of_week(),
            day_of_month: s.day.day_of_month(),
            status: s.status.as_str(),
            next_run_at: s.next_run_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl InterestResponse {
    fn with_child(schedule: &InterestSchedule, child: &Child) -> Self {
        Self {
            interest_rate_bps: Some(child.interest_rate_bps),
            ..Self::from(schedule)
        }
    }
}

impl From<&FamilySchedule<InterestSchedule>> for InterestResponse {
    fn from(row: &FamilySchedule<InterestSchedule>) -> Self {
        Self {
            child_name: Some(row.child_name.clone()),
            ..Self::from(&row.schedule)
        }
    }
}

/// Family listing response.
#[derive(Debug, Serialize)]
pub struct InterestSchedulesResponse {
    /// Schedules, by child name.
    pub schedules: Vec<InterestResponse>,
}

/// Interest schedule fields, as sent on create and update.
#[derive(Debug, Deserialize)]
pub struct InterestRequest {
    /// Cadence.
    #[serde(flatten)]
    pub cadence: CadenceInput,
    /// New annual rate for the child.
    #[serde(default)]
    pub interest_rate_bps: Option<i64>,
}

/// Create request: the fields plus the child.
#[derive(Debug, Deserialize)]
pub struct CreateInterestRequest {
    /// Accruing child.
    pub child_id: ChildId,
    /// Schedule fields.
    #[serde(flatten)]
    pub fields: InterestRequest,
}

/// Write the requested rate, if any, and return the current child.
async fn apply_rate(
    state: &AppState,
    child: Child,
    rate: Option<i64>,
) -> Result<Child, ApiError> {
    let Some(rate) = rate else {
        return Ok(child);
    };
    let rate = validate::rate_bps(rate)?;
    let update = ChildUpdate {
        name: None,
        interest_rate_bps: Some(rate),
    };
    let child = state.store.update_child(child.id, &update).await?;
    tracing::info!(child_id = %child.id, interest_rate_bps = rate, "Interest rate changed");
    Ok(child)
}

/// Load a schedule and its child, checking the caller may mutate it.
async fn authorized_schedule(
    state: &AppState,
    actor: &Actor,
    id: ScheduleId,
) -> Result<(InterestSchedule, Child), ApiError> {
    actor.require_parent()?;
    let not_found = || ApiError::NotFound("schedule not found".into());

    let schedule = state.store.get_interest(id).await?.ok_or_else(not_found)?;
    let child = authorized_child(state, actor, schedule.child_id, Access::Mutate)
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => not_found(),
            other => other,
        })?;
    Ok((schedule, child))
}

/// The child's schedule, or 404.
async fn child_schedule(state: &AppState, child_id: ChildId) -> Result<InterestSchedule, ApiError> {
    state
        .store
        .get_interest_by_child(child_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("interest schedule not found".into()))
}

async fn set_status(
    state: &AppState,
    id: ScheduleId,
    status: ScheduleStatus,
) -> Result<InterestSchedule, ApiError> {
    let schedule = state
        .store
        .update_interest_status(id, status, Utc::now())
        .await?;
    tracing::info!(
        schedule_id = %id,
        child_id = %schedule.child_id,
        status = status.as_str(),
        next_run_at = ?schedule.next_run_at,
        "Interest status changed"
    );
    Ok(schedule)
}

// =============================================================================
// /interest-schedules
// =============================================================================

/// Create an interest schedule.
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiJson(body): ApiJson<CreateInterestRequest>,
) -> Result<(StatusCode, Json<InterestResponse>), ApiError> {
    let owner_id = actor.require_parent()?;
    let child = authorized_child(&state, &actor, body.child_id, Access::Mutate).await?;
    let (frequency, day) = body.fields.cadence.parse()?;
    if let Some(rate) = body.fields.interest_rate_bps {
        validate::rate_bps(rate)?;
    }

    let new = NewInterest {
        child_id: child.id,
        owner_id,
        frequency,
        day,
    };
    let schedule = state.store.create_interest(&new, Utc::now()).await?;
    let child = apply_rate(&state, child, body.fields.interest_rate_bps).await?;

    tracing::info!(
        schedule_id = %schedule.id,
        child_id = %schedule.child_id,
        next_run_at = ?schedule.next_run_at,
        "Interest scheduled"
    );

    Ok((
        StatusCode::CREATED,
        Json(InterestResponse::with_child(&schedule, &child)),
    ))
}

/// List the family's interest schedules.
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
) -> Result<Json<InterestSchedulesResponse>, ApiError> {
    actor.require_parent()?;
    let rows = state.store.list_interest_by_family(actor.family_id).await?;

    Ok(Json(InterestSchedulesResponse {
        schedules: rows.iter().map(InterestResponse::from).collect(),
    }))
}

/// Get one schedule.
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<Json<InterestResponse>, ApiError> {
    let (schedule, child) = authorized_schedule(&state, &actor, id).await?;
    Ok(Json(InterestResponse::with_child(&schedule, &child)))
}

/// Replace a schedule's cadence (and optionally the child's rate).
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
    ApiJson(body): ApiJson<InterestRequest>,
) -> Result<Json<InterestResponse>, ApiError> {
    let (_, child) = authorized_schedule(&state, &actor, id).await?;
    let (frequency, day) = body.cadence.parse()?;
    if let Some(rate) = body.interest_rate_bps {
        validate::rate_bps(rate)?;
    }

    let schedule = state
        .store
        .update_interest_fields(id, frequency, day, Utc::now())
        .await?;
    let child = apply_rate(&state, child, body.interest_rate_bps).await?;

    Ok(Json(InterestResponse::with_child(&schedule, &child)))
}

/// Delete a schedule.
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<StatusCode, ApiError> {
    authorized_schedule(&state, &actor, id).await?;
    state.store.delete_interest(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pause a schedule.
pub async fn pause_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<Json<InterestResponse>, ApiError> {
    let (_, child) = authorized_schedule(&state, &actor, id).await?;
    let schedule = set_status(&state, id, ScheduleStatus::Paused).await?;
    Ok(Json(InterestResponse::with_child(&schedule, &child)))
}

/// Resume a schedule; `next_run_at` is recomputed from now.
pub async fn resume_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<Json<InterestResponse>, ApiError> {
    let (_, child) = authorized_schedule(&state, &actor, id).await?;
    let schedule = set_status(&state, id, ScheduleStatus::Active).await?;
    Ok(Json(InterestResponse::with_child(&schedule, &child)))
}

// =============================================================================
// /children/{id}/interest-schedule
// =============================================================================

/// The child's interest schedule (readable by the child too).
pub async fn get_child_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<InterestResponse>, ApiError> {
    let child = authorized_child(&state, &actor, child_id, Access::Read).await?;
    let schedule = child_schedule(&state, child_id).await?;
    Ok(Json(InterestResponse::with_child(&schedule, &child)))
}

/// Create or replace the child's interest schedule.
pub async fn put_child_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
    ApiJson(body): ApiJson<InterestRequest>,
) -> Result<(StatusCode, Json<InterestResponse>), ApiError> {
    let child = authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let owner_id = actor.require_parent()?;
    let (frequency, day) = body.cadence.parse()?;
    if let Some(rate) = body.interest_rate_bps {
        validate::rate_bps(rate)?;
    }
    let now = Utc::now();

    let new = NewInterest {
        child_id,
        owner_id,
        frequency,
        day,
    };
    let (status, schedule) = upsert(&state, &new, now).await?;
    let child = apply_rate(&state, child, body.interest_rate_bps).await?;

    tracing::info!(
        schedule_id = %schedule.id,
        child_id = %child_id,
        interest_rate_bps = child.interest_rate_bps,
        next_run_at = ?schedule.next_run_at,
        "Interest schedule saved"
    );

    Ok((status, Json(InterestResponse::with_child(&schedule, &child))))
}

/// Update the child's interest schedule, or create it. A create that loses to
/// a concurrent one turns into an update of the winner.
async fn upsert(
    state: &AppState,
    new: &NewInterest,
    now: DateTime<Utc>,
) -> Result<(StatusCode, InterestSchedule), ApiError> {
    if state.store.get_interest_by_child(new.child_id).await?.is_none() {
        match state.store.create_interest(new, now).await {
            Err(StoreError::ScheduleConflict { .. }) => {
                tracing::debug!(
                    child_id = %new.child_id,
                    "Interest schedule created concurrently, updating"
                );
            }
            created => return Ok((StatusCode::CREATED, created?)),
        }
    }

    let existing = child_schedule(state, new.child_id).await?;
    let updated = state
        .store
        .update_interest_fields(existing.id, new.frequency, new.day, now)
        .await?;
    Ok((StatusCode::OK, updated))
}

/// Remove the child's interest schedule.
pub async fn delete_child_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<StatusCode, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let schedule = child_schedule(&state, child_id).await?;
    state.store.delete_interest(schedule.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pause the child's interest schedule.
pub async fn pause_child_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<InterestResponse>, ApiError> {
    let child = authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let schedule = child_schedule(&state, child_id).await?;
    let schedule = set_status(&state, schedule.id, ScheduleStatus::Paused).await?;
    Ok(Json(InterestResponse::with_child(&schedule, &child)))
}

/// Resume the child's interest schedule.
pub async fn resume_child_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<InterestResponse>, ApiError> {
    let child = authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let schedule = child_schedule(&state, child_id).await?;
    let schedule = set_status(&state, schedule.id, ScheduleStatus::Active).await?;
    Ok(Json(InterestResponse::with_child(&schedule, &child)))
}
