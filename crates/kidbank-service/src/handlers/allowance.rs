//! Allowance schedule handlers.
//!
//! Schedules are addressable by their own id under `/schedules` and, since a
//! child has at most one, through `/children/{id}/allowance`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kidbank_core::{
    validate, Access, Actor, AllowanceSchedule, ChildId, ParentId, ScheduleId, ScheduleStatus,
};
use kidbank_store::{AllowanceFields, AllowanceRegistry, FamilySchedule, NewAllowance, StoreError};

use crate::auth::AuthActor;
use crate::error::{ApiError, ApiJson, ApiPath};
use crate::handlers::{authorized_child, CadenceInput};
use crate::state::AppState;

/// Allowance schedule response.
#[derive(Debug, Serialize)]
pub struct AllowanceResponse {
    /// Schedule ID.
    pub id: String,
    /// Receiving child.
    pub child_id: String,
    /// Child display name (family listings only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_name: Option<String>,
    /// Owning parent.
    pub owner_id: String,
    /// Amount per firing, in cents.
    pub amount_cents: i64,
    /// weekly, biweekly or monthly.
    pub frequency: &'static str,
    /// Weekday for weekly and biweekly.
    pub day_of_week: Option<u8>,
    /// Month day for monthly.
    pub day_of_month: Option<u8>,
    /// Note on each credit.
    pub note: Option<String>,
    /// active or paused.
    pub status: &'static str,
    /// Next fire instant.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&AllowanceSchedule> for AllowanceResponse {
    fn from(s: &AllowanceSchedule) -> Self {
        Self {
            id: s.id.to_string(),
            child_id: s.child_id.to_string(),
            child_name: None,
            owner_id: s.owner_id.to_string(),
            amount_cents: s.amount_cents,
            frequency: s.frequency.as_str(),
            day_of_week: s.day.day_of_week(),
            day_of_month: s.day.day_of_month(),
            note: s.note.clone(),
            status: s.status.as_str(),
            next_run_at: s.next_run_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl From<&FamilySchedule<AllowanceSchedule>> for AllowanceResponse {
    fn from(row: &FamilySchedule<AllowanceSchedule>) -> Self {
        Self {
            child_name: Some(row.child_name.clone()),
            ..Self::from(&row.schedule)
        }
    }
}

/// Family listing response.
#[derive(Debug, Serialize)]
pub struct AllowancesResponse {
    /// Schedules, by child name.
    pub schedules: Vec<AllowanceResponse>,
}

/// Allowance fields, as sent on create and update.
#[derive(Debug, Deserialize)]
pub struct AllowanceRequest {
    /// Amount per firing, in cents.
    pub amount_cents: i64,
    /// Cadence.
    #[serde(flatten)]
    pub cadence: CadenceInput,
    /// Note on each credit.
    #[serde(default)]
    pub note: Option<String>,
}

impl AllowanceRequest {
    fn validate(&self) -> Result<AllowanceFields, ApiError> {
        let amount_cents = validate::amount(self.amount_cents)?;
        let (frequency, day) = self.cadence.parse()?;
        let note = validate::note(self.note.as_deref())?;
        Ok(AllowanceFields {
            amount_cents,
            frequency,
            day,
            note,
        })
    }
}

/// Create request: the fields plus the child.
#[derive(Debug, Deserialize)]
pub struct CreateAllowanceRequest {
    /// Receiving child.
    pub child_id: ChildId,
    /// Schedule fields.
    #[serde(flatten)]
    pub fields: AllowanceRequest,
}

/// Load a schedule and check the caller may mutate its child.
async fn authorized_schedule(
    state: &AppState,
    actor: &Actor,
    id: ScheduleId,
) -> Result<AllowanceSchedule, ApiError> {
    actor.require_parent()?;
    let not_found = || ApiError::NotFound("schedule not found".into());

    let schedule = state.store.get_allowance(id).await?.ok_or_else(not_found)?;
    authorized_child(state, actor, schedule.child_id, Access::Mutate)
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => not_found(),
            other => other,
        })?;
    Ok(schedule)
}

/// The child's schedule, or 404.
async fn child_schedule(
    state: &AppState,
    child_id: ChildId,
) -> Result<AllowanceSchedule, ApiError> {
    state
        .store
        .get_allowance_by_child(child_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("allowance not found".into()))
}

async fn set_status(
    state: &AppState,
    id: ScheduleId,
    status: ScheduleStatus,
) -> Result<AllowanceSchedule, ApiError> {
    let schedule = state
        .store
        .update_allowance_status(id, status, Utc::now())
        .await?;
    tracing::info!(
        schedule_id = %id,
        child_id = %schedule.child_id,
        status = status.as_str(),
        next_run_at = ?schedule.next_run_at,
        "Allowance status changed"
    );
    Ok(schedule)
}

// =============================================================================
// /schedules
// =============================================================================

/// Create an allowance schedule.
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiJson(body): ApiJson<CreateAllowanceRequest>,
) -> Result<(StatusCode, Json<AllowanceResponse>), ApiError> {
    let owner_id = actor.require_parent()?;
    authorized_child(&state, &actor, body.child_id, Access::Mutate).await?;
    let fields = body.fields.validate()?;

    let new = NewAllowance {
        child_id: body.child_id,
        owner_id,
        amount_cents: fields.amount_cents,
        frequency: fields.frequency,
        day: fields.day,
        note: fields.note,
    };
    let schedule = state.store.create_allowance(&new, Utc::now()).await?;

    tracing::info!(
        schedule_id = %schedule.id,
        child_id = %schedule.child_id,
        amount_cents = schedule.amount_cents,
        next_run_at = ?schedule.next_run_at,
        "Allowance scheduled"
    );

    Ok((StatusCode::CREATED, Json(AllowanceResponse::from(&schedule))))
}

/// List the family's allowance schedules.
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
) -> Result<Json<AllowancesResponse>, ApiError> {
    actor.require_parent()?;
    let rows = state.store.list_allowances_by_family(actor.family_id).await?;

    Ok(Json(AllowancesResponse {
        schedules: rows.iter().map(AllowanceResponse::from).collect(),
    }))
}

/// Get one schedule.
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let schedule = authorized_schedule(&state, &actor, id).await?;
    Ok(Json(AllowanceResponse::from(&schedule)))
}

/// Replace a schedule's amount, cadence and note.
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
    ApiJson(body): ApiJson<AllowanceRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    authorized_schedule(&state, &actor, id).await?;
    let fields = body.validate()?;
    let schedule = state
        .store
        .update_allowance_fields(id, &fields, Utc::now())
        .await?;

    Ok(Json(AllowanceResponse::from(&schedule)))
}

/// Delete a schedule.
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<StatusCode, ApiError> {
    authorized_schedule(&state, &actor, id).await?;
    state.store.delete_allowance(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pause a schedule.
pub async fn pause_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    authorized_schedule(&state, &actor, id).await?;
    let schedule = set_status(&state, id, ScheduleStatus::Paused).await?;
    Ok(Json(AllowanceResponse::from(&schedule)))
}

/// Resume a schedule; `next_run_at` is recomputed from now.
pub async fn resume_schedule(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(id): ApiPath<ScheduleId>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    authorized_schedule(&state, &actor, id).await?;
    let schedule = set_status(&state, id, ScheduleStatus::Active).await?;
    Ok(Json(AllowanceResponse::from(&schedule)))
}

// =============================================================================
// /children/{id}/allowance
// =============================================================================

/// The child's allowance (readable by the child too).
pub async fn get_child_allowance(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Read).await?;
    let schedule = child_schedule(&state, child_id).await?;
    Ok(Json(AllowanceResponse::from(&schedule)))
}

/// Create or replace the child's allowance.
pub async fn put_child_allowance(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
    ApiJson(body): ApiJson<AllowanceRequest>,
) -> Result<(StatusCode, Json<AllowanceResponse>), ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let owner_id = actor.require_parent()?;
    let fields = body.validate()?;
    let now = Utc::now();

    let (status, schedule) = upsert(&state, child_id, owner_id, &fields, now).await?;

    tracing::info!(
        schedule_id = %schedule.id,
        child_id = %child_id,
        amount_cents = schedule.amount_cents,
        next_run_at = ?schedule.next_run_at,
        "Allowance saved"
    );

    Ok((status, Json(AllowanceResponse::from(&schedule))))
}

/// Update the child's allowance, or create it. A create that loses to a
/// concurrent one turns into an update of the winner.
async fn upsert(
    state: &AppState,
    child_id: ChildId,
    owner_id: ParentId,
    fields: &AllowanceFields,
    now: DateTime<Utc>,
) -> Result<(StatusCode, AllowanceSchedule), ApiError> {
    if state.store.get_allowance_by_child(child_id).await?.is_none() {
        let new = NewAllowance {
            child_id,
            owner_id,
            amount_cents: fields.amount_cents,
            frequency: fields.frequency,
            day: fields.day,
            note: fields.note.clone(),
        };
        match state.store.create_allowance(&new, now).await {
            Err(StoreError::ScheduleConflict { .. }) => {
                tracing::debug!(child_id = %child_id, "Allowance created concurrently, updating");
            }
            created => return Ok((StatusCode::CREATED, created?)),
        }
    }

    let existing = child_schedule(state, child_id).await?;
    let updated = state
        .store
        .update_allowance_fields(existing.id, fields, now)
        .await?;
    Ok((StatusCode::OK, updated))
}

/// Remove the child's allowance.
pub async fn delete_child_allowance(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<StatusCode, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let schedule = child_schedule(&state, child_id).await?;
    state.store.delete_allowance(schedule.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pause the child's allowance.
pub async fn pause_child_allowance(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let schedule = child_schedule(&state, child_id).await?;
    let schedule = set_status(&state, schedule.id, ScheduleStatus::Paused).await?;
    Ok(Json(AllowanceResponse::from(&schedule)))
}

/// Resume the child's allowance.
pub async fn resume_child_allowance(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let schedule = child_schedule(&state, child_id).await?;
    let schedule = set_status(&state, schedule.id, ScheduleStatus::Active).await?;
    Ok(Json(AllowanceResponse::from(&schedule)))
}
