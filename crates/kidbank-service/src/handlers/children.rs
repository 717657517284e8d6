//! Child account handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kidbank_core::{validate, Access, Child, ChildId, Role};
use kidbank_store::{AccountStore, ChildUpdate};

use crate::auth::AuthActor;
use crate::error::{ApiError, ApiJson, ApiPath};
use crate::handlers::authorized_child;
use crate::state::AppState;

/// Child response.
#[derive(Debug, Serialize)]
pub struct ChildResponse {
    /// Child ID.
    pub id: String,
    /// Owning family.
    pub family_id: String,
    /// Display name.
    pub name: String,
    /// Current balance in cents.
    pub balance_cents: i64,
    /// Annual rate in basis points.
    pub interest_rate_bps: i64,
    /// Last interest credit.
    pub last_interest_at: Option<DateTime<Utc>>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&Child> for ChildResponse {
    fn from(child: &Child) -> Self {
        Self {
            id: child.id.to_string(),
            family_id: child.family_id.to_string(),
            name: child.name.clone(),
            balance_cents: child.balance_cents,
            interest_rate_bps: child.interest_rate_bps,
            last_interest_at: child.last_interest_at,
            created_at: child.created_at,
        }
    }
}

/// Child list response.
#[derive(Debug, Serialize)]
pub struct ChildrenResponse {
    /// Children visible to the caller, by name.
    pub children: Vec<ChildResponse>,
}

/// Create child request.
#[derive(Debug, Deserialize)]
pub struct CreateChildRequest {
    /// Display name.
    pub name: String,
    /// Annual rate in basis points (default 0).
    #[serde(default)]
    pub interest_rate_bps: i64,
}

/// Update child request; absent fields are left alone.
#[derive(Debug, Deserialize)]
pub struct UpdateChildRequest {
    /// New display name.
    pub name: Option<String>,
    /// New annual rate in basis points.
    pub interest_rate_bps: Option<i64>,
}

/// Create a child in the caller's family.
pub async fn create_child(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiJson(body): ApiJson<CreateChildRequest>,
) -> Result<(StatusCode, Json<ChildResponse>), ApiError> {
    actor.require_parent()?;
    let name = validate::child_name(&body.name)?;
    let rate = validate::rate_bps(body.interest_rate_bps)?;

    let child = Child::new(actor.family_id, name, rate);
    state.store.create_child(&child).await?;

    tracing::info!(
        child_id = %child.id,
        family_id = %child.family_id,
        "Child created"
    );

    Ok((StatusCode::CREATED, Json(ChildResponse::from(&child))))
}

/// List the caller's family (parents) or the caller alone (children).
pub async fn list_children(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
) -> Result<Json<ChildrenResponse>, ApiError> {
    let children = match actor.role {
        Role::Parent(_) => state.store.list_children_by_family(actor.family_id).await?,
        Role::Child(own) => state
            .store
            .get_child(own)
            .await?
            .into_iter()
            .filter(|c| c.family_id == actor.family_id)
            .collect(),
    };

    Ok(Json(ChildrenResponse {
        children: children.iter().map(ChildResponse::from).collect(),
    }))
}

/// Get one child.
pub async fn get_child(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<ChildResponse>, ApiError> {
    let child = authorized_child(&state, &actor, child_id, Access::Read).await?;
    Ok(Json(ChildResponse::from(&child)))
}

/// Rename a child or change its interest rate.
pub async fn update_child(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
    ApiJson(body): ApiJson<UpdateChildRequest>,
) -> Result<Json<ChildResponse>, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;

    let update = ChildUpdate {
        name: body.name.as_deref().map(validate::child_name).transpose()?,
        interest_rate_bps: body.interest_rate_bps.map(validate::rate_bps).transpose()?,
    };
    let child = state.store.update_child(child_id, &update).await?;

    tracing::info!(
        child_id = %child_id,
        interest_rate_bps = child.interest_rate_bps,
        "Child updated"
    );

    Ok(Json(ChildResponse::from(&child)))
}

/// Delete a child with its ledger and schedules.
pub async fn delete_child(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<StatusCode, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    state.store.delete_child(child_id).await?;

    tracing::info!(child_id = %child_id, "Child deleted");

    Ok(StatusCode::NO_CONTENT)
}
