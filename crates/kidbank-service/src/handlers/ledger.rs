//! Ledger handlers: deposits, withdrawals, balance, history and upcoming
//! allowance fires.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kidbank_core::{calendar, validate, Access, ChildId, ScheduleStatus, Transaction};
use kidbank_store::{AllowanceRegistry, Ledger, LedgerEntry};

use crate::auth::AuthActor;
use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery};
use crate::handlers::authorized_child;
use crate::state::AppState;

/// Default number of upcoming allowance fires.
const DEFAULT_UPCOMING: usize = 4;

/// Most upcoming allowance fires returned at once.
const MAX_UPCOMING: usize = 12;

/// Deposit or withdrawal request.
#[derive(Debug, Deserialize)]
pub struct MoneyRequest {
    /// Amount in cents.
    pub amount_cents: i64,
    /// Optional note.
    #[serde(default)]
    pub note: Option<String>,
}

/// A ledger row.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: i64,
    /// Child ID.
    pub child_id: String,
    /// Parent who wrote the row (schedule owner for recurring credits).
    pub actor_id: String,
    /// Amount in cents, always positive.
    pub amount_cents: i64,
    /// Amount with the sign of its effect on the balance.
    pub signed_amount_cents: i64,
    /// deposit, withdrawal, allowance or interest.
    pub kind: &'static str,
    /// Note.
    pub note: Option<String>,
    /// Schedule that produced the row, if any.
    pub schedule_id: Option<String>,
    /// Schedule slot paid by a recurring credit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_at: Option<DateTime<Utc>>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.get(),
            child_id: tx.child_id.to_string(),
            actor_id: tx.actor_id.to_string(),
            amount_cents: tx.amount_cents,
            signed_amount_cents: tx.signed_amount(),
            kind: tx.kind.as_str(),
            note: tx.note.clone(),
            schedule_id: tx.schedule_id.map(|id| id.to_string()),
            period_at: tx.period_at,
            created_at: tx.created_at,
        }
    }
}

/// Result of a deposit or withdrawal.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    /// The row written.
    pub transaction: TransactionResponse,
    /// Balance after the row, in cents.
    pub balance_cents: i64,
}

impl From<LedgerEntry> for LedgerResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            transaction: TransactionResponse::from(&entry.transaction),
            balance_cents: entry.balance_cents,
        }
    }
}

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Child ID.
    pub child_id: String,
    /// Current balance in cents.
    pub balance_cents: i64,
    /// Annual rate in basis points.
    pub interest_rate_bps: i64,
    /// Last interest credit.
    pub last_interest_at: Option<DateTime<Utc>>,
}

/// Transaction history response.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    /// Rows, newest first.
    pub transactions: Vec<TransactionResponse>,
}

/// Upcoming allowances query.
#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    /// How many fires to list (1..=12, default 4).
    pub count: Option<usize>,
}

/// One future allowance fire.
#[derive(Debug, Serialize)]
pub struct UpcomingAllowance {
    /// When it fires.
    pub run_at: DateTime<Utc>,
    /// Amount credited, in cents.
    pub amount_cents: i64,
}

/// Upcoming allowances response.
#[derive(Debug, Serialize)]
pub struct UpcomingResponse {
    /// Child ID.
    pub child_id: String,
    /// Fires in order; empty without an active allowance.
    pub upcoming: Vec<UpcomingAllowance>,
}

/// Credit a manual deposit.
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
    ApiJson(body): ApiJson<MoneyRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let parent_id = actor.require_parent()?;
    let amount = validate::amount(body.amount_cents)?;
    let note = validate::note(body.note.as_deref())?;

    let entry = state.store.deposit(child_id, parent_id, amount, note).await?;

    tracing::info!(
        child_id = %child_id,
        parent_id = %parent_id,
        amount_cents = amount,
        balance_cents = entry.balance_cents,
        "Deposit recorded"
    );

    Ok(Json(LedgerResponse::from(entry)))
}

/// Debit a manual withdrawal.
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
    ApiJson(body): ApiJson<MoneyRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Mutate).await?;
    let parent_id = actor.require_parent()?;
    let amount = validate::amount(body.amount_cents)?;
    let note = validate::note(body.note.as_deref())?;

    let entry = state
        .store
        .withdraw(child_id, parent_id, amount, note)
        .await
        .map_err(|e| {
            tracing::info!(
                child_id = %child_id,
                amount_cents = amount,
                error = %e,
                "Withdrawal refused"
            );
            e
        })?;

    tracing::info!(
        child_id = %child_id,
        parent_id = %parent_id,
        amount_cents = amount,
        balance_cents = entry.balance_cents,
        "Withdrawal recorded"
    );

    Ok(Json(LedgerResponse::from(entry)))
}

/// Current balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let child = authorized_child(&state, &actor, child_id, Access::Read).await?;

    Ok(Json(BalanceResponse {
        child_id: child.id.to_string(),
        balance_cents: child.balance_cents,
        interest_rate_bps: child.interest_rate_bps,
        last_interest_at: child.last_interest_at,
    }))
}

/// Ledger history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    authorized_child(&state, &actor, child_id, Access::Read).await?;
    let transactions = state.store.list_by_child(child_id).await?;

    Ok(Json(TransactionsResponse {
        transactions: transactions.iter().map(TransactionResponse::from).collect(),
    }))
}

/// The next fires of the child's active allowance.
pub async fn upcoming_allowances(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    ApiPath(child_id): ApiPath<ChildId>,
    ApiQuery(query): ApiQuery<UpcomingQuery>,
) -> Result<Json<UpcomingResponse>, ApiError> {
    let count = query.count.unwrap_or(DEFAULT_UPCOMING);
    if !(1..=MAX_UPCOMING).contains(&count) {
        return Err(ApiError::InvalidRequest(format!(
            "count must be between 1 and {MAX_UPCOMING}"
        )));
    }

    authorized_child(&state, &actor, child_id, Access::Read).await?;

    let schedule = state
        .store
        .get_allowance_by_child(child_id)
        .await?
        .filter(|s| s.status == ScheduleStatus::Active);

    let upcoming = schedule
        .and_then(|s| s.next_run_at.map(|first| (s, first)))
        .map(|(s, first)| {
            std::iter::successors(Some(first), |&at| {
                Some(calendar::next_after_execution(s.frequency, s.day, at))
            })
            .take(count)
            .map(|run_at| UpcomingAllowance {
                run_at,
                amount_cents: s.amount_cents,
            })
            .collect()
        })
        .unwrap_or_default();

    Ok(Json(UpcomingResponse {
        child_id: child_id.to_string(),
        upcoming,
    }))
}
