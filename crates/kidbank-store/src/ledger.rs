//! [`Ledger`] for [`SqliteStore`].
//!
//! Each posting holds the child's lock and runs as a single database
//! transaction whose first statement writes the child row, so the balance
//! change and the ledger row commit together or not at all. Rows are stamped
//! inside that transaction, so `created_at` follows commit order per child.
//! Recurring credits also record the slot they pay in `period_at`, which is
//! what the slot guards compare against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction as DbTransaction};

use kidbank_core::{
    calendar, interest, ChildId, Frequency, ParentId, ScheduleId, Transaction, TransactionKind,
};

use crate::error::{Result, StoreError};
use crate::model::{AccrualOutcome, InterestAccrual, LedgerEntry};
use crate::sqlite::{transaction_from_row, ts, SqliteStore, TRANSACTION_COLUMNS};
use crate::Ledger;

/// One ledger row about to be written.
struct Posting {
    child_id: ChildId,
    actor_id: ParentId,
    amount_cents: i64,
    kind: TransactionKind,
    schedule_id: Option<ScheduleId>,
    note: Option<String>,
    period_at: Option<DateTime<Utc>>,
}

fn require_positive(amount_cents: i64) -> Result<()> {
    if amount_cents > 0 {
        Ok(())
    } else {
        Err(StoreError::Precondition(format!(
            "amount must be positive, got {amount_cents}"
        )))
    }
}

impl SqliteStore {
    async fn post(&self, posting: Posting) -> Result<LedgerEntry> {
        require_positive(posting.amount_cents)?;

        let _guard = self.locks.lock(posting.child_id).await;
        let mut tx = self.pool.begin().await?;

        let balance_cents = if posting.kind.is_debit() {
            debit(&mut tx, posting.child_id, posting.amount_cents).await?
        } else {
            credit(&mut tx, posting.child_id, posting.amount_cents).await?
        };
        let transaction = insert_row(&mut tx, posting).await?;
        if transaction.kind == TransactionKind::Interest {
            mark_interest(&mut tx, transaction.child_id, transaction.created_at).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            child_id = %transaction.child_id,
            transaction_id = %transaction.id,
            kind = transaction.kind.as_str(),
            amount_cents = transaction.amount_cents,
            balance_cents,
            "Ledger row committed"
        );
        Ok(LedgerEntry {
            transaction,
            balance_cents,
        })
    }
}

async fn credit(
    tx: &mut DbTransaction<'_, Sqlite>,
    child_id: ChildId,
    amount_cents: i64,
) -> Result<i64> {
    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE children SET balance_cents = balance_cents + ? WHERE id = ? \
         RETURNING balance_cents",
    )
    .bind(amount_cents)
    .bind(child_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await?;

    balance.ok_or_else(|| StoreError::not_found("child", child_id))
}

async fn debit(
    tx: &mut DbTransaction<'_, Sqlite>,
    child_id: ChildId,
    amount_cents: i64,
) -> Result<i64> {
    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE children SET balance_cents = balance_cents - ?1 \
         WHERE id = ?2 AND balance_cents >= ?1 RETURNING balance_cents",
    )
    .bind(amount_cents)
    .bind(child_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(balance) = balance {
        return Ok(balance);
    }

    let current: Option<i64> = sqlx::query_scalar("SELECT balance_cents FROM children WHERE id = ?")
        .bind(child_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

    match current {
        Some(balance) => Err(StoreError::InsufficientFunds {
            balance,
            required: amount_cents,
        }),
        None => Err(StoreError::not_found("child", child_id)),
    }
}

async fn mark_interest(
    tx: &mut DbTransaction<'_, Sqlite>,
    child_id: ChildId,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE children SET last_interest_at = ? WHERE id = ?")
        .bind(ts(at))
        .bind(child_id.as_uuid())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Insert the row stamped with the current time. Must run after the child
/// row has been written in `tx`, so the stamp is taken under the write lock.
async fn insert_row(tx: &mut DbTransaction<'_, Sqlite>, posting: Posting) -> Result<Transaction> {
    // Clamped to the child's latest row in case the wall clock stepped back.
    let row = sqlx::query(&format!(
        "INSERT INTO transactions \
         (child_id, actor_id, amount_cents, kind, note, schedule_id, period_at, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
         MAX(?8, COALESCE((SELECT MAX(created_at) FROM transactions WHERE child_id = ?1), ?8))) \
         RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(posting.child_id.as_uuid())
    .bind(posting.actor_id.as_uuid())
    .bind(posting.amount_cents)
    .bind(posting.kind.as_str())
    .bind(posting.note)
    .bind(posting.schedule_id.map(|id| *id.as_uuid()))
    .bind(posting.period_at.map(ts))
    .bind(ts(Utc::now()))
    .fetch_one(&mut **tx)
    .await?;

    transaction_from_row(&row)
}

/// The latest slot paid by an interest row for this child.
async fn last_interest_period(
    tx: &mut DbTransaction<'_, Sqlite>,
    child_id: ChildId,
) -> Result<Option<DateTime<Utc>>> {
    let last: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT MAX(period_at) FROM transactions WHERE child_id = ? AND kind = 'interest'",
    )
    .bind(child_id.as_uuid())
    .fetch_one(&mut **tx)
    .await?;

    Ok(last)
}

#[async_trait]
impl Ledger for SqliteStore {
    async fn deposit(
        &self,
        child_id: ChildId,
        actor_id: ParentId,
        amount_cents: i64,
        note: Option<String>,
    ) -> Result<LedgerEntry> {
        self.post(Posting {
            child_id,
            actor_id,
            amount_cents,
            kind: TransactionKind::Deposit,
            schedule_id: None,
            note,
            period_at: None,
        })
        .await
    }

    async fn withdraw(
        &self,
        child_id: ChildId,
        actor_id: ParentId,
        amount_cents: i64,
        note: Option<String>,
    ) -> Result<LedgerEntry> {
        self.post(Posting {
            child_id,
            actor_id,
            amount_cents,
            kind: TransactionKind::Withdrawal,
            schedule_id: None,
            note,
            period_at: None,
        })
        .await
    }

    async fn credit_allowance(
        &self,
        child_id: ChildId,
        actor_id: ParentId,
        amount_cents: i64,
        schedule_id: ScheduleId,
        note: Option<String>,
        period_at: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        self.post(Posting {
            child_id,
            actor_id,
            amount_cents,
            kind: TransactionKind::Allowance,
            schedule_id: Some(schedule_id),
            note,
            period_at: Some(period_at),
        })
        .await
    }

    async fn credit_interest(
        &self,
        child_id: ChildId,
        actor_id: ParentId,
        amount_cents: i64,
        schedule_id: Option<ScheduleId>,
        note: Option<String>,
        period_at: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        self.post(Posting {
            child_id,
            actor_id,
            amount_cents,
            kind: TransactionKind::Interest,
            schedule_id,
            note,
            period_at: Some(period_at),
        })
        .await
    }

    async fn accrue_interest(&self, accrual: &InterestAccrual) -> Result<AccrualOutcome> {
        let _guard = self.locks.lock(accrual.child_id).await;
        let mut tx = self.pool.begin().await?;

        // No-op write first so the reads below happen under the write lock.
        let row = sqlx::query(
            "UPDATE children SET balance_cents = balance_cents WHERE id = ? \
             RETURNING balance_cents, interest_rate_bps",
        )
        .bind(accrual.child_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("child", accrual.child_id))?;

        let balance_cents: i64 = row.try_get("balance_cents")?;
        let rate_bps: i64 = row.try_get("interest_rate_bps")?;

        // Monthly accruals are additionally capped at one slot per UTC month.
        let last_period = last_interest_period(&mut tx, accrual.child_id).await?;
        let covered = last_period.is_some_and(|last| {
            last >= accrual.slot
                || (accrual.frequency == Frequency::Monthly
                    && calendar::same_utc_month(last, accrual.slot))
        });
        if covered {
            return Ok(AccrualOutcome::AlreadyCredited);
        }

        let amount_cents = interest::prorate(balance_cents, rate_bps, accrual.frequency);
        if amount_cents < 1 {
            return Ok(AccrualOutcome::BelowOneCent);
        }

        let balance_cents = credit(&mut tx, accrual.child_id, amount_cents).await?;
        let transaction = insert_row(
            &mut tx,
            Posting {
                child_id: accrual.child_id,
                actor_id: accrual.actor_id,
                amount_cents,
                kind: TransactionKind::Interest,
                schedule_id: Some(accrual.schedule_id),
                note: accrual.note.clone(),
                period_at: Some(accrual.slot),
            },
        )
        .await?;
        mark_interest(&mut tx, accrual.child_id, transaction.created_at).await?;
        tx.commit().await?;

        tracing::debug!(
            child_id = %accrual.child_id,
            schedule_id = %accrual.schedule_id,
            slot = %accrual.slot,
            amount_cents,
            balance_cents,
            "Interest accrued"
        );
        Ok(AccrualOutcome::Credited(LedgerEntry {
            transaction,
            balance_cents,
        }))
    }

    async fn list_by_child(&self, child_id: ChildId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE child_id = ? \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(child_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn has_schedule_credit_for(
        &self,
        schedule_id: ScheduleId,
        slot: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE schedule_id = ? AND period_at >= ?)",
        )
        .bind(schedule_id.as_uuid())
        .bind(ts(slot))
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
