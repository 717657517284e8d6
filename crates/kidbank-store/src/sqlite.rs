//! SQLite storage implementation.
//!
//! This module provides [`SqliteStore`], the implementation of every store
//! trait. The trait impls themselves live in `accounts`, `ledger` and
//! `schedules`; this module owns the pool, the per-child locks and the
//! row-decoding helpers they share.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use kidbank_core::{
    Child, ChildId, FamilyId, ParentId, ScheduleId, Transaction, TransactionId, TransactionKind,
};

use crate::error::{Result, StoreError};
use crate::locks::ChildLocks;
use crate::schema::MIGRATOR;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed storage implementation.
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
    pub(crate) locks: ChildLocks,
}

impl SqliteStore {
    /// Open or create a database at `url` and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Open a private in-memory database (one connection, never recycled).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or migrated.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // The database lives as long as its only connection does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        MIGRATOR.run(&pool).await?;
        tracing::debug!("Database migrations applied");
        Ok(Self {
            pool,
            locks: ChildLocks::new(),
        })
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// =============================================================================
// Encoding and row decoding
// =============================================================================

/// Fixed-width UTC text so stored instants compare correctly as strings.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    Ok(row.try_get::<Uuid, _>(column)?)
}

pub(crate) fn opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    Ok(row.try_get::<Option<Uuid>, _>(column)?)
}

pub(crate) fn instant(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    Ok(row.try_get::<DateTime<Utc>, _>(column)?)
}

pub(crate) fn opt_instant(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(row.try_get::<Option<DateTime<Utc>>, _>(column)?)
}

pub(crate) const CHILD_COLUMNS: &str =
    "id, family_id, name, balance_cents, interest_rate_bps, last_interest_at, created_at";

pub(crate) fn child_from_row(row: &SqliteRow) -> Result<Child> {
    Ok(Child {
        id: ChildId::from_uuid(uuid(row, "id")?),
        family_id: FamilyId::from_uuid(uuid(row, "family_id")?),
        name: row.try_get("name")?,
        balance_cents: row.try_get("balance_cents")?,
        interest_rate_bps: row.try_get("interest_rate_bps")?,
        last_interest_at: opt_instant(row, "last_interest_at")?,
        created_at: instant(row, "created_at")?,
    })
}

pub(crate) const TRANSACTION_COLUMNS: &str =
    "id, child_id, actor_id, amount_cents, kind, note, schedule_id, period_at, created_at";

pub(crate) fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
    let kind: String = row.try_get("kind")?;
    Ok(Transaction {
        id: TransactionId::new(row.try_get("id")?),
        child_id: ChildId::from_uuid(uuid(row, "child_id")?),
        actor_id: ParentId::from_uuid(uuid(row, "actor_id")?),
        amount_cents: row.try_get("amount_cents")?,
        kind: TransactionKind::parse(&kind)
            .ok_or_else(|| StoreError::Decode(format!("unknown transaction kind: {kind}")))?,
        note: row.try_get("note")?,
        schedule_id: opt_uuid(row, "schedule_id")?.map(ScheduleId::from_uuid),
        period_at: opt_instant(row, "period_at")?,
        created_at: instant(row, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_applies_migrations() {
        let store = SqliteStore::in_memory().await.unwrap();
        for table in crate::schema::all_tables() {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(store.pool())
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("kidbank.db").display());

        let store = SqliteStore::connect(&url, 2).await.unwrap();
        sqlx::query("INSERT INTO families (id, name, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind("Lovelace")
            .bind(ts(Utc::now()))
            .execute(store.pool())
            .await
            .unwrap();
        store.close().await;

        let reopened = SqliteStore::connect(&url, 2).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM families")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn encoded_instants_sort_chronologically() {
        let whole = DateTime::parse_from_rfc3339("2025-01-17T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = whole + chrono::Duration::milliseconds(500);
        assert!(ts(whole) < ts(later));
        assert_eq!(ts(whole), "2025-01-17T00:00:00.000000Z");
    }
}
