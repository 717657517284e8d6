//! [`AllowanceRegistry`] and [`InterestRegistry`] for [`SqliteStore`].
//!
//! The two tables share their cadence, status and `next_run_at` columns, so
//! everything except create and field edits is written once against
//! [`ScheduleRow`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction as DbTransaction};

use kidbank_core::{
    calendar, AllowanceSchedule, ChildId, DaySpec, FamilyId, Frequency, InterestSchedule,
    ParentId, ScheduleId, ScheduleKind, ScheduleStatus,
};

use crate::error::{is_unique_violation, Result, StoreError};
use crate::model::{AllowanceFields, FamilySchedule, NewAllowance, NewInterest};
use crate::schema::table;
use crate::sqlite::{instant, opt_instant, ts, uuid, SqliteStore};
use crate::{AllowanceRegistry, InterestRegistry};

/// A schedule type stored in its own table.
trait ScheduleRow: Sized + Send + Unpin {
    const TABLE: &'static str;
    const KIND: ScheduleKind;
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &SqliteRow) -> Result<Self>;
    fn cadence(&self) -> (Frequency, DaySpec);
    fn status(&self) -> ScheduleStatus;

    /// Column list, each name prefixed (e.g. `"s."`).
    fn columns(prefix: &str) -> String {
        Self::COLUMNS
            .iter()
            .map(|c| format!("{prefix}{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn cadence_from_row(row: &SqliteRow) -> Result<(Frequency, DaySpec)> {
    let frequency: Frequency = row.try_get::<String, _>("frequency")?.parse()?;
    let day = DaySpec::for_frequency(
        frequency,
        row.try_get("day_of_week")?,
        row.try_get("day_of_month")?,
    )?;
    Ok((frequency, day))
}

fn status_from_row(row: &SqliteRow) -> Result<ScheduleStatus> {
    let status: String = row.try_get("status")?;
    ScheduleStatus::parse(&status)
        .ok_or_else(|| StoreError::Decode(format!("unknown schedule status: {status}")))
}

impl ScheduleRow for AllowanceSchedule {
    const TABLE: &'static str = table::ALLOWANCE_SCHEDULES;
    const KIND: ScheduleKind = ScheduleKind::Allowance;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "child_id",
        "owner_id",
        "amount_cents",
        "frequency",
        "day_of_week",
        "day_of_month",
        "note",
        "status",
        "next_run_at",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let (frequency, day) = cadence_from_row(row)?;
        Ok(Self {
            id: ScheduleId::from_uuid(uuid(row, "id")?),
            child_id: ChildId::from_uuid(uuid(row, "child_id")?),
            owner_id: ParentId::from_uuid(uuid(row, "owner_id")?),
            amount_cents: row.try_get("amount_cents")?,
            frequency,
            day,
            note: row.try_get("note")?,
            status: status_from_row(row)?,
            next_run_at: opt_instant(row, "next_run_at")?,
            created_at: instant(row, "created_at")?,
            updated_at: instant(row, "updated_at")?,
        })
    }

    fn cadence(&self) -> (Frequency, DaySpec) {
        (self.frequency, self.day)
    }

    fn status(&self) -> ScheduleStatus {
        self.status
    }
}

impl ScheduleRow for InterestSchedule {
    const TABLE: &'static str = table::INTEREST_SCHEDULES;
    const KIND: ScheduleKind = ScheduleKind::Interest;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "child_id",
        "owner_id",
        "frequency",
        "day_of_week",
        "day_of_month",
        "status",
        "next_run_at",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let (frequency, day) = cadence_from_row(row)?;
        Ok(Self {
            id: ScheduleId::from_uuid(uuid(row, "id")?),
            child_id: ChildId::from_uuid(uuid(row, "child_id")?),
            owner_id: ParentId::from_uuid(uuid(row, "owner_id")?),
            frequency,
            day,
            status: status_from_row(row)?,
            next_run_at: opt_instant(row, "next_run_at")?,
            created_at: instant(row, "created_at")?,
            updated_at: instant(row, "updated_at")?,
        })
    }

    fn cadence(&self) -> (Frequency, DaySpec) {
        (self.frequency, self.day)
    }

    fn status(&self) -> ScheduleStatus {
        self.status
    }
}

fn insert_error(err: sqlx::Error, kind: ScheduleKind, child_id: ChildId) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::ScheduleConflict {
            kind,
            child_id: child_id.to_string(),
        }
    } else if err
        .as_database_error()
        .is_some_and(|db| db.is_foreign_key_violation())
    {
        StoreError::not_found("child", child_id)
    } else {
        err.into()
    }
}

/// Read a schedule inside `tx` after taking the write lock on its row.
async fn lock_row<S: ScheduleRow>(
    tx: &mut DbTransaction<'_, Sqlite>,
    id: ScheduleId,
) -> Result<S> {
    let row = sqlx::query(&format!(
        "UPDATE {} SET updated_at = updated_at WHERE id = ? RETURNING {}",
        S::TABLE,
        S::columns("")
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::not_found("schedule", id))?;

    S::from_row(&row)
}

impl SqliteStore {
    async fn schedule_by<S: ScheduleRow>(&self, column: &str, id: uuid::Uuid) -> Result<Option<S>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE {column} = ?",
            S::columns(""),
            S::TABLE
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(S::from_row).transpose()
    }

    async fn schedules_by_family<S: ScheduleRow>(
        &self,
        family_id: FamilyId,
    ) -> Result<Vec<FamilySchedule<S>>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, c.name AS child_name FROM {} s \
             JOIN children c ON c.id = s.child_id \
             WHERE c.family_id = ? ORDER BY c.name, s.id",
            S::columns("s."),
            S::TABLE
        ))
        .bind(family_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FamilySchedule {
                    schedule: S::from_row(row)?,
                    child_name: row.try_get("child_name")?,
                })
            })
            .collect()
    }

    async fn active_schedules_by_child<S: ScheduleRow>(&self, child_id: ChildId) -> Result<Vec<S>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE child_id = ? AND status = 'active'",
            S::columns(""),
            S::TABLE
        ))
        .bind(child_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(S::from_row).collect()
    }

    async fn set_schedule_status<S: ScheduleRow>(
        &self,
        id: ScheduleId,
        status: ScheduleStatus,
        now: DateTime<Utc>,
    ) -> Result<S> {
        let mut tx = self.pool.begin().await?;
        let current: S = lock_row(&mut tx, id).await?;

        let next_run_at = match (current.status(), status) {
            (ScheduleStatus::Paused, ScheduleStatus::Paused) => {
                return Err(StoreError::AlreadyPaused)
            }
            (ScheduleStatus::Active, ScheduleStatus::Active) => {
                return Err(StoreError::AlreadyActive)
            }
            (ScheduleStatus::Active, ScheduleStatus::Paused) => None,
            (ScheduleStatus::Paused, ScheduleStatus::Active) => {
                let (frequency, day) = current.cadence();
                Some(calendar::next_run(frequency, day, now))
            }
        };

        let row = sqlx::query(&format!(
            "UPDATE {} SET status = ?, next_run_at = COALESCE(?, next_run_at), updated_at = ? \
             WHERE id = ? RETURNING {}",
            S::TABLE,
            S::columns("")
        ))
        .bind(status.as_str())
        .bind(next_run_at.map(ts))
        .bind(ts(now))
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let updated = S::from_row(&row)?;
        tx.commit().await?;

        tracing::info!(
            schedule_id = %id,
            kind = %S::KIND,
            status = status.as_str(),
            "Schedule status changed"
        );
        Ok(updated)
    }

    async fn set_next_run_at<S: ScheduleRow>(
        &self,
        id: ScheduleId,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET next_run_at = ? WHERE id = ?",
            S::TABLE
        ))
        .bind(ts(next_run_at))
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("schedule", id));
        }
        Ok(())
    }

    async fn advance_schedule<S: ScheduleRow>(
        &self,
        id: ScheduleId,
        fired_at: DateTime<Utc>,
        (frequency, day): (Frequency, DaySpec),
        next: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET next_run_at = ? \
             WHERE id = ? AND status = 'active' AND next_run_at = ? \
             AND frequency = ? AND day_of_week IS ? AND day_of_month IS ?",
            S::TABLE
        ))
        .bind(ts(next))
        .bind(id.as_uuid())
        .bind(ts(fired_at))
        .bind(frequency.as_str())
        .bind(day.day_of_week().map(i64::from))
        .bind(day.day_of_month().map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_schedule<S: ScheduleRow>(&self, id: ScheduleId) -> Result<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", S::TABLE))
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("schedule", id));
        }
        tracing::info!(schedule_id = %id, kind = %S::KIND, "Schedule deleted");
        Ok(())
    }

    async fn due_schedules<S: ScheduleRow>(&self, now: DateTime<Utc>) -> Result<Vec<S>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE status = 'active' AND next_run_at <= ? \
             ORDER BY next_run_at, id",
            S::columns(""),
            S::TABLE
        ))
        .bind(ts(now))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(S::from_row).collect()
    }
}

#[async_trait]
impl AllowanceRegistry for SqliteStore {
    async fn create_allowance(
        &self,
        new: &NewAllowance,
        now: DateTime<Utc>,
    ) -> Result<AllowanceSchedule> {
        let schedule = AllowanceSchedule {
            id: ScheduleId::generate(),
            child_id: new.child_id,
            owner_id: new.owner_id,
            amount_cents: new.amount_cents,
            frequency: new.frequency,
            day: new.day,
            note: new.note.clone(),
            status: ScheduleStatus::Active,
            next_run_at: Some(calendar::next_run(new.frequency, new.day, now)),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            AllowanceSchedule::TABLE,
            AllowanceSchedule::columns("")
        ))
        .bind(schedule.id.as_uuid())
        .bind(schedule.child_id.as_uuid())
        .bind(schedule.owner_id.as_uuid())
        .bind(schedule.amount_cents)
        .bind(schedule.frequency.as_str())
        .bind(schedule.day.day_of_week().map(i64::from))
        .bind(schedule.day.day_of_month().map(i64::from))
        .bind(schedule.note.as_deref())
        .bind(schedule.status.as_str())
        .bind(schedule.next_run_at.map(ts))
        .bind(ts(now))
        .bind(ts(now))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, ScheduleKind::Allowance, new.child_id))?;

        tracing::info!(
            schedule_id = %schedule.id,
            child_id = %schedule.child_id,
            frequency = %schedule.frequency,
            "Allowance schedule created"
        );
        Ok(schedule)
    }

    async fn get_allowance(&self, id: ScheduleId) -> Result<Option<AllowanceSchedule>> {
        self.schedule_by("id", *id.as_uuid()).await
    }

    async fn get_allowance_by_child(
        &self,
        child_id: ChildId,
    ) -> Result<Option<AllowanceSchedule>> {
        self.schedule_by("child_id", *child_id.as_uuid()).await
    }

    async fn list_allowances_by_family(
        &self,
        family_id: FamilyId,
    ) -> Result<Vec<FamilySchedule<AllowanceSchedule>>> {
        self.schedules_by_family(family_id).await
    }

    async fn list_active_allowances_by_child(
        &self,
        child_id: ChildId,
    ) -> Result<Vec<AllowanceSchedule>> {
        self.active_schedules_by_child(child_id).await
    }

    async fn update_allowance_fields(
        &self,
        id: ScheduleId,
        fields: &AllowanceFields,
        now: DateTime<Utc>,
    ) -> Result<AllowanceSchedule> {
        let mut tx = self.pool.begin().await?;
        let current: AllowanceSchedule = lock_row(&mut tx, id).await?;

        let cadence_changed = current.cadence() != (fields.frequency, fields.day);
        let next_run_at = if cadence_changed && current.status == ScheduleStatus::Active {
            Some(calendar::next_run(fields.frequency, fields.day, now))
        } else {
            current.next_run_at
        };

        let row = sqlx::query(&format!(
            "UPDATE {} SET amount_cents = ?, frequency = ?, day_of_week = ?, day_of_month = ?, \
             note = ?, next_run_at = ?, updated_at = ? WHERE id = ? RETURNING {}",
            AllowanceSchedule::TABLE,
            AllowanceSchedule::columns("")
        ))
        .bind(fields.amount_cents)
        .bind(fields.frequency.as_str())
        .bind(fields.day.day_of_week().map(i64::from))
        .bind(fields.day.day_of_month().map(i64::from))
        .bind(fields.note.as_deref())
        .bind(next_run_at.map(ts))
        .bind(ts(now))
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let updated = AllowanceSchedule::from_row(&row)?;
        tx.commit().await?;

        tracing::info!(
            schedule_id = %id,
            cadence_changed,
            "Allowance schedule updated"
        );
        Ok(updated)
    }

    async fn update_allowance_status(
        &self,
        id: ScheduleId,
        status: ScheduleStatus,
        now: DateTime<Utc>,
    ) -> Result<AllowanceSchedule> {
        self.set_schedule_status(id, status, now).await
    }

    async fn update_allowance_next_run_at(
        &self,
        id: ScheduleId,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        self.set_next_run_at::<AllowanceSchedule>(id, next_run_at).await
    }

    async fn advance_allowance(
        &self,
        id: ScheduleId,
        fired_at: DateTime<Utc>,
        cadence: (Frequency, DaySpec),
        next: DateTime<Utc>,
    ) -> Result<bool> {
        self.advance_schedule::<AllowanceSchedule>(id, fired_at, cadence, next)
            .await
    }

    async fn delete_allowance(&self, id: ScheduleId) -> Result<()> {
        self.delete_schedule::<AllowanceSchedule>(id).await
    }

    async fn list_due_allowances(&self, now: DateTime<Utc>) -> Result<Vec<AllowanceSchedule>> {
        self.due_schedules(now).await
    }
}

#[async_trait]
impl InterestRegistry for SqliteStore {
    async fn create_interest(
        &self,
        new: &NewInterest,
        now: DateTime<Utc>,
    ) -> Result<InterestSchedule> {
        let schedule = InterestSchedule {
            id: ScheduleId::generate(),
            child_id: new.child_id,
            owner_id: new.owner_id,
            frequency: new.frequency,
            day: new.day,
            status: ScheduleStatus::Active,
            next_run_at: Some(calendar::next_run(new.frequency, new.day, now)),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            InterestSchedule::TABLE,
            InterestSchedule::columns("")
        ))
        .bind(schedule.id.as_uuid())
        .bind(schedule.child_id.as_uuid())
        .bind(schedule.owner_id.as_uuid())
        .bind(schedule.frequency.as_str())
        .bind(schedule.day.day_of_week().map(i64::from))
        .bind(schedule.day.day_of_month().map(i64::from))
        .bind(schedule.status.as_str())
        .bind(schedule.next_run_at.map(ts))
        .bind(ts(now))
        .bind(ts(now))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, ScheduleKind::Interest, new.child_id))?;

        tracing::info!(
            schedule_id = %schedule.id,
            child_id = %schedule.child_id,
            frequency = %schedule.frequency,
            "Interest schedule created"
        );
        Ok(schedule)
    }

    async fn get_interest(&self, id: ScheduleId) -> Result<Option<InterestSchedule>> {
        self.schedule_by("id", *id.as_uuid()).await
    }

    async fn get_interest_by_child(&self, child_id: ChildId) -> Result<Option<InterestSchedule>> {
        self.schedule_by("child_id", *child_id.as_uuid()).await
    }

    async fn list_interest_by_family(
        &self,
        family_id: FamilyId,
    ) -> Result<Vec<FamilySchedule<InterestSchedule>>> {
        self.schedules_by_family(family_id).await
    }

    async fn list_active_interest_by_child(
        &self,
        child_id: ChildId,
    ) -> Result<Vec<InterestSchedule>> {
        self.active_schedules_by_child(child_id).await
    }

    async fn update_interest_fields(
        &self,
        id: ScheduleId,
        frequency: Frequency,
        day: DaySpec,
        now: DateTime<Utc>,
    ) -> Result<InterestSchedule> {
        let mut tx = self.pool.begin().await?;
        let current: InterestSchedule = lock_row(&mut tx, id).await?;

        let cadence_changed = current.cadence() != (frequency, day);
        let next_run_at = if cadence_changed && current.status == ScheduleStatus::Active {
            Some(calendar::next_run(frequency, day, now))
        } else {
            current.next_run_at
        };

        let row = sqlx::query(&format!(
            "UPDATE {} SET frequency = ?, day_of_week = ?, day_of_month = ?, \
             next_run_at = ?, updated_at = ? WHERE id = ? RETURNING {}",
            InterestSchedule::TABLE,
            InterestSchedule::columns("")
        ))
        .bind(frequency.as_str())
        .bind(day.day_of_week().map(i64::from))
        .bind(day.day_of_month().map(i64::from))
        .bind(next_run_at.map(ts))
        .bind(ts(now))
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let updated = InterestSchedule::from_row(&row)?;
        tx.commit().await?;

        tracing::info!(
            schedule_id = %id,
            cadence_changed,
            "Interest schedule updated"
        );
        Ok(updated)
    }

    async fn update_interest_status(
        &self,
        id: ScheduleId,
        status: ScheduleStatus,
        now: DateTime<Utc>,
    ) -> Result<InterestSchedule> {
        self.set_schedule_status(id, status, now).await
    }

    async fn update_interest_next_run_at(
        &self,
        id: ScheduleId,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        self.set_next_run_at::<InterestSchedule>(id, next_run_at).await
    }

    async fn advance_interest(
        &self,
        id: ScheduleId,
        fired_at: DateTime<Utc>,
        cadence: (Frequency, DaySpec),
        next: DateTime<Utc>,
    ) -> Result<bool> {
        self.advance_schedule::<InterestSchedule>(id, fired_at, cadence, next)
            .await
    }

    async fn delete_interest(&self, id: ScheduleId) -> Result<()> {
        self.delete_schedule::<InterestSchedule>(id).await
    }

    async fn list_due_interest(&self, now: DateTime<Utc>) -> Result<Vec<InterestSchedule>> {
        self.due_schedules(now).await
    }
}
