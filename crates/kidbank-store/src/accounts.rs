//! [`AccountStore`] for [`SqliteStore`].

use async_trait::async_trait;
use sqlx::Row;

use kidbank_core::{Child, ChildId, Family, FamilyId, Parent, ParentId};

use crate::error::{is_unique_violation, Result, StoreError};
use crate::model::ChildUpdate;
use crate::sqlite::{child_from_row, instant, ts, uuid, SqliteStore, CHILD_COLUMNS};
use crate::AccountStore;

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_foreign_key_violation())
}

#[async_trait]
impl AccountStore for SqliteStore {
    // =========================================================================
    // Families
    // =========================================================================

    async fn create_family(&self, family: &Family) -> Result<()> {
        sqlx::query("INSERT INTO families (id, name, created_at) VALUES (?, ?, ?)")
            .bind(family.id.as_uuid())
            .bind(&family.name)
            .bind(ts(family.created_at))
            .execute(&self.pool)
            .await?;

        tracing::debug!(family_id = %family.id, "Family created");
        Ok(())
    }

    async fn get_family(&self, family_id: FamilyId) -> Result<Option<Family>> {
        let row = sqlx::query("SELECT id, name, created_at FROM families WHERE id = ?")
            .bind(family_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(Family {
                id: FamilyId::from_uuid(uuid(&row, "id")?),
                name: row.try_get("name")?,
                created_at: instant(&row, "created_at")?,
            })
        })
        .transpose()
    }

    async fn delete_family(&self, family_id: FamilyId) -> Result<()> {
        let children = self.list_children_by_family(family_id).await?;

        let result = sqlx::query("DELETE FROM families WHERE id = ?")
            .bind(family_id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("family", family_id));
        }

        for child in &children {
            self.locks.forget(child.id);
        }
        tracing::info!(family_id = %family_id, children = children.len(), "Family deleted");
        Ok(())
    }

    // =========================================================================
    // Parents
    // =========================================================================

    async fn create_parent(&self, parent: &Parent) -> Result<()> {
        sqlx::query(
            "INSERT INTO parents (id, family_id, display_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(parent.id.as_uuid())
        .bind(parent.family_id.as_uuid())
        .bind(&parent.display_name)
        .bind(ts(parent.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::not_found("family", parent.family_id)
            } else {
                e.into()
            }
        })?;

        tracing::debug!(parent_id = %parent.id, family_id = %parent.family_id, "Parent created");
        Ok(())
    }

    async fn get_parent(&self, parent_id: ParentId) -> Result<Option<Parent>> {
        let row = sqlx::query(
            "SELECT id, family_id, display_name, created_at FROM parents WHERE id = ?",
        )
        .bind(parent_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Parent {
                id: ParentId::from_uuid(uuid(&row, "id")?),
                family_id: FamilyId::from_uuid(uuid(&row, "family_id")?),
                display_name: row.try_get("display_name")?,
                created_at: instant(&row, "created_at")?,
            })
        })
        .transpose()
    }

    // =========================================================================
    // Children
    // =========================================================================

    async fn create_child(&self, child: &Child) -> Result<()> {
        sqlx::query(
            "INSERT INTO children \
             (id, family_id, name, balance_cents, interest_rate_bps, last_interest_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(child.id.as_uuid())
        .bind(child.family_id.as_uuid())
        .bind(&child.name)
        .bind(child.balance_cents)
        .bind(child.interest_rate_bps)
        .bind(child.last_interest_at.map(ts))
        .bind(ts(child.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateName(child.name.clone())
            } else if is_foreign_key_violation(&e) {
                StoreError::not_found("family", child.family_id)
            } else {
                e.into()
            }
        })?;

        tracing::info!(child_id = %child.id, family_id = %child.family_id, "Child created");
        Ok(())
    }

    async fn get_child(&self, child_id: ChildId) -> Result<Option<Child>> {
        let row = sqlx::query(&format!("SELECT {CHILD_COLUMNS} FROM children WHERE id = ?"))
            .bind(child_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(child_from_row).transpose()
    }

    async fn list_children_by_family(&self, family_id: FamilyId) -> Result<Vec<Child>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHILD_COLUMNS} FROM children WHERE family_id = ? ORDER BY name, id"
        ))
        .bind(family_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(child_from_row).collect()
    }

    async fn update_child(&self, child_id: ChildId, update: &ChildUpdate) -> Result<Child> {
        // The rate feeds interest accrual, which reads it under the same lock.
        let _guard = self.locks.lock(child_id).await;

        let row = sqlx::query(&format!(
            "UPDATE children SET \
             name = COALESCE(?, name), \
             interest_rate_bps = COALESCE(?, interest_rate_bps) \
             WHERE id = ? RETURNING {CHILD_COLUMNS}"
        ))
        .bind(update.name.as_deref())
        .bind(update.interest_rate_bps)
        .bind(child_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match (&update.name, is_unique_violation(&e)) {
            (Some(name), true) => StoreError::DuplicateName(name.clone()),
            _ => e.into(),
        })?
        .ok_or_else(|| StoreError::not_found("child", child_id))?;

        let child = child_from_row(&row)?;
        tracing::debug!(child_id = %child_id, "Child updated");
        Ok(child)
    }

    async fn delete_child(&self, child_id: ChildId) -> Result<()> {
        let guard = self.locks.lock(child_id).await;

        let result = sqlx::query("DELETE FROM children WHERE id = ?")
            .bind(child_id.as_uuid())
            .execute(&self.pool)
            .await?;

        drop(guard);
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("child", child_id));
        }

        self.locks.forget(child_id);
        tracing::info!(child_id = %child_id, "Child deleted");
        Ok(())
    }
}
