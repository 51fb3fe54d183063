//! Distributed, TTL-bounded schedule leases.
//!
//! A lease grants one replica the right to run one scheduled check. Acquire
//! is a single atomic upsert whose guard only fires on absent or expired
//! rows, so under concurrent attempts exactly one owner wins. Expired rows
//! are reclaimed by `sweep` as a safety net for crashed owners.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::common::error::{VigilError, VigilResult};
use crate::db::{fmt_ts, parse_ts};

/// A lease row.
#[derive(Debug, Clone)]
pub struct ScheduleLease {
    /// Check the lease covers.
    pub config_id: Uuid,
    /// Owner identity (hostname or generated id).
    pub locked_by: String,
    /// When the lease was taken.
    pub locked_at: DateTime<Utc>,
    /// When the lease lapses.
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LeaseRow {
    config_id: String,
    locked_by: String,
    locked_at: String,
    expires_at: String,
}

impl TryFrom<LeaseRow> for ScheduleLease {
    type Error = VigilError;

    fn try_from(row: LeaseRow) -> Result<Self, Self::Error> {
        Ok(ScheduleLease {
            config_id: row
                .config_id
                .parse()
                .map_err(|e| VigilError::Database(format!("invalid lease config id: {e}")))?,
            locked_by: row.locked_by,
            locked_at: parse_ts(&row.locked_at)?,
            expires_at: parse_ts(&row.expires_at)?,
        })
    }
}

/// Lease storage.
#[derive(Clone)]
pub struct LeaseStore {
    pool: SqlitePool,
}

impl LeaseStore {
    /// Create a store over the shared pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Try to take the lease for `config_id`. Returns `true` only when this
    /// call transferred ownership: the row was absent or expired. The upsert
    /// guard makes the decision atomic under concurrency.
    pub async fn acquire(
        &self,
        config_id: Uuid,
        owner: &str,
        ttl: Duration,
    ) -> VigilResult<bool> {
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| VigilError::Internal(format!("lease ttl out of range: {e}")))?;

        let locked_by: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO schedule_leases (config_id, locked_by, locked_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(config_id) DO UPDATE SET
                locked_by = excluded.locked_by,
                locked_at = excluded.locked_at,
                expires_at = excluded.expires_at
            WHERE schedule_leases.expires_at < excluded.locked_at
            RETURNING locked_by
            "#,
        )
        .bind(config_id.to_string())
        .bind(owner)
        .bind(fmt_ts(now))
        .bind(fmt_ts(expires_at))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to acquire lease: {e}")))?;

        let acquired = locked_by.as_deref() == Some(owner);
        if acquired {
            debug!(
                config_id = %config_id,
                owner = owner,
                expires_at = %expires_at,
                "Lease acquired"
            );
        }
        Ok(acquired)
    }

    /// Release the lease iff `owner` holds it. No-op otherwise.
    pub async fn release(&self, config_id: Uuid, owner: &str) -> VigilResult<()> {
        let result = sqlx::query(
            "DELETE FROM schedule_leases WHERE config_id = ? AND locked_by = ?",
        )
        .bind(config_id.to_string())
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to release lease: {e}")))?;

        if result.rows_affected() > 0 {
            debug!(config_id = %config_id, owner = owner, "Lease released");
        }
        Ok(())
    }

    /// Release every lease held by `owner`. Called at shutdown.
    pub async fn release_all(&self, owner: &str) -> VigilResult<u64> {
        let result = sqlx::query("DELETE FROM schedule_leases WHERE locked_by = ?")
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to release leases: {e}")))?;

        let released = result.rows_affected();
        if released > 0 {
            info!(owner = owner, count = released, "Released all leases");
        }
        Ok(released)
    }

    /// Extend an owned lease by `ttl` from now. Errors if not owned.
    pub async fn extend(&self, config_id: Uuid, owner: &str, ttl: Duration) -> VigilResult<()> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| VigilError::Internal(format!("lease ttl out of range: {e}")))?;

        let result = sqlx::query(
            "UPDATE schedule_leases SET expires_at = ? WHERE config_id = ? AND locked_by = ?",
        )
        .bind(fmt_ts(expires_at))
        .bind(config_id.to_string())
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to extend lease: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(VigilError::NotFound(format!(
                "lease for {config_id} not held by {owner}"
            )));
        }
        Ok(())
    }

    /// Delete every expired lease. Returns the reclaim count.
    pub async fn sweep(&self) -> VigilResult<u64> {
        let result = sqlx::query("DELETE FROM schedule_leases WHERE expires_at < ?")
            .bind(fmt_ts(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to sweep leases: {e}")))?;
        Ok(result.rows_affected())
    }

    /// Current lease row for a check, if any.
    pub async fn get(&self, config_id: Uuid) -> VigilResult<Option<ScheduleLease>> {
        let row = sqlx::query_as::<_, LeaseRow>(
            "SELECT * FROM schedule_leases WHERE config_id = ? LIMIT 1",
        )
        .bind(config_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to load lease: {e}")))?;

        row.map(ScheduleLease::try_from).transpose()
    }
}
