//! Check configuration storage.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::common::error::{VigilError, VigilResult};
use crate::db::{fmt_ts, parse_opt_ts, parse_ts};
use crate::types::check::CheckConfig;

/// Filter for check listings.
#[derive(Debug, Clone, Default)]
pub struct CheckFilter {
    /// Restrict to enabled / disabled checks.
    pub enabled: Option<bool>,
    /// Restrict to checks carrying this tag.
    pub tag: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CheckRow {
    id: String,
    name: String,
    description: Option<String>,
    enabled: i64,
    target: String,
    rules: String,
    webhook: String,
    tags: Option<String>,
    schedule: Option<String>,
    schedule_enabled: i64,
    last_scheduled_run: Option<String>,
    next_scheduled_run: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<CheckRow> for CheckConfig {
    type Error = VigilError;

    fn try_from(row: CheckRow) -> Result<Self, Self::Error> {
        Ok(CheckConfig {
            id: row
                .id
                .parse()
                .map_err(|e| VigilError::Database(format!("invalid check id: {e}")))?,
            name: row.name,
            description: row.description,
            enabled: row.enabled != 0,
            target: serde_json::from_str(&row.target)?,
            rules: serde_json::from_str(&row.rules)?,
            webhook: serde_json::from_str(&row.webhook)?,
            tags: match row.tags {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Vec::new(),
            },
            schedule: row.schedule,
            schedule_enabled: row.schedule_enabled != 0,
            last_scheduled_run: parse_opt_ts(row.last_scheduled_run.as_deref())?,
            next_scheduled_run: parse_opt_ts(row.next_scheduled_run.as_deref())?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

/// Check configuration storage over the shared pool.
#[derive(Clone)]
pub struct CheckStore {
    pool: SqlitePool,
}

impl CheckStore {
    /// Create a store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new check. The name must be unique.
    pub async fn create(&self, config: &CheckConfig) -> VigilResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO checks (
                id, name, description, enabled, target, rules, webhook, tags,
                schedule, schedule_enabled, last_scheduled_run,
                next_scheduled_run, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(config.id.to_string())
        .bind(&config.name)
        .bind(&config.description)
        .bind(config.enabled as i64)
        .bind(serde_json::to_string(&config.target)?)
        .bind(serde_json::to_string(&config.rules)?)
        .bind(serde_json::to_string(&config.webhook)?)
        .bind(serde_json::to_string(&config.tags)?)
        .bind(&config.schedule)
        .bind(config.schedule_enabled as i64)
        .bind(config.last_scheduled_run.map(fmt_ts))
        .bind(config.next_scheduled_run.map(fmt_ts))
        .bind(fmt_ts(config.created_at))
        .bind(fmt_ts(config.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                VigilError::Validation(format!("check with name '{}' already exists", config.name)),
            ),
            Err(e) => Err(VigilError::Database(format!("Failed to create check: {e}"))),
        }
    }

    /// Fetch a check by id.
    pub async fn get(&self, id: Uuid) -> VigilResult<CheckConfig> {
        let row = sqlx::query_as::<_, CheckRow>("SELECT * FROM checks WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to load check: {e}")))?;

        row.ok_or_else(|| VigilError::NotFound(format!("check {id}")))?
            .try_into()
    }

    /// Fetch a check by its unique name.
    pub async fn get_by_name(&self, name: &str) -> VigilResult<CheckConfig> {
        let row = sqlx::query_as::<_, CheckRow>("SELECT * FROM checks WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to load check: {e}")))?;

        row.ok_or_else(|| VigilError::NotFound(format!("check '{name}'")))?
            .try_into()
    }

    /// List checks with filters and pagination, newest first.
    /// Returns the page plus the unpaginated total.
    pub async fn list(
        &self,
        filter: &CheckFilter,
        page: usize,
        per_page: usize,
    ) -> VigilResult<(Vec<CheckConfig>, usize)> {
        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM checks");
        push_check_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to count checks: {e}")))?;

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM checks");
        push_check_filter(&mut query, filter);
        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(per_page as i64);
        query.push(" OFFSET ");
        query.push_bind((page.saturating_sub(1) * per_page) as i64);

        let rows = query
            .build_query_as::<CheckRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to list checks: {e}")))?;

        let configs = rows
            .into_iter()
            .map(CheckConfig::try_from)
            .collect::<VigilResult<Vec<_>>>()?;
        Ok((configs, total as usize))
    }

    /// Replace a check document by id.
    pub async fn update(&self, config: &CheckConfig) -> VigilResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE checks SET
                name = ?, description = ?, enabled = ?, target = ?, rules = ?,
                webhook = ?, tags = ?, schedule = ?, schedule_enabled = ?,
                last_scheduled_run = ?, next_scheduled_run = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&config.name)
        .bind(&config.description)
        .bind(config.enabled as i64)
        .bind(serde_json::to_string(&config.target)?)
        .bind(serde_json::to_string(&config.rules)?)
        .bind(serde_json::to_string(&config.webhook)?)
        .bind(serde_json::to_string(&config.tags)?)
        .bind(&config.schedule)
        .bind(config.schedule_enabled as i64)
        .bind(config.last_scheduled_run.map(fmt_ts))
        .bind(config.next_scheduled_run.map(fmt_ts))
        .bind(fmt_ts(config.updated_at))
        .bind(config.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to update check: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(VigilError::NotFound(format!("check {}", config.id)));
        }
        Ok(())
    }

    /// Delete a check by id.
    pub async fn delete(&self, id: Uuid) -> VigilResult<()> {
        let result = sqlx::query("DELETE FROM checks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to delete check: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(VigilError::NotFound(format!("check {id}")));
        }
        Ok(())
    }

    /// Checks due for scheduled execution: enabled, schedule on, and
    /// `next_scheduled_run <= now`.
    pub async fn find_due(&self, now: DateTime<Utc>) -> VigilResult<Vec<CheckConfig>> {
        let rows = sqlx::query_as::<_, CheckRow>(
            r#"
            SELECT * FROM checks
            WHERE enabled = 1
              AND schedule_enabled = 1
              AND next_scheduled_run IS NOT NULL
              AND next_scheduled_run <= ?
            "#,
        )
        .bind(fmt_ts(now))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to find due checks: {e}")))?;

        rows.into_iter().map(CheckConfig::try_from).collect()
    }

    /// Write back schedule bookkeeping after a scheduled execution.
    pub async fn update_scheduled_run(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> VigilResult<()> {
        let result = sqlx::query(
            "UPDATE checks SET last_scheduled_run = ?, next_scheduled_run = ? WHERE id = ?",
        )
        .bind(fmt_ts(last_run))
        .bind(next_run.map(fmt_ts))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to update scheduled run: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(VigilError::NotFound(format!("check {id}")));
        }
        Ok(())
    }
}

fn push_check_filter(query: &mut QueryBuilder<Sqlite>, filter: &CheckFilter) {
    let mut has_where = false;
    if let Some(enabled) = filter.enabled {
        query.push(" WHERE enabled = ");
        query.push_bind(enabled as i64);
        has_where = true;
    }
    if let Some(tag) = &filter.tag {
        query.push(if has_where { " AND " } else { " WHERE " });
        // Tags live in a JSON array column; match the quoted element.
        query.push("tags LIKE ");
        query.push_bind(format!("%\"{tag}\"%"));
    }
}
