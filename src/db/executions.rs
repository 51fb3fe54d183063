//! Execution history storage.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::common::error::{VigilError, VigilResult};
use crate::db::{fmt_ts, parse_ts};
use crate::types::execution::{AlertTriggered, ExecutionHistory, ExecutionStatus};

/// Filter for execution listings.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Restrict to one check.
    pub config_id: Option<Uuid>,
    /// Restrict to one terminal status.
    pub status: Option<ExecutionStatus>,
    /// Executions at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Executions at or before this instant.
    pub to: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    correlation_id: String,
    config_id: String,
    config_name: String,
    executed_at: String,
    duration_ms: i64,
    request: String,
    response: String,
    rules_evaluation: String,
    alerts_triggered: String,
    status: String,
}

impl TryFrom<ExecutionRow> for ExecutionHistory {
    type Error = VigilError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(ExecutionHistory {
            id: row
                .id
                .parse()
                .map_err(|e| VigilError::Database(format!("invalid execution id: {e}")))?,
            correlation_id: row
                .correlation_id
                .parse()
                .map_err(|e| VigilError::Database(format!("invalid correlation id: {e}")))?,
            config_id: row
                .config_id
                .parse()
                .map_err(|e| VigilError::Database(format!("invalid config id: {e}")))?,
            config_name: row.config_name,
            executed_at: parse_ts(&row.executed_at)?,
            duration_ms: row.duration_ms,
            request: serde_json::from_str(&row.request)?,
            response: serde_json::from_str(&row.response)?,
            rules_evaluation: serde_json::from_str(&row.rules_evaluation)?,
            alerts_triggered: serde_json::from_str(&row.alerts_triggered)?,
            status: row
                .status
                .parse()
                .map_err(|_| VigilError::Database(format!("invalid status '{}'", row.status)))?,
        })
    }
}

/// Execution history storage over the shared pool.
#[derive(Clone)]
pub struct ExecutionStore {
    pool: SqlitePool,
}

impl ExecutionStore {
    /// Create a store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist an execution. The correlation id must be unique.
    pub async fn create(&self, history: &ExecutionHistory) -> VigilResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO executions (
                id, correlation_id, config_id, config_name, executed_at,
                duration_ms, request, response, rules_evaluation,
                alerts_triggered, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(history.id.to_string())
        .bind(history.correlation_id.to_string())
        .bind(history.config_id.to_string())
        .bind(&history.config_name)
        .bind(fmt_ts(history.executed_at))
        .bind(history.duration_ms)
        .bind(serde_json::to_string(&history.request)?)
        .bind(serde_json::to_string(&history.response)?)
        .bind(serde_json::to_string(&history.rules_evaluation)?)
        .bind(serde_json::to_string(&history.alerts_triggered)?)
        .bind(history.status.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(VigilError::Validation(format!(
                    "execution with correlation id {} already exists",
                    history.correlation_id
                )))
            }
            Err(e) => Err(VigilError::Database(format!(
                "Failed to save execution: {e}"
            ))),
        }
    }

    /// Fetch an execution by correlation id.
    pub async fn get_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> VigilResult<ExecutionHistory> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM executions WHERE correlation_id = ? LIMIT 1",
        )
        .bind(correlation_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to load execution: {e}")))?;

        row.ok_or_else(|| VigilError::NotFound(format!("execution {correlation_id}")))?
            .try_into()
    }

    /// List executions with filters and pagination, newest first.
    pub async fn list(
        &self,
        filter: &ExecutionFilter,
        page: usize,
        per_page: usize,
    ) -> VigilResult<(Vec<ExecutionHistory>, usize)> {
        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM executions");
        push_execution_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to count executions: {e}")))?;

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM executions");
        push_execution_filter(&mut query, filter);
        query.push(" ORDER BY executed_at DESC LIMIT ");
        query.push_bind(per_page as i64);
        query.push(" OFFSET ");
        query.push_bind((page.saturating_sub(1) * per_page) as i64);

        let rows = query
            .build_query_as::<ExecutionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to list executions: {e}")))?;

        let histories = rows
            .into_iter()
            .map(ExecutionHistory::try_from)
            .collect::<VigilResult<Vec<_>>>()?;
        Ok((histories, total as usize))
    }

    /// Append a triggered alert to an execution's append-only list.
    pub async fn append_alert(
        &self,
        correlation_id: Uuid,
        alert: &AlertTriggered,
    ) -> VigilResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VigilError::Database(format!("Failed to open transaction: {e}")))?;

        let raw: Option<String> = sqlx::query_scalar(
            "SELECT alerts_triggered FROM executions WHERE correlation_id = ?",
        )
        .bind(correlation_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to load execution: {e}")))?;

        let raw =
            raw.ok_or_else(|| VigilError::NotFound(format!("execution {correlation_id}")))?;
        let mut alerts: Vec<AlertTriggered> = serde_json::from_str(&raw)?;
        alerts.push(alert.clone());

        sqlx::query("UPDATE executions SET alerts_triggered = ? WHERE correlation_id = ?")
            .bind(serde_json::to_string(&alerts)?)
            .bind(correlation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to append alert: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| VigilError::Database(format!("Failed to commit: {e}")))?;
        Ok(())
    }
}

fn push_execution_filter(query: &mut QueryBuilder<Sqlite>, filter: &ExecutionFilter) {
    let mut has_where = false;
    let sep = |query: &mut QueryBuilder<Sqlite>, has_where: &mut bool| {
        query.push(if *has_where { " AND " } else { " WHERE " });
        *has_where = true;
    };

    if let Some(config_id) = filter.config_id {
        sep(query, &mut has_where);
        query.push("config_id = ");
        query.push_bind(config_id.to_string());
    }
    if let Some(status) = filter.status {
        sep(query, &mut has_where);
        query.push("status = ");
        query.push_bind(status.as_str());
    }
    if let Some(from) = filter.from {
        sep(query, &mut has_where);
        query.push("executed_at >= ");
        query.push_bind(fmt_ts(from));
    }
    if let Some(to) = filter.to {
        sep(query, &mut has_where);
        query.push("executed_at <= ");
        query.push_bind(fmt_ts(to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_pool;
    use crate::types::execution::{ExecutionRequest, ExecutionResponse};

    fn sample(config_id: Uuid, status: ExecutionStatus) -> ExecutionHistory {
        ExecutionHistory {
            id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            config_id,
            config_name: "orders-api".into(),
            executed_at: Utc::now(),
            duration_ms: 120,
            request: ExecutionRequest {
                url: "https://api.example.com/status".into(),
                method: "GET".into(),
                headers: Default::default(),
                body: None,
            },
            response: ExecutionResponse {
                status_code: Some(200),
                headers: Default::default(),
                body: r#"{"status":"ok"}"#.into(),
                error: None,
            },
            rules_evaluation: vec![],
            alerts_triggered: vec![],
            status,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_round_trip() {
        let store = ExecutionStore::new(test_pool().await);
        let history = sample(Uuid::new_v4(), ExecutionStatus::Success);
        store.create(&history).await.unwrap();

        let loaded = store
            .get_by_correlation_id(history.correlation_id)
            .await
            .unwrap();
        assert_eq!(loaded.config_name, "orders-api");
        assert_eq!(loaded.status, ExecutionStatus::Success);
        assert_eq!(loaded.response.status_code, Some(200));
    }

    #[tokio::test]
    async fn correlation_id_is_unique() {
        let store = ExecutionStore::new(test_pool().await);
        let history = sample(Uuid::new_v4(), ExecutionStatus::Success);
        store.create(&history).await.unwrap();

        let mut duplicate = sample(Uuid::new_v4(), ExecutionStatus::Failed);
        duplicate.correlation_id = history.correlation_id;
        let err = store.create(&duplicate).await.unwrap_err();
        assert!(matches!(err, VigilError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_execution_is_not_found() {
        let store = ExecutionStore::new(test_pool().await);
        assert!(matches!(
            store.get_by_correlation_id(Uuid::new_v4()).await.unwrap_err(),
            VigilError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_filters_by_config_status_and_window() {
        let store = ExecutionStore::new(test_pool().await);
        let config_a = Uuid::new_v4();
        let config_b = Uuid::new_v4();

        store
            .create(&sample(config_a, ExecutionStatus::Success))
            .await
            .unwrap();
        store
            .create(&sample(config_a, ExecutionStatus::Failed))
            .await
            .unwrap();
        store
            .create(&sample(config_b, ExecutionStatus::Success))
            .await
            .unwrap();

        let (by_config, total) = store
            .list(
                &ExecutionFilter {
                    config_id: Some(config_a),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(by_config.iter().all(|h| h.config_id == config_a));

        let (failed, failed_total) = store
            .list(
                &ExecutionFilter {
                    status: Some(ExecutionStatus::Failed),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(failed_total, 1);
        assert_eq!(failed[0].status, ExecutionStatus::Failed);

        let (windowed, windowed_total) = store
            .list(
                &ExecutionFilter {
                    from: Some(Utc::now() - chrono::Duration::minutes(5)),
                    to: Some(Utc::now() + chrono::Duration::minutes(5)),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(windowed_total, 3);
        assert_eq!(windowed.len(), 3);

        let (stale, stale_total) = store
            .list(
                &ExecutionFilter {
                    to: Some(Utc::now() - chrono::Duration::hours(1)),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(stale_total, 0);
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn append_alert_grows_the_list() {
        let store = ExecutionStore::new(test_pool().await);
        let history = sample(Uuid::new_v4(), ExecutionStatus::Success);
        store.create(&history).await.unwrap();

        let alert = AlertTriggered {
            alert_id: Uuid::new_v4(),
            triggered_by_rule: "error-rate".into(),
            webhook_url: "https://hooks.example.com".into(),
        };
        store
            .append_alert(history.correlation_id, &alert)
            .await
            .unwrap();

        let loaded = store
            .get_by_correlation_id(history.correlation_id)
            .await
            .unwrap();
        assert_eq!(loaded.alerts_triggered.len(), 1);
        assert_eq!(loaded.alerts_triggered[0].alert_id, alert.alert_id);

        assert!(matches!(
            store.append_alert(Uuid::new_v4(), &alert).await.unwrap_err(),
            VigilError::NotFound(_)
        ));
    }
}
