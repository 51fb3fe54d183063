//! Alert log storage.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::common::error::{VigilError, VigilResult};
use crate::db::{fmt_ts, parse_opt_ts, parse_ts};
use crate::types::alert::{AckStatus, AlertAttempt, AlertLog, FinalStatus};

/// Filter for alert listings.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    /// Restrict to one check.
    pub config_id: Option<Uuid>,
    /// Restrict to one delivery status.
    pub final_status: Option<FinalStatus>,
    /// Restrict to one acknowledgment state.
    pub ack_status: Option<AckStatus>,
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: String,
    correlation_id: String,
    config_id: Option<String>,
    webhook_url: String,
    payload_text: String,
    attempts: String,
    final_status: String,
    ack_status: String,
    acknowledged_by: Option<String>,
    acknowledged_at: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<AlertRow> for AlertLog {
    type Error = VigilError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(AlertLog {
            id: row
                .id
                .parse()
                .map_err(|e| VigilError::Database(format!("invalid alert id: {e}")))?,
            correlation_id: row
                .correlation_id
                .parse()
                .map_err(|e| VigilError::Database(format!("invalid correlation id: {e}")))?,
            config_id: row
                .config_id
                .map(|raw| {
                    raw.parse()
                        .map_err(|e| VigilError::Database(format!("invalid config id: {e}")))
                })
                .transpose()?,
            webhook_url: row.webhook_url,
            payload_text: row.payload_text,
            attempts: serde_json::from_str(&row.attempts)?,
            final_status: row
                .final_status
                .parse()
                .map_err(|_| VigilError::Database(format!("invalid status '{}'", row.final_status)))?,
            ack_status: row
                .ack_status
                .parse()
                .map_err(|_| VigilError::Database(format!("invalid ack status '{}'", row.ack_status)))?,
            acknowledged_by: row.acknowledged_by,
            acknowledged_at: parse_opt_ts(row.acknowledged_at.as_deref())?,
            created_at: parse_ts(&row.created_at)?,
            completed_at: parse_opt_ts(row.completed_at.as_deref())?,
        })
    }
}

/// Alert log storage over the shared pool.
#[derive(Clone)]
pub struct AlertStore {
    pool: SqlitePool,
}

impl AlertStore {
    /// Create a store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist an alert log.
    pub async fn create(&self, log: &AlertLog) -> VigilResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_logs (
                id, correlation_id, config_id, webhook_url, payload_text,
                attempts, final_status, ack_status, acknowledged_by,
                acknowledged_at, created_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.correlation_id.to_string())
        .bind(log.config_id.map(|id| id.to_string()))
        .bind(&log.webhook_url)
        .bind(&log.payload_text)
        .bind(serde_json::to_string(&log.attempts)?)
        .bind(log.final_status.as_str())
        .bind(log.ack_status.as_str())
        .bind(&log.acknowledged_by)
        .bind(log.acknowledged_at.map(fmt_ts))
        .bind(fmt_ts(log.created_at))
        .bind(log.completed_at.map(fmt_ts))
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to save alert log: {e}")))?;
        Ok(())
    }

    /// Fetch an alert log by id.
    pub async fn get(&self, id: Uuid) -> VigilResult<AlertLog> {
        let row = sqlx::query_as::<_, AlertRow>("SELECT * FROM alert_logs WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to load alert log: {e}")))?;

        row.ok_or_else(|| VigilError::NotFound(format!("alert {id}")))?
            .try_into()
    }

    /// List alert logs with filters and pagination, newest first.
    pub async fn list(
        &self,
        filter: &AlertFilter,
        page: usize,
        per_page: usize,
    ) -> VigilResult<(Vec<AlertLog>, usize)> {
        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM alert_logs");
        push_alert_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to count alert logs: {e}")))?;

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM alert_logs");
        push_alert_filter(&mut query, filter);
        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(per_page as i64);
        query.push(" OFFSET ");
        query.push_bind((page.saturating_sub(1) * per_page) as i64);

        let rows = query
            .build_query_as::<AlertRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to list alert logs: {e}")))?;

        let logs = rows
            .into_iter()
            .map(AlertLog::try_from)
            .collect::<VigilResult<Vec<_>>>()?;
        Ok((logs, total as usize))
    }

    /// Append a delivery attempt to a persisted log.
    pub async fn append_attempt(&self, id: Uuid, attempt: &AlertAttempt) -> VigilResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VigilError::Database(format!("Failed to open transaction: {e}")))?;

        let raw: Option<String> =
            sqlx::query_scalar("SELECT attempts FROM alert_logs WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| VigilError::Database(format!("Failed to load alert log: {e}")))?;

        let raw = raw.ok_or_else(|| VigilError::NotFound(format!("alert {id}")))?;
        let mut attempts: Vec<AlertAttempt> = serde_json::from_str(&raw)?;
        attempts.push(attempt.clone());

        sqlx::query("UPDATE alert_logs SET attempts = ? WHERE id = ?")
            .bind(serde_json::to_string(&attempts)?)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| VigilError::Database(format!("Failed to append attempt: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| VigilError::Database(format!("Failed to commit: {e}")))?;
        Ok(())
    }

    /// Update the delivery status (and completion time) of a log.
    pub async fn update_status(
        &self,
        id: Uuid,
        final_status: FinalStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> VigilResult<()> {
        let result =
            sqlx::query("UPDATE alert_logs SET final_status = ?, completed_at = ? WHERE id = ?")
                .bind(final_status.as_str())
                .bind(completed_at.map(fmt_ts))
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| VigilError::Database(format!("Failed to update status: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(VigilError::NotFound(format!("alert {id}")));
        }
        Ok(())
    }

    /// Mark an alert acknowledged.
    pub async fn acknowledge(
        &self,
        id: Uuid,
        by: &str,
        at: DateTime<Utc>,
    ) -> VigilResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE alert_logs
            SET ack_status = ?, acknowledged_by = ?, acknowledged_at = ?
            WHERE id = ?
            "#,
        )
        .bind(AckStatus::Acknowledged.as_str())
        .bind(by)
        .bind(fmt_ts(at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::Database(format!("Failed to acknowledge alert: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(VigilError::NotFound(format!("alert {id}")));
        }
        Ok(())
    }
}

fn push_alert_filter(query: &mut QueryBuilder<Sqlite>, filter: &AlertFilter) {
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
    if let Some(final_status) = filter.final_status {
        sep(query, &mut has_where);
        query.push("final_status = ");
        query.push_bind(final_status.as_str());
    }
    if let Some(ack_status) = filter.ack_status {
        sep(query, &mut has_where);
        query.push("ack_status = ");
        query.push_bind(ack_status.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_pool;

    fn sample(config_id: Option<Uuid>) -> AlertLog {
        let mut log = AlertLog::new(
            Uuid::new_v4(),
            "https://hooks.example.com/alerts".into(),
            "🚨 Alert: orders-api".into(),
        );
        log.config_id = config_id;
        log.final_status = FinalStatus::Failed;
        log
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let store = AlertStore::new(test_pool().await);
        let config_id = Uuid::new_v4();
        let log = sample(Some(config_id));
        store.create(&log).await.unwrap();

        let loaded = store.get(log.id).await.unwrap();
        assert_eq!(loaded.config_id, Some(config_id));
        assert_eq!(loaded.final_status, FinalStatus::Failed);
        assert_eq!(loaded.ack_status, AckStatus::Open);
        assert!(loaded.attempts.is_empty());
    }

    #[tokio::test]
    async fn missing_alert_is_not_found() {
        let store = AlertStore::new(test_pool().await);
        assert!(matches!(
            store.get(Uuid::new_v4()).await.unwrap_err(),
            VigilError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn append_attempt_is_append_only() {
        let store = AlertStore::new(test_pool().await);
        let log = sample(None);
        store.create(&log).await.unwrap();

        for attempt_number in 1..=2 {
            store
                .append_attempt(
                    log.id,
                    &AlertAttempt {
                        attempt_number,
                        timestamp: Utc::now(),
                        status_code: Some(500),
                        response_body: None,
                        error: Some("Webhook returned status 500".into()),
                        duration_ms: 10,
                    },
                )
                .await
                .unwrap();
        }

        let loaded = store.get(log.id).await.unwrap();
        assert_eq!(loaded.attempts.len(), 2);
        assert_eq!(loaded.attempts[0].attempt_number, 1);
        assert_eq!(loaded.attempts[1].attempt_number, 2);
    }

    #[tokio::test]
    async fn update_status_sets_completion() {
        let store = AlertStore::new(test_pool().await);
        let log = sample(None);
        store.create(&log).await.unwrap();

        let completed = Utc::now();
        store
            .update_status(log.id, FinalStatus::Delivered, Some(completed))
            .await
            .unwrap();

        let loaded = store.get(log.id).await.unwrap();
        assert_eq!(loaded.final_status, FinalStatus::Delivered);
        assert_eq!(
            loaded.completed_at.unwrap().timestamp_micros(),
            completed.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn acknowledge_records_who_and_when() {
        let store = AlertStore::new(test_pool().await);
        let log = sample(None);
        store.create(&log).await.unwrap();

        let at = Utc::now();
        store.acknowledge(log.id, "oncall@example.com", at).await.unwrap();

        let loaded = store.get(log.id).await.unwrap();
        assert_eq!(loaded.ack_status, AckStatus::Acknowledged);
        assert_eq!(loaded.acknowledged_by.as_deref(), Some("oncall@example.com"));
        assert!(loaded.acknowledged_at.is_some());

        assert!(matches!(
            store
                .acknowledge(Uuid::new_v4(), "nobody", Utc::now())
                .await
                .unwrap_err(),
            VigilError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_filters_by_config_status_and_ack() {
        let store = AlertStore::new(test_pool().await);
        let config_a = Uuid::new_v4();

        let mut delivered = sample(Some(config_a));
        delivered.final_status = FinalStatus::Delivered;
        store.create(&delivered).await.unwrap();

        let failed = sample(Some(config_a));
        store.create(&failed).await.unwrap();

        let other = sample(Some(Uuid::new_v4()));
        store.create(&other).await.unwrap();

        store
            .acknowledge(failed.id, "oncall@example.com", Utc::now())
            .await
            .unwrap();

        let (by_config, total) = store
            .list(
                &AlertFilter {
                    config_id: Some(config_a),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(by_config.iter().all(|l| l.config_id == Some(config_a)));

        let (delivered_only, _) = store
            .list(
                &AlertFilter {
                    final_status: Some(FinalStatus::Delivered),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(delivered_only.len(), 1);
        assert_eq!(delivered_only[0].id, delivered.id);

        let (open_only, open_total) = store
            .list(
                &AlertFilter {
                    ack_status: Some(AckStatus::Open),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(open_total, 2);
        assert!(open_only.iter().all(|l| l.ack_status == AckStatus::Open));
    }
}
