//! SQLite Alert Sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatcher::{AlertSink, SinkError};
use rule_model::{AlertRequest, AlertSeverity, RuleId};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::SinkSetupError;

const CREATE_ALERTS: &str = r#"
CREATE TABLE IF NOT EXISTS alerts (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_id        INTEGER NOT NULL,
    title          TEXT    NOT NULL,
    message        TEXT    NOT NULL,
    severity       TEXT    NOT NULL,
    observed_value REAL    NOT NULL,
    fired_at       TEXT    NOT NULL,
    is_read        INTEGER NOT NULL DEFAULT 0
)"#;

/// Alert row as stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredAlert {
    pub id: i64,
    pub rule_id: RuleId,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub observed_value: f64,
    pub fired_at: DateTime<Utc>,
    pub is_read: bool,
}

impl StoredAlert {
    fn from_row(row: &SqliteRow) -> Result<Self, SinkSetupError> {
        let decode = |column: &str, reason: String| {
            SinkSetupError::Database(sqlx::Error::ColumnDecode {
                index: column.to_string(),
                source: reason.into(),
            })
        };

        let severity: String = row.try_get("severity")?;
        let fired_at: String = row.try_get("fired_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            rule_id: RuleId(row.try_get::<i64, _>("rule_id")? as u64),
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            severity: severity
                .parse()
                .map_err(|e: rule_model::UnknownSeverity| decode("severity", e.to_string()))?,
            observed_value: row.try_get("observed_value")?,
            fired_at: DateTime::parse_from_rfc3339(&fired_at)
                .map_err(|e| decode("fired_at", e.to_string()))?
                .with_timezone(&Utc),
            is_read: row.try_get("is_read")?,
        })
    }
}

/// Persists alerts for the dashboard
#[derive(Clone)]
pub struct SqliteAlertSink {
    pool: SqlitePool,
}

impl SqliteAlertSink {
    /// Open (creating if needed) the database at `url` and prepare the schema
    pub async fn connect(url: &str) -> Result<Self, SinkSetupError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // every connection to an in-memory database is a separate database
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        info!("Opened alert database {}", url);
        Self::with_pool(pool).await
    }

    /// Use an existing pool
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, SinkSetupError> {
        sqlx::query(CREATE_ALERTS).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Store one alert, returning its row id
    pub async fn insert(&self, alert: &AlertRequest) -> Result<i64, SinkSetupError> {
        let result = sqlx::query(
            r#"INSERT INTO alerts (rule_id, title, message, severity, observed_value, fired_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )
        .bind(alert.rule_id.0 as i64)
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(alert.severity.as_str())
        .bind(alert.observed_value)
        .bind(alert.fired_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Stored alert {} for {}", id, alert.rule_id);
        Ok(id)
    }

    /// Alerts not yet acknowledged
    pub async fn unread_count(&self) -> Result<i64, SinkSetupError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM alerts WHERE is_read = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Most recent alerts first
    pub async fn recent(&self, limit: u32) -> Result<Vec<StoredAlert>, SinkSetupError> {
        let rows = sqlx::query(
            r#"SELECT id, rule_id, title, message, severity, observed_value, fired_at, is_read
               FROM alerts ORDER BY id DESC LIMIT ?1"#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(StoredAlert::from_row).collect()
    }

    /// Acknowledge an alert
    pub async fn mark_read(&self, id: i64) -> Result<bool, SinkSetupError> {
        let result = sqlx::query("UPDATE alerts SET is_read = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AlertSink for SqliteAlertSink {
    fn name(&self) -> &'static str {
        "sqlite-alerts"
    }

    async fn create_alert(&self, alert: &AlertRequest) -> Result<(), SinkError> {
        self.insert(alert)
            .await
            .map(|_| ())
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }
}
