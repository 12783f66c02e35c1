//! Local SQLite mirror of relayed signals

use super::{SignalSink, SinkKind};
use crate::error::Result;
use crate::types::{CompletionRecord, Signal};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// `signal_latest` holds a single overwritten row, `signal_history` grows unbounded
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Connect to SQLite database (creates if not exists)
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let sink = Self { pool };
        sink.run_migrations().await?;
        Ok(sink)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_latest (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                signal_id INTEGER NOT NULL,
                data TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                processing_time REAL,
                result TEXT,
                completed_at TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_history (
                row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                signal_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                data TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                processing_time REAL,
                result TEXT,
                completed_at TEXT,
                received_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_signal_history_signal
            ON signal_history(signal_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Signal currently in the latest slot, with completion state applied
    pub async fn latest(&self) -> Result<Option<Signal>> {
        let row = sqlx::query_as::<_, SignalRow>(
            r#"
            SELECT data, processed, processing_time, result, completed_at
            FROM signal_latest
            WHERE slot = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(Signal::try_from).transpose()
    }

    /// Stored history, newest first
    pub async fn history(&self, limit: i64) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, SignalRow>(
            r#"
            SELECT data, processed, processing_time, result, completed_at
            FROM signal_history
            ORDER BY row_id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Signal::try_from).collect()
    }

    pub async fn history_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signal_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl SignalSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Database
    }

    async fn deliver(&self, signal: &Signal) -> Result<()> {
        let data = serde_json::to_string(signal)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO signal_latest
                (slot, signal_id, data, processed, processing_time, result, completed_at, updated_at)
            VALUES (1, ?, ?, 0, NULL, NULL, NULL, ?)
            "#,
        )
        .bind(signal.id as i64)
        .bind(&data)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO signal_history (signal_id, symbol, action, data, received_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(signal.id as i64)
        .bind(&signal.symbol)
        .bind(signal.action.as_str())
        .bind(&data)
        .bind(signal.received_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    fn tracks_completion(&self) -> bool {
        true
    }

    async fn record_completion(&self, record: &CompletionRecord) -> Result<()> {
        let completed_at = record.completed_at.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for table in ["signal_latest", "signal_history"] {
            let sql = format!(
                "UPDATE {} SET processed = 1, processing_time = ?, result = ?, completed_at = ? \
                 WHERE signal_id = ?",
                table
            );
            sqlx::query(&sql)
                .bind(record.processing_time)
                .bind(&record.result)
                .bind(&completed_at)
                .bind(record.signal_id as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SignalRow {
    data: String,
    processed: i64,
    processing_time: Option<f64>,
    result: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<SignalRow> for Signal {
    type Error = crate::error::RelayError;

    fn try_from(row: SignalRow) -> std::result::Result<Self, Self::Error> {
        let mut signal: Signal = serde_json::from_str(&row.data)?;
        if row.processed != 0 {
            signal.processed = true;
            signal.processing_time = row.processing_time;
            signal.result = row.result;
            signal.completed_at = row
                .completed_at
                .and_then(|t| chrono::DateTime::parse_from_rfc3339(&t).ok())
                .map(|t| t.with_timezone(&chrono::Utc));
        }
        Ok(signal)
    }
}
