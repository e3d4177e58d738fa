use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::log::{EventLog, LogPosition, LogRecord, partition_for};
use crate::{BusError, Result};

/// PostgreSQL-backed event log.
///
/// Appends to one partition are serialized with a transaction-scoped
/// advisory lock, so offsets inside a partition are gap-free and ordered.
#[derive(Clone)]
pub struct PostgresEventLog {
    pool: PgPool,
    partitions: u32,
}

impl PostgresEventLog {
    /// Creates a new PostgreSQL event log with `partitions` partitions per topic.
    pub fn new(pool: PgPool, partitions: u32) -> Self {
        Self {
            pool,
            partitions: partitions.max(1),
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the event log migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("../../migrations/event_log");
        // The log may share a database with a service schema.
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<LogRecord> {
        let partition: i32 = row.try_get("partition_no")?;
        let offset: i64 = row.try_get("log_offset")?;

        Ok(LogRecord {
            topic: row.try_get("topic")?,
            partition: partition as u32,
            offset: offset as u64,
            key: row.try_get("record_key")?,
            payload: row.try_get("payload")?,
            timestamp: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl EventLog for PostgresEventLog {
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<LogPosition> {
        let partition = partition_for(key, self.partitions);

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), $2)")
            .bind(topic)
            .bind(partition as i32)
            .execute(&mut *tx)
            .await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(log_offset) + 1, 0) FROM event_log WHERE topic = $1 AND partition_no = $2",
        )
        .bind(topic)
        .bind(partition as i32)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO event_log (topic, partition_no, log_offset, record_key, payload)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(topic)
        .bind(partition as i32)
        .bind(next)
        .bind(key)
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LogPosition {
            partition,
            offset: next as u64,
        })
    }

    async fn partitions(&self, _topic: &str) -> Result<u32> {
        Ok(self.partitions)
    }

    async fn read(
        &self,
        topic: &str,
        partition: u32,
        from_offset: u64,
        max_records: usize,
    ) -> Result<Vec<LogRecord>> {
        if partition >= self.partitions {
            return Err(BusError::InvalidPartition {
                topic: topic.to_string(),
                partition,
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT topic, partition_no, log_offset, record_key, payload, created_at
            FROM event_log
            WHERE topic = $1 AND partition_no = $2 AND log_offset >= $3
            ORDER BY log_offset ASC
            LIMIT $4
            "#,
        )
        .bind(topic)
        .bind(partition as i32)
        .bind(from_offset as i64)
        .bind(max_records as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<u64> {
        let offset: Option<i64> = sqlx::query_scalar(
            "SELECT next_offset FROM consumer_offsets WHERE group_name = $1 AND topic = $2 AND partition_no = $3",
        )
        .bind(group)
        .bind(topic)
        .bind(partition as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(offset.map(|o| o as u64).unwrap_or(0))
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        next_offset: u64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consumer_offsets (group_name, topic, partition_no, next_offset)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_name, topic, partition_no)
            DO UPDATE SET next_offset = EXCLUDED.next_offset, updated_at = NOW()
            "#,
        )
        .bind(group)
        .bind(topic)
        .bind(partition as i32)
        .bind(next_offset as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
