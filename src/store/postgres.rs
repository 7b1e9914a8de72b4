use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::models::{
    envelope::{EventEnvelope, EventType, Metadata, Priority},
    heartbeat::HeartbeatRecord,
    notification::Notification,
};
use crate::store::{HeartbeatRegistry, NotificationStore, Page, StoreError, StoreResult};

const NOTIFICATION_COLUMNS: &str = "id, event_id, event_type, recipient_id, recipient_email, \
     title, subject, message, category, metadata, priority, event_timestamp, is_read, \
     created_at, read_at";

/// Postgres-backed notification store. The UNIQUE constraint on `event_id`
/// makes `insert_if_absent` atomic under concurrent consumers: exactly one
/// insert wins, every other caller observes the existing row.
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn notification_from_row(row: &PgRow) -> StoreResult<Notification> {
    let event_type_raw: String = row.try_get("event_type")?;
    let event_type = EventType::parse(&event_type_raw)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown event type: {}", event_type_raw)))?;

    let priority_raw: String = row.try_get("priority")?;
    let priority = Priority::parse(&priority_raw)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown priority: {}", priority_raw)))?;

    let metadata_raw: serde_json::Value = row.try_get("metadata")?;
    let metadata: Metadata = serde_json::from_value(metadata_raw)
        .map_err(|e| StoreError::Corrupt(format!("undecodable metadata: {}", e)))?;

    Ok(Notification {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        event_type,
        recipient_id: row.try_get("recipient_id")?,
        recipient_email: row.try_get("recipient_email")?,
        title: row.try_get("title")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        category: row.try_get("category")?,
        metadata,
        priority,
        event_timestamp: row.try_get("event_timestamp")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
        read_at: row.try_get("read_at")?,
    })
}

fn metadata_to_json(metadata: &Metadata) -> StoreResult<serde_json::Value> {
    serde_json::to_value(metadata)
        .map_err(|e| StoreError::Corrupt(format!("unencodable metadata: {}", e)))
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert_if_absent(
        &self,
        envelope: &EventEnvelope,
        received_at: DateTime<Utc>,
    ) -> StoreResult<(Notification, bool)> {
        let insert_sql = format!(
            "INSERT INTO notifications (event_id, event_type, recipient_id, recipient_email, \
             title, subject, message, category, metadata, priority, event_timestamp, is_read, \
             created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE, $12) \
             ON CONFLICT (event_id) DO NOTHING \
             RETURNING {NOTIFICATION_COLUMNS}"
        );

        let inserted = sqlx::query(&insert_sql)
            .bind(&envelope.event_id)
            .bind(envelope.event_type.as_str())
            .bind(&envelope.recipient_id)
            .bind(&envelope.recipient_email)
            .bind(&envelope.title)
            .bind(&envelope.subject)
            .bind(&envelope.message)
            .bind(&envelope.category)
            .bind(metadata_to_json(&envelope.metadata)?)
            .bind(envelope.priority.as_str())
            .bind(envelope.timestamp)
            .bind(received_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Ok((notification_from_row(&row)?, true));
        }

        // Conflict path: the row already exists (possibly committed by a
        // concurrent consumer moments ago).
        let existing_sql =
            format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE event_id = $1");
        let row = sqlx::query(&existing_sql)
            .bind(&envelope.event_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((notification_from_row(&row)?, false))
    }

    async fn find_by_recipient(
        &self,
        recipient_id: &str,
        page: Page,
    ) -> StoreResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE recipient_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );

        let rows = sqlx::query(&sql)
            .bind(recipient_id)
            .bind(page.size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn find_unread_by_recipient(
        &self,
        recipient_id: &str,
        page: Page,
    ) -> StoreResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE recipient_id = $1 AND is_read = FALSE \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );

        let rows = sqlx::query(&sql)
            .bind(recipient_id)
            .bind(page.size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn count_by_recipient(&self, recipient_id: &str) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1")
                .bind(recipient_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }

    async fn count_unread(&self, recipient_id: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn mark_read(
        &self,
        id: i64,
        recipient_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        let sql = format!(
            "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, $3) \
             WHERE id = $1 AND recipient_id = $2 \
             RETURNING {NOTIFICATION_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(recipient_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        notification_from_row(&row)
    }

    async fn mark_all_read(&self, recipient_id: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, $2) \
             WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn sweep_old_read(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE is_read = TRUE AND created_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

/// Postgres-backed heartbeat registry. Counter arithmetic happens inside the
/// upsert so concurrent increments cannot lose updates, and `GREATEST` keeps
/// `last_processed_at` from ever moving backward.
pub struct PgHeartbeatRegistry {
    pool: PgPool,
}

impl PgHeartbeatRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HeartbeatRegistry for PgHeartbeatRegistry {
    async fn record_success(&self, worker: &str, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO worker_heartbeats (name, last_processed_at, message_count, error_count) \
             VALUES ($1, $2, 1, 0) \
             ON CONFLICT (name) DO UPDATE \
             SET message_count = worker_heartbeats.message_count + 1, \
                 last_processed_at = GREATEST(worker_heartbeats.last_processed_at, \
                                              EXCLUDED.last_processed_at)",
        )
        .bind(worker)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(
        &self,
        worker: &str,
        at: DateTime<Utc>,
        error_message: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO worker_heartbeats \
             (name, message_count, error_count, last_error_message, last_error_at) \
             VALUES ($1, 0, 1, $2, $3) \
             ON CONFLICT (name) DO UPDATE \
             SET error_count = worker_heartbeats.error_count + 1, \
                 last_error_message = EXCLUDED.last_error_message, \
                 last_error_at = EXCLUDED.last_error_at",
        )
        .bind(worker)
        .bind(error_message)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, worker: &str) -> StoreResult<Option<HeartbeatRecord>> {
        let row = sqlx::query(
            "SELECT name, last_processed_at, message_count, error_count, \
             last_error_message, last_error_at \
             FROM worker_heartbeats WHERE name = $1",
        )
        .bind(worker)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let message_count: i64 = row.try_get("message_count")?;
        let error_count: i64 = row.try_get("error_count")?;

        Ok(Some(HeartbeatRecord {
            name: row.try_get("name")?,
            last_processed_at: row.try_get("last_processed_at")?,
            message_count: message_count as u64,
            error_count: error_count as u64,
            last_error_message: row.try_get("last_error_message")?,
            last_error_at: row.try_get("last_error_at")?,
        }))
    }
}
