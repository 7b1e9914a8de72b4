pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    envelope::EventEnvelope, heartbeat::HeartbeatRecord, notification::Notification,
};

#[derive(Error, Debug)]
pub enum StoreError {
    /// The notification does not exist for the given recipient. Covers both
    /// a missing id and an id owned by another recipient, so existence is
    /// never leaked across tenants.
    #[error("notification not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One-based page request. `size` is clamped by the API layer.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u64,
    pub size: u64,
}

impl Page {
    pub fn new(page: u64, size: u64) -> Self {
        Self {
            page: page.max(1),
            size,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.size
    }
}

/// Durable notification storage. The `insert_if_absent` contract is the
/// subsystem's sole de-duplication mechanism: the implementation must decide
/// new-vs-duplicate atomically at the storage layer, never by a
/// read-then-write in the caller.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist the envelope unless a notification with its `event_id` already
    /// exists. Returns the (existing or new) row and whether it was created
    /// by this call.
    async fn insert_if_absent(
        &self,
        envelope: &EventEnvelope,
        received_at: DateTime<Utc>,
    ) -> StoreResult<(Notification, bool)>;

    /// Notifications for a recipient, most recent first (`created_at` DESC,
    /// ties broken by `id` DESC).
    async fn find_by_recipient(
        &self,
        recipient_id: &str,
        page: Page,
    ) -> StoreResult<Vec<Notification>>;

    async fn find_unread_by_recipient(
        &self,
        recipient_id: &str,
        page: Page,
    ) -> StoreResult<Vec<Notification>>;

    async fn count_by_recipient(&self, recipient_id: &str) -> StoreResult<u64>;

    async fn count_unread(&self, recipient_id: &str) -> StoreResult<u64>;

    /// Mark one notification read. Fails with `NotFound` unless the id exists
    /// AND belongs to `recipient_id`. Idempotent: a second call never
    /// overwrites `read_at`.
    async fn mark_read(
        &self,
        id: i64,
        recipient_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification>;

    /// Mark every unread notification for the recipient read. Returns the
    /// number of rows affected.
    async fn mark_all_read(&self, recipient_id: &str, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Delete read notifications persisted before `cutoff`. Unread rows are
    /// never swept. Returns the number of rows deleted.
    async fn sweep_old_read(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Per-worker liveness ledger, deliberately separate from the notification
/// store: a worker failing on every message still leaves evidence here.
#[async_trait]
pub trait HeartbeatRegistry: Send + Sync {
    /// Upsert the named record: `message_count += 1`, `last_processed_at`
    /// advances to `at` (never backward).
    async fn record_success(&self, worker: &str, at: DateTime<Utc>) -> StoreResult<()>;

    /// Upsert the named record: `error_count += 1`, `last_error_message`
    /// overwritten. `last_processed_at` is untouched; a failure is not
    /// "processed".
    async fn record_failure(
        &self,
        worker: &str,
        at: DateTime<Utc>,
        error_message: &str,
    ) -> StoreResult<()>;

    async fn get(&self, worker: &str) -> StoreResult<Option<HeartbeatRecord>>;
}
