use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{
    envelope::EventEnvelope, heartbeat::HeartbeatRecord, notification::Notification,
};
use crate::store::{HeartbeatRegistry, NotificationStore, Page, StoreError, StoreResult};

/// In-memory notification store. The single write lock held across the
/// existence check and the insert gives the same atomicity the Postgres
/// unique constraint provides: concurrent writers racing on one `event_id`
/// see exactly one `was_new = true`.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    inner: RwLock<NotificationTable>,
}

#[derive(Default)]
struct NotificationTable {
    rows: Vec<Notification>,
    ids_by_event: HashMap<String, i64>,
    next_id: i64,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert_if_absent(
        &self,
        envelope: &EventEnvelope,
        received_at: DateTime<Utc>,
    ) -> StoreResult<(Notification, bool)> {
        let mut table = self.inner.write().await;

        if let Some(&existing_id) = table.ids_by_event.get(&envelope.event_id) {
            let existing = table
                .rows
                .iter()
                .find(|row| row.id == existing_id)
                .cloned()
                .ok_or_else(|| {
                    StoreError::Corrupt(format!("dangling event_id index for {}", envelope.event_id))
                })?;
            return Ok((existing, false));
        }

        table.next_id += 1;
        let notification = Notification::from_envelope(table.next_id, envelope, received_at);
        table
            .ids_by_event
            .insert(envelope.event_id.clone(), notification.id);
        table.rows.push(notification.clone());

        Ok((notification, true))
    }

    async fn find_by_recipient(
        &self,
        recipient_id: &str,
        page: Page,
    ) -> StoreResult<Vec<Notification>> {
        let table = self.inner.read().await;

        let mut rows: Vec<Notification> = table
            .rows
            .iter()
            .filter(|row| row.recipient_id == recipient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect())
    }

    async fn find_unread_by_recipient(
        &self,
        recipient_id: &str,
        page: Page,
    ) -> StoreResult<Vec<Notification>> {
        let table = self.inner.read().await;

        let mut rows: Vec<Notification> = table
            .rows
            .iter()
            .filter(|row| row.recipient_id == recipient_id && !row.is_read)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect())
    }

    async fn count_by_recipient(&self, recipient_id: &str) -> StoreResult<u64> {
        let table = self.inner.read().await;

        Ok(table
            .rows
            .iter()
            .filter(|row| row.recipient_id == recipient_id)
            .count() as u64)
    }

    async fn count_unread(&self, recipient_id: &str) -> StoreResult<u64> {
        let table = self.inner.read().await;

        Ok(table
            .rows
            .iter()
            .filter(|row| row.recipient_id == recipient_id && !row.is_read)
            .count() as u64)
    }

    async fn mark_read(
        &self,
        id: i64,
        recipient_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        let mut table = self.inner.write().await;

        let row = table
            .rows
            .iter_mut()
            .find(|row| row.id == id && row.recipient_id == recipient_id)
            .ok_or(StoreError::NotFound)?;

        if !row.is_read {
            row.is_read = true;
            row.read_at = Some(now);
        }

        Ok(row.clone())
    }

    async fn mark_all_read(&self, recipient_id: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.inner.write().await;
        let mut affected = 0;

        for row in table
            .rows
            .iter_mut()
            .filter(|row| row.recipient_id == recipient_id && !row.is_read)
        {
            row.is_read = true;
            row.read_at = Some(now);
            affected += 1;
        }

        Ok(affected)
    }

    async fn sweep_old_read(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.inner.write().await;

        let before = table.rows.len();
        let swept: Vec<String> = table
            .rows
            .iter()
            .filter(|row| row.is_read && row.created_at < cutoff)
            .map(|row| row.event_id.clone())
            .collect();

        table
            .rows
            .retain(|row| !(row.is_read && row.created_at < cutoff));
        for event_id in &swept {
            table.ids_by_event.remove(event_id);
        }

        Ok((before - table.rows.len()) as u64)
    }
}

/// In-memory heartbeat registry.
#[derive(Default)]
pub struct InMemoryHeartbeatRegistry {
    records: RwLock<HashMap<String, HeartbeatRecord>>,
}

impl InMemoryHeartbeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeartbeatRegistry for InMemoryHeartbeatRegistry {
    async fn record_success(&self, worker: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(worker.to_string())
            .or_insert_with(|| HeartbeatRecord::new(worker.to_string()));

        record.message_count += 1;
        record.last_processed_at = match record.last_processed_at {
            Some(existing) => Some(existing.max(at)),
            None => Some(at),
        };

        Ok(())
    }

    async fn record_failure(
        &self,
        worker: &str,
        at: DateTime<Utc>,
        error_message: &str,
    ) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(worker.to_string())
            .or_insert_with(|| HeartbeatRecord::new(worker.to_string()));

        record.error_count += 1;
        record.last_error_message = Some(error_message.to_string());
        record.last_error_at = Some(at);

        Ok(())
    }

    async fn get(&self, worker: &str) -> StoreResult<Option<HeartbeatRecord>> {
        let records = self.records.read().await;
        Ok(records.get(worker).cloned())
    }
}
