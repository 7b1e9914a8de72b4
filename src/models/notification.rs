use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::envelope::{EventEnvelope, EventType, Metadata, Priority};

/// Durable notification row. Created exactly once per `event_id`; mutated
/// only by the read transition and deleted only by the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub event_id: String,
    pub event_type: EventType,
    pub recipient_id: String,
    pub recipient_email: Option<String>,
    pub title: String,
    pub subject: Option<String>,
    pub message: String,
    pub category: Option<String>,
    pub metadata: Metadata,
    pub priority: Priority,

    /// Producer-assigned event creation time, as carried on the envelope.
    pub event_timestamp: DateTime<Utc>,

    pub is_read: bool,

    /// Persistence time, assigned by the store at insert.
    pub created_at: DateTime<Utc>,

    /// Set once, on the first read transition.
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn from_envelope(id: i64, envelope: &EventEnvelope, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            event_id: envelope.event_id.clone(),
            event_type: envelope.event_type,
            recipient_id: envelope.recipient_id.clone(),
            recipient_email: envelope.recipient_email.clone(),
            title: envelope.title.clone(),
            subject: envelope.subject.clone(),
            message: envelope.message.clone(),
            category: envelope.category.clone(),
            metadata: envelope.metadata.clone(),
            priority: envelope.priority,
            event_timestamp: envelope.timestamp,
            is_read: false,
            created_at,
            read_at: None,
        }
    }
}
