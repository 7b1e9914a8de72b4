use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain event variants produced by the upstream recruitment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    JobPostingApproved,
    JobPostingRejected,
    ApplicationReceived,
    ApplicationStatusChanged,
    ProfileVerificationRequest,
    ProfileUpdateRequest,
    ProfileUpdateApproved,
    ProfileUpdateRejected,
    AccountApproved,
    AccountRejected,
    SystemNotification,
    #[serde(rename = "INTERVIEW_REMINDER_24H")]
    InterviewReminder24h,
    #[serde(rename = "INTERVIEW_REMINDER_2H")]
    InterviewReminder2h,
    TestEvent,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::JobPostingApproved => "JOB_POSTING_APPROVED",
            EventType::JobPostingRejected => "JOB_POSTING_REJECTED",
            EventType::ApplicationReceived => "APPLICATION_RECEIVED",
            EventType::ApplicationStatusChanged => "APPLICATION_STATUS_CHANGED",
            EventType::ProfileVerificationRequest => "PROFILE_VERIFICATION_REQUEST",
            EventType::ProfileUpdateRequest => "PROFILE_UPDATE_REQUEST",
            EventType::ProfileUpdateApproved => "PROFILE_UPDATE_APPROVED",
            EventType::ProfileUpdateRejected => "PROFILE_UPDATE_REJECTED",
            EventType::AccountApproved => "ACCOUNT_APPROVED",
            EventType::AccountRejected => "ACCOUNT_REJECTED",
            EventType::SystemNotification => "SYSTEM_NOTIFICATION",
            EventType::InterviewReminder24h => "INTERVIEW_REMINDER_24H",
            EventType::InterviewReminder2h => "INTERVIEW_REMINDER_2H",
            EventType::TestEvent => "TEST_EVENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "JOB_POSTING_APPROVED" => Some(EventType::JobPostingApproved),
            "JOB_POSTING_REJECTED" => Some(EventType::JobPostingRejected),
            "APPLICATION_RECEIVED" => Some(EventType::ApplicationReceived),
            "APPLICATION_STATUS_CHANGED" => Some(EventType::ApplicationStatusChanged),
            "PROFILE_VERIFICATION_REQUEST" => Some(EventType::ProfileVerificationRequest),
            "PROFILE_UPDATE_REQUEST" => Some(EventType::ProfileUpdateRequest),
            "PROFILE_UPDATE_APPROVED" => Some(EventType::ProfileUpdateApproved),
            "PROFILE_UPDATE_REJECTED" => Some(EventType::ProfileUpdateRejected),
            "ACCOUNT_APPROVED" => Some(EventType::AccountApproved),
            "ACCOUNT_REJECTED" => Some(EventType::AccountRejected),
            "SYSTEM_NOTIFICATION" => Some(EventType::SystemNotification),
            "INTERVIEW_REMINDER_24H" => Some(EventType::InterviewReminder24h),
            "INTERVIEW_REMINDER_2H" => Some(EventType::InterviewReminder2h),
            "TEST_EVENT" => Some(EventType::TestEvent),
            _ => None,
        }
    }
}

/// Delivery priority tier. Lower level = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    pub fn level(&self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HIGH" => Some(Priority::High),
            "MEDIUM" => Some(Priority::Medium),
            "LOW" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Metadata values are restricted to scalar kinds and nested maps so the
/// stored representation stays deterministic across producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Map(HashMap<String, MetadataValue>),
}

pub type Metadata = HashMap<String, MetadataValue>;

/// The in-flight unit of notification work. `event_id` is the caller-supplied
/// idempotency key; redelivery with the same id must not produce a second
/// persisted notification or a second outbound send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub event_type: EventType,
    pub recipient_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub metadata: Metadata,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub priority: Priority,
}

/// Poison messages that can never be parsed are parked here instead of being
/// requeued forever. `failure_id` gives operators a handle on each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqMessage {
    pub failure_id: Uuid,
    pub payload: String,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}

impl DlqMessage {
    pub fn new(payload: String, failure_reason: String, failed_at: DateTime<Utc>) -> Self {
        Self {
            failure_id: Uuid::new_v4(),
            payload,
            failure_reason,
            failed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_defaults_to_medium() {
        let json = r#"{
            "event_id": "ev-1",
            "event_type": "ACCOUNT_APPROVED",
            "recipient_id": "u1",
            "title": "Account approved",
            "message": "Welcome aboard",
            "timestamp": "2026-08-01T10:00:00Z"
        }"#;

        let envelope: EventEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.priority, Priority::Medium);
        assert_eq!(envelope.event_type, EventType::AccountApproved);
        assert!(envelope.metadata.is_empty());
        assert!(envelope.recipient_email.is_none());
    }

    #[test]
    fn test_metadata_value_kinds_roundtrip() {
        let json = r#"{
            "session_id": "s-42",
            "attempt": 3,
            "score": 87.5,
            "urgent": true,
            "nested": {"inner": "value"}
        }"#;

        let metadata: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.get("session_id"), Some(&MetadataValue::Text("s-42".into())));
        assert_eq!(metadata.get("attempt"), Some(&MetadataValue::Integer(3)));
        assert_eq!(metadata.get("score"), Some(&MetadataValue::Float(87.5)));
        assert_eq!(metadata.get("urgent"), Some(&MetadataValue::Bool(true)));
        assert!(matches!(metadata.get("nested"), Some(MetadataValue::Map(_))));
    }

    #[test]
    fn test_event_type_str_parse_pairs() {
        for event_type in [
            EventType::JobPostingApproved,
            EventType::ApplicationStatusChanged,
            EventType::InterviewReminder24h,
            EventType::InterviewReminder2h,
            EventType::TestEvent,
        ] {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::parse("NOT_A_TYPE"), None);
    }

    #[test]
    fn test_priority_levels_are_ordered() {
        assert_eq!(Priority::High.level(), 1);
        assert_eq!(Priority::Medium.level(), 2);
        assert_eq!(Priority::Low.level(), 3);
    }
}
