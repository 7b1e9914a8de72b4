use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use notification_service::{
    clients::mail::{MailSender, OutboundMail},
    clients::schedule::{InterviewSession, ScheduleProvider},
    config::Config,
    models::envelope::{EventEnvelope, EventType, Priority},
    models::notification::Notification,
    scheduler::EventPublisher,
    store::{NotificationStore, Page, StoreError, StoreResult},
};

pub fn envelope(event_id: &str, recipient_id: &str, event_type: EventType) -> EventEnvelope {
    EventEnvelope {
        event_id: event_id.to_string(),
        event_type,
        recipient_id: recipient_id.to_string(),
        recipient_email: None,
        title: "Test notification".to_string(),
        subject: None,
        message: "Test message body".to_string(),
        category: None,
        metadata: HashMap::new(),
        timestamp: Utc::now(),
        priority: Priority::default(),
    }
}

pub fn envelope_with_email(
    event_id: &str,
    recipient_id: &str,
    email: &str,
    event_type: EventType,
) -> EventEnvelope {
    let mut envelope = envelope(event_id, recipient_id, event_type);
    envelope.recipient_email = Some(email.to_string());
    envelope
}

pub fn session(session_id: &str, candidate_id: &str, scheduled_at: DateTime<Utc>) -> InterviewSession {
    InterviewSession {
        session_id: session_id.to_string(),
        candidate_id: candidate_id.to_string(),
        candidate_email: Some(format!("{}@example.com", candidate_id)),
        job_title: "Backend Engineer".to_string(),
        scheduled_at,
    }
}

/// Full config for tests that need a `Config` value (mail client, breaker).
/// Nothing here touches the network unless a test points a URL at a mock.
pub fn test_config(mail_gateway_url: &str) -> Config {
    Config {
        rabbitmq_url: "amqp://localhost:5672".to_string(),
        event_queue_name: "notification_events".to_string(),
        failed_queue_name: "notification_events_failed".to_string(),
        prefetch_count: 10,
        database_url: "postgres://localhost/notifications".to_string(),
        mail_gateway_url: mail_gateway_url.to_string(),
        mail_timeout_seconds: 5,
        search_index_url: "http://localhost:9200".to_string(),
        schedule_service_url: "http://localhost:8081".to_string(),
        schedule_timeout_seconds: 5,
        consumer_name: "notif-consumer".to_string(),
        staleness_threshold_seconds: 300,
        probe_timeout_seconds: 2,
        admin_token: "test-admin-token".to_string(),
        delivery_queue_depth: 16,
        delivery_worker_count: 2,
        delivery_timeout_seconds: 5,
        day_reminder_interval_seconds: 3600,
        soon_reminder_interval_seconds: 1800,
        retention_sweep_interval_seconds: 86400,
        read_retention_days: 30,
        circuit_breaker_failure_threshold: 2,
        circuit_breaker_timeout_seconds: 60,
        circuit_breaker_success_threshold: 1,
        max_retry_attempts: 2,
        initial_retry_delay_ms: 1,
        max_retry_delay_ms: 4,
        retry_backoff_multiplier: 2,
        server_port: 0,
    }
}

/// Poll until `condition` holds; panics after ~2s so a hung async path fails
/// loudly instead of deadlocking the test.
pub async fn wait_until<F>(condition: F, what: &str)
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[derive(Default)]
pub struct RecordingMailSender {
    pub sent: Mutex<Vec<OutboundMail>>,
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(&self, mail: &OutboundMail) -> Result<(), Error> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub struct FailingMailSender;

#[async_trait]
impl MailSender for FailingMailSender {
    async fn send(&self, _mail: &OutboundMail) -> Result<(), Error> {
        Err(anyhow!("550 mailbox unavailable"))
    }
}

/// Sender that never completes, for exercising queue overflow and timeouts.
pub struct StuckMailSender;

#[async_trait]
impl MailSender for StuckMailSender {
    async fn send(&self, _mail: &OutboundMail) -> Result<(), Error> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// Store double simulating an unreachable backend.
pub struct UnavailableStore;

#[async_trait]
impl NotificationStore for UnavailableStore {
    async fn insert_if_absent(
        &self,
        _envelope: &EventEnvelope,
        _received_at: DateTime<Utc>,
    ) -> StoreResult<(Notification, bool)> {
        Err(StoreError::Corrupt("connection refused".to_string()))
    }

    async fn find_by_recipient(
        &self,
        _recipient_id: &str,
        _page: Page,
    ) -> StoreResult<Vec<Notification>> {
        Err(StoreError::Corrupt("connection refused".to_string()))
    }

    async fn find_unread_by_recipient(
        &self,
        _recipient_id: &str,
        _page: Page,
    ) -> StoreResult<Vec<Notification>> {
        Err(StoreError::Corrupt("connection refused".to_string()))
    }

    async fn count_by_recipient(&self, _recipient_id: &str) -> StoreResult<u64> {
        Err(StoreError::Corrupt("connection refused".to_string()))
    }

    async fn count_unread(&self, _recipient_id: &str) -> StoreResult<u64> {
        Err(StoreError::Corrupt("connection refused".to_string()))
    }

    async fn mark_read(
        &self,
        _id: i64,
        _recipient_id: &str,
        _now: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        Err(StoreError::Corrupt("connection refused".to_string()))
    }

    async fn mark_all_read(&self, _recipient_id: &str, _now: DateTime<Utc>) -> StoreResult<u64> {
        Err(StoreError::Corrupt("connection refused".to_string()))
    }

    async fn sweep_old_read(&self, _cutoff: DateTime<Utc>) -> StoreResult<u64> {
        Err(StoreError::Corrupt("connection refused".to_string()))
    }
}

#[derive(Default)]
pub struct CollectingPublisher {
    pub envelopes: Mutex<Vec<EventEnvelope>>,
}

#[async_trait]
impl EventPublisher for CollectingPublisher {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), Error> {
        self.envelopes.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Publisher that rejects envelopes for one session id and accepts the rest.
pub struct SelectivePublisher {
    pub reject_event_id: String,
    pub envelopes: Mutex<Vec<EventEnvelope>>,
}

#[async_trait]
impl EventPublisher for SelectivePublisher {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), Error> {
        if envelope.event_id == self.reject_event_id {
            return Err(anyhow!("broker channel closed"));
        }
        self.envelopes.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Serves a fixed session list, filtered to the requested window.
pub struct StaticScheduleProvider {
    pub sessions: Vec<InterviewSession>,
}

#[async_trait]
impl ScheduleProvider for StaticScheduleProvider {
    async fn sessions_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<InterviewSession>, Error> {
        Ok(self
            .sessions
            .iter()
            .filter(|session| session.scheduled_at >= from && session.scheduled_at <= to)
            .cloned()
            .collect())
    }
}

/// Fails for the wide (day-before) window and serves the narrow one, so a
/// test can show one trigger failing without taking the other down.
pub struct FlakyScheduleProvider {
    pub sessions: Vec<InterviewSession>,
}

#[async_trait]
impl ScheduleProvider for FlakyScheduleProvider {
    async fn sessions_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<InterviewSession>, Error> {
        if to - from > chrono::Duration::hours(3) {
            return Err(anyhow!("schedule service timed out"));
        }

        Ok(self
            .sessions
            .iter()
            .filter(|session| session.scheduled_at >= from && session.scheduled_at <= to)
            .cloned()
            .collect())
    }
}
