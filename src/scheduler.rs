use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    clients::schedule::{InterviewSession, ScheduleProvider},
    config::Config,
    models::envelope::{EventEnvelope, EventType, MetadataValue, Priority},
    store::NotificationStore,
};

/// The two reminder windows. A session close enough to fall inside both gets
/// one reminder of each kind; duplicates of the same kind collapse on the
/// deterministic event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    DayBefore,
    Upcoming,
}

impl ReminderKind {
    pub fn key(&self) -> &'static str {
        match self {
            ReminderKind::DayBefore => "24h",
            ReminderKind::Upcoming => "2h",
        }
    }

    pub fn lead(&self) -> chrono::Duration {
        match self {
            ReminderKind::DayBefore => chrono::Duration::hours(24),
            ReminderKind::Upcoming => chrono::Duration::hours(2),
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            ReminderKind::DayBefore => EventType::InterviewReminder24h,
            ReminderKind::Upcoming => EventType::InterviewReminder2h,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            ReminderKind::DayBefore => Priority::Medium,
            ReminderKind::Upcoming => Priority::High,
        }
    }
}

/// Injection seam into the event transport; the scheduler publishes through
/// this rather than talking to the consumer directly.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), Error>;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub day_reminder_interval: Duration,
    pub soon_reminder_interval: Duration,
    pub retention_sweep_interval: Duration,
    pub read_retention: chrono::Duration,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            day_reminder_interval: Duration::from_secs(config.day_reminder_interval_seconds),
            soon_reminder_interval: Duration::from_secs(config.soon_reminder_interval_seconds),
            retention_sweep_interval: Duration::from_secs(config.retention_sweep_interval_seconds),
            read_retention: chrono::Duration::days(config.read_retention_days),
        }
    }
}

/// Time-driven producer: two independent reminder triggers plus the retention
/// sweep. Each tick is stateless between runs; "already sent" tracking lives
/// entirely in the consumer's idempotency check.
pub struct ReminderScheduler {
    schedule: Arc<dyn ScheduleProvider>,
    publisher: Arc<dyn EventPublisher>,
    store: Arc<dyn NotificationStore>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
}

impl ReminderScheduler {
    pub fn new(
        schedule: Arc<dyn ScheduleProvider>,
        publisher: Arc<dyn EventPublisher>,
        store: Arc<dyn NotificationStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            schedule,
            publisher,
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build the reminder envelope for one session. The event id is derived
    /// from `(session_id, kind)` so re-runs and overlapping ticks produce the
    /// same id and are absorbed downstream.
    pub fn reminder_envelope(
        session: &InterviewSession,
        kind: ReminderKind,
        now: DateTime<Utc>,
    ) -> EventEnvelope {
        let mut metadata = HashMap::new();
        metadata.insert(
            "session_id".to_string(),
            MetadataValue::Text(session.session_id.clone()),
        );
        metadata.insert(
            "scheduled_at".to_string(),
            MetadataValue::Text(
                session
                    .scheduled_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        );
        metadata.insert(
            "reminder_kind".to_string(),
            MetadataValue::Text(kind.key().to_string()),
        );

        EventEnvelope {
            event_id: format!("interview-reminder:{}:{}", session.session_id, kind.key()),
            event_type: kind.event_type(),
            recipient_id: session.candidate_id.clone(),
            recipient_email: session.candidate_email.clone(),
            title: "Interview reminder".to_string(),
            subject: Some(format!("Interview reminder: {}", session.job_title)),
            message: format!(
                "Your interview for \"{}\" is scheduled for {}.",
                session.job_title,
                session
                    .scheduled_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            category: Some("interview".to_string()),
            metadata,
            timestamp: now,
            priority: kind.priority(),
        }
    }

    /// One reminder tick: publish an envelope for every session starting
    /// within the kind's lead window. A failing session publish is logged and
    /// skipped; the rest of the tick proceeds.
    pub async fn run_reminder_tick(
        &self,
        kind: ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<usize, Error> {
        let window_end = now + kind.lead();
        let sessions = self
            .schedule
            .sessions_starting_between(now, window_end)
            .await?;

        let mut published = 0;
        for session in &sessions {
            let envelope = Self::reminder_envelope(session, kind, now);

            match self.publisher.publish(&envelope).await {
                Ok(()) => published += 1,
                Err(e) => warn!(
                    session_id = %session.session_id,
                    kind = kind.key(),
                    error = %e,
                    "Failed to publish reminder envelope"
                ),
            }
        }

        debug!(
            kind = kind.key(),
            eligible = sessions.len(),
            published,
            "Reminder tick completed"
        );

        Ok(published)
    }

    /// Delete read notifications older than the retention cutoff.
    pub async fn run_retention_tick(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let cutoff = now - self.config.read_retention;
        let deleted = self.store.sweep_old_read(cutoff).await?;

        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Swept old read notifications");
        }

        Ok(deleted)
    }

    /// Spawn the periodic tasks. Tick failures are caught and logged inside
    /// each loop; one window's failure never reaches the other trigger.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        self.running.store(true, Ordering::SeqCst);

        info!(
            day_interval_secs = self.config.day_reminder_interval.as_secs(),
            soon_interval_secs = self.config.soon_reminder_interval.as_secs(),
            sweep_interval_secs = self.config.retention_sweep_interval.as_secs(),
            "Reminder scheduler started"
        );

        vec![
            self.clone()
                .spawn_reminder_task(ReminderKind::DayBefore, self.config.day_reminder_interval),
            self.clone()
                .spawn_reminder_task(ReminderKind::Upcoming, self.config.soon_reminder_interval),
            self.clone().spawn_retention_task(),
        ]
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Reminder scheduler stopping");
    }

    fn spawn_reminder_task(self: Arc<Self>, kind: ReminderKind, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                if let Err(e) = self.run_reminder_tick(kind, Utc::now()).await {
                    error!(kind = kind.key(), error = %e, "Reminder tick failed");
                }
            }
        })
    }

    fn spawn_retention_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.retention_sweep_interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                if let Err(e) = self.run_retention_tick(Utc::now()).await {
                    error!(error = %e, "Retention sweep failed");
                }
            }
        })
    }
}
