use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{Duration, Utc};

use notification_service::{
    clients::mail::MailSender,
    consumer::EnvelopeProcessor,
    delivery::{DeliveryConfig, spawn_delivery_pool},
    models::envelope::{EventType, MetadataValue, Priority},
    scheduler::{EventPublisher, ReminderKind, ReminderScheduler, SchedulerConfig},
    store::{
        HeartbeatRegistry, NotificationStore,
        memory::{InMemoryHeartbeatRegistry, InMemoryNotificationStore},
    },
};

use crate::support::{
    CollectingPublisher, FlakyScheduleProvider, RecordingMailSender, SelectivePublisher,
    StaticScheduleProvider, envelope, session,
};

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        day_reminder_interval: StdDuration::from_secs(3600),
        soon_reminder_interval: StdDuration::from_secs(1800),
        retention_sweep_interval: StdDuration::from_secs(86400),
        read_retention: Duration::days(30),
    }
}

/// Test: the reminder event id is a pure function of session and kind
#[tokio::test]
async fn test_reminder_event_id_is_deterministic() {
    let now = Utc::now();
    let interview = session("s-42", "u7", now + Duration::hours(20));

    let day = ReminderScheduler::reminder_envelope(&interview, ReminderKind::DayBefore, now);
    assert_eq!(day.event_id, "interview-reminder:s-42:24h");
    assert_eq!(day.event_type, EventType::InterviewReminder24h);
    assert_eq!(day.priority, Priority::Medium);
    assert_eq!(day.recipient_id, "u7");
    assert_eq!(
        day.metadata.get("session_id"),
        Some(&MetadataValue::Text("s-42".to_string()))
    );

    let soon = ReminderScheduler::reminder_envelope(&interview, ReminderKind::Upcoming, now);
    assert_eq!(soon.event_id, "interview-reminder:s-42:2h");
    assert_eq!(soon.event_type, EventType::InterviewReminder2h);
    assert_eq!(soon.priority, Priority::High);

    // Re-running the same tick later yields the same id.
    let later = ReminderScheduler::reminder_envelope(
        &interview,
        ReminderKind::DayBefore,
        now + Duration::minutes(30),
    );
    assert_eq!(later.event_id, day.event_id);
}

/// Test: each tick publishes only sessions inside its lead window
#[tokio::test]
async fn test_tick_respects_lead_window() -> Result<()> {
    let now = Utc::now();
    let provider = Arc::new(StaticScheduleProvider {
        sessions: vec![
            session("s-soon", "u1", now + Duration::hours(1)),
            session("s-today", "u2", now + Duration::hours(20)),
            session("s-next-week", "u3", now + Duration::days(6)),
        ],
    });
    let publisher = Arc::new(CollectingPublisher::default());
    let store = Arc::new(InMemoryNotificationStore::new());

    let scheduler = ReminderScheduler::new(
        provider,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        store as Arc<dyn NotificationStore>,
        scheduler_config(),
    );

    let published = scheduler
        .run_reminder_tick(ReminderKind::DayBefore, now)
        .await?;
    assert_eq!(published, 2);

    let published = scheduler
        .run_reminder_tick(ReminderKind::Upcoming, now)
        .await?;
    assert_eq!(published, 1);

    let envelopes = publisher.envelopes.lock().unwrap();
    let ids: Vec<&str> = envelopes.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "interview-reminder:s-soon:24h",
            "interview-reminder:s-today:24h",
            "interview-reminder:s-soon:2h",
        ]
    );

    Ok(())
}

/// Test: overlapping ticks collapse to one notification through the consumer
#[tokio::test]
async fn test_overlapping_ticks_are_absorbed_by_idempotency() -> Result<()> {
    let now = Utc::now();
    let provider = Arc::new(StaticScheduleProvider {
        sessions: vec![session("s-1", "u1", now + Duration::hours(3))],
    });
    let publisher = Arc::new(CollectingPublisher::default());
    let store = Arc::new(InMemoryNotificationStore::new());

    let scheduler = ReminderScheduler::new(
        provider,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        Arc::clone(&store) as Arc<dyn NotificationStore>,
        scheduler_config(),
    );

    // Adjacent hourly ticks both see the session.
    scheduler.run_reminder_tick(ReminderKind::DayBefore, now).await?;
    scheduler
        .run_reminder_tick(ReminderKind::DayBefore, now + Duration::hours(1))
        .await?;

    let envelopes: Vec<_> = publisher.envelopes.lock().unwrap().clone();
    assert_eq!(envelopes.len(), 2);
    assert_eq!(envelopes[0].event_id, envelopes[1].event_id);

    let heartbeats = Arc::new(InMemoryHeartbeatRegistry::new());
    let (delivery, _task) = spawn_delivery_pool(
        Arc::new(RecordingMailSender::default()) as Arc<dyn MailSender>,
        DeliveryConfig {
            queue_depth: 8,
            worker_count: 1,
            send_timeout: StdDuration::from_secs(5),
        },
    );
    let processor = EnvelopeProcessor::new(
        Arc::clone(&store) as Arc<dyn NotificationStore>,
        heartbeats as Arc<dyn HeartbeatRegistry>,
        delivery,
        "notif-consumer".to_string(),
    );

    for event in envelopes {
        processor.process_envelope(event).await?;
    }

    assert_eq!(store.count_by_recipient("u1").await?, 1);

    Ok(())
}

/// Test: a failing wide window leaves the narrow window's tick working
#[tokio::test]
async fn test_failing_window_does_not_break_the_other() -> Result<()> {
    let now = Utc::now();
    let provider = Arc::new(FlakyScheduleProvider {
        sessions: vec![session("s-1", "u1", now + Duration::hours(1))],
    });
    let publisher = Arc::new(CollectingPublisher::default());
    let store = Arc::new(InMemoryNotificationStore::new());

    let scheduler = ReminderScheduler::new(
        provider,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        store as Arc<dyn NotificationStore>,
        scheduler_config(),
    );

    let day_result = scheduler.run_reminder_tick(ReminderKind::DayBefore, now).await;
    assert!(day_result.is_err());

    let published = scheduler
        .run_reminder_tick(ReminderKind::Upcoming, now)
        .await?;
    assert_eq!(published, 1);

    Ok(())
}

/// Test: one session's publish failure does not stop the rest of the tick
#[tokio::test]
async fn test_publish_failure_skips_session_and_continues() -> Result<()> {
    let now = Utc::now();
    let provider = Arc::new(StaticScheduleProvider {
        sessions: vec![
            session("s-1", "u1", now + Duration::hours(1)),
            session("s-2", "u2", now + Duration::hours(2)),
            session("s-3", "u3", now + Duration::hours(3)),
        ],
    });
    let publisher = Arc::new(SelectivePublisher {
        reject_event_id: "interview-reminder:s-2:24h".to_string(),
        envelopes: Default::default(),
    });
    let store = Arc::new(InMemoryNotificationStore::new());

    let scheduler = ReminderScheduler::new(
        provider,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        store as Arc<dyn NotificationStore>,
        scheduler_config(),
    );

    let published = scheduler
        .run_reminder_tick(ReminderKind::DayBefore, now)
        .await?;
    assert_eq!(published, 2);
    assert_eq!(publisher.envelopes.lock().unwrap().len(), 2);

    Ok(())
}

/// Test: the retention tick sweeps old read notifications through the store
#[tokio::test]
async fn test_retention_tick_sweeps_old_read_rows() -> Result<()> {
    let now = Utc::now();
    let old = now - Duration::days(60);
    let store = Arc::new(InMemoryNotificationStore::new());

    let (stale, _) = store
        .insert_if_absent(&envelope("ev-old", "u1", EventType::SystemNotification), old)
        .await?;
    store.mark_read(stale.id, "u1", old).await?;
    store
        .insert_if_absent(&envelope("ev-new", "u1", EventType::SystemNotification), now)
        .await?;

    let scheduler = ReminderScheduler::new(
        Arc::new(StaticScheduleProvider { sessions: vec![] }),
        Arc::new(CollectingPublisher::default()) as Arc<dyn EventPublisher>,
        Arc::clone(&store) as Arc<dyn NotificationStore>,
        scheduler_config(),
    );

    let deleted = scheduler.run_retention_tick(now).await?;
    assert_eq!(deleted, 1);
    assert_eq!(store.count_by_recipient("u1").await?, 1);

    Ok(())
}
