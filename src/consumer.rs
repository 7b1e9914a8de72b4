use std::sync::Arc;

use anyhow::{Error, Result};
use chrono::Utc;
use futures_util::StreamExt;
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

use crate::{
    clients::{mail::OutboundMail, rbmq::RabbitMqClient},
    delivery::DeliveryHandle,
    models::{
        envelope::{DlqMessage, EventEnvelope},
        notification::Notification,
    },
    store::{HeartbeatRegistry, NotificationStore, StoreError},
};

#[derive(Debug)]
pub enum ProcessOutcome {
    /// First delivery of this `event_id`: a notification was persisted and a
    /// delivery side effect (if any) dispatched.
    Persisted(Notification),
    /// Redelivery of an already-processed `event_id`: nothing was written and
    /// no side effect was triggered.
    Duplicate(Notification),
}

#[derive(Debug, ThisError)]
pub enum ConsumeError {
    /// The payload can never be parsed; requeueing it would loop forever.
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The store was unreachable or failed; the envelope stays un-acked so
    /// the transport redelivers it.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-envelope processing state machine. `event_id` is the sole correctness
/// anchor: the idempotent insert decides duplicate-vs-new atomically, and
/// side effects fire only on the new path.
pub struct EnvelopeProcessor {
    store: Arc<dyn NotificationStore>,
    heartbeats: Arc<dyn HeartbeatRegistry>,
    delivery: DeliveryHandle,
    worker_name: String,
}

impl EnvelopeProcessor {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        heartbeats: Arc<dyn HeartbeatRegistry>,
        delivery: DeliveryHandle,
        worker_name: String,
    ) -> Self {
        Self {
            store,
            heartbeats,
            delivery,
            worker_name,
        }
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    pub async fn process_payload(&self, payload: &[u8]) -> Result<ProcessOutcome, ConsumeError> {
        let envelope: EventEnvelope = serde_json::from_slice(payload)?;
        self.process_envelope(envelope).await
    }

    pub async fn process_envelope(
        &self,
        envelope: EventEnvelope,
    ) -> Result<ProcessOutcome, ConsumeError> {
        let now = Utc::now();

        info!(
            event_id = %envelope.event_id,
            event_type = envelope.event_type.as_str(),
            recipient_id = %envelope.recipient_id,
            "Processing event envelope"
        );

        match self.store.insert_if_absent(&envelope, now).await {
            Ok((notification, true)) => {
                match OutboundMail::from_notification(&notification) {
                    Some(mail) => self.delivery.dispatch(mail),
                    None => debug!(
                        event_id = %notification.event_id,
                        "No recipient email on envelope, skipping outbound mail"
                    ),
                }

                self.record_success(now).await;
                Ok(ProcessOutcome::Persisted(notification))
            }
            Ok((notification, false)) => {
                info!(
                    event_id = %notification.event_id,
                    "Event already processed, skipping side effects"
                );

                self.record_success(now).await;
                Ok(ProcessOutcome::Duplicate(notification))
            }
            Err(e) => {
                warn!(
                    event_id = %envelope.event_id,
                    error = %e,
                    "Failed to persist notification"
                );

                if let Err(beat_err) = self
                    .heartbeats
                    .record_failure(&self.worker_name, now, &e.to_string())
                    .await
                {
                    warn!(error = %beat_err, "Failed to record heartbeat failure");
                }

                Err(e.into())
            }
        }
    }

    /// Heartbeat-write failures are logged, never allowed to mask the
    /// processing outcome: the notification is already durable.
    async fn record_success(&self, at: chrono::DateTime<Utc>) {
        if let Err(e) = self.heartbeats.record_success(&self.worker_name, at).await {
            warn!(error = %e, "Failed to record heartbeat success");
        }
    }
}

/// Drive the broker consumer stream. Acks are deferred until the envelope is
/// durable or confirmed duplicate; store failures leave the message un-acked
/// for transport-level redelivery, and unparseable payloads are parked on the
/// DLQ instead of looping.
pub async fn run_consumer_loop(
    rbmq: Arc<RabbitMqClient>,
    processor: EnvelopeProcessor,
) -> Result<(), Error> {
    let mut consumer = rbmq.create_consumer(processor.worker_name()).await?;

    info!(worker = processor.worker_name(), "Event consumer started");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(error = %e, "Broker delivery error");
                continue;
            }
        };

        match processor.process_payload(&delivery.data).await {
            Ok(_) => {
                rbmq.acknowledge(delivery.delivery_tag).await?;
            }
            Err(ConsumeError::Malformed(e)) => {
                warn!(error = %e, "Parking malformed payload on DLQ");

                let dlq_message = DlqMessage::new(
                    String::from_utf8_lossy(&delivery.data).into_owned(),
                    e.to_string(),
                    Utc::now(),
                );

                if let Err(publish_err) = rbmq.publish_to_dlq(&dlq_message).await {
                    warn!(error = %publish_err, "Failed to publish to DLQ");
                }

                rbmq.reject(delivery.delivery_tag, false).await?;
            }
            Err(ConsumeError::Store(e)) => {
                warn!(error = %e, "Leaving event un-acked for redelivery");
                rbmq.reject(delivery.delivery_tag, true).await?;
            }
        }
    }

    info!(worker = processor.worker_name(), "Event consumer stopped");

    Ok(())
}
