use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, mpsc::error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clients::mail::{MailSender, OutboundMail};
use crate::config::Config;

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub queue_depth: usize,
    pub worker_count: usize,
    pub send_timeout: Duration,
}

impl DeliveryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_depth: config.delivery_queue_depth,
            worker_count: config.delivery_worker_count.max(1),
            send_timeout: Duration::from_secs(config.delivery_timeout_seconds),
        }
    }
}

/// Outbound side-effect counters. Delivery failures are tracked here and
/// never on the consumer heartbeat: a failed send must not look like a
/// failed pipeline.
#[derive(Default)]
pub struct DeliveryCounters {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryCounters {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Cheap handle for enqueueing outbound mail onto the delivery pool.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<OutboundMail>,
    counters: Arc<DeliveryCounters>,
}

impl DeliveryHandle {
    /// Non-blocking enqueue. Work past the queue depth is dropped and
    /// counted rather than allowed to back up into the consumer path.
    pub fn dispatch(&self, mail: OutboundMail) {
        match self.tx.try_send(mail) {
            Ok(()) => {}
            Err(TrySendError::Full(mail)) => {
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(
                    event_id = %mail.event_id,
                    "Delivery queue full, dropping outbound mail"
                );
            }
            Err(TrySendError::Closed(mail)) => {
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(
                    event_id = %mail.event_id,
                    "Delivery pool stopped, dropping outbound mail"
                );
            }
        }
    }

    pub fn counters(&self) -> Arc<DeliveryCounters> {
        Arc::clone(&self.counters)
    }
}

/// Spawn the bounded delivery pool: a queue of `queue_depth` pending sends,
/// at most `worker_count` in flight, each wrapped in `send_timeout`.
/// Dropping every `DeliveryHandle` drains the queue and ends the task.
pub fn spawn_delivery_pool(
    mailer: Arc<dyn MailSender>,
    config: DeliveryConfig,
) -> (DeliveryHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<OutboundMail>(config.queue_depth);
    let counters = Arc::new(DeliveryCounters::default());

    let handle = DeliveryHandle {
        tx,
        counters: Arc::clone(&counters),
    };

    let semaphore = Arc::new(Semaphore::new(config.worker_count));
    let send_timeout = config.send_timeout;

    let dispatcher = tokio::spawn(async move {
        info!(
            queue_depth = config.queue_depth,
            worker_count = config.worker_count,
            "Delivery pool started"
        );

        while let Some(mail) = rx.recv().await {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            let mailer = Arc::clone(&mailer);
            let counters = Arc::clone(&counters);

            tokio::spawn(async move {
                match tokio::time::timeout(send_timeout, mailer.send(&mail)).await {
                    Ok(Ok(())) => {
                        counters.sent.fetch_add(1, Ordering::SeqCst);
                        debug!(event_id = %mail.event_id, "Outbound mail delivered");
                    }
                    Ok(Err(e)) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        warn!(
                            event_id = %mail.event_id,
                            error = %e,
                            "Outbound mail delivery failed"
                        );
                    }
                    Err(_) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        warn!(
                            event_id = %mail.event_id,
                            timeout_secs = send_timeout.as_secs(),
                            "Outbound mail delivery timed out"
                        );
                    }
                }

                drop(permit);
            });
        }

        info!("Delivery pool stopped");
    });

    (handle, dispatcher)
}
