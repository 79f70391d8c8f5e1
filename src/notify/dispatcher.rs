use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::{DispatchConfig, SaturationPolicy};

use super::event::NotificationEvent;
use super::sink::NotificationSink;

/// Lifecycle of a [`NotificationDispatcher`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("notification dispatcher is not running (state: {0})")]
    NotRunning(DispatcherState),
    #[error("notification queue is closed")]
    QueueClosed,
    #[error("notification dispatcher already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// The queue was full under [`SaturationPolicy::DropNewest`].
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    pub accepted: usize,
    pub dropped: usize,
}

/// Snapshot of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub enqueued: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// How a worker treats a failed persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl From<&DispatchConfig> for DeliveryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_delivery_attempts.max(1),
            retry_backoff: config.retry_backoff(),
        }
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<NotificationEvent>>>;

/// Owns the bounded notification queue and the worker pool draining it.
///
/// Producers call [`enqueue`](Self::enqueue) from request handlers. Intake is
/// closed by [`shutdown`](Self::shutdown), which then waits until every event
/// already accepted has been handed to the sink.
pub struct NotificationDispatcher {
    config: DispatchConfig,
    sink: Arc<dyn NotificationSink>,
    state: Mutex<DispatcherState>,
    intake: RwLock<Option<mpsc::Sender<NotificationEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl NotificationDispatcher {
    pub fn new(config: DispatchConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            config,
            sink,
            state: Mutex::new(DispatcherState::Created),
            intake: RwLock::new(None),
            workers: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.lock().expect("dispatcher state mutex poisoned")
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Allocate the queue and spawn the workers. Must run inside a tokio runtime.
    pub fn start(&self) -> Result<(), DispatchError> {
        let mut state = self.state.lock().expect("dispatcher state mutex poisoned");
        if *state != DispatcherState::Created {
            return Err(DispatchError::AlreadyStarted);
        }

        let capacity = self.config.queue_capacity.max(1);
        let worker_count = self.config.worker_count.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let policy = DeliveryPolicy::from(&self.config);

        let handles: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    receiver.clone(),
                    self.sink.clone(),
                    policy,
                    self.counters.clone(),
                ))
            })
            .collect();

        *self.workers.lock().expect("dispatcher workers mutex poisoned") = handles;
        *self.intake.write().expect("dispatcher intake lock poisoned") = Some(tx);
        *state = DispatcherState::Running;

        tracing::info!(
            capacity,
            workers = worker_count,
            policy = %self.config.saturation_policy,
            max_attempts = policy.max_attempts,
            "notification dispatcher started"
        );
        Ok(())
    }

    fn sender(&self) -> Result<mpsc::Sender<NotificationEvent>, DispatchError> {
        let tx = self
            .intake
            .read()
            .expect("dispatcher intake lock poisoned")
            .clone();
        match tx {
            Some(tx) => Ok(tx),
            None => match self.state() {
                DispatcherState::Created => Err(DispatchError::NotRunning(DispatcherState::Created)),
                _ => Err(DispatchError::QueueClosed),
            },
        }
    }

    /// Queue one event.
    ///
    /// Under [`SaturationPolicy::Block`] a full queue suspends the caller until
    /// a worker frees a slot. Once shutdown has begun this fails immediately
    /// with [`DispatchError::QueueClosed`].
    pub async fn enqueue(&self, event: NotificationEvent) -> Result<EnqueueOutcome, DispatchError> {
        let tx = self.sender()?;
        self.push(&tx, event).await
    }

    /// Fan out a batch through a single intake handle.
    pub async fn enqueue_all<I>(&self, events: I) -> Result<FanoutReport, DispatchError>
    where
        I: IntoIterator<Item = NotificationEvent>,
    {
        let tx = self.sender()?;
        let mut report = FanoutReport::default();
        for event in events {
            match self.push(&tx, event).await? {
                EnqueueOutcome::Accepted => report.accepted += 1,
                EnqueueOutcome::Dropped => report.dropped += 1,
            }
        }
        Ok(report)
    }

    async fn push(
        &self,
        tx: &mpsc::Sender<NotificationEvent>,
        event: NotificationEvent,
    ) -> Result<EnqueueOutcome, DispatchError> {
        match self.config.saturation_policy {
            SaturationPolicy::Block => {
                tx.send(event).await.map_err(|_| DispatchError::QueueClosed)?;
            }
            SaturationPolicy::DropNewest => match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        event_id = event.id(),
                        recipient = event.recipient_id(),
                        kind = %event.kind(),
                        "notification queue full, dropping event"
                    );
                    return Ok(EnqueueOutcome::Dropped);
                }
                Err(TrySendError::Closed(_)) => return Err(DispatchError::QueueClosed),
            },
        }
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(EnqueueOutcome::Accepted)
    }

    /// Close intake and wait for the workers to drain the queue.
    ///
    /// Calling this on a dispatcher that is already draining or stopped
    /// returns the current counters without waiting.
    pub async fn shutdown(&self) -> DispatchStats {
        {
            let mut state = self.state.lock().expect("dispatcher state mutex poisoned");
            match *state {
                DispatcherState::Created => {
                    *state = DispatcherState::Stopped;
                    tracing::debug!("notification dispatcher stopped before start");
                    return self.stats();
                }
                DispatcherState::Draining | DispatcherState::Stopped => return self.stats(),
                DispatcherState::Running => *state = DispatcherState::Draining,
            }
        }

        // Dropping the last sender closes the channel once in-flight
        // producer clones are released; workers then see `None` after the
        // remaining events.
        self.intake
            .write()
            .expect("dispatcher intake lock poisoned")
            .take();
        tracing::info!("notification dispatcher draining");

        let handles =
            std::mem::take(&mut *self.workers.lock().expect("dispatcher workers mutex poisoned"));
        for (worker_id, result) in futures::future::join_all(handles).await.into_iter().enumerate() {
            if let Err(error) = result {
                tracing::error!(worker_id, %error, "notification worker terminated abnormally");
            }
        }

        *self.state.lock().expect("dispatcher state mutex poisoned") = DispatcherState::Stopped;
        let stats = self.stats();
        tracing::info!(
            enqueued = stats.enqueued,
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "notification dispatcher stopped"
        );
        stats
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: SharedReceiver,
    sink: Arc<dyn NotificationSink>,
    policy: DeliveryPolicy,
    counters: Arc<Counters>,
) {
    tracing::debug!(worker_id, "notification worker started");
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(event) = next else {
            break;
        };

        if deliver(worker_id, &event, sink.as_ref(), policy).await {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
    tracing::debug!(worker_id, "notification worker exiting");
}

async fn deliver(
    worker_id: usize,
    event: &NotificationEvent,
    sink: &dyn NotificationSink,
    policy: DeliveryPolicy,
) -> bool {
    let mut attempt = 1;
    loop {
        match sink.create_notification(event).await {
            Ok(_) => return true,
            Err(error) if attempt < policy.max_attempts && !error.is_permanent() => {
                tracing::warn!(
                    worker_id,
                    event_id = event.id(),
                    recipient = event.recipient_id(),
                    kind = %event.kind(),
                    attempt,
                    %error,
                    "notification persist failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(policy.retry_backoff).await;
            }
            Err(error) => {
                tracing::error!(
                    worker_id,
                    event_id = event.id(),
                    recipient = event.recipient_id(),
                    kind = %event.kind(),
                    attempt,
                    %error,
                    "notification persist failed, dropping event"
                );
                return false;
            }
        }
    }
}
