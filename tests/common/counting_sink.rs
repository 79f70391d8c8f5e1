use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blogwire_lib::db::queries::NotificationRow;
use blogwire_lib::notify::{NotificationEvent, NotificationSink, SinkError};

/// Sink that only counts, optionally sleeping per event.
pub struct CountingSink {
    delay: Duration,
    calls: AtomicUsize,
}

impl CountingSink {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for CountingSink {
    async fn create_notification(
        &self,
        event: &NotificationEvent,
    ) -> Result<NotificationRow, SinkError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(NotificationRow {
            id: event.id().to_string(),
            kind: event.kind().to_string(),
            user_id: event.recipient_id().to_string(),
            sender_id: event.sender_id().map(str::to_string),
            post_id: event.post_id().map(str::to_string),
            is_read: event.is_read(),
            created_at: String::new(),
        })
    }
}
