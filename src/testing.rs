//! Shared fixtures for unit tests: seeded rows and instrumented sinks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::db::queries::{self, NotificationRow, PostRow, UserRow};
use crate::db::{timestamp_now, Database};
use crate::notify::{NotificationEvent, NotificationSink, SinkError};

pub fn seed_user(db: &Database, username: &str) -> UserRow {
    let row = UserRow {
        id: Uuid::now_v7().to_string(),
        name: format!("{username} test"),
        username: username.to_string(),
        profile_image_url: None,
        joined_at: timestamp_now(),
        posts_count: 0,
        following_count: 0,
        followers_count: 0,
    };
    queries::insert_user(db, &row).expect("insert user");
    row
}

pub fn seed_post(db: &Database, author_id: &str, title: &str, views: i64) -> PostRow {
    let row = PostRow {
        id: Uuid::now_v7().to_string(),
        user_id: author_id.to_string(),
        title: title.to_string(),
        content: format!("{title} body"),
        featured_image_url: None,
        created_at: timestamp_now(),
        views_count: views,
        comments_count: 0,
    };
    queries::insert_post(db, &row).expect("insert post");
    row
}

pub fn set_user_counters(db: &Database, user_id: &str, followers: i64, posts: i64) {
    db.conn()
        .execute(
            "UPDATE users SET followers_count = ?1, posts_count = ?2 WHERE id = ?3",
            rusqlite::params![followers, posts, user_id],
        )
        .expect("update counters");
}

fn stored(event: &NotificationEvent) -> NotificationRow {
    NotificationRow {
        id: event.id().to_string(),
        kind: event.kind().as_str().to_string(),
        user_id: event.recipient_id().to_string(),
        sender_id: event.sender_id().map(str::to_string),
        post_id: event.post_id().map(str::to_string),
        is_read: event.is_read(),
        created_at: timestamp_now(),
    }
}

/// Records every event, optionally taking `delay` per persist.
pub struct RecordingSink {
    delay: Duration,
    started: AtomicUsize,
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            started: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Number of events a worker has handed over so far, finished or not.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn create_notification(
        &self,
        event: &NotificationEvent,
    ) -> Result<NotificationRow, SinkError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(event.clone());
        Ok(stored(event))
    }
}

/// Parks every persist until the test releases a permit. Each event id is
/// reported on the returned channel as soon as a worker picks it up.
pub struct GatedSink {
    gate: Semaphore,
    received: mpsc::UnboundedSender<String>,
}

impl GatedSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            gate: Semaphore::new(0),
            received: tx,
        });
        (sink, rx)
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }
}

#[async_trait]
impl NotificationSink for GatedSink {
    async fn create_notification(
        &self,
        event: &NotificationEvent,
    ) -> Result<NotificationRow, SinkError> {
        let _ = self.received.send(event.id().to_string());
        self.gate
            .acquire()
            .await
            .map_err(|e| SinkError::Other(e.to_string()))?
            .forget();
        Ok(stored(event))
    }
}

/// Fails on demand: every event for one recipient, or the first N attempts
/// of each event.
pub struct FlakySink {
    rejected_recipient: Option<String>,
    fail_first: u32,
    attempts: Mutex<HashMap<String, u32>>,
    delivered: Mutex<Vec<NotificationEvent>>,
}

impl FlakySink {
    pub fn rejecting_recipient(recipient: &str) -> Arc<Self> {
        Arc::new(Self {
            rejected_recipient: Some(recipient.to_string()),
            fail_first: 0,
            attempts: Mutex::new(HashMap::new()),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_first_attempts(n: u32) -> Arc<Self> {
        Arc::new(Self {
            rejected_recipient: None,
            fail_first: n,
            attempts: Mutex::new(HashMap::new()),
            delivered: Mutex::new(Vec::new()),
        })
    }

    /// Total persist attempts across all events.
    pub fn attempts(&self) -> u32 {
        self.attempts
            .lock()
            .expect("sink mutex poisoned")
            .values()
            .sum()
    }

    pub fn delivered(&self) -> Vec<NotificationEvent> {
        self.delivered.lock().expect("sink mutex poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for FlakySink {
    async fn create_notification(
        &self,
        event: &NotificationEvent,
    ) -> Result<NotificationRow, SinkError> {
        let attempt = {
            let mut attempts = self.attempts.lock().expect("sink mutex poisoned");
            let count = attempts.entry(event.id().to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if self.rejected_recipient.as_deref() == Some(event.recipient_id()) {
            return Err(SinkError::Other(format!(
                "recipient {} rejected",
                event.recipient_id()
            )));
        }
        if attempt <= self.fail_first {
            return Err(SinkError::Other(format!("transient failure #{attempt}")));
        }

        self.delivered
            .lock()
            .expect("sink mutex poisoned")
            .push(event.clone());
        Ok(stored(event))
    }
}
