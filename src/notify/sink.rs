use std::sync::Arc;

use async_trait::async_trait;

use crate::db::queries::{self, NewNotification, NotificationRow};
use crate::db::{timestamp_now, Database, DbError};

use super::event::NotificationEvent;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("notification store error: {0}")]
    Db(#[from] DbError),
    #[error("notification store task failed: {0}")]
    Join(String),
    #[error("{0}")]
    Other(String),
}

impl SinkError {
    /// Failures that will not succeed on retry (constraint violations, missing rows).
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Db(DbError::NotFound(_)) | Self::Db(DbError::Conflict(_)) => true,
            Self::Db(err) => err.is_constraint_violation(),
            Self::Join(_) | Self::Other(_) => false,
        }
    }
}

/// Where workers persist notification events.
///
/// Idempotency is the sink's concern: a worker may hand the same event over
/// more than once when a retrying delivery policy is configured.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create_notification(
        &self,
        event: &NotificationEvent,
    ) -> Result<NotificationRow, SinkError>;
}

/// Sink backed by the `notifications` table.
pub struct SqliteNotificationSink {
    db: Arc<Database>,
}

impl SqliteNotificationSink {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationSink {
    async fn create_notification(
        &self,
        event: &NotificationEvent,
    ) -> Result<NotificationRow, SinkError> {
        let db = self.db.clone();
        let row = NewNotification {
            id: event.id().to_string(),
            kind_id: event.kind().id(),
            user_id: event.recipient_id().to_string(),
            sender_id: event.sender_id().map(str::to_string),
            post_id: event.post_id().map(str::to_string),
            is_read: event.is_read(),
        };

        let handle = tokio::task::spawn_blocking(move || {
            queries::insert_notification(&db, &row, &timestamp_now())
        });

        let stored = handle
            .await
            .map_err(|error| SinkError::Join(error.to_string()))??;
        Ok(stored)
    }
}
