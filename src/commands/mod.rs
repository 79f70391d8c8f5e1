//! Request handlers.
//!
//! Each command takes the shared [`AppState`] plus already-authenticated
//! caller ids and returns a row or a [`Page`](crate::pagination::Page).
//! Commands that trigger notifications enqueue them after their write
//! succeeds; a closed queue never fails the command.

pub mod bookmarks;
pub mod notifications;
pub mod posts;
pub mod users;


use uuid::Uuid;

use crate::notify::NotificationEvent;
use crate::{AppError, AppState};

/// Ids are stored lowercase and hyphenated; any other spelling is rejected.
pub(crate) fn require_id(field: &str, value: &str) -> Result<(), AppError> {
    match Uuid::parse_str(value) {
        Ok(id) if id.hyphenated().to_string() == value => Ok(()),
        _ => Err(AppError::InvalidInput(format!("{field} is not a valid id"))),
    }
}

/// Required text without leading or trailing whitespace.
pub(crate) fn require_text(field: &str, value: &str, max_len: usize) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{field} is required")));
    }
    if value.trim() != value {
        return Err(AppError::InvalidInput(format!(
            "{field} must not start or end with whitespace"
        )));
    }
    if value.chars().count() > max_len {
        return Err(AppError::InvalidInput(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(())
}

/// Blank optional text becomes `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Hand events to the dispatcher. Failures are logged, never returned.
pub(crate) async fn notify(state: &AppState, events: Vec<NotificationEvent>) {
    if events.is_empty() {
        return;
    }
    let total = events.len();
    let kind = events[0].kind();

    match state.dispatcher.enqueue_all(events).await {
        Ok(report) if report.dropped > 0 => {
            tracing::warn!(
                %kind,
                total,
                accepted = report.accepted,
                dropped = report.dropped,
                "notification fan-out partially dropped"
            );
        }
        Ok(report) => {
            tracing::debug!(%kind, accepted = report.accepted, "notifications queued");
        }
        Err(error) => {
            tracing::warn!(%kind, total, %error, "notifications not enqueued");
        }
    }
}
