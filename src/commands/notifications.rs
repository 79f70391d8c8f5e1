use serde::Serialize;

use crate::commands::require_id;
use crate::commands::users::get_user;
use crate::db::queries::{self, NotificationRow};
use crate::pagination::resources::NotificationsCursor;
use crate::pagination::{assemble, Filter, Page, PageRequest};
use crate::{AppError, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCounts {
    pub total: i64,
    pub unread: i64,
}

/// A user's notifications, newest first.
pub fn list_notifications(
    state: &AppState,
    user_id: &str,
    page: PageRequest,
) -> Result<Page<NotificationRow>, AppError> {
    get_user(state, user_id)?;
    let filters = vec![Filter::equals("n.user_id", user_id)];
    let spec = page.to_query::<NotificationsCursor>(filters, &state.config.pagination)?;
    let rows = queries::list_notifications(&state.db, &spec)?;
    Ok(assemble(rows, spec.page_limit, |row| NotificationsCursor::from(row))?)
}

pub fn unread_notifications_count(
    state: &AppState,
    user_id: &str,
) -> Result<NotificationCounts, AppError> {
    get_user(state, user_id)?;
    Ok(NotificationCounts {
        total: queries::count_notifications(&state.db, user_id)?,
        unread: queries::count_unread_notifications(&state.db, user_id)?,
    })
}

pub fn mark_notification_read(
    state: &AppState,
    user_id: &str,
    notification_id: &str,
) -> Result<(), AppError> {
    require_id("notification id", notification_id)?;
    if !queries::mark_notification_read(&state.db, user_id, notification_id)? {
        return Err(AppError::NotFound(format!(
            "notification not found: {notification_id}"
        )));
    }
    Ok(())
}
