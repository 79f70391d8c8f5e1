use serde::Deserialize;
use uuid::Uuid;

use crate::commands::{notify, optional_text, require_id, require_text};
use crate::db::queries::{self, UserRow};
use crate::db::timestamp_now;
use crate::notify::NotificationEvent;
use crate::pagination::resources::{FollowersCursor, UsersCursor};
use crate::pagination::{assemble, Filter, Page, PageRequest};
use crate::{AppError, AppState};

const USERNAME_MAX_LEN: usize = 50;
const NAME_MAX_LEN: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUser {
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

fn validate_username(username: &str) -> Result<(), AppError> {
    require_text("username", username, USERNAME_MAX_LEN)?;
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::InvalidInput(
            "username may only contain letters, digits and underscores".to_string(),
        ));
    }
    Ok(())
}

pub fn register_user(state: &AppState, request: RegisterUser) -> Result<UserRow, AppError> {
    require_text("name", &request.name, NAME_MAX_LEN)?;
    validate_username(&request.username)?;

    let row = UserRow {
        id: Uuid::now_v7().to_string(),
        name: request.name,
        username: request.username,
        profile_image_url: optional_text(request.profile_image_url),
        joined_at: timestamp_now(),
        posts_count: 0,
        following_count: 0,
        followers_count: 0,
    };
    queries::insert_user(&state.db, &row)?;
    tracing::info!(user_id = %row.id, username = %row.username, "user registered");
    Ok(row)
}

pub fn get_user(state: &AppState, user_id: &str) -> Result<UserRow, AppError> {
    require_id("user id", user_id)?;
    queries::get_user(&state.db, user_id)?
        .ok_or_else(|| AppError::NotFound(format!("user not found: {user_id}")))
}

/// Users ranked by followers, then posts. `search` matches name or username.
pub fn list_users(
    state: &AppState,
    search: Option<String>,
    page: PageRequest,
) -> Result<Page<UserRow>, AppError> {
    let filters = search
        .map(|text| vec![Filter::search(&["u.name", "u.username"], text)])
        .unwrap_or_default();
    let spec = page.to_query::<UsersCursor>(filters, &state.config.pagination)?;
    let rows = queries::list_users(&state.db, &spec)?;
    Ok(assemble(rows, spec.page_limit, |row| UsersCursor::from(row))?)
}

/// `follower_id` follows `followed_id`; the followed user gets a `new_follower`
/// notification.
pub async fn follow_user(
    state: &AppState,
    follower_id: &str,
    followed_id: &str,
) -> Result<(), AppError> {
    require_id("follower id", follower_id)?;
    require_id("followed id", followed_id)?;
    if follower_id == followed_id {
        return Err(AppError::Forbidden("users cannot follow themselves".to_string()));
    }
    get_user(state, follower_id)?;
    get_user(state, followed_id)?;

    queries::insert_follow(&state.db, follower_id, followed_id, &timestamp_now())?;
    tracing::debug!(follower_id, followed_id, "follow created");

    notify(
        state,
        vec![NotificationEvent::new_follower(followed_id, follower_id)],
    )
    .await;
    Ok(())
}

pub fn unfollow_user(state: &AppState, follower_id: &str, followed_id: &str) -> Result<(), AppError> {
    require_id("follower id", follower_id)?;
    require_id("followed id", followed_id)?;
    if follower_id == followed_id {
        return Err(AppError::Forbidden("users cannot unfollow themselves".to_string()));
    }
    get_user(state, followed_id)?;

    if !queries::delete_follow(&state.db, follower_id, followed_id)? {
        return Err(AppError::NotFound("follow not found".to_string()));
    }
    Ok(())
}

pub fn list_followers(
    state: &AppState,
    user_id: &str,
    page: PageRequest,
) -> Result<Page<UserRow>, AppError> {
    get_user(state, user_id)?;
    let filters = vec![Filter::equals("f.followed_id", user_id)];
    let spec = page.to_query::<FollowersCursor>(filters, &state.config.pagination)?;
    let rows = queries::list_followers(&state.db, &spec)?;
    Ok(assemble(rows, spec.page_limit, |row| FollowersCursor::from(row))?)
}
