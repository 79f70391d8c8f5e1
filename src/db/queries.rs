use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::Serialize;

use crate::pagination::{KeyValue, QuerySpec};

use super::{Database, DbError};

impl ToSql for KeyValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            KeyValue::Integer(value) => Ok(ToSqlOutput::from(*value)),
            KeyValue::Text(value) => Ok(ToSqlOutput::from(value.as_str())),
        }
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub username: String,
    pub profile_image_url: Option<String>,
    pub joined_at: String,
    pub posts_count: i64,
    pub following_count: i64,
    pub followers_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub featured_image_url: Option<String>,
    pub created_at: String,
    pub views_count: i64,
    pub comments_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkedPostRow {
    #[serde(flatten)]
    pub post: PostRow,
    pub bookmarked_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRow {
    pub id: String,
    pub kind: String,
    pub user_id: String,
    pub sender_id: Option<String>,
    pub post_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// A notification ready to insert; `created_at` is stamped by the insert.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub id: String,
    pub kind_id: i64,
    pub user_id: String,
    pub sender_id: Option<String>,
    pub post_id: Option<String>,
    pub is_read: bool,
}

const USER_COLUMNS: &str = "u.id, u.name, u.username, u.profile_image_url, u.joined_at, \
     u.posts_count, u.following_count, u.followers_count";

const POST_COLUMNS: &str = "p.id, p.user_id, p.title, p.content, p.featured_image_url, \
     p.created_at, p.views_count, p.comments_count";

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.user_id, c.content, c.created_at";

const NOTIFICATION_COLUMNS: &str =
    "n.id, k.name, n.user_id, n.sender_id, n.post_id, n.is_read, n.created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        profile_image_url: row.get(3)?,
        joined_at: row.get(4)?,
        posts_count: row.get(5)?,
        following_count: row.get(6)?,
        followers_count: row.get(7)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        featured_image_url: row.get(4)?,
        created_at: row.get(5)?,
        views_count: row.get(6)?,
        comments_count: row.get(7)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        user_id: row.get(2)?,
        sender_id: row.get(3)?,
        post_id: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Run `base` (a SELECT without WHERE/ORDER/LIMIT) narrowed by `spec`.
fn query_page<T>(
    db: &Database,
    base: &str,
    spec: &QuerySpec,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, DbError> {
    let fragment = spec.to_sql();
    let sql = format!("{base}{}", fragment.clause);
    tracing::trace!(resource = %spec.resource, sql = %sql, "keyset query");

    let conn = db.conn();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(fragment.params.iter()), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// User queries
// ---------------------------------------------------------------------------

pub fn insert_user(db: &Database, row: &UserRow) -> Result<(), DbError> {
    let conn = db.conn();
    let taken: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![row.username],
            |r| r.get(0),
        )?;
    if taken {
        return Err(DbError::Conflict(format!(
            "username {} is already taken",
            row.username
        )));
    }

    conn.execute(
        "INSERT INTO users (id, name, username, profile_image_url, joined_at, posts_count, following_count, followers_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.id,
            row.name,
            row.username,
            row.profile_image_url,
            row.joined_at,
            row.posts_count,
            row.following_count,
            row.followers_count
        ],
    )?;
    Ok(())
}

pub fn get_user(db: &Database, id: &str) -> Result<Option<UserRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_users(db: &Database, spec: &QuerySpec) -> Result<Vec<UserRow>, DbError> {
    query_page(
        db,
        &format!("SELECT {USER_COLUMNS} FROM users u"),
        spec,
        user_from_row,
    )
}

// ---------------------------------------------------------------------------
// Follow queries
// ---------------------------------------------------------------------------

/// Record `follower_id` following `followed_id` and bump both counters.
pub fn insert_follow(
    db: &Database,
    follower_id: &str,
    followed_id: &str,
    created_at: &str,
) -> Result<(), DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;

    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2)",
        params![follower_id, followed_id],
        |r| r.get(0),
    )?;
    if exists {
        return Err(DbError::Conflict(format!(
            "{follower_id} already follows {followed_id}"
        )));
    }

    tx.execute(
        "INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?1, ?2, ?3)",
        params![follower_id, followed_id, created_at],
    )?;
    tx.execute(
        "UPDATE users SET following_count = following_count + 1 WHERE id = ?1",
        params![follower_id],
    )?;
    tx.execute(
        "UPDATE users SET followers_count = followers_count + 1 WHERE id = ?1",
        params![followed_id],
    )?;

    tx.commit()?;
    Ok(())
}

/// Returns false when there was nothing to remove.
pub fn delete_follow(db: &Database, follower_id: &str, followed_id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;

    let removed = tx.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
        params![follower_id, followed_id],
    )?;
    if removed == 0 {
        return Ok(false);
    }

    tx.execute(
        "UPDATE users SET following_count = following_count - 1 WHERE id = ?1",
        params![follower_id],
    )?;
    tx.execute(
        "UPDATE users SET followers_count = followers_count - 1 WHERE id = ?1",
        params![followed_id],
    )?;

    tx.commit()?;
    Ok(true)
}

pub fn list_follower_ids(db: &Database, user_id: &str) -> Result<Vec<String>, DbError> {
    let conn = db.conn();
    let mut stmt =
        conn.prepare("SELECT follower_id FROM follows WHERE followed_id = ?1 ORDER BY follower_id")?;
    let rows = stmt
        .query_map(params![user_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Followers, scoped with an equality filter on `f.followed_id`.
pub fn list_followers(db: &Database, spec: &QuerySpec) -> Result<Vec<UserRow>, DbError> {
    query_page(
        db,
        &format!("SELECT {USER_COLUMNS} FROM follows f JOIN users u ON u.id = f.follower_id"),
        spec,
        user_from_row,
    )
}

// ---------------------------------------------------------------------------
// Post queries
// ---------------------------------------------------------------------------

pub fn insert_post(db: &Database, row: &PostRow) -> Result<(), DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO posts (id, user_id, title, content, featured_image_url, created_at, views_count, comments_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.id,
            row.user_id,
            row.title,
            row.content,
            row.featured_image_url,
            row.created_at,
            row.views_count,
            row.comments_count
        ],
    )?;
    tx.execute(
        "UPDATE users SET posts_count = posts_count + 1 WHERE id = ?1",
        params![row.user_id],
    )?;

    tx.commit()?;
    Ok(())
}

pub fn get_post(db: &Database, id: &str) -> Result<Option<PostRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
            params![id],
            post_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Count a view once per viewer. Returns whether the view was new.
pub fn record_post_view(
    db: &Database,
    post_id: &str,
    viewer_id: &str,
    viewed_at: &str,
) -> Result<bool, DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO post_views (post_id, user_id, viewed_at) VALUES (?1, ?2, ?3)",
        params![post_id, viewer_id, viewed_at],
    )?;
    if inserted > 0 {
        tx.execute(
            "UPDATE posts SET views_count = views_count + 1 WHERE id = ?1",
            params![post_id],
        )?;
    }

    tx.commit()?;
    Ok(inserted > 0)
}

pub fn list_posts(db: &Database, spec: &QuerySpec) -> Result<Vec<PostRow>, DbError> {
    query_page(
        db,
        &format!("SELECT {POST_COLUMNS} FROM posts p"),
        spec,
        post_from_row,
    )
}

// ---------------------------------------------------------------------------
// Comment queries
// ---------------------------------------------------------------------------

pub fn insert_comment(db: &Database, row: &CommentRow) -> Result<(), DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO comments (id, post_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.id, row.post_id, row.user_id, row.content, row.created_at],
    )?;
    tx.execute(
        "UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?1",
        params![row.post_id],
    )?;

    tx.commit()?;
    Ok(())
}

pub fn list_comments(db: &Database, spec: &QuerySpec) -> Result<Vec<CommentRow>, DbError> {
    query_page(
        db,
        &format!("SELECT {COMMENT_COLUMNS} FROM comments c"),
        spec,
        comment_from_row,
    )
}

// ---------------------------------------------------------------------------
// Bookmark queries
// ---------------------------------------------------------------------------

pub fn insert_bookmark(
    db: &Database,
    user_id: &str,
    post_id: &str,
    created_at: &str,
) -> Result<(), DbError> {
    let conn = db.conn();
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM bookmarks WHERE user_id = ?1 AND post_id = ?2)",
        params![user_id, post_id],
        |r| r.get(0),
    )?;
    if exists {
        return Err(DbError::Conflict(format!("post {post_id} is already bookmarked")));
    }

    conn.execute(
        "INSERT INTO bookmarks (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, post_id, created_at],
    )?;
    Ok(())
}

pub fn delete_bookmark(db: &Database, user_id: &str, post_id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let removed = conn.execute(
        "DELETE FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
        params![user_id, post_id],
    )?;
    Ok(removed > 0)
}

pub fn list_bookmarks(db: &Database, spec: &QuerySpec) -> Result<Vec<BookmarkedPostRow>, DbError> {
    query_page(
        db,
        &format!("SELECT {POST_COLUMNS}, b.created_at FROM bookmarks b JOIN posts p ON p.id = b.post_id"),
        spec,
        |row| {
            Ok(BookmarkedPostRow {
                post: post_from_row(row)?,
                bookmarked_at: row.get(8)?,
            })
        },
    )
}

// ---------------------------------------------------------------------------
// Notification queries
// ---------------------------------------------------------------------------

/// Insert a notification, stamping `created_at`, and return the stored row.
pub fn insert_notification(
    db: &Database,
    row: &NewNotification,
    created_at: &str,
) -> Result<NotificationRow, DbError> {
    let conn = db.conn();
    let kind: String = conn
        .query_row(
            "SELECT name FROM notification_kinds WHERE id = ?1",
            params![row.kind_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("notification kind {}", row.kind_id)))?;

    conn.execute(
        "INSERT INTO notifications (id, kind_id, user_id, sender_id, post_id, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.id,
            row.kind_id,
            row.user_id,
            row.sender_id,
            row.post_id,
            row.is_read,
            created_at
        ],
    )?;

    Ok(NotificationRow {
        id: row.id.clone(),
        kind,
        user_id: row.user_id.clone(),
        sender_id: row.sender_id.clone(),
        post_id: row.post_id.clone(),
        is_read: row.is_read,
        created_at: created_at.to_string(),
    })
}

pub fn list_notifications(db: &Database, spec: &QuerySpec) -> Result<Vec<NotificationRow>, DbError> {
    query_page(
        db,
        &format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications n JOIN notification_kinds k ON k.id = n.kind_id"
        ),
        spec,
        notification_from_row,
    )
}

pub fn count_notifications(db: &Database, user_id: &str) -> Result<i64, DbError> {
    let conn = db.conn();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

pub fn count_unread_notifications(db: &Database, user_id: &str) -> Result<i64, DbError> {
    let conn = db.conn();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Returns false when the notification does not exist or belongs to someone else.
pub fn mark_notification_read(db: &Database, user_id: &str, id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let updated = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(updated > 0)
}

// ---------------------------------------------------------------------------
// Settings queries
// ---------------------------------------------------------------------------

pub fn upsert_setting(
    db: &Database,
    key: &str,
    value_json: &str,
    updated_at: &str,
) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO settings (key, value_json, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key)
         DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
        params![key, value_json, updated_at],
    )?;
    Ok(())
}

pub fn get_setting(db: &Database, key: &str) -> Result<Option<String>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare("SELECT value_json FROM settings WHERE key = ?1")?;
    let mut rows = stmt.query_map(params![key], |row| row.get(0))?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}
