//! Cursor shapes for every paginated resource.
//!
//! Each cursor is the ordering tuple of `ResourceKind::ordering()` for its
//! resource, in the same column order. Unknown fields are rejected so that a
//! token minted for one list cannot be replayed against another.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries::{BookmarkedPostRow, CommentRow, NotificationRow, PostRow, UserRow};

use super::cursor::{validate_id_field, CursorError, CursorValue};
use super::keyset::{KeyValue, KeysetCursor, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UsersCursor {
    pub followers_count: i64,
    pub posts_count: i64,
    pub id: String,
}

impl CursorValue for UsersCursor {
    fn validate(&self) -> Result<(), CursorError> {
        validate_id_field("id", &self.id)
    }
}

impl KeysetCursor for UsersCursor {
    const RESOURCE: ResourceKind = ResourceKind::Users;

    fn key(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::Integer(self.followers_count),
            KeyValue::Integer(self.posts_count),
            KeyValue::Text(self.id.clone()),
        ]
    }
}

impl From<&UserRow> for UsersCursor {
    fn from(row: &UserRow) -> Self {
        Self {
            followers_count: row.followers_count,
            posts_count: row.posts_count,
            id: row.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FollowersCursor {
    pub id: String,
}

impl CursorValue for FollowersCursor {
    fn validate(&self) -> Result<(), CursorError> {
        validate_id_field("id", &self.id)
    }
}

impl KeysetCursor for FollowersCursor {
    const RESOURCE: ResourceKind = ResourceKind::Followers;

    fn key(&self) -> Vec<KeyValue> {
        vec![KeyValue::Text(self.id.clone())]
    }
}

impl From<&UserRow> for FollowersCursor {
    fn from(row: &UserRow) -> Self {
        Self { id: row.id.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostsCursor {
    pub views_count: i64,
    pub id: String,
}

impl CursorValue for PostsCursor {
    fn validate(&self) -> Result<(), CursorError> {
        validate_id_field("id", &self.id)
    }
}

impl KeysetCursor for PostsCursor {
    const RESOURCE: ResourceKind = ResourceKind::Posts;

    fn key(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::Integer(self.views_count),
            KeyValue::Text(self.id.clone()),
        ]
    }
}

impl From<&PostRow> for PostsCursor {
    fn from(row: &PostRow) -> Self {
        Self {
            views_count: row.views_count,
            id: row.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentsCursor {
    pub id: String,
}

impl CursorValue for CommentsCursor {
    fn validate(&self) -> Result<(), CursorError> {
        validate_id_field("id", &self.id)
    }
}

impl KeysetCursor for CommentsCursor {
    const RESOURCE: ResourceKind = ResourceKind::Comments;

    fn key(&self) -> Vec<KeyValue> {
        vec![KeyValue::Text(self.id.clone())]
    }
}

impl From<&CommentRow> for CommentsCursor {
    fn from(row: &CommentRow) -> Self {
        Self { id: row.id.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BookmarksCursor {
    pub created_at: String,
    pub post_id: String,
}

impl CursorValue for BookmarksCursor {
    fn validate(&self) -> Result<(), CursorError> {
        validate_timestamp_field("createdAt", &self.created_at)?;
        validate_id_field("postId", &self.post_id)
    }
}

impl KeysetCursor for BookmarksCursor {
    const RESOURCE: ResourceKind = ResourceKind::Bookmarks;

    fn key(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::Text(self.created_at.clone()),
            KeyValue::Text(self.post_id.clone()),
        ]
    }
}

impl From<&BookmarkedPostRow> for BookmarksCursor {
    fn from(row: &BookmarkedPostRow) -> Self {
        Self {
            created_at: row.bookmarked_at.clone(),
            post_id: row.post.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationsCursor {
    pub id: String,
}

impl CursorValue for NotificationsCursor {
    fn validate(&self) -> Result<(), CursorError> {
        validate_id_field("id", &self.id)
    }
}

impl KeysetCursor for NotificationsCursor {
    const RESOURCE: ResourceKind = ResourceKind::Notifications;

    fn key(&self) -> Vec<KeyValue> {
        vec![KeyValue::Text(self.id.clone())]
    }
}

impl From<&NotificationRow> for NotificationsCursor {
    fn from(row: &NotificationRow) -> Self {
        Self { id: row.id.clone() }
    }
}

// Stored timestamps are compared as text, so only the canonical store format
// is accepted.
fn validate_timestamp_field(field: &'static str, value: &str) -> Result<(), CursorError> {
    let invalid = || CursorError::InvalidField {
        field,
        reason: "is not a canonical UTC timestamp".to_string(),
    };
    let parsed = DateTime::parse_from_rfc3339(value).map_err(|_| invalid())?;
    let canonical = parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Micros, true);
    if canonical != value {
        return Err(invalid());
    }
    Ok(())
}
