use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of notification. Ids match the seeded `notification_kinds` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewFollower,
    NewPost,
}

impl NotificationKind {
    pub const fn id(&self) -> i64 {
        match self {
            Self::NewFollower => 1,
            Self::NewPost => 2,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NewFollower => "new_follower",
            Self::NewPost => "new_post",
        }
    }

    pub const fn all() -> &'static [NotificationKind] {
        &[Self::NewFollower, Self::NewPost]
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("unknown notification kind: {value}"))
    }
}

/// One pending notification.
///
/// Built by a command the moment its action succeeds, then owned by the
/// dispatcher queue until a worker hands it to the sink. There are no setters;
/// `created_at` is assigned by the sink at persistence time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    id: String,
    recipient_id: String,
    kind: NotificationKind,
    sender_id: Option<String>,
    post_id: Option<String>,
    is_read: bool,
}

impl NotificationEvent {
    pub fn new(
        recipient_id: impl Into<String>,
        kind: NotificationKind,
        sender_id: Option<String>,
        post_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            recipient_id: recipient_id.into(),
            kind,
            sender_id,
            post_id,
            is_read: false,
        }
    }

    /// `follower_id` started following `recipient_id`.
    pub fn new_follower(recipient_id: impl Into<String>, follower_id: impl Into<String>) -> Self {
        Self::new(
            recipient_id,
            NotificationKind::NewFollower,
            Some(follower_id.into()),
            None,
        )
    }

    /// `author_id` published `post_id`; one event per follower.
    pub fn new_post(
        recipient_id: impl Into<String>,
        author_id: impl Into<String>,
        post_id: impl Into<String>,
    ) -> Self {
        Self::new(
            recipient_id,
            NotificationKind::NewPost,
            Some(author_id.into()),
            Some(post_id.into()),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender_id.as_deref()
    }

    pub fn post_id(&self) -> Option<&str> {
        self.post_id.as_deref()
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }
}
