use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidings::FeedItem;

use crate::{ConversationId, NotificationId, Normalize, PayloadError, PostId};
use crate::{require_id, require_timestamp};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    NewMessage,
    NewComment,
    CommentReply,
    NewPost,
    PostVoted,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::NewMessage => "new_message",
            NotificationKind::NewComment => "new_comment",
            NotificationKind::CommentReply => "comment_reply",
            NotificationKind::NewPost => "new_post",
            NotificationKind::PostVoted => "post_voted",
            NotificationKind::Other(kind) => kind,
        }
    }

    pub fn is_chat(&self) -> bool {
        matches!(self, NotificationKind::NewMessage)
    }

    fn concerns_post(&self) -> bool {
        matches!(
            self,
            NotificationKind::NewComment
                | NotificationKind::CommentReply
                | NotificationKind::NewPost
                | NotificationKind::PostVoted
        )
    }
}

impl From<String> for NotificationKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "new_message" => NotificationKind::NewMessage,
            "new_comment" => NotificationKind::NewComment,
            "comment_reply" => NotificationKind::CommentReply,
            "new_post" => NotificationKind::NewPost,
            "post_voted" => NotificationKind::PostVoted,
            _ => NotificationKind::Other(kind),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> String {
        kind.as_str().to_string()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMetadata {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub avatar_filename: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub post_id: Option<PostId>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub is_follower: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNotification {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient", rename = "type")]
    pub kind: Option<NotificationKind>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub read: Option<bool>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub metadata: Option<NotificationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub metadata: NotificationMetadata,
}

impl Notification {
    pub fn is_chat(&self) -> bool {
        self.kind.is_chat()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.metadata.conversation_id
    }

    /// Where following the notification should lead.
    pub fn link(&self) -> String {
        match (self.kind.concerns_post(), self.metadata.post_id) {
            (true, Some(post)) => format!("/posts/{post}"),
            _ => "/".to_string(),
        }
    }

    pub fn actor_label(&self) -> String {
        let username = self
            .metadata
            .username
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or("unknown");
        format!("@{username}")
    }

    pub fn actor_initial(&self) -> char {
        self.metadata
            .username
            .as_deref()
            .and_then(|name| name.chars().next())
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('?')
    }
}

impl Normalize for RawNotification {
    type Output = Notification;
    const KIND: &'static str = "notification";

    fn normalize(self) -> Result<Notification, PayloadError> {
        let id = require_id(self.id, Self::KIND)?;
        let created_at = require_timestamp(self.created_at, Self::KIND, id)?;
        Ok(Notification {
            id: NotificationId(id),
            kind: self
                .kind
                .unwrap_or_else(|| NotificationKind::Other(String::new())),
            created_at,
            read: self.read.unwrap_or(false),
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

impl FeedItem for Notification {
    type Id = NotificationId;

    fn id(&self) -> &NotificationId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn refresh_from(&mut self, newer: &Self) {
        // read is sticky: a stale copy must not mark a read notification unread again
        self.read |= newer.read;
        self.metadata = newer.metadata.clone();
    }
}
