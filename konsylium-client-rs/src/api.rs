//! The REST collaborator. Feeds and controls only talk to the server through [`ForumApi`],
//! so tests and the diagnostics binary can swap the network for [`crate::memory::MemoryForum`].

use chrono::{DateTime, Utc};
use forum_types::{
    Comment, CommentId, Conversation, ConversationId, Message, MessageId, Notification,
    NotificationId, Post, PostFilter, PostId, UserId,
};
use tidings::{Page, Vote};

use crate::ClientError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteTarget {
    Post(PostId),
    Comment(CommentId),
}

impl VoteTarget {
    pub fn path(&self) -> String {
        match self {
            VoteTarget::Post(id) => format!("/posts/{id}/vote"),
            VoteTarget::Comment(id) => format!("/comments/{id}/vote"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FollowTarget {
    Post(PostId),
    User(UserId),
}

impl FollowTarget {
    pub fn path(&self) -> String {
        match self {
            FollowTarget::Post(id) => format!("/posts/{id}/follow"),
            FollowTarget::User(id) => format!("/users/{id}/follow"),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait ForumApi {
    async fn fetch_posts(
        &self,
        filter: &PostFilter,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Page<Post>, ClientError>;

    async fn fetch_post(&self, id: PostId) -> Result<Post, ClientError>;

    async fn delete_post(&self, id: PostId) -> Result<(), ClientError>;

    async fn fetch_comments(
        &self,
        post: PostId,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Page<Comment>, ClientError>;

    /// Replies come as one page; there is no cursor.
    async fn fetch_replies(&self, parent: CommentId) -> Result<Page<Comment>, ClientError>;

    async fn delete_comment(&self, id: CommentId) -> Result<(), ClientError>;

    async fn vote(&self, target: VoteTarget, value: Vote) -> Result<(), ClientError>;

    async fn set_helpful(&self, comment: CommentId, helpful: bool) -> Result<(), ClientError>;

    async fn set_following(&self, target: FollowTarget, follow: bool) -> Result<(), ClientError>;

    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ClientError>;

    async fn open_conversation(&self, with: UserId) -> Result<Conversation, ClientError>;

    /// Newest first, strictly older than `before`. `has_more` is set when the server
    /// sent a full page of `limit` entries, usable or not.
    async fn fetch_messages(
        &self,
        conversation: ConversationId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Page<Message>, ClientError>;

    async fn send_message(
        &self,
        conversation: ConversationId,
        content: &str,
    ) -> Result<(), ClientError>;

    async fn delete_message(&self, id: MessageId) -> Result<(), ClientError>;

    async fn fetch_notifications(
        &self,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Page<Notification>, ClientError>;

    async fn mark_notification_read(&self, id: NotificationId) -> Result<(), ClientError>;
}
