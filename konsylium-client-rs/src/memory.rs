//! An in-process forum that answers [`ForumApi`] calls from plain vectors. Used by the tests
//! and by `feed-scope --offline`.

use std::cell::{Cell, RefCell};

use chrono::{DateTime, Utc};
use forum_types::chat::Participant;
use forum_types::{
    Comment, CommentId, Conversation, ConversationId, Message, MessageId, Notification,
    NotificationId, Post, PostFilter, PostId, UserId,
};
use futures::channel::oneshot;
use reqwest::StatusCode;
use tidings::{FeedItem, Page, Vote};

use crate::ClientError;
use crate::api::{FollowTarget, ForumApi, VoteTarget};

#[derive(Debug)]
pub struct MemoryForum {
    me: Option<UserId>,
    page_size: usize,
    posts: RefCell<Vec<Post>>,
    comments: RefCell<Vec<Comment>>,
    conversations: RefCell<Vec<Conversation>>,
    messages: RefCell<Vec<Message>>,
    notifications: RefCell<Vec<Notification>>,
    failing: RefCell<Vec<String>>,
    calls: RefCell<Vec<String>>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
    next_id: Cell<i64>,
}

impl Default for MemoryForum {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first<T: FeedItem>(items: &[T], before: Option<DateTime<Utc>>) -> Vec<T> {
    let mut items: Vec<T> = items
        .iter()
        .filter(|item| before.is_none_or(|cursor| item.created_at() < cursor))
        .cloned()
        .collect();
    items.sort_by_key(|item| std::cmp::Reverse(item.created_at()));
    items
}

fn matches_filter(post: &Post, filter: &PostFilter) -> bool {
    let search = filter.search.as_deref().map(str::to_lowercase);
    search.is_none_or(|needle| {
        post.title.to_lowercase().contains(&needle)
            || post.description.to_lowercase().contains(&needle)
    }) && filter.post_status_id.is_none_or(|status| post.status_id == Some(status))
        && filter.age.is_none_or(|age| post.age == Some(age))
        && filter
            .gender
            .as_ref()
            .is_none_or(|gender| post.gender.as_ref() == Some(gender))
        && filter.user_id.is_none_or(|user| post.owner() == Some(user))
}

impl MemoryForum {
    pub fn new() -> Self {
        Self {
            me: None,
            page_size: 10,
            posts: RefCell::default(),
            comments: RefCell::default(),
            conversations: RefCell::default(),
            messages: RefCell::default(),
            notifications: RefCell::default(),
            failing: RefCell::default(),
            calls: RefCell::default(),
            gate: RefCell::default(),
            next_id: Cell::new(10_000),
        }
    }

    pub fn signed_in_as(mut self, me: UserId) -> Self {
        self.me = Some(me);
        self
    }

    /// Page size of the cursor-paged listings (posts, comments).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn add_post(&self, post: Post) {
        self.posts.borrow_mut().push(post);
    }

    pub fn add_comment(&self, comment: Comment) {
        self.comments.borrow_mut().push(comment);
    }

    pub fn add_conversation(&self, conversation: Conversation) {
        self.conversations.borrow_mut().push(conversation);
    }

    pub fn add_message(&self, message: Message) {
        self.messages.borrow_mut().push(message);
    }

    pub fn add_notification(&self, notification: Notification) {
        self.notifications.borrow_mut().push(notification);
    }

    pub fn notification(&self, id: NotificationId) -> Option<Notification> {
        self.notifications
            .borrow()
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn messages_in(&self, conversation: ConversationId) -> Vec<Message> {
        self.messages
            .borrow()
            .iter()
            .filter(|m| m.conversation_id == Some(conversation))
            .cloned()
            .collect()
    }

    /// Every call whose description starts with `prefix` fails with a 500 until cleared.
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.failing.borrow_mut().push(prefix.into());
    }

    pub fn clear_failures(&self) {
        self.failing.borrow_mut().clear();
    }

    /// Calls made so far, e.g. `PUT /posts/3/vote 1`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Hold the next listing or mark-read call until the returned sender fires (or is dropped).
    pub fn hold_next_call(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.borrow_mut() = Some(rx);
        tx
    }

    fn record(&self, call: String) -> Result<(), ClientError> {
        let fails = self
            .failing
            .borrow()
            .iter()
            .any(|prefix| call.starts_with(prefix.as_str()));
        log::debug!("memory forum: {call}");
        self.calls.borrow_mut().push(call);
        if fails {
            return Err(ClientError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    async fn pass_gate(&self) {
        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }

    fn next_id(&self) -> i64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn page_of<T: FeedItem>(&self, items: Vec<T>, size: usize) -> Page<T> {
        let has_more = items.len() > size;
        Page::new(items.into_iter().take(size).collect(), Some(has_more))
    }
}

impl ForumApi for MemoryForum {
    async fn fetch_posts(
        &self,
        filter: &PostFilter,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Page<Post>, ClientError> {
        self.record("GET /posts".to_string())?;
        self.pass_gate().await;
        let posts: Vec<Post> = newest_first(&self.posts.borrow(), cursor)
            .into_iter()
            .filter(|post| matches_filter(post, filter))
            .collect();
        Ok(self.page_of(posts, self.page_size))
    }

    async fn fetch_post(&self, id: PostId) -> Result<Post, ClientError> {
        self.record(format!("GET /posts/{id}"))?;
        self.posts
            .borrow()
            .iter()
            .find(|post| post.id == id)
            .cloned()
            .ok_or_else(|| ClientError::Status {
                status: StatusCode::NOT_FOUND,
                body: format!("post {id} not found"),
            })
    }

    async fn delete_post(&self, id: PostId) -> Result<(), ClientError> {
        self.record(format!("DELETE /posts/{id}"))?;
        self.posts.borrow_mut().retain(|post| post.id != id);
        Ok(())
    }

    async fn fetch_comments(
        &self,
        post: PostId,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Page<Comment>, ClientError> {
        self.record(format!("GET /posts/{post}/comments"))?;
        self.pass_gate().await;
        let comments: Vec<Comment> = newest_first(&self.comments.borrow(), cursor)
            .into_iter()
            .filter(|c| c.post_id == Some(post) && c.is_top_level())
            .collect();
        Ok(self.page_of(comments, self.page_size))
    }

    async fn fetch_replies(&self, parent: CommentId) -> Result<Page<Comment>, ClientError> {
        self.record(format!("GET /comments/{parent}/replies"))?;
        self.pass_gate().await;
        let replies: Vec<Comment> = newest_first(&self.comments.borrow(), None)
            .into_iter()
            .filter(|c| c.is_reply_to(parent))
            .collect();
        Ok(Page::new(replies, Some(false)))
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), ClientError> {
        self.record(format!("DELETE /comments/{id}"))?;
        self.comments.borrow_mut().retain(|c| c.id != id);
        Ok(())
    }

    async fn vote(&self, target: VoteTarget, value: Vote) -> Result<(), ClientError> {
        self.record(format!("PUT {} {}", target.path(), value.value()))
    }

    async fn set_helpful(&self, comment: CommentId, helpful: bool) -> Result<(), ClientError> {
        self.record(format!("PUT /comments/{comment}/helpful {helpful}"))?;
        for c in self.comments.borrow_mut().iter_mut().filter(|c| c.id == comment) {
            c.is_helpful = helpful;
        }
        Ok(())
    }

    async fn set_following(&self, target: FollowTarget, follow: bool) -> Result<(), ClientError> {
        let method = if follow { "POST" } else { "DELETE" };
        self.record(format!("{method} {}", target.path()))
    }

    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.record("GET /conversations".to_string())?;
        Ok(self.conversations.borrow().clone())
    }

    async fn open_conversation(&self, with: UserId) -> Result<Conversation, ClientError> {
        self.record(format!("POST /conversations {with}"))?;
        if let Some(existing) = self
            .conversations
            .borrow()
            .iter()
            .find(|c| c.involves(with))
        {
            return Ok(existing.clone());
        }
        let conversation = Conversation {
            id: ConversationId(self.next_id()),
            participants: [
                Participant {
                    id: self.me,
                    author: None,
                },
                Participant {
                    id: Some(with),
                    author: None,
                },
            ],
            last_message: None,
            last_message_at: None,
        };
        self.conversations.borrow_mut().push(conversation.clone());
        Ok(conversation)
    }

    async fn fetch_messages(
        &self,
        conversation: ConversationId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Page<Message>, ClientError> {
        self.record(format!("GET /conversations/{conversation}/messages"))?;
        self.pass_gate().await;
        let messages: Vec<Message> = newest_first(&self.messages_in(conversation), before)
            .into_iter()
            .take(limit)
            .collect();
        let full = messages.len() == limit;
        Ok(Page::new(messages, Some(full)))
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        content: &str,
    ) -> Result<(), ClientError> {
        self.record(format!("POST /conversations/{conversation}/messages {content}"))?;
        let message = Message {
            id: MessageId(self.next_id()),
            conversation_id: Some(conversation),
            sender_id: self.me,
            content: content.to_string(),
            created_at: Utc::now(),
            read: false,
        };
        self.messages.borrow_mut().push(message);
        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), ClientError> {
        self.record(format!("DELETE /messages/{id}"))?;
        self.messages.borrow_mut().retain(|m| m.id != id);
        Ok(())
    }

    async fn fetch_notifications(
        &self,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Page<Notification>, ClientError> {
        self.record("GET /notifications".to_string())?;
        self.pass_gate().await;
        let notifications = newest_first(&self.notifications.borrow(), before);
        Ok(self.page_of(notifications, limit))
    }

    async fn mark_notification_read(&self, id: NotificationId) -> Result<(), ClientError> {
        self.record(format!("PATCH /notifications/{id}/read"))?;
        self.pass_gate().await;
        for n in self
            .notifications
            .borrow_mut()
            .iter_mut()
            .filter(|n| n.id == id)
        {
            n.read = true;
        }
        Ok(())
    }
}
