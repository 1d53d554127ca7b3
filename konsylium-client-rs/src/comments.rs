//! Comments under one post, and the reply lists under each top-level comment.

use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use forum_types::comment::RawComment;
use forum_types::{Comment, CommentId, PostId, decode};
use serde_json::{Value, json};
use tidings::{
    Connection, Feed, FeedError, FetchOutcome, LiveEvent, MutationOutcome, Page, PageSource,
    PaginationState, RoomMembership, Subscription,
};

use crate::ClientError;
use crate::api::ForumApi;
use crate::pager::Pager;

pub const NEW_COMMENT: &str = "newComment";
const JOIN_POST_ROOM: &str = "joinPostRoom";
const LEAVE_POST_ROOM: &str = "leavePostRoom";

fn decode_live_comment(payload: Value) -> Option<Comment> {
    decode::<RawComment>(payload)
        .inspect_err(|e| log::warn!("Ignoring live comment: {e}"))
        .ok()
}

struct CommentsSource<'a, A> {
    api: &'a A,
    post: PostId,
}

impl<A: ForumApi> PageSource<Comment> for CommentsSource<'_, A> {
    type Error = ClientError;

    async fn fetch_page(
        &self,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Page<Comment>, ClientError> {
        self.api.fetch_comments(self.post, cursor).await
    }
}

struct RepliesSource<'a, A> {
    api: &'a A,
    parent: CommentId,
}

impl<A: ForumApi> PageSource<Comment> for RepliesSource<'_, A> {
    type Error = ClientError;

    async fn fetch_page(&self, _: Option<DateTime<Utc>>) -> Result<Page<Comment>, ClientError> {
        self.api.fetch_replies(self.parent).await
    }
}

/// Top-level comments of one post, newest first. While attached to the `/comments`
/// connection it sits in the post's room and merges new top-level comments as they arrive.
pub struct CommentThread<A: ForumApi> {
    api: Rc<A>,
    post: PostId,
    pager: Pager<Comment>,
    subscription: Option<Subscription>,
    room: Option<RoomMembership>,
}

impl<A: ForumApi> CommentThread<A> {
    pub fn new(api: Rc<A>, post: PostId) -> Self {
        Self {
            api,
            post,
            pager: Pager::new(Feed::newest_first()),
            subscription: None,
            room: None,
        }
    }

    pub fn attach(api: Rc<A>, post: PostId, connection: &Rc<Connection>) -> Result<Self, ClientError> {
        let mut thread = Self::new(api, post);
        thread.room = Some(connection.join_room(JOIN_POST_ROOM, LEAVE_POST_ROOM, json!(post.0))?);
        thread.subscription = Some(Feed::follow(
            thread.pager.feed(),
            connection,
            NEW_COMMENT,
            move |payload: Value| {
                let comment = decode_live_comment(payload)?;
                (comment.post_id == Some(post) && comment.is_top_level())
                    .then_some(LiveEvent::Created(comment))
            },
        ));
        Ok(thread)
    }

    pub fn post(&self) -> PostId {
        self.post
    }

    pub fn is_live(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    pub fn state(&self) -> PaginationState<Comment> {
        self.pager.state()
    }

    pub fn pager(&self) -> &Pager<Comment> {
        &self.pager
    }

    pub async fn load_more(&self) -> Result<FetchOutcome, FeedError<ClientError>> {
        let source = CommentsSource {
            api: &*self.api,
            post: self.post,
        };
        self.pager.fetch_next(&source).await
    }

    /// Add a comment the user just posted. Replies are ignored here; they belong to a [`Replies`].
    pub fn add_created(&self, comment: Comment) -> bool {
        if !comment.is_top_level() {
            return false;
        }
        self.pager.feed().borrow_mut().insert(comment)
    }

    pub fn refresh(&self, comment: &Comment) -> bool {
        self.pager.feed().borrow_mut().refresh(comment)
    }

    pub async fn delete(&self, id: CommentId) -> MutationOutcome<ClientError> {
        let api = &*self.api;
        self.pager
            .remove_optimistic(&id, || api.delete_comment(id))
            .await
    }

    /// Leave the post room and stop listening. Items stay readable.
    pub fn detach(&mut self) {
        self.subscription = None;
        self.room = None;
        self.pager.close();
    }
}

/// Replies to one top-level comment. Fetched as a single page when expanded and thrown
/// away when collapsed. A live reply always lands here and flags that there is more to see.
pub struct Replies<A: ForumApi> {
    api: Rc<A>,
    parent: CommentId,
    pager: Pager<Comment>,
    expanded: Cell<bool>,
    more: Rc<Cell<bool>>,
    subscription: Option<Subscription>,
}

impl<A: ForumApi> Replies<A> {
    pub fn new(api: Rc<A>, parent: CommentId) -> Self {
        Self {
            api,
            parent,
            pager: Pager::new(Feed::newest_first()),
            expanded: Cell::new(false),
            more: Rc::new(Cell::new(true)),
            subscription: None,
        }
    }

    pub fn attach(api: Rc<A>, parent: CommentId, connection: &Rc<Connection>) -> Self {
        let mut replies = Self::new(api, parent);
        let feed = Rc::downgrade(replies.pager.feed());
        let more = Rc::clone(&replies.more);
        replies.subscription = Some(connection.subscribe_as(NEW_COMMENT, move |payload: Value| {
            let Some(reply) = decode_live_comment(payload) else {
                return;
            };
            if !reply.is_reply_to(parent) {
                return;
            }
            let Some(feed) = feed.upgrade() else {
                return;
            };
            match feed.try_borrow_mut() {
                Ok(mut feed) => {
                    feed.insert(reply);
                    more.set(true);
                }
                Err(_) => log::error!("Reply list of {parent} busy; live reply dropped"),
            }
        }));
        replies
    }

    pub fn parent(&self) -> CommentId {
        self.parent
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.get()
    }

    pub fn has_more(&self) -> bool {
        self.more.get()
    }

    pub fn is_loading(&self) -> bool {
        self.pager.state().is_loading
    }

    pub fn items(&self) -> Vec<Comment> {
        self.pager.items().into_iter().collect()
    }

    pub fn error(&self) -> Option<String> {
        self.pager.error()
    }

    /// Expand (and fetch) or collapse (and forget) the reply list.
    pub async fn toggle(&self) -> Result<FetchOutcome, FeedError<ClientError>> {
        if self.expanded.replace(false) {
            self.pager.reset();
            return Ok(FetchOutcome::Skipped);
        }
        self.expanded.set(true);
        self.reload().await
    }

    pub async fn reload(&self) -> Result<FetchOutcome, FeedError<ClientError>> {
        self.pager.reset();
        let source = RepliesSource {
            api: &*self.api,
            parent: self.parent,
        };
        let outcome = self.pager.fetch_next(&source).await?;
        if matches!(outcome, FetchOutcome::Applied { .. }) {
            self.more.set(self.pager.state().has_more);
        }
        Ok(outcome)
    }

    pub fn add_created(&self, reply: Comment) -> bool {
        if !reply.is_reply_to(self.parent) {
            return false;
        }
        let added = self.pager.feed().borrow_mut().insert(reply);
        self.more.set(true);
        added
    }

    pub fn remove(&self, id: CommentId) -> bool {
        self.pager.feed().borrow_mut().remove(&id).is_some()
    }

    pub async fn delete(&self, id: CommentId) -> MutationOutcome<ClientError> {
        let api = &*self.api;
        self.pager
            .remove_optimistic(&id, || api.delete_comment(id))
            .await
    }
}
