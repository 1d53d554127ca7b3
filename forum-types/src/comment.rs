use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidings::{FeedItem, VoteState};

use crate::user::{RawFile, RawUser, RawVote, attachments, vote_records, vote_state};
use crate::{Attachment, Author, CommentId, Normalize, PayloadError, PostId, UserId, VoteRecord};
use crate::{require_id, require_timestamp};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPostOwner {
    #[serde(default, deserialize_with = "crate::lenient", alias = "user_id")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawComment {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "updated_at")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "post_id")]
    pub post_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "comment_id")]
    pub comment_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub users: Option<RawUser>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub posts: Option<RawPostOwner>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub files: Option<Vec<RawFile>>,
    #[serde(default, deserialize_with = "crate::lenient", rename = "comment_votes", alias = "commentVotes")]
    pub comment_votes: Option<Vec<RawVote>>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub is_helpful: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub post_id: Option<PostId>,
    /// Set on replies; top-level comments have no parent.
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub author: Author,
    pub post_owner: Option<UserId>,
    pub attachments: Vec<Attachment>,
    pub votes: Vec<VoteRecord>,
    pub is_helpful: bool,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_reply_to(&self, parent: CommentId) -> bool {
        self.parent_id == Some(parent)
    }

    pub fn vote_state(&self, me: Option<UserId>) -> VoteState {
        vote_state(&self.votes, me)
    }

    /// Only the owner of the post may flag its comments as helpful.
    pub fn can_mark_helpful(&self, me: Option<UserId>) -> bool {
        me.is_some() && self.post_owner == me
    }
}

impl Normalize for RawComment {
    type Output = Comment;
    const KIND: &'static str = "comment";

    fn normalize(self) -> Result<Comment, PayloadError> {
        let id = require_id(self.id, Self::KIND)?;
        let created_at = require_timestamp(self.created_at, Self::KIND, id)?;
        Ok(Comment {
            id: CommentId(id),
            created_at,
            updated_at: self.updated_at,
            post_id: self.post_id.map(PostId),
            parent_id: self.comment_id.map(CommentId),
            content: self.content.unwrap_or_default(),
            author: Author::from_raw(self.users),
            post_owner: self.posts.and_then(|p| p.user_id).map(UserId),
            attachments: attachments(self.files),
            votes: vote_records(self.comment_votes),
            is_helpful: self.is_helpful.unwrap_or(false),
        })
    }
}

impl FeedItem for Comment {
    type Id = CommentId;

    fn id(&self) -> &CommentId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn refresh_from(&mut self, newer: &Self) {
        self.content = newer.content.clone();
        self.updated_at = newer.updated_at;
        self.votes = newer.votes.clone();
        self.is_helpful = newer.is_helpful;
        self.attachments = newer.attachments.clone();
    }
}
