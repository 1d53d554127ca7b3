use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidings::{FeedItem, VoteState};

use crate::user::{RawFile, RawUser, RawVote, attachments, vote_records, vote_state};
use crate::{Attachment, Author, Normalize, PayloadError, PostId, UserId, VoteRecord};
use crate::{require_id, require_timestamp};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPost {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "user_id")]
    pub user_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub users: Option<RawUser>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub files: Option<Vec<RawFile>>,
    #[serde(default, deserialize_with = "crate::lenient", rename = "post_votes", alias = "postVotes")]
    pub post_votes: Option<Vec<RawVote>>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub is_followed: Option<bool>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "post_status_id")]
    pub post_status_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "is_answered")]
    pub is_answered: Option<bool>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub age: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: PostId,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub author: Author,
    pub attachments: Vec<Attachment>,
    pub votes: Vec<VoteRecord>,
    pub is_followed: bool,
    pub status_id: Option<i64>,
    pub is_answered: bool,
    pub age: Option<i64>,
    pub gender: Option<String>,
}

impl Post {
    pub fn vote_state(&self, me: Option<UserId>) -> VoteState {
        vote_state(&self.votes, me)
    }

    /// The owner id, taken from the author object or the bare `userId` column.
    pub fn owner(&self) -> Option<UserId> {
        self.author.id
    }
}

impl Normalize for RawPost {
    type Output = Post;
    const KIND: &'static str = "post";

    fn normalize(self) -> Result<Post, PayloadError> {
        let id = require_id(self.id, Self::KIND)?;
        let created_at = require_timestamp(self.created_at, Self::KIND, id)?;
        let mut author = Author::from_raw(self.users);
        if author.id.is_none() {
            author.id = self.user_id.map(UserId);
        }
        Ok(Post {
            id: PostId(id),
            created_at,
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            author,
            attachments: attachments(self.files),
            votes: vote_records(self.post_votes),
            is_followed: self.is_followed.unwrap_or(false),
            status_id: self.post_status_id,
            is_answered: self.is_answered.unwrap_or(false),
            age: self.age,
            gender: self.gender,
        })
    }
}

impl FeedItem for Post {
    type Id = PostId;

    fn id(&self) -> &PostId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn refresh_from(&mut self, newer: &Self) {
        self.title = newer.title.clone();
        self.description = newer.description.clone();
        self.votes = newer.votes.clone();
        self.is_followed = newer.is_followed;
        self.status_id = newer.status_id;
        self.is_answered = newer.is_answered;
        self.attachments = newer.attachments.clone();
    }
}
