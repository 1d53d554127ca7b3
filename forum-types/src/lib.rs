pub mod chat;
pub mod comment;
pub mod notification;
pub mod page;
pub mod post;
pub mod user;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tidings::InvalidVote;

pub use chat::{Conversation, Message};
pub use comment::Comment;
pub use notification::{Notification, NotificationKind, NotificationMetadata};
pub use page::{Pagination, PostFilter};
pub use post::Post;
pub use user::{Attachment, Author, VoteRecord};

macro_rules! id_type {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(
                Clone,
                Copy,
                Debug,
                PartialEq,
                Eq,
                PartialOrd,
                Ord,
                Hash,
                serde::Serialize,
                serde::Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub i64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<i64> for $name {
                fn from(id: i64) -> Self {
                    Self(id)
                }
            }
        )*
    };
}

id_type!(UserId, PostId, CommentId, NotificationId, MessageId, ConversationId);

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("{kind} payload has no id")]
    MissingId { kind: &'static str },

    #[error("{kind} {id} has no creation timestamp")]
    MissingTimestamp { kind: &'static str, id: i64 },

    #[error(transparent)]
    InvalidVote(#[from] InvalidVote),

    #[error("malformed {kind} payload")]
    Json {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A wire payload whose fields may or may not be present, and the checked type it becomes.
///
/// Everything except the id and the creation timestamp falls back to a placeholder:
/// without an id there is nothing to deduplicate or patch against, and without a
/// timestamp there is no position in the list.
pub trait Normalize: DeserializeOwned {
    type Output;
    const KIND: &'static str;

    fn normalize(self) -> Result<Self::Output, PayloadError>;
}

pub fn decode<R: Normalize>(value: Value) -> Result<R::Output, PayloadError> {
    serde_json::from_value::<R>(value)
        .map_err(|source| PayloadError::Json {
            kind: R::KIND,
            source,
        })?
        .normalize()
}

/// Decode every entry of a page, dropping (and logging) the ones that can't be used.
pub fn decode_all<R: Normalize>(values: Vec<Value>) -> Vec<R::Output> {
    values
        .into_iter()
        .filter_map(|value| {
            decode::<R>(value)
                .inspect_err(|e| log::warn!("Dropping {} from page: {e}", R::KIND))
                .ok()
        })
        .collect()
}

/// Field decoder for wire payloads: a value of the wrong shape becomes `None` (and so a
/// placeholder) instead of failing the whole entry.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(field) => Ok(Some(field)),
        Err(e) => {
            log::debug!("Ignoring malformed field: {e}");
            Ok(None)
        }
    }
}

pub(crate) fn require_id(id: Option<i64>, kind: &'static str) -> Result<i64, PayloadError> {
    id.ok_or(PayloadError::MissingId { kind })
}

pub(crate) fn require_timestamp<T>(
    created_at: Option<T>,
    kind: &'static str,
    id: i64,
) -> Result<T, PayloadError> {
    created_at.ok_or(PayloadError::MissingTimestamp { kind, id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_transparent() {
        assert_eq!(serde_json::to_value(PostId(7)).unwrap(), json!(7));
        assert_eq!(serde_json::from_value::<UserId>(json!(3)).unwrap(), UserId(3));
        assert_eq!(CommentId(12).to_string(), "12");
    }

    #[test]
    fn test_decode_all_drops_unusable_entries() {
        let posts = decode_all::<post::RawPost>(vec![
            json!({"id": 1, "createdAt": "2025-03-01T10:00:00Z"}),
            json!({"createdAt": "2025-03-01T09:00:00Z"}),
            json!({"id": 3}),
            json!("not an object"),
            json!({"id": 4, "createdAt": "2025-03-01T08:00:00Z", "users": null}),
        ]);
        let ids: Vec<_> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![PostId(1), PostId(4)]);
        assert_eq!(posts[1].author.username, Author::UNKNOWN_USERNAME);
    }

    #[test]
    fn test_wrongly_typed_fields_become_placeholders() {
        let post = decode::<post::RawPost>(json!({
            "id": 1,
            "createdAt": "2025-03-01T10:00:00Z",
            "age": "54",
            "users": "drhouse",
            "title": 7,
            "post_votes": {"value": 1},
        }))
        .unwrap();
        assert_eq!(post.age, None);
        assert_eq!(post.author, Author::unknown());
        assert_eq!(post.title, "");
        assert!(post.votes.is_empty());

        let kept = decode_all::<post::RawPost>(vec![
            json!({"id": 1, "createdAt": "2025-03-01T10:00:00Z", "users": "drhouse"}),
            json!({"id": "2", "createdAt": "2025-03-01T10:00:00Z"}),
            json!({"id": 3, "createdAt": "yesterday"}),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, PostId(1));
    }

    #[test]
    fn test_malformed_metadata_keeps_notification() {
        let whole = decode::<notification::RawNotification>(json!({
            "id": 5,
            "type": "new_comment",
            "createdAt": "2025-03-01T10:00:00Z",
            "metadata": "oops",
        }))
        .unwrap();
        assert_eq!(whole.metadata, NotificationMetadata::default());

        let partly = decode::<notification::RawNotification>(json!({
            "id": 6,
            "type": "new_message",
            "createdAt": "2025-03-01T10:00:00Z",
            "read": "no",
            "metadata": {"username": "anna", "conversationId": "seven", "postId": 3},
        }))
        .unwrap();
        assert!(!partly.read);
        assert_eq!(partly.metadata.username.as_deref(), Some("anna"));
        assert_eq!(partly.metadata.conversation_id, None);
        assert_eq!(partly.metadata.post_id, Some(PostId(3)));
    }
}
