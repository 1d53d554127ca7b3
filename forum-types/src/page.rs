//! Response envelopes and request bodies of the forum REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tidings::{Page, Vote};

use crate::chat::{RawConversation, RawMessage};
use crate::comment::RawComment;
use crate::notification::RawNotification;
use crate::post::RawPost;
use crate::{Normalize, UserId, decode_all};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub has_more: Option<bool>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A list response: entries under an endpoint-specific key, plus optional pagination.
pub trait Listing: for<'de> Deserialize<'de> {
    type Raw: Normalize;

    fn into_parts(self) -> (Vec<Value>, Option<Pagination>);

    /// Normalize the entries, dropping unusable ones, and keep the raw `hasMore`.
    fn into_page(self) -> Page<<Self::Raw as Normalize>::Output>
    where
        Self: Sized,
    {
        self.into_counted_page().0
    }

    /// [`Listing::into_page`] plus the number of entries the server sent, counted before
    /// unusable ones were dropped. Endpoints without pagination metadata derive `hasMore`
    /// from that count.
    fn into_counted_page(self) -> (Page<<Self::Raw as Normalize>::Output>, usize)
    where
        Self: Sized,
    {
        let (entries, pagination) = self.into_parts();
        let sent = entries.len();
        let has_more = pagination.and_then(|p| p.has_more);
        (Page::new(decode_all::<Self::Raw>(entries), has_more), sent)
    }
}

macro_rules! listing {
    ($name:ident, $field:ident, $raw:ty) => {
        #[derive(Clone, Debug, Default, Deserialize)]
        pub struct $name {
            #[serde(default)]
            pub $field: Vec<Value>,
            #[serde(default, deserialize_with = "crate::lenient")]
            pub pagination: Option<Pagination>,
        }

        impl Listing for $name {
            type Raw = $raw;

            fn into_parts(self) -> (Vec<Value>, Option<Pagination>) {
                (self.$field, self.pagination)
            }
        }
    };
}

listing!(PostsPage, posts, RawPost);
listing!(CommentsPage, comments, RawComment);
listing!(RepliesPage, replies, RawComment);
listing!(NotificationsPage, notifications, RawNotification);
listing!(MessagesPage, messages, RawMessage);
listing!(ConversationsList, conversations, RawConversation);

#[derive(Clone, Debug, Deserialize)]
pub struct PostEnvelope {
    pub post: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CommentEnvelope {
    pub comment: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageEnvelope {
    pub message: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConversationEnvelope {
    pub conversation: Value,
}

/// Filters of the posts listing. Unset fields are left out of the query string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_status_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl PostFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = (!text.trim().is_empty()).then(|| text.trim().to_string());
        self
    }

    pub fn status(mut self, status_id: i64) -> Self {
        self.post_status_id = Some(status_id);
        self
    }

    pub fn author(mut self, user: UserId) -> Self {
        self.user_id = Some(user);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VoteRequest {
    pub value: Vote,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpfulRequest {
    pub is_helpful: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenConversationRequest {
    pub user_id: UserId,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_posts_page_keeps_has_more_absent() {
        let page: PostsPage = serde_json::from_value(json!({
            "posts": [
                {"id": 1, "createdAt": "2025-04-02T12:30:00Z"},
                {"title": "no id"}
            ]
        }))
        .unwrap();
        let page = page.into_page();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.has_more, None);
    }

    #[test]
    fn test_missing_list_is_empty() {
        let page: NotificationsPage =
            serde_json::from_value(json!({"pagination": {"hasMore": true}})).unwrap();
        let page = page.into_page();
        assert!(page.items.is_empty());
        assert_eq!(page.has_more, Some(true));
    }

    #[test]
    fn test_filter_query_skips_unset() {
        let filter = PostFilter::default().search("  kaszel ").status(3);
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"search": "kaszel", "postStatusId": 3})
        );
        assert!(PostFilter::default().search("   ").is_empty());
    }

    #[test]
    fn test_request_bodies() {
        assert_eq!(
            serde_json::to_value(VoteRequest { value: Vote::Down }).unwrap(),
            json!({"value": -1})
        );
        assert_eq!(
            serde_json::to_value(HelpfulRequest { is_helpful: true }).unwrap(),
            json!({"isHelpful": true})
        );
        assert_eq!(
            serde_json::to_value(OpenConversationRequest { user_id: UserId(8) }).unwrap(),
            json!({"userId": 8})
        );
    }
}
