use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidings::FeedItem;

use crate::user::RawUser;
use crate::{Author, ConversationId, MessageId, Normalize, PayloadError, UserId};
use crate::{require_id, require_timestamp};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub conversation_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub sender_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient", alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub read: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: Option<ConversationId>,
    pub sender_id: Option<UserId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Message {
    pub fn is_from(&self, user: UserId) -> bool {
        self.sender_id == Some(user)
    }
}

impl Normalize for RawMessage {
    type Output = Message;
    const KIND: &'static str = "message";

    fn normalize(self) -> Result<Message, PayloadError> {
        let id = require_id(self.id, Self::KIND)?;
        let created_at = require_timestamp(self.created_at, Self::KIND, id)?;
        Ok(Message {
            id: MessageId(id),
            conversation_id: self.conversation_id.map(ConversationId),
            sender_id: self.sender_id.map(UserId),
            content: self.content.unwrap_or_default(),
            created_at,
            read: self.read.unwrap_or(false),
        })
    }
}

impl FeedItem for Message {
    type Id = MessageId;

    fn id(&self) -> &MessageId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn refresh_from(&mut self, newer: &Self) {
        // sticky, like a notification's read flag
        self.read |= newer.read;
        self.content = newer.content.clone();
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPreview {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConversation {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub user1_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub user2_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub user1: Option<RawUser>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub user2: Option<RawUser>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub messages: Option<Vec<RawPreview>>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub id: Option<UserId>,
    pub author: Option<Author>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: [Participant; 2],
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// The participant that isn't `me`, with a readable name even when the user object is missing.
    pub fn other_party(&self, me: UserId) -> Author {
        let [first, second] = &self.participants;
        let other = if first.id == Some(me) { second } else { first };
        match &other.author {
            Some(author) if author.username != Author::UNKNOWN_USERNAME => author.clone(),
            _ => Author {
                id: other.id,
                username: match other.id {
                    Some(id) => format!("user #{id}"),
                    None => Author::UNKNOWN_USERNAME.to_string(),
                },
                avatar: other.author.as_ref().and_then(|a| a.avatar.clone()),
            },
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.id == Some(user))
    }

    /// Bump the activity timestamp. Older timestamps are ignored.
    pub fn touch(&mut self, at: DateTime<Utc>, preview: Option<&str>) -> bool {
        if self.last_message_at.is_some_and(|last| last > at) {
            return false;
        }
        self.last_message_at = Some(at);
        if let Some(preview) = preview {
            self.last_message = Some(preview.to_string());
        }
        true
    }
}

impl Normalize for RawConversation {
    type Output = Conversation;
    const KIND: &'static str = "conversation";

    fn normalize(self) -> Result<Conversation, PayloadError> {
        let id = require_id(self.id, Self::KIND)?;
        let participant = |id: Option<i64>, user: Option<RawUser>| Participant {
            id: id.or_else(|| user.as_ref().and_then(|u| u.id)).map(UserId),
            author: user.map(|u| Author::from_raw(Some(u))),
        };
        Ok(Conversation {
            id: ConversationId(id),
            participants: [
                participant(self.user1_id, self.user1),
                participant(self.user2_id, self.user2),
            ],
            last_message: self
                .messages
                .and_then(|messages| messages.into_iter().next())
                .and_then(|preview| preview.content),
            last_message_at: self.last_message_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use serde_json::json;

    #[test]
    fn test_other_party_fallback_name() {
        let conversation = decode::<RawConversation>(json!({
            "id": 5,
            "user1Id": 1,
            "user2Id": 2,
            "user1": {"id": 1, "username": "me"},
            "messages": [{"content": "cześć"}],
            "lastMessageAt": "2025-04-02T12:30:00Z"
        }))
        .unwrap();
        assert_eq!(conversation.other_party(UserId(1)).username, "user #2");
        assert_eq!(conversation.other_party(UserId(2)).username, "me");
        assert_eq!(conversation.last_message.as_deref(), Some("cześć"));
        assert!(conversation.involves(UserId(2)));
    }

    #[test]
    fn test_touch_only_moves_forward() {
        let mut conversation = decode::<RawConversation>(json!({
            "id": 5,
            "lastMessageAt": "2025-04-02T12:30:00Z"
        }))
        .unwrap();
        let earlier = "2025-04-02T12:00:00Z".parse().unwrap();
        let later = "2025-04-02T13:00:00Z".parse().unwrap();
        assert!(!conversation.touch(earlier, Some("stare")));
        assert!(conversation.touch(later, Some("nowe")));
        assert_eq!(conversation.last_message_at, Some(later));
        assert_eq!(conversation.last_message.as_deref(), Some("nowe"));
    }

    #[test]
    fn test_message_requires_timestamp() {
        let err = decode::<RawMessage>(json!({"id": 9, "content": "hej"})).unwrap_err();
        assert!(matches!(err, PayloadError::MissingTimestamp { kind: "message", id: 9 }));
        let message = decode::<RawMessage>(json!({
            "id": 9, "conversationId": 5, "senderId": 1, "createdAt": "2025-04-02T12:30:00Z"
        }))
        .unwrap();
        assert!(message.is_from(UserId(1)));
    }
}
