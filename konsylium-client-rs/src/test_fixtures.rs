use chrono::{DateTime, TimeZone, Utc};
use forum_types::chat::{RawConversation, RawMessage};
use forum_types::comment::RawComment;
use forum_types::notification::RawNotification;
use forum_types::post::RawPost;
use forum_types::{Comment, Conversation, Message, Notification, Post, decode};
use serde_json::{Value, json};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_740_000_000 + secs, 0).unwrap()
}

pub fn post(id: i64, secs: i64, title: &str) -> Post {
    decode::<RawPost>(json!({
        "id": id,
        "title": title,
        "createdAt": at(secs),
        "users": {"id": 1, "username": "autor"},
        "post_votes": [],
    }))
    .unwrap()
}

pub fn comment(id: i64, post: i64, parent: Option<i64>, secs: i64) -> Comment {
    decode::<RawComment>(comment_json(id, post, parent, secs)).unwrap()
}

pub fn comment_json(id: i64, post: i64, parent: Option<i64>, secs: i64) -> Value {
    json!({
        "id": id,
        "postId": post,
        "commentId": parent,
        "content": format!("comment {id}"),
        "createdAt": at(secs),
        "users": {"id": 2, "username": "lekarz"},
    })
}

pub fn notification(id: i64, kind: &str, secs: i64, conversation: Option<i64>) -> Notification {
    decode::<RawNotification>(notification_json(id, kind, secs, conversation)).unwrap()
}

pub fn notification_json(id: i64, kind: &str, secs: i64, conversation: Option<i64>) -> Value {
    json!({
        "id": id,
        "type": kind,
        "createdAt": at(secs),
        "read": false,
        "metadata": {"username": "anna", "postId": 1, "conversationId": conversation},
    })
}

pub fn message(id: i64, conversation: i64, secs: i64) -> Message {
    decode::<RawMessage>(message_json(id, conversation, secs)).unwrap()
}

pub fn message_json(id: i64, conversation: i64, secs: i64) -> Value {
    json!({
        "id": id,
        "conversationId": conversation,
        "senderId": 1,
        "content": format!("message {id}"),
        "createdAt": at(secs),
    })
}

pub fn conversation(id: i64, with: i64, last: Option<i64>) -> Conversation {
    decode::<RawConversation>(json!({
        "id": id,
        "user1Id": 1,
        "user2Id": with,
        "lastMessageAt": last.map(at),
    }))
    .unwrap()
}
