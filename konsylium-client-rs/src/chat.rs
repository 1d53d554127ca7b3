//! Direct messages: the conversation list and the transcript of the selected conversation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use forum_types::chat::RawMessage;
use forum_types::{Conversation, ConversationId, Message, MessageId, UserId, decode};
use serde::Deserialize;
use serde_json::Value;
use tidings::{
    Connection, Feed, FeedError, FetchOutcome, LiveEvent, MutationOutcome, Page, PageSource,
    PaginationState, ScrollAnchor, ScrollMetrics, ScrollTrigger, Subscription,
};

use crate::ClientError;
use crate::api::ForumApi;
use crate::pager::Pager;

pub const CHAT_MESSAGE: &str = "chatMessage";
pub const CHAT_DELETE: &str = "chatDelete";

#[derive(Debug, Deserialize)]
struct DeletedMessage {
    id: MessageId,
}

fn decode_live_message(payload: Value) -> Option<Message> {
    decode::<RawMessage>(payload)
        .inspect_err(|e| log::warn!("Ignoring live chat message: {e}"))
        .ok()
}

/// Most recently active first; conversations without messages go last.
fn sort_by_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
}

pub struct ConversationList<A: ForumApi> {
    api: Rc<A>,
    conversations: Rc<RefCell<Vec<Conversation>>>,
    error: RefCell<Option<String>>,
    subscription: Option<Subscription>,
}

impl<A: ForumApi> ConversationList<A> {
    pub fn new(api: Rc<A>) -> Self {
        Self {
            api,
            conversations: Rc::default(),
            error: RefCell::new(None),
            subscription: None,
        }
    }

    /// Keep `lastMessageAt` current from the `/chat` connection.
    pub fn attach(api: Rc<A>, connection: &Rc<Connection>) -> Self {
        let mut list = Self::new(api);
        let conversations = Rc::downgrade(&list.conversations);
        list.subscription = Some(connection.subscribe_as(CHAT_MESSAGE, move |payload: Value| {
            let Some(message) = decode_live_message(payload) else {
                return;
            };
            let Some(conversations) = conversations.upgrade() else {
                return;
            };
            let Ok(mut conversations) = conversations.try_borrow_mut() else {
                log::error!("Conversation list busy; activity bump dropped");
                return;
            };
            let touched = conversations
                .iter_mut()
                .filter(|c| Some(c.id) == message.conversation_id)
                .any(|c| c.touch(message.created_at, Some(&message.content)));
            if touched {
                sort_by_activity(&mut conversations);
            }
        }));
        list
    }

    pub fn items(&self) -> Vec<Conversation> {
        self.conversations.borrow().clone()
    }

    pub fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations
            .borrow()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub async fn load(&self) -> Result<usize, ClientError> {
        let mut fetched = self
            .api
            .fetch_conversations()
            .await
            .inspect_err(|e| *self.error.borrow_mut() = Some(e.to_string()))?;
        sort_by_activity(&mut fetched);
        let count = fetched.len();
        *self.conversations.borrow_mut() = fetched;
        *self.error.borrow_mut() = None;
        Ok(count)
    }

    /// Start (or reopen) a conversation with `user`.
    pub async fn open_with(&self, user: UserId) -> Result<Conversation, ClientError> {
        let conversation = self.api.open_conversation(user).await?;
        let mut conversations = self.conversations.borrow_mut();
        if !conversations.iter().any(|c| c.id == conversation.id) {
            conversations.push(conversation.clone());
            sort_by_activity(&mut conversations);
        }
        Ok(conversation)
    }
}

struct MessagesSource<'a, A> {
    api: &'a A,
    conversation: ConversationId,
    page_size: usize,
}

impl<A: ForumApi> PageSource<Message> for MessagesSource<'_, A> {
    type Error = ClientError;

    async fn fetch_page(&self, cursor: Option<DateTime<Utc>>) -> Result<Page<Message>, ClientError> {
        let mut page = self
            .api
            .fetch_messages(self.conversation, cursor, self.page_size)
            .await?;
        page.items.reverse();
        Ok(page)
    }
}

/// Transcript of the selected conversation, oldest at the top. Scrolling up loads older pages.
pub struct MessageThread<A: ForumApi> {
    api: Rc<A>,
    page_size: usize,
    selected: Rc<Cell<Option<ConversationId>>>,
    pager: Pager<Message>,
    subscriptions: Vec<Subscription>,
}

impl<A: ForumApi> MessageThread<A> {
    pub fn new(api: Rc<A>, page_size: usize) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            selected: Rc::new(Cell::new(None)),
            pager: Pager::new(Feed::oldest_first()),
            subscriptions: Vec::new(),
        }
    }

    pub fn attach(api: Rc<A>, page_size: usize, connection: &Rc<Connection>) -> Self {
        let mut thread = Self::new(api, page_size);
        let selected = Rc::clone(&thread.selected);
        thread.subscriptions = vec![
            Feed::follow(thread.pager.feed(), connection, CHAT_MESSAGE, move |payload: Value| {
                let message = decode_live_message(payload)?;
                let current = selected.get()?;
                (message.conversation_id == Some(current)).then_some(LiveEvent::Created(message))
            }),
            Feed::follow(
                thread.pager.feed(),
                connection,
                CHAT_DELETE,
                |deleted: DeletedMessage| Some(LiveEvent::Deleted(deleted.id)),
            ),
        ];
        thread
    }

    pub fn selected(&self) -> Option<ConversationId> {
        self.selected.get()
    }

    pub fn state(&self) -> PaginationState<Message> {
        self.pager.state()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.pager.items().into_iter().collect()
    }

    /// Switch to `conversation` and load its newest page.
    pub async fn select(
        &self,
        conversation: ConversationId,
    ) -> Result<FetchOutcome, FeedError<ClientError>> {
        self.selected.set(Some(conversation));
        self.pager.reset();
        self.load_older().await
    }

    pub async fn load_older(&self) -> Result<FetchOutcome, FeedError<ClientError>> {
        let Some(conversation) = self.selected.get() else {
            return Ok(FetchOutcome::Skipped);
        };
        let source = MessagesSource {
            api: &*self.api,
            conversation,
            page_size: self.page_size,
        };
        self.pager.fetch_next(&source).await
    }

    /// Like [`Self::load_older`], but hands back the anchor that keeps the viewport still once
    /// the taller transcript is laid out.
    pub async fn load_older_anchored(
        &self,
        scroll_height: f64,
    ) -> Result<(FetchOutcome, ScrollAnchor), FeedError<ClientError>> {
        let anchor = ScrollAnchor::capture(scroll_height);
        let outcome = self.load_older().await?;
        Ok((outcome, anchor))
    }

    /// Feed a settled scroll position to `trigger` (see
    /// [`ClientConfig::transcript_scroll_trigger`](crate::ClientConfig::transcript_scroll_trigger))
    /// and load the previous page when the viewport is near the top.
    pub async fn on_scroll(
        &self,
        trigger: &mut ScrollTrigger,
        now: Instant,
        metrics: ScrollMetrics,
    ) -> Result<Option<(FetchOutcome, ScrollAnchor)>, FeedError<ClientError>> {
        if !trigger.poll(now, metrics, self.state().is_loading) {
            return Ok(None);
        }
        self.load_older_anchored(metrics.content_height).await.map(Some)
    }

    /// Returns `false` without calling the server when there is nothing to send.
    /// The message itself shows up through the live channel.
    pub async fn send(&self, content: &str) -> Result<bool, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(false);
        }
        let Some(conversation) = self.selected.get() else {
            log::debug!("No conversation selected; message not sent");
            return Ok(false);
        };
        self.api.send_message(conversation, content).await?;
        Ok(true)
    }

    pub async fn delete(&self, id: MessageId) -> MutationOutcome<ClientError> {
        let api = &*self.api;
        self.pager
            .remove_optimistic(&id, || api.delete_message(id))
            .await
    }

    pub fn close(&mut self) {
        self.subscriptions.clear();
        self.selected.set(None);
        self.pager.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryForum;
    use crate::test_fixtures::{at, conversation, message, message_json};
    use serde_json::json;
    use tidings::MemoryTransport;

    fn chat_connection() -> Rc<Connection> {
        Connection::new("/chat", Box::new(MemoryTransport::new()))
    }

    fn ids(thread: &MessageThread<MemoryForum>) -> Vec<i64> {
        thread.messages().iter().map(|m| m.id.0).collect()
    }

    #[tokio::test]
    async fn test_transcript_pages_backwards() {
        let forum = MemoryForum::new();
        for id in 1..=20 {
            forum.add_message(message(id, 5, id * 10));
        }
        let thread = MessageThread::attach(Rc::new(forum), 15, &chat_connection());

        thread.select(ConversationId(5)).await.unwrap();
        assert_eq!(ids(&thread), (6..=20).collect::<Vec<_>>());
        assert!(thread.state().has_more);

        let (_, anchor) = thread.load_older_anchored(1200.0).await.unwrap();
        assert_eq!(ids(&thread), (1..=20).collect::<Vec<_>>());
        assert!(!thread.state().has_more);
        assert_eq!(anchor.restore(1500.0, 0.0), 300.0);
    }

    #[tokio::test]
    async fn test_scrolling_to_top_loads_older_page() {
        let forum = MemoryForum::new();
        for id in 1..=20 {
            forum.add_message(message(id, 5, id * 10));
        }
        let thread = MessageThread::new(Rc::new(forum), 15);
        thread.select(ConversationId(5)).await.unwrap();

        let mut trigger = crate::ClientConfig::default().transcript_scroll_trigger();
        let start = Instant::now();
        let settled = start + std::time::Duration::from_millis(60);
        let reading = ScrollMetrics {
            viewport_height: 600.0,
            scroll_top: 900.0,
            content_height: 1500.0,
        };
        trigger.on_scroll(start);
        assert!(thread.on_scroll(&mut trigger, settled, reading).await.unwrap().is_none());
        assert_eq!(thread.messages().len(), 15);

        let top = ScrollMetrics {
            scroll_top: 40.0,
            ..reading
        };
        trigger.on_scroll(start);
        let (outcome, anchor) = thread
            .on_scroll(&mut trigger, settled, top)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Applied { added: 5, .. }));
        assert_eq!(thread.messages().len(), 20);
        assert_eq!(anchor.restore(1800.0, 40.0), 340.0);
    }

    #[tokio::test]
    async fn test_live_messages_for_selected_conversation_only() {
        let forum = MemoryForum::new();
        forum.add_message(message(1, 5, 10));
        let connection = chat_connection();
        let thread = MessageThread::attach(Rc::new(forum), 15, &connection);

        connection.dispatch(CHAT_MESSAGE, &message_json(2, 5, 20));
        assert!(thread.messages().is_empty());

        thread.select(ConversationId(5)).await.unwrap();
        connection.dispatch(CHAT_MESSAGE, &message_json(2, 5, 20));
        connection.dispatch(CHAT_MESSAGE, &message_json(2, 5, 20));
        connection.dispatch(CHAT_MESSAGE, &message_json(3, 6, 30));
        assert_eq!(ids(&thread), vec![1, 2]);

        connection.dispatch(CHAT_DELETE, &json!({"id": 1}));
        assert_eq!(ids(&thread), vec![2]);
    }

    #[tokio::test]
    async fn test_send_trims_and_rejects_blank() {
        let api = Rc::new(MemoryForum::new());
        let thread = MessageThread::new(Rc::clone(&api), 15);
        assert!(!thread.send("hej").await.unwrap());

        thread.select(ConversationId(5)).await.unwrap();
        assert!(!thread.send("   \n").await.unwrap());
        assert!(thread.send("  dzień dobry ").await.unwrap());
        assert_eq!(api.messages_in(ConversationId(5))[0].content, "dzień dobry");
    }

    #[tokio::test]
    async fn test_failed_delete_restores_message() {
        let forum = MemoryForum::new();
        forum.add_message(message(1, 5, 10));
        forum.add_message(message(2, 5, 20));
        forum.fail_on("DELETE /messages/1");
        let thread = MessageThread::new(Rc::new(forum), 15);
        thread.select(ConversationId(5)).await.unwrap();

        assert!(matches!(thread.delete(MessageId(1)).await, MutationOutcome::RolledBack(_)));
        assert_eq!(ids(&thread), vec![1, 2]);
        assert!(thread.delete(MessageId(2)).await.is_applied());
        assert_eq!(ids(&thread), vec![1]);
    }

    #[tokio::test]
    async fn test_conversation_activity_reorders_list() {
        let forum = MemoryForum::new();
        forum.add_conversation(conversation(1, 2, Some(10)));
        forum.add_conversation(conversation(2, 3, None));
        forum.add_conversation(conversation(3, 4, Some(20)));
        let connection = chat_connection();
        let list = ConversationList::attach(Rc::new(forum), &connection);

        assert_eq!(list.load().await.unwrap(), 3);
        let order = |list: &ConversationList<MemoryForum>| {
            list.items().iter().map(|c| c.id.0).collect::<Vec<_>>()
        };
        assert_eq!(order(&list), vec![3, 1, 2]);

        connection.dispatch(CHAT_MESSAGE, &message_json(9, 2, 30));
        assert_eq!(order(&list), vec![2, 3, 1]);
        assert_eq!(list.get(ConversationId(2)).unwrap().last_message_at, Some(at(30)));
    }

    #[tokio::test]
    async fn test_open_with_reuses_existing() {
        let forum = MemoryForum::new().signed_in_as(UserId(1));
        forum.add_conversation(conversation(1, 2, Some(10)));
        let list = ConversationList::new(Rc::new(forum));
        list.load().await.unwrap();

        assert_eq!(list.open_with(UserId(2)).await.unwrap().id, ConversationId(1));
        let fresh = list.open_with(UserId(7)).await.unwrap();
        assert_eq!(list.items().len(), 2);
        assert_eq!(fresh.other_party(UserId(1)).username, "user #7");
    }
}
