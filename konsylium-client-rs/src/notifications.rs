//! One notification stream, two views: chat notifications feed the unread badges of
//! conversations, everything else goes to the bell.

use std::rc::Rc;

use chrono::{DateTime, Utc};
use forum_types::notification::RawNotification;
use forum_types::{ConversationId, Notification, NotificationId, decode};
use futures::future::join_all;
use serde_json::Value;
use tidings::{
    Connection, Feed, FeedError, FetchOutcome, LiveEvent, MutationOutcome, Page, PageSource,
    PaginationState, Subscription,
};

use crate::ClientError;
use crate::api::ForumApi;
use crate::pager::{Pager, Undo};

pub const NOTIFICATION: &str = "notification";

struct NotificationsSource<'a, A> {
    api: &'a A,
    limit: usize,
}

impl<A: ForumApi> PageSource<Notification> for NotificationsSource<'_, A> {
    type Error = ClientError;

    async fn fetch_page(
        &self,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Page<Notification>, ClientError> {
        self.api.fetch_notifications(cursor, self.limit).await
    }
}

/// Result of a bulk mark-as-read. Failed ids are unread again.
#[derive(Debug, Default)]
pub struct MarkReadReport {
    pub marked: Vec<NotificationId>,
    pub rolled_back: Vec<(NotificationId, ClientError)>,
}

impl MarkReadReport {
    pub fn is_complete(&self) -> bool {
        self.rolled_back.is_empty()
    }
}

pub struct NotificationCenter<A: ForumApi> {
    api: Rc<A>,
    limit: usize,
    pager: Pager<Notification>,
    subscription: Option<Subscription>,
}

impl<A: ForumApi> NotificationCenter<A> {
    pub fn new(api: Rc<A>, limit: usize) -> Self {
        Self {
            api,
            limit: limit.max(1),
            pager: Pager::new(Feed::newest_first()),
            subscription: None,
        }
    }

    pub fn attach(api: Rc<A>, limit: usize, connection: &Rc<Connection>) -> Self {
        let mut center = Self::new(api, limit);
        center.subscription = Some(Feed::follow(
            center.pager.feed(),
            connection,
            NOTIFICATION,
            |payload: Value| {
                decode::<RawNotification>(payload)
                    .inspect_err(|e| log::warn!("Ignoring live notification: {e}"))
                    .ok()
                    .map(LiveEvent::Created)
            },
        ));
        center
    }

    pub fn state(&self) -> PaginationState<Notification> {
        self.pager.state()
    }

    pub async fn load_more(&self) -> Result<FetchOutcome, FeedError<ClientError>> {
        let source = NotificationsSource {
            api: &*self.api,
            limit: self.limit,
        };
        self.pager.fetch_next(&source).await
    }

    pub async fn reload(&self) -> Result<FetchOutcome, FeedError<ClientError>> {
        self.pager.reset();
        self.load_more().await
    }

    fn collect(&self, keep: impl Fn(&Notification) -> bool) -> Vec<Notification> {
        self.pager
            .feed()
            .borrow()
            .iter()
            .filter(|n| keep(n))
            .cloned()
            .collect()
    }

    /// What the bell shows: everything except chat.
    pub fn general(&self) -> Vec<Notification> {
        self.collect(|n| !n.is_chat())
    }

    pub fn chat(&self) -> Vec<Notification> {
        self.collect(Notification::is_chat)
    }

    pub fn unread_general(&self) -> usize {
        self.collect(|n| !n.is_chat() && !n.read).len()
    }

    pub fn unread_chat(&self) -> usize {
        self.collect(|n| n.is_chat() && !n.read).len()
    }

    pub fn unread_for_conversation(&self, conversation: ConversationId) -> Vec<Notification> {
        self.collect(|n| n.is_chat() && !n.read && n.conversation_id() == Some(conversation))
    }

    pub async fn mark_read(&self, id: NotificationId) -> MutationOutcome<ClientError> {
        {
            let mut feed = self.pager.feed().borrow_mut();
            if !feed.get(&id).is_some_and(|n| !n.read) {
                return MutationOutcome::Rejected;
            }
            feed.update_with(&id, |n| n.read = true);
        }
        let undo = self.mark_unread_on_drop(vec![id]);
        let result = self.api.mark_notification_read(id).await;
        undo.disarm();
        match result {
            Ok(()) => MutationOutcome::Applied,
            Err(e) => {
                log::warn!("Marking notification {id} read failed: {e}");
                self.pager.feed().borrow_mut().update_with(&id, |n| n.read = false);
                MutationOutcome::RolledBack(e)
            }
        }
    }

    /// Bell "mark all as read". Chat notifications are left alone.
    pub async fn mark_all_read(&self) -> MarkReadReport {
        self.mark_many(|n| !n.is_chat()).await
    }

    /// Opening a conversation clears its chat notifications and nothing else.
    pub async fn mark_conversation_read(&self, conversation: ConversationId) -> MarkReadReport {
        self.mark_many(|n| n.is_chat() && n.conversation_id() == Some(conversation))
            .await
    }

    async fn mark_many(&self, matches: impl Fn(&Notification) -> bool) -> MarkReadReport {
        let ids = self
            .pager
            .feed()
            .borrow_mut()
            .update_matching(|n| !n.read && matches(n), |n| n.read = true);
        if ids.is_empty() {
            return MarkReadReport::default();
        }

        let undo = self.mark_unread_on_drop(ids.clone());
        let api = &*self.api;
        let results = join_all(ids.iter().map(|id| api.mark_notification_read(*id))).await;
        undo.disarm();

        let mut report = MarkReadReport::default();
        let mut feed = self.pager.feed().borrow_mut();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(()) => report.marked.push(id),
                Err(e) => {
                    feed.update_with(&id, |n| n.read = false);
                    report.rolled_back.push((id, e));
                }
            }
        }
        if !report.is_complete() {
            log::warn!(
                "{} of {} notifications could not be marked read",
                report.rolled_back.len(),
                report.rolled_back.len() + report.marked.len()
            );
        }
        report
    }

    fn mark_unread_on_drop(&self, ids: Vec<NotificationId>) -> Undo<impl FnOnce()> {
        let feed = Rc::clone(self.pager.feed());
        Undo::new(move || match feed.try_borrow_mut() {
            Ok(mut feed) => {
                for id in &ids {
                    feed.update_with(id, |n| n.read = false);
                }
            }
            Err(_) => log::warn!("Cancelled mark-read could not restore {} notifications", ids.len()),
        })
    }
}
