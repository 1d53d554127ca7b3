//! # Feed
//! A feed is one ordered, deduplicated list that is filled from two directions at once:
//! pages pulled from a REST endpoint (older entries, one cursor step at a time) and
//! events pushed over a live channel (usually newer entries, or edits and deletions of
//! entries we already hold).

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use im::Vector;
use serde::de::DeserializeOwned;

use crate::live::{Connection, Subscription};
use crate::{Cancellable, FeedItem};

/// Display order of a feed. Posts and notifications are newest first, chat transcripts oldest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Order {
    NewestFirst,
    OldestFirst,
}

impl Order {
    /// Whether an entry created at `a` is displayed strictly before one created at `b`.
    fn precedes(self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        match self {
            Order::NewestFirst => a > b,
            Order::OldestFirst => a < b,
        }
    }
}

/// One page as returned by a [`PageSource`].
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when the endpoint sent no pagination metadata.
    pub has_more: Option<bool>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: Option<bool>) -> Self {
        Self { items, has_more }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LiveEvent<T: FeedItem> {
    Created(T),
    Updated(T),
    Deleted(T::Id),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { added: usize, duplicates: usize },
    /// A fetch was already in flight, or the feed is exhausted.
    Skipped,
    /// The feed was reset or closed while the request was outstanding.
    Stale,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError<E: std::error::Error + 'static> {
    #[error("page fetch failed")]
    Source(#[source] E),
}

/// Snapshot of a feed for the presentation layer. Cloning the items is cheap.
#[derive(Clone, Debug)]
pub struct PaginationState<T: Clone> {
    pub items: Vector<T>,
    pub has_more: bool,
    pub is_loading: bool,
    pub cursor: Option<DateTime<Utc>>,
}

/// A fetch begun on a shared feed. Dropping it without calling [`FetchGuard::finish`]
/// (the request future was dropped) puts the feed back to idle.
#[derive(Debug)]
pub struct FetchGuard<'a, T: FeedItem> {
    feed: &'a RefCell<Feed<T>>,
    ticket: FetchTicket,
    done: bool,
}

impl<'a, T: FeedItem> FetchGuard<'a, T> {
    pub fn begin(feed: &'a RefCell<Feed<T>>) -> Option<Self> {
        let ticket = feed.borrow_mut().begin_fetch()?;
        Some(Self {
            feed,
            ticket,
            done: false,
        })
    }

    pub fn ticket(&self) -> FetchTicket {
        self.ticket
    }

    pub fn finish<E>(mut self, result: Result<Page<T>, E>) -> Result<FetchOutcome, FeedError<E>>
    where
        E: Cancellable + std::error::Error + 'static,
    {
        self.done = true;
        self.feed.borrow_mut().finish_fetch(self.ticket, result)
    }
}

impl<T: FeedItem> Drop for FetchGuard<'_, T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        match self.feed.try_borrow_mut() {
            Ok(mut feed) => feed.abandon_fetch(self.ticket),
            Err(_) => log::warn!("Page fetch dropped while its feed was borrowed"),
        }
    }
}

/// Issued by [`Feed::begin_fetch`] and handed back to [`Feed::finish_fetch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    cursor: Option<DateTime<Utc>>,
}

impl FetchTicket {
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }
}

#[allow(async_fn_in_trait)]
pub trait PageSource<T: FeedItem> {
    type Error: Cancellable + std::error::Error + 'static;

    /// Fetch the page that follows `cursor`. A `None` cursor means "from the beginning".
    async fn fetch_page(&self, cursor: Option<DateTime<Utc>>) -> Result<Page<T>, Self::Error>;
}

#[derive(Clone, Debug)]
pub struct Feed<T: FeedItem> {
    order: Order,
    items: Vector<T>,
    ids: HashSet<T::Id>,
    has_more: bool,
    loading: bool,
    cursor: Option<DateTime<Utc>>,
    generation: u64,
    error: Option<String>,
}

impl<T: FeedItem> Feed<T> {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            items: Vector::new(),
            ids: HashSet::new(),
            has_more: true,
            loading: false,
            cursor: None,
            generation: 0,
            error: None,
        }
    }

    pub fn newest_first() -> Self {
        Self::new(Order::NewestFirst)
    }

    pub fn oldest_first() -> Self {
        Self::new(Order::OldestFirst)
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn items(&self) -> &Vector<T> {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    /// Message of the last failed fetch, cleared by the next successful one.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.position(id).and_then(|index| self.items.get(index))
    }

    pub fn position(&self, id: &T::Id) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn state(&self) -> PaginationState<T> {
        PaginationState {
            items: self.items.clone(),
            has_more: self.has_more,
            is_loading: self.loading,
            cursor: self.cursor,
        }
    }

    /// Start over from the newest page. Any fetch still in flight is orphaned.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.items.clear();
        self.ids.clear();
        self.has_more = true;
        self.loading = false;
        self.cursor = None;
        self.error = None;
    }

    /// Teardown: orphan in-flight fetches and refuse new ones. Items stay readable.
    pub fn close(&mut self) {
        log::debug!("Closing feed at generation {}", self.generation);
        self.generation += 1;
        self.loading = false;
        self.has_more = false;
    }

    /// Returns `None` if a fetch is already in flight or there is nothing more to fetch.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        if self.loading || !self.has_more {
            return None;
        }
        self.loading = true;
        Some(FetchTicket {
            generation: self.generation,
            cursor: self.cursor,
        })
    }

    /// The fetch for `ticket` went away without a result. Unlocks the feed if the
    /// ticket is still current.
    pub fn abandon_fetch(&mut self, ticket: FetchTicket) {
        if ticket.generation == self.generation {
            log::debug!("Page fetch abandoned at generation {}", self.generation);
            self.loading = false;
        }
    }

    pub fn finish_fetch<E>(
        &mut self,
        ticket: FetchTicket,
        result: Result<Page<T>, E>,
    ) -> Result<FetchOutcome, FeedError<E>>
    where
        E: Cancellable + std::error::Error + 'static,
    {
        if ticket.generation != self.generation {
            log::debug!(
                "Dropping page fetched for generation {} (feed is at {})",
                ticket.generation,
                self.generation
            );
            return Ok(FetchOutcome::Stale);
        }
        self.loading = false;

        match result {
            Ok(page) => Ok(self.apply_page(page)),
            Err(e) if e.is_cancelled() => {
                log::debug!("Page fetch cancelled: {e}");
                Ok(FetchOutcome::Cancelled)
            }
            Err(e) => {
                log::warn!("Page fetch failed: {e}");
                self.error = Some(e.to_string());
                Err(FeedError::Source(e))
            }
        }
    }

    /// Fetch and merge the next page.
    // never hold a borrow across an .await: the live channel may need the feed while the request is out
    pub async fn fetch_next<S>(
        feed: &RefCell<Self>,
        source: &S,
    ) -> Result<FetchOutcome, FeedError<S::Error>>
    where
        S: PageSource<T>,
    {
        let Some(fetch) = FetchGuard::begin(feed) else {
            return Ok(FetchOutcome::Skipped);
        };
        let result = source.fetch_page(fetch.ticket().cursor).await;
        fetch.finish(result)
    }

    /// Reset, then fetch the first page.
    pub async fn reload<S>(feed: &RefCell<Self>, source: &S) -> Result<FetchOutcome, FeedError<S::Error>>
    where
        S: PageSource<T>,
    {
        feed.borrow_mut().reset();
        Self::fetch_next(feed, source).await
    }

    fn apply_page(&mut self, page: Page<T>) -> FetchOutcome {
        let Page { items, has_more } = page;
        let returned = items.len();

        // Build the merged list aside and swap it in, so a batch lands whole or not at all.
        let mut merged = self.items.clone();
        let mut ids = self.ids.clone();
        let mut added = 0;
        for item in items {
            if !ids.insert(item.id().clone()) {
                continue;
            }
            let index = insertion_index(self.order, &merged, item.created_at());
            merged.insert(index, item);
            added += 1;
        }

        let previous_cursor = self.cursor;
        self.items = merged;
        self.ids = ids;
        self.cursor = self.oldest_timestamp();
        self.error = None;

        self.has_more = if returned == 0 {
            false
        } else if added == 0 && self.cursor == previous_cursor {
            log::warn!("Page of {returned} items added nothing and did not move the cursor; stopping");
            false
        } else {
            has_more.unwrap_or(true)
        };

        FetchOutcome::Applied {
            added,
            duplicates: returned - added,
        }
    }

    fn oldest_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.order {
            Order::NewestFirst => self.items.back(),
            Order::OldestFirst => self.items.front(),
        }
        .map(FeedItem::created_at)
    }

    /// Apply a push event. Returns whether the list changed.
    pub fn merge_live(&mut self, event: LiveEvent<T>) -> bool {
        match event {
            LiveEvent::Created(item) => self.insert(item),
            LiveEvent::Updated(item) => self.refresh(&item),
            LiveEvent::Deleted(id) => self.remove(&id).is_some(),
        }
    }

    /// Insert at the sorted position unless the id is already present.
    pub fn insert(&mut self, item: T) -> bool {
        if !self.ids.insert(item.id().clone()) {
            return false;
        }
        let index = insertion_index(self.order, &self.items, item.created_at());
        self.items.insert(index, item);
        true
    }

    /// Patch an entry we hold from a newer copy of it; no-op if we don't hold it.
    pub fn refresh(&mut self, newer: &T) -> bool {
        self.update_with(newer.id(), |item| item.refresh_from(newer))
    }

    /// `f` must not change the id or the creation timestamp.
    pub fn update_with(&mut self, id: &T::Id, f: impl FnOnce(&mut T)) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        match self.items.get_mut(index) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        }
    }

    /// Update every entry matching `matches`, returning the ids that were touched.
    pub fn update_matching(
        &mut self,
        mut matches: impl FnMut(&T) -> bool,
        mut f: impl FnMut(&mut T),
    ) -> Vec<T::Id> {
        let mut touched = Vec::new();
        for item in self.items.iter_mut() {
            if matches(item) {
                f(item);
                touched.push(item.id().clone());
            }
        }
        touched
    }

    pub fn remove(&mut self, id: &T::Id) -> Option<T> {
        let index = self.position(id)?;
        self.ids.remove(id);
        Some(self.items.remove(index))
    }
}

impl<T: FeedItem + 'static> Feed<T> {
    /// Merge `event` frames from `connection` into `feed` for as long as the returned
    /// subscription lives. `translate` decides which payloads concern this feed.
    pub fn follow<P: DeserializeOwned>(
        feed: &Rc<RefCell<Self>>,
        connection: &Rc<Connection>,
        event: &str,
        translate: impl Fn(P) -> Option<LiveEvent<T>> + 'static,
    ) -> Subscription {
        let feed = Rc::downgrade(feed);
        connection.subscribe_as(event, move |payload: P| {
            let Some(feed) = feed.upgrade() else {
                return;
            };
            let Some(event) = translate(payload) else {
                return;
            };
            match feed.try_borrow_mut() {
                Ok(mut feed) => {
                    feed.merge_live(event);
                }
                Err(_) => log::error!("Feed busy while a live event arrived; event dropped"),
            }
        })
    }
}

/// Ties keep arrival order: a new entry goes after existing entries with the same timestamp.
fn insertion_index<T: FeedItem>(order: Order, items: &Vector<T>, at: DateTime<Utc>) -> usize {
    // Pages usually extend the tail.
    if items
        .back()
        .is_none_or(|last| !order.precedes(at, last.created_at()))
    {
        return items.len();
    }
    items
        .iter()
        .position(|existing| order.precedes(at, existing.created_at()))
        .unwrap_or(items.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::channel::oneshot;
    use futures::executor::block_on;
    use std::collections::VecDeque;

    #[derive(Clone, Debug, PartialEq)]
    struct Entry {
        id: u32,
        at: DateTime<Utc>,
        votes: i64,
    }

    fn entry(id: u32, secs: i64) -> Entry {
        Entry {
            id,
            at: Utc.timestamp_opt(secs, 0).unwrap(),
            votes: 0,
        }
    }

    impl FeedItem for Entry {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.at
        }

        fn refresh_from(&mut self, newer: &Self) {
            self.votes = newer.votes;
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct SourceError {
        message: String,
        cancelled: bool,
    }

    impl SourceError {
        fn failed() -> Self {
            Self {
                message: "server said no".to_string(),
                cancelled: false,
            }
        }

        fn cancelled() -> Self {
            Self {
                message: "request aborted".to_string(),
                cancelled: true,
            }
        }
    }

    impl Cancellable for SourceError {
        fn is_cancelled(&self) -> bool {
            self.cancelled
        }
    }

    #[derive(Default)]
    struct Scripted {
        pages: RefCell<VecDeque<Result<Page<Entry>, SourceError>>>,
        cursors: RefCell<Vec<Option<DateTime<Utc>>>>,
    }

    impl Scripted {
        fn new(pages: Vec<Result<Page<Entry>, SourceError>>) -> Self {
            Self {
                pages: RefCell::new(pages.into()),
                cursors: RefCell::default(),
            }
        }
    }

    impl PageSource<Entry> for Scripted {
        type Error = SourceError;

        async fn fetch_page(
            &self,
            cursor: Option<DateTime<Utc>>,
        ) -> Result<Page<Entry>, SourceError> {
            self.cursors.borrow_mut().push(cursor);
            self.pages
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Page::new(vec![], None)))
        }
    }

    struct Pending {
        rx: RefCell<Option<oneshot::Receiver<Page<Entry>>>>,
    }

    impl PageSource<Entry> for Pending {
        type Error = SourceError;

        async fn fetch_page(&self, _: Option<DateTime<Utc>>) -> Result<Page<Entry>, SourceError> {
            let rx = self.rx.borrow_mut().take().ok_or_else(SourceError::failed)?;
            rx.await.map_err(|_| SourceError::cancelled())
        }
    }

    fn ids(feed: &Feed<Entry>) -> Vec<u32> {
        feed.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_two_pages_then_exhausted() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec![entry(1, 20), entry(2, 15)], Some(true))),
            Ok(Page::new(vec![entry(3, 10)], Some(false))),
        ]);
        let feed = RefCell::new(Feed::newest_first());

        let first = block_on(Feed::fetch_next(&feed, &source)).unwrap();
        assert_eq!(first, FetchOutcome::Applied { added: 2, duplicates: 0 });
        assert_eq!(ids(&feed.borrow()), vec![1, 2]);
        assert!(feed.borrow().has_more());

        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        assert_eq!(ids(&feed.borrow()), vec![1, 2, 3]);
        assert!(!feed.borrow().has_more());

        let third = block_on(Feed::fetch_next(&feed, &source)).unwrap();
        assert_eq!(third, FetchOutcome::Skipped);
        assert_eq!(source.cursors.borrow().len(), 2);
    }

    #[test]
    fn test_cursor_follows_last_appended_item() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec![entry(1, 20), entry(2, 15)], None)),
            Ok(Page::new(vec![entry(3, 10), entry(4, 5)], None)),
            Ok(Page::new(vec![entry(5, 1)], Some(false))),
        ]);
        let feed = RefCell::new(Feed::newest_first());
        for _ in 0..3 {
            block_on(Feed::fetch_next(&feed, &source)).unwrap();
        }

        let cursors = source.cursors.borrow();
        assert_eq!(
            *cursors,
            vec![None, Some(entry(2, 15).at), Some(entry(4, 5).at)]
        );
        assert_eq!(feed.borrow().cursor(), Some(entry(5, 1).at));
    }

    #[test]
    fn test_empty_page_ends_feed() {
        let source = Scripted::new(vec![Ok(Page::new(vec![], Some(true)))]);
        let feed = RefCell::new(Feed::newest_first());
        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        assert!(!feed.borrow().has_more());
    }

    #[test]
    fn test_duplicates_across_pages_are_dropped() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec![entry(1, 20), entry(2, 15)], None)),
            Ok(Page::new(vec![entry(2, 15), entry(3, 10), entry(3, 10)], None)),
        ]);
        let feed = RefCell::new(Feed::newest_first());
        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        let outcome = block_on(Feed::fetch_next(&feed, &source)).unwrap();

        assert_eq!(outcome, FetchOutcome::Applied { added: 1, duplicates: 2 });
        assert_eq!(ids(&feed.borrow()), vec![1, 2, 3]);
    }

    #[test]
    fn test_page_of_only_duplicates_stops_paging() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec![entry(1, 20)], None)),
            Ok(Page::new(vec![entry(1, 20)], Some(true))),
        ]);
        let feed = RefCell::new(Feed::newest_first());
        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        assert!(!feed.borrow().has_more());
    }

    #[test]
    fn test_live_create_lands_at_head() {
        let mut feed = Feed::newest_first();
        feed.insert(entry(10, 10));
        feed.insert(entry(5, 5));

        assert!(feed.merge_live(LiveEvent::Created(entry(12, 12))));
        assert_eq!(ids(&feed), vec![12, 10, 5]);
    }

    #[test]
    fn test_live_create_is_idempotent() {
        let mut feed = Feed::newest_first();
        feed.insert(entry(1, 10));
        feed.insert(entry(2, 5));
        let before = ids(&feed);

        assert!(!feed.merge_live(LiveEvent::Created(entry(1, 10))));
        assert!(!feed.merge_live(LiveEvent::Created(entry(1, 10))));
        assert_eq!(ids(&feed), before);
    }

    #[test]
    fn test_live_update_patches_in_place() {
        let mut feed = Feed::newest_first();
        feed.insert(entry(1, 10));
        feed.insert(entry(2, 5));

        let mut newer = entry(2, 5);
        newer.votes = 7;
        assert!(feed.merge_live(LiveEvent::Updated(newer)));
        assert_eq!(feed.get(&2).map(|e| e.votes), Some(7));
        assert_eq!(ids(&feed), vec![1, 2]);

        assert!(!feed.merge_live(LiveEvent::Updated(entry(3, 1))));
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn test_live_delete() {
        let mut feed = Feed::newest_first();
        feed.insert(entry(1, 10));
        feed.insert(entry(2, 5));

        assert!(feed.merge_live(LiveEvent::Deleted(1)));
        assert!(!feed.merge_live(LiveEvent::Deleted(1)));
        assert_eq!(ids(&feed), vec![2]);
        // a deleted id can come back
        assert!(feed.insert(entry(1, 10)));
    }

    #[test]
    fn test_order_invariant_under_mixed_merges() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec![entry(1, 50), entry(2, 40)], None)),
            Ok(Page::new(vec![entry(3, 30), entry(4, 20)], None)),
        ]);
        let feed = RefCell::new(Feed::newest_first());
        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        feed.borrow_mut().merge_live(LiveEvent::Created(entry(5, 60)));
        feed.borrow_mut().merge_live(LiveEvent::Created(entry(6, 45)));
        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        feed.borrow_mut().merge_live(LiveEvent::Created(entry(3, 30)));

        let feed = feed.borrow();
        let stamps: Vec<_> = feed.iter().map(|e| e.at).collect();
        assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(ids(&feed), vec![5, 1, 6, 2, 3, 4]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut feed = Feed::newest_first();
        feed.insert(entry(1, 10));
        feed.insert(entry(2, 10));
        feed.insert(entry(3, 10));
        assert_eq!(ids(&feed), vec![1, 2, 3]);
    }

    #[test]
    fn test_oldest_first_prepends_older_pages() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec![entry(3, 30), entry(4, 40)], None)),
            Ok(Page::new(vec![entry(1, 10), entry(2, 20)], None)),
        ]);
        let feed = RefCell::new(Feed::oldest_first());
        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        assert_eq!(feed.borrow().cursor(), Some(entry(3, 30).at));
        feed.borrow_mut().merge_live(LiveEvent::Created(entry(5, 50)));
        block_on(Feed::fetch_next(&feed, &source)).unwrap();

        assert_eq!(ids(&feed.borrow()), vec![1, 2, 3, 4, 5]);
        assert_eq!(source.cursors.borrow()[1], Some(entry(3, 30).at));
    }

    #[test]
    fn test_failure_keeps_state_and_allows_retry() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec![entry(1, 20)], None)),
            Err(SourceError::failed()),
            Ok(Page::new(vec![entry(2, 10)], Some(false))),
        ]);
        let feed = RefCell::new(Feed::newest_first());
        block_on(Feed::fetch_next(&feed, &source)).unwrap();

        let failed = block_on(Feed::fetch_next(&feed, &source));
        assert!(matches!(failed, Err(FeedError::Source(_))));
        {
            let feed = feed.borrow();
            assert_eq!(ids(&feed), vec![1]);
            assert!(feed.has_more());
            assert!(!feed.is_loading());
            assert_eq!(feed.error(), Some("server said no"));
        }

        block_on(Feed::fetch_next(&feed, &source)).unwrap();
        assert_eq!(ids(&feed.borrow()), vec![1, 2]);
        assert_eq!(feed.borrow().error(), None);
        // the retry asked for the same cursor as the failed attempt
        let cursors = source.cursors.borrow();
        assert_eq!(cursors[1], cursors[2]);
    }

    #[test]
    fn test_cancelled_fetch_is_silent() {
        let source = Scripted::new(vec![Err(SourceError::cancelled())]);
        let feed = RefCell::new(Feed::newest_first());
        let outcome = block_on(Feed::fetch_next(&feed, &source)).unwrap();
        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert_eq!(feed.borrow().error(), None);
        assert!(feed.borrow().has_more());
    }

    #[test]
    fn test_one_fetch_in_flight() {
        let mut feed: Feed<Entry> = Feed::newest_first();
        let ticket = feed.begin_fetch();
        assert!(ticket.is_some());
        assert!(feed.begin_fetch().is_none());
        assert!(feed.is_loading());
    }

    #[test]
    fn test_abandoned_fetch_unlocks_current_generation_only() {
        let mut feed = Feed::<Entry>::newest_first();
        let ticket = feed.begin_fetch().unwrap();
        feed.abandon_fetch(ticket);
        assert!(!feed.is_loading());

        let old = feed.begin_fetch().unwrap();
        feed.reset();
        let current = feed.begin_fetch().unwrap();
        feed.abandon_fetch(old);
        assert!(feed.is_loading());
        feed.abandon_fetch(current);
        assert!(!feed.is_loading());
    }

    #[test]
    fn test_reset_discards_in_flight_page() {
        let (tx, rx) = oneshot::channel();
        let source = Pending {
            rx: RefCell::new(Some(rx)),
        };
        let feed = RefCell::new(Feed::newest_first());

        let (outcome, ()) = block_on(async {
            futures::join!(Feed::fetch_next(&feed, &source), async {
                feed.borrow_mut().reset();
                let _ = tx.send(Page::new(vec![entry(1, 10)], Some(true)));
            })
        });

        assert_eq!(outcome.unwrap(), FetchOutcome::Stale);
        let feed = feed.borrow();
        assert!(feed.is_empty());
        assert!(!feed.is_loading());
        assert_eq!(feed.cursor(), None);
    }

    #[test]
    fn test_close_discards_in_flight_page() {
        let mut feed = Feed::newest_first();
        let ticket = feed.begin_fetch().unwrap();
        feed.close();
        let outcome = feed
            .finish_fetch::<SourceError>(ticket, Ok(Page::new(vec![entry(1, 1)], None)))
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Stale);
        assert!(feed.is_empty());
        assert!(feed.begin_fetch().is_none());
    }

    #[test]
    fn test_follow_merges_until_dropped() {
        use crate::live::MemoryTransport;
        use serde_json::json;

        #[derive(serde::Deserialize)]
        struct Wire {
            id: u32,
            at: i64,
        }

        let connection = Connection::new("/comments", Box::new(MemoryTransport::new()));
        let feed = Rc::new(RefCell::new(Feed::newest_first()));
        let subscription = Feed::follow(&feed, &connection, "newComment", |wire: Wire| {
            (wire.id != 0).then(|| LiveEvent::Created(entry(wire.id, wire.at)))
        });

        connection.dispatch("newComment", &json!({"id": 1, "at": 10}));
        connection.dispatch("newComment", &json!({"id": 1, "at": 10}));
        connection.dispatch("newComment", &json!({"id": 0, "at": 11}));
        connection.dispatch("newComment", &json!({"bogus": true}));
        assert_eq!(ids(&feed.borrow()), vec![1]);

        drop(subscription);
        connection.dispatch("newComment", &json!({"id": 2, "at": 20}));
        assert_eq!(ids(&feed.borrow()), vec![1]);
        assert_eq!(connection.listener_count(), 0);
    }

    #[test]
    fn test_update_matching_reports_touched_ids() {
        let mut feed = Feed::newest_first();
        for (id, at) in [(1, 30), (2, 20), (3, 10)] {
            feed.insert(entry(id, at));
        }
        let touched = feed.update_matching(|e| e.id != 2, |e| e.votes += 1);
        assert_eq!(touched, vec![1, 3]);
        assert_eq!(feed.get(&2).map(|e| e.votes), Some(0));
    }
}
