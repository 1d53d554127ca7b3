use std::cell::RefCell;
use std::rc::Rc;

use futures::future::{AbortHandle, Abortable};
use im::Vector;
use tidings::{
    Feed, FeedError, FeedItem, FetchGuard, FetchOutcome, FetchTicket, MutationOutcome, PageSource,
    PaginationState,
};

use crate::ClientError;

/// A [`Feed`] plus the abort handle of its in-flight fetch. Dropping the pager (or
/// resetting it) cancels the request instead of letting it land on a dead view.
#[derive(Debug)]
pub struct Pager<T: FeedItem> {
    feed: Rc<RefCell<Feed<T>>>,
    in_flight: RefCell<Option<(FetchTicket, AbortHandle)>>,
}

impl<T: FeedItem> Pager<T> {
    pub fn new(feed: Feed<T>) -> Self {
        Self {
            feed: Rc::new(RefCell::new(feed)),
            in_flight: RefCell::new(None),
        }
    }

    pub fn feed(&self) -> &Rc<RefCell<Feed<T>>> {
        &self.feed
    }

    pub fn state(&self) -> PaginationState<T> {
        self.feed.borrow().state()
    }

    pub fn items(&self) -> Vector<T> {
        self.feed.borrow().items().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.feed.borrow().error().map(str::to_string)
    }

    pub async fn fetch_next<S>(&self, source: &S) -> Result<FetchOutcome, FeedError<ClientError>>
    where
        S: PageSource<T, Error = ClientError>,
    {
        let Some(fetch) = FetchGuard::begin(&*self.feed) else {
            return Ok(FetchOutcome::Skipped);
        };
        let ticket = fetch.ticket();
        let (handle, registration) = AbortHandle::new_pair();
        *self.in_flight.borrow_mut() = Some((ticket, handle));

        let result = Abortable::new(source.fetch_page(ticket.cursor()), registration)
            .await
            .unwrap_or_else(|aborted| Err(aborted.into()));

        {
            let mut in_flight = self.in_flight.borrow_mut();
            if in_flight.as_ref().is_some_and(|(current, _)| *current == ticket) {
                *in_flight = None;
            }
        }
        fetch.finish(result)
    }

    /// Clear the feed and cancel whatever is in flight.
    pub fn reset(&self) {
        self.abort();
        self.feed.borrow_mut().reset();
    }

    pub fn close(&self) {
        self.abort();
        self.feed.borrow_mut().close();
    }

    fn abort(&self) {
        if let Some((_, handle)) = self.in_flight.borrow_mut().take() {
            log::debug!("Cancelling in-flight page fetch");
            handle.abort();
        }
    }

    /// Remove `id` right away and put it back where it belongs if `request` fails.
    pub async fn remove_optimistic<Fut>(
        &self,
        id: &T::Id,
        request: impl FnOnce() -> Fut,
    ) -> MutationOutcome<ClientError>
    where
        Fut: Future<Output = Result<(), ClientError>>,
    {
        let Some(removed) = self.feed.borrow_mut().remove(id) else {
            return MutationOutcome::Rejected;
        };
        let feed = Rc::clone(&self.feed);
        let restore = removed.clone();
        let undo = Undo::new(move || match feed.try_borrow_mut() {
            Ok(mut feed) => {
                feed.insert(restore);
            }
            Err(_) => log::warn!("Cancelled delete could not restore its item"),
        });

        let result = request().await;
        undo.disarm();
        match result {
            Ok(()) => MutationOutcome::Applied,
            Err(e) => {
                log::warn!("Delete of {id:?} failed, restoring it: {e}");
                self.feed.borrow_mut().insert(removed);
                MutationOutcome::RolledBack(e)
            }
        }
    }
}

/// Runs its closure on drop unless disarmed. Puts optimistic edits back when the
/// future carrying the request is dropped before the server answers.
pub(crate) struct Undo<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Undo<F> {
    pub(crate) fn new(undo: F) -> Self {
        Self(Some(undo))
    }

    pub(crate) fn disarm(mut self) {
        self.0 = None;
    }
}

impl<F: FnOnce()> Drop for Undo<F> {
    fn drop(&mut self) {
        if let Some(undo) = self.0.take() {
            log::debug!("Request dropped before it finished, undoing local change");
            undo();
        }
    }
}

impl<T: FeedItem> Drop for Pager<T> {
    fn drop(&mut self) {
        self.abort();
    }
}
