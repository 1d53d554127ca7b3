//! This is a library for keeping server-backed lists consistent on the client.
//! It was created for Konsylium, so it doesn't include much that was not needed for that project.
//!
//! Reconciliation strategy:
//! 1. Every list entry has a stable id and a creation timestamp. The timestamp is both the sort key and the pagination cursor.
//! 2. Pages are fetched one at a time. Each fetch is stamped with the feed's generation; resetting the feed bumps the generation, so a slow page that resolves after a reset is thrown away.
//! 3. Push events (create/update/delete) arriving from a live channel are merged into the same list. Merging is keyed by id, so re-delivery is harmless.
//! 4. User actions (votes, follows, deletes) change local state first, then hit the server, and roll back if the server says no.
//!
//! Sounds simple, but there are a few tricky parts that this library handles.

pub mod feed;
pub mod live;
pub mod optimistic;
pub mod scroll;

use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};

pub use feed::{
    Feed, FeedError, FetchGuard, FetchOutcome, FetchTicket, LiveEvent, Order, Page, PageSource,
    PaginationState,
};
pub use live::{
    Connection, ConnectionRegistry, ConnectionStatus, ListenerKey, LiveError, MemoryTransport,
    RoomMembership, Subscription, Transport,
};
pub use optimistic::{InvalidVote, MutationOutcome, Optimistic, Vote, VoteState};
pub use scroll::{Edge, ScrollAnchor, ScrollMetrics, ScrollTrigger};

/// An entry that can live in a [`Feed`].
pub trait FeedItem: Clone {
    type Id: Clone + Eq + Hash + Debug;

    fn id(&self) -> &Self::Id;

    /// Sort key and pagination cursor. Must not change over the item's lifetime.
    fn created_at(&self) -> DateTime<Utc>;

    /// Copy the mutable subset (tallies, read flags, counters) from a newer copy of the same item.
    fn refresh_from(&mut self, newer: &Self) {
        *self = newer.clone();
    }
}

/// Lets feeds tell a superseded request apart from a real failure.
pub trait Cancellable {
    fn is_cancelled(&self) -> bool;
}
