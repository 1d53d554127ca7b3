//! Optimistic local state: change first, ask the server second, roll back if it refuses.

use std::cell::RefCell;
use std::fmt::Debug;

/// One user's vote on one item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Vote {
    Down,
    #[default]
    Neutral,
    Up,
}

impl Vote {
    pub fn value(self) -> i64 {
        match self {
            Vote::Down => -1,
            Vote::Neutral => 0,
            Vote::Up => 1,
        }
    }

    /// Voting the same way twice clears the vote; voting the other way replaces it.
    pub fn toggle(self, target: Vote) -> Vote {
        if self == target { Vote::Neutral } else { target }
    }
}

impl From<Vote> for i64 {
    fn from(vote: Vote) -> i64 {
        vote.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("vote value must be -1, 0 or 1, got {0}")]
pub struct InvalidVote(pub i64);

impl TryFrom<i64> for Vote {
    type Error = InvalidVote;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Vote::Down),
            0 => Ok(Vote::Neutral),
            1 => Ok(Vote::Up),
            other => Err(InvalidVote(other)),
        }
    }
}

/// What a vote control shows: the current user's vote and the item's total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoteState {
    pub local: Vote,
    pub tally: i64,
}

impl VoteState {
    pub fn new(local: Vote, tally: i64) -> Self {
        Self { local, tally }
    }

    /// Seed from an item's embedded vote list: the tally is the sum of all votes,
    /// the local vote is whatever `me` cast (neutral if nothing).
    pub fn from_votes<U: PartialEq>(
        votes: impl IntoIterator<Item = (U, Vote)>,
        me: Option<&U>,
    ) -> Self {
        let mut state = Self::default();
        for (voter, vote) in votes {
            state.tally += vote.value();
            if me == Some(&voter) {
                state.local = vote;
            }
        }
        state
    }

    pub fn toggled(self, target: Vote) -> Self {
        let next = self.local.toggle(target);
        Self {
            local: next,
            tally: self.tally + next.value() - self.local.value(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum MutationOutcome<E> {
    Applied,
    /// Another mutation on the same value was still in flight.
    Rejected,
    /// The request failed; local state is back to what it was before.
    RolledBack(E),
}

impl<E> MutationOutcome<E> {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}

/// A value owned by one control, mutated optimistically one request at a time.
#[derive(Clone, Debug, Default)]
pub struct Optimistic<V> {
    value: V,
    pending: bool,
}

impl<V: Clone + Debug> Optimistic<V> {
    pub fn new(value: V) -> Self {
        Self {
            value,
            pending: false,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Re-seed from a fresh copy of the server's truth. Ignored while a mutation is in flight.
    pub fn reseed(&mut self, value: V) -> bool {
        if self.pending {
            return false;
        }
        self.value = value;
        true
    }

    /// Set `next(current)` locally, then run `request` with it. On failure the
    /// previous value is restored.
    pub async fn mutate<E, Fut>(
        cell: &RefCell<Self>,
        next: impl FnOnce(&V) -> V,
        request: impl FnOnce(V) -> Fut,
    ) -> MutationOutcome<E>
    where
        E: Debug,
        Fut: Future<Output = Result<(), E>>,
    {
        let (previous, target) = {
            let mut this = cell.borrow_mut();
            if this.pending {
                log::debug!("Mutation rejected, another one is in flight");
                return MutationOutcome::Rejected;
            }
            let previous = this.value.clone();
            let target = next(&previous);
            this.value = target.clone();
            this.pending = true;
            (previous, target)
        };
        let mut guard = InFlight {
            cell,
            previous: Some(previous),
        };

        let result = request(target).await;

        let previous = guard.settle();
        let mut this = cell.borrow_mut();
        match result {
            Ok(()) => MutationOutcome::Applied,
            Err(e) => {
                log::warn!("Mutation failed, rolling back to {previous:?}: {e:?}");
                this.value = previous;
                MutationOutcome::RolledBack(e)
            }
        }
    }
}

/// Held across the request. If the mutation future is dropped before the request
/// finishes, the value goes back to what it was and the control unlocks.
struct InFlight<'a, V: Clone + Debug> {
    cell: &'a RefCell<Optimistic<V>>,
    previous: Option<V>,
}

impl<V: Clone + Debug> InFlight<'_, V> {
    fn settle(&mut self) -> V {
        self.cell.borrow_mut().pending = false;
        match self.previous.take() {
            Some(previous) => previous,
            None => self.cell.borrow().value.clone(),
        }
    }
}

impl<V: Clone + Debug> Drop for InFlight<'_, V> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        match self.cell.try_borrow_mut() {
            Ok(mut this) => {
                log::debug!("Mutation cancelled, restoring {previous:?}");
                this.value = previous;
                this.pending = false;
            }
            Err(_) => log::warn!("Mutation cancelled while its value was borrowed"),
        }
    }
}

impl Optimistic<VoteState> {
    pub async fn vote<E, Fut>(
        cell: &RefCell<Self>,
        target: Vote,
        request: impl FnOnce(Vote) -> Fut,
    ) -> MutationOutcome<E>
    where
        E: Debug,
        Fut: Future<Output = Result<(), E>>,
    {
        Self::mutate(cell, |state| state.toggled(target), |next| request(next.local)).await
    }
}

impl Optimistic<bool> {
    pub async fn toggle<E, Fut>(cell: &RefCell<Self>, request: impl FnOnce(bool) -> Fut) -> MutationOutcome<E>
    where
        E: Debug,
        Fut: Future<Output = Result<(), E>>,
    {
        Self::mutate(cell, |on| !on, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use futures::executor::block_on;

    #[test]
    fn test_toggle_table() {
        assert_eq!(Vote::Neutral.toggle(Vote::Up), Vote::Up);
        assert_eq!(Vote::Up.toggle(Vote::Up), Vote::Neutral);
        assert_eq!(Vote::Up.toggle(Vote::Down), Vote::Down);
        assert_eq!(Vote::Down.toggle(Vote::Down), Vote::Neutral);
    }

    #[test]
    fn test_tally_follows_delta() {
        let state = VoteState::new(Vote::Neutral, 5);
        assert_eq!(state.toggled(Vote::Up), VoteState::new(Vote::Up, 6));
        assert_eq!(state.toggled(Vote::Up).toggled(Vote::Down), VoteState::new(Vote::Down, 4));
        assert_eq!(state.toggled(Vote::Up).toggled(Vote::Up), state);
    }

    #[test]
    fn test_from_votes() {
        let votes = vec![(1, Vote::Up), (2, Vote::Up), (3, Vote::Down)];
        assert_eq!(
            VoteState::from_votes(votes.clone(), Some(&3)),
            VoteState::new(Vote::Down, 1)
        );
        assert_eq!(VoteState::from_votes(votes, None), VoteState::new(Vote::Neutral, 1));
    }

    #[test]
    fn test_vote_serde_is_numeric() {
        assert_eq!(serde_json::to_string(&Vote::Down).unwrap(), "-1");
        assert_eq!(serde_json::from_str::<Vote>("1").unwrap(), Vote::Up);
        assert!(serde_json::from_str::<Vote>("2").is_err());
    }

    #[test]
    fn test_failed_vote_rolls_back() {
        let cell = RefCell::new(Optimistic::new(VoteState::new(Vote::Neutral, 5)));
        let mut seen_during_request = None;

        let outcome = block_on(Optimistic::vote(&cell, Vote::Up, |value| {
            seen_during_request = Some((value, *cell.borrow().value()));
            async { Err::<(), _>("boom") }
        }));

        assert_eq!(outcome, MutationOutcome::RolledBack("boom"));
        assert_eq!(seen_during_request, Some((Vote::Up, VoteState::new(Vote::Up, 6))));
        assert_eq!(*cell.borrow().value(), VoteState::new(Vote::Neutral, 5));
        assert!(!cell.borrow().is_pending());
    }

    #[test]
    fn test_successful_vote_sticks() {
        let cell = RefCell::new(Optimistic::new(VoteState::new(Vote::Up, 3)));
        let outcome = block_on(Optimistic::vote(&cell, Vote::Down, |value| {
            assert_eq!(value, Vote::Down);
            async { Ok::<(), ()>(()) }
        }));
        assert!(outcome.is_applied());
        assert_eq!(*cell.borrow().value(), VoteState::new(Vote::Down, 1));
    }

    #[test]
    fn test_second_mutation_rejected_while_pending() {
        let cell = RefCell::new(Optimistic::new(false));
        let (tx, rx) = oneshot::channel::<Result<(), ()>>();

        let (first, second) = block_on(async {
            futures::join!(
                Optimistic::toggle(&cell, move |_| async move { rx.await.unwrap_or(Err(())) }),
                async {
                    let second = Optimistic::toggle(&cell, |_| async { Ok::<(), ()>(()) }).await;
                    let _ = tx.send(Ok(()));
                    second
                }
            )
        });

        assert_eq!(first, MutationOutcome::Applied);
        assert_eq!(second, MutationOutcome::Rejected);
        assert!(*cell.borrow().value());
    }

    #[test]
    fn test_dropped_vote_restores_and_unlocks() {
        let cell = RefCell::new(Optimistic::new(VoteState::new(Vote::Neutral, 5)));

        let vote = Optimistic::vote(&cell, Vote::Up, |_| futures::future::pending::<Result<(), ()>>());
        let mut vote = Box::pin(vote);
        assert!(futures::FutureExt::now_or_never(vote.as_mut()).is_none());
        assert_eq!(*cell.borrow().value(), VoteState::new(Vote::Up, 6));
        assert!(cell.borrow().is_pending());
        drop(vote);

        assert_eq!(*cell.borrow().value(), VoteState::new(Vote::Neutral, 5));
        assert!(!cell.borrow().is_pending());

        let outcome = block_on(Optimistic::vote(&cell, Vote::Down, |_| async { Ok::<(), ()>(()) }));
        assert!(outcome.is_applied());
        assert_eq!(*cell.borrow().value(), VoteState::new(Vote::Down, 4));
    }

    #[test]
    fn test_reseed_ignored_while_pending() {
        let mut value = Optimistic::new(true);
        value.pending = true;
        assert!(!value.reseed(false));
        value.pending = false;
        assert!(value.reseed(false));
        assert!(!*value.value());
    }
}
