use std::cell::RefCell;

use forum_types::{Comment, CommentId, Post, UserId};
use tidings::{MutationOutcome, Optimistic, Vote, VoteState};

use crate::ClientError;
use crate::api::{ForumApi, VoteTarget};

/// The up/down control under a post or comment.
#[derive(Debug)]
pub struct VoteControl {
    target: VoteTarget,
    state: RefCell<Optimistic<VoteState>>,
}

impl VoteControl {
    pub fn new(target: VoteTarget, initial: VoteState) -> Self {
        Self {
            target,
            state: RefCell::new(Optimistic::new(initial)),
        }
    }

    pub fn for_post(post: &Post, me: Option<UserId>) -> Self {
        Self::new(VoteTarget::Post(post.id), post.vote_state(me))
    }

    pub fn for_comment(comment: &Comment, me: Option<UserId>) -> Self {
        Self::new(VoteTarget::Comment(comment.id), comment.vote_state(me))
    }

    pub fn target(&self) -> VoteTarget {
        self.target
    }

    pub fn state(&self) -> VoteState {
        *self.state.borrow().value()
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().is_pending()
    }

    /// Click on the `target` arrow: same arrow again clears the vote.
    pub async fn vote<A: ForumApi>(&self, api: &A, target: Vote) -> MutationOutcome<ClientError> {
        Optimistic::vote(&self.state, target, |next| api.vote(self.target, next)).await
    }

    /// Take the server's numbers after the parent item was refetched.
    pub fn reseed(&self, state: VoteState) -> bool {
        self.state.borrow_mut().reseed(state)
    }
}

/// The "helpful" star a post owner can put on a comment.
#[derive(Debug)]
pub struct HelpfulToggle {
    comment: CommentId,
    state: RefCell<Optimistic<bool>>,
}

impl HelpfulToggle {
    pub fn new(comment: &Comment) -> Self {
        Self {
            comment: comment.id,
            state: RefCell::new(Optimistic::new(comment.is_helpful)),
        }
    }

    pub fn is_helpful(&self) -> bool {
        *self.state.borrow().value()
    }

    pub async fn toggle<A: ForumApi>(&self, api: &A) -> MutationOutcome<ClientError> {
        Optimistic::toggle(&self.state, |helpful| api.set_helpful(self.comment, helpful)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryForum;
    use crate::test_fixtures::{comment, post};
    use forum_types::PostId;

    #[tokio::test]
    async fn test_vote_rolls_back_on_failure() {
        let api = MemoryForum::new();
        let control = VoteControl::new(VoteTarget::Post(PostId(1)), VoteState::new(Vote::Neutral, 5));
        api.fail_on("PUT /posts/1/vote");

        let outcome = control.vote(&api, Vote::Up).await;
        assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
        assert_eq!(control.state(), VoteState::new(Vote::Neutral, 5));
        assert_eq!(api.calls(), vec!["PUT /posts/1/vote 1"]);
    }

    #[tokio::test]
    async fn test_vote_toggle_sequence() {
        let api = MemoryForum::new();
        let control = VoteControl::for_post(&post(1, 0, "a"), Some(UserId(1)));
        assert_eq!(control.state(), VoteState::default());

        assert!(control.vote(&api, Vote::Up).await.is_applied());
        assert!(control.vote(&api, Vote::Down).await.is_applied());
        assert!(control.vote(&api, Vote::Down).await.is_applied());
        assert_eq!(control.state(), VoteState::new(Vote::Neutral, 0));
        assert_eq!(
            api.calls(),
            vec!["PUT /posts/1/vote 1", "PUT /posts/1/vote -1", "PUT /posts/1/vote 0"]
        );
    }

    #[tokio::test]
    async fn test_helpful_toggle() {
        let api = MemoryForum::new();
        let target = comment(4, 1, None, 0);
        api.add_comment(target.clone());
        let toggle = HelpfulToggle::new(&target);

        assert!(toggle.toggle(&api).await.is_applied());
        assert!(toggle.is_helpful());

        api.fail_on("PUT /comments/4/helpful");
        assert!(matches!(toggle.toggle(&api).await, MutationOutcome::RolledBack(_)));
        assert!(toggle.is_helpful());
    }
}
