use std::cell::RefCell;

use forum_types::{Post, UserId};
use tidings::{MutationOutcome, Optimistic};

use crate::ClientError;
use crate::api::{FollowTarget, ForumApi};

#[derive(Debug)]
pub struct FollowControl {
    target: FollowTarget,
    state: RefCell<Optimistic<bool>>,
}

impl FollowControl {
    pub fn new(target: FollowTarget, following: bool) -> Self {
        Self {
            target,
            state: RefCell::new(Optimistic::new(following)),
        }
    }

    pub fn for_post(post: &Post) -> Self {
        Self::new(FollowTarget::Post(post.id), post.is_followed)
    }

    pub fn for_user(user: UserId, following: bool) -> Self {
        Self::new(FollowTarget::User(user), following)
    }

    pub fn is_following(&self) -> bool {
        *self.state.borrow().value()
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().is_pending()
    }

    pub async fn toggle<A: ForumApi>(&self, api: &A) -> MutationOutcome<ClientError> {
        Optimistic::toggle(&self.state, |follow| api.set_following(self.target, follow)).await
    }

    pub fn reseed(&self, following: bool) -> bool {
        self.state.borrow_mut().reseed(following)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryForum;
    use crate::test_fixtures::post;

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let api = MemoryForum::new();
        let control = FollowControl::for_post(&post(3, 0, "a"));
        assert!(!control.is_following());

        assert!(control.toggle(&api).await.is_applied());
        assert!(control.is_following());
        assert!(control.toggle(&api).await.is_applied());
        assert_eq!(api.calls(), vec!["POST /posts/3/follow", "DELETE /posts/3/follow"]);
    }

    #[tokio::test]
    async fn test_failed_follow_rolls_back() {
        let api = MemoryForum::new();
        api.fail_on("POST /users/8/follow");
        let control = FollowControl::for_user(UserId(8), false);
        assert!(matches!(control.toggle(&api).await, MutationOutcome::RolledBack(_)));
        assert!(!control.is_following());
        assert!(!control.is_pending());
    }
}
