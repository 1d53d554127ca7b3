use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use forum_types::{Post, PostFilter, PostId};
use tidings::{Feed, FeedError, FetchOutcome, MutationOutcome, Page, PageSource, PaginationState};

use crate::ClientError;
use crate::api::ForumApi;
use crate::pager::Pager;

struct PostsSource<'a, A> {
    api: &'a A,
    filter: PostFilter,
}

impl<A: ForumApi> PageSource<Post> for PostsSource<'_, A> {
    type Error = ClientError;

    async fn fetch_page(&self, cursor: Option<DateTime<Utc>>) -> Result<Page<Post>, ClientError> {
        self.api.fetch_posts(&self.filter, cursor).await
    }
}

/// The home page listing: newest posts first, narrowed by a [`PostFilter`].
pub struct PostsFeed<A: ForumApi> {
    api: Rc<A>,
    pager: Pager<Post>,
    filter: RefCell<PostFilter>,
}

impl<A: ForumApi> PostsFeed<A> {
    pub fn new(api: Rc<A>) -> Self {
        Self::with_filter(api, PostFilter::default())
    }

    pub fn with_filter(api: Rc<A>, filter: PostFilter) -> Self {
        Self {
            api,
            pager: Pager::new(Feed::newest_first()),
            filter: RefCell::new(filter),
        }
    }

    pub fn filter(&self) -> PostFilter {
        self.filter.borrow().clone()
    }

    pub fn state(&self) -> PaginationState<Post> {
        self.pager.state()
    }

    pub fn pager(&self) -> &Pager<Post> {
        &self.pager
    }

    pub async fn load_more(&self) -> Result<FetchOutcome, FeedError<ClientError>> {
        let source = PostsSource {
            api: &*self.api,
            filter: self.filter(),
        };
        self.pager.fetch_next(&source).await
    }

    /// Swap the filter and start over from the newest page.
    pub async fn apply_filter(
        &self,
        filter: PostFilter,
    ) -> Result<FetchOutcome, FeedError<ClientError>> {
        log::debug!("Applying post filter {filter:?}");
        *self.filter.borrow_mut() = filter;
        self.pager.reset();
        self.load_more().await
    }

    /// Show a post the user just created without waiting for a refetch.
    pub fn add_created(&self, post: Post) -> bool {
        self.pager.feed().borrow_mut().insert(post)
    }

    pub fn refresh(&self, post: &Post) -> bool {
        self.pager.feed().borrow_mut().refresh(post)
    }

    pub async fn delete(&self, id: PostId) -> MutationOutcome<ClientError> {
        let api = &*self.api;
        self.pager
            .remove_optimistic(&id, || api.delete_post(id))
            .await
    }

    pub fn close(&self) {
        self.pager.close();
    }
}
