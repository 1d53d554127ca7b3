//! Client-side list state for the Konsylium forum: the post listing, comment threads,
//! notifications and chat, kept in sync with the REST API and the live socket namespaces.
//!
//! Every view is generic over [`ForumApi`], so the same code runs against [`HttpApi`] in
//! production and [`MemoryForum`] in tests. Views are single-threaded (`Rc`/`RefCell`) and
//! runtime-agnostic; the `feed-scope` binary drives them on a current-thread tokio runtime.

pub mod api;
pub mod chat;
pub mod comments;
pub mod config;
pub mod error;
pub mod follow;
pub mod http;
pub mod memory;
pub mod notifications;
pub mod pager;
pub mod posts;
pub mod session;
pub mod voting;

#[cfg(test)]
mod test_fixtures;

pub use api::{FollowTarget, ForumApi, VoteTarget};
pub use chat::{ConversationList, MessageThread};
pub use comments::{CommentThread, Replies};
pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use follow::FollowControl;
pub use http::HttpApi;
pub use memory::MemoryForum;
pub use notifications::{MarkReadReport, NotificationCenter};
pub use pager::Pager;
pub use posts::PostsFeed;
pub use session::ForumSession;
pub use voting::{HelpfulToggle, VoteControl};

pub use forum_types;
pub use tidings;
