//! A signed-in (or anonymous) browsing session: the API handle, one live connection per
//! namespace, and the per-user rooms the server pushes notifications and chat frames into.

use std::collections::BTreeMap;
use std::rc::Rc;

use forum_types::{CommentId, PostId, UserId};
use serde_json::json;
use tidings::{ConnectionRegistry, ConnectionStatus, LiveError, RoomMembership, Transport};

use crate::api::ForumApi;
use crate::chat::{ConversationList, MessageThread};
use crate::comments::{CommentThread, Replies};
use crate::notifications::NotificationCenter;
use crate::posts::PostsFeed;
use crate::{ClientConfig, ClientError};

pub const COMMENTS: &str = "/comments";
pub const NOTIFICATIONS: &str = "/notifications";
pub const CHAT: &str = "/chat";

const JOIN_USER_ROOM: &str = "joinUserRoom";
const LEAVE_USER_ROOM: &str = "leaveUserRoom";

pub struct ForumSession<A: ForumApi> {
    api: Rc<A>,
    config: ClientConfig,
    me: Option<UserId>,
    // Rooms must be left before the registry closes the connections they live on.
    rooms: Vec<RoomMembership>,
    registry: ConnectionRegistry,
}

impl<A: ForumApi> ForumSession<A> {
    /// Open the three live connections and, when someone is signed in, join their user room
    /// on `/notifications` and `/chat`.
    pub fn open(
        api: Rc<A>,
        config: ClientConfig,
        me: Option<UserId>,
        connect: impl FnMut(&str) -> Result<Box<dyn Transport>, LiveError>,
    ) -> Result<Self, ClientError> {
        let registry = ConnectionRegistry::open([COMMENTS, NOTIFICATIONS, CHAT], connect)?;
        let mut rooms = Vec::new();
        if let Some(me) = me {
            for namespace in [NOTIFICATIONS, CHAT] {
                let connection = registry.get(namespace)?;
                rooms.push(connection.join_room(JOIN_USER_ROOM, LEAVE_USER_ROOM, json!(me.0))?);
            }
            log::info!("Session opened for user {me}");
        } else {
            log::info!("Anonymous session opened");
        }
        Ok(Self {
            api,
            config,
            me,
            rooms,
            registry,
        })
    }

    pub fn api(&self) -> &Rc<A> {
        &self.api
    }

    pub fn me(&self) -> Option<UserId> {
        self.me
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self, namespace: &str) -> Result<Rc<tidings::Connection>, ClientError> {
        Ok(self.registry.get(namespace)?)
    }

    pub fn statuses(&self) -> BTreeMap<String, ConnectionStatus> {
        self.registry.statuses()
    }

    pub fn posts(&self) -> PostsFeed<A> {
        PostsFeed::new(Rc::clone(&self.api))
    }

    pub fn comments(&self, post: PostId) -> Result<CommentThread<A>, ClientError> {
        CommentThread::attach(Rc::clone(&self.api), post, &self.connection(COMMENTS)?)
    }

    pub fn replies(&self, parent: CommentId) -> Result<Replies<A>, ClientError> {
        Ok(Replies::attach(
            Rc::clone(&self.api),
            parent,
            &self.connection(COMMENTS)?,
        ))
    }

    pub fn notifications(&self) -> Result<NotificationCenter<A>, ClientError> {
        Ok(NotificationCenter::attach(
            Rc::clone(&self.api),
            self.config.notifications_page_size,
            &self.connection(NOTIFICATIONS)?,
        ))
    }

    pub fn conversations(&self) -> Result<ConversationList<A>, ClientError> {
        Ok(ConversationList::attach(
            Rc::clone(&self.api),
            &self.connection(CHAT)?,
        ))
    }

    pub fn messages(&self) -> Result<MessageThread<A>, ClientError> {
        Ok(MessageThread::attach(
            Rc::clone(&self.api),
            self.config.messages_page_size,
            &self.connection(CHAT)?,
        ))
    }

    /// Leave every room and close every connection. Views built from this session keep
    /// their items but stop receiving live frames.
    pub fn close(mut self) {
        self.rooms.clear();
        self.registry.shutdown();
        log::info!("Session closed");
    }
}
