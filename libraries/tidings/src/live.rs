//! # Live channels
//! One connection per namespace (`/comments`, `/chat`, ...) is shared by every consumer in the
//! process. Consumers never own a connection; they hold [`Subscription`]s and [`RoomMembership`]s,
//! which undo themselves when dropped. Only the [`ConnectionRegistry`] can close a connection.
//!
//! The wire protocol is somebody else's problem: a [`Transport`] carries outgoing frames, and
//! whatever reads incoming frames hands them to [`Connection::dispatch`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    pub struct ListenerKey;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiveError {
    #[error("connection for {namespace} is closed")]
    NotConnected { namespace: String },
    #[error("no connection registered for namespace {0}")]
    UnknownNamespace(String),
    #[error("transport error: {0}")]
    Transport(String),
}

pub trait Transport {
    fn emit(&self, event: &str, payload: &Value) -> Result<(), LiveError>;
    fn disconnect(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    /// Torn down by the registry. Terminal.
    Closed,
}

type Listener = Rc<dyn Fn(&Value)>;

struct Registration {
    event: String,
    listener: Listener,
}

pub struct Connection {
    namespace: String,
    transport: Box<dyn Transport>,
    listeners: RefCell<SlotMap<ListenerKey, Registration>>,
    status: Cell<ConnectionStatus>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("namespace", &self.namespace)
            .field("status", &self.status.get())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Connection {
    pub fn new(namespace: impl Into<String>, transport: Box<dyn Transport>) -> Rc<Self> {
        Rc::new(Self {
            namespace: namespace.into(),
            transport,
            listeners: RefCell::new(SlotMap::with_key()),
            status: Cell::new(ConnectionStatus::Connecting),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn is_connected(&self) -> bool {
        self.status.get() == ConnectionStatus::Connected
    }

    /// Called by the transport side on connect/disconnect. A closed connection stays closed.
    pub fn set_status(&self, status: ConnectionStatus) {
        if self.status.get() == ConnectionStatus::Closed {
            return;
        }
        log::debug!("{}: {:?}", self.namespace, status);
        self.status.set(status);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn subscribe(self: &Rc<Self>, event: &str, listener: impl Fn(&Value) + 'static) -> Subscription {
        let key = self.listeners.borrow_mut().insert(Registration {
            event: event.to_string(),
            listener: Rc::new(listener),
        });
        log::debug!("{}: listening for `{event}` ({key:?})", self.namespace);
        Subscription {
            connection: Rc::downgrade(self),
            key,
        }
    }

    /// Like [`Connection::subscribe`], but decodes the payload first. Payloads that don't
    /// decode are logged and skipped.
    pub fn subscribe_as<P: DeserializeOwned>(
        self: &Rc<Self>,
        event: &str,
        listener: impl Fn(P) + 'static,
    ) -> Subscription {
        let namespace = self.namespace.clone();
        let event_name = event.to_string();
        self.subscribe(event, move |payload| {
            match serde_json::from_value::<P>(payload.clone()) {
                Ok(decoded) => listener(decoded),
                Err(e) => {
                    log::warn!("{namespace}: ignoring malformed `{event_name}` payload: {e}");
                }
            }
        })
    }

    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        let removed = self.listeners.borrow_mut().remove(key);
        if let Some(registration) = &removed {
            log::debug!("{}: stopped listening for `{}`", self.namespace, registration.event);
        }
        removed.is_some()
    }

    pub fn emit(&self, event: &str, payload: &Value) -> Result<(), LiveError> {
        if self.status.get() == ConnectionStatus::Closed {
            return Err(LiveError::NotConnected {
                namespace: self.namespace.clone(),
            });
        }
        self.transport.emit(event, payload)
    }

    /// Emit `join_event` now and `leave_event` when the returned guard is dropped.
    pub fn join_room(
        self: &Rc<Self>,
        join_event: &str,
        leave_event: &str,
        room: Value,
    ) -> Result<RoomMembership, LiveError> {
        self.emit(join_event, &room)?;
        Ok(RoomMembership {
            connection: Rc::downgrade(self),
            leave_event: leave_event.to_string(),
            room,
        })
    }

    /// Deliver an incoming frame to every listener of `event`. Returns how many were called.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        if self.status.get() == ConnectionStatus::Closed {
            return 0;
        }
        // Listeners may subscribe or unsubscribe while running, so call them outside the borrow.
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .values()
            .filter(|registration| registration.event == event)
            .map(|registration| Rc::clone(&registration.listener))
            .collect();
        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }

    fn shutdown(&self) {
        if self.status.get() == ConnectionStatus::Closed {
            return;
        }
        self.status.set(ConnectionStatus::Closed);
        let dropped = {
            let mut listeners = self.listeners.borrow_mut();
            let count = listeners.len();
            listeners.clear();
            count
        };
        self.transport.disconnect();
        log::info!("Closed {} ({dropped} listeners dropped)", self.namespace);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Listener registration that is removed when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    connection: Weak<Connection>,
    key: ListenerKey,
}

impl Subscription {
    pub fn key(&self) -> ListenerKey {
        self.key
    }

    pub fn is_active(&self) -> bool {
        self.connection
            .upgrade()
            .is_some_and(|connection| connection.listeners.borrow().contains_key(self.key))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.upgrade() {
            connection.unsubscribe(self.key);
        }
    }
}

/// Room membership that emits the leave event when dropped.
#[must_use = "dropping a RoomMembership leaves the room immediately"]
#[derive(Debug)]
pub struct RoomMembership {
    connection: Weak<Connection>,
    leave_event: String,
    room: Value,
}

impl RoomMembership {
    pub fn room(&self) -> &Value {
        &self.room
    }
}

impl Drop for RoomMembership {
    fn drop(&mut self) {
        let Some(connection) = self.connection.upgrade() else {
            return;
        };
        if let Err(e) = connection.emit(&self.leave_event, &self.room) {
            log::debug!("Could not emit {} for {}: {e}", self.leave_event, self.room);
        }
    }
}

/// Owns every live connection of the process. Built when the session starts,
/// shut down when it ends.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<String, Rc<Connection>>,
}

impl ConnectionRegistry {
    pub fn open<'a>(
        namespaces: impl IntoIterator<Item = &'a str>,
        mut connect: impl FnMut(&str) -> Result<Box<dyn Transport>, LiveError>,
    ) -> Result<Self, LiveError> {
        let mut connections = BTreeMap::new();
        for namespace in namespaces {
            // On error the connections opened so far are dropped, which disconnects them.
            let transport = connect(namespace)?;
            connections.insert(namespace.to_string(), Connection::new(namespace, transport));
        }
        log::info!("Opened {} live connection(s)", connections.len());
        Ok(Self { connections })
    }

    pub fn get(&self, namespace: &str) -> Result<Rc<Connection>, LiveError> {
        self.connections
            .get(namespace)
            .cloned()
            .ok_or_else(|| LiveError::UnknownNamespace(namespace.to_string()))
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    pub fn statuses(&self) -> BTreeMap<String, ConnectionStatus> {
        self.connections
            .iter()
            .map(|(namespace, connection)| (namespace.clone(), connection.status()))
            .collect()
    }

    pub fn shutdown(&mut self) {
        for connection in self.connections.values() {
            connection.shutdown();
        }
        self.connections.clear();
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Transport that keeps emitted frames in memory. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    sent: Rc<RefCell<Vec<(String, Value)>>>,
    disconnected: Rc<Cell<bool>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.borrow().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.get()
    }
}

impl Transport for MemoryTransport {
    fn emit(&self, event: &str, payload: &Value) -> Result<(), LiveError> {
        if self.disconnected.get() {
            return Err(LiveError::Transport("disconnected".to_string()));
        }
        self.sent
            .borrow_mut()
            .push((event.to_string(), payload.clone()));
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnected.set(true);
    }
}
