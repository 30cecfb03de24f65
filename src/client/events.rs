//! Listener registry and event payloads
//!
//! Listeners are keyed by event name. Besides the plain names, three
//! composite forms route traffic to a single consumer:
//!
//! - `ack:<groupId>`
//! - `init:<groupId>`
//! - `append:<seriesKey>`
//!
//! All key construction goes through [`key`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::websocket::{InitData, Limits, Point, Rejection};

/// Event names and composite key builders
pub mod key {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const ERROR: &str = "error";
    pub const HELLO: &str = "hello";
    pub const ACK: &str = "ack";
    pub const INIT: &str = "init";
    pub const APPEND: &str = "append";

    /// `ack:<groupId>`
    pub fn ack(group_id: &str) -> String {
        format!("{}:{}", ACK, group_id)
    }

    /// `init:<groupId>`
    pub fn init(group_id: &str) -> String {
        format!("{}:{}", INIT, group_id)
    }

    /// `append:<seriesKey>`
    pub fn append(series_key: &str) -> String {
        format!("{}:{}", APPEND, series_key)
    }
}

/// Where an error event originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// Socket failed or could not be opened
    Transport,
    /// The server sent an `error` frame
    Server,
}

/// Error carried by an `error` event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StreamError {
    pub origin: ErrorOrigin,
    pub message: String,
}

impl StreamError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            origin: ErrorOrigin::Transport,
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            origin: ErrorOrigin::Server,
            message: message.into(),
        }
    }
}

/// Payload delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Socket opened
    Connect,
    /// Reconnection gave up
    Disconnect { reason: String },
    /// Transport failure or server `error` frame
    Error(StreamError),
    /// Server greeting with capabilities and limits
    Hello {
        capabilities: HashMap<String, bool>,
        limits: Option<Limits>,
    },
    /// Acceptance/rejection of a subscribe request
    Ack {
        group_id: String,
        accepted: Vec<String>,
        rejected: Vec<Rejection>,
    },
    /// Full backfill for a group
    Init { group_id: String, data: InitData },
    /// One new point for one series
    Append { key: String, point: Point },
}

/// Callback registered with [`ListenerRegistry::on`]
pub type Listener = Arc<dyn Fn(&LiveEvent) + Send + Sync>;

/// Handle identifying one registration, used to remove it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event name → ordered callbacks
///
/// Invocation order is registration order. Registering the same callback
/// twice yields two ids and two invocations.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.on_shared(event, Arc::new(listener))
    }

    /// Register an already shared callback
    pub fn on_shared(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(event.into())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one registration; returns whether it was present
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Invoke every listener for `event`, returning how many ran
    ///
    /// Callbacks run outside the registry lock, so they may register or
    /// remove listeners. Listeners added during dispatch first run on the
    /// next emit; listeners removed during dispatch are not invoked again.
    /// A panicking listener is logged and skipped.
    pub fn emit(&self, event: &str, payload: &LiveEvent) -> usize {
        let snapshot: Vec<(ListenerId, Listener)> = match self.listeners.lock().get(event) {
            Some(entries) => entries
                .iter()
                .map(|(id, l)| (*id, Arc::clone(l)))
                .collect(),
            None => return 0,
        };

        let mut invoked = 0;
        for (id, listener) in &snapshot {
            if !self.is_registered(event, *id) {
                continue;
            }
            invoked += 1;
            if panic::catch_unwind(AssertUnwindSafe(|| listener(payload))).is_err() {
                tracing::error!(event = %event, "Listener panicked");
            }
        }
        invoked
    }

    fn is_registered(&self, event: &str, id: ListenerId) -> bool {
        self.listeners
            .lock()
            .get(event)
            .is_some_and(|entries| entries.iter().any(|(entry_id, _)| *entry_id == id))
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .get(event)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock();
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(event, entries)| (event.as_str(), entries.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}
