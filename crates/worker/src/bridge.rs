//! Client messaging bridge.
//!
//! Worker→client traffic is a broadcast channel of [`WorkerMessage`]
//! values; every connected foreground window holds a receiver. Client→
//! worker traffic is [`ClientCommand`] values handed to the coordinator.
//! Commands are idempotent and order-independent: replaying the same
//! command twice produces the same end state.
//!
//! The window registry only exists for broadcast and notification-click
//! routing; it is never persisted and dies with the worker.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};

use crate::push::{ClickAction, Notification};

/// How many undelivered messages a slow client may lag behind before it
/// starts losing the oldest ones.
const BROADCAST_CAPACITY: usize = 64;

/// Messages broadcast from the worker to all connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// A queued mutation reached the origin.
    #[serde(rename = "sync-success")]
    SyncSuccess { id: String, url: String },

    /// A queued mutation was rejected by the origin (4xx) and will not
    /// be retried.
    #[serde(rename = "sync-failed")]
    SyncFailed { id: String, status: u16 },

    /// A queued mutation exceeded the retry ceiling and was moved to
    /// the dead-letter log.
    #[serde(rename = "sync-dead-letter")]
    SyncDeadLetter { id: String, url: String },

    /// A new worker version finished activating.
    #[serde(rename = "update-ready")]
    UpdateReady { version: String },

    /// Diagnostics snapshot, sent when a cache-status request carried
    /// no reply port.
    #[serde(rename = "CACHE_STATUS")]
    CacheStatus(CacheStatus),

    /// A push payload arrived; the host should display this.
    #[serde(rename = "notification")]
    ShowNotification(Notification),

    /// Where a notification click resolved: dismiss, focus an open
    /// window, or open a new one.
    #[serde(rename = "notification-click")]
    NotificationClick(ClickAction),
}

/// Commands a foreground client sends to the worker.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// Force a waiting worker version through activation.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,

    /// Pre-warm the runtime tier with a list of routes.
    #[serde(rename = "CACHE_URLS")]
    CacheUrls { urls: Vec<String> },

    /// Ask for a diagnostics snapshot. Answered over the reply port if
    /// one is attached, otherwise broadcast.
    #[serde(rename = "GET_CACHE_STATUS")]
    GetCacheStatus {
        #[serde(skip)]
        reply: Option<oneshot::Sender<CacheStatus>>,
    },
}

/// Diagnostics snapshot for clients and operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Whether any tier currently holds entries.
    pub cached: bool,
    /// Active worker version suffix.
    pub version: String,
    pub tiers: Vec<TierStatus>,
    pub pending_mutations: u64,
    pub dead_letters: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierStatus {
    pub name: String,
    pub entries: u64,
}

/// A connected foreground window, known only for the lifetime of the
/// page itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: String,
    pub url: String,
}

/// Bidirectional message channel between the worker and its clients.
pub struct MessageBridge {
    tx: broadcast::Sender<WorkerMessage>,
    windows: Mutex<Vec<ClientWindow>>,
}

impl MessageBridge {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx, windows: Mutex::new(Vec::new()) }
    }

    /// Subscribe a client to worker broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.tx.subscribe()
    }

    /// Broadcast a message to every connected client. A send with no
    /// connected clients is not an error; the message just has nobody
    /// to hear it.
    pub fn send(&self, message: WorkerMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("worker message dropped, no connected clients");
        }
    }

    /// Record a newly connected window.
    pub fn register_window(&self, window: ClientWindow) {
        let mut windows = self.windows.lock().expect("windows lock");
        if !windows.iter().any(|w| w.id == window.id) {
            windows.push(window);
        }
    }

    /// Forget a window that navigated away or closed.
    pub fn remove_window(&self, id: &str) {
        self.windows.lock().expect("windows lock").retain(|w| w.id != id);
    }

    /// Currently connected windows.
    pub fn windows(&self) -> Vec<ClientWindow> {
        self.windows.lock().expect("windows lock").clone()
    }
}

impl Default for MessageBridge {
    fn default() -> Self {
        Self::new()
    }
}
