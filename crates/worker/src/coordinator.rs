//! The coordinator: process-wide state and the event dispatch table.
//!
//! All worker-scope state lives in one [`Coordinator`] value with a
//! defined init and no teardown (the host kills the process whenever it
//! likes, which is why every durable mutation in the store is atomic).
//! Host events enter through [`Coordinator::dispatch`], which awaits the
//! handler's entire async chain before returning. Returning is the
//! signal that the event is settled, so nothing is left running that a
//! worker shutdown could cut in half.
//!
//! No event handler lets an error escape: fetch events always settle
//! into a concrete response (or an explicit passthrough), and lifecycle
//! events log and swallow.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use vowkeep_client::Network;
use vowkeep_core::store::CacheDb;
use vowkeep_core::{AppConfig, Error, HttpRequest, HttpResponse, TierKind};

use crate::bridge::{CacheStatus, ClientCommand, ClientWindow, MessageBridge, TierStatus, WorkerMessage};
use crate::classify::RoutePolicy;
use crate::lifecycle::WorkerPhase;
use crate::push::{Notification, PushPayload, route_click};
use crate::sync::SyncTrigger;

/// A host event delivered to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The worker version was just registered; pre-populate the static
    /// tier.
    Install,
    /// The worker version is taking control; purge stale tiers first.
    Activate,
    /// An intercepted request.
    Fetch(HttpRequest),
    /// A platform-scheduled background sync fired.
    Sync { tag: String },
    /// The periodic sync cadence elapsed.
    PeriodicSync,
    /// The host observed connectivity coming back.
    ConnectivityRestored,
    /// A push payload arrived.
    Push(Vec<u8>),
    /// The user clicked a displayed notification.
    NotificationClick { action: Option<String>, url: String },
    /// A foreground window attached to this worker.
    ClientConnected(ClientWindow),
    /// A foreground window navigated away or closed.
    ClientDisconnected { id: String },
    /// A command from a foreground client.
    Message(ClientCommand),
}

/// What the interception layer should do with a fetch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The coordinator produced this response.
    Respond(HttpResponse),
    /// Not intercepted; the host performs its default fetch.
    Passthrough,
}

/// Process-wide coordinator state. One per worker process.
pub struct Coordinator {
    pub(crate) config: AppConfig,
    pub(crate) db: CacheDb,
    pub(crate) net: Arc<dyn Network>,
    pub(crate) policy: RoutePolicy,
    pub(crate) bridge: MessageBridge,
    pub(crate) phase: RwLock<WorkerPhase>,
    /// The single serialization point: at most one queue drain at a time.
    pub(crate) drain_guard: Mutex<()>,
}

impl Coordinator {
    pub fn new(config: AppConfig, db: CacheDb, net: Arc<dyn Network>) -> Result<Self, Error> {
        let policy = RoutePolicy::from_config(&config)?;
        Ok(Self {
            config,
            db,
            net,
            policy,
            bridge: MessageBridge::new(),
            phase: RwLock::new(WorkerPhase::Installing),
            drain_guard: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bridge(&self) -> &MessageBridge {
        &self.bridge
    }

    /// The application origin requests are resolved against.
    pub fn origin(&self) -> &url::Url {
        self.policy.origin()
    }

    /// Dispatch one host event and await its whole async chain.
    ///
    /// Returns `Some` only for fetch events. Errors inside lifecycle and
    /// sync handlers are logged here and never propagate back into the
    /// host event.
    pub async fn dispatch(&self, event: WorkerEvent) -> Option<FetchOutcome> {
        match event {
            WorkerEvent::Install => {
                if let Err(e) = self.install().await {
                    tracing::warn!(error = %e, "install failed");
                }
                None
            }
            WorkerEvent::Activate => {
                if let Err(e) = self.activate().await {
                    tracing::warn!(error = %e, "activate failed");
                }
                None
            }
            WorkerEvent::Fetch(request) => Some(self.handle_fetch(request).await),
            WorkerEvent::Sync { tag } => {
                self.drain_for_trigger(SyncTrigger::BackgroundSync(tag)).await;
                None
            }
            WorkerEvent::PeriodicSync => {
                self.drain_for_trigger(SyncTrigger::PeriodicSync).await;
                None
            }
            WorkerEvent::ConnectivityRestored => {
                self.drain_for_trigger(SyncTrigger::ConnectivityRestored).await;
                None
            }
            WorkerEvent::Push(payload) => {
                self.handle_push(&payload);
                None
            }
            WorkerEvent::NotificationClick { action, url } => {
                let decision = route_click(action.as_deref(), &url, &self.bridge.windows());
                tracing::debug!(url = %url, ?decision, "notification click routed");
                self.bridge.send(WorkerMessage::NotificationClick(decision));
                None
            }
            WorkerEvent::ClientConnected(window) => {
                tracing::debug!(id = %window.id, url = %window.url, "client connected");
                self.bridge.register_window(window);
                None
            }
            WorkerEvent::ClientDisconnected { id } => {
                tracing::debug!(id = %id, "client disconnected");
                self.bridge.remove_window(&id);
                None
            }
            WorkerEvent::Message(command) => {
                self.handle_command(command).await;
                None
            }
        }
    }

    /// Shape a push payload into a notification and hand it to clients
    /// for display.
    fn handle_push(&self, payload: &[u8]) {
        let notification: Notification = PushPayload::parse(payload).into();
        tracing::debug!(tag = %notification.tag, "push received");
        self.bridge.send(WorkerMessage::ShowNotification(notification));
    }

    /// Handle a client command. Every command is idempotent: replaying
    /// one produces the same end state.
    pub(crate) async fn handle_command(&self, command: ClientCommand) {
        match command {
            ClientCommand::SkipWaiting => self.skip_waiting().await,
            ClientCommand::CacheUrls { urls } => self.cache_urls(&urls).await,
            ClientCommand::GetCacheStatus { reply } => {
                let status = match self.cache_status().await {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::warn!(error = %e, "cache status unavailable");
                        return;
                    }
                };
                match reply {
                    Some(port) => {
                        if port.send(status).is_err() {
                            tracing::debug!("cache status reply port closed");
                        }
                    }
                    None => self.bridge.send(WorkerMessage::CacheStatus(status)),
                }
            }
        }
    }

    /// Pre-warm the runtime tier with the given routes. Failures are
    /// per-route and non-fatal; re-running with the same list converges
    /// on the same tier contents.
    async fn cache_urls(&self, urls: &[String]) {
        let tier = TierKind::Runtime.name(&self.config.version_suffix);
        for raw in urls {
            match vowkeep_client::net::resolve(self.policy.origin(), raw) {
                Ok(url) => {
                    let request = HttpRequest::get(url);
                    self.fetch_into_tier(&request, &tier).await;
                }
                Err(e) => tracing::warn!(url = %raw, error = %e, "unresolvable pre-warm route"),
            }
        }
    }

    /// Diagnostics snapshot across tiers, queue, and dead letters.
    pub async fn cache_status(&self) -> Result<CacheStatus, Error> {
        let mut tiers = Vec::new();
        for kind in TierKind::ALL {
            let name = kind.name(&self.config.version_suffix);
            let entries = self.db.tier_len(&name).await?;
            tiers.push(TierStatus { name, entries });
        }

        Ok(CacheStatus {
            cached: tiers.iter().any(|t| t.entries > 0),
            version: self.config.version_suffix.clone(),
            tiers,
            pending_mutations: self.db.queue_len().await?,
            dead_letters: self.db.dead_letter_len().await?,
        })
    }
}
