//! Sync trigger coordination.
//!
//! Three triggers converge on the same queue drain: the host observing
//! connectivity coming back, a platform-scheduled background sync (which
//! survives the page being closed), and the periodic cadence. Each is
//! wrapped so nothing thrown inside a drain can propagate out and abort
//! the triggering event; the host penalizes workers that fail their
//! lifecycle events.

use std::fmt;

use crate::coordinator::Coordinator;
use crate::drain::DrainOutcome;

/// What woke the queue drain up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
    ConnectivityRestored,
    BackgroundSync(String),
    PeriodicSync,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTrigger::ConnectivityRestored => write!(f, "connectivity-restored"),
            SyncTrigger::BackgroundSync(tag) => write!(f, "background-sync:{tag}"),
            SyncTrigger::PeriodicSync => write!(f, "periodic-sync"),
        }
    }
}

impl Coordinator {
    /// Run a queue drain for one trigger, containing every failure.
    pub async fn drain_for_trigger(&self, trigger: SyncTrigger) {
        match self.drain_all().await {
            Ok(DrainOutcome::Completed(summary)) if summary.attempted > 0 => {
                tracing::info!(
                    %trigger,
                    attempted = summary.attempted,
                    delivered = summary.delivered,
                    rejected = summary.rejected,
                    retried = summary.retried,
                    dead_lettered = summary.dead_lettered,
                    "queue drain finished"
                );
            }
            Ok(DrainOutcome::Completed(_)) => {
                tracing::debug!(%trigger, "queue empty, nothing to drain");
            }
            Ok(DrainOutcome::AlreadyRunning) => {
                tracing::debug!(%trigger, "drain already in flight, trigger coalesced");
            }
            Err(e) => {
                tracing::warn!(%trigger, error = %e, "queue drain failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;
    use vowkeep_client::testing::FakeNetwork;
    use vowkeep_core::store::{CacheDb, QueuedMutation};
    use vowkeep_core::{AppConfig, HttpRequest};

    use super::*;

    async fn coordinator_with(net: Arc<FakeNetwork>) -> Coordinator {
        let db = CacheDb::open_in_memory().await.unwrap();
        let config = AppConfig { origin: "https://planner.test".into(), ..Default::default() };
        Coordinator::new(config, db, net).unwrap()
    }

    #[tokio::test]
    async fn test_all_triggers_drain() {
        let net = Arc::new(FakeNetwork::healthy());
        let coordinator = coordinator_with(net.clone()).await;

        for trigger in [
            SyncTrigger::ConnectivityRestored,
            SyncTrigger::BackgroundSync("mutations".into()),
            SyncTrigger::PeriodicSync,
        ] {
            let request =
                HttpRequest::with_body("POST", Url::parse("https://planner.test/api/guests").unwrap(), "{}");
            let mutation = QueuedMutation::from_request(&request);
            coordinator.db.enqueue_mutation(&mutation).await.unwrap();

            coordinator.drain_for_trigger(trigger).await;
            assert_eq!(coordinator.db.queue_len().await.unwrap(), 0);
        }

        assert_eq!(net.sends_to("https://planner.test/api/guests"), 3);
    }

    #[tokio::test]
    async fn test_trigger_never_panics_while_drain_held() {
        let net = Arc::new(FakeNetwork::healthy());
        let coordinator = coordinator_with(net).await;

        let _held = coordinator.drain_guard.try_lock().unwrap();
        // Coalesced silently; the triggering event settles normally.
        coordinator.drain_for_trigger(SyncTrigger::PeriodicSync).await;
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(SyncTrigger::BackgroundSync("mutations".into()).to_string(), "background-sync:mutations");
        assert_eq!(SyncTrigger::PeriodicSync.to_string(), "periodic-sync");
    }
}
