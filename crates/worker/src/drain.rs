//! Queue drain: one delivery attempt for every pending mutation.
//!
//! A drain pass walks the queue in enqueue order and gives each entry
//! exactly one attempt. An entry that fails is left for the *next*
//! pass, never retried inline, so one dead endpoint cannot starve the
//! rest of the queue. Only one pass runs at a time; a trigger landing
//! while a pass is in flight coalesces to a no-op.

use url::Url;
use vowkeep_core::exchange::Destination;
use vowkeep_core::store::QueuedMutation;
use vowkeep_core::{Error, HttpRequest};

use crate::bridge::WorkerMessage;
use crate::coordinator::Coordinator;

/// What a drain invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A full pass over the queue ran.
    Completed(DrainSummary),
    /// Another pass was already in flight; this trigger was coalesced.
    AlreadyRunning,
}

/// Per-pass accounting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    pub attempted: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

impl Coordinator {
    /// Attempt delivery of every pending mutation, in FIFO order.
    ///
    /// Terminal outcomes per entry: 2xx deletes and notifies success,
    /// 4xx deletes and notifies rejection (a client error would repeat
    /// forever), transport failure or 5xx bumps the retry count and
    /// dead-letters past the ceiling.
    pub async fn drain_all(&self) -> Result<DrainOutcome, Error> {
        let Ok(_guard) = self.drain_guard.try_lock() else {
            tracing::debug!("drain already in flight, coalescing trigger");
            return Ok(DrainOutcome::AlreadyRunning);
        };

        let pending = self.db.pending_mutations().await?;
        let mut summary = DrainSummary::default();

        for mutation in pending {
            summary.attempted += 1;

            let request = match mutation_request(&mutation) {
                Ok(request) => request,
                Err(e) => {
                    // A record that cannot be turned back into a request
                    // would wedge the queue forever; abandon it now.
                    self.abandon(&mutation, &format!("unsendable record: {e}"), &mut summary).await?;
                    continue;
                }
            };

            match self.net.send(&request).await {
                Ok(response) if response.is_success() => {
                    self.db.delete_mutation(&mutation.id).await?;
                    summary.delivered += 1;
                    tracing::info!(id = %mutation.id, url = %mutation.url, "queued mutation delivered");
                    self.bridge.send(WorkerMessage::SyncSuccess {
                        id: mutation.id.clone(),
                        url: mutation.url.clone(),
                    });
                }
                Ok(response) if response.is_client_error() => {
                    self.db.delete_mutation(&mutation.id).await?;
                    summary.rejected += 1;
                    tracing::warn!(
                        id = %mutation.id,
                        url = %mutation.url,
                        status = response.status,
                        "queued mutation rejected by origin, not retrying"
                    );
                    self.bridge
                        .send(WorkerMessage::SyncFailed { id: mutation.id.clone(), status: response.status });
                }
                Ok(response) => {
                    self.note_failed_attempt(&mutation, &format!("origin returned {}", response.status), &mut summary)
                        .await?;
                }
                Err(e) => {
                    self.note_failed_attempt(&mutation, &e.to_string(), &mut summary).await?;
                }
            }
        }

        Ok(DrainOutcome::Completed(summary))
    }

    async fn note_failed_attempt(
        &self, mutation: &QueuedMutation, reason: &str, summary: &mut DrainSummary,
    ) -> Result<(), Error> {
        let retry_count = self.db.bump_mutation_retry(&mutation.id).await?;
        if retry_count > self.config.retry_ceiling {
            self.abandon(mutation, reason, summary).await?;
        } else {
            summary.retried += 1;
            tracing::debug!(id = %mutation.id, retry_count, reason, "mutation delivery failed, will retry");
        }
        Ok(())
    }

    async fn abandon(&self, mutation: &QueuedMutation, reason: &str, summary: &mut DrainSummary) -> Result<(), Error> {
        self.db
            .dead_letter_mutation(&mutation.id, reason, self.config.dead_letter_cap)
            .await?;
        summary.dead_lettered += 1;
        tracing::warn!(id = %mutation.id, url = %mutation.url, reason, "mutation abandoned to dead-letter log");
        self.bridge
            .send(WorkerMessage::SyncDeadLetter { id: mutation.id.clone(), url: mutation.url.clone() });
        Ok(())
    }
}

/// Rebuild the sendable request from a stored queue record.
fn mutation_request(mutation: &QueuedMutation) -> Result<HttpRequest, Error> {
    let url = Url::parse(&mutation.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    Ok(HttpRequest {
        method: mutation.method.clone(),
        url,
        headers: mutation.headers.clone(),
        body: mutation.body.clone(),
        destination: Destination::Other,
        is_navigation: false,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vowkeep_client::testing::{FakeNetwork, FakeOutcome};
    use vowkeep_core::store::CacheDb;
    use vowkeep_core::AppConfig;

    use super::*;

    async fn coordinator_with(net: Arc<FakeNetwork>) -> Coordinator {
        let db = CacheDb::open_in_memory().await.unwrap();
        let config = AppConfig { origin: "https://planner.test".into(), ..Default::default() };
        Coordinator::new(config, db, net).unwrap()
    }

    fn make_mutation(url: &str, body: &str) -> QueuedMutation {
        let request = HttpRequest::with_body("POST", Url::parse(url).unwrap(), body);
        QueuedMutation::from_request(&request)
    }

    fn completed(outcome: DrainOutcome) -> DrainSummary {
        match outcome {
            DrainOutcome::Completed(summary) => summary,
            DrainOutcome::AlreadyRunning => panic!("drain was unexpectedly coalesced"),
        }
    }

    #[tokio::test]
    async fn test_drain_delivers_and_empties_queue() {
        let net = Arc::new(FakeNetwork::healthy());
        let coordinator = coordinator_with(net.clone()).await;
        let mut rx = coordinator.bridge().subscribe();

        let mutation = make_mutation("https://planner.test/api/guests", r#"{"name":"A"}"#);
        coordinator.db.enqueue_mutation(&mutation).await.unwrap();

        let summary = completed(coordinator.drain_all().await.unwrap());

        assert_eq!(summary.delivered, 1);
        assert_eq!(coordinator.db.queue_len().await.unwrap(), 0);
        assert_eq!(net.sends_to("https://planner.test/api/guests"), 1);

        // The replayed request carries the original body.
        let sent = net.requests();
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"name":"A"}"#));
        assert_eq!(sent[0].method, "POST");

        let message = rx.recv().await.unwrap();
        assert!(matches!(message, WorkerMessage::SyncSuccess { ref id, .. } if *id == mutation.id));
    }

    #[tokio::test]
    async fn test_drain_preserves_fifo_order() {
        let net = Arc::new(FakeNetwork::healthy());
        let coordinator = coordinator_with(net.clone()).await;

        let first = make_mutation("https://planner.test/api/guests", "1");
        let second = make_mutation("https://planner.test/api/vendors", "2");
        let third = make_mutation("https://planner.test/api/budget", "3");
        for m in [&first, &second, &third] {
            coordinator.db.enqueue_mutation(m).await.unwrap();
        }

        completed(coordinator.drain_all().await.unwrap());

        let paths: Vec<String> = net.requests().iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(paths, vec!["/api/guests", "/api/vendors", "/api/budget"]);
    }

    #[tokio::test]
    async fn test_drain_twice_sends_nothing_new() {
        let net = Arc::new(FakeNetwork::healthy());
        let coordinator = coordinator_with(net.clone()).await;
        let mutation = make_mutation("https://planner.test/api/guests", "{}");
        coordinator.db.enqueue_mutation(&mutation).await.unwrap();

        completed(coordinator.drain_all().await.unwrap());
        let second = completed(coordinator.drain_all().await.unwrap());

        assert_eq!(second.attempted, 0);
        assert_eq!(net.sends_to("https://planner.test/api/guests"), 1);
    }

    #[tokio::test]
    async fn test_drain_rejection_deletes_without_retry() {
        let net = Arc::new(FakeNetwork::healthy());
        let url = "https://planner.test/api/guests";
        net.script(url, FakeOutcome::status(409));
        let coordinator = coordinator_with(net.clone()).await;
        let mut rx = coordinator.bridge().subscribe();

        let mutation = make_mutation(url, "{}");
        coordinator.db.enqueue_mutation(&mutation).await.unwrap();

        let summary = completed(coordinator.drain_all().await.unwrap());

        assert_eq!(summary.rejected, 1);
        assert_eq!(coordinator.db.queue_len().await.unwrap(), 0);
        assert_eq!(coordinator.db.dead_letter_len().await.unwrap(), 0);

        let message = rx.recv().await.unwrap();
        assert!(matches!(message, WorkerMessage::SyncFailed { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_retry_ceiling_dead_letters_on_fourth_attempt() {
        let net = Arc::new(FakeNetwork::offline());
        let coordinator = coordinator_with(net.clone()).await;
        let mut rx = coordinator.bridge().subscribe();

        let mutation = make_mutation("https://planner.test/api/guests", r#"{"name":"A"}"#);
        coordinator.db.enqueue_mutation(&mutation).await.unwrap();

        // Ceiling is 3: three failing drains accumulate retries...
        for _ in 0..3 {
            let summary = completed(coordinator.drain_all().await.unwrap());
            assert_eq!(summary.retried, 1);
        }
        assert_eq!(coordinator.db.queue_len().await.unwrap(), 1);

        // ...and the fourth failing attempt abandons the entry.
        let summary = completed(coordinator.drain_all().await.unwrap());
        assert_eq!(summary.dead_lettered, 1);
        assert_eq!(coordinator.db.queue_len().await.unwrap(), 0);

        let letters = coordinator.db.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].id, mutation.id);
        assert_eq!(letters[0].retry_count, 4);

        let message = rx.recv().await.unwrap();
        assert!(matches!(message, WorkerMessage::SyncDeadLetter { ref id, .. } if *id == mutation.id));
    }

    #[tokio::test]
    async fn test_5xx_counts_as_retryable_failure() {
        let net = Arc::new(FakeNetwork::healthy());
        let url = "https://planner.test/api/guests";
        net.script(url, FakeOutcome::status(503));
        net.script(url, FakeOutcome::Respond { status: 201, body: Vec::new() });
        let coordinator = coordinator_with(net.clone()).await;

        let mutation = make_mutation(url, "{}");
        coordinator.db.enqueue_mutation(&mutation).await.unwrap();

        let summary = completed(coordinator.drain_all().await.unwrap());
        assert_eq!(summary.retried, 1);
        assert_eq!(coordinator.db.queue_len().await.unwrap(), 1);

        let summary = completed(coordinator.drain_all().await.unwrap());
        assert_eq!(summary.delivered, 1);
        assert_eq!(coordinator.db.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_rest() {
        let net = Arc::new(FakeNetwork::healthy());
        net.script("https://planner.test/api/vendors", FakeOutcome::Unreachable);
        let coordinator = coordinator_with(net.clone()).await;

        let stuck = make_mutation("https://planner.test/api/vendors", "1");
        let fine = make_mutation("https://planner.test/api/guests", "2");
        coordinator.db.enqueue_mutation(&stuck).await.unwrap();
        coordinator.db.enqueue_mutation(&fine).await.unwrap();

        let summary = completed(coordinator.drain_all().await.unwrap());

        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.retried, 1);
        let remaining = coordinator.db.pending_mutations().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, stuck.id);
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_coalesced() {
        let net = Arc::new(FakeNetwork::healthy());
        let coordinator = coordinator_with(net).await;

        let _held = coordinator.drain_guard.try_lock().unwrap();
        let outcome = coordinator.drain_all().await.unwrap();

        assert_eq!(outcome, DrainOutcome::AlreadyRunning);
    }
}
