//! Scripted network double for strategy, drain, and coordinator tests.
//!
//! `FakeNetwork` answers through the same [`Network`] seam as the real
//! origin client, from a per-URL script. Outcomes queued for a URL are
//! consumed in order; the last one repeats. URLs with no script fall
//! back to the network-wide default, so `FakeNetwork::offline()` makes
//! every request fail and `FakeNetwork::healthy()` makes every request
//! succeed unless told otherwise.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use vowkeep_core::{Error, HttpRequest, HttpResponse};

use crate::net::Network;

/// One scripted outcome for a request.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Answer with this status and body.
    Respond { status: u16, body: Vec<u8> },
    /// Fail as if the origin were unreachable.
    Unreachable,
    /// Fail as if the request hit the deadline.
    TimedOut,
}

impl FakeOutcome {
    pub fn ok(body: &[u8]) -> Self {
        FakeOutcome::Respond { status: 200, body: body.to_vec() }
    }

    pub fn status(status: u16) -> Self {
        FakeOutcome::Respond { status, body: Vec::new() }
    }
}

/// A network whose behavior is fully scripted by the test.
pub struct FakeNetwork {
    scripted: Mutex<HashMap<String, VecDeque<FakeOutcome>>>,
    last: Mutex<HashMap<String, FakeOutcome>>,
    fallback: Mutex<FakeOutcome>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl FakeNetwork {
    /// Every unscripted request succeeds with 200 "ok".
    pub fn healthy() -> Self {
        Self::with_fallback(FakeOutcome::ok(b"ok"))
    }

    /// Every unscripted request fails as unreachable.
    pub fn offline() -> Self {
        Self::with_fallback(FakeOutcome::Unreachable)
    }

    fn with_fallback(fallback: FakeOutcome) -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            last: Mutex::new(HashMap::new()),
            fallback: Mutex::new(fallback),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queue an outcome for one URL. May be called repeatedly; outcomes
    /// play in order and the final one repeats.
    pub fn script(&self, url: &str, outcome: FakeOutcome) {
        self.scripted
            .lock()
            .expect("script lock")
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Replace the outcome for unscripted URLs.
    pub fn set_fallback(&self, outcome: FakeOutcome) {
        *self.fallback.lock().expect("fallback lock") = outcome;
    }

    /// Every request this network has seen, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// How many requests were sent to the given URL.
    pub fn sends_to(&self, url: &str) -> usize {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }

    fn next_outcome(&self, url: &str) -> FakeOutcome {
        let mut scripted = self.scripted.lock().expect("script lock");
        if let Some(queue) = scripted.get_mut(url)
            && let Some(outcome) = queue.pop_front()
        {
            self.last.lock().expect("last lock").insert(url.to_string(), outcome.clone());
            return outcome;
        }
        // The queue is empty: a scripted URL repeats its final outcome, an
        // untouched URL falls back to the network-wide default.
        if let Some(outcome) = self.last.lock().expect("last lock").get(url) {
            return outcome.clone();
        }
        self.fallback.lock().expect("fallback lock").clone()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        self.sent.lock().expect("sent lock").push(request.clone());

        match self.next_outcome(request.url.as_str()) {
            FakeOutcome::Respond { status, body } => Ok(HttpResponse::new(status, body)),
            FakeOutcome::Unreachable => Err(Error::Network("connection refused".to_string())),
            FakeOutcome::TimedOut => Err(Error::Timeout(5_000)),
        }
    }
}
