//! Strategy executors.
//!
//! Three read strategies plus the mutation diversion, all with the same
//! outer contract: every path terminates in a concrete response (or an
//! explicit passthrough). Transport failures turn into fallbacks, never
//! into errors escaping the fetch event.
//!
//! - cache-first (static/runtime, image tiers): a hit returns without
//!   touching the network; a miss fetches and writes through.
//! - network-first with timeout (API tier): the network is always
//!   consulted first while healthy; the tier only answers when the
//!   origin is unreachable or over deadline, and then the response
//!   carries the staleness markers.
//! - mutation diversion: a write that cannot reach the origin is
//!   persisted to the queue and acknowledged with 202 so the UI can
//!   continue optimistically.

use vowkeep_core::exchange::{OfflineEnvelope, QueuedEnvelope};
use vowkeep_core::store::QueuedMutation;
use vowkeep_core::{CachedEntry, HttpRequest, HttpResponse, TierKind};

use crate::classify::{Route, classify};
use crate::coordinator::{Coordinator, FetchOutcome};

impl Coordinator {
    /// Run one intercepted request through its assigned strategy.
    pub async fn handle_fetch(&self, request: HttpRequest) -> FetchOutcome {
        match classify(&request, &self.policy) {
            Route::Skip => FetchOutcome::Passthrough,
            Route::Static => FetchOutcome::Respond(self.cache_first_static(&request).await),
            Route::Image => FetchOutcome::Respond(self.cache_first_image(&request).await),
            Route::Api => FetchOutcome::Respond(self.network_first_api(&request).await),
            Route::Mutation => FetchOutcome::Respond(self.divert_mutation(&request).await),
        }
    }

    /// Cache-first over the static then runtime tiers. Misses are
    /// fetched and written through to the runtime tier (the static tier
    /// belongs to install).
    async fn cache_first_static(&self, request: &HttpRequest) -> HttpResponse {
        let suffix = &self.config.version_suffix;
        let identity = request.identity();

        for tier in [TierKind::Static.name(suffix), TierKind::Runtime.name(suffix)] {
            if let Some(entry) = self.read_tier(&tier, &identity).await {
                return entry.into_response();
            }
        }

        match self.net.send(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.write_through(TierKind::Runtime, request, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "static fetch failed, falling back");
                self.static_fallback(request).await
            }
        }
    }

    /// Cache-first over the image tier with an empty 404 fallback, so a
    /// missing image renders as a broken image rather than an error page.
    async fn cache_first_image(&self, request: &HttpRequest) -> HttpResponse {
        let tier = TierKind::Image.name(&self.config.version_suffix);
        let identity = request.identity();

        if let Some(entry) = self.read_tier(&tier, &identity).await {
            return entry.into_response();
        }

        match self.net.send(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.write_through(TierKind::Image, request, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "image fetch failed, falling back");
                HttpResponse::new(404, Vec::new())
            }
        }
    }

    /// Network-first with a hard deadline. The API tier is never the
    /// primary source while the network answers in time; on transport
    /// failure or timeout a cached copy is served with the staleness
    /// markers, and with no cached copy the structured offline envelope
    /// goes out instead of an error.
    async fn network_first_api(&self, request: &HttpRequest) -> HttpResponse {
        let tier = TierKind::Api.name(&self.config.version_suffix);
        let identity = request.identity();

        match tokio::time::timeout(self.config.network_timeout(), self.net.send(request)).await {
            Ok(Ok(response)) => {
                if response.is_success() {
                    self.write_through(TierKind::Api, request, &response).await;
                }
                response
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %request.url, error = %e, "api fetch failed, trying tier");
                self.api_fallback(&tier, &identity).await
            }
            Err(_) => {
                // The underlying fetch may still complete; its result is
                // simply discarded.
                tracing::debug!(
                    url = %request.url,
                    timeout_ms = self.config.network_timeout_ms,
                    "api fetch over deadline, trying tier"
                );
                self.api_fallback(&tier, &identity).await
            }
        }
    }

    async fn api_fallback(&self, tier: &str, identity: &str) -> HttpResponse {
        match self.read_tier(tier, identity).await {
            Some(entry) => entry.into_stale_response(),
            None => OfflineEnvelope::response("network unreachable and no cached copy"),
        }
    }

    /// Send a write to the origin; divert it to the mutation queue when
    /// the origin is unreachable. The caller gets a 202 acknowledgement
    /// with the queue id and the UI continues optimistically.
    async fn divert_mutation(&self, request: &HttpRequest) -> HttpResponse {
        match self.net.send(request).await {
            Ok(response) => response,
            Err(e) if e.is_transport() => {
                let mutation = QueuedMutation::from_request(request);
                match self.db.enqueue_mutation(&mutation).await {
                    Ok(()) => {
                        tracing::info!(id = %mutation.id, url = %mutation.url, "mutation queued for sync");
                        QueuedEnvelope::response(&mutation.id)
                    }
                    Err(store_err) => {
                        tracing::error!(url = %request.url, error = %store_err, "mutation could not be queued");
                        OfflineEnvelope::response("write could not be queued")
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "mutation send failed");
                OfflineEnvelope::response(&e.to_string())
            }
        }
    }

    /// The navigation fallback is the precached offline page; anything
    /// else gets a plain 503.
    async fn static_fallback(&self, request: &HttpRequest) -> HttpResponse {
        if request.is_navigation
            && let Ok(url) = vowkeep_client::net::resolve(self.policy.origin(), &self.config.offline_page)
        {
            let offline_request = HttpRequest::get(url);
            let tier = TierKind::Static.name(&self.config.version_suffix);
            if let Some(entry) = self.read_tier(&tier, &offline_request.identity()).await {
                return entry.into_stale_response();
            }
        }

        HttpResponse::new(503, b"offline".to_vec()).header("content-type", "text/plain")
    }

    /// Tier read that degrades to a miss on storage failure.
    async fn read_tier(&self, tier: &str, identity: &str) -> Option<CachedEntry> {
        match self.db.get_entry(tier, identity).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(tier = %tier, error = %e, "tier read failed, treating as miss");
                None
            }
        }
    }

    /// Best-effort write-through. Storage failure (quota, corruption)
    /// is logged and swallowed; caching is an optimization, not a
    /// correctness requirement on read paths.
    async fn write_through(&self, kind: TierKind, request: &HttpRequest, response: &HttpResponse) {
        let tier = kind.name(&self.config.version_suffix);
        let entry = CachedEntry::snapshot(tier, request, response);
        if let Err(e) = self.db.put_entry(&entry).await {
            tracing::warn!(tier = %entry.tier, url = %entry.url, error = %e, "cache write failed, serving network-only");
        }
    }

    /// Fetch a route and store it in the given tier (pre-warm path).
    pub(crate) async fn fetch_into_tier(&self, request: &HttpRequest, tier: &str) {
        match self.net.send(request).await {
            Ok(response) if response.is_success() => {
                let entry = CachedEntry::snapshot(tier.to_string(), request, &response);
                if let Err(e) = self.db.put_entry(&entry).await {
                    tracing::warn!(tier = %tier, url = %request.url, error = %e, "pre-warm write failed");
                }
            }
            Ok(response) => {
                tracing::warn!(url = %request.url, status = response.status, "pre-warm route not cached");
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "pre-warm route unreachable");
            }
        }
    }
}
