//! Request classification.
//!
//! Every intercepted request is assigned to exactly one handling
//! strategy by a fixed priority ladder. Classification is deterministic
//! and side-effect-free so it can be tested purely on synthetic request
//! descriptors.

use url::Url;
use vowkeep_core::exchange::Destination;
use vowkeep_core::{AppConfig, Error, HttpRequest};

/// The handling strategy a request is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the host's default fetch applies.
    Skip,
    /// Cache-first against the static/runtime tiers, offline-page
    /// fallback for navigations.
    Static,
    /// Network-first with timeout against the API tier.
    Api,
    /// Cache-first against the image tier, empty-image fallback.
    Image,
    /// Non-idempotent API request: send, queue on transport failure.
    Mutation,
}

/// Classifier inputs derived from configuration.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    origin: Url,
    api_prefix: String,
}

impl RoutePolicy {
    pub fn new(origin: Url, api_prefix: String) -> Self {
        Self { origin, api_prefix }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(origin, config.api_prefix.clone()))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn is_api_path(&self, request: &HttpRequest) -> bool {
        request.url.path().starts_with(&self.api_prefix)
    }

    fn is_same_origin(&self, request: &HttpRequest) -> bool {
        request.url.origin() == self.origin.origin()
    }
}

/// Assign a request to its handling strategy.
///
/// The rules form a total order; earlier rules win:
/// 1. non-GET on the API prefix → `Mutation`
/// 2. non-GET otherwise → `Skip`
/// 3. cross-origin → `Skip`
/// 4. navigation → `Static`
/// 5. GET on the API prefix → `Api`
/// 6. GET with image destination → `Image`
/// 7. any other GET → `Static`
pub fn classify(request: &HttpRequest, policy: &RoutePolicy) -> Route {
    if !request.is_get() {
        return if policy.is_api_path(request) { Route::Mutation } else { Route::Skip };
    }

    if !policy.is_same_origin(request) {
        return Route::Skip;
    }

    if request.is_navigation {
        return Route::Static;
    }

    if policy.is_api_path(request) {
        return Route::Api;
    }

    if request.destination == Destination::Image {
        return Route::Image;
    }

    Route::Static
}
