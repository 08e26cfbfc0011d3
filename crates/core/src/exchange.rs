//! Concrete request/response value types and request identity.
//!
//! The coordinator never works with the host platform's opaque request
//! objects directly; everything that crosses a component boundary is one
//! of the tagged value types here. Request identity, the key a cached
//! response is stored under, is a SHA-256 over method and canonical URL
//! (query included, fragment excluded).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Header attached to responses that were served from a cache tier
/// instead of the live network.
pub const SERVED_FROM_HEADER: &str = "x-served-from";

/// Header carrying the RFC 3339 time a fallback response was originally
/// stored, so the caller can present staleness to the user.
pub const CACHED_AT_HEADER: &str = "x-cached-at";

/// What kind of resource a request is asking for, as reported by the
/// intercepting host. Drives the image-vs-static classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Other,
}

/// An intercepted request, reduced to the fields the coordinator acts on.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: Url,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub destination: Destination,
    /// True for top-level HTML document loads.
    pub is_navigation: bool,
}

impl HttpRequest {
    /// A plain GET for the given URL.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: HashMap::new(),
            body: None,
            destination: Destination::Other,
            is_navigation: false,
        }
    }

    /// A request with a body (POST/PUT/PATCH/DELETE).
    pub fn with_body(method: &str, url: Url, body: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: HashMap::new(),
            body: Some(body.into()),
            destination: Destination::Other,
            is_navigation: false,
        }
    }

    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Mark this request as a top-level document navigation.
    pub fn navigation(mut self) -> Self {
        self.is_navigation = true;
        self.destination = Destination::Document;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Identity key for cache storage. Only meaningful for GETs; the
    /// method is folded in anyway so a mis-keyed write can never shadow
    /// a GET entry.
    pub fn identity(&self) -> String {
        compute_identity(&self.method, &self.url)
    }
}

/// A response as the coordinator hands it back to the host. Every fetch
/// path terminates in one of these; no error escapes as an exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, headers: HashMap::new(), body }
    }

    /// A JSON response with content-type set.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        // Serializing our own envelope structs cannot fail.
        let body = serde_json::to_vec(value).unwrap_or_default();
        let mut resp = Self::new(status, body);
        resp.headers.insert("content-type".to_string(), "application/json".to_string());
        resp
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Machine-readable envelope returned when an API read cannot be served
/// from either the network or a cache tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineEnvelope {
    pub error: String,
    pub offline: bool,
    pub timestamp: String,
}

impl OfflineEnvelope {
    pub fn response(error: &str) -> HttpResponse {
        let envelope = Self {
            error: error.to_string(),
            offline: true,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        HttpResponse::json(503, &envelope)
    }
}

/// Envelope returned immediately when a write is accepted into the
/// mutation queue instead of reaching the origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEnvelope {
    pub queued: bool,
    pub message: String,
    pub id: String,
}

impl QueuedEnvelope {
    pub fn response(id: &str) -> HttpResponse {
        let envelope = Self {
            queued: true,
            message: "saved offline, will sync when connection returns".to_string(),
            id: id.to_string(),
        };
        HttpResponse::json(202, &envelope)
    }
}

/// Compute the identity key for a (method, URL) pair.
///
/// The URL's fragment is ignored; the query string participates as-is
/// (not reordered), matching how the tiers are written through.
pub fn compute_identity(method: &str, url: &Url) -> String {
    let mut keyed = url.clone();
    keyed.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(keyed.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_identity_stability() {
        let a = compute_identity("GET", &url("https://planner.test/api/guests"));
        let b = compute_identity("get", &url("https://planner.test/api/guests"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_includes_query() {
        let a = compute_identity("GET", &url("https://planner.test/api/guests?page=1"));
        let b = compute_identity("GET", &url("https://planner.test/api/guests?page=2"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_ignores_fragment() {
        let a = compute_identity("GET", &url("https://planner.test/dashboard#budget"));
        let b = compute_identity("GET", &url("https://planner.test/dashboard"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_format() {
        let id = compute_identity("GET", &url("https://planner.test/"));
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_offline_envelope_shape() {
        let resp = OfflineEnvelope::response("no connection");
        assert_eq!(resp.status, 503);

        let parsed: OfflineEnvelope = serde_json::from_slice(&resp.body).unwrap();
        assert!(parsed.offline);
        assert_eq!(parsed.error, "no connection");
        assert!(!parsed.timestamp.is_empty());
    }

    #[test]
    fn test_queued_envelope_shape() {
        let resp = QueuedEnvelope::response("0193-abc");
        assert_eq!(resp.status, 202);

        let parsed: QueuedEnvelope = serde_json::from_slice(&resp.body).unwrap();
        assert!(parsed.queued);
        assert_eq!(parsed.id, "0193-abc");
    }

    #[test]
    fn test_request_builders() {
        let req = HttpRequest::get(url("https://planner.test/venue.jpg")).destination(Destination::Image);
        assert!(req.is_get());
        assert_eq!(req.destination, Destination::Image);
        assert!(!req.is_navigation);

        let nav = HttpRequest::get(url("https://planner.test/dashboard")).navigation();
        assert!(nav.is_navigation);
        assert_eq!(nav.destination, Destination::Document);

        let post = HttpRequest::with_body("post", url("https://planner.test/api/guests"), r#"{"name":"A"}"#);
        assert_eq!(post.method, "POST");
        assert!(!post.is_get());
    }

    #[test]
    fn test_response_status_classes() {
        assert!(HttpResponse::new(204, Vec::new()).is_success());
        assert!(HttpResponse::new(404, Vec::new()).is_client_error());
        assert!(!HttpResponse::new(500, Vec::new()).is_client_error());
        assert!(!HttpResponse::new(500, Vec::new()).is_success());
    }
}
