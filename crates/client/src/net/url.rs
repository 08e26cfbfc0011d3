//! URL resolution and canonicalization for consistent cache identity.
//!
//! Requests arrive either as absolute URLs or as origin-relative paths
//! (`/api/guests`). Both are resolved against the configured origin and
//! normalized the same way, so the identity a response is cached under
//! never depends on how the request was spelled.

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a request target against the application origin.
///
/// Accepts an absolute http(s) URL or an origin-relative path. The
/// result is canonicalized: host lowercased, fragment removed, query
/// kept intact (not reordered).
pub fn resolve(origin: &url::Url, input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let resolved = if trimmed.contains("://") {
        url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
    } else {
        origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
    };

    canonicalize(resolved)
}

/// Canonicalize an already-parsed URL.
///
/// Normalization steps:
/// 1. Reject non-http(s) schemes
/// 2. Lowercase the host
/// 3. Remove fragment (#...)
/// 4. Keep query string intact
pub fn canonicalize(mut parsed: url::Url) -> Result<url::Url, UrlError> {
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            parsed
                .set_host(Some(&lowered))
                .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
        }
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
