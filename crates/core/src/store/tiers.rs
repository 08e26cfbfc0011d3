//! Cache tier operations.
//!
//! A tier is a named, versioned namespace of cached responses. The name
//! always encodes the active version suffix (`static-v2`, `api-v2`…);
//! activation purges every row whose tier name carries any other suffix,
//! which is what keeps exactly one version of each tier alive.

use std::collections::HashMap;

use super::connection::CacheDb;
use crate::Error;
use crate::exchange::{CACHED_AT_HEADER, HttpRequest, HttpResponse, SERVED_FROM_HEADER};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// The logical cache tiers, one per class of cached response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// Precached application shell: routes fetched at install time.
    Static,
    /// Pages and assets cached lazily as they are fetched.
    Runtime,
    /// Image responses, kept apart so their fallback differs.
    Image,
    /// API GET responses, keyed by full URL and query.
    Api,
}

impl TierKind {
    pub const ALL: [TierKind; 4] = [TierKind::Static, TierKind::Runtime, TierKind::Image, TierKind::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Static => "static",
            TierKind::Runtime => "runtime",
            TierKind::Image => "image",
            TierKind::Api => "api",
        }
    }

    /// The versioned tier name rows are stored under.
    pub fn name(&self, version_suffix: &str) -> String {
        format!("{}-{}", self.as_str(), version_suffix)
    }
}

/// A cached response snapshot plus the time it was stored and the
/// request identity it answers. Mutated only by overwrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub tier: String,
    pub identity: String,
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl CachedEntry {
    /// Snapshot a response about to be written through to a tier.
    pub fn snapshot(tier: String, request: &HttpRequest, response: &HttpResponse) -> Self {
        Self {
            tier,
            identity: request.identity(),
            url: request.url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild the response exactly as it was stored.
    pub fn into_response(self) -> HttpResponse {
        HttpResponse { status: self.status, headers: self.headers, body: self.body }
    }

    /// Rebuild the response annotated as a cache fallback: the caller
    /// can see it was not fetched live and when it was stored.
    pub fn into_stale_response(self) -> HttpResponse {
        let stored_at = self.stored_at.clone();
        self.into_response()
            .header(SERVED_FROM_HEADER, "cache")
            .header(CACHED_AT_HEADER, &stored_at)
    }
}

impl CacheDb {
    /// Insert or overwrite a cached entry.
    ///
    /// Uses UPSERT semantics keyed by (tier, identity): a repeated
    /// write-through for the same request replaces the old snapshot.
    pub async fn put_entry(&self, entry: &CachedEntry) -> Result<(), Error> {
        let entry = entry.clone();
        let headers_json = serde_json::to_string(&entry.headers)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO tier_entries (tier, identity, url, status, headers_json, body, stored_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(tier, identity) DO UPDATE SET
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        &entry.tier,
                        &entry.identity,
                        &entry.url,
                        entry.status,
                        &headers_json,
                        &entry.body,
                        &entry.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a cached entry by tier and request identity.
    ///
    /// Returns None if the tier has no snapshot for that identity.
    pub async fn get_entry(&self, tier: &str, identity: &str) -> Result<Option<CachedEntry>, Error> {
        let tier = tier.to_string();
        let identity = identity.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT tier, identity, url, status, headers_json, body, stored_at
                    FROM tier_entries WHERE tier = ?1 AND identity = ?2",
                )?;

                let result = stmt.query_row(params![tier, identity], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                });

                match result {
                    Ok((tier, identity, url, status, headers_json, body, stored_at)) => {
                        let headers: HashMap<String, String> =
                            serde_json::from_str(&headers_json).map_err(Error::from)?;
                        Ok(Some(CachedEntry { tier, identity, url, status, headers, body, stored_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry whose tier name does not carry the active
    /// version suffix.
    ///
    /// Must run to completion before the worker starts serving clients
    /// on a new version, so no request is ever answered from a stale
    /// tier. Returns the number of deleted entries.
    pub async fn purge_stale_tiers(&self, active_suffix: &str) -> Result<u64, Error> {
        let active: Vec<String> = TierKind::ALL.iter().map(|k| k.name(active_suffix)).collect();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM tier_entries WHERE tier NOT IN (?1, ?2, ?3, ?4)",
                    params![&active[0], &active[1], &active[2], &active[3]],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// All distinct tier names currently holding entries.
    pub async fn tier_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT DISTINCT tier FROM tier_entries ORDER BY tier")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in one tier.
    pub async fn tier_len(&self, tier: &str) -> Result<u64, Error> {
        let tier = tier.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM tier_entries WHERE tier = ?1", params![tier], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn make_request(url: &str) -> HttpRequest {
        HttpRequest::get(Url::parse(url).unwrap())
    }

    fn make_entry(tier: &str, url: &str, body: &[u8]) -> CachedEntry {
        let request = make_request(url);
        let response = HttpResponse::new(200, body.to_vec());
        CachedEntry::snapshot(tier.to_string(), &request, &response)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("api-v1", "https://planner.test/api/guests", b"[]");

        db.put_entry(&entry).await.unwrap();

        let retrieved = db.get_entry("api-v1", &entry.identity).await.unwrap().unwrap();
        assert_eq!(retrieved.url, entry.url);
        assert_eq!(retrieved.body, b"[]");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.get_entry("api-v1", "nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_snapshot() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = make_entry("api-v1", "https://planner.test/api/budget", br#"[{"id":"1"}]"#);
        db.put_entry(&first).await.unwrap();

        let second = make_entry("api-v1", "https://planner.test/api/budget", br#"[{"id":"1"},{"id":"2"}]"#);
        db.put_entry(&second).await.unwrap();

        let retrieved = db.get_entry("api-v1", &first.identity).await.unwrap().unwrap();
        assert_eq!(retrieved.body, br#"[{"id":"1"},{"id":"2"}]"#);
    }

    #[tokio::test]
    async fn test_same_identity_distinct_tiers() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let in_static = make_entry("static-v1", "https://planner.test/dashboard", b"old shell");
        let in_runtime = make_entry("runtime-v1", "https://planner.test/dashboard", b"fresh page");
        db.put_entry(&in_static).await.unwrap();
        db.put_entry(&in_runtime).await.unwrap();

        let from_static = db.get_entry("static-v1", &in_static.identity).await.unwrap().unwrap();
        let from_runtime = db.get_entry("runtime-v1", &in_runtime.identity).await.unwrap().unwrap();
        assert_eq!(from_static.body, b"old shell");
        assert_eq!(from_runtime.body, b"fresh page");
    }

    #[tokio::test]
    async fn test_purge_stale_tiers() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for kind in TierKind::ALL {
            db.put_entry(&make_entry(&kind.name("v1"), "https://planner.test/a", b"v1"))
                .await
                .unwrap();
            db.put_entry(&make_entry(&kind.name("v2"), "https://planner.test/a", b"v2"))
                .await
                .unwrap();
        }

        let purged = db.purge_stale_tiers("v2").await.unwrap();
        assert_eq!(purged, 4);

        let names = db.tier_names().await.unwrap();
        assert_eq!(names.len(), 4);
        assert!(names.iter().all(|n| n.ends_with("-v2")));
    }

    #[tokio::test]
    async fn test_tier_len() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_entry("image-v1", "https://planner.test/venue.jpg", b"jpg"))
            .await
            .unwrap();
        db.put_entry(&make_entry("image-v1", "https://planner.test/cake.jpg", b"jpg"))
            .await
            .unwrap();

        assert_eq!(db.tier_len("image-v1").await.unwrap(), 2);
        assert_eq!(db.tier_len("api-v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_response_markers() {
        let entry = make_entry("api-v1", "https://planner.test/api/guests", b"[]");
        let stored_at = entry.stored_at.clone();
        let response = entry.into_stale_response();

        assert_eq!(response.headers.get(SERVED_FROM_HEADER).map(String::as_str), Some("cache"));
        assert_eq!(response.headers.get(CACHED_AT_HEADER), Some(&stored_at));
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_tier_names_encode_version() {
        assert_eq!(TierKind::Static.name("v3"), "static-v3");
        assert_eq!(TierKind::Api.name("2024-06"), "api-2024-06");
    }
}
