//! On-disk response cache.
//!
//! Successful responses are stored as JSON files named by the blake3 hash of
//! the cache scope plus the request fingerprint. The scope separates API
//! hosts and credentials. `CachedTransport` sits beneath the client and
//! answers `Transport::cached`, which the client consults before reserving
//! quota, so a hit never touches the rate accounting.

use crate::error::ApiError;
use crate::github::transport::{ApiRequest, RawResponse, Transport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    fingerprint: String,
    status: u16,
    body: Value,
    #[serde(default)]
    next: Option<String>,
}

/// File-per-request cache with a fixed time-to-live.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
    scope: String,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            scope: String::new(),
        }
    }

    /// Keep entries apart per API host and token.
    ///
    /// The token only enters the scope as a blake3 digest, so it is never
    /// written to disk.
    pub fn with_scope(mut self, api_url: &str, token: Option<&str>) -> Self {
        let credential = token
            .map(|t| blake3::hash(t.as_bytes()).to_hex().to_string())
            .unwrap_or_else(|| "anonymous".to_string());
        self.scope = format!("{} {}", api_url.trim_end_matches('/'), credential);
        self
    }

    /// `<user cache dir>/repopulse`, or a temp-dir fallback.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("repopulse")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key(&self, request: &ApiRequest) -> String {
        format!("{}|{}", self.scope, request.fingerprint())
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        let hash = blake3::hash(fingerprint.as_bytes());
        self.dir.join(format!("{}.json", hash.to_hex()))
    }

    /// Fresh entry for the request, if any.
    pub async fn get(&self, request: &ApiRequest) -> Option<RawResponse> {
        let fingerprint = self.key(request);
        let path = self.entry_path(&fingerprint);
        let content = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry = serde_json::from_slice(&content).ok()?;

        if entry.fingerprint != fingerprint {
            return None;
        }
        let age = (Utc::now() - entry.stored_at).to_std().unwrap_or_default();
        if age > self.ttl {
            debug!("Cache entry for {} expired", request.path);
            return None;
        }

        Some(RawResponse {
            status: entry.status,
            body: entry.body,
            rate: None,
            next: entry.next,
        })
    }

    /// Store a successful response.
    pub async fn put(&self, request: &ApiRequest, response: &RawResponse) -> std::io::Result<()> {
        if !response.is_success() {
            return Ok(());
        }

        let fingerprint = self.key(request);
        let entry = CacheEntry {
            stored_at: Utc::now(),
            fingerprint: fingerprint.clone(),
            status: response.status,
            body: response.body.clone(),
            next: response.next.clone(),
        };
        let content = serde_json::to_vec(&entry)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.entry_path(&fingerprint), content).await
    }
}

/// Transport that answers from the cache when it can.
pub struct CachedTransport {
    inner: Arc<dyn Transport>,
    cache: ResponseCache,
}

impl CachedTransport {
    pub fn new(inner: Arc<dyn Transport>, cache: ResponseCache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl Transport for CachedTransport {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        // Quota status must always be live.
        if request.path == "/rate_limit" {
            return self.inner.get(request).await;
        }

        if let Some(hit) = self.cached(request).await {
            return Ok(hit);
        }

        let response = self.inner.get(request).await?;
        if let Err(e) = self.cache.put(request, &response).await {
            debug!("Failed to cache {}: {}", request.path, e);
        }
        Ok(response)
    }

    async fn cached(&self, request: &ApiRequest) -> Option<RawResponse> {
        if request.path == "/rate_limit" {
            return None;
        }
        let hit = self.cache.get(request).await?;
        debug!("Cache hit: {}", request.path);
        Some(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::rate::RateInfo;
    use crate::github::stub::StubTransport;
    use crate::github::{ClientOptions, GithubClient};
    use serde_json::json;
    use std::time::Instant;

    #[tokio::test]
    async fn test_cache_round_trip_strips_rate_info() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), Duration::from_secs(60));
        let request = ApiRequest::new("/repos/o/r", &[("per_page", "100".into())]);
        let response = RawResponse {
            status: 200,
            body: json!({"name": "r"}),
            rate: Some(RateInfo {
                remaining: 10,
                limit: 60,
                reset: Utc::now(),
            }),
            next: Some("page-2".into()),
        };

        cache.put(&request, &response).await.unwrap();
        let hit = cache.get(&request).await.unwrap();

        assert_eq!(hit.body, response.body);
        assert_eq!(hit.next.as_deref(), Some("page-2"));
        assert!(hit.rate.is_none());
    }

    #[tokio::test]
    async fn test_cache_skips_failures_and_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let request = ApiRequest::new("/repos/o/r", &[]);

        let cache = ResponseCache::new(dir.path(), Duration::from_secs(60));
        let failure = RawResponse {
            status: 500,
            body: json!({"message": "boom"}),
            rate: None,
            next: None,
        };
        cache.put(&request, &failure).await.unwrap();
        assert!(cache.get(&request).await.is_none());

        let expired = ResponseCache::new(dir.path(), Duration::ZERO);
        let ok = RawResponse {
            status: 200,
            ..failure
        };
        expired.put(&request, &ok).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(expired.get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_cached_transport_serves_repeat_requests_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubTransport::new().route("/repos/o/r", 200, json!({"name": "r"})));
        let transport = CachedTransport::new(
            stub.clone(),
            ResponseCache::new(dir.path(), Duration::from_secs(60)),
        );
        let request = ApiRequest::new("/repos/o/r", &[]);

        let first = transport.get(&request).await.unwrap();
        let second = transport.get(&request).await.unwrap();

        assert_eq!(first.body, second.body);
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_scope_separates_hosts_and_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::from_secs(60);
        let request = ApiRequest::new("/repos/o/r", &[]);
        let response = RawResponse {
            status: 200,
            body: json!({"name": "r"}),
            rate: None,
            next: None,
        };

        let scoped = |api_url: &str, token: &str| {
            ResponseCache::new(dir.path(), ttl).with_scope(api_url, Some(token))
        };

        let public = scoped("https://api.github.com", "ghp_first");
        public.put(&request, &response).await.unwrap();
        assert!(public.get(&request).await.is_some());

        let enterprise = scoped("https://ghe.example.com/api/v3", "ghp_first");
        let other_token = scoped("https://api.github.com", "ghp_second");
        assert!(enterprise.get(&request).await.is_none());
        assert!(other_token.get(&request).await.is_none());

        let stored: String = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| std::fs::read_to_string(e.unwrap().path()).unwrap())
            .collect();
        assert!(!stored.contains("ghp_first"));
    }

    #[tokio::test]
    async fn test_cache_hit_bypasses_exhausted_quota() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubTransport::new().route_with_rate(
            "/repos/o/r",
            200,
            json!({"name": "r"}),
            RateInfo {
                remaining: 0,
                limit: 60,
                reset: Utc::now() + chrono::Duration::seconds(2),
            },
        ));
        let transport = CachedTransport::new(
            stub.clone(),
            ResponseCache::new(dir.path(), Duration::from_secs(60)),
        );
        let options = ClientOptions {
            low_water_mark: 10,
            safety_margin: Duration::from_millis(50),
            preflight_grace: Duration::ZERO,
        };
        let client = GithubClient::new(Arc::new(transport), options);

        client.call("/repos/o/r", &[]).await.unwrap();
        assert_eq!(client.rate_status().remaining, 0);

        let started = Instant::now();
        let body = client.call("/repos/o/r", &[]).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(body.unwrap()["name"], "r");
        assert!(elapsed < Duration::from_millis(500), "cache hit took {:?}", elapsed);
        assert_eq!(stub.call_count(), 1);
        assert_eq!(client.rate_status().remaining, 0);
    }
}
