//! Rate-governed GitHub client.
//!
//! Every analyzer call goes through `GithubClient`. It reserves quota before
//! each request, refreshes the shared accounting from every response,
//! follows pagination cursors and maps empty-resource statuses to empty
//! results.

use crate::error::ApiError;
use crate::github::models::RepositorySummary;
use crate::github::rate::{RateInfo, RateLimiter, RateStatus};
use crate::github::transport::{ApiRequest, RawResponse, Transport};
use crate::models::{AnalysisConfig, TargetRepository};
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest page size the REST API accepts.
const MAX_PAGE_SIZE: usize = 100;

/// Tuning for the client's quota policy.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Warn once per window when remaining quota drops below this.
    pub low_water_mark: u32,
    /// Added to every wait for a quota reset.
    pub safety_margin: Duration,
    /// Pause before a run whose estimated cost exceeds the remaining quota.
    pub preflight_grace: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            low_water_mark: 100,
            safety_margin: Duration::from_secs(1),
            preflight_grace: Duration::from_secs(3),
        }
    }
}

/// Outcome of the pre-run budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preflight {
    pub estimated_calls: u64,
    pub remaining: u32,
}

impl Preflight {
    pub fn is_sufficient(&self) -> bool {
        self.estimated_calls <= u64::from(self.remaining)
    }
}

pub struct GithubClient {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    preflight_grace: Duration,
}

impl GithubClient {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(options.low_water_mark, options.safety_margin),
            preflight_grace: options.preflight_grace,
        }
    }

    /// Send one request under the quota policy.
    ///
    /// Stored answers are returned before any quota is reserved. A response
    /// rejected because the quota ran out is re-issued once, after the
    /// limiter has waited for the reset.
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        if let Some(hit) = self.transport.cached(request).await {
            return Ok(hit);
        }

        let mut retried = false;
        loop {
            self.limiter.acquire().await;
            let response = self.transport.get(request).await?;
            if let Some(info) = response.rate {
                self.limiter.update(info);
            }

            let throttled = matches!(response.status, 403 | 429) && self.limiter.is_exhausted();
            if throttled && !retried {
                warn!("Request to {} hit the rate limit; retrying after reset", request.path);
                retried = true;
                continue;
            }
            return Ok(response);
        }
    }

    /// Single-shot read.
    ///
    /// Returns `Ok(None)` for 404/409 (missing or empty resource); the caller
    /// decides whether that is acceptable.
    pub async fn call(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Option<Value>, ApiError> {
        let request = ApiRequest::new(endpoint, params);
        let response = self.send(&request).await?;
        classify(endpoint, response).map(|r| r.map(|r| r.body))
    }

    /// Single-shot read decoded into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, ApiError> {
        match self.call(endpoint, params).await? {
            Some(value) => decode(endpoint, value).map(Some),
            None => Ok(None),
        }
    }

    /// Paginated read of at most `max_items` items.
    ///
    /// Follows `Link` continuation cursors until the server reports no
    /// further pages or the ceiling is reached. A 404/409 yields an empty
    /// collection.
    pub async fn collect(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        max_items: usize,
    ) -> Result<Vec<Value>, ApiError> {
        let per_page = max_items.clamp(1, MAX_PAGE_SIZE);
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("per_page", per_page.to_string()));

        let mut items = Vec::new();
        let mut request = ApiRequest::new(endpoint, &query);
        let mut pages = 0usize;

        loop {
            let response = self.send(&request).await?;
            pages += 1;
            let response = match classify(endpoint, response)? {
                Some(response) => response,
                None => break,
            };

            items.extend(extract_items(response.body));
            if items.len() >= max_items {
                items.truncate(max_items);
                break;
            }

            match response.next {
                Some(next) => request = ApiRequest::continuation(next),
                None => break,
            }
        }

        debug!("Collected {} items from {} in {} page(s)", items.len(), endpoint, pages);
        Ok(items)
    }

    /// Paginated read decoded into `T`.
    pub async fn collect_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        max_items: usize,
    ) -> Result<Vec<T>, ApiError> {
        self.collect(endpoint, params, max_items)
            .await?
            .into_iter()
            .map(|value| decode(endpoint, value))
            .collect()
    }

    /// Last known quota figures.
    pub fn rate_status(&self) -> RateStatus {
        self.limiter.status()
    }

    /// Refresh the accounting from `/rate_limit`, which does not count
    /// against the quota.
    pub async fn refresh_rate_status(&self) -> Result<RateStatus, ApiError> {
        let request = ApiRequest::new("/rate_limit", &[]);
        let response = self.transport.get(&request).await?;

        let info = response.rate.or_else(|| rate_from_body(&response.body));
        if let Some(info) = info {
            self.limiter.update(info);
        }
        Ok(self.limiter.status())
    }

    /// Compare the estimated cost of a run with the remaining quota.
    ///
    /// A shortfall is reported and followed by a short grace delay; the run
    /// proceeds either way.
    pub async fn preflight(&self, repository_count: usize, config: &AnalysisConfig) -> Preflight {
        if let Err(e) = self.refresh_rate_status().await {
            warn!("Could not read rate limit status: {}", e);
        }

        let status = self.rate_status();
        let preflight = Preflight {
            estimated_calls: u64::from(config.estimated_calls_per_repository())
                * repository_count as u64,
            remaining: status.remaining,
        };

        if preflight.is_sufficient() {
            info!(
                "Estimated {} API calls; {}/{} remaining",
                preflight.estimated_calls, status.remaining, status.limit
            );
        } else {
            warn!(
                "Estimated {} API calls but only {} remain (resets at {}); \
                 the run will pause when the quota runs out",
                preflight.estimated_calls,
                status.remaining,
                status.reset.format("%H:%M:%S UTC")
            );
            tokio::time::sleep(self.preflight_grace).await;
        }

        preflight
    }

    /// List the non-archived repositories of an organization or user.
    pub async fn list_owner_repositories(
        &self,
        owner: &str,
        max_items: usize,
    ) -> Result<Vec<TargetRepository>, ApiError> {
        let params = [("type", "all".to_string()), ("sort", "full_name".to_string())];
        let mut repos: Vec<RepositorySummary> = self
            .collect_as(&format!("/orgs/{}/repos", owner), &params, max_items)
            .await?;

        if repos.is_empty() {
            debug!("No organization named {}; listing user repositories", owner);
            repos = self
                .collect_as(&format!("/users/{}/repos", owner), &params, max_items)
                .await?;
        }

        Ok(repos
            .into_iter()
            .filter(|r| !r.archived)
            .map(|r| TargetRepository::new(r.owner.login, r.name))
            .collect())
    }
}

/// Map a response to success, empty resource, or error.
fn classify(endpoint: &str, response: RawResponse) -> Result<Option<RawResponse>, ApiError> {
    match response.status {
        200..=299 => Ok(Some(response)),
        404 | 409 => {
            debug!("{} reported an empty resource ({})", endpoint, response.status);
            Ok(None)
        }
        status => Err(ApiError::Status {
            status,
            endpoint: endpoint.to_string(),
            message: response.error_message(),
        }),
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|source| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// Items of one page: the array itself, or the first array field of a
/// wrapper object such as `{"total_count": 3, "workflow_runs": [...]}`.
fn extract_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn rate_from_body(body: &Value) -> Option<RateInfo> {
    let core = body.get("resources").and_then(|r| r.get("core")).or_else(|| body.get("rate"))?;
    Some(RateInfo {
        remaining: core.get("remaining")?.as_u64()? as u32,
        limit: core.get("limit")?.as_u64()? as u32,
        reset: Utc.timestamp_opt(core.get("reset")?.as_i64()?, 0).single()?,
    })
}
