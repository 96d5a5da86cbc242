//! Raw HTTP access to the GitHub REST API.
//!
//! A `Transport` performs exactly one GET and reports what came back,
//! status included. Quota policy, pagination and empty-resource handling
//! live in the client above it.

use crate::error::ApiError;
use crate::github::rate::RateInfo;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, LINK, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// One GET request. `path` is either an API path (`/repos/o/r`) or an
/// absolute continuation URL taken from a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(path: impl Into<String>, query: &[(&str, String)]) -> Self {
        Self {
            path: path.into(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    /// Request for an absolute continuation URL.
    pub fn continuation(url: impl Into<String>) -> Self {
        Self {
            path: url.into(),
            query: Vec::new(),
        }
    }

    /// Stable identity of the request: path plus sorted query.
    pub fn fingerprint(&self) -> String {
        let mut query = self.query.clone();
        query.sort();
        let rendered: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("GET {}?{}", self.path, rendered.join("&"))
    }
}

/// What the server answered.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
    /// Quota headers; absent for cached responses.
    pub rate: Option<RateInfo>,
    /// Next-page URL from the `Link` header.
    pub next: Option<String>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `message` field of a GitHub error body, or a generic description.
    pub fn error_message(&self) -> String {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, ApiError>;

    /// A stored answer that costs no API call, if this transport keeps one.
    async fn cached(&self, _request: &ApiRequest) -> Option<RawResponse> {
        None
    }
}

/// Default public API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// reqwest-backed transport.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        let url = self.url_for(&request.path);
        debug!("GET {}", url);

        let mut builder = self
            .http
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header(USER_AGENT, concat!("repopulse/", env!("CARGO_PKG_VERSION")));

        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let rate = RateInfo::from_headers(response.headers());
        let next = next_link(response.headers());

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                // Error pages are not always JSON; keep the status meaningful.
                Err(_) if !(200..300).contains(&status) => Value::String(text),
                Err(source) => {
                    return Err(ApiError::Decode {
                        endpoint: request.path.clone(),
                        source,
                    })
                }
            }
        };

        Ok(RawResponse {
            status,
            body,
            rate,
            next,
        })
    }
}

/// Extract the `rel="next"` target of a `Link` header.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    parse_next_link(link)
}

fn parse_next_link(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|s| s.trim() == "rel=\"next\"");
        if is_next {
            Some(
                target
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            )
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_parse_next_link() {
        let link = concat!(
            r#"<https://api.github.com/repositories/1/commits?page=2>; rel="next", "#,
            r#"<https://api.github.com/repositories/1/commits?page=9>; rel="last""#
        );
        assert_eq!(
            parse_next_link(link).as_deref(),
            Some("https://api.github.com/repositories/1/commits?page=2")
        );

        let last_page = r#"<https://api.github.com/repositories/1/commits?page=1>; rel="prev""#;
        assert_eq!(parse_next_link(last_page), None);
    }

    #[test]
    fn test_fingerprint_ignores_query_order() {
        let path = "/repos/o/r/commits";
        let a = ApiRequest::new(path, &[("since", "x".into()), ("per_page", "100".into())]);
        let b = ApiRequest::new(path, &[("per_page", "100".into()), ("since", "x".into())]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn test_http_transport_reads_status_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let next = format!(
            "<{}/repos/o/r/commits?per_page=100&page=2>; rel=\"next\"",
            server.url()
        );
        let mock = server
            .mock("GET", "/repos/o/r/commits")
            .match_query(Matcher::UrlEncoded("per_page".into(), "100".into()))
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-ratelimit-remaining", "4999")
            .with_header("x-ratelimit-limit", "5000")
            .with_header("x-ratelimit-reset", "1700000000")
            .with_header("link", &next)
            .with_body(r#"[{"sha":"abc"}]"#)
            .create_async()
            .await;

        let transport =
            HttpTransport::new(&server.url(), Some("secret".into()), Duration::from_secs(5))
                .unwrap();
        let response = transport
            .get(&ApiRequest::new("/repos/o/r/commits", &[("per_page", "100".into())]))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body[0]["sha"], "abc");
        assert_eq!(response.rate.map(|r| r.remaining), Some(4999));
        assert!(response.next.unwrap().ends_with("page=2"));
    }

    #[tokio::test]
    async fn test_http_transport_returns_error_statuses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/o/empty/commits")
            .with_status(409)
            .with_body(r#"{"message":"Git Repository is empty."}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), None, Duration::from_secs(5)).unwrap();
        let response = transport
            .get(&ApiRequest::new("/repos/o/empty/commits", &[]))
            .await
            .unwrap();

        assert_eq!(response.status, 409);
        assert!(!response.is_success());
        assert_eq!(response.error_message(), "Git Repository is empty.");
    }
}
