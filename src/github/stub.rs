//! In-memory transport for tests.

use crate::error::ApiError;
use crate::github::rate::RateInfo;
use crate::github::transport::{ApiRequest, RawResponse, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};

/// Answers requests from canned responses keyed by exact path.
///
/// A path with several queued responses serves them in order and then keeps
/// repeating the last one. Unknown paths answer 404.
#[derive(Default)]
pub struct StubTransport {
    routes: Mutex<HashMap<String, VecDeque<RawResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, path: &str, response: RawResponse) -> Self {
        self.routes
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn route(self, path: &str, status: u16, body: Value) -> Self {
        self.push(
            path,
            RawResponse {
                status,
                body,
                rate: None,
                next: None,
            },
        )
    }

    pub fn route_with_rate(self, path: &str, status: u16, body: Value, rate: RateInfo) -> Self {
        self.push(
            path,
            RawResponse {
                status,
                body,
                rate: Some(rate),
                next: None,
            },
        )
    }

    /// A 200 page with an optional continuation cursor.
    pub fn page(self, path: &str, body: Value, next: Option<&str>) -> Self {
        self.push(
            path,
            RawResponse {
                status: 200,
                body,
                rate: None,
                next: next.map(str::to_string),
            },
        )
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        self.requests.lock().push(request.clone());

        let mut routes = self.routes.lock();
        let response = match routes.get_mut(&request.path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        Ok(response.unwrap_or_else(|| RawResponse {
            status: 404,
            body: json!({"message": "Not Found"}),
            rate: None,
            next: None,
        }))
    }
}
