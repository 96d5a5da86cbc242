//! GitHub REST API access.
//!
//! `transport` performs raw requests, `rate` governs the shared quota and
//! `client` combines them into the call/collect surface the analyzers use.

pub mod client;
pub mod models;
pub mod rate;
pub mod transport;

#[cfg(test)]
pub mod stub;

pub use client::{ClientOptions, GithubClient, Preflight};
pub use rate::{RateInfo, RateStatus};
pub use transport::{ApiRequest, HttpTransport, RawResponse, Transport, DEFAULT_API_URL};
