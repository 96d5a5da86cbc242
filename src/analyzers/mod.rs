//! Repository analyzers.
//!
//! Each analyzer inspects one domain of a repository (activity, pull
//! requests, CI, ...) through the shared `GithubClient` and returns metrics
//! and findings. Analyzers hold only their own tuning parameters, so a
//! single instance is invoked concurrently for many repositories.

pub mod activity;
pub mod branches;
pub mod ci;
pub mod health;
pub mod issues;
pub mod pull_requests;
pub mod registry;
pub mod releases;
pub mod security;

use crate::error::ApiError;
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, TargetRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use activity::ActivityAnalyzer;
pub use branches::BranchAnalyzer;
pub use ci::CiAnalyzer;
pub use health::HealthAnalyzer;
pub use issues::IssueAnalyzer;
pub use pull_requests::PullRequestAnalyzer;
pub use registry::{build_registry, AnalyzerFilter};
pub use releases::ReleaseAnalyzer;
pub use security::SecurityAnalyzer;

/// Why an analyzer could not finish.
#[derive(Debug, Error)]
pub enum AnalyzeFailure {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Other(String),
}

/// A failed analysis together with whatever it had computed so far.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct AnalyzerError {
    pub partial: AnalyzerResult,
    #[source]
    pub source: AnalyzeFailure,
}

impl AnalyzerError {
    pub fn new(partial: AnalyzerResult, source: impl Into<AnalyzeFailure>) -> Self {
        Self {
            partial,
            source: source.into(),
        }
    }

    pub fn message(partial: AnalyzerResult, message: impl Into<String>) -> Self {
        Self {
            partial,
            source: AnalyzeFailure::Other(message.into()),
        }
    }
}

/// The plugin contract every inspection domain implements.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Stable long name, e.g. `ci-stability`.
    fn name(&self) -> &'static str;

    /// Short alias accepted by include/exclude filters, e.g. `ci`.
    fn short_name(&self) -> &'static str;

    /// Analyze one repository.
    ///
    /// Must not touch shared state other than through `client`. On failure
    /// the returned error carries the metrics gathered before the failure.
    async fn analyze(
        &self,
        cancel: &CancellationToken,
        client: &GithubClient,
        target: &TargetRepository,
        config: &AnalysisConfig,
    ) -> Result<AnalyzerResult, AnalyzerError>;
}

/// Whole and fractional days between two instants.
pub(crate) fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}

pub(crate) fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 3_600.0
}

/// Mean of a sample, `None` when empty.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// `part / whole` as a percentage, zero for an empty whole.
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// ISO-8601 timestamp as expected by `since=` query parameters.
pub(crate) fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
