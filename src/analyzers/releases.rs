//! Release cadence.

use super::{days_between, AnalyzerError, Analyzer};
use crate::github::models::Release;
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, Finding, Severity, TargetRepository};
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

const MAX_RELEASES: usize = 100;

#[derive(Debug, Clone)]
pub struct ReleaseAnalyzer {
    /// Days after the latest release before the project counts as unreleased.
    stale_days: i64,
}

impl ReleaseAnalyzer {
    pub fn new(stale_days: i64) -> Self {
        Self { stale_days }
    }
}

impl Default for ReleaseAnalyzer {
    fn default() -> Self {
        Self::new(180)
    }
}

#[async_trait]
impl Analyzer for ReleaseAnalyzer {
    fn name(&self) -> &'static str {
        "releases"
    }

    fn short_name(&self) -> &'static str {
        "rel"
    }

    async fn analyze(
        &self,
        _cancel: &CancellationToken,
        client: &GithubClient,
        target: &TargetRepository,
        config: &AnalysisConfig,
    ) -> Result<AnalyzerResult, AnalyzerError> {
        let mut result = AnalyzerResult::new(self.name());

        let releases: Vec<Release> = match client
            .collect_as::<Release>(&format!("{}/releases", target.api_path()), &[], MAX_RELEASES)
            .await
        {
            Ok(items) => items.into_iter().filter(|r| !r.draft).collect(),
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        let published = |r: &Release| r.published_at.unwrap_or(r.created_at);
        let in_window = releases.iter().filter(|r| published(r) >= config.since).count();
        let prereleases = releases.iter().filter(|r| r.prerelease).count();

        result.push_count("releases_total", releases.len(), "Published releases (last 100)");
        result.push_count("releases_in_window", in_window, "Releases published in the window");
        result.push_count("prereleases", prereleases, "Releases marked as pre-release");

        let Some(latest) = releases.iter().filter(|r| !r.prerelease).max_by_key(|r| published(r))
        else {
            result.push_finding(
                Finding::new("no_releases", Severity::Info, "No stable release has been published")
                    .with_remediation("Tag and publish releases so users can pin versions"),
            );
            return Ok(result);
        };

        let age = days_between(published(latest), Utc::now()).floor();
        result.push_metric(
            "days_since_last_release",
            age,
            "days",
            format!("{:.0}d ({})", age, latest.tag_name),
            "Days since the latest stable release",
        );

        if age > self.stale_days as f64 {
            result.push_finding(
                Finding::new(
                    "stale_release",
                    Severity::Low,
                    format!("Latest release {} is {:.0} days old", latest.tag_name, age),
                )
                .with_remediation("Cut a release to ship the changes merged since")
                .with_location(latest.tag_name.clone()),
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::stub::StubTransport;
    use crate::github::ClientOptions;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    async fn analyze(body: serde_json::Value) -> AnalyzerResult {
        let stub = StubTransport::new().route("/repos/o/r/releases", 200, body);
        let client = GithubClient::new(Arc::new(stub), ClientOptions::default());
        ReleaseAnalyzer::default()
            .analyze(
                &CancellationToken::new(),
                &client,
                &TargetRepository::new("o", "r"),
                &AnalysisConfig::default(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_recent_release() {
        let now = Utc::now();
        let ago = |days: i64| (now - Duration::days(days)).to_rfc3339();
        let result = analyze(json!([
            {"tag_name": "v2.0.0-rc1", "prerelease": true,
             "published_at": ago(1), "created_at": ago(1)},
            {"tag_name": "v1.1.0", "published_at": ago(10), "created_at": ago(10)},
            {"tag_name": "v1.0.0", "published_at": ago(200), "created_at": ago(200)},
            {"tag_name": "wip", "draft": true, "published_at": null, "created_at": ago(2)}
        ]))
        .await;

        assert_eq!(result.metric("releases_total"), Some(3.0));
        assert_eq!(result.metric("releases_in_window"), Some(2.0));
        assert_eq!(result.metric("days_since_last_release"), Some(10.0));
        assert!(result.findings.is_empty());
    }

    #[tokio::test]
    async fn test_stale_and_missing_releases() {
        let old = (Utc::now() - Duration::days(400)).to_rfc3339();
        let result = analyze(json!([
            {"tag_name": "v0.1.0", "published_at": old, "created_at": old}
        ]))
        .await;
        assert_eq!(result.findings[0].kind, "stale_release");

        let result = analyze(json!([])).await;
        assert_eq!(result.metric("releases_total"), Some(0.0));
        assert_eq!(result.findings[0].kind, "no_releases");
    }
}
