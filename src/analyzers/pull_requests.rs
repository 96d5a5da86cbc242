//! Pull-request flow: throughput, merge rate, cycle time and stale reviews.

use super::{hours_between, mean, percentage, AnalyzerError, Analyzer};
use crate::github::models::PullRequest;
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, Finding, Severity, TargetRepository};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

/// Stale open pull requests listed individually before summarizing.
const MAX_LISTED_STALE: usize = 5;

#[derive(Debug, Clone)]
pub struct PullRequestAnalyzer {
    /// Open PRs without activity for this many days are stale.
    stale_days: i64,
}

impl PullRequestAnalyzer {
    pub fn new(stale_days: i64) -> Self {
        Self { stale_days }
    }
}

impl Default for PullRequestAnalyzer {
    fn default() -> Self {
        Self::new(14)
    }
}

#[async_trait]
impl Analyzer for PullRequestAnalyzer {
    fn name(&self) -> &'static str {
        "pull-requests"
    }

    fn short_name(&self) -> &'static str {
        "prs"
    }

    async fn analyze(
        &self,
        _cancel: &CancellationToken,
        client: &GithubClient,
        target: &TargetRepository,
        config: &AnalysisConfig,
    ) -> Result<AnalyzerResult, AnalyzerError> {
        let mut result = AnalyzerResult::new(self.name());
        let params = [
            ("state", "all".to_string()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
        ];

        let pulls: Vec<PullRequest> = match client
            .collect_as(
                &format!("{}/pulls", target.api_path()),
                &params,
                config.depth.max_pull_requests,
            )
            .await
        {
            Ok(pulls) => pulls,
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        let now = Utc::now();
        let stale_cutoff = now - Duration::days(self.stale_days);

        let opened = pulls.iter().filter(|p| p.created_at >= config.since).count();
        let merged: Vec<&PullRequest> = pulls
            .iter()
            .filter(|p| p.merged_at.is_some_and(|m| m >= config.since))
            .collect();
        let closed_unmerged = pulls
            .iter()
            .filter(|p| p.merged_at.is_none() && p.closed_at.is_some_and(|c| c >= config.since))
            .count();
        let open: Vec<&PullRequest> = pulls.iter().filter(|p| p.state == "open").collect();
        let mut stale: Vec<&PullRequest> = open
            .iter()
            .copied()
            .filter(|p| !p.draft && p.updated_at < stale_cutoff)
            .collect();
        stale.sort_by_key(|p| p.updated_at);

        let cycle_times: Vec<f64> = merged
            .iter()
            .filter_map(|p| p.merged_at.map(|m| hours_between(p.created_at, m)))
            .collect();
        let merge_rate = percentage(merged.len(), merged.len() + closed_unmerged);

        result.push_count("prs_opened", opened, "Pull requests opened in the window");
        result.push_count("prs_merged", merged.len(), "Pull requests merged in the window");
        result.push_metric(
            "merge_rate",
            merge_rate,
            "%",
            format!("{:.1}%", merge_rate),
            "Share of closed pull requests that were merged",
        );
        if let Some(avg) = mean(&cycle_times) {
            result.push_metric(
                "avg_cycle_time_hours",
                avg,
                "hours",
                format!("{:.1}h", avg),
                "Mean time from opening to merge",
            );
        }
        result.push_count("open_prs", open.len(), "Currently open pull requests");
        result.push_count("stale_prs", stale.len(), "Open pull requests without recent activity");

        if pulls.is_empty() {
            result.push_finding(Finding::new(
                "no_pull_requests",
                Severity::Info,
                "No pull requests found; changes may be pushed directly",
            ));
        }

        for pr in stale.iter().take(MAX_LISTED_STALE) {
            let idle = (now - pr.updated_at).num_days();
            result.push_finding(
                Finding::new(
                    "stale_pull_request",
                    Severity::Low,
                    format!("PR #{} '{}' has been idle for {} days", pr.number, pr.title, idle),
                )
                .with_remediation("Review, rebase or close the pull request")
                .with_location(format!("#{}", pr.number)),
            );
        }
        if stale.len() > MAX_LISTED_STALE {
            result.push_finding(Finding::new(
                "stale_pull_request",
                Severity::Low,
                format!("{} more stale pull requests", stale.len() - MAX_LISTED_STALE),
            ));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::stub::StubTransport;
    use crate::github::ClientOptions;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pull_request_flow_metrics() {
        let now = Utc::now();
        let ts = |days: i64, hours: i64| {
            (now - Duration::days(days) + Duration::hours(hours)).to_rfc3339()
        };
        let stub = StubTransport::new().route(
            "/repos/o/r/pulls",
            200,
            json!([
                {"number": 1, "state": "closed", "title": "fast", "created_at": ts(5, 0),
                 "updated_at": ts(5, 10), "merged_at": ts(5, 10), "closed_at": ts(5, 10)},
                {"number": 2, "state": "closed", "title": "slow", "created_at": ts(6, 0),
                 "updated_at": ts(6, 30), "merged_at": ts(6, 30), "closed_at": ts(6, 30)},
                {"number": 3, "state": "closed", "title": "rejected", "created_at": ts(4, 0),
                 "updated_at": ts(3, 0), "merged_at": null, "closed_at": ts(3, 0)},
                {"number": 4, "state": "open", "title": "forgotten", "created_at": ts(25, 0),
                 "updated_at": ts(20, 0), "merged_at": null, "closed_at": null}
            ]),
        );
        let client = GithubClient::new(Arc::new(stub), ClientOptions::default());

        let result = PullRequestAnalyzer::new(14)
            .analyze(
                &CancellationToken::new(),
                &client,
                &TargetRepository::new("o", "r"),
                &AnalysisConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.metric("prs_opened"), Some(4.0));
        assert_eq!(result.metric("prs_merged"), Some(2.0));
        let merge_rate = result.metric("merge_rate").unwrap();
        assert!((merge_rate - 66.666).abs() < 0.1);
        assert_eq!(result.metric("avg_cycle_time_hours"), Some(20.0));
        assert_eq!(result.metric("stale_prs"), Some(1.0));
        assert_eq!(result.findings[0].location.as_deref(), Some("#4"));
    }
}
