//! Issue hygiene: intake versus closure, triage and staleness.

use super::{hours_between, iso, mean, AnalyzerError, Analyzer};
use crate::github::models::Issue;
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, Finding, Severity, TargetRepository};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct IssueAnalyzer {
    stale_days: i64,
}

impl IssueAnalyzer {
    pub fn new(stale_days: i64) -> Self {
        Self { stale_days }
    }
}

impl Default for IssueAnalyzer {
    fn default() -> Self {
        Self::new(60)
    }
}

#[async_trait]
impl Analyzer for IssueAnalyzer {
    fn name(&self) -> &'static str {
        "issue-hygiene"
    }

    fn short_name(&self) -> &'static str {
        "issues"
    }

    async fn analyze(
        &self,
        cancel: &CancellationToken,
        client: &GithubClient,
        target: &TargetRepository,
        config: &AnalysisConfig,
    ) -> Result<AnalyzerResult, AnalyzerError> {
        let mut result = AnalyzerResult::new(self.name());
        let endpoint = format!("{}/issues", target.api_path());

        let recent: Vec<Issue> = match client
            .collect_as::<Issue>(
                &endpoint,
                &[("state", "all".to_string()), ("since", iso(config.since))],
                config.depth.max_issues,
            )
            .await
        {
            Ok(items) => items.into_iter().filter(|i| !i.is_pull_request()).collect(),
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        let opened = recent.iter().filter(|i| i.created_at >= config.since).count();
        let closed: Vec<&Issue> = recent
            .iter()
            .filter(|i| i.closed_at.is_some_and(|c| c >= config.since))
            .collect();
        let close_times: Vec<f64> = closed
            .iter()
            .filter_map(|i| i.closed_at.map(|c| hours_between(i.created_at, c)))
            .collect();

        result.push_count("issues_opened", opened, "Issues opened in the window");
        result.push_count("issues_closed", closed.len(), "Issues closed in the window");
        if let Some(avg) = mean(&close_times) {
            result.push_metric(
                "avg_close_time_hours",
                avg,
                "hours",
                format!("{:.1}h", avg),
                "Mean time from opening to closing",
            );
        }

        if opened > 0 && closed.len() * 2 < opened {
            result.push_finding(
                Finding::new(
                    "issue_backlog_growing",
                    Severity::Medium,
                    format!(
                        "{} issues opened but only {} closed in the window",
                        opened,
                        closed.len()
                    ),
                )
                .with_remediation("Schedule regular triage to keep the backlog in check"),
            );
        }

        if cancel.is_cancelled() {
            return Ok(result);
        }

        // Oldest-updated open issues first, so staleness is visible even when
        // they fall outside the lookback window.
        let open: Vec<Issue> = match client
            .collect_as::<Issue>(
                &endpoint,
                &[
                    ("state", "open".to_string()),
                    ("sort", "updated".to_string()),
                    ("direction", "asc".to_string()),
                ],
                config.depth.max_issues,
            )
            .await
        {
            Ok(items) => items.into_iter().filter(|i| !i.is_pull_request()).collect(),
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        let stale_cutoff = Utc::now() - Duration::days(self.stale_days);
        let stale = open.iter().filter(|i| i.updated_at < stale_cutoff).count();
        let unlabeled = open.iter().filter(|i| i.labels.is_empty()).count();

        result.push_count("open_issues", open.len(), "Open issues (capped by depth profile)");
        result.push_count("stale_issues", stale, "Open issues without recent activity");
        result.push_count("unlabeled_open_issues", unlabeled, "Open issues without labels");

        if stale > 0 {
            result.push_finding(
                Finding::new(
                    "stale_issues",
                    Severity::Low,
                    format!("{} open issues idle for more than {} days", stale, self.stale_days),
                )
                .with_remediation("Close obsolete issues or mark them for follow-up"),
            );
        }
        if !open.is_empty() && unlabeled * 2 > open.len() {
            result.push_finding(Finding::new(
                "untriaged_issues",
                Severity::Low,
                format!("{} of {} open issues have no labels", unlabeled, open.len()),
            ));
        }

        Ok(result)
    }
}
