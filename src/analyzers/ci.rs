//! CI stability from GitHub Actions runs and the head commit status.

use super::{mean, percentage, AnalyzerError, Analyzer};
use crate::github::models::{CombinedStatus, WorkflowRun};
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, Finding, Severity, TargetRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Failures of one workflow before it is called out by name.
const FLAKY_WORKFLOW_THRESHOLD: usize = 3;

#[derive(Debug, Clone)]
pub struct CiAnalyzer {
    /// Success rate (percent) below which CI is reported as unstable.
    min_success_rate: f64,
}

impl CiAnalyzer {
    pub fn new(min_success_rate: f64) -> Self {
        Self { min_success_rate }
    }
}

impl Default for CiAnalyzer {
    fn default() -> Self {
        Self::new(80.0)
    }
}

fn is_failure(conclusion: &str) -> bool {
    matches!(conclusion, "failure" | "timed_out" | "startup_failure")
}

#[async_trait]
impl Analyzer for CiAnalyzer {
    fn name(&self) -> &'static str {
        "ci-stability"
    }

    fn short_name(&self) -> &'static str {
        "ci"
    }

    async fn analyze(
        &self,
        _cancel: &CancellationToken,
        client: &GithubClient,
        target: &TargetRepository,
        config: &AnalysisConfig,
    ) -> Result<AnalyzerResult, AnalyzerError> {
        let mut result = AnalyzerResult::new(self.name());
        let created = format!(">={}", config.since.format("%Y-%m-%d"));

        let runs: Vec<WorkflowRun> = match client
            .collect_as(
                &format!("{}/actions/runs", target.api_path()),
                &[("created", created)],
                config.depth.max_workflow_runs,
            )
            .await
        {
            Ok(runs) => runs,
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        let completed: Vec<&WorkflowRun> = runs
            .iter()
            .filter(|r| r.status.as_deref() == Some("completed"))
            .collect();
        let succeeded = completed
            .iter()
            .filter(|r| r.conclusion.as_deref() == Some("success"))
            .count();
        let failed: Vec<&WorkflowRun> = completed
            .iter()
            .copied()
            .filter(|r| r.conclusion.as_deref().is_some_and(is_failure))
            .collect();

        result.push_count("workflow_runs_total", runs.len(), "Workflow runs in the window");
        result.push_count("failed_runs", failed.len(), "Runs that failed or timed out");

        if succeeded + failed.len() > 0 {
            let rate = percentage(succeeded, succeeded + failed.len());
            result.push_metric(
                "success_rate",
                rate,
                "%",
                format!("{:.1}%", rate),
                "Successful share of decided workflow runs",
            );
            if rate < self.min_success_rate {
                result.push_finding(
                    Finding::new(
                        "ci_instability",
                        Severity::High,
                        format!(
                            "CI success rate is {:.1}% (threshold {:.0}%)",
                            rate, self.min_success_rate
                        ),
                    )
                    .with_remediation("Investigate recurring failures and quarantine flaky tests"),
                );
            }
        } else {
            result.push_finding(Finding::new(
                "no_ci_runs",
                Severity::Info,
                "No completed GitHub Actions runs in the analysis window",
            ));
        }

        let durations: Vec<f64> = completed
            .iter()
            .map(|r| {
                let started = r.run_started_at.unwrap_or(r.created_at);
                (r.updated_at - started).num_seconds() as f64 / 60.0
            })
            .filter(|minutes| *minutes >= 0.0)
            .collect();
        if let Some(avg) = mean(&durations) {
            result.push_metric(
                "avg_run_duration_minutes",
                avg,
                "minutes",
                format!("{:.1}m", avg),
                "Mean wall-clock duration of completed runs",
            );
        }

        let mut failures_by_workflow: HashMap<&str, usize> = HashMap::new();
        for run in &failed {
            *failures_by_workflow
                .entry(run.name.as_deref().unwrap_or("unnamed"))
                .or_insert(0) += 1;
        }
        let mut flaky: Vec<(&str, usize)> = failures_by_workflow
            .into_iter()
            .filter(|(_, n)| *n >= FLAKY_WORKFLOW_THRESHOLD)
            .collect();
        flaky.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        for (workflow, count) in flaky {
            result.push_finding(
                Finding::new(
                    "failing_workflow",
                    Severity::Medium,
                    format!("Workflow '{}' failed {} times", workflow, count),
                )
                .with_location(workflow.to_string()),
            );
        }

        let status: Option<CombinedStatus> = match client
            .call_as(&format!("{}/commits/HEAD/status", target.api_path()), &[])
            .await
        {
            Ok(status) => status,
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        if let Some(status) = status.filter(|s| s.total_count > 0) {
            let green = status.state == "success";
            result.push_metric(
                "head_status_success",
                if green { 1.0 } else { 0.0 },
                "bool",
                status.state.clone(),
                "Combined commit status of the default branch head",
            );
            if status.state == "failure" || status.state == "error" {
                result.push_finding(
                    Finding::new(
                        "default_branch_red",
                        Severity::High,
                        "The default branch head has a failing commit status",
                    )
                    .with_remediation("Fix the default branch before merging further changes"),
                );
            }
        }

        Ok(result)
    }
}
