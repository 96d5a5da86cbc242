//! Commit activity and contributor concentration.

use super::{iso, AnalyzerError, Analyzer};
use crate::github::models::Commit;
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, Finding, Severity, TargetRepository};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct ActivityAnalyzer;

impl ActivityAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

/// Smallest number of authors who together made at least half the commits.
pub(crate) fn bus_factor(commits_by_author: &HashMap<String, usize>) -> usize {
    let total: usize = commits_by_author.values().sum();
    if total == 0 {
        return 0;
    }

    let mut counts: Vec<usize> = commits_by_author.values().copied().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));

    let mut covered = 0;
    for (i, count) in counts.iter().enumerate() {
        covered += count;
        if covered * 2 >= total {
            return i + 1;
        }
    }
    counts.len()
}

#[async_trait]
impl Analyzer for ActivityAnalyzer {
    fn name(&self) -> &'static str {
        "activity"
    }

    fn short_name(&self) -> &'static str {
        "act"
    }

    async fn analyze(
        &self,
        _cancel: &CancellationToken,
        client: &GithubClient,
        target: &TargetRepository,
        config: &AnalysisConfig,
    ) -> Result<AnalyzerResult, AnalyzerError> {
        let mut result = AnalyzerResult::new(self.name());

        let commits: Vec<Commit> = match client
            .collect_as(
                &format!("{}/commits", target.api_path()),
                &[("since", iso(config.since))],
                config.depth.max_commits,
            )
            .await
        {
            Ok(commits) => commits,
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        if commits.is_empty() {
            result.push_count("commits_total", 0, "Commits in the analysis window");
            result.push_count("active_contributors", 0, "Distinct commit authors");
            result.push_finding(
                Finding::new(
                    "no_recent_commits",
                    Severity::Info,
                    format!("No commits since {}", config.since.format("%Y-%m-%d")),
                )
                .with_remediation("Confirm the repository is still maintained or archive it"),
            );
            return Ok(result);
        }

        let mut by_author: HashMap<String, usize> = HashMap::new();
        for commit in &commits {
            let author = commit.author_key().unwrap_or_else(|| "unknown".to_string());
            *by_author.entry(author).or_insert(0) += 1;
        }

        let weeks = config.window_days(Utc::now()) / 7.0;
        let per_week = commits.len() as f64 / weeks;
        let factor = bus_factor(&by_author);

        result.push_count("commits_total", commits.len(), "Commits in the analysis window");
        if commits.len() >= config.depth.max_commits {
            result.push_finding(Finding::new(
                "history_truncated",
                Severity::Info,
                format!(
                    "Commit history capped at {} by the {} depth profile",
                    config.depth.max_commits, config.depth.kind
                ),
            ));
        }
        result.push_count("active_contributors", by_author.len(), "Distinct commit authors");
        result.push_metric(
            "commits_per_week",
            per_week,
            "commits/week",
            format!("{:.1}", per_week),
            "Average weekly commit rate",
        );
        result.push_metric(
            "bus_factor",
            factor as f64,
            "authors",
            factor.to_string(),
            "Authors responsible for half of all commits",
        );

        if factor == 1 {
            let top = by_author
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(author, _)| author.clone())
                .unwrap_or_default();
            result.push_finding(
                Finding::new(
                    "low_bus_factor",
                    Severity::Medium,
                    format!("Half of recent commits come from a single author ({})", top),
                )
                .with_remediation("Spread ownership through reviews and pairing"),
            );
        }

        Ok(result)
    }
}
