//! Branch hygiene: default-branch protection and abandoned branches.

use super::{AnalyzerError, Analyzer};
use crate::github::models::{Branch, Commit, RepositoryInfo};
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, Finding, Severity, TargetRepository};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const MAX_BRANCHES: usize = 300;

/// Branches whose head commit is fetched during a deep scan.
const MAX_INSPECTED_BRANCHES: usize = 30;

#[derive(Debug, Clone)]
pub struct BranchAnalyzer {
    stale_days: i64,
}

impl BranchAnalyzer {
    pub fn new(stale_days: i64) -> Self {
        Self { stale_days }
    }
}

impl Default for BranchAnalyzer {
    fn default() -> Self {
        Self::new(90)
    }
}

#[async_trait]
impl Analyzer for BranchAnalyzer {
    fn name(&self) -> &'static str {
        "branches"
    }

    fn short_name(&self) -> &'static str {
        "br"
    }

    async fn analyze(
        &self,
        cancel: &CancellationToken,
        client: &GithubClient,
        target: &TargetRepository,
        config: &AnalysisConfig,
    ) -> Result<AnalyzerResult, AnalyzerError> {
        let mut result = AnalyzerResult::new(self.name());
        let base = target.api_path();

        let repo = match client.call_as::<RepositoryInfo>(&base, &[]).await {
            Ok(Some(repo)) => repo,
            Ok(None) => {
                return Err(AnalyzerError::message(
                    result,
                    format!("repository {} not found", target),
                ))
            }
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        let branches: Vec<Branch> = match client
            .collect_as(&format!("{}/branches", base), &[], MAX_BRANCHES)
            .await
        {
            Ok(branches) => branches,
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };
        result.push_count("branches_total", branches.len(), "Branches in the repository");

        let listed_flag = branches
            .iter()
            .find(|b| b.name == repo.default_branch)
            .is_some_and(|b| b.protected);
        let protection = client
            .call(
                &format!("{}/branches/{}/protection", base, repo.default_branch),
                &[],
            )
            .await;
        let protected = match protection {
            Ok(rules) => rules.is_some(),
            Err(e) if e.is_permission_denied() => {
                // Reading protection rules needs admin rights; the listing flag
                // is the best we can do.
                warn!("Protection rules of {} not readable: {}", target, e);
                listed_flag
            }
            Err(e) => return Err(AnalyzerError::new(result, e)),
        };

        result.push_metric(
            "default_branch_protected",
            if protected { 1.0 } else { 0.0 },
            "bool",
            if protected { "yes" } else { "no" },
            "Default branch has protection rules",
        );
        if !protected && !repo.archived {
            result.push_finding(
                Finding::new(
                    "unprotected_default_branch",
                    Severity::Medium,
                    format!("Default branch '{}' is not protected", repo.default_branch),
                )
                .with_remediation("Require reviews and passing checks before merging")
                .with_location(repo.default_branch.clone()),
            );
        }

        if !config.include_deep_scans {
            return Ok(result);
        }

        let cutoff = Utc::now() - Duration::days(self.stale_days);
        let mut stale = Vec::new();
        for branch in branches
            .iter()
            .filter(|b| b.name != repo.default_branch)
            .take(MAX_INSPECTED_BRANCHES)
        {
            if cancel.is_cancelled() {
                break;
            }
            let head = client
                .call_as::<Commit>(&format!("{}/commits/{}", base, branch.commit.sha), &[])
                .await;
            match head {
                Ok(Some(commit)) => {
                    if commit.committed_at().is_some_and(|at| at < cutoff) {
                        stale.push(branch.name.clone());
                    }
                }
                Ok(None) => {}
                Err(e) => return Err(AnalyzerError::new(result, e)),
            }
        }

        result.push_count(
            "stale_branches",
            stale.len(),
            "Branches without commits for the stale period",
        );
        if !stale.is_empty() {
            stale.sort();
            result.push_finding(
                Finding::new(
                    "stale_branches",
                    Severity::Low,
                    format!(
                        "{} branches have no commits in {} days: {}",
                        stale.len(),
                        self.stale_days,
                        stale.join(", ")
                    ),
                )
                .with_remediation("Delete merged or abandoned branches"),
            );
        }

        Ok(result)
    }
}
