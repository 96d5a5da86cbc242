//! Overall repository health: metadata, community files and a 0-100 score.
//!
//! The score is a weighted checklist. Community files come from the
//! community profile endpoint when available and from the recursive tree of
//! the default branch otherwise, so private repositories (which have no
//! community profile) are still scored.

use super::{days_between, AnalyzerError, Analyzer};
use crate::github::models::{CommunityProfile, RepositoryInfo, Tree};
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, Finding, Severity, TargetRepository};
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A push older than this many days loses the recency points.
const RECENT_PUSH_DAYS: f64 = 90.0;

/// Score below which the repository is reported as unhealthy.
const UNHEALTHY_SCORE: f64 = 50.0;

/// Presence of the files and settings the score is built from.
#[derive(Debug, Default, Clone, PartialEq)]
struct Checklist {
    description: bool,
    license: bool,
    readme: bool,
    contributing: bool,
    code_of_conduct: bool,
    issue_template: bool,
    pull_request_template: bool,
    codeowners: bool,
    not_archived: bool,
    recently_pushed: bool,
    ci_configured: bool,
}

impl Checklist {
    fn score(&self) -> f64 {
        let weights = [
            (self.description, 10),
            (self.license, 15),
            (self.readme, 15),
            (self.contributing, 5),
            (self.code_of_conduct, 5),
            (self.issue_template, 5),
            (self.pull_request_template, 5),
            (self.codeowners, 5),
            (self.not_archived, 10),
            (self.recently_pushed, 15),
            (self.ci_configured, 10),
        ];
        weights
            .iter()
            .filter(|(present, _)| *present)
            .map(|(_, weight)| *weight as f64)
            .sum()
    }

    /// Fill gaps from the files of the default branch.
    fn merge_tree(&mut self, tree: &Tree) {
        let any = |paths: &[&str]| paths.iter().any(|p| tree.contains(p));
        let prefixed = |prefix: &str| tree.has_file_under(prefix);

        self.readme |= any(&["README.md", "README", "README.rst", "readme.md"]);
        self.license |= any(&["LICENSE", "LICENSE.md", "LICENSE.txt", "COPYING"]);
        self.contributing |= any(&["CONTRIBUTING.md", ".github/CONTRIBUTING.md"]);
        self.code_of_conduct |= any(&["CODE_OF_CONDUCT.md", ".github/CODE_OF_CONDUCT.md"]);
        self.issue_template |= prefixed(".github/ISSUE_TEMPLATE");
        self.pull_request_template |= any(&[
            ".github/pull_request_template.md",
            ".github/PULL_REQUEST_TEMPLATE.md",
            "PULL_REQUEST_TEMPLATE.md",
        ]);
        self.codeowners |= any(&["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"]);
        self.ci_configured |= prefixed(".github/workflows/")
            || any(&[".gitlab-ci.yml", ".travis.yml", ".circleci/config.yml", "Jenkinsfile"]);
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthAnalyzer;

impl HealthAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for HealthAnalyzer {
    fn name(&self) -> &'static str {
        "repository-health"
    }

    fn short_name(&self) -> &'static str {
        "health"
    }

    async fn analyze(
        &self,
        cancel: &CancellationToken,
        client: &GithubClient,
        target: &TargetRepository,
        _config: &AnalysisConfig,
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

        result.push_count("stars", repo.stargazers_count as usize, "Stargazers");
        result.push_count("forks", repo.forks_count as usize, "Forks");
        result.push_count(
            "open_issues_and_prs",
            repo.open_issues_count as usize,
            "Open issues and pull requests",
        );

        let mut checklist = Checklist {
            description: repo.description.as_deref().is_some_and(|d| !d.trim().is_empty()),
            license: repo.license.is_some(),
            not_archived: !repo.archived,
            ..Checklist::default()
        };

        if let Some(pushed_at) = repo.pushed_at {
            let days = days_between(pushed_at, Utc::now()).floor();
            checklist.recently_pushed = days <= RECENT_PUSH_DAYS;
            result.push_metric(
                "days_since_push",
                days,
                "days",
                format!("{:.0}d", days),
                "Days since the last push to any branch",
            );
        }

        if cancel.is_cancelled() {
            return Ok(result);
        }

        // Not available for private repositories.
        match client
            .call_as::<CommunityProfile>(&format!("{}/community/profile", base), &[])
            .await
        {
            Ok(Some(profile)) => {
                let files = &profile.files;
                checklist.readme = files.readme.is_some();
                checklist.contributing = files.contributing.is_some();
                checklist.code_of_conduct = files.code_of_conduct.is_some();
                checklist.issue_template = files.issue_template.is_some();
                checklist.pull_request_template = files.pull_request_template.is_some();
                checklist.license |= files.license.is_some();
            }
            Ok(None) => debug!("No community profile for {}", target),
            Err(e) if e.is_permission_denied() => {
                warn!("Community profile of {} not readable: {}", target, e)
            }
            Err(e) => return Err(AnalyzerError::new(result, e)),
        }

        if !repo.default_branch.is_empty() {
            let recursive = [("recursive", "1".to_string())];
            match client
                .call_as::<Tree>(
                    &format!("{}/git/trees/{}", base, repo.default_branch),
                    &recursive,
                )
                .await
            {
                Ok(Some(tree)) => {
                    if tree.truncated {
                        debug!(
                            "File listing of {} is truncated; scoring the {} entries returned",
                            target,
                            tree.tree.len()
                        );
                    }
                    checklist.merge_tree(&tree);
                }
                Ok(None) => {}
                Err(e) => return Err(AnalyzerError::new(result, e)),
            }
        }

        let score = checklist.score();
        result.push_metric(
            "health_score",
            score,
            "score",
            format!("{:.0}/100", score),
            "Weighted checklist of repository hygiene",
        );

        if repo.archived {
            result.push_finding(Finding::new(
                "archived_repository",
                Severity::Info,
                "Repository is archived and read-only",
            ));
        }
        if score < UNHEALTHY_SCORE {
            result.push_finding(
                Finding::new(
                    "low_health_score",
                    Severity::High,
                    format!("Health score is {:.0}/100", score),
                )
                .with_remediation("Address the missing items reported for this repository"),
            );
        }

        let missing = [
            (
                !checklist.description,
                "missing_description",
                "No repository description",
                Severity::Low,
            ),
            (!checklist.license, "missing_license", "No license file", Severity::Medium),
            (!checklist.readme, "missing_readme", "No README", Severity::Medium),
            (
                !checklist.contributing,
                "missing_contributing",
                "No contributing guide",
                Severity::Low,
            ),
            (!checklist.codeowners, "missing_codeowners", "No CODEOWNERS file", Severity::Info),
            (!checklist.ci_configured, "missing_ci", "No CI configuration found", Severity::Medium),
        ];
        for (is_missing, kind, message, severity) in missing {
            if is_missing {
                result.push_finding(Finding::new(kind, severity, message));
            }
        }
        if !checklist.recently_pushed && !repo.archived {
            result.push_finding(
                Finding::new(
                    "inactive_repository",
                    Severity::Medium,
                    format!("No pushes in the last {:.0} days", RECENT_PUSH_DAYS),
                )
                .with_remediation("Archive the repository if it is no longer maintained"),
            );
        }

        Ok(result)
    }
}
