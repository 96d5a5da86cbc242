//! Cross-repository aggregation and statistics.
//!
//! This module folds per-repository results into the global summary and
//! provides the finding queries used by the report and the `--fail-on` gate.

use crate::models::{Finding, GlobalSummary, RepoResult, Severity, ANALYZER_ERROR};
use std::collections::BTreeMap;

/// Health score below which a repository is listed as at risk.
pub const AT_RISK_HEALTH_SCORE: f64 = 50.0;

/// Running mean over the repositories that reported a metric.
#[derive(Debug, Default)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Compute the global summary.
///
/// Averages only count repositories that reported the metric, so a failed
/// or skipped analyzer does not drag them toward zero. Metric keys no
/// summary field uses are ignored.
pub fn summarize(repositories: &[RepoResult]) -> GlobalSummary {
    let mut summary = GlobalSummary {
        total_repositories: repositories.len(),
        ..GlobalSummary::default()
    };

    let mut health = Average::default();
    let mut ci = Average::default();
    let mut cycle_time = Average::default();
    let mut bus_factor = Average::default();

    for repo in repositories {
        for finding in repo.findings() {
            summary.total_findings += 1;
            *summary.findings_by_severity.entry(finding.severity).or_insert(0) += 1;
            if finding.kind == ANALYZER_ERROR {
                summary.analyzer_errors += 1;
            }
        }
        if repo.has_errors() {
            summary.repositories_with_errors += 1;
        }

        summary.total_commits += repo.metric("commits_total").unwrap_or(0.0);

        let score = repo.metric("health_score");
        health.add(score);
        ci.add(repo.metric("success_rate"));
        cycle_time.add(repo.metric("avg_cycle_time_hours"));
        let factor = repo.metric("bus_factor");
        bus_factor.add(factor);

        if score.is_some_and(|s| s < AT_RISK_HEALTH_SCORE) {
            summary.at_risk_repositories.push(repo.name.clone());
        }
        if factor == Some(1.0) {
            summary.single_maintainer_repositories.push(repo.name.clone());
        }
    }

    summary.avg_health_score = health.value();
    summary.avg_ci_success_rate = ci.value();
    summary.avg_pr_cycle_time_hours = cycle_time.value();
    summary.avg_bus_factor = bus_factor.value();
    summary.at_risk_repositories.sort();
    summary.single_maintainer_repositories.sort();

    summary
}

/// Every finding paired with its repository name, most severe first.
///
/// Ties keep repository order, then analyzer order.
pub fn all_findings(repositories: &[RepoResult]) -> Vec<(&str, &Finding)> {
    let mut findings: Vec<(&str, &Finding)> = repositories
        .iter()
        .flat_map(|r| r.findings().map(move |f| (r.name.as_str(), f)))
        .collect();
    findings.sort_by(|a, b| b.1.severity.cmp(&a.1.severity));
    findings
}

/// Findings at or above `threshold`, most severe first.
pub fn findings_at_or_above(
    repositories: &[RepoResult],
    threshold: Severity,
) -> Vec<(&str, &Finding)> {
    all_findings(repositories)
        .into_iter()
        .filter(|(_, f)| f.severity >= threshold)
        .collect()
}

/// Count findings by severity.
pub fn count_by_severity<'a>(
    findings: impl IntoIterator<Item = &'a Finding>,
) -> BTreeMap<Severity, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.severity).or_insert(0) += 1;
    }
    counts
}

fn severity_weight(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 10,
        Severity::High => 5,
        Severity::Medium => 2,
        Severity::Low => 1,
        Severity::Info => 0,
    }
}

/// Weighted severity total of one repository's findings.
pub fn risk_score(repo: &RepoResult) -> u32 {
    repo.findings().map(|f| severity_weight(f.severity)).sum()
}

/// The `n` repositories with the highest risk score, skipping those with none.
pub fn top_risk_repositories(repositories: &[RepoResult], n: usize) -> Vec<(&RepoResult, u32)> {
    let mut scored: Vec<(&RepoResult, u32)> = repositories
        .iter()
        .map(|r| (r, risk_score(r)))
        .filter(|(_, score)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(&b.0.name)));
    scored.truncate(n);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalyzerResult, TargetRepository};

    fn create_test_repo(
        name: &str,
        metrics: &[(&str, f64)],
        findings: &[(&str, Severity)],
    ) -> RepoResult {
        let mut repo = RepoResult::new(&TargetRepository::new("o", name));
        let mut result = AnalyzerResult::new("test");
        for (key, value) in metrics {
            result.push_metric(key, *value, "", value.to_string(), "");
        }
        for (kind, severity) in findings {
            result.push_finding(Finding::new(*kind, *severity, "test finding"));
        }
        repo.analyzers.push(result);
        repo
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary, GlobalSummary::default());
        assert_eq!(summary.avg_health_score, None);
    }

    #[test]
    fn test_summarize_averages_over_observed() {
        let repos = vec![
            create_test_repo(
                "a",
                &[
                    ("health_score", 40.0),
                    ("success_rate", 90.0),
                    ("bus_factor", 1.0),
                    ("commits_total", 12.0),
                ],
                &[("low_bus_factor", Severity::Medium)],
            ),
            create_test_repo(
                "b",
                &[("health_score", 80.0), ("commits_total", 3.0), ("unknown_metric", 7.0)],
                &[(ANALYZER_ERROR, Severity::High)],
            ),
            create_test_repo("c", &[("success_rate", 70.0), ("bus_factor", 3.0)], &[]),
        ];

        let summary = summarize(&repos);
        assert_eq!(summary.total_repositories, 3);
        assert_eq!(summary.total_findings, 2);
        assert_eq!(summary.findings_by_severity.get(&Severity::High), Some(&1));
        assert_eq!(summary.analyzer_errors, 1);
        assert_eq!(summary.repositories_with_errors, 1);
        assert_eq!(summary.total_commits, 15.0);
        assert_eq!(summary.avg_health_score, Some(60.0));
        assert_eq!(summary.avg_ci_success_rate, Some(80.0));
        assert_eq!(summary.avg_pr_cycle_time_hours, None);
        assert_eq!(summary.avg_bus_factor, Some(2.0));
        assert_eq!(summary.at_risk_repositories, vec!["o/a"]);
        assert_eq!(summary.single_maintainer_repositories, vec!["o/a"]);
    }

    #[test]
    fn test_findings_at_or_above() {
        let repos = vec![
            create_test_repo("a", &[], &[("x", Severity::Low), ("y", Severity::Critical)]),
            create_test_repo("b", &[], &[("z", Severity::High), ("w", Severity::Info)]),
        ];

        let all = all_findings(&repos);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].0, "o/a");
        assert_eq!(all[0].1.severity, Severity::Critical);

        let gated = findings_at_or_above(&repos, Severity::High);
        let kinds: Vec<&str> = gated.iter().map(|(_, f)| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["y", "z"]);
        assert!(findings_at_or_above(&repos, Severity::Critical).len() == 1);
    }

    #[test]
    fn test_top_risk_repositories() {
        let repos = vec![
            create_test_repo("quiet", &[], &[("i", Severity::Info)]),
            create_test_repo("noisy", &[], &[("h", Severity::High), ("m", Severity::Medium)]),
            create_test_repo("critical", &[], &[("c", Severity::Critical)]),
        ];

        let top = top_risk_repositories(&repos, 5);
        let names: Vec<&str> = top.iter().map(|(r, _)| r.name.as_str()).collect();
        assert_eq!(names, vec!["o/critical", "o/noisy"]);
        assert_eq!(top[1].1, 7);

        assert_eq!(top_risk_repositories(&repos, 1).len(), 1);
    }

    #[test]
    fn test_count_by_severity() {
        let repo = create_test_repo("a", &[], &[("x", Severity::Low), ("y", Severity::Low)]);
        let counts = count_by_severity(repo.findings());
        assert_eq!(counts.get(&Severity::Low), Some(&2));
        assert_eq!(counts.get(&Severity::High), None);
    }
}
