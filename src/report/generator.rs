//! Markdown and JSON report generation.
//!
//! This module renders the aggregated health report: run metadata, the
//! cross-repository summary, and per-repository metrics and findings.

use crate::analysis::{count_by_severity, top_risk_repositories};
use crate::models::{Finding, GlobalSummary, RepoResult, Report, ReportMetadata, Severity};
use anyhow::Result;

/// Repositories listed in the "highest risk" table.
const TOP_RISK_LIMIT: usize = 5;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Repository Health Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_summary_section(&report.summary, &report.repositories));
    output.push_str(&generate_repositories_section(&report.repositories));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Window:** since {}\n",
        metadata.since.format("%Y-%m-%d")
    ));
    section.push_str(&format!(
        "- **Depth:** {}{}\n",
        metadata.depth,
        if metadata.deep_scans { " (deep scans)" } else { "" }
    ));
    section.push_str(&format!(
        "- **Analyzers:** {}\n",
        metadata
            .analyzers
            .iter()
            .map(|a| format!("`{}`", a))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    section.push_str(&format!(
        "- **Repositories Requested:** {}\n",
        metadata.repositories_requested
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push_str(&format!("- **Tool Version:** {}\n", metadata.tool_version));
    section.push('\n');

    section
}

fn anchor(name: &str) -> String {
    name.replace(['/', '.', ' ', '_'], "-").to_lowercase()
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");
    toc.push_str("- [Repositories](#repositories)\n");

    for repo in &report.repositories {
        toc.push_str(&format!("  - [{}](#{})\n", repo.name, anchor(&repo.name)));
    }

    toc.push('\n');

    toc
}

fn format_optional(value: Option<f64>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, suffix),
        None => "n/a".to_string(),
    }
}

/// Generate the summary section.
fn generate_summary_section(summary: &GlobalSummary, repositories: &[RepoResult]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    section.push_str("### Overview\n\n");
    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!("| Repositories | {} |\n", summary.total_repositories));
    section.push_str(&format!("| Commits in window | {:.0} |\n", summary.total_commits));
    section.push_str(&format!(
        "| Average health score | {} |\n",
        format_optional(summary.avg_health_score, "")
    ));
    section.push_str(&format!(
        "| Average CI success rate | {} |\n",
        format_optional(summary.avg_ci_success_rate, "%")
    ));
    section.push_str(&format!(
        "| Average PR cycle time | {} |\n",
        format_optional(summary.avg_pr_cycle_time_hours, "h")
    ));
    section.push_str(&format!(
        "| Average bus factor | {} |\n",
        format_optional(summary.avg_bus_factor, "")
    ));
    section.push_str(&format!(
        "| Analyzer errors | {} ({} repositories) |\n\n",
        summary.analyzer_errors, summary.repositories_with_errors
    ));

    // Severity breakdown
    let count = |s: Severity| summary.findings_by_severity.get(&s).copied().unwrap_or(0);
    section.push_str("### Finding Severity Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | {} Info | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
        Severity::Info.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | **{}** |\n\n",
        count(Severity::Critical),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low),
        count(Severity::Info),
        summary.total_findings
    ));

    if !summary.at_risk_repositories.is_empty() {
        section.push_str("### At-Risk Repositories\n\n");
        section.push_str("Health score below 50:\n\n");
        for name in &summary.at_risk_repositories {
            section.push_str(&format!("- [{}](#{})\n", name, anchor(name)));
        }
        section.push('\n');
    }

    if !summary.single_maintainer_repositories.is_empty() {
        section.push_str("### Single-Maintainer Repositories\n\n");
        section.push_str("Half of recent commits come from one author:\n\n");
        for name in &summary.single_maintainer_repositories {
            section.push_str(&format!("- {}\n", name));
        }
        section.push('\n');
    }

    let risky = top_risk_repositories(repositories, TOP_RISK_LIMIT);
    if !risky.is_empty() {
        section.push_str("### Highest Risk\n\n");
        section.push_str("| Repository | Risk Score | Findings |\n");
        section.push_str("|:---|:---:|:---:|\n");
        for (repo, score) in risky {
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                repo.name,
                score,
                repo.findings().count()
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate the per-repository section.
fn generate_repositories_section(repositories: &[RepoResult]) -> String {
    let mut section = String::new();

    section.push_str("## Repositories\n\n");

    if repositories.is_empty() {
        section.push_str("No repositories were analyzed.\n\n");
        return section;
    }

    for repo in repositories {
        section.push_str(&generate_repository_block(repo));
    }

    section
}

/// Generate metrics and findings of a single repository.
fn generate_repository_block(repo: &RepoResult) -> String {
    let mut block = String::new();

    block.push_str(&format!("### {} {{#{}}}\n\n", repo.name, anchor(&repo.name)));
    block.push_str(&format!("<{}>\n\n", repo.url));

    let counts = count_by_severity(repo.findings());
    if !counts.is_empty() {
        let badges: Vec<String> = counts
            .iter()
            .rev()
            .map(|(severity, n)| format!("{} {} {}", severity.emoji(), n, severity))
            .collect();
        block.push_str(&format!("*{}*\n\n", badges.join(" | ")));
    }

    let has_metrics = repo.analyzers.iter().any(|a| !a.metrics.is_empty());
    if has_metrics {
        block.push_str("| Analyzer | Metric | Value |\n");
        block.push_str("|:---|:---|---:|\n");
        for result in &repo.analyzers {
            for metric in &result.metrics {
                block.push_str(&format!(
                    "| {} | {} | {} |\n",
                    result.analyzer, metric.description, metric.display
                ));
            }
        }
        block.push('\n');
    }

    // Most severe first; equal severities keep analyzer order.
    let mut findings: Vec<&Finding> = repo.findings().collect();
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));

    if findings.is_empty() {
        block.push_str("No findings. 🎉\n\n");
    } else {
        for finding in findings {
            block.push_str(&generate_finding_line(finding));
        }
        block.push('\n');
    }

    block.push_str("---\n\n");

    block
}

/// Generate a single finding bullet.
fn generate_finding_line(finding: &Finding) -> String {
    let mut line = format!(
        "- {} **{}** `{}`: {}",
        finding.severity.emoji(),
        finding.severity.to_string().to_uppercase(),
        finding.kind,
        finding.message
    );

    if let Some(ref location) = finding.location {
        line.push_str(&format!(" ({})", location));
    }
    line.push('\n');

    if let Some(ref remediation) = finding.remediation {
        line.push_str(&format!("  > 💡 {}\n", remediation));
    }

    line
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("*Report generated by repopulse*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize;
    use crate::models::{AnalyzerResult, DepthKind, TargetRepository, ANALYZER_ERROR};
    use chrono::Utc;

    fn create_test_metadata() -> ReportMetadata {
        ReportMetadata {
            started_at: Utc::now(),
            duration_seconds: 12.5,
            tool_version: "0.1.0".to_string(),
            since: Utc::now(),
            depth: DepthKind::Standard,
            deep_scans: true,
            analyzers: vec!["activity".to_string(), "ci-stability".to_string()],
            repositories_requested: 2,
        }
    }

    fn create_test_report() -> Report {
        let mut healthy = RepoResult::new(&TargetRepository::new("acme", "api"));
        let mut ci = AnalyzerResult::new("ci-stability");
        ci.push_metric(
            "success_rate",
            97.5,
            "%",
            "97.5%",
            "Successful share of decided workflow runs",
        );
        healthy.analyzers.push(ci);

        let mut flaky = RepoResult::new(&TargetRepository::new("acme", "web"));
        let mut ci = AnalyzerResult::new("ci-stability");
        ci.push_finding(
            Finding::new("ci_instability", Severity::High, "CI success rate is 42.0%")
                .with_remediation("Quarantine flaky tests"),
        );
        ci.push_finding(Finding::analyzer_error("ci-stability", "GitHub API returned 502"));
        flaky.analyzers.push(ci);
        let mut activity = AnalyzerResult::new("activity");
        activity.push_finding(Finding::new("low_bus_factor", Severity::Medium, "One author"));
        flaky.analyzers.push(activity);

        let repositories = vec![healthy, flaky];
        let mut report = Report::new(create_test_metadata());
        report.summary = summarize(&repositories);
        report.repositories = repositories;
        report
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Repository Health Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("## Repositories"));
        assert!(markdown.contains("### acme/api {#acme-api}"));
        assert!(markdown
            .contains("| ci-stability | Successful share of decided workflow runs | 97.5% |"));
        assert!(markdown.contains("CI success rate is 42.0%"));
        assert!(markdown.contains(ANALYZER_ERROR));
        assert!(markdown.contains("### Highest Risk"));
    }

    #[test]
    fn test_findings_sorted_by_severity() {
        let report = create_test_report();
        let block = generate_repository_block(&report.repositories[1]);

        let high = block.find("ci_instability").unwrap();
        let medium = block.find("low_bus_factor").unwrap();
        assert!(high < medium);
        assert!(block.contains("> 💡 Quarantine flaky tests"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let section = generate_metadata_section(&create_test_metadata());

        assert!(section.contains("standard (deep scans)"));
        assert!(section.contains("`activity`, `ci-stability`"));
        assert!(section.contains("12.5s"));
    }

    #[test]
    fn test_summary_without_observations() {
        let section = generate_summary_section(&GlobalSummary::default(), &[]);
        assert!(section.contains("| Average health score | n/a |"));
        assert!(!section.contains("### Highest Risk"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"repositories\""));
        assert!(json.contains("\"findings_by_severity\""));
        assert!(json.contains("\"type\": \"ci_instability\""));
        assert!(json.contains("\"severity\": \"high\""));
    }
}
