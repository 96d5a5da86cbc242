//! Data models for repository health analysis.
//!
//! This module contains the core data structures shared by the analyzers,
//! the orchestrator and the report generator: targets, run scope, metrics,
//! findings and the report itself.

use crate::error::ConfigError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Severity level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - no action required
    Info,
    /// Low severity - hygiene suggestions
    Low,
    /// Medium severity - process gaps worth addressing
    Medium,
    /// High severity - failing pipelines, analyzer errors, exposed risk
    High,
    /// Critical severity - open critical vulnerabilities
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "Info"),
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "🔵",
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }
}

/// One inspection target: an owner/name pair on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRepository {
    pub owner: String,
    pub name: String,
}

impl TargetRepository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    /// API path prefix for this repository, e.g. `/repos/owner/name`.
    pub fn api_path(&self) -> String {
        format!("/repos/{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for TargetRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for TargetRepository {
    type Err = ConfigError;

    /// Accepts `owner/name`, `https://github.com/owner/name(.git)` and
    /// `git@github.com:owner/name.git`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('/');
        let path = if let Some(rest) = trimmed.strip_prefix("git@github.com:") {
            rest
        } else if let Some(idx) = trimmed.find("github.com/") {
            &trimmed[idx + "github.com/".len()..]
        } else {
            trimmed
        };
        let path = path.strip_suffix(".git").unwrap_or(path);

        let mut parts = path.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self::new(owner, name))
            }
            _ => Err(ConfigError::InvalidRepository(s.to_string())),
        }
    }
}

/// Named pagination profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthKind {
    Shallow,
    #[default]
    Standard,
    Deep,
}

impl fmt::Display for DepthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepthKind::Shallow => write!(f, "shallow"),
            DepthKind::Standard => write!(f, "standard"),
            DepthKind::Deep => write!(f, "deep"),
        }
    }
}

impl FromStr for DepthKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shallow" => Ok(DepthKind::Shallow),
            "standard" => Ok(DepthKind::Standard),
            "deep" => Ok(DepthKind::Deep),
            other => Err(ConfigError::UnknownDepthProfile(other.to_string())),
        }
    }
}

/// Pagination ceilings applied to collection endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthProfile {
    pub kind: DepthKind,
    pub max_commits: usize,
    pub max_pull_requests: usize,
    pub max_issues: usize,
    pub max_workflow_runs: usize,
}

impl DepthProfile {
    pub fn for_kind(kind: DepthKind) -> Self {
        match kind {
            DepthKind::Shallow => Self {
                kind,
                max_commits: 100,
                max_pull_requests: 50,
                max_issues: 50,
                max_workflow_runs: 30,
            },
            DepthKind::Standard => Self {
                kind,
                max_commits: 500,
                max_pull_requests: 200,
                max_issues: 200,
                max_workflow_runs: 100,
            },
            DepthKind::Deep => Self {
                kind,
                max_commits: 2000,
                max_pull_requests: 1000,
                max_issues: 1000,
                max_workflow_runs: 500,
            },
        }
    }
}

impl Default for DepthProfile {
    fn default() -> Self {
        Self::for_kind(DepthKind::Standard)
    }
}

/// API calls a deep scan adds per repository (branch heads, code scanning, tree).
const DEEP_SCAN_SURCHARGE: u32 = 35;

/// Scope of one run. Built once, shared read-only by every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Start of the lookback window.
    pub since: DateTime<Utc>,
    pub depth: DepthProfile,
    pub include_deep_scans: bool,
}

impl AnalysisConfig {
    pub fn new(since: DateTime<Utc>, depth: DepthProfile, include_deep_scans: bool) -> Self {
        Self {
            since,
            depth,
            include_deep_scans,
        }
    }

    /// Rough number of API calls one repository costs under this scope.
    ///
    /// Counts one page per 100 items of every paginated collection plus the
    /// fixed single-shot reads the analyzers make.
    pub fn estimated_calls_per_repository(&self) -> u32 {
        let pages = |n: usize| n.div_ceil(100) as u32;
        let single_shot = 10;
        let collections = pages(self.depth.max_commits)
            + pages(self.depth.max_pull_requests)
            + pages(self.depth.max_issues)
            + pages(self.depth.max_workflow_runs)
            + 3; // branches, releases, dependabot alerts
        let base = single_shot + collections;
        if self.include_deep_scans {
            base + DEEP_SCAN_SURCHARGE
        } else {
            base
        }
    }

    /// Length of the lookback window in days (at least one).
    pub fn window_days(&self, now: DateTime<Utc>) -> f64 {
        let days = (now - self.since).num_seconds() as f64 / 86_400.0;
        days.max(1.0)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::new(Utc::now() - Duration::days(30), DepthProfile::default(), false)
    }
}

/// A numeric observation produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub unit: String,
    /// Human-readable rendering of the value.
    pub display: String,
    pub description: String,
}

/// A qualitative, severity-tagged observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Finding type attached by the orchestrator when an analyzer fails.
pub const ANALYZER_ERROR: &str = "analyzer_error";

impl Finding {
    pub fn new(kind: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            message: message.into(),
            remediation: None,
            location: None,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// The high-severity finding recorded for a failed analyzer invocation.
    pub fn analyzer_error(analyzer: &str, error: &str) -> Self {
        Self::new(
            ANALYZER_ERROR,
            Severity::High,
            format!("Analyzer '{}' failed: {}", analyzer, error),
        )
        .with_remediation("Re-run the analysis; check token scopes and API availability")
    }
}

/// Output of one analyzer for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResult {
    pub analyzer: String,
    pub metrics: Vec<Metric>,
    pub findings: Vec<Finding>,
}

impl AnalyzerResult {
    pub fn new(analyzer: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            metrics: Vec::new(),
            findings: Vec::new(),
        }
    }

    /// Append a metric.
    pub fn push_metric(
        &mut self,
        key: &str,
        value: f64,
        unit: &str,
        display: impl Into<String>,
        description: &str,
    ) {
        self.metrics.push(Metric {
            key: key.to_string(),
            value,
            unit: unit.to_string(),
            display: display.into(),
            description: description.to_string(),
        });
    }

    /// Append a count metric, rendered as an integer.
    pub fn push_count(&mut self, key: &str, value: usize, description: &str) {
        self.push_metric(key, value as f64, "count", value.to_string(), description);
    }

    pub fn push_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.key == key).map(|m| m.value)
    }

    pub fn has_error(&self) -> bool {
        self.findings.iter().any(|f| f.kind == ANALYZER_ERROR)
    }
}

/// All analyzer output for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoResult {
    /// `owner/name`.
    pub name: String,
    pub url: String,
    pub analyzers: Vec<AnalyzerResult>,
}

impl RepoResult {
    pub fn new(target: &TargetRepository) -> Self {
        Self {
            name: target.full_name(),
            url: target.html_url(),
            analyzers: Vec::new(),
        }
    }

    /// First value recorded under `key` by any analyzer.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.analyzers.iter().find_map(|a| a.metric(key))
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.analyzers.iter().flat_map(|a| a.findings.iter())
    }

    pub fn has_errors(&self) -> bool {
        self.analyzers.iter().any(|a| a.has_error())
    }
}

/// Cross-repository statistics, derived once after every task finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSummary {
    pub total_repositories: usize,
    pub total_findings: usize,
    pub findings_by_severity: BTreeMap<Severity, usize>,
    pub analyzer_errors: usize,
    pub repositories_with_errors: usize,
    pub total_commits: f64,
    pub avg_health_score: Option<f64>,
    pub avg_ci_success_rate: Option<f64>,
    pub avg_pr_cycle_time_hours: Option<f64>,
    pub avg_bus_factor: Option<f64>,
    /// Repositories whose health score is below the risk threshold.
    pub at_risk_repositories: Vec<String>,
    /// Repositories with a bus factor of one.
    pub single_maintainer_repositories: Vec<String>,
}

/// Metadata about the run that produced a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tool_version: String,
    pub since: DateTime<Utc>,
    pub depth: DepthKind,
    pub deep_scans: bool,
    pub analyzers: Vec<String>,
    pub repositories_requested: usize,
}

/// The complete health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub repositories: Vec<RepoResult>,
    pub summary: GlobalSummary,
}

impl Report {
    /// Creates an empty report for a run that is about to start.
    pub fn new(metadata: ReportMetadata) -> Self {
        Self {
            metadata,
            repositories: Vec::new(),
            summary: GlobalSummary::default(),
        }
    }
}
