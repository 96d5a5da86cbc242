//! Builds the ordered analyzer list for a run.

use super::{
    ActivityAnalyzer, Analyzer, BranchAnalyzer, CiAnalyzer, HealthAnalyzer, IssueAnalyzer,
    PullRequestAnalyzer, ReleaseAnalyzer, SecurityAnalyzer,
};
use crate::config::AnalyzersConfig;
use std::sync::Arc;
use tracing::{debug, warn};

/// Analyzer selection from the command line.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerFilter {
    /// When non-empty, only these analyzers run (even if disabled in config).
    pub include: Vec<String>,
    /// Analyzers to skip. Ignored when `include` is non-empty.
    pub exclude: Vec<String>,
}

impl AnalyzerFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }
}

fn matches(analyzer: &dyn Analyzer, names: &[String]) -> bool {
    names
        .iter()
        .any(|n| n == analyzer.name() || n == analyzer.short_name())
}

fn entry(analyzer: impl Analyzer + 'static, enabled: bool) -> (Arc<dyn Analyzer>, bool) {
    (Arc::new(analyzer), enabled)
}

/// Instantiate every analyzer with its configured thresholds, paired with its
/// enabled flag, in report order.
fn all_analyzers(config: &AnalyzersConfig) -> Vec<(Arc<dyn Analyzer>, bool)> {
    vec![
        entry(ActivityAnalyzer::new(), config.activity.enabled),
        entry(
            PullRequestAnalyzer::new(config.pull_requests.stale_days),
            config.pull_requests.enabled,
        ),
        entry(CiAnalyzer::new(config.ci.min_success_rate), config.ci.enabled),
        entry(IssueAnalyzer::new(config.issues.stale_days), config.issues.enabled),
        entry(SecurityAnalyzer::new(), config.security.enabled),
        entry(ReleaseAnalyzer::new(config.releases.stale_days), config.releases.enabled),
        entry(BranchAnalyzer::new(config.branches.stale_days), config.branches.enabled),
        entry(HealthAnalyzer::new(), config.health.enabled),
    ]
}

/// Select the analyzers for a run.
///
/// Names match the long or short form exactly. Unknown names are warned
/// about and otherwise ignored.
pub fn build_registry(config: &AnalyzersConfig, filter: &AnalyzerFilter) -> Vec<Arc<dyn Analyzer>> {
    let candidates = all_analyzers(config);

    for name in filter.include.iter().chain(filter.exclude.iter()) {
        if !candidates.iter().any(|(a, _)| matches(a.as_ref(), std::slice::from_ref(name))) {
            warn!("Unknown analyzer '{}' ignored", name);
        }
    }

    let selected: Vec<Arc<dyn Analyzer>> = candidates
        .into_iter()
        .filter(|(analyzer, enabled)| {
            if !filter.include.is_empty() {
                matches(analyzer.as_ref(), &filter.include)
            } else {
                *enabled && !matches(analyzer.as_ref(), &filter.exclude)
            }
        })
        .map(|(analyzer, _)| analyzer)
        .collect();

    debug!(
        "Analyzers selected: {}",
        selected.iter().map(|a| a.name()).collect::<Vec<_>>().join(", ")
    );
    selected
}
