//! Concurrent execution of the analyzer registry over many repositories.
//!
//! One task is spawned per repository. A semaphore admits at most
//! `concurrency` of them at a time; inside a task the analyzers run one after
//! another so that per-repository load on the API stays predictable. Results
//! are merged into the shared report under a single lock together with the
//! progress bar update.

use crate::analysis::aggregator::summarize;
use crate::analyzers::{Analyzer, AnalyzerError};
use crate::error::RunError;
use crate::github::GithubClient;
use crate::models::{
    AnalysisConfig, Finding, RepoResult, Report, ReportMetadata, TargetRepository,
};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of one repository task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    /// Waiting for an admission slot.
    Pending,
    /// Holding a slot and running analyzers.
    Running,
    Completed,
    /// Stopped by cancellation, either before admission or between analyzers.
    Cancelled,
}

/// State every task writes to when it finishes.
struct Shared {
    report: Report,
    progress: ProgressBar,
}

/// Everything a repository task needs, cloned once per task.
#[derive(Clone)]
struct TaskContext {
    client: Arc<GithubClient>,
    analyzers: Arc<[Arc<dyn Analyzer>]>,
    config: Arc<AnalysisConfig>,
    gate: Arc<Semaphore>,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
}

pub struct Orchestrator {
    client: Arc<GithubClient>,
    analyzers: Arc<[Arc<dyn Analyzer>]>,
    config: Arc<AnalysisConfig>,
    concurrency: usize,
    show_progress: bool,
}

impl Orchestrator {
    /// `concurrency` is clamped to at least one.
    pub fn new(
        client: Arc<GithubClient>,
        analyzers: Vec<Arc<dyn Analyzer>>,
        config: AnalysisConfig,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            analyzers: Arc::from(analyzers),
            config: Arc::new(config),
            concurrency: concurrency.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Cancel `cancel` on the first Ctrl-C.
    pub fn cancel_on_interrupt(cancel: &CancellationToken) -> JoinHandle<()> {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling outstanding analysis");
                cancel.cancel();
            }
        })
    }

    /// Analyze every target and build the report.
    ///
    /// Returns `RunError::Cancelled` if `cancel` fired at any point before the
    /// last task finished.
    pub async fn run(
        &self,
        targets: Vec<TargetRepository>,
        cancel: CancellationToken,
    ) -> Result<Report, RunError> {
        let (report, cancelled) = self.execute(targets, &cancel).await;
        if cancelled {
            info!(
                "Cancelled after {} of {} repositories",
                report.repositories.len(),
                report.metadata.repositories_requested
            );
            return Err(RunError::Cancelled);
        }
        Ok(report)
    }

    /// Runs all tasks to the join barrier. The flag reports whether the run
    /// was cancelled; the report then holds whatever was merged before.
    async fn execute(
        &self,
        targets: Vec<TargetRepository>,
        cancel: &CancellationToken,
    ) -> (Report, bool) {
        let started_at = Utc::now();
        let clock = Instant::now();

        let metadata = ReportMetadata {
            started_at,
            duration_seconds: 0.0,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            since: self.config.since,
            depth: self.config.depth.kind,
            deep_scans: self.config.include_deep_scans,
            analyzers: self.analyzers.iter().map(|a| a.name().to_string()).collect(),
            repositories_requested: targets.len(),
        };

        let shared = Arc::new(Mutex::new(Shared {
            report: Report::new(metadata),
            progress: self.progress_bar(targets.len()),
        }));
        let context = TaskContext {
            client: self.client.clone(),
            analyzers: self.analyzers.clone(),
            config: self.config.clone(),
            gate: Arc::new(Semaphore::new(self.concurrency)),
            shared: shared.clone(),
            cancel: cancel.clone(),
        };

        info!(
            "Analyzing {} repositories with {} analyzers ({} at a time)",
            targets.len(),
            self.analyzers.len(),
            self.concurrency
        );

        let mut tasks = JoinSet::new();
        for target in targets {
            tasks.spawn(analyze_repository(context.clone(), target));
        }
        drop(context);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(state) => debug!("Repository task finished: {:?}", state),
                Err(e) => error!("Repository task failed: {}", e),
            }
        }

        let cancelled = cancel.is_cancelled();
        let mut report = {
            let mut shared = shared.lock();
            if cancelled {
                shared.progress.abandon_with_message("cancelled");
            } else {
                shared.progress.finish_with_message("done");
            }
            let metadata = shared.report.metadata.clone();
            std::mem::replace(&mut shared.report, Report::new(metadata))
        };

        report.repositories.sort_by(|a, b| a.name.cmp(&b.name));
        report.summary = summarize(&report.repositories);
        report.metadata.duration_seconds = clock.elapsed().as_secs_f64();

        (report, cancelled)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb
    }
}

async fn analyze_repository(ctx: TaskContext, target: TargetRepository) -> TaskState {
    debug!("{}: {:?}", target, TaskState::Pending);

    let permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            debug!("{}: cancelled before admission", target);
            return TaskState::Cancelled;
        }
        permit = ctx.gate.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return TaskState::Cancelled,
        },
    };

    debug!("{}: {:?}", target, TaskState::Running);
    let mut state = TaskState::Completed;
    let mut repo = RepoResult::new(&target);

    for analyzer in ctx.analyzers.iter() {
        if ctx.cancel.is_cancelled() {
            state = TaskState::Cancelled;
            break;
        }

        match analyzer
            .analyze(&ctx.cancel, &ctx.client, &target, &ctx.config)
            .await
        {
            Ok(result) => repo.analyzers.push(result),
            Err(AnalyzerError { mut partial, source }) => {
                warn!("{} failed on {}: {}", analyzer.name(), target, source);
                partial.push_finding(Finding::analyzer_error(analyzer.name(), &source.to_string()));
                repo.analyzers.push(partial);
            }
        }
    }

    drop(permit);

    let mut shared = ctx.shared.lock();
    shared.progress.set_message(target.full_name());
    shared.progress.inc(1);
    shared.report.repositories.push(repo);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::stub::StubTransport;
    use crate::github::ClientOptions;
    use crate::models::{AnalyzerResult, Severity, ANALYZER_ERROR};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records how many invocations overlap and fails for chosen repositories.
    #[derive(Default)]
    struct ProbeAnalyzer {
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
        fail_for: Option<&'static str>,
        cancel_on_call: bool,
    }

    #[async_trait]
    impl Analyzer for ProbeAnalyzer {
        fn name(&self) -> &'static str {
            "ci-stability"
        }

        fn short_name(&self) -> &'static str {
            "ci"
        }

        async fn analyze(
            &self,
            cancel: &CancellationToken,
            _client: &GithubClient,
            target: &TargetRepository,
            _config: &AnalysisConfig,
        ) -> Result<AnalyzerResult, AnalyzerError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.cancel_on_call {
                cancel.cancel();
            }

            let mut result = AnalyzerResult::new(self.name());
            result.push_count("workflow_runs_total", 10, "Runs");
            if self.fail_for == Some(target.name.as_str()) {
                return Err(AnalyzerError::message(result, "status endpoint returned 502"));
            }
            let rate = if target.name == "a" { 90.0 } else { 70.0 };
            result.push_metric("success_rate", rate, "%", format!("{rate}%"), "Success rate");
            Ok(result)
        }
    }

    struct HealthProbe;

    #[async_trait]
    impl Analyzer for HealthProbe {
        fn name(&self) -> &'static str {
            "repository-health"
        }

        fn short_name(&self) -> &'static str {
            "health"
        }

        async fn analyze(
            &self,
            _cancel: &CancellationToken,
            _client: &GithubClient,
            _target: &TargetRepository,
            _config: &AnalysisConfig,
        ) -> Result<AnalyzerResult, AnalyzerError> {
            let mut result = AnalyzerResult::new(self.name());
            result.push_metric("health_score", 80.0, "score", "80/100", "Health");
            Ok(result)
        }
    }

    fn orchestrator(analyzers: Vec<Arc<dyn Analyzer>>, concurrency: usize) -> Orchestrator {
        let client = GithubClient::new(Arc::new(StubTransport::new()), ClientOptions::default());
        Orchestrator::new(Arc::new(client), analyzers, AnalysisConfig::default(), concurrency)
    }

    fn targets(names: &[&str]) -> Vec<TargetRepository> {
        names.iter().map(|n| TargetRepository::new("o", *n)).collect()
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let probe = Arc::new(ProbeAnalyzer {
            delay: Duration::from_millis(30),
            ..Default::default()
        });
        let orch = orchestrator(vec![probe.clone()], 3);

        let report = orch
            .run(targets(&["a", "b", "c", "d", "e", "f", "g", "h"]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.repositories.len(), 8);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 8);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let probe = Arc::new(ProbeAnalyzer::default());
        let orch = orchestrator(vec![probe.clone()], 0);

        let report = orch.run(targets(&["a", "b"]), CancellationToken::new()).await.unwrap();
        assert_eq!(report.repositories.len(), 2);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analyzer_error_becomes_single_finding() {
        let probe = Arc::new(ProbeAnalyzer {
            fail_for: Some("b"),
            ..Default::default()
        });
        let orch = orchestrator(vec![probe, Arc::new(HealthProbe)], 2);

        let report = orch.run(targets(&["b"]), CancellationToken::new()).await.unwrap();

        let repo = &report.repositories[0];
        let errors: Vec<&Finding> = repo.findings().filter(|f| f.kind == ANALYZER_ERROR).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, Severity::High);
        assert!(errors[0].message.contains("502"));
        // partial metrics survive and later analyzers still run
        assert_eq!(repo.metric("workflow_runs_total"), Some(10.0));
        assert_eq!(repo.metric("health_score"), Some(80.0));
    }

    #[tokio::test]
    async fn test_cancel_before_admission_merges_nothing() {
        let probe = Arc::new(ProbeAnalyzer::default());
        let orch = orchestrator(vec![probe.clone()], 2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (report, cancelled) = orch.execute(targets(&["a", "b", "c"]), &cancel).await;
        assert!(cancelled);
        assert!(report.repositories.is_empty());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        let result = orch.run(targets(&["a"]), cancel).await;
        assert_eq!(result.unwrap_err(), RunError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_mid_run() {
        let probe = Arc::new(ProbeAnalyzer {
            cancel_on_call: true,
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let orch = orchestrator(vec![probe.clone(), Arc::new(HealthProbe)], 1);
        let cancel = CancellationToken::new();

        let (report, cancelled) = orch.execute(targets(&["a", "b", "c"]), &cancel).await;

        assert!(cancelled);
        // Only the admitted repository is merged, and it stopped before the
        // second analyzer.
        assert_eq!(report.repositories.len(), 1);
        assert_eq!(report.repositories[0].analyzers.len(), 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        let cancel = CancellationToken::new();
        assert_eq!(
            orch.run(targets(&["a", "b"]), cancel).await.unwrap_err(),
            RunError::Cancelled
        );
    }

    #[tokio::test]
    async fn test_three_repositories_one_ci_failure() {
        let probe = Arc::new(ProbeAnalyzer {
            fail_for: Some("b"),
            delay: Duration::from_millis(5),
            ..Default::default()
        });
        let orch = orchestrator(vec![probe.clone(), Arc::new(HealthProbe)], 2);

        let report = orch
            .run(targets(&["c", "b", "a"]), CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<&str> = report.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["o/a", "o/b", "o/c"]);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);

        let summary = &report.summary;
        assert_eq!(summary.total_repositories, 3);
        assert_eq!(summary.analyzer_errors, 1);
        assert_eq!(summary.repositories_with_errors, 1);
        // averaged over the two repositories that reported a success rate
        assert_eq!(summary.avg_ci_success_rate, Some(80.0));
        assert_eq!(summary.avg_health_score, Some(80.0));
        assert_eq!(report.metadata.analyzers, vec!["ci-stability", "repository-health"]);
    }

    #[tokio::test]
    async fn test_identical_runs_give_identical_summaries() {
        let build = || {
            orchestrator(
                vec![
                    Arc::new(ProbeAnalyzer {
                        fail_for: Some("b"),
                        delay: Duration::from_millis(3),
                        ..Default::default()
                    }),
                    Arc::new(HealthProbe),
                ],
                4,
            )
        };
        let names = ["e", "a", "d", "b", "c"];

        let first = build().run(targets(&names), CancellationToken::new()).await.unwrap();
        let second = build().run(targets(&names), CancellationToken::new()).await.unwrap();

        assert_eq!(first.summary, second.summary);
        assert_eq!(first.repositories, second.repositories);
    }
}
