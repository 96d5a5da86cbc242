//! repopulse - concurrent engineering-health reports for GitHub repositories
//!
//! Runs a set of analyzers (activity, pull requests, CI, issues, security,
//! releases, branches, overall health) over many repositories at once while
//! sharing one API quota, then renders a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success (no findings above threshold, or no --fail-on set)
//!   1 - Runtime or configuration error
//!   2 - Findings at or above the --fail-on threshold
//!   130 - Cancelled by the user (Ctrl-C)

mod analysis;
mod analyzers;
mod cache;
mod cli;
mod config;
mod error;
mod github;
mod models;
mod orchestrator;
mod report;

use analyzers::{build_registry, AnalyzerFilter};
use anyhow::{bail, Context, Result};
use cache::{CachedTransport, ResponseCache};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use error::RunError;
use github::{GithubClient, HttpTransport, Transport};
use models::{Severity, TargetRepository};
use orchestrator::Orchestrator;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Upper bound on repositories expanded from `--org`.
const MAX_OWNER_REPOSITORIES: usize = 1000;

const EXIT_FINDINGS: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("repopulse v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", redact(&args));

    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .repopulse.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to tune the lookback window, depth and analyzer thresholds.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Copy of the arguments safe to log.
fn redact(args: &Args) -> Args {
    let mut args = args.clone();
    if args.token.is_some() {
        args.token = Some("***".to_string());
    }
    args
}

/// Run the complete analysis workflow. Returns the process exit code.
///
/// Status lines go to stderr so the report can be piped from stdout.
async fn run_analysis(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Resolve the run scope before touching the network.
    let analysis = config.analysis_config(Utc::now())?;
    let mut targets = parse_targets(&args.repos)?;

    let filter = AnalyzerFilter::new(args.include.clone(), args.exclude.clone());
    let analyzers = build_registry(&config.analyzers, &filter);
    if analyzers.is_empty() {
        bail!("No analyzers selected; check --include/--exclude and the [analyzers] config");
    }

    if config.github.token.is_none() {
        warn!("No GitHub token configured; unauthenticated requests are limited to 60 per hour");
    }
    let client = Arc::new(build_client(&config)?);

    if let Some(ref owner) = args.org {
        eprintln!("📥 Listing repositories of {}...", owner);
        let listed = client
            .list_owner_repositories(owner, MAX_OWNER_REPOSITORIES)
            .await
            .with_context(|| format!("Failed to list repositories of {}", owner))?;
        info!("{} repositories found for {}", listed.len(), owner);
        targets.extend(listed);
    }

    targets.sort();
    targets.dedup();
    if targets.is_empty() {
        bail!("No repositories to analyze");
    }

    eprintln!("🔬 Analyzing {} repositories", targets.len());
    eprintln!(
        "   Analyzers: {}",
        analyzers.iter().map(|a| a.name()).collect::<Vec<_>>().join(", ")
    );
    eprintln!(
        "   Window: since {} | Depth: {}{}",
        analysis.since.format("%Y-%m-%d"),
        analysis.depth.kind,
        if analysis.include_deep_scans { " + deep scans" } else { "" }
    );
    eprintln!("   Concurrency: {}\n", config.general.concurrency);

    client.preflight(targets.len(), &analysis).await;

    let cancel = CancellationToken::new();
    let interrupt = Orchestrator::cancel_on_interrupt(&cancel);

    let orchestrator = Orchestrator::new(
        client.clone(),
        analyzers,
        analysis,
        config.general.concurrency,
    )
    .with_progress(!args.quiet);

    let result = orchestrator.run(targets, cancel).await;
    interrupt.abort();

    let report = match result {
        Ok(report) => report,
        Err(e @ RunError::Cancelled) => {
            eprintln!("\n⛔ {}", e);
            return Ok(EXIT_CANCELLED);
        }
    };

    // Render and write the report
    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        None => println!("{}", output),
    }

    // Print summary
    let summary = &report.summary;
    let count = |s: Severity| summary.findings_by_severity.get(&s).copied().unwrap_or(0);
    eprintln!("\n📊 Analysis Summary:");
    eprintln!("   Repositories: {}", summary.total_repositories);
    eprintln!("   Total findings: {}", summary.total_findings);
    eprintln!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {} | 🔵 Info: {}",
        count(Severity::Critical),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low),
        count(Severity::Info)
    );
    if summary.analyzer_errors > 0 {
        eprintln!(
            "   ⚠️  {} analyzer errors in {} repositories",
            summary.analyzer_errors, summary.repositories_with_errors
        );
    }
    let quota = client.rate_status();
    eprintln!("   API quota left: {}/{}", quota.remaining, quota.limit);
    eprintln!("   Duration: {:.1}s", report.metadata.duration_seconds);
    match args.output {
        Some(ref path) => eprintln!("\n✅ Analysis complete! Report saved to: {}", path.display()),
        None => eprintln!("\n✅ Analysis complete!"),
    }

    // Check --fail-on threshold
    if let Some(fail_level) = args.fail_on {
        let above = analysis::findings_at_or_above(&report.repositories, fail_level.severity());

        if !above.is_empty() {
            eprintln!(
                "\n⛔ {} findings at or above {:?} severity. Failing (exit code 2).",
                above.len(),
                fail_level
            );
            return Ok(EXIT_FINDINGS);
        }
    }

    Ok(0)
}

/// Parse positional repository arguments.
fn parse_targets(repos: &[String]) -> Result<Vec<TargetRepository>> {
    repos
        .iter()
        .map(|r| r.parse::<TargetRepository>().map_err(Into::into))
        .collect()
}

/// Build the API client, with the response cache underneath unless disabled.
fn build_client(config: &Config) -> Result<GithubClient> {
    let http = HttpTransport::new(
        &config.github.api_url,
        config.github.token.clone(),
        Duration::from_secs(config.github.timeout_seconds),
    )
    .context("Failed to build HTTP client")?;

    let transport: Arc<dyn Transport> = if config.cache.enabled {
        let cache = ResponseCache::new(
            config
                .cache
                .dir
                .clone()
                .unwrap_or_else(ResponseCache::default_dir),
            Duration::from_secs(config.cache.ttl_seconds),
        )
        .with_scope(&config.github.api_url, config.github.token.as_deref());
        debug!("Response cache at {}", cache.dir().display());
        Arc::new(CachedTransport::new(Arc::new(http), cache))
    } else {
        debug!("Response cache disabled");
        Arc::new(http)
    };

    Ok(GithubClient::new(transport, config.client_options()))
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
