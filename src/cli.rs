//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Severity;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// repopulse - engineering-health reports for GitHub repositories
///
/// Inspects commit activity, pull-request flow, CI stability, issue hygiene,
/// security posture, releases and branch hygiene of many repositories
/// concurrently while staying inside the GitHub API quota.
///
/// Examples:
///   repopulse rust-lang/cargo tokio-rs/tokio
///   repopulse --org my-org --since 90d --depth shallow
///   repopulse owner/repo --include ci,prs --format json --output report.json
///   repopulse owner/repo --fail-on high
///   repopulse --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Repositories to analyze (owner/name or GitHub URL)
    #[arg(value_name = "REPO", required_unless_present_any = ["org", "init_config"])]
    pub repos: Vec<String>,

    /// Analyze every non-archived repository of this organization or user
    #[arg(long, value_name = "OWNER")]
    pub org: Option<String>,

    /// Lookback window (e.g. 30d, 720h, 2w)
    ///
    /// Default: from config or 30d.
    #[arg(long, value_name = "DURATION")]
    pub since: Option<String>,

    /// Depth profile bounding how much history is read: shallow, standard, deep
    #[arg(long, value_name = "PROFILE")]
    pub depth: Option<String>,

    /// Include expensive deep scans (branch heads, code scanning alerts)
    #[arg(long)]
    pub deep: bool,

    /// Run only these analyzers (comma-separated long or short names)
    ///
    /// Example: --include ci,pull-requests
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub include: Vec<String>,

    /// Skip these analyzers (comma-separated); ignored when --include is given
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Number of repositories analyzed concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// GitHub access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .repopulse.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Fail if findings at or above this severity are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Bypass the on-disk response cache
    #[arg(long)]
    pub no_cache: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no progress bar)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .repopulse.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl FailOnLevel {
    pub fn severity(self) -> Severity {
        match self {
            FailOnLevel::Low => Severity::Low,
            FailOnLevel::Medium => Severity::Medium,
            FailOnLevel::High => Severity::High,
            FailOnLevel::Critical => Severity::Critical,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.repos.is_empty() && self.org.is_none() {
            return Err("Specify at least one repository or --org".to_string());
        }

        if let Some(ref org) = self.org {
            if org.trim().is_empty() || org.contains('/') {
                return Err(format!("Invalid organization or user name: '{}'", org));
            }
        }

        if let Some(ref api_url) = self.api_url {
            if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Validate concurrency
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
