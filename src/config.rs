//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.repopulse.toml` files.

use crate::cli::{Args, OutputFormat};
use crate::error::ConfigError;
use crate::github::{ClientOptions, DEFAULT_API_URL};
use crate::models::{AnalysisConfig, DepthKind, DepthProfile};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".repopulse.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// GitHub API access and rate governance.
    #[serde(default)]
    pub github: GithubConfig,

    /// Run scope.
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Per-analyzer toggles and thresholds.
    #[serde(default)]
    pub analyzers: AnalyzersConfig,

    /// On-disk response cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Number of repositories analyzed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            format: OutputFormat::default(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API base URL (GitHub Enterprise: `https://host/api/v3`).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Access token. Prefer the `GITHUB_TOKEN` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Remaining-quota level that triggers a warning.
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: u32,

    /// Extra seconds added to every wait for a quota reset.
    #[serde(default = "default_safety_margin")]
    pub safety_margin_seconds: u64,

    /// Pause before a run whose estimated cost exceeds the remaining quota.
    #[serde(default = "default_preflight_grace")]
    pub preflight_grace_seconds: u64,

    /// HTTP request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            low_water_mark: default_low_water_mark(),
            safety_margin_seconds: default_safety_margin(),
            preflight_grace_seconds: default_preflight_grace(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_low_water_mark() -> u32 {
    100
}

fn default_safety_margin() -> u64 {
    1
}

fn default_preflight_grace() -> u64 {
    3
}

fn default_timeout() -> u64 {
    30
}

/// Lookback window and depth of a run, as written by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Lookback window, e.g. `30d`, `720h`, `2w`.
    #[serde(default = "default_since")]
    pub since: String,

    /// Depth profile: shallow, standard or deep.
    #[serde(default = "default_depth")]
    pub depth: String,

    /// Enable the expensive per-branch and code-scanning reads.
    #[serde(default)]
    pub include_deep_scans: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            since: default_since(),
            depth: default_depth(),
            include_deep_scans: false,
        }
    }
}

fn default_since() -> String {
    "30d".to_string()
}

fn default_depth() -> String {
    "standard".to_string()
}

/// An analyzer without tunable thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Open pull requests idle for this many days are stale.
    #[serde(default = "default_pr_stale_days")]
    pub stale_days: i64,
}

impl Default for PullRequestsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_days: default_pr_stale_days(),
        }
    }
}

fn default_pr_stale_days() -> i64 {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Success rate (percent) below which CI is flagged as unstable.
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_success_rate: default_min_success_rate(),
        }
    }
}

fn default_min_success_rate() -> f64 {
    80.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_issue_stale_days")]
    pub stale_days: i64,
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_days: default_issue_stale_days(),
        }
    }
}

fn default_issue_stale_days() -> i64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Days after the latest release before a new one is overdue.
    #[serde(default = "default_release_stale_days")]
    pub stale_days: i64,
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_days: default_release_stale_days(),
        }
    }
}

fn default_release_stale_days() -> i64 {
    180
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_branch_stale_days")]
    pub stale_days: i64,
}

impl Default for BranchesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_days: default_branch_stale_days(),
        }
    }
}

fn default_branch_stale_days() -> i64 {
    90
}

/// Analyzer settings, one table per analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzersConfig {
    #[serde(default)]
    pub activity: ToggleConfig,
    #[serde(default)]
    pub pull_requests: PullRequestsConfig,
    #[serde(default)]
    pub ci: CiConfig,
    #[serde(default)]
    pub issues: IssuesConfig,
    #[serde(default)]
    pub security: ToggleConfig,
    #[serde(default)]
    pub releases: ReleasesConfig,
    #[serde(default)]
    pub branches: BranchesConfig,
    #[serde(default)]
    pub health: ToggleConfig,
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache directory. Defaults to `<user cache dir>/repopulse`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Entries older than this are refetched.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u64 {
    3600
}

/// Parse a lookback window such as `30d`, `720h`, `2w`, `90m` or `45s`.
pub fn parse_lookback(value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(value.to_string());
    let trimmed = value.trim();
    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let amount: i64 = trimmed[..trimmed.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let lookback = match unit {
        's' => Duration::try_seconds(amount),
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        'w' => Duration::try_weeks(amount),
        _ => None,
    };
    lookback.ok_or_else(invalid)
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings. Only values
    /// the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }

        if let Some(ref token) = args.token {
            self.github.token = Some(token.clone());
        }
        if let Some(ref api_url) = args.api_url {
            self.github.api_url = api_url.clone();
        }

        if let Some(ref since) = args.since {
            self.analysis.since = since.clone();
        }
        if let Some(ref depth) = args.depth {
            self.analysis.depth = depth.clone();
        }
        if args.deep {
            self.analysis.include_deep_scans = true;
        }

        if args.no_cache {
            self.cache.enabled = false;
        }
    }

    /// Resolve the run scope relative to `now`.
    pub fn analysis_config(&self, now: DateTime<Utc>) -> Result<AnalysisConfig, ConfigError> {
        let lookback = parse_lookback(&self.analysis.since)?;
        let since = now
            .checked_sub_signed(lookback)
            .ok_or_else(|| ConfigError::InvalidDuration(self.analysis.since.clone()))?;
        let depth: DepthKind = self.analysis.depth.parse()?;
        Ok(AnalysisConfig::new(
            since,
            DepthProfile::for_kind(depth),
            self.analysis.include_deep_scans,
        ))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            low_water_mark: self.github.low_water_mark,
            safety_margin: std::time::Duration::from_secs(self.github.safety_margin_seconds),
            preflight_grace: std::time::Duration::from_secs(self.github.preflight_grace_seconds),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.concurrency, 4);
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.analysis.since, "30d");
        assert_eq!(config.analyzers.pull_requests.stale_days, 14);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
concurrency = 8
format = "json"

[analysis]
since = "2w"
depth = "deep"

[analyzers.ci]
min_success_rate = 95.0

[analyzers.security]
enabled = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.concurrency, 8);
        assert_eq!(config.general.format, OutputFormat::Json);
        assert_eq!(config.analysis.depth, "deep");
        assert_eq!(config.analyzers.ci.min_success_rate, 95.0);
        assert!(config.analyzers.ci.enabled);
        assert!(!config.analyzers.security.enabled);
        assert_eq!(config.analyzers.releases.stale_days, 180);
    }

    #[test]
    fn test_parse_lookback() {
        assert_eq!(parse_lookback("30d"), Ok(Duration::days(30)));
        assert_eq!(parse_lookback("720h"), Ok(Duration::hours(720)));
        assert_eq!(parse_lookback("2w"), Ok(Duration::weeks(2)));
        assert_eq!(parse_lookback("90m"), Ok(Duration::minutes(90)));
        assert_eq!(parse_lookback("45s"), Ok(Duration::seconds(45)));

        for bad in ["", "d", "30", "thirty days", "-5d", "0d", "3y", "200000000000000d"] {
            assert_eq!(
                parse_lookback(bad),
                Err(ConfigError::InvalidDuration(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_analysis_config_resolution() {
        let now = Utc::now();
        let mut config = Config::default();
        config.analysis.depth = "shallow".to_string();

        let analysis = config.analysis_config(now).unwrap();
        assert_eq!(analysis.since, now - Duration::days(30));
        assert_eq!(analysis.depth.max_commits, 100);

        config.analysis.depth = "bottomless".to_string();
        assert_eq!(
            config.analysis_config(now),
            Err(ConfigError::UnknownDepthProfile("bottomless".to_string()))
        );
    }

    #[test]
    fn test_analysis_config_rejects_unrepresentable_window() {
        let mut config = Config::default();
        config.analysis.since = "100000000d".to_string();

        assert_eq!(
            config.analysis_config(Utc::now()),
            Err(ConfigError::InvalidDuration("100000000d".to_string()))
        );
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::parse_from([
            "repopulse", "o/r", "--since", "7d", "--deep", "--concurrency", "2", "--no-cache",
        ]);
        let mut config = Config::default();
        config.analysis.depth = "deep".to_string();
        config.merge_with_args(&args);

        assert_eq!(config.analysis.since, "7d");
        assert_eq!(config.analysis.depth, "deep");
        assert!(config.analysis.include_deep_scans);
        assert_eq!(config.general.concurrency, 2);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[github]"));
        assert!(toml_str.contains("[analyzers.ci]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.analyzers.branches.stale_days, 90);
    }
}
