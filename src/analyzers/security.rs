//! Security posture: open vulnerability alerts and a disclosure policy.
//!
//! Alert endpoints need elevated token scopes or enabled features. A 401/403
//! on them is expected for many repositories and is reported as an
//! informational finding instead of failing the analyzer.

use super::{AnalyzerError, Analyzer};
use crate::error::ApiError;
use crate::github::models::{CodeScanningAlert, DependabotAlert};
use crate::github::GithubClient;
use crate::models::{AnalysisConfig, AnalyzerResult, Finding, Severity, TargetRepository};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const MAX_ALERTS: usize = 100;

const POLICY_PATHS: [&str; 3] = ["SECURITY.md", ".github/SECURITY.md", "docs/SECURITY.md"];

#[derive(Debug, Clone, Default)]
pub struct SecurityAnalyzer;

impl SecurityAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

/// `Ok(None)` when the endpoint is not accessible with the current token.
fn optional<T>(result: Result<T, ApiError>) -> Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_permission_denied() => {
            warn!("Optional security endpoint not accessible: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl Analyzer for SecurityAnalyzer {
    fn name(&self) -> &'static str {
        "security"
    }

    fn short_name(&self) -> &'static str {
        "sec"
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
        let open = [("state", "open".to_string())];

        let dependabot = client
            .collect_as::<DependabotAlert>(
                &format!("{}/dependabot/alerts", base),
                &open,
                MAX_ALERTS,
            )
            .await;
        match optional(dependabot) {
            Ok(Some(alerts)) => {
                let critical = alerts.iter().filter(|a| a.severity() == "critical").count();
                let high = alerts.iter().filter(|a| a.severity() == "high").count();

                result.push_count("open_dependabot_alerts", alerts.len(), "Open Dependabot alerts");
                result.push_count(
                    "critical_dependabot_alerts",
                    critical,
                    "Open Dependabot alerts rated critical",
                );

                if critical > 0 {
                    result.push_finding(
                        Finding::new(
                            "critical_vulnerabilities",
                            Severity::Critical,
                            format!("{} critical dependency vulnerabilities are open", critical),
                        )
                        .with_remediation("Upgrade the affected dependencies immediately"),
                    );
                }
                if high > 0 {
                    result.push_finding(
                        Finding::new(
                            "high_vulnerabilities",
                            Severity::High,
                            format!("{} high-severity dependency vulnerabilities are open", high),
                        )
                        .with_remediation("Review and merge the Dependabot security updates"),
                    );
                }
                let rest = alerts.len() - critical - high;
                if rest > 0 {
                    result.push_finding(Finding::new(
                        "open_vulnerabilities",
                        Severity::Medium,
                        format!("{} lower-severity dependency alerts are open", rest),
                    ));
                }
            }
            Ok(None) => result.push_finding(Finding::new(
                "dependabot_unavailable",
                Severity::Info,
                "Dependabot alerts are not accessible with the current token",
            )),
            Err(e) => return Err(AnalyzerError::new(result, e)),
        }

        if config.include_deep_scans && !cancel.is_cancelled() {
            let scanning = client
                .collect_as::<CodeScanningAlert>(
                    &format!("{}/code-scanning/alerts", base),
                    &open,
                    MAX_ALERTS,
                )
                .await;
            match optional(scanning) {
                Ok(Some(alerts)) => {
                    let severe = alerts
                        .iter()
                        .filter(|a| {
                            a.rule
                                .as_ref()
                                .and_then(|r| r.security_severity_level.as_deref())
                                .is_some_and(|level| level == "critical" || level == "high")
                        })
                        .count();
                    result.push_count(
                        "open_code_scanning_alerts",
                        alerts.len(),
                        "Open code scanning alerts",
                    );
                    if severe > 0 {
                        result.push_finding(Finding::new(
                            "code_scanning_alerts",
                            Severity::High,
                            format!("{} high or critical code scanning alerts are open", severe),
                        ));
                    }
                }
                Ok(None) => result.push_finding(Finding::new(
                    "code_scanning_unavailable",
                    Severity::Info,
                    "Code scanning alerts are not accessible with the current token",
                )),
                Err(e) => return Err(AnalyzerError::new(result, e)),
            }
        }

        let mut policy = None;
        for path in POLICY_PATHS {
            match client.call(&format!("{}/contents/{}", base, path), &[]).await {
                Ok(Some(_)) => {
                    policy = Some(path);
                    break;
                }
                Ok(None) => {}
                Err(e) => return Err(AnalyzerError::new(result, e)),
            }
        }

        result.push_metric(
            "has_security_policy",
            if policy.is_some() { 1.0 } else { 0.0 },
            "bool",
            policy.unwrap_or("missing"),
            "Repository publishes a security policy",
        );
        if policy.is_none() {
            result.push_finding(
                Finding::new(
                    "missing_security_policy",
                    Severity::Low,
                    "No SECURITY.md describing how to report vulnerabilities",
                )
                .with_remediation("Add a SECURITY.md with a private disclosure channel"),
            );
        }

        Ok(result)
    }
}
