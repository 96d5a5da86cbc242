//! Typed views of the GitHub payloads the analyzers read.
//!
//! Only the fields actually used are modelled; everything else in the
//! responses is ignored by serde.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}

/// `GET /repos/{owner}/{repo}`
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    #[serde(default)]
    pub license: Option<serde_json::Value>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub author: Option<CommitAuthor>,
    #[serde(default)]
    pub committer: Option<CommitAuthor>,
}

/// Item of `GET /repos/{owner}/{repo}/commits`, also `GET .../commits/{sha}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub commit: CommitDetail,
    #[serde(default)]
    pub author: Option<Account>,
}

impl Commit {
    /// Login if GitHub linked the commit to an account, else the git author
    /// email or name.
    pub fn author_key(&self) -> Option<String> {
        if let Some(ref account) = self.author {
            return Some(account.login.clone());
        }
        let author = self.commit.author.as_ref()?;
        author.email.clone().or_else(|| author.name.clone())
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.commit
            .committer
            .as_ref()
            .and_then(|c| c.date)
            .or_else(|| self.commit.author.as_ref().and_then(|a| a.date))
    }
}

/// Item of `GET /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Item of `GET /repos/{owner}/{repo}/issues`. Pull requests also appear in
/// this listing and carry a `pull_request` key.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<serde_json::Value>,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// Item of `GET /repos/{owner}/{repo}/actions/runs` (`workflow_runs` array).
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    #[serde(default)]
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub run_started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// `GET /repos/{owner}/{repo}/commits/{ref}/status`
#[derive(Debug, Clone, Deserialize)]
pub struct CombinedStatus {
    pub state: String,
    #[serde(default)]
    pub total_count: u64,
}

/// Item of `GET /repos/{owner}/{repo}/releases`.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchCommit {
    pub sha: String,
}

/// Item of `GET /repos/{owner}/{repo}/branches`.
#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: BranchCommit,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityAdvisory {
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependabotAlert {
    #[serde(default)]
    pub security_advisory: Option<SecurityAdvisory>,
}

impl DependabotAlert {
    pub fn severity(&self) -> &str {
        self.security_advisory
            .as_ref()
            .and_then(|a| a.severity.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeScanningRule {
    #[serde(default)]
    pub security_severity_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeScanningAlert {
    #[serde(default)]
    pub rule: Option<CodeScanningRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunityFiles {
    #[serde(default)]
    pub readme: Option<serde_json::Value>,
    #[serde(default)]
    pub contributing: Option<serde_json::Value>,
    #[serde(default)]
    pub code_of_conduct: Option<serde_json::Value>,
    #[serde(default)]
    pub issue_template: Option<serde_json::Value>,
    #[serde(default)]
    pub pull_request_template: Option<serde_json::Value>,
    #[serde(default)]
    pub license: Option<serde_json::Value>,
}

/// `GET /repos/{owner}/{repo}/community/profile`
#[derive(Debug, Clone, Deserialize)]
pub struct CommunityProfile {
    #[serde(default)]
    pub files: CommunityFiles,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "blob"
    }
}

/// `GET /repos/{owner}/{repo}/git/trees/{ref}`
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

impl Tree {
    /// True when a file exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.tree.iter().any(|e| e.is_file() && e.path == path)
    }

    /// True when any file lives under `prefix`.
    pub fn has_file_under(&self, prefix: &str) -> bool {
        self.tree.iter().any(|e| e.is_file() && e.path.starts_with(prefix))
    }
}

/// Item of `GET /orgs/{org}/repos` and `GET /users/{user}/repos`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySummary {
    pub name: String,
    pub owner: Account,
    #[serde(default)]
    pub archived: bool,
}
