//! Pure data types for git operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Branch information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    /// Branch name without the `origin/` prefix.
    pub name: String,
    /// Whether this is a remote-tracking branch.
    pub is_remote: bool,
}

/// The tip commit of a reconciled branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    /// Full commit hash.
    pub hash: String,
    /// Author timestamp.
    pub timestamp: DateTime<Utc>,
    /// Author name.
    pub author: String,
    /// First line of the commit message.
    pub subject: String,
}

impl CommitInfo {
    /// Abbreviated hash for log lines.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }
}

/// How a mirror was brought in line with its remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMethod {
    /// Mirror did not exist and was cloned.
    Cloned,
    /// Local branch already matched the remote tip.
    UpToDate,
    /// Local branch was forced to the remote tip.
    Reset,
    /// Local branch was rebased onto the remote tip.
    Rebased,
    /// Remote tip was merged into the local branch.
    Merged,
}

impl std::fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMethod::Cloned => write!(f, "cloned"),
            SyncMethod::UpToDate => write!(f, "up to date"),
            SyncMethod::Reset => write!(f, "reset"),
            SyncMethod::Rebased => write!(f, "rebased"),
            SyncMethod::Merged => write!(f, "merged"),
        }
    }
}

/// Result of reconciling one mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// What was done to the mirror.
    pub method: SyncMethod,
    /// Branch checked out after reconciliation.
    pub branch: String,
    /// Tip commit after reconciliation.
    pub commit: CommitInfo,
}
