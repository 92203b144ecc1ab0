//! Git output parsing helpers.

use std::process::Output;

use chrono::{DateTime, Utc};

use super::types::{BranchInfo, CommitInfo};

/// Field separator used in `git log --format` strings.
pub const FIELD_SEP: char = '\x1f';

/// Format string matching [`parse_commit_line`].
pub const COMMIT_FORMAT: &str = "--format=%H%x1f%at%x1f%an%x1f%s";

/// Formats a git error with both stdout and stderr for better debugging.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Parses one line produced by `git log -1` with [`COMMIT_FORMAT`].
pub fn parse_commit_line(line: &str) -> Option<CommitInfo> {
    let mut fields = line.trim_end_matches(['\r', '\n']).splitn(4, FIELD_SEP);

    let hash = fields.next()?.trim();
    if hash.is_empty() {
        return None;
    }
    let seconds: i64 = fields.next()?.trim().parse().ok()?;
    let timestamp: DateTime<Utc> = DateTime::from_timestamp(seconds, 0)?;
    let author = fields.next().unwrap_or_default().to_string();
    let subject = fields.next().unwrap_or_default().to_string();

    Some(CommitInfo {
        hash: hash.to_string(),
        timestamp,
        author,
        subject,
    })
}

/// Parses `git for-each-ref --format=%(refname) refs/heads refs/remotes/origin`.
///
/// The symbolic `origin/HEAD` ref is skipped.
pub fn parse_branch_refs(output: &str) -> Vec<BranchInfo> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            if let Some(name) = line.strip_prefix("refs/heads/") {
                Some(BranchInfo {
                    name: name.to_string(),
                    is_remote: false,
                })
            } else if let Some(name) = line.strip_prefix("refs/remotes/origin/") {
                (name != "HEAD").then(|| BranchInfo {
                    name: name.to_string(),
                    is_remote: true,
                })
            } else {
                None
            }
        })
        .collect()
}
