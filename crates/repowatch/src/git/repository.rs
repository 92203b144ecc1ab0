//! Git repository operations.
//!
//! Every command runs `git` as a child process with a timeout, so a hanging
//! remote cannot stall the caller forever.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use tokio::process::Command as TokioCommand;

use super::error::{classify_git_error, GitError, Result};
use super::parse::{format_git_error, parse_branch_refs, parse_commit_line, COMMIT_FORMAT};
use super::types::{BranchInfo, CommitInfo};
use crate::sanitize::redact_repo_url;

/// Default timeout for a single git command (in seconds).
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 30;
/// Timeout for `git ls-remote` connection tests (in seconds).
pub const LS_REMOTE_TIMEOUT_SECS: u64 = 10;
/// Number of ref lines returned by a connection test.
const LS_REMOTE_PREVIEW_LINES: usize = 5;
/// Identity for commands that create commits (stash, rebase, merge) on a mirror.
const MIRROR_IDENTITY: [&str; 4] = [
    "-c",
    "user.name=repowatch",
    "-c",
    "user.email=repowatch@localhost",
];

/// Git repository operations on a local mirror.
#[derive(Debug, Clone)]
pub struct GitRepository {
    /// Path to the git repository.
    repo_path: PathBuf,
    /// Timeout applied to each git command.
    timeout: Duration,
}

impl GitRepository {
    /// Creates a new git repository handle.
    pub fn new(repo_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo_path: repo_path.into(),
            timeout,
        }
    }

    /// Returns the repository path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Checks if the directory is a git repository.
    pub fn is_git_repo(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    /// Clones `url` into `target_path`. The parent directory is created if needed.
    pub async fn clone(url: &str, target_path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = target_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| GitError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        log::info!(
            "Cloning {} into {}",
            redact_repo_url(url),
            target_path.display()
        );

        let target = target_path.to_string_lossy();
        let output = run_git_in(None, &["clone", "--", url, &target], timeout).await?;
        if !output.status.success() {
            return Err(classify_git_error(&format_git_error(&output)));
        }

        Ok(Self::new(target_path, timeout))
    }

    /// Lists refs on a remote without cloning it.
    ///
    /// Returns the first few ref lines, enough to show the remote answered.
    pub async fn ls_remote(url: &str) -> Result<Vec<String>> {
        let output = run_git_in(
            None,
            &["ls-remote", "--", url],
            Duration::from_secs(LS_REMOTE_TIMEOUT_SECS),
        )
        .await?;

        if !output.status.success() {
            return Err(classify_git_error(&format_git_error(&output)));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(LS_REMOTE_PREVIEW_LINES)
            .map(str::to_string)
            .collect())
    }

    /// Gets the current branch name (`HEAD` when detached).
    pub async fn current_branch(&self) -> Result<String> {
        self.git_stdout(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    /// Lists local branches and `origin` remote-tracking branches.
    pub async fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        let refs = self
            .git_stdout(&[
                "for-each-ref",
                "--format=%(refname)",
                "refs/heads",
                "refs/remotes/origin",
            ])
            .await?;
        Ok(parse_branch_refs(&refs))
    }

    /// Checks whether `origin/<branch>` exists in the local ref list.
    pub async fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        let remote_ref = format!("refs/remotes/origin/{}", branch);
        let output = self
            .run_git(&["rev-parse", "--verify", "--quiet", &remote_ref])
            .await?;
        Ok(output.status.success())
    }

    /// Resolves a revision to a commit hash. Returns `None` if it does not exist.
    pub async fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{}^{{commit}}", rev);
        let output = self
            .run_git(&["rev-parse", "--verify", "--quiet", &spec])
            .await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Checks out an existing local branch.
    pub async fn checkout(&self, branch: &str) -> Result<()> {
        self.git_checked(&["checkout", branch]).await
    }

    /// Creates (or resets) a local branch at `origin/<branch>` tracking it, and checks it out.
    pub async fn checkout_remote_branch(&self, branch: &str) -> Result<()> {
        let remote_ref = format!("origin/{}", branch);
        self.git_checked(&["checkout", "-f", "-B", branch, "--track", &remote_ref])
            .await
    }

    /// Fetches all branches from `origin`, pruning deleted ones.
    pub async fn fetch(&self) -> Result<()> {
        self.git_checked(&["fetch", "--prune", "origin"]).await
    }

    /// Throws away uncommitted changes and untracked files.
    pub async fn discard_local_changes(&self) -> Result<()> {
        // A fresh `git init` has no HEAD to reset to; that is fine.
        if self.rev_parse("HEAD").await?.is_some() {
            self.git_checked(&["reset", "--hard"]).await?;
        }
        self.git_checked(&["clean", "-fdx"]).await
    }

    /// Hard-resets the current branch to `target`.
    pub async fn reset_hard(&self, target: &str) -> Result<()> {
        self.git_checked(&["reset", "--hard", target]).await
    }

    /// Stashes local changes including untracked files.
    /// Returns whether anything was stashed.
    pub async fn stash(&self, message: &str) -> Result<bool> {
        let before = self.rev_parse("refs/stash").await?;
        self.git_checked_with_identity(&["stash", "push", "--include-untracked", "-m", message])
            .await?;
        let after = self.rev_parse("refs/stash").await?;
        Ok(after.is_some() && after != before)
    }

    /// Drops the most recent stash entry.
    pub async fn stash_drop(&self) -> Result<()> {
        self.git_checked(&["stash", "drop"]).await
    }

    /// Pulls `origin/<branch>` rebasing local commits on top. Aborts on failure.
    pub async fn pull_rebase(&self, branch: &str) -> Result<()> {
        let result = self
            .git_checked_with_identity(&["pull", "--rebase", "origin", branch])
            .await;
        if result.is_err() {
            let _ = self.rebase_abort().await;
        }
        result
    }

    /// Pulls `origin/<branch>` with a merge commit. Aborts on failure.
    pub async fn pull_merge(&self, branch: &str) -> Result<()> {
        let result = self
            .git_checked_with_identity(&[
                "pull",
                "--no-rebase",
                "--no-ff",
                "--no-edit",
                "origin",
                branch,
            ])
            .await;
        if result.is_err() {
            let _ = self.merge_abort().await;
        }
        result
    }

    /// Aborts an in-progress rebase.
    pub async fn rebase_abort(&self) -> Result<()> {
        self.git_checked(&["rebase", "--abort"]).await
    }

    /// Aborts an in-progress merge.
    pub async fn merge_abort(&self) -> Result<()> {
        self.git_checked(&["merge", "--abort"]).await
    }

    /// Reads the latest commit on the checked-out branch.
    pub async fn latest_commit(&self) -> Result<CommitInfo> {
        if self.rev_parse("HEAD").await?.is_none() {
            return Err(GitError::NoCommits);
        }
        let line = self.git_stdout(&["log", "-1", COMMIT_FORMAT]).await?;
        parse_commit_line(&line).ok_or_else(|| {
            GitError::Operation(format!("Unexpected git log output: {}", line))
        })
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    /// Runs a git command in the repository directory.
    async fn run_git(&self, args: &[&str]) -> Result<Output> {
        if !self.is_git_repo() {
            return Err(GitError::NotInitialized(self.repo_path.clone()));
        }
        run_git_in(Some(&self.repo_path), args, self.timeout).await
    }

    /// Runs a git command and maps a non-zero exit to a classified error.
    async fn git_checked(&self, args: &[&str]) -> Result<()> {
        let output = self.run_git(args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    /// Like [`Self::git_checked`], with a fixed committer identity.
    async fn git_checked_with_identity(&self, args: &[&str]) -> Result<()> {
        let full: Vec<&str> = MIRROR_IDENTITY.iter().chain(args).copied().collect();
        self.git_checked(&full).await
    }

    /// Runs a git command and returns its trimmed stdout.
    async fn git_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.run_git(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }
}

/// Runs `git` with `args`, optionally inside `dir`, bounded by `timeout`.
///
/// Prompts are disabled so a remote asking for credentials fails instead of
/// blocking. The child is killed when the timeout elapses.
async fn run_git_in(dir: Option<&Path>, args: &[&str], timeout: Duration) -> Result<Output> {
    let mut cmd = TokioCommand::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

    log::debug!(
        "git {}",
        args.iter()
            .map(|a| redact_repo_url(a))
            .collect::<Vec<_>>()
            .join(" ")
    );

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(output) => output.map_err(|e| GitError::Operation(e.to_string())),
        Err(_) => Err(GitError::Timeout(timeout.as_secs())),
    }
}
