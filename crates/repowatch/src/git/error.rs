//! Git-specific error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while operating on a mirror.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git operation failed: {0}")]
    Operation(String),

    #[error("Git network error: {0}")]
    Network(String),

    #[error("Git operation timed out after {0}s")]
    Timeout(u64),

    #[error("Git repository is locked: {0}")]
    Locked(String),

    #[error("Git authentication failed: {0}")]
    AuthFailed(String),

    #[error("Remote branch '{branch}' does not exist")]
    RemoteBranchMissing { branch: String },

    #[error("Git repository not initialized at '{0}'")]
    NotInitialized(PathBuf),

    #[error("Repository has no commits")]
    NoCommits,

    #[error("Failed to prepare mirror directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GitError {
    /// Returns false for failures that will not go away by trying again.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GitError::RemoteBranchMissing { .. }
                | GitError::AuthFailed(_)
                | GitError::NotInitialized(_)
                | GitError::NoCommits
        )
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> GitError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
        || lower.contains("early eof")
    {
        return GitError::Network(stderr.trim().to_string());
    }

    if lower.contains("index.lock") || lower.contains("unable to create") && lower.contains(".lock")
    {
        return GitError::Locked(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
    {
        return GitError::AuthFailed(stderr.trim().to_string());
    }

    GitError::Operation(stderr.trim().to_string())
}

/// Result type for git operations.
pub type Result<T> = std::result::Result<T, GitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network_errors() {
        let err = classify_git_error("fatal: unable to access 'https://x/': Could not resolve host: x");
        assert!(matches!(err, GitError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_lock_errors() {
        let err = classify_git_error(
            "fatal: Unable to create '/tmp/m/.git/index.lock': File exists.",
        );
        assert!(matches!(err, GitError::Locked(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth_errors_are_permanent() {
        let err = classify_git_error("remote: HTTP Basic: Access denied\nfatal: Authentication failed for 'https://x/'");
        assert!(matches!(err, GitError::AuthFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_falls_back_to_operation() {
        let err = classify_git_error("  error: pathspec 'nope' did not match  ");
        match err {
            GitError::Operation(msg) => assert_eq!(msg, "error: pathspec 'nope' did not match"),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_missing_branch_is_not_retryable() {
        let err = GitError::RemoteBranchMissing {
            branch: "release".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Remote branch 'release' does not exist");
    }
}
