//! Mirror reconciler: clone or fetch, then force the branch to the remote tip.
//!
//! The mirror is synchronization state, never a workspace. Whatever the
//! strategy, a successful reconcile leaves the configured branch checked out
//! at `origin/<branch>` with no local changes left behind.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{GitError, Result};
use super::repository::GitRepository;
use super::types::{ReconcileOutcome, SyncMethod};
use crate::config::RepositoryDescriptor;
use crate::retry::RetryExecutor;
use crate::sanitize::redact_repo_url;

const STASH_MESSAGE: &str = "Auto-stash by repowatch";

/// How an existing mirror is brought in line with its remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileStrategy {
    /// Discard local changes, fetch, reset the branch to the remote tip.
    #[default]
    HardReset,
    /// Stash, switch branch if needed, fetch, then pull with rebase, pull
    /// with merge, and reset as the last resort. The stash is dropped.
    FallbackChain,
}

/// Brings a local mirror in line with its remote repository.
#[async_trait]
pub trait MirrorSync: Send + Sync {
    async fn sync(&self, repo: &RepositoryDescriptor, mirror: &Path) -> Result<ReconcileOutcome>;
}

/// Reconciles mirrors using the git CLI.
///
/// The whole reconcile is retried on transient errors. Each attempt looks at
/// what is on disk first, so an attempt after a successful clone continues
/// with a fetch instead of cloning again.
#[derive(Debug, Clone)]
pub struct GitReconciler {
    strategy: ReconcileStrategy,
    retry: RetryExecutor,
    git_timeout: Duration,
}

impl GitReconciler {
    /// Creates a new reconciler.
    pub fn new(strategy: ReconcileStrategy, retry: RetryExecutor, git_timeout: Duration) -> Self {
        Self {
            strategy,
            retry,
            git_timeout,
        }
    }

    pub fn strategy(&self) -> ReconcileStrategy {
        self.strategy
    }

    /// Reconciles `mirror` against `repo`, retrying transient failures.
    pub async fn reconcile(
        &self,
        repo: &RepositoryDescriptor,
        mirror: &Path,
    ) -> Result<ReconcileOutcome> {
        let outcome = self
            .retry
            .run_if(
                || self.reconcile_once(repo, mirror),
                GitError::is_retryable,
            )
            .await?;

        log::info!(
            "Mirror {} {} ({}) at {} on {}",
            repo.id,
            outcome.method,
            redact_repo_url(&repo.git_url),
            outcome.commit.short_hash(),
            outcome.branch
        );

        Ok(outcome)
    }

    async fn reconcile_once(
        &self,
        repo: &RepositoryDescriptor,
        mirror: &Path,
    ) -> Result<ReconcileOutcome> {
        let git = GitRepository::new(mirror, self.git_timeout);

        let method = if git.is_git_repo() {
            match self.strategy {
                ReconcileStrategy::HardReset => hard_reset(&git, &repo.branch).await?,
                ReconcileStrategy::FallbackChain => fallback_chain(&git, &repo.branch).await?,
            }
        } else {
            self.clone_mirror(repo, mirror).await?;
            SyncMethod::Cloned
        };

        let branch = git.current_branch().await?;
        let commit = git.latest_commit().await?;

        Ok(ReconcileOutcome {
            method,
            branch,
            commit,
        })
    }

    /// Clones a missing mirror and checks out the configured branch if it
    /// exists on the remote. A missing branch is not an error here: the mirror
    /// stays on the remote's default branch.
    async fn clone_mirror(&self, repo: &RepositoryDescriptor, mirror: &Path) -> Result<()> {
        if mirror.exists() {
            // Left over from an interrupted clone.
            log::warn!("Removing incomplete mirror at {}", mirror.display());
            tokio::fs::remove_dir_all(mirror)
                .await
                .map_err(|source| GitError::Io {
                    path: mirror.to_path_buf(),
                    source,
                })?;
        }

        let git = GitRepository::clone(&repo.git_url, mirror, self.git_timeout).await?;

        let current = git.current_branch().await?;
        if current != repo.branch {
            if git.remote_branch_exists(&repo.branch).await? {
                git.checkout_remote_branch(&repo.branch).await?;
                log::info!("Created and switched to tracking branch {}", repo.branch);
            } else {
                log::warn!(
                    "Branch '{}' does not exist on {}, staying on default branch '{}'",
                    repo.branch,
                    redact_repo_url(&repo.git_url),
                    current
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MirrorSync for GitReconciler {
    async fn sync(&self, repo: &RepositoryDescriptor, mirror: &Path) -> Result<ReconcileOutcome> {
        self.reconcile(repo, mirror).await
    }
}

/// Resolves `origin/<branch>` or fails with [`GitError::RemoteBranchMissing`].
async fn remote_tip(git: &GitRepository, branch: &str) -> Result<String> {
    git.rev_parse(&format!("refs/remotes/origin/{}", branch))
        .await?
        .ok_or_else(|| GitError::RemoteBranchMissing {
            branch: branch.to_string(),
        })
}

async fn hard_reset(git: &GitRepository, branch: &str) -> Result<SyncMethod> {
    git.discard_local_changes().await?;
    git.fetch().await?;

    let remote = remote_tip(git, branch).await?;
    let on_branch = git.current_branch().await? == branch;
    let local = git.rev_parse("HEAD").await?;

    git.checkout_remote_branch(branch).await?;

    if on_branch && local.as_deref() == Some(remote.as_str()) {
        Ok(SyncMethod::UpToDate)
    } else {
        Ok(SyncMethod::Reset)
    }
}

async fn fallback_chain(git: &GitRepository, branch: &str) -> Result<SyncMethod> {
    // An interrupted rebase or merge from an earlier run would block everything below.
    let _ = git.rebase_abort().await;
    let _ = git.merge_abort().await;

    let stashed = match git.stash(STASH_MESSAGE).await {
        Ok(stashed) => stashed,
        Err(e) => {
            log::debug!("Nothing stashed: {}", e);
            false
        }
    };

    git.fetch().await?;

    if git.current_branch().await? != branch {
        switch_branch(git, branch).await?;
    }

    let remote = remote_tip(git, branch).await?;
    let local = git.rev_parse("HEAD").await?;
    let remote_ref = format!("origin/{}", branch);

    let mut method = if local.as_deref() == Some(remote.as_str()) {
        SyncMethod::UpToDate
    } else {
        match git.pull_rebase(branch).await {
            Ok(()) => SyncMethod::Rebased,
            Err(e) => {
                log::info!("Rebase onto {} failed, trying merge: {}", remote_ref, e);
                match git.pull_merge(branch).await {
                    Ok(()) => SyncMethod::Merged,
                    Err(e) => {
                        log::info!("Merge of {} failed, resetting: {}", remote_ref, e);
                        git.reset_hard(&remote_ref).await?;
                        SyncMethod::Reset
                    }
                }
            }
        }
    };

    // Rebase and merge keep local commits; the mirror has to end at the remote tip.
    if git.rev_parse("HEAD").await?.as_deref() != Some(remote.as_str()) {
        git.reset_hard(&remote_ref).await?;
        method = SyncMethod::Reset;
    }

    if stashed {
        if let Err(e) = git.stash_drop().await {
            log::warn!("Failed to drop auto-stash: {}", e);
        }
    }

    // The stash skips ignored files, which would otherwise leak into the build context.
    git.discard_local_changes().await?;

    Ok(method)
}

/// Checks out `branch`, creating a tracking branch if only the remote has it.
async fn switch_branch(git: &GitRepository, branch: &str) -> Result<()> {
    let branches = git.list_branches().await?;

    if !branches.iter().any(|b| b.is_remote && b.name == branch) {
        return Err(GitError::RemoteBranchMissing {
            branch: branch.to_string(),
        });
    }

    if branches.iter().any(|b| !b.is_remote && b.name == branch) {
        git.checkout(branch).await?;
        log::info!("Switched to branch {}", branch);
    } else {
        git.checkout_remote_branch(branch).await?;
        log::info!("Created and switched to tracking branch {}", branch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::repository::test_support::{git, init_remote, push_commit};
    use crate::retry::RetryPolicy;
    use tempfile::TempDir;

    fn descriptor(remote: &Path, branch: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            id: "app".to_string(),
            name: "App".to_string(),
            git_url: remote.to_str().unwrap().to_string(),
            branch: branch.to_string(),
            enabled: true,
            registry_namespace: "team".to_string(),
            image_name: "app".to_string(),
            dockerfile_path: "Dockerfile".to_string(),
        }
    }

    fn reconciler(strategy: ReconcileStrategy) -> GitReconciler {
        GitReconciler::new(
            strategy,
            RetryExecutor::new(RetryPolicy::none()),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_missing_mirror_is_cloned() {
        let dir = TempDir::new().unwrap();
        let (remote, _work) = init_remote(dir.path());
        let mirror = dir.path().join("repos").join("app");

        let outcome = reconciler(ReconcileStrategy::HardReset)
            .reconcile(&descriptor(&remote, "main"), &mirror)
            .await
            .unwrap();

        assert_eq!(outcome.method, SyncMethod::Cloned);
        assert_eq!(outcome.branch, "main");
        assert_eq!(outcome.commit.subject, "Initial commit");
        assert!(mirror.join("Dockerfile").exists());
    }

    #[tokio::test]
    async fn test_clone_checks_out_non_default_branch() {
        let dir = TempDir::new().unwrap();
        let (remote, work) = init_remote(dir.path());
        git(&work, &["checkout", "-b", "develop"]);
        push_commit(&work, "develop", "dev.txt", "1", "Develop commit");

        let mirror = dir.path().join("mirror");
        let outcome = reconciler(ReconcileStrategy::HardReset)
            .reconcile(&descriptor(&remote, "develop"), &mirror)
            .await
            .unwrap();

        assert_eq!(outcome.branch, "develop");
        assert_eq!(outcome.commit.subject, "Develop commit");
    }

    #[tokio::test]
    async fn test_clone_with_missing_branch_stays_on_default() {
        let dir = TempDir::new().unwrap();
        let (remote, _work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");

        let outcome = reconciler(ReconcileStrategy::HardReset)
            .reconcile(&descriptor(&remote, "release"), &mirror)
            .await
            .unwrap();

        assert_eq!(outcome.method, SyncMethod::Cloned);
        assert_eq!(outcome.branch, "main");
    }

    #[tokio::test]
    async fn test_incomplete_mirror_directory_is_replaced() {
        let dir = TempDir::new().unwrap();
        let (remote, _work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");
        std::fs::create_dir_all(&mirror).unwrap();
        std::fs::write(mirror.join("partial"), "x").unwrap();

        let outcome = reconciler(ReconcileStrategy::HardReset)
            .reconcile(&descriptor(&remote, "main"), &mirror)
            .await
            .unwrap();

        assert_eq!(outcome.method, SyncMethod::Cloned);
        assert!(!mirror.join("partial").exists());
    }

    #[tokio::test]
    async fn test_up_to_date_mirror() {
        let dir = TempDir::new().unwrap();
        let (remote, _work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");
        let repo = descriptor(&remote, "main");
        let reconciler = reconciler(ReconcileStrategy::HardReset);

        let first = reconciler.reconcile(&repo, &mirror).await.unwrap();
        let second = reconciler.reconcile(&repo, &mirror).await.unwrap();

        assert_eq!(second.method, SyncMethod::UpToDate);
        assert_eq!(first.commit, second.commit);
    }

    #[tokio::test]
    async fn test_hard_reset_discards_local_state_and_follows_remote() {
        let dir = TempDir::new().unwrap();
        let (remote, work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");
        let repo = descriptor(&remote, "main");
        let reconciler = reconciler(ReconcileStrategy::HardReset);
        reconciler.reconcile(&repo, &mirror).await.unwrap();

        // Diverge: a local commit and dirty files on the mirror, a new commit upstream.
        std::fs::write(mirror.join("local.txt"), "local").unwrap();
        git(&mirror, &["add", "."]);
        git(&mirror, &["commit", "-m", "Local only"]);
        std::fs::write(mirror.join("Dockerfile"), "FROM busybox\n").unwrap();
        std::fs::write(mirror.join("untracked.txt"), "junk").unwrap();
        push_commit(&work, "main", "app.txt", "v2", "Upstream change");

        let outcome = reconciler.reconcile(&repo, &mirror).await.unwrap();

        assert_eq!(outcome.method, SyncMethod::Reset);
        assert_eq!(outcome.commit.subject, "Upstream change");
        assert_eq!(
            git(&mirror, &["rev-parse", "HEAD"]),
            git(&work, &["rev-parse", "HEAD"])
        );
        assert!(!mirror.join("local.txt").exists());
        assert!(!mirror.join("untracked.txt").exists());
        assert_eq!(
            std::fs::read_to_string(mirror.join("Dockerfile")).unwrap(),
            "FROM scratch\n"
        );
    }

    #[tokio::test]
    async fn test_hard_reset_switches_to_configured_branch() {
        let dir = TempDir::new().unwrap();
        let (remote, work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");
        let reconciler = reconciler(ReconcileStrategy::HardReset);
        reconciler
            .reconcile(&descriptor(&remote, "main"), &mirror)
            .await
            .unwrap();

        git(&work, &["checkout", "-b", "staging"]);
        push_commit(&work, "staging", "s.txt", "s", "Staging commit");

        let outcome = reconciler
            .reconcile(&descriptor(&remote, "staging"), &mirror)
            .await
            .unwrap();

        assert_eq!(outcome.method, SyncMethod::Reset);
        assert_eq!(outcome.branch, "staging");
        assert_eq!(outcome.commit.subject, "Staging commit");
    }

    #[tokio::test]
    async fn test_missing_remote_branch_on_existing_mirror_fails() {
        let dir = TempDir::new().unwrap();
        let (remote, _work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");

        // Retries configured, but a missing branch is permanent.
        let reconciler = GitReconciler::new(
            ReconcileStrategy::HardReset,
            RetryExecutor::new(RetryPolicy::new(3, Duration::from_secs(3600))),
            Duration::from_secs(30),
        );
        reconciler
            .reconcile(&descriptor(&remote, "main"), &mirror)
            .await
            .unwrap();

        let err = reconciler
            .reconcile(&descriptor(&remote, "release"), &mirror)
            .await
            .unwrap_err();

        assert!(matches!(err, GitError::RemoteBranchMissing { ref branch } if branch == "release"));
    }

    #[tokio::test]
    async fn test_fallback_chain_ends_at_remote_tip() {
        let dir = TempDir::new().unwrap();
        let (remote, work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");
        let repo = descriptor(&remote, "main");
        let reconciler = reconciler(ReconcileStrategy::FallbackChain);
        push_commit(&work, "main", ".gitignore", "*.env\n", "Ignore env files");
        reconciler.reconcile(&repo, &mirror).await.unwrap();

        std::fs::write(mirror.join("local.txt"), "local").unwrap();
        git(&mirror, &["add", "."]);
        git(&mirror, &["commit", "-m", "Local only"]);
        std::fs::write(mirror.join("scratch.txt"), "dirty").unwrap();
        std::fs::write(mirror.join("stale.env"), "SECRET=1").unwrap();
        push_commit(&work, "main", "app.txt", "v2", "Upstream change");

        let outcome = reconciler.reconcile(&repo, &mirror).await.unwrap();

        assert_eq!(outcome.commit.subject, "Upstream change");
        assert_eq!(
            git(&mirror, &["rev-parse", "HEAD"]),
            git(&work, &["rev-parse", "HEAD"])
        );
        assert!(!mirror.join("local.txt").exists());
        assert!(!mirror.join("scratch.txt").exists());
        assert!(!mirror.join("stale.env").exists());
        // The auto-stash does not survive either.
        assert!(git(&mirror, &["stash", "list"]).is_empty());
    }

    #[tokio::test]
    async fn test_fallback_chain_fast_forwards_behind_mirror() {
        let dir = TempDir::new().unwrap();
        let (remote, work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");
        let repo = descriptor(&remote, "main");
        let reconciler = reconciler(ReconcileStrategy::FallbackChain);
        reconciler.reconcile(&repo, &mirror).await.unwrap();

        push_commit(&work, "main", "app.txt", "v2", "Upstream change");

        let outcome = reconciler.reconcile(&repo, &mirror).await.unwrap();
        assert_eq!(outcome.method, SyncMethod::Rebased);
        assert_eq!(outcome.commit.subject, "Upstream change");
    }

    #[tokio::test]
    async fn test_fallback_chain_creates_tracking_branch() {
        let dir = TempDir::new().unwrap();
        let (remote, work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");
        let reconciler = reconciler(ReconcileStrategy::FallbackChain);
        reconciler
            .reconcile(&descriptor(&remote, "main"), &mirror)
            .await
            .unwrap();

        git(&work, &["checkout", "-b", "feature"]);
        push_commit(&work, "feature", "f.txt", "f", "Feature commit");

        let outcome = reconciler
            .reconcile(&descriptor(&remote, "feature"), &mirror)
            .await
            .unwrap();

        assert_eq!(outcome.branch, "feature");
        assert_eq!(outcome.commit.subject, "Feature commit");
    }

    #[tokio::test]
    async fn test_fallback_chain_missing_remote_branch_fails() {
        let dir = TempDir::new().unwrap();
        let (remote, _work) = init_remote(dir.path());
        let mirror = dir.path().join("mirror");
        let reconciler = reconciler(ReconcileStrategy::FallbackChain);
        reconciler
            .reconcile(&descriptor(&remote, "main"), &mirror)
            .await
            .unwrap();

        let err = reconciler
            .reconcile(&descriptor(&remote, "gone"), &mirror)
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::RemoteBranchMissing { .. }));
    }

    #[test]
    fn test_strategy_serialization() {
        assert_eq!(
            serde_json::to_string(&ReconcileStrategy::FallbackChain).unwrap(),
            "\"fallbackChain\""
        );
        let parsed: ReconcileStrategy = serde_json::from_str("\"hardReset\"").unwrap();
        assert_eq!(parsed, ReconcileStrategy::HardReset);
    }
}
