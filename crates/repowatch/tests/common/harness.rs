//! Test harness backed by real git repositories.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;

use repowatch::config::{save_config, WatchConfig};

/// Runs git in `dir` with a fixed identity, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    git_with_env(dir, args, &[])
}

fn git_with_env(dir: &Path, args: &[&str], env: &[(&str, String)]) -> String {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@test.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@test.com");
    for (key, value) in env {
        cmd.env(key, value);
    }

    let output = cmd.output().expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Isolated environment with a bare remote on `main` holding a Dockerfile.
pub struct TestHarness {
    temp_dir: TempDir,
    /// Bare repository standing in for the hosted remote.
    pub remote: PathBuf,
    /// Working clone used to push new commits.
    pub work: PathBuf,
    /// Directory the monitor keeps mirrors in.
    pub repos_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let remote = base.join("remote.git");
        let work = base.join("work");
        let repos_dir = base.join("repos");
        std::fs::create_dir_all(&remote).expect("Failed to create remote dir");
        std::fs::create_dir_all(&work).expect("Failed to create work dir");

        git(&remote, &["init", "--bare", "--initial-branch=main"]);
        git(&work, &["init", "--initial-branch=main"]);
        git(
            &work,
            &["remote", "add", "origin", remote.to_str().expect("utf-8 path")],
        );
        std::fs::write(work.join("Dockerfile"), "FROM scratch\n").expect("Failed to write");
        git(&work, &["add", "."]);
        git(&work, &["commit", "-m", "Initial commit"]);
        git(&work, &["push", "origin", "main"]);

        Self {
            temp_dir,
            remote,
            work,
            repos_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn remote_url(&self) -> String {
        self.remote.to_string_lossy().into_owned()
    }

    /// Commits `content` to `file` on `branch` and pushes it. The commit is
    /// dated slightly in the future so it is newer than any change the
    /// monitor has recorded so far.
    pub fn push_commit(&self, branch: &str, file: &str, content: &str, message: &str) -> String {
        let current = git(&self.work, &["rev-parse", "--abbrev-ref", "HEAD"]);
        if current != branch {
            let exists = Command::new("git")
                .current_dir(&self.work)
                .args(["rev-parse", "--verify", "--quiet", branch])
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false);
            if exists {
                git(&self.work, &["checkout", branch]);
            } else {
                git(&self.work, &["checkout", "-b", branch]);
            }
        }

        let date = format!("@{} +0000", unix_now() + 30);
        let env = [
            ("GIT_AUTHOR_DATE", date.clone()),
            ("GIT_COMMITTER_DATE", date),
        ];

        std::fs::write(self.work.join(file), content).expect("Failed to write");
        git(&self.work, &["add", "."]);
        git_with_env(&self.work, &["commit", "-m", message], &env);
        git(&self.work, &["push", "origin", branch]);

        git(&self.work, &["rev-parse", "HEAD"])
    }

    /// Tip of `branch` on the remote.
    pub fn remote_tip(&self, branch: &str) -> String {
        git(&self.remote, &["rev-parse", &format!("refs/heads/{}", branch)])
    }

    pub fn mirror_path(&self, id: &str) -> PathBuf {
        self.repos_dir.join(id)
    }

    pub fn mirror_head(&self, id: &str) -> String {
        git(&self.mirror_path(id), &["rev-parse", "HEAD"])
    }

    pub fn mirror_branch(&self, id: &str) -> String {
        git(&self.mirror_path(id), &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Writes `config` as `config.json` in the temp directory.
    pub fn write_config(&self, config: &WatchConfig) -> PathBuf {
        let path = self.temp_path().join("config.json");
        save_config(&path, config).expect("Failed to write config file");
        path
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
