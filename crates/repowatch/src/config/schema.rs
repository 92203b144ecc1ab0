use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::git::repository::DEFAULT_GIT_TIMEOUT_SECS;
use crate::git::ReconcileStrategy;
use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};

pub const DEFAULT_REGISTRY: &str = "registry.cn-hangzhou.aliyuncs.com";
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 5;
/// Upper bound for `pollInterval`: one week.
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REPOS_DIR: &str = "repos";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    #[serde(default)]
    pub repositories: Vec<RepositoryDescriptor>,
    /// Registry host images are pushed to.
    #[serde(default = "default_registry", alias = "aliyunRegistry")]
    pub registry: String,
    #[serde(default = "default_poll_interval", rename = "pollInterval")]
    pub poll_interval_minutes: u64,
    /// Directory holding one mirror per repository id.
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_git_timeout")]
    pub git_timeout_secs: u64,
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,
    #[serde(default)]
    pub tag_scheme: TagScheme,
    #[serde(default)]
    pub reconcile_strategy: ReconcileStrategy,
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MINUTES
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from(DEFAULT_REPOS_DIR)
}

fn default_git_timeout() -> u64 {
    DEFAULT_GIT_TIMEOUT_SECS
}

fn default_build_timeout() -> u64 {
    DEFAULT_BUILD_TIMEOUT_SECS
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            registry: default_registry(),
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            repos_dir: default_repos_dir(),
            retry: RetrySettings::default(),
            git_timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
            build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            tag_scheme: TagScheme::default(),
            reconcile_strategy: ReconcileStrategy::default(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes.saturating_mul(60))
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_secs(self.retry.retry_delay_secs),
        )
    }

    /// Looks up a repository by id.
    pub fn repository(&self, id: &str) -> Option<&RepositoryDescriptor> {
        self.repositories.iter().find(|r| r.id == id)
    }

    /// Repositories the monitor should check, in configuration order.
    pub fn enabled_repositories(&self) -> impl Iterator<Item = &RepositoryDescriptor> {
        self.repositories.iter().filter(|r| r.enabled)
    }

    /// Where the mirror for `repo` lives on disk.
    pub fn mirror_path(&self, repo: &RepositoryDescriptor) -> PathBuf {
        repo.mirror_path(&self.repos_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

/// How the tag part of an image reference is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagScheme {
    /// Milliseconds since the Unix epoch at build start.
    #[default]
    Timestamp,
    /// Always `latest`.
    Latest,
}

impl TagScheme {
    pub fn tag(&self, now: DateTime<Utc>) -> String {
        match self {
            TagScheme::Timestamp => now.timestamp_millis().to_string(),
            TagScheme::Latest => "latest".to_string(),
        }
    }
}

/// A tracked repository. Read-only to the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDescriptor {
    /// Unique id; also the mirror directory name.
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub git_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub registry_namespace: String,
    pub image_name: String,
    /// Relative to the checkout root.
    #[serde(default = "default_dockerfile")]
    pub dockerfile_path: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

impl RepositoryDescriptor {
    /// Name for log lines; falls back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn mirror_path(&self, repos_dir: &Path) -> PathBuf {
        repos_dir.join(&self.id)
    }
}
