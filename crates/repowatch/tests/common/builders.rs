//! Builders and fakes for creating test data programmatically.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use repowatch::build::{ImageBuilder, Result as BuildResult};
use repowatch::config::{RepositoryDescriptor, RetrySettings, WatchConfig};
use repowatch::git::{GitReconciler, ReconcileStrategy};
use repowatch::retry::{RetryExecutor, RetryPolicy};

/// Builder for `RepositoryDescriptor` values.
pub struct RepositoryBuilder {
    repo: RepositoryDescriptor,
}

impl RepositoryBuilder {
    pub fn new(id: &str, git_url: &str) -> Self {
        Self {
            repo: RepositoryDescriptor {
                id: id.to_string(),
                name: format!("Repository {}", id),
                git_url: git_url.to_string(),
                branch: "main".to_string(),
                enabled: true,
                registry_namespace: "team".to_string(),
                image_name: id.to_string(),
                dockerfile_path: "Dockerfile".to_string(),
            },
        }
    }

    pub fn branch(mut self, branch: &str) -> Self {
        self.repo.branch = branch.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.repo.enabled = false;
        self
    }

    pub fn image(mut self, namespace: &str, image: &str) -> Self {
        self.repo.registry_namespace = namespace.to_string();
        self.repo.image_name = image.to_string();
        self
    }

    pub fn dockerfile(mut self, path: &str) -> Self {
        self.repo.dockerfile_path = path.to_string();
        self
    }

    pub fn build(self) -> RepositoryDescriptor {
        self.repo
    }
}

/// Builder for `WatchConfig` values rooted at a mirrors directory.
pub struct ConfigBuilder {
    config: WatchConfig,
}

impl ConfigBuilder {
    pub fn new(repos_dir: &Path) -> Self {
        Self {
            config: WatchConfig {
                registry: "registry.example.com".to_string(),
                repos_dir: repos_dir.to_path_buf(),
                retry: RetrySettings {
                    max_retries: 0,
                    retry_delay_secs: 0,
                },
                ..WatchConfig::default()
            },
        }
    }

    pub fn repository(mut self, repo: RepositoryDescriptor) -> Self {
        self.config.repositories.push(repo);
        self
    }

    pub fn strategy(mut self, strategy: ReconcileStrategy) -> Self {
        self.config.reconcile_strategy = strategy;
        self
    }

    pub fn build(self) -> WatchConfig {
        self.config
    }
}

/// A reconciler without retry delays.
pub fn reconciler(strategy: ReconcileStrategy) -> GitReconciler {
    GitReconciler::new(
        strategy,
        RetryExecutor::new(RetryPolicy::none()),
        Duration::from_secs(30),
    )
}

/// Image builder that records its invocations. With `hold`, each build
/// waits for a permit before finishing.
#[derive(Default)]
pub struct RecordingBuilder {
    calls: Mutex<Vec<(PathBuf, PathBuf, String)>>,
    hold: Option<Arc<Semaphore>>,
    pub started: Notify,
}

impl RecordingBuilder {
    pub fn holding(hold: Arc<Semaphore>) -> Self {
        Self {
            hold: Some(hold),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBuilder for RecordingBuilder {
    async fn build_and_push(
        &self,
        context: &Path,
        dockerfile: &Path,
        image: &str,
    ) -> BuildResult<()> {
        self.calls.lock().unwrap().push((
            context.to_path_buf(),
            dockerfile.to_path_buf(),
            image.to_string(),
        ));
        self.started.notify_one();
        if let Some(hold) = &self.hold {
            let _permit = hold.acquire().await.unwrap();
        }
        Ok(())
    }
}
