//! Turns a build request into a build record and an external build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;

use super::auth::RegistryAuth;
use super::builder::ImageBuilder;
use super::error::{BuildError, Result};
use crate::config::{RepositoryDescriptor, WatchConfig};
use crate::lock::{KeyedLocks, RepoGuard};
use crate::sanitize::registry_host;
use crate::state::{BuildStatus, StateStore};

/// `registry/namespace/image:tag`
pub fn image_reference(registry: &str, repo: &RepositoryDescriptor, tag: &str) -> String {
    format!(
        "{}/{}/{}:{}",
        registry.trim_end_matches('/'),
        repo.registry_namespace,
        repo.image_name,
        tag
    )
}

pub struct BuildOrchestrator {
    builder: Arc<dyn ImageBuilder>,
    auth: Arc<dyn RegistryAuth>,
    state: Arc<StateStore>,
    locks: Arc<KeyedLocks>,
}

impl BuildOrchestrator {
    pub fn new(
        builder: Arc<dyn ImageBuilder>,
        auth: Arc<dyn RegistryAuth>,
        state: Arc<StateStore>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            builder,
            auth,
            state,
            locks,
        }
    }

    /// Builds `repo` from its current mirror and returns the pushed image.
    ///
    /// Fails with [`BuildError::InProgress`] if the repository is already
    /// being reconciled or built.
    pub async fn trigger(&self, repo: &RepositoryDescriptor, config: &WatchConfig) -> Result<String> {
        let guard = self
            .locks
            .try_lock(&repo.id)
            .ok_or_else(|| BuildError::InProgress(repo.id.clone()))?;

        self.build(guard, repo, config).await
    }

    /// Builds while holding `guard`, which is released when the build ends.
    pub async fn build(
        &self,
        guard: RepoGuard,
        repo: &RepositoryDescriptor,
        config: &WatchConfig,
    ) -> Result<String> {
        let span = tracing::info_span!("build", repo = %repo.id);
        let result = self.run(repo, config).instrument(span).await;
        drop(guard);
        result
    }

    async fn run(&self, repo: &RepositoryDescriptor, config: &WatchConfig) -> Result<String> {
        let image = image_reference(&config.registry, repo, &config.tag_scheme.tag(Utc::now()));

        // Recorded before anything external runs so an interrupted build
        // stays visible as `building`.
        let record_id = self.state.begin_build(&repo.id, &image);
        tracing::info!(image = %image, "Build started");

        match self.execute(repo, config, &image).await {
            Ok(()) => {
                self.state
                    .finish_build(&repo.id, record_id, BuildStatus::Success, None);
                tracing::info!(image = %image, "Build succeeded");
                Ok(image)
            }
            Err(e) => {
                self.state.finish_build(
                    &repo.id,
                    record_id,
                    BuildStatus::Failure,
                    Some(e.to_string()),
                );
                tracing::error!(image = %image, "Build failed: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        repo: &RepositoryDescriptor,
        config: &WatchConfig,
        image: &str,
    ) -> Result<()> {
        let mirror = absolute(&config.mirror_path(repo))?;
        let dockerfile = mirror.join(&repo.dockerfile_path);

        let is_file = tokio::fs::metadata(&dockerfile)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(BuildError::DockerfileMissing(dockerfile));
        }

        let host = registry_host(image);
        if !self.auth.is_ready(host).await {
            return Err(BuildError::AuthNotReady(host.to_string()));
        }

        self.builder.build_and_push(&mirror, &dockerfile, image).await
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| BuildError::Io {
        context: format!("Failed to resolve {}", path.display()),
        source: e,
    })
}
