//! Registry authentication gate.
//!
//! Logging in is out of scope. The gate only answers whether a push to a
//! registry host can be expected to authenticate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait RegistryAuth: Send + Sync {
    async fn is_ready(&self, registry: &str) -> bool;
}

/// Fixed answer, for `--no-auth-check` and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticAuth(pub bool);

#[async_trait]
impl RegistryAuth for StaticAuth {
    async fn is_ready(&self, _registry: &str) -> bool {
        self.0
    }
}

/// Reads the Docker client configuration to see whether the registry host
/// has stored credentials.
#[derive(Debug, Clone)]
pub struct DockerConfigAuth {
    config_path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerClientConfig {
    #[serde(default)]
    auths: HashMap<String, serde_json::Value>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

impl DockerConfigAuth {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// `$DOCKER_CONFIG/config.json`, or `~/.docker/config.json`.
    pub fn from_env() -> Self {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));
        Self::new(dir.join("config.json"))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn read_config(&self) -> Option<DockerClientConfig> {
        let content = match tokio::fs::read_to_string(&self.config_path).await {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(
                    path = %self.config_path.display(),
                    "Docker config not readable: {}",
                    e
                );
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(
                    path = %self.config_path.display(),
                    "Docker config is not valid JSON: {}",
                    e
                );
                None
            }
        }
    }
}

/// Reduces an `auths` key to a bare host. Keys may carry a scheme and a
/// path, e.g. `https://index.docker.io/v1/`.
fn normalize_host(key: &str) -> &str {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    let host = key.split('/').next().unwrap_or(key);
    match host {
        "index.docker.io" | "registry-1.docker.io" => "docker.io",
        other => other,
    }
}

#[async_trait]
impl RegistryAuth for DockerConfigAuth {
    async fn is_ready(&self, registry: &str) -> bool {
        let Some(config) = self.read_config().await else {
            return false;
        };
        let registry = normalize_host(registry);

        config.cred_helpers.keys().any(|k| normalize_host(k) == registry)
            || config.auths.keys().any(|k| normalize_host(k) == registry)
    }
}
