use std::collections::HashSet;
use std::path::{Component, Path};

use crate::config::schema::{RepositoryDescriptor, WatchConfig, MAX_POLL_INTERVAL_MINUTES};
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<WatchConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<WatchConfig, ConfigError> {
    let config: WatchConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Writes `config` as pretty JSON. The file is replaced atomically so a
/// crash mid-write never leaves a truncated config behind.
pub fn save_config<P: AsRef<Path>>(path: P, config: &WatchConfig) -> Result<(), ConfigError> {
    let path = path.as_ref();
    validate_config(config)?;

    let json = serde_json::to_string_pretty(config)?;
    let tmp_path = path.with_extension("json.tmp");
    let write_err = |e| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };

    std::fs::write(&tmp_path, json).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)?;

    log::info!("Saved configuration to {}", path.display());
    Ok(())
}

pub fn validate_config(config: &WatchConfig) -> Result<(), ConfigError> {
    if !(1..=MAX_POLL_INTERVAL_MINUTES).contains(&config.poll_interval_minutes) {
        return Err(ConfigError::Validation {
            message: format!(
                "pollInterval must be between 1 and {} minutes",
                MAX_POLL_INTERVAL_MINUTES
            ),
        });
    }

    if config.registry.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "registry must not be empty".to_string(),
        });
    }

    let mut ids = HashSet::new();
    for repo in &config.repositories {
        validate_repository(repo)?;
        if !ids.insert(repo.id.as_str()) {
            return Err(ConfigError::DuplicateRepository(repo.id.clone()));
        }
    }

    Ok(())
}

fn validate_repository(repo: &RepositoryDescriptor) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidRepository {
        id: repo.id.clone(),
        reason: reason.to_string(),
    };

    // The id names the mirror directory, so it must be a single plain path component.
    let mut components = Path::new(&repo.id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(invalid("id must be a non-empty single path component")),
    }
    if repo.id.contains(['/', '\\']) {
        return Err(invalid("id must not contain path separators"));
    }

    if repo.git_url.trim().is_empty() {
        return Err(invalid("gitUrl must not be empty"));
    }
    if repo.git_url.trim_start().starts_with('-') {
        return Err(invalid("gitUrl must not start with '-'"));
    }
    if repo.branch.trim().is_empty() {
        return Err(invalid("branch must not be empty"));
    }
    if repo.registry_namespace.trim().is_empty() {
        return Err(invalid("registryNamespace must not be empty"));
    }
    if repo.image_name.trim().is_empty() {
        return Err(invalid("imageName must not be empty"));
    }

    let dockerfile = Path::new(&repo.dockerfile_path);
    if repo.dockerfile_path.is_empty()
        || !dockerfile
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(invalid(
            "dockerfilePath must be a relative path inside the repository",
        ));
    }

    Ok(())
}
