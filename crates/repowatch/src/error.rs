use std::path::PathBuf;
use thiserror::Error;

use crate::build::BuildError;
use crate::git::GitError;

#[derive(Error, Debug)]
pub enum RepowatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Duplicate repository id '{0}'")]
    DuplicateRepository(String),

    #[error("Invalid repository '{id}': {reason}")]
    InvalidRepository { id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor is already running")]
    AlreadyRunning,

    #[error("Monitor is not running")]
    NotRunning,

    #[error("No repositories configured")]
    NoRepositories,

    #[error("Poll interval must be between 1 and {max} minutes, got {minutes}")]
    InvalidPollInterval { minutes: u64, max: u64 },

    #[error("Repository not found: {0}")]
    UnknownRepository(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Git(#[from] GitError),
}

pub type Result<T> = std::result::Result<T, RepowatchError>;
