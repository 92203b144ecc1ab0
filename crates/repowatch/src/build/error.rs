use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Dockerfile not found: {}", .0.display())]
    DockerfileMissing(PathBuf),

    #[error("Registry {0} is not authenticated")]
    AuthNotReady(String),

    #[error("{step} failed: {detail}")]
    Execution { step: &'static str, detail: String },

    #[error("{step} timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },

    #[error("A build for repository '{0}' is already in progress")]
    InProgress(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BuildError>;
