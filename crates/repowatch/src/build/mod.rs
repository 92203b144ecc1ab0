//! Image builds.
//!
//! - `orchestrator`: build records, Dockerfile and auth checks, single-flight
//! - `builder`: the external build-and-push capability (Docker CLI)
//! - `auth`: registry readiness gate

pub mod auth;
pub mod builder;
pub mod error;
pub mod orchestrator;

pub use auth::{DockerConfigAuth, RegistryAuth, StaticAuth};
pub use builder::{DockerCli, ImageBuilder};
pub use error::{BuildError, Result};
pub use orchestrator::{image_reference, BuildOrchestrator};
