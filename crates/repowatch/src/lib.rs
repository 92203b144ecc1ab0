pub mod build;
pub mod config;
pub mod error;
pub mod git;
pub mod lock;
pub mod monitor;
pub mod retry;
pub mod sanitize;
pub mod state;

pub use build::{
    BuildError, BuildOrchestrator, DockerCli, DockerConfigAuth, ImageBuilder, RegistryAuth,
    StaticAuth,
};
pub use config::{
    load_config, save_config, ConfigProvider, RepositoryDescriptor, SharedConfig, WatchConfig,
};
pub use error::{ConfigError, MonitorError, RepowatchError, Result};
pub use git::{GitError, GitReconciler, MirrorSync, ReconcileStrategy};
pub use monitor::{Monitor, PassReport, StatusSnapshot};
pub use retry::{RetryExecutor, RetryPolicy};
pub use state::{BuildRecord, BuildStatus, RepositoryState, StateStore};
