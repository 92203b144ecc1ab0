pub mod loader;
pub mod provider;
pub mod schema;

pub use loader::{load_config, load_config_from_str, save_config, validate_config};
pub use provider::{ConfigProvider, SharedConfig};
pub use schema::{
    RepositoryDescriptor, RetrySettings, TagScheme, WatchConfig, MAX_POLL_INTERVAL_MINUTES,
};
