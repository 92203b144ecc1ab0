use std::sync::{Arc, RwLock};

use crate::config::schema::WatchConfig;

/// Source of the current configuration.
///
/// The monitor takes a fresh snapshot at the start of every pass so edits
/// made through [`SharedConfig::replace`] are picked up without a restart.
pub trait ConfigProvider: Send + Sync {
    fn snapshot(&self) -> WatchConfig;
}

impl ConfigProvider for WatchConfig {
    fn snapshot(&self) -> WatchConfig {
        self.clone()
    }
}

/// Configuration shared between the daemon and the monitor.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<WatchConfig>>,
}

impl SharedConfig {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Swaps in a new configuration. Passes already running keep the
    /// snapshot they started with.
    pub fn replace(&self, config: WatchConfig) {
        let mut guard = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Config lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = config;
    }
}

impl ConfigProvider for SharedConfig {
    fn snapshot(&self) -> WatchConfig {
        let guard = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Config lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.clone()
    }
}
