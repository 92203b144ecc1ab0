//! Per-repository single-flight locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// Held while a repository is being reconciled or built.
pub type RepoGuard = OwnedMutexGuard<()>;

/// Map of repository id to an async mutex, created on first use.
///
/// Guards are owned so they can move into a spawned build task and be
/// released when that task finishes.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("Repository lock map was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Returns `None` when the key is already held.
    pub fn try_lock(&self, key: &str) -> Option<RepoGuard> {
        self.entry(key).try_lock_owned().ok()
    }

    pub async fn lock(&self, key: &str) -> RepoGuard {
        self.entry(key).lock_owned().await
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.entry(key).try_lock().is_err()
    }
}
