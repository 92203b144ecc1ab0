use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::build::BuildError;
use crate::state::RepositoryState;

/// Point-in-time view of the monitor for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub monitoring: bool,
    /// Start of the most recent pass.
    pub last_check: Option<DateTime<Utc>>,
    pub repositories: HashMap<String, RepositoryState>,
}

/// What one pass over the enabled repositories did.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Repositories that were reconciled, successfully or not.
    pub checked: Vec<String>,
    /// Repositories skipped because a build held their lock.
    pub skipped: Vec<String>,
    /// Repositories whose reconciliation failed.
    pub failed: Vec<String>,
    /// Builds started by this pass. They run detached; awaiting the
    /// handles is optional.
    pub builds: Vec<(String, JoinHandle<Result<String, BuildError>>)>,
}

impl PassReport {
    /// Waits for every build started by the pass.
    pub async fn join_builds(self) -> Vec<(String, Result<String, BuildError>)> {
        let mut results = Vec::with_capacity(self.builds.len());
        for (id, handle) in self.builds {
            match handle.await {
                Ok(result) => results.push((id, result)),
                Err(e) => tracing::error!(repo = %id, "Build task failed: {}", e),
            }
        }
        results
    }
}
