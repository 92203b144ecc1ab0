//! Per-repository runtime state.
//!
//! The [`StateStore`] is the only owner of [`RepositoryState`] values. The
//! monitor and the build orchestrator mutate it through the methods below;
//! status readers get cloned snapshots and never hold the lock across an
//! await point.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::git::CommitInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Building,
    Success,
    Failure,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Building)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Building => write!(f, "building"),
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Failure => write!(f, "failure"),
        }
    }
}

/// One attempted build and push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    /// Creation time in milliseconds, unique within one repository.
    pub id: i64,
    pub date: DateTime<Utc>,
    pub status: BuildStatus,
    /// Full image reference, `registry/namespace/image:tag`.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryState {
    pub last_check: Option<DateTime<Utc>>,
    pub last_change: Option<DateTime<Utc>>,
    pub last_build: Option<DateTime<Utc>>,
    /// Newest first.
    pub build_history: VecDeque<BuildRecord>,
    pub last_error: Option<String>,
    pub last_commit: Option<CommitInfo>,
}

impl RepositoryState {
    /// The `n` most recent builds, newest first.
    pub fn recent_builds(&self, n: usize) -> impl Iterator<Item = &BuildRecord> {
        self.build_history.iter().take(n)
    }

    pub fn current_build(&self) -> Option<&BuildRecord> {
        self.build_history
            .iter()
            .find(|r| r.status == BuildStatus::Building)
    }

    /// Whether `commit` counts as new work.
    ///
    /// The first observation always does. After that the commit must be
    /// newer than the last recorded change and differ from the last tip,
    /// so a future-dated commit does not retrigger every pass.
    fn is_new_commit(&self, commit: &CommitInfo) -> bool {
        let Some(last_change) = self.last_change else {
            return true;
        };
        let same_tip = self
            .last_commit
            .as_ref()
            .is_some_and(|c| c.hash == commit.hash);

        commit.timestamp > last_change && !same_tip
    }
}

#[derive(Debug, Default)]
struct Inner {
    repositories: HashMap<String, RepositoryState>,
    last_pass: Option<DateTime<Utc>>,
}

/// Thread-safe map of repository id to [`RepositoryState`].
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<Inner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("State store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("State store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Stamps the start of a monitor pass.
    pub fn mark_pass(&self) -> DateTime<Utc> {
        let now = Utc::now();
        self.write().last_pass = Some(now);
        now
    }

    pub fn last_pass(&self) -> Option<DateTime<Utc>> {
        self.read().last_pass
    }

    /// Marks the start of a reconciliation attempt: stamps `lastCheck` and
    /// clears `lastError`. Creates the state on first use.
    pub fn begin_check(&self, id: &str) {
        let mut inner = self.write();
        let state = inner.repositories.entry(id.to_string()).or_default();
        state.last_check = Some(Utc::now());
        state.last_error = None;
    }

    pub fn record_error(&self, id: &str, message: impl Into<String>) {
        let mut inner = self.write();
        let state = inner.repositories.entry(id.to_string()).or_default();
        state.last_error = Some(message.into());
    }

    /// Records the reconciled tip and returns whether it is new work.
    /// On a change `lastChange` advances to the current time.
    pub fn observe_commit(&self, id: &str, commit: &CommitInfo) -> bool {
        let mut inner = self.write();
        let state = inner.repositories.entry(id.to_string()).or_default();

        let changed = state.is_new_commit(commit);
        if changed {
            let now = Utc::now();
            state.last_change = Some(match state.last_change {
                Some(prev) if prev > now => prev,
                _ => now,
            });
        }
        state.last_commit = Some(commit.clone());
        changed
    }

    /// Prepends a `building` record, stamps `lastBuild` and returns the
    /// record id.
    pub fn begin_build(&self, id: &str, image: &str) -> i64 {
        let mut inner = self.write();
        let state = inner.repositories.entry(id.to_string()).or_default();

        let now = Utc::now();
        let mut record_id = now.timestamp_millis();
        if let Some(newest) = state.build_history.front() {
            record_id = record_id.max(newest.id + 1);
        }

        state.build_history.push_front(BuildRecord {
            id: record_id,
            date: now,
            status: BuildStatus::Building,
            image: image.to_string(),
            error: None,
            finished_at: None,
        });
        state.last_build = Some(now);
        record_id
    }

    /// Moves a `building` record to its terminal status. Records that are
    /// already terminal are left untouched; returns whether a transition
    /// happened.
    pub fn finish_build(
        &self,
        id: &str,
        record_id: i64,
        status: BuildStatus,
        error: Option<String>,
    ) -> bool {
        if !status.is_terminal() {
            return false;
        }

        let mut inner = self.write();
        let Some(record) = inner
            .repositories
            .get_mut(id)
            .and_then(|s| s.build_history.iter_mut().find(|r| r.id == record_id))
        else {
            return false;
        };

        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        record.error = error;
        record.finished_at = Some(Utc::now());
        true
    }

    pub fn get(&self, id: &str) -> Option<RepositoryState> {
        self.read().repositories.get(id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, RepositoryState> {
        self.read().repositories.clone()
    }
}
