//! Periodic repository monitor.
//!
//! One background task runs a pass immediately on start and then once per
//! poll interval. A pass walks the enabled repositories in order; each one
//! is reconciled under its repository lock, and a new tip hands the lock
//! to a detached build task so neither the next repository nor `stop()`
//! waits for the build.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use super::status::{PassReport, StatusSnapshot};
use crate::build::{BuildOrchestrator, DockerCli, ImageBuilder, RegistryAuth};
use crate::config::{
    ConfigProvider, RepositoryDescriptor, WatchConfig, MAX_POLL_INTERVAL_MINUTES,
};
use crate::error::MonitorError;
use crate::git::{GitReconciler, GitRepository, MirrorSync};
use crate::lock::KeyedLocks;
use crate::retry::RetryExecutor;
use crate::state::{RepositoryState, StateStore};

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    // Dropping the handle detaches the task; a pass in flight at stop
    // time runs to completion.
    _handle: JoinHandle<()>,
}

struct MonitorInner {
    config: Arc<dyn ConfigProvider>,
    sync: Arc<dyn MirrorSync>,
    orchestrator: Arc<BuildOrchestrator>,
    state: Arc<StateStore>,
    locks: Arc<KeyedLocks>,
}

pub struct Monitor {
    inner: Arc<MonitorInner>,
    running: Mutex<Option<RunningLoop>>,
}

impl Monitor {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        sync: Arc<dyn MirrorSync>,
        builder: Arc<dyn ImageBuilder>,
        auth: Arc<dyn RegistryAuth>,
    ) -> Self {
        let state = Arc::new(StateStore::new());
        let locks = Arc::new(KeyedLocks::new());
        let orchestrator = Arc::new(BuildOrchestrator::new(
            builder,
            auth,
            Arc::clone(&state),
            Arc::clone(&locks),
        ));

        Self {
            inner: Arc::new(MonitorInner {
                config,
                sync,
                orchestrator,
                state,
                locks,
            }),
            running: Mutex::new(None),
        }
    }

    /// Wires the git CLI reconciler and the Docker CLI builder.
    ///
    /// Retry policy, timeouts and reconcile strategy are read once here;
    /// repositories, registry and tag scheme are re-read on every pass.
    pub fn with_defaults(config: Arc<dyn ConfigProvider>, auth: Arc<dyn RegistryAuth>) -> Self {
        let snapshot = config.snapshot();
        let reconciler = GitReconciler::new(
            snapshot.reconcile_strategy,
            RetryExecutor::new(snapshot.retry_policy()),
            snapshot.git_timeout(),
        );
        let builder = DockerCli::new(snapshot.build_timeout());

        Self::new(config, Arc::new(reconciler), Arc::new(builder), auth)
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        match self.running.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("Monitor lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Starts the polling loop. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut running = self.running();
        if running.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let config = self.inner.config.snapshot();
        if config.repositories.is_empty() {
            return Err(MonitorError::NoRepositories);
        }

        // Provider snapshots may bypass `validate_config`.
        let minutes = config.poll_interval_minutes;
        if !(1..=MAX_POLL_INTERVAL_MINUTES).contains(&minutes) {
            return Err(MonitorError::InvalidPollInterval {
                minutes,
                max: MAX_POLL_INTERVAL_MINUTES,
            });
        }

        let period = config.poll_interval();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), period, shutdown_rx));

        *running = Some(RunningLoop {
            shutdown,
            _handle: handle,
        });
        tracing::info!(
            interval_secs = period.as_secs(),
            repositories = config.repositories.len(),
            "Monitor started"
        );
        Ok(())
    }

    /// Stops future passes. Reconciliations and builds already running
    /// are left to finish.
    pub fn stop(&self) -> Result<(), MonitorError> {
        let running = self.running().take().ok_or(MonitorError::NotRunning)?;
        let _ = running.shutdown.send(true);
        tracing::info!("Monitor stopped");
        Ok(())
    }

    /// Runs one pass over the enabled repositories.
    pub async fn check_all_repositories(&self) -> PassReport {
        self.inner.check_all_repositories().await
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            monitoring: self.is_running(),
            last_check: self.inner.state.last_pass(),
            repositories: self.inner.state.snapshot(),
        }
    }

    pub fn repository_state(&self, id: &str) -> Option<RepositoryState> {
        self.inner.state.get(id)
    }

    /// Builds a repository from its current mirror, skipping change
    /// detection. Disabled repositories can still be built this way.
    pub async fn trigger_build(&self, id: &str) -> Result<String, MonitorError> {
        let config = self.inner.config.snapshot();
        let repo = lookup(&config, id)?;
        tracing::info!(repo = %repo.id, "Manual build requested");

        Ok(self.inner.orchestrator.trigger(repo, &config).await?)
    }

    /// Checks that the repository's remote answers, returning a few refs.
    pub async fn test_connection(&self, id: &str) -> Result<Vec<String>, MonitorError> {
        let config = self.inner.config.snapshot();
        let repo = lookup(&config, id)?;

        Ok(GitRepository::ls_remote(&repo.git_url).await?)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(running) = self.running().take() {
            let _ = running.shutdown.send(true);
        }
    }
}

fn lookup<'a>(config: &'a WatchConfig, id: &str) -> Result<&'a RepositoryDescriptor, MonitorError> {
    config
        .repository(id)
        .ok_or_else(|| MonitorError::UnknownRepository(id.to_string()))
}

async fn run_loop(inner: Arc<MonitorInner>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                inner.check_all_repositories().await;
            }
        }
    }

    tracing::debug!("Monitor loop exited");
}

impl MonitorInner {
    async fn check_all_repositories(&self) -> PassReport {
        let config = self.config.snapshot();
        self.state.mark_pass();
        tracing::info!("Checking all repositories");

        let mut report = PassReport::default();
        for repo in config.enabled_repositories() {
            let span = tracing::info_span!("check", repo = %repo.id);
            self.check_repository(repo, &config, &mut report)
                .instrument(span)
                .await;
        }

        tracing::info!(
            checked = report.checked.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            builds = report.builds.len(),
            "Pass finished"
        );
        report
    }

    async fn check_repository(
        &self,
        repo: &RepositoryDescriptor,
        config: &WatchConfig,
        report: &mut PassReport,
    ) {
        let Some(guard) = self.locks.try_lock(&repo.id) else {
            tracing::info!("Build in progress, skipping check");
            report.skipped.push(repo.id.clone());
            return;
        };

        self.state.begin_check(&repo.id);
        report.checked.push(repo.id.clone());

        let mirror = config.mirror_path(repo);
        let outcome = match self.sync.sync(repo, &mirror).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Failed to check {}: {}", repo.display_name(), e);
                self.state.record_error(
                    &repo.id,
                    format!("Failed to check {}: {}", repo.display_name(), e),
                );
                report.failed.push(repo.id.clone());
                return;
            }
        };

        if !self.state.observe_commit(&repo.id, &outcome.commit) {
            tracing::debug!(commit = outcome.commit.short_hash(), "No new commits");
            return;
        }

        tracing::info!(
            commit = outcome.commit.short_hash(),
            subject = %outcome.commit.subject,
            "New commit detected, triggering build"
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let repo = repo.clone();
        let config = config.clone();
        let id = repo.id.clone();
        let handle = tokio::spawn(async move { orchestrator.build(guard, &repo, &config).await });
        report.builds.push((id, handle));
    }
}
