//! Process-wide registry of in-flight backup runs.
//!
//! At most one run loop exists per storefront. Control calls are routed to
//! the active run's signal; a start or resume for a storefront that is
//! already running attaches to the existing run instead of spawning another.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::control::{PartialReason, ProgressFn, RunControl, RunOutcome};
use super::engine::BackupEngine;
use crate::model::LogLevel;

type DoneRx = watch::Receiver<Option<RunOutcome>>;

struct ActiveRun {
    run_id: u64,
    control: Arc<RunControl>,
    done: DoneRx,
}

type Registry = Arc<Mutex<HashMap<String, ActiveRun>>>;

/// Handle to a spawned (or joined) backup run
#[derive(Clone)]
pub struct RunHandle {
    storefront_id: String,
    done: DoneRx,
}

impl RunHandle {
    pub fn storefront_id(&self) -> &str {
        &self.storefront_id
    }

    /// Wait for the run to reach a terminal outcome
    pub async fn wait(mut self) -> RunOutcome {
        wait_done(&mut self.done).await
    }
}

async fn wait_done(done: &mut DoneRx) -> RunOutcome {
    match done.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or_else(aborted),
        Err(_) => aborted(),
    }
}

fn aborted() -> RunOutcome {
    RunOutcome::Partial(PartialReason::Unexpected(
        "backup task ended without an outcome".to_string(),
    ))
}

/// Removes the registry entry when the run task ends
struct RegistryGuard {
    registry: Registry,
    storefront_id: String,
    run_id: u64,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let mut runs = self.registry.lock();
        if runs.get(&self.storefront_id).map(|r| r.run_id) == Some(self.run_id) {
            runs.remove(&self.storefront_id);
        }
    }
}

/// Backup manager: start, pause, resume and cancel runs per storefront
pub struct BackupManager {
    engine: Arc<BackupEngine>,
    runs: Registry,
    next_run_id: AtomicU64,
}

impl BackupManager {
    pub fn new(engine: Arc<BackupEngine>) -> Self {
        Self {
            engine,
            runs: Arc::new(Mutex::new(HashMap::new())),
            next_run_id: AtomicU64::new(1),
        }
    }

    pub fn engine(&self) -> &Arc<BackupEngine> {
        &self.engine
    }

    /// Start a backup, continuing from a persisted cursor when one exists
    pub async fn start(&self, storefront_id: &str, progress: ProgressFn) -> RunHandle {
        self.launch(storefront_id, progress).await
    }

    /// Resume a paused or interrupted backup from its persisted cursor
    pub async fn resume(&self, storefront_id: &str, progress: ProgressFn) -> RunHandle {
        self.launch(storefront_id, progress).await
    }

    async fn launch(&self, storefront_id: &str, progress: ProgressFn) -> RunHandle {
        loop {
            let mut finishing = {
                let mut runs = self.runs.lock();
                match runs.get(storefront_id) {
                    Some(active) if active.control.signal().withdraw_pause() => {
                        active.control.replace_progress(progress.clone());
                        debug!(
                            "{}: attached to running backup (run {})",
                            storefront_id, active.run_id
                        );
                        return RunHandle {
                            storefront_id: storefront_id.to_string(),
                            done: active.done.clone(),
                        };
                    }
                    Some(active) => active.done.clone(),
                    None => return self.spawn_run(&mut runs, storefront_id, progress),
                }
            };

            // The active run is already stopping; start over once it is gone
            debug!("{}: waiting for stopping run to finish", storefront_id);
            wait_done(&mut finishing).await;
        }
    }

    fn spawn_run(
        &self,
        runs: &mut HashMap<String, ActiveRun>,
        storefront_id: &str,
        progress: ProgressFn,
    ) -> RunHandle {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let control = Arc::new(RunControl::new(progress));
        let (tx, rx) = watch::channel(None);

        runs.insert(
            storefront_id.to_string(),
            ActiveRun {
                run_id,
                control: control.clone(),
                done: rx.clone(),
            },
        );

        let engine = self.engine.clone();
        let guard = RegistryGuard {
            registry: self.runs.clone(),
            storefront_id: storefront_id.to_string(),
            run_id,
        };
        tokio::spawn(async move {
            let run = {
                let engine = engine.clone();
                let storefront_id = guard.storefront_id.clone();
                tokio::spawn(async move { engine.run(&storefront_id, &control).await })
            };
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) => engine.abandon(&guard.storefront_id, &e.to_string()).await,
            };
            debug!(
                "{}: run {} finished: {:?}",
                guard.storefront_id, guard.run_id, outcome
            );
            drop(guard);
            tx.send_replace(Some(outcome));
        });

        info!("{}: backup run {} started", storefront_id, run_id);
        RunHandle {
            storefront_id: storefront_id.to_string(),
            done: rx,
        }
    }

    /// Request a pause at the next page boundary. Returns `false` when no run
    /// is active for the storefront.
    pub fn pause(&self, storefront_id: &str) -> bool {
        match self.runs.lock().get(storefront_id) {
            Some(active) => {
                active.control.signal().request_pause();
                info!("{}: pause requested", storefront_id);
                true
            }
            None => false,
        }
    }

    /// Pause because connectivity was lost; resumed later by the offline
    /// retry scheduler or by recovery.
    ///
    /// An active run stops at the next page boundary. A run that already
    /// ended on the lost connection has its stored status set to paused.
    /// Returns `false` when there is neither a run nor a cursor.
    pub async fn pause_for_offline(&self, storefront_id: &str) -> bool {
        if !self.pause(storefront_id) {
            match self.engine.pause_resumable(storefront_id).await {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!("{}: failed to pause offline backup: {}", storefront_id, e);
                    return false;
                }
            }
        }
        self.engine
            .log(
                storefront_id,
                LogLevel::Warn,
                "Connection lost; backup will pause and resume once online",
                None,
            )
            .await;
        true
    }

    /// Cancel the storefront's backup.
    ///
    /// An active run is stopped at the next page boundary. A paused backup
    /// with no active run has its resumable state discarded directly.
    pub async fn cancel(&self, storefront_id: &str) -> bool {
        if let Some(active) = self.runs.lock().get(storefront_id) {
            active.control.signal().request_cancel();
            info!("{}: cancel requested", storefront_id);
            return true;
        }

        match self.engine.discard_resumable(storefront_id).await {
            Ok(discarded) => discarded,
            Err(e) => {
                warn!("{}: failed to cancel paused backup: {}", storefront_id, e);
                false
            }
        }
    }

    pub fn is_active(&self, storefront_id: &str) -> bool {
        self.runs.lock().contains_key(storefront_id)
    }

    /// Storefronts with a run in flight, sorted
    pub fn active_storefronts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}
