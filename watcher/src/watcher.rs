//! Poll loop
//!
//! Each cycle:
//! 1. Re-read settings (edits apply without restart)
//! 2. Fetch workers and pool stats
//! 3. Evaluate every worker against its stored record, alerting on new highs
//! 4. Persist records when anything changed
//! 5. Sleep for the poll interval
//!
//! Errors end the current cycle only; the loop runs until shutdown.

use crate::config::{EffectiveSettings, SettingsProvider};
use crate::notifier::{AthAlert, Notifier};
use crate::pool::{PoolSnapshot, PoolSource, WorkerSnapshot};
use crate::store::StateStore;
use crate::tracker::{Decision, RecordTracker};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Wait between checks while no webhook is configured
pub const UNCONFIGURED_BACKOFF: Duration = Duration::from_secs(30);

/// Counters for one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub workers: usize,
    pub first_seen: usize,
    pub new_records: usize,
    pub delivered: usize,
    pub delivery_failed: usize,
    pub saved: bool,
}

pub struct Watcher<P: PoolSource, N: Notifier> {
    settings: SettingsProvider,
    pool: P,
    notifier: N,
    store: StateStore,
    tracker: RecordTracker,
    /// Records changed since the last successful save
    dirty: bool,
}

impl<P: PoolSource, N: Notifier> Watcher<P, N> {
    /// Create a watcher with records loaded from `store`
    pub async fn start(settings: SettingsProvider, pool: P, notifier: N, store: StateStore) -> Self {
        let tracker = RecordTracker::from_records(store.load().await);
        if tracker.is_empty() {
            info!(
                state_file = %store.path().display(),
                "No worker records yet, first sightings will set baselines"
            );
        } else {
            info!(
                workers = tracker.len(),
                state_file = %store.path().display(),
                "Loaded worker records"
            );
        }

        Self {
            settings,
            pool,
            notifier,
            store,
            tracker,
            dirty: false,
        }
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &RecordTracker {
        &self.tracker
    }

    /// Run one poll cycle with fresh settings and return how long to sleep
    pub async fn tick(&mut self) -> Duration {
        let settings = self.settings.resolve().await;

        if !settings.notifications_enabled() {
            info!("No Discord webhook configured, waiting");
            return UNCONFIGURED_BACKOFF;
        }

        match self.run_cycle(&settings).await {
            Ok(report) => {
                info!(
                    workers = report.workers,
                    first_seen = report.first_seen,
                    new_records = report.new_records,
                    delivered = report.delivered,
                    delivery_failed = report.delivery_failed,
                    state_saved = report.saved,
                    webhook_configured = settings.notifications_enabled(),
                    "Poll complete"
                );
                settings.poll_interval
            }
            Err(e) => {
                error!(error = %e, "Poll cycle failed");
                self.settings.resolve().await.poll_interval
            }
        }
    }

    /// Fetch, evaluate and persist. Upstream failures abort before any
    /// record is touched.
    pub async fn run_cycle(&mut self, settings: &EffectiveSettings) -> anyhow::Result<CycleReport> {
        let workers = self.pool.fetch_workers(&settings.pool_api_base).await?;
        let pool = self.pool.fetch_pool_stats(&settings.pool_api_base).await?;

        let mut report = self
            .evaluate_workers(&settings.notification_target, &workers, &pool)
            .await;

        if self.dirty {
            match self.store.save(self.tracker.records()).await {
                Ok(()) => {
                    self.dirty = false;
                    report.saved = true;
                }
                Err(e) => {
                    // Records stay dirty so the next cycle retries
                    error!(error = %e, "Failed to save worker records");
                }
            }
        }

        Ok(report)
    }

    async fn evaluate_workers(
        &mut self,
        target: &str,
        workers: &[WorkerSnapshot],
        pool: &PoolSnapshot,
    ) -> CycleReport {
        let mut report = CycleReport {
            workers: workers.len(),
            ..Default::default()
        };

        for worker in workers {
            let decision = self.tracker.evaluate(&worker.raw_name, worker.best_ever);
            if decision.changed() {
                self.dirty = true;
            }

            match decision {
                Decision::Ignore | Decision::NoChange => {}
                Decision::FirstSeen => {
                    report.first_seen += 1;
                    debug!(worker = %worker.raw_name, best = ?worker.best_ever, "New worker, baseline recorded");
                }
                Decision::NewRecord { previous, current } => {
                    report.new_records += 1;
                    let alert = AthAlert::new(current, worker, pool);
                    info!(
                        worker = %worker.raw_name,
                        display = %alert.display_name,
                        previous = previous,
                        best = current,
                        "New worker ATH"
                    );

                    if target.is_empty() {
                        continue;
                    }
                    match self.notifier.notify(target, &alert).await {
                        Ok(()) => report.delivered += 1,
                        Err(e) => {
                            report.delivery_failed += 1;
                            warn!(worker = %worker.raw_name, error = %e, "Failed to deliver ATH alert");
                        }
                    }
                }
            }
        }

        report
    }

    /// Poll until a shutdown message arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Watcher loop started");

        loop {
            let delay = self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Watcher loop shutting down");
                    break;
                }
            }
        }
    }
}
