//! Background retention of jobs, artifacts and sources.
//!
//! Finished jobs are evicted, together with their artifact directories,
//! once they have been terminal for longer than the TTL. Sources are
//! evicted when no remaining job refers to them and they have been idle
//! for longer than the TTL.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use cutline_models::SourceId;
use cutline_queue::JobStore;
use cutline_storage::ArtifactStore;

use crate::config::WorkerConfig;
use crate::resolver::SourceResolver;
use crate::retry::FailureTracker;

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub jobs_evicted: usize,
    pub sources_evicted: usize,
}

/// Periodic eviction service.
pub struct RetentionSweeper {
    jobs: JobStore,
    resolver: Arc<SourceResolver>,
    artifacts: ArtifactStore,
    work_dir: PathBuf,
    ttl: Duration,
    sweep_interval: Duration,
    enabled: bool,
    shutdown: watch::Sender<bool>,
}

impl RetentionSweeper {
    pub fn new(
        config: &WorkerConfig,
        jobs: JobStore,
        resolver: Arc<SourceResolver>,
        artifacts: ArtifactStore,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs,
            resolver,
            artifacts,
            work_dir: config.work_dir.clone(),
            ttl: config.retention_ttl,
            sweep_interval: config.retention_sweep_interval,
            enabled: config.retention_enabled,
            shutdown,
        }
    }

    /// Run sweeps until [`shutdown`](Self::shutdown) is called.
    ///
    /// This should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Retention sweeper is disabled");
            return;
        }

        info!(
            "Starting retention sweeper (ttl: {:?}, interval: {:?})",
            self.ttl, self.sweep_interval
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = interval(self.sweep_interval);
        let mut failures = FailureTracker::new(3);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(report) => {
                            failures.record_success();
                            if report != SweepReport::default() {
                                info!(
                                    jobs = report.jobs_evicted,
                                    sources = report.sources_evicted,
                                    "Retention sweep evicted expired entries"
                                );
                            }
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Retention sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        }

        info!("Retention sweeper stopped");
    }

    /// Signal the sweep loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Evict everything that expired before `now - ttl`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        let ttl = chrono::Duration::from_std(self.ttl)?;
        let cutoff = now - ttl;
        let mut report = SweepReport::default();

        for job in self.jobs.snapshot_all().await {
            let expired = job.status.is_terminal()
                && job.finished_at.is_some_and(|finished| finished < cutoff);
            if !expired {
                continue;
            }
            self.artifacts.remove_job(&job.id).await?;
            self.jobs.remove(&job.id).await;
            report.jobs_evicted += 1;
        }

        let referenced: HashSet<SourceId> = self
            .jobs
            .snapshot_all()
            .await
            .into_iter()
            .map(|job| job.source_id)
            .collect();
        for id in self.resolver.idle_since(cutoff).await {
            if referenced.contains(&id) {
                continue;
            }
            if self.resolver.evict(&id).await {
                report.sources_evicted += 1;
            }
        }

        metrics::counter!("cutline_retention_jobs_evicted_total").increment(report.jobs_evicted as u64);
        metrics::counter!("cutline_retention_sources_evicted_total")
            .increment(report.sources_evicted as u64);
        Ok(report)
    }

    /// Delete the whole work directory. Used on graceful shutdown.
    pub async fn purge_all(&self) {
        if let Err(e) = self.artifacts.purge_all().await {
            warn!("Failed to purge artifacts: {}", e);
        }
        match tokio::fs::remove_dir_all(&self.work_dir).await {
            Ok(()) => info!(path = %self.work_dir.display(), "Purged work directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.work_dir.display(), "Failed to purge work directory: {}", e),
        }
    }
}
