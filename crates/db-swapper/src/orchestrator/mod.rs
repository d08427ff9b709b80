//! Job bootstrap and supervision.
//!
//! Every job runs in its own task: one cycle immediately, then one per
//! interval until the shared [`CancellationToken`] fires. Shutdown waits for
//! in-flight cycles up to a grace period and aborts whatever is left.

mod registry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::sync::{SyncJob, TransformRegistry};

pub use registry::{ConnectionRegistry, HealthStatus};

/// Build every configured job against the registry.
///
/// A job whose databases are unavailable or whose schemas cannot be
/// resolved is logged and skipped, unless `strict_startup` is set, in which
/// case the first failure is returned. Having no job at all is an error.
pub async fn bootstrap_jobs(
    config: &Config,
    registry: &ConnectionRegistry,
    transforms: &TransformRegistry,
) -> Result<Vec<SyncJob>> {
    let mut jobs = Vec::new();
    let mut failed = 0usize;

    for job_config in config.jobs() {
        let name = job_config.name.clone();
        let result = async {
            let source = registry.get(&job_config.source_db)?;
            let target = registry.get(&job_config.target_db)?;
            let transform = transforms.resolve(job_config.transform_function.as_deref());
            SyncJob::bootstrap(job_config, source, target, transform).await
        }
        .await;

        match result {
            Ok(job) => jobs.push(job),
            Err(e) if config.strict_startup => return Err(e),
            Err(e) => {
                error!("Job {} failed to start: {}", name, e);
                failed += 1;
            }
        }
    }

    if jobs.is_empty() {
        return Err(SyncError::SchemaResolution(format!(
            "no sync job could be started ({} failed)",
            failed
        )));
    }
    if failed > 0 {
        warn!("{} job(s) started, {} failed", jobs.len(), failed);
    } else {
        info!("{} job(s) started", jobs.len());
    }
    Ok(jobs)
}

/// How the supervised tasks ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that stopped within the grace period.
    pub completed: usize,
    /// Tasks aborted after the grace period elapsed.
    pub aborted: usize,
}

/// Owns one task per job and the token that stops them.
pub struct Supervisor {
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self::with_token(CancellationToken::new(), shutdown_timeout)
    }

    /// Supervise under an externally owned token, e.g. one cancelled by a
    /// signal handler.
    pub fn with_token(cancel: CancellationToken, shutdown_timeout: Duration) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
            shutdown_timeout,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of tasks not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start the schedule loop for a job.
    pub fn spawn(&mut self, job: SyncJob) {
        let span = info_span!("sync_job", job = %job.name());
        let cancel = self.cancel.clone();
        self.tasks
            .spawn(run_schedule(Arc::new(job), cancel).instrument(span));
    }

    /// Wait for `signal`, then shut down.
    pub async fn run_until<F>(self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {}
            _ = self.cancel.cancelled() => {}
        }
        self.shutdown().await
    }

    /// Stop scheduling new cycles and join the tasks, aborting the ones
    /// still running once the grace period has elapsed.
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.cancel.cancel();
        info!(
            "Shutting down {} job(s), waiting up to {:?}",
            self.tasks.len(),
            self.shutdown_timeout
        );

        let mut report = ShutdownReport::default();
        let graceful = tokio::time::timeout(self.shutdown_timeout, async {
            while let Some(joined) = self.tasks.join_next().await {
                if let Err(e) = joined {
                    error!("Sync task panicked: {}", e);
                }
                report.completed += 1;
            }
        })
        .await;

        if graceful.is_err() {
            report.aborted = self.tasks.len();
            warn!(
                "Grace period elapsed, aborting {} in-flight cycle(s)",
                report.aborted
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        info!(
            "Shutdown complete: {} stopped, {} aborted",
            report.completed, report.aborted
        );
        report
    }
}

async fn run_cycle_logged(job: &SyncJob) {
    match job.run_cycle().await {
        Ok(report) => info!(
            "Cycle complete: {} rows extracted, {} inserted in {} batch(es), {} procedure failure(s), {:.2}s",
            report.rows_extracted,
            report.rows_inserted,
            report.batches,
            report.procedures_failed,
            report.duration.as_secs_f64()
        ),
        Err(e) => error!("Cycle failed: {}", e),
    }
}

async fn run_schedule(job: Arc<SyncJob>, cancel: CancellationToken) {
    if cancel.is_cancelled() {
        return;
    }
    let period = job.interval();
    info!("Job started, interval {:?}", period);

    run_cycle_logged(&job).await;

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => run_cycle_logged(&job).await,
        }
    }
    info!("Job stopped");
}
