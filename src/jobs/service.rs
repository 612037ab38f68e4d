//! The job service: submission, status, withdrawal, preview and retention.

use super::queue::JobQueue;
use super::registry::JobRegistry;
use super::state::{Job, JobId, JobOutcome, JobStatusView};
use super::store::{ArtifactStore, UploadStore};
use super::worker::{WorkerContext, run_worker};
use crate::config::ServiceSettings;
use crate::error::{CleanserError, Result};
use crate::export::{CodecRegistry, ExportAdapter, ExportOptions};
use crate::pipeline::{Preview, RuleSet, normalize, preview_dataset};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct JobService {
    settings: ServiceSettings,
    registry: Arc<JobRegistry>,
    queue: Arc<JobQueue>,
    uploads: Arc<dyn UploadStore>,
    artifacts: Arc<dyn ArtifactStore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for JobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobService")
            .field("settings", &self.settings)
            .field("jobs", &self.registry.len())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl JobService {
    /// Spawn the worker pool and the retention janitor on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings or when called outside
    /// a tokio runtime.
    pub fn start(
        settings: ServiceSettings,
        uploads: Arc<dyn UploadStore>,
        artifacts: Arc<dyn ArtifactStore>,
        codecs: CodecRegistry,
    ) -> Result<Self> {
        settings.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            CleanserError::Config(format!("job service needs a tokio runtime: {e}"))
        })?;

        let registry = Arc::new(JobRegistry::new());
        let queue = Arc::new(JobQueue::new(settings.queue_capacity));
        let ctx = Arc::new(WorkerContext {
            registry: Arc::clone(&registry),
            queue: Arc::clone(&queue),
            uploads: Arc::clone(&uploads),
            artifacts: Arc::clone(&artifacts),
            adapter: Arc::new(ExportAdapter::new(codecs)),
            timeout: settings.job_timeout(),
        });

        let workers: Vec<JoinHandle<()>> = (0..settings.worker_count)
            .map(|index| runtime.spawn(run_worker(index, Arc::clone(&ctx))))
            .collect();

        let janitor = runtime.spawn(run_janitor(
            Arc::downgrade(&registry),
            Arc::clone(&artifacts),
            settings.retention(),
            settings.janitor_interval(),
        ));

        tracing::info!(
            workers = settings.worker_count,
            capacity = settings.queue_capacity,
            timeout_secs = settings.job_timeout_secs,
            "Job service started"
        );

        Ok(Self {
            settings,
            registry,
            queue,
            uploads,
            artifacts,
            workers: Mutex::new(workers),
            janitor: Mutex::new(Some(janitor)),
        })
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Normalize the rules against the upload and queue a job.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown upload, `Rule` for a structurally invalid rule
    /// set, `Config` for invalid export options and `QueueFull` when the queue
    /// is at capacity. No job exists after any of these.
    pub async fn submit(
        &self,
        upload_id: &str,
        rules: RuleSet,
        export: ExportOptions,
    ) -> Result<JobId> {
        export.validate()?;
        let dataset = self.uploads.get(upload_id).await?;
        let normalized = normalize(&rules, &dataset)?;

        let job = Arc::new(Job::new(upload_id, normalized, export));
        let id = job.id;
        self.registry.insert(job);
        if let Err(e) = self.queue.push(id) {
            self.registry.remove(id);
            tracing::warn!(upload_id, "Submission rejected: {e}");
            return Err(e);
        }
        tracing::info!(%id, upload_id, "Job queued");
        Ok(id)
    }

    /// Current status of a job. Never changes any state.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown, withdrawn or purged jobs.
    pub fn get_status(&self, job_id: JobId) -> Result<JobStatusView> {
        self.registry
            .get(job_id)
            .map(|job| job.view())
            .ok_or_else(|| CleanserError::NotFound(format!("job '{job_id}'")))
    }

    /// Remove a job that is still queued. Returns `false` once a worker has taken it.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown jobs.
    pub fn withdraw(&self, job_id: JobId) -> Result<bool> {
        if self.registry.get(job_id).is_none() {
            return Err(CleanserError::NotFound(format!("job '{job_id}'")));
        }
        if self.queue.withdraw(job_id) {
            self.registry.remove(job_id);
            tracing::info!(%job_id, "Job withdrawn");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Run the rules over the first rows of an upload without creating a job.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown upload and `Rule` for any invalid rule.
    pub async fn preview(&self, upload_id: &str, rules: Option<RuleSet>) -> Result<Preview> {
        let dataset = self.uploads.get(upload_id).await?;
        preview_dataset(&dataset, rules.as_ref(), self.settings.preview_row_limit)
    }

    /// Drop finished jobs older than the retention window, with their artifacts.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        purge(&self.registry, self.artifacts.as_ref(), self.settings.retention(), now).await
    }

    /// Close the queue, let workers drain it and wait for them.
    pub async fn shutdown(&self) {
        self.queue.close();
        if let Some(janitor) = self
            .janitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            janitor.abort();
        }
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!("Worker ended abnormally: {e}");
            }
        }
        tracing::info!("Job service stopped");
    }
}

async fn purge(
    registry: &JobRegistry,
    artifacts: &dyn ArtifactStore,
    retention: Duration,
    now: DateTime<Utc>,
) -> usize {
    let expired = registry.take_expired(now, retention);
    for job in &expired {
        if let (_, _, Some(JobOutcome::Completed { artifact, .. })) =
            job.state.snapshot()
            && let Err(e) = artifacts.delete(artifact).await
        {
            tracing::warn!(job_id = %job.id, "Failed to delete expired artifact: {e}");
        }
    }
    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "Purged expired jobs");
    }
    expired.len()
}

/// Periodic purge; ends once the service and its workers are gone.
async fn run_janitor(
    registry: Weak<JobRegistry>,
    artifacts: Arc<dyn ArtifactStore>,
    retention: Duration,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(registry) = registry.upgrade() else {
            break;
        };
        purge(&registry, artifacts.as_ref(), retention, Utc::now()).await;
    }
}
