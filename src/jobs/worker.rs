//! Worker loop: claim, run under a deadline, record the outcome.

use super::queue::JobQueue;
use super::registry::JobRegistry;
use super::state::{Job, JobId};
use super::store::{ArtifactRef, ArtifactStore, UploadStore};
use crate::dataset::Dataset;
use crate::error::{CleanserError, Result};
use crate::export::{Artifact, ExportAdapter};
use crate::pipeline::{Stage, compile, run_pipeline};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

pub(crate) struct WorkerContext {
    pub registry: Arc<JobRegistry>,
    pub queue: Arc<JobQueue>,
    pub uploads: Arc<dyn UploadStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub adapter: Arc<ExportAdapter>,
    pub timeout: Duration,
}

pub(crate) async fn run_worker(index: usize, ctx: Arc<WorkerContext>) {
    tracing::debug!(worker = index, "Worker started");
    while let Some(job_id) = ctx.queue.pop().await {
        // Withdrawn or purged after it was queued
        let Some(job) = ctx.registry.get(job_id) else {
            continue;
        };
        if !job.state.claim() {
            continue;
        }
        tracing::info!(%job_id, worker = index, "Job running");
        execute(&ctx, &job).await;
    }
    tracing::debug!(worker = index, "Worker stopped");
}

async fn execute(ctx: &WorkerContext, job: &Arc<Job>) {
    let abort = Arc::new(AtomicBool::new(false));
    let run = run_job(ctx, job, Arc::clone(&abort));
    let err = match tokio::time::timeout(ctx.timeout, run).await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(_elapsed) => {
            abort.store(true, Ordering::Release);
            CleanserError::Timeout(ctx.timeout)
        }
    };
    if job.state.fail(&err) {
        tracing::error!(job_id = %job.id, kind = err.kind(), "Job failed: {err}");
    }
}

/// Runs every stage and completes the job. Errors leave the job for the caller to fail.
async fn run_job(ctx: &WorkerContext, job: &Arc<Job>, abort: Arc<AtomicBool>) -> Result<()> {
    let source = ctx
        .uploads
        .get(&job.upload_id)
        .await
        .map_err(CleanserError::into_resource)?;
    job.state.advance(Stage::Read.checkpoint());

    let plan = compile(&job.rules, &source)?;
    let dataset = Dataset::clone(&source);
    drop(source);

    let adapter = Arc::clone(&ctx.adapter);
    let stage_job = Arc::clone(job);
    let task = tokio::task::spawn_blocking(move || {
        let observer = |stage: Stage| {
            if abort.load(Ordering::Acquire) {
                return Err(CleanserError::Other("job aborted".to_owned()));
            }
            stage_job.state.advance(stage.checkpoint());
            tracing::debug!(job_id = %stage_job.id, ?stage, "Stage finished");
            Ok(())
        };
        let output = run_pipeline(dataset, &plan, &observer)?;
        let artifact = adapter.export(&output.dataset, &stage_job.export)?;
        observer(Stage::Export)?;
        Ok::<_, CleanserError>((output.report, artifact))
    });
    let (report, artifact) = task
        .await
        .map_err(|e| CleanserError::Other(format!("pipeline task failed: {e}")))??;

    let stored = PendingArtifact::start(&ctx.artifacts, job.id, artifact)
        .finish()
        .await
        .map_err(CleanserError::into_resource)?;
    let summary = report.summary();
    if job
        .state
        .complete(stored.clone(), report.warnings, summary.clone())
    {
        tracing::info!(job_id = %job.id, location = %stored.location, "Job completed: {summary}");
    } else if let Err(e) = ctx.artifacts.delete(&stored).await {
        tracing::warn!(job_id = %job.id, "Failed to discard artifact of finished job: {e}");
    }
    Ok(())
}

/// An artifact write running in its own task.
///
/// If the job future is dropped before the write is collected (the deadline
/// passed), the write still finishes and its artifact is deleted afterwards.
struct PendingArtifact {
    handle: Option<JoinHandle<Result<ArtifactRef>>>,
    artifacts: Arc<dyn ArtifactStore>,
    job_id: JobId,
}

impl PendingArtifact {
    fn start(artifacts: &Arc<dyn ArtifactStore>, job_id: JobId, artifact: Artifact) -> Self {
        let store = Arc::clone(artifacts);
        let handle = tokio::spawn(async move {
            store
                .put(job_id, &artifact.file_name, artifact.bytes)
                .await
        });
        Self {
            handle: Some(handle),
            artifacts: Arc::clone(artifacts),
            job_id,
        }
    }

    async fn finish(mut self) -> Result<ArtifactRef> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(CleanserError::Other("artifact already collected".to_owned()));
        };
        let joined = handle.await;
        self.handle = None;
        joined.map_err(|e| CleanserError::Other(format!("artifact task failed: {e}")))?
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let artifacts = Arc::clone(&self.artifacts);
        let job_id = self.job_id;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%job_id, "No runtime left to discard an abandoned artifact");
            return;
        };
        runtime.spawn(async move {
            if let Ok(Ok(stored)) = handle.await {
                match artifacts.delete(&stored).await {
                    Ok(()) => tracing::debug!(%job_id, "Discarded artifact of abandoned job"),
                    Err(e) => tracing::warn!(%job_id, "Failed to discard abandoned artifact: {e}"),
                }
            }
        });
    }
}
