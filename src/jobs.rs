//! Asynchronous cleaning jobs.
//!
//! A [`JobService`] owns a bounded [`JobQueue`] and a pool of tokio workers.
//! Each job moves through `queued → running → completed | failed`; every
//! transition is a compare-and-set on the job's [`JobState`], so exactly one
//! worker runs a job and a terminal status never changes afterwards.
//!
//! ```no_run
//! use cleanser::config::ServiceSettings;
//! use cleanser::export::{CodecRegistry, ExportOptions};
//! use cleanser::jobs::{InMemoryArtifactStore, InMemoryUploadStore, JobService};
//! use cleanser::pipeline::RuleSet;
//! use std::sync::Arc;
//!
//! # async fn example(dataset: cleanser::dataset::Dataset) -> cleanser::error::Result<()> {
//! let uploads = Arc::new(InMemoryUploadStore::new());
//! uploads.insert("upload-1", dataset);
//!
//! let service = JobService::start(
//!     ServiceSettings::default(),
//!     uploads,
//!     Arc::new(InMemoryArtifactStore::new()),
//!     CodecRegistry::with_defaults(),
//! )?;
//! let job_id = service
//!     .submit("upload-1", RuleSet::default(), ExportOptions::default())
//!     .await?;
//! let status = service.get_status(job_id)?;
//! println!("{} at {:.0}%", status.status, status.progress * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod registry;
pub mod service;
pub mod state;
pub mod store;
mod worker;

pub use queue::JobQueue;
pub use service::JobService;
pub use state::{Job, JobId, JobOutcome, JobState, JobStatus, JobStatusView};
pub use store::{
    ArtifactRef, ArtifactStore, FsArtifactStore, InMemoryArtifactStore, InMemoryUploadStore,
    UploadStore,
};
