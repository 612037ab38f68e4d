//! Collaborators at the I/O edges of a job: where uploads come from and
//! where artifacts go.

use super::state::JobId;
use crate::dataset::Dataset;
use crate::error::{CleanserError, Result};
use crate::utils::TempFileGuard;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Where a finished artifact was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub location: String,
    pub file_name: String,
    pub size: u64,
}

/// Source of already-typed datasets keyed by upload id.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Fails with `NotFound` when the upload is absent or expired.
    async fn get(&self, upload_id: &str) -> Result<Arc<Dataset>>;
}

/// Sink for export artifacts. A `put` either stores the whole artifact or nothing.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, job_id: JobId, file_name: &str, bytes: Vec<u8>) -> Result<ArtifactRef>;

    async fn delete(&self, artifact: &ArtifactRef) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryUploadStore {
    uploads: RwLock<HashMap<String, Arc<Dataset>>>,
}

impl InMemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, upload_id: impl Into<String>, dataset: Dataset) {
        self.uploads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(upload_id.into(), Arc::new(dataset));
    }

    pub fn remove(&self, upload_id: &str) -> bool {
        self.uploads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(upload_id)
            .is_some()
    }
}

#[async_trait]
impl UploadStore for InMemoryUploadStore {
    async fn get(&self, upload_id: &str) -> Result<Arc<Dataset>> {
        self.uploads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(upload_id)
            .cloned()
            .ok_or_else(|| CleanserError::NotFound(format!("upload '{upload_id}'")))
    }
}

/// Artifacts as files under `<root>/<job id>/<file name>`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn write_failed(path: &Path, err: &std::io::Error) -> CleanserError {
    CleanserError::Resource(format!("failed to write artifact {}: {err}", path.display()))
}

/// Write to a hidden partial file, then rename it into place.
fn write_atomically(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| write_failed(dir, &e))?;
    let target = dir.join(file_name);
    let partial = dir.join(format!(".{file_name}.partial"));
    let guard = TempFileGuard::new(&partial);
    std::fs::write(&partial, bytes).map_err(|e| write_failed(&partial, &e))?;
    std::fs::rename(&partial, &target).map_err(|e| write_failed(&target, &e))?;
    guard.disarm();
    Ok(target)
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, job_id: JobId, file_name: &str, bytes: Vec<u8>) -> Result<ArtifactRef> {
        let dir = self.root.join(job_id.to_string());
        let name = file_name.to_owned();
        let size = bytes.len() as u64;
        // One blocking task owns the temp file from creation to rename, so a
        // caller that stops waiting cannot strand it.
        let target = tokio::task::spawn_blocking(move || write_atomically(&dir, &name, &bytes))
            .await
            .map_err(|e| CleanserError::Resource(format!("artifact write task failed: {e}")))??;

        tracing::debug!(%job_id, path = %target.display(), bytes = size, "Artifact stored");
        Ok(ArtifactRef {
            location: target.to_string_lossy().into_owned(),
            file_name: file_name.to_owned(),
            size,
        })
    }

    async fn delete(&self, artifact: &ArtifactRef) -> Result<()> {
        let path = PathBuf::from(&artifact.location);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CleanserError::Resource(format!(
                    "failed to delete artifact {}: {e}",
                    path.display()
                )));
            }
        }
        // The per-job directory only ever holds this artifact
        if let Some(dir) = path.parent()
            && dir.starts_with(&self.root)
            && let Err(e) = tokio::fs::remove_dir(dir).await
        {
            tracing::debug!("Leaving artifact directory {}: {e}", dir.display());
        }
        Ok(())
    }
}

/// Artifacts kept in memory, addressed as `mem://<job id>/<file name>`.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: &str) -> Option<Vec<u8>> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, job_id: JobId, file_name: &str, bytes: Vec<u8>) -> Result<ArtifactRef> {
        let location = format!("mem://{job_id}/{file_name}");
        let size = bytes.len() as u64;
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.clone(), bytes);
        Ok(ArtifactRef {
            location,
            file_name: file_name.to_owned(),
            size,
        })
    }

    async fn delete(&self, artifact: &ArtifactRef) -> Result<()> {
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&artifact.location);
        Ok(())
    }
}
