use std::path::{Path, PathBuf};

/// Removes a temporary file when dropped unless disarmed.
///
/// Covers every exit path of the code holding it: early returns, errors,
/// panics and futures dropped by a timeout.
#[derive(Debug)]
pub struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stop tracking the file, typically once it has been renamed into place.
    pub fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("Failed to remove temporary file {}: {e}", path.display());
        }
    }
}

/// Formats a progress fraction as a percentage, or "n/a" if non-finite.
pub fn fmt_progress(fraction: f64) -> String {
    if fraction.is_finite() {
        format!("{:.0}%", fraction * 100.0)
    } else {
        "n/a".to_owned()
    }
}
