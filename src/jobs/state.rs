//! Job identity and the lock-free job state machine.
//!
//! Status and progress share one `AtomicU64` (status in the high half,
//! progress in millionths in the low half) so both change together under a
//! single compare-and-set. The outcome is stored in a set-once cell before the
//! terminal transition is published.

use super::store::ArtifactRef;
use crate::error::CleanserError;
use crate::export::ExportOptions;
use crate::pipeline::{RuleSet, ValidationWarning};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

const PROGRESS_SCALE: f64 = 1_000_000.0;
const PROGRESS_MASK: u64 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = CleanserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CleanserError::NotFound(format!("job '{s}' ({e})")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn code(self) -> u64 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 3,
        }
    }

    fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn pack(status: JobStatus, progress: u64) -> u64 {
    (status.code() << 32) | (progress & PROGRESS_MASK)
}

fn unpack(word: u64) -> (JobStatus, u64) {
    (JobStatus::from_code(word >> 32), word & PROGRESS_MASK)
}

fn to_units(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * PROGRESS_SCALE).round() as u64
}

/// Result recorded when a job reaches a terminal status.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed {
        artifact: ArtifactRef,
        warnings: Vec<ValidationWarning>,
        summary: String,
    },
    Failed {
        error: String,
        kind: &'static str,
    },
}

impl JobOutcome {
    pub fn failed(err: &CleanserError) -> Self {
        Self::Failed {
            error: err.to_string(),
            kind: err.kind(),
        }
    }

    fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Shared mutable part of a job. Every transition is a compare-and-set.
#[derive(Debug)]
pub struct JobState {
    word: AtomicU64,
    outcome: OnceLock<JobOutcome>,
    updated_at: AtomicI64,
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

impl JobState {
    pub fn new() -> Self {
        Self {
            word: AtomicU64::new(pack(JobStatus::Queued, 0)),
            outcome: OnceLock::new(),
            updated_at: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    fn touch(&self) {
        self.updated_at
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    /// Queued → Running. Exactly one caller wins.
    pub fn claim(&self) -> bool {
        let won = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (status, progress) = unpack(word);
                (status == JobStatus::Queued).then(|| pack(JobStatus::Running, progress))
            })
            .is_ok();
        if won {
            self.touch();
        }
        won
    }

    /// Raise progress of a running job. Lower values and non-running jobs are ignored.
    pub fn advance(&self, fraction: f64) -> bool {
        let target = to_units(fraction);
        let moved = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (status, progress) = unpack(word);
                (status == JobStatus::Running && target > progress)
                    .then(|| pack(JobStatus::Running, target))
            })
            .is_ok();
        if moved {
            self.touch();
        }
        moved
    }

    /// Running → terminal. Returns false when another writer already finished the job
    /// or the job was never claimed.
    pub fn finish(&self, outcome: JobOutcome) -> bool {
        if unpack(self.word.load(Ordering::Acquire)).0 != JobStatus::Running {
            return false;
        }
        let terminal = outcome.status();
        if self.outcome.set(outcome).is_err() {
            return false;
        }
        let published = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (status, progress) = unpack(word);
                let progress = match terminal {
                    JobStatus::Completed => to_units(1.0),
                    _ => progress,
                };
                (status == JobStatus::Running).then(|| pack(terminal, progress))
            })
            .is_ok();
        if published {
            self.touch();
        }
        published
    }

    pub fn complete(
        &self,
        artifact: ArtifactRef,
        warnings: Vec<ValidationWarning>,
        summary: String,
    ) -> bool {
        self.finish(JobOutcome::Completed {
            artifact,
            warnings,
            summary,
        })
    }

    pub fn fail(&self, err: &CleanserError) -> bool {
        self.finish(JobOutcome::failed(err))
    }

    pub fn status(&self) -> JobStatus {
        unpack(self.word.load(Ordering::Acquire)).0
    }

    /// Consistent status, progress and outcome at one instant.
    pub fn snapshot(&self) -> (JobStatus, f64, Option<&JobOutcome>) {
        let (status, units) = unpack(self.word.load(Ordering::Acquire));
        let outcome = if status.is_terminal() {
            self.outcome.get()
        } else {
            None
        };
        (status, units as f64 / PROGRESS_SCALE, outcome)
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.updated_at.load(Ordering::Acquire))
            .unwrap_or_default()
    }
}

/// A submitted unit of work. Rules and export options are frozen at submission.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub upload_id: String,
    pub rules: Arc<RuleSet>,
    pub export: Arc<ExportOptions>,
    pub created_at: DateTime<Utc>,
    pub state: JobState,
}

impl Job {
    pub fn new(upload_id: impl Into<String>, rules: RuleSet, export: ExportOptions) -> Self {
        Self {
            id: JobId::new(),
            upload_id: upload_id.into(),
            rules: Arc::new(rules),
            export: Arc::new(export),
            created_at: Utc::now(),
            state: JobState::new(),
        }
    }

    pub fn view(&self) -> JobStatusView {
        let (status, progress, outcome) = self.state.snapshot();
        let (result_ref, error, warnings) = match outcome {
            Some(JobOutcome::Completed {
                artifact, warnings, ..
            }) => (Some(artifact.clone()), None, warnings.clone()),
            Some(JobOutcome::Failed { error, .. }) => (None, Some(error.clone()), Vec::new()),
            None => (None, None, Vec::new()),
        };
        JobStatusView {
            job_id: self.id,
            status,
            progress,
            result_ref,
            error,
            warnings,
            created_at: self.created_at,
            updated_at: self.state.updated_at(),
        }
    }
}

/// Read-only status payload returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<ArtifactRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub warnings: Vec<ValidationWarning>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ArtifactRef {
        ArtifactRef {
            location: "mem://x/cleaned_data.csv".to_owned(),
            file_name: "cleaned_data.csv".to_owned(),
            size: 3,
        }
    }

    #[test]
    fn test_only_one_claim_wins() {
        let state = JobState::new();
        assert!(state.claim(), "first claim wins");
        assert!(!state.claim(), "second claim loses");
        assert_eq!(state.status(), JobStatus::Running);
    }

    #[test]
    fn test_concurrent_claims() {
        let state = Arc::new(JobState::new());
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| usize::from(state.claim())))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("claim thread"))
                .sum()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let state = JobState::new();
        assert!(!state.advance(0.1), "queued jobs do not move");
        state.claim();
        assert!(state.advance(0.3), "forward move");
        assert!(!state.advance(0.1), "backward move ignored");
        let (_, progress, _) = state.snapshot();
        assert!((progress - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let state = JobState::new();
        state.claim();
        state.advance(0.5);
        assert!(state.fail(&CleanserError::Timeout(std::time::Duration::from_secs(1))));
        assert!(!state.complete(artifact(), Vec::new(), String::new()), "already failed");
        assert!(!state.advance(0.9), "terminal jobs do not move");

        let (status, progress, outcome) = state.snapshot();
        assert_eq!(status, JobStatus::Failed);
        assert!((progress - 0.5).abs() < 1e-9);
        assert!(
            matches!(outcome, Some(JobOutcome::Failed { kind: "timeout", .. })),
            "timeout outcome recorded"
        );
    }

    #[test]
    fn test_complete_sets_full_progress() {
        let state = JobState::new();
        state.claim();
        assert!(state.complete(artifact(), Vec::new(), "done".to_owned()));
        let (status, progress, outcome) = state.snapshot();
        assert_eq!(status, JobStatus::Completed);
        assert!((progress - 1.0).abs() < 1e-9);
        assert!(outcome.is_some(), "outcome visible with terminal status");
    }

    #[test]
    fn test_unclaimed_job_cannot_finish() {
        let state = JobState::new();
        assert!(!state.fail(&CleanserError::Other("x".to_owned())));
        assert_eq!(state.status(), JobStatus::Queued);
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().expect("round trip");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err(), "invalid id");
    }

    #[test]
    fn test_view_serializes_lowercase_status() {
        let job = Job::new("u1", RuleSet::default(), ExportOptions::default());
        let json = serde_json::to_value(job.view()).expect("serialize");
        assert_eq!(json["status"], "queued");
        assert!(json.get("error").is_none(), "no error before failure");
    }
}
