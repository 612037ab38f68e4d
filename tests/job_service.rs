//! Integration tests for the job service
//!
//! These tests drive the public service API end to end: submission, worker
//! execution, status polling, withdrawal, timeouts and retention.

use async_trait::async_trait;
use cleanser::config::ServiceSettings;
use cleanser::dataset::{ColumnInfo, DType, Dataset, Value};
use cleanser::error::{CleanserError, Result};
use cleanser::export::{CodecRegistry, ExportFormat, ExportOptions};
use cleanser::jobs::{
    ArtifactRef, ArtifactStore, FsArtifactStore, InMemoryArtifactStore, InMemoryUploadStore,
    JobId, JobService, JobStatus, JobStatusView, UploadStore,
};
use cleanser::pipeline::{ColumnRule, Deduplicate, Impute, RuleSet, Transform, Validation};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

fn customers() -> Dataset {
    Dataset::new(
        vec![
            ColumnInfo::new("email", DType::String),
            ColumnInfo::new("age", DType::Integer),
        ],
        vec![
            vec![Value::text(" A@X.IO "), Value::Int(30)],
            vec![Value::text("b@x.io"), Value::Null],
            vec![Value::text("a@x.io"), Value::Int(-4)],
        ],
    )
    .expect("valid dataset")
}

fn cleaning_rules() -> RuleSet {
    RuleSet {
        columns: vec![
            ColumnRule::new("email", DType::String)
                .with_transform(Transform::Trim)
                .with_transform(Transform::Lower),
            ColumnRule::new("age", DType::Integer)
                .with_validation(Validation::Min {
                    value: Value::Int(0),
                })
                .with_impute(Impute::Median),
        ],
        deduplicate: Some(Deduplicate {
            subset: vec!["email".to_owned()],
        }),
        outliers: None,
    }
}

fn settings() -> ServiceSettings {
    ServiceSettings {
        worker_count: 2,
        queue_capacity: 8,
        ..ServiceSettings::default()
    }
}

fn start(
    settings: ServiceSettings,
    uploads: Arc<dyn UploadStore>,
    artifacts: Arc<InMemoryArtifactStore>,
) -> JobService {
    cleanser::logging::init_test();
    JobService::start(settings, uploads, artifacts, CodecRegistry::with_defaults())
        .expect("service starts")
}

fn uploads_with_customers() -> Arc<InMemoryUploadStore> {
    let uploads = Arc::new(InMemoryUploadStore::new());
    uploads.insert("customers", customers());
    uploads
}

/// Poll until terminal, checking that progress never decreases and that the
/// terminal status does not change on later polls.
async fn wait_for_terminal(service: &JobService, job_id: JobId) -> JobStatusView {
    let mut last_progress = 0.0;
    for _ in 0..2000 {
        let view = service.get_status(job_id).expect("job exists");
        assert!(
            view.progress >= last_progress,
            "progress went backwards: {} after {last_progress}",
            view.progress
        );
        last_progress = view.progress;
        if view.status.is_terminal() {
            for _ in 0..3 {
                let again = service.get_status(job_id).expect("job exists");
                assert_eq!(again.status, view.status, "terminal status changed");
                assert!(
                    (again.progress - view.progress).abs() < f64::EPSILON,
                    "terminal progress changed"
                );
            }
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn test_job_completes_with_one_artifact() {
    cleanser::logging::init_test();
    let dir = tempfile::tempdir().expect("temp dir");
    let service = JobService::start(
        settings(),
        uploads_with_customers(),
        Arc::new(FsArtifactStore::new(dir.path())),
        CodecRegistry::with_defaults(),
    )
    .expect("service starts");

    let job_id = service
        .submit("customers", cleaning_rules(), ExportOptions::default())
        .await
        .expect("submitted");
    let view = wait_for_terminal(&service, job_id).await;

    assert_eq!(view.status, JobStatus::Completed);
    assert!((view.progress - 1.0).abs() < f64::EPSILON);
    assert!(view.error.is_none(), "completed jobs carry no error");
    assert_eq!(view.warnings.len(), 1, "one min violation");

    let artifact = view.result_ref.expect("artifact reference");
    assert_eq!(artifact.file_name, "cleaned_data.csv");
    let text = std::fs::read_to_string(&artifact.location).expect("artifact on disk");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3, "header plus two deduplicated rows");
    assert_eq!(lines.first(), Some(&"email,age"));
    assert!(lines.get(1).is_some_and(|l| l.starts_with("a@x.io,")));

    let job_dir = dir.path().join(job_id.to_string());
    let files = std::fs::read_dir(job_dir).expect("job dir").count();
    assert_eq!(files, 1, "exactly one artifact");

    service.shutdown().await;
}

#[tokio::test]
async fn test_invalid_regex_fails_after_running() {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(settings(), uploads_with_customers(), Arc::clone(&artifacts));

    let rules = RuleSet {
        columns: vec![ColumnRule::new("email", DType::String).with_validation(
            Validation::Regex {
                pattern: "([a-z".to_owned(),
            },
        )],
        ..RuleSet::default()
    };
    let job_id = service
        .submit("customers", rules, ExportOptions::default())
        .await
        .expect("structurally valid rules are accepted");
    let view = wait_for_terminal(&service, job_id).await;

    assert_eq!(view.status, JobStatus::Failed);
    let error = view.error.expect("failure message");
    assert!(
        error.contains("column 'email' validations[0] (regex)"),
        "error should name column and rule: {error}"
    );
    assert!(view.result_ref.is_none(), "failed jobs have no artifact");
    assert!(artifacts.is_empty(), "no partial artifact");

    service.shutdown().await;
}

#[tokio::test]
async fn test_structural_rule_errors_reject_submission() {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(settings(), uploads_with_customers(), artifacts);

    let rules = RuleSet {
        columns: vec![ColumnRule::new("phone", DType::String)],
        ..RuleSet::default()
    };
    let err = service
        .submit("customers", rules, ExportOptions::default())
        .await
        .expect_err("unknown column");
    assert_eq!(err.kind(), "rule");
    assert!(err.to_string().contains("phone"), "names the column: {err}");

    let err = service
        .submit("nobody", RuleSet::default(), ExportOptions::default())
        .await
        .expect_err("unknown upload");
    assert_eq!(err.kind(), "not_found");
    assert_eq!(service.queued(), 0);

    service.shutdown().await;
}

#[tokio::test]
async fn test_queue_full_rejects_immediately() {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(
        ServiceSettings {
            worker_count: 1,
            queue_capacity: 1,
            ..ServiceSettings::default()
        },
        uploads_with_customers(),
        Arc::clone(&artifacts),
    );

    // Single-threaded test runtime: workers cannot pop until this task yields
    let first = service
        .submit("customers", RuleSet::default(), ExportOptions::default())
        .await
        .expect("first fits");
    let err = service
        .submit("customers", RuleSet::default(), ExportOptions::default())
        .await
        .expect_err("queue is full");
    assert!(
        matches!(err, CleanserError::QueueFull { capacity: 1 }),
        "unexpected error: {err}"
    );

    let view = wait_for_terminal(&service, first).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(artifacts.len(), 1, "rejected submission created nothing");

    service.shutdown().await;
}

#[tokio::test]
async fn test_withdraw_queued_job() {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(settings(), uploads_with_customers(), Arc::clone(&artifacts));

    let job_id = service
        .submit("customers", RuleSet::default(), ExportOptions::default())
        .await
        .expect("submitted");
    assert!(service.withdraw(job_id).expect("known job"), "still queued");
    assert_eq!(
        service.get_status(job_id).expect_err("gone").kind(),
        "not_found"
    );
    assert!(service.withdraw(job_id).is_err(), "withdrawn jobs are unknown");

    let done = service
        .submit("customers", RuleSet::default(), ExportOptions::default())
        .await
        .expect("submitted");
    wait_for_terminal(&service, done).await;
    assert!(!service.withdraw(done).expect("known job"), "already claimed");

    service.shutdown().await;
    assert_eq!(artifacts.len(), 1, "withdrawn job never ran");
}

/// Answers the submission lookup at once and stalls every later one.
struct StallingUploads {
    inner: InMemoryUploadStore,
    calls: AtomicUsize,
}

#[async_trait]
impl UploadStore for StallingUploads {
    async fn get(&self, upload_id: &str) -> Result<Arc<Dataset>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        self.inner.get(upload_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_job() {
    let inner = InMemoryUploadStore::new();
    inner.insert("customers", customers());
    let uploads = Arc::new(StallingUploads {
        inner,
        calls: AtomicUsize::new(0),
    });
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(
        ServiceSettings {
            job_timeout_secs: 1,
            ..settings()
        },
        uploads,
        Arc::clone(&artifacts),
    );

    let job_id = service
        .submit("customers", RuleSet::default(), ExportOptions::default())
        .await
        .expect("submitted");
    let view = wait_for_terminal(&service, job_id).await;

    assert_eq!(view.status, JobStatus::Failed);
    let error = view.error.expect("failure message");
    assert!(error.contains("maximum duration of 1s"), "timeout message: {error}");
    assert!(artifacts.is_empty(), "no artifact after timeout");

    service.shutdown().await;
}

/// A filesystem store whose writes start late, so a deadline can pass mid-write.
struct SlowArtifacts {
    inner: FsArtifactStore,
    delay: Duration,
    deleted: Notify,
}

#[async_trait]
impl ArtifactStore for SlowArtifacts {
    async fn put(&self, job_id: JobId, file_name: &str, bytes: Vec<u8>) -> Result<ArtifactRef> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(job_id, file_name, bytes).await
    }

    async fn delete(&self, artifact: &ArtifactRef) -> Result<()> {
        let result = self.inner.delete(artifact).await;
        self.deleted.notify_one();
        result
    }
}

#[tokio::test]
async fn test_timeout_during_write_leaves_no_file() {
    cleanser::logging::init_test();
    let dir = tempfile::tempdir().expect("temp dir");
    let artifacts = Arc::new(SlowArtifacts {
        inner: FsArtifactStore::new(dir.path()),
        delay: Duration::from_secs(2),
        deleted: Notify::new(),
    });
    let service = JobService::start(
        ServiceSettings {
            job_timeout_secs: 1,
            ..settings()
        },
        uploads_with_customers(),
        Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
        CodecRegistry::with_defaults(),
    )
    .expect("service starts");

    let job_id = service
        .submit("customers", cleaning_rules(), ExportOptions::default())
        .await
        .expect("submitted");
    let view = wait_for_terminal(&service, job_id).await;
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.error.as_deref().map(|e| e.contains("maximum duration")), Some(true));

    // The late write still lands, then gets discarded
    artifacts.deleted.notified().await;
    let job_dir = dir.path().join(job_id.to_string());
    let leftovers = std::fs::read_dir(&job_dir).map_or(0, |entries| entries.count());
    assert_eq!(leftovers, 0, "failed job kept files in {}", job_dir.display());

    service.shutdown().await;
}

#[tokio::test]
async fn test_missing_writer_fails_job() {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(settings(), uploads_with_customers(), Arc::clone(&artifacts));

    let job_id = service
        .submit(
            "customers",
            RuleSet::default(),
            ExportOptions::with_format(ExportFormat::Xlsx),
        )
        .await
        .expect("submitted");
    let view = wait_for_terminal(&service, job_id).await;

    assert_eq!(view.status, JobStatus::Failed);
    let error = view.error.expect("failure message");
    assert!(error.contains("no writer registered for xlsx"), "{error}");
    assert!(artifacts.is_empty(), "no artifact");

    service.shutdown().await;
}

#[tokio::test]
async fn test_identical_jobs_produce_identical_bytes() {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(settings(), uploads_with_customers(), Arc::clone(&artifacts));
    let export = ExportOptions {
        format: ExportFormat::Json,
        ..ExportOptions::default()
    };

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let job_id = service
            .submit("customers", cleaning_rules(), export.clone())
            .await
            .expect("submitted");
        let view = wait_for_terminal(&service, job_id).await;
        let artifact = view.result_ref.expect("completed");
        outputs.push(artifacts.get(&artifact.location).expect("stored bytes"));
    }
    assert_eq!(outputs.first(), outputs.get(1), "byte-identical artifacts");

    service.shutdown().await;
}

#[tokio::test]
async fn test_preview_does_not_create_jobs() {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(
        ServiceSettings {
            preview_row_limit: 2,
            ..settings()
        },
        uploads_with_customers(),
        Arc::clone(&artifacts),
    );

    let preview = service
        .preview("customers", Some(cleaning_rules()))
        .await
        .expect("preview runs");
    assert_eq!(preview.rows.len(), 2);
    assert_eq!(
        preview.rows.first().and_then(|row| row.first()),
        Some(&Value::text("a@x.io"))
    );

    let err = service
        .preview(
            "customers",
            Some(RuleSet {
                columns: vec![ColumnRule::new("age", DType::Integer).with_transform(
                    Transform::Replace {
                        pattern: "(".to_owned(),
                        replacement: String::new(),
                    },
                )],
                ..RuleSet::default()
            }),
        )
        .await
        .expect_err("bad pattern");
    assert!(
        err.to_string().contains("column 'age' transforms[0] (replace)"),
        "{err}"
    );
    assert_eq!(service.queued(), 0);
    assert!(artifacts.is_empty(), "preview writes nothing");

    service.shutdown().await;
}

#[tokio::test]
async fn test_purge_removes_expired_jobs_and_artifacts() {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let service = start(settings(), uploads_with_customers(), Arc::clone(&artifacts));

    let job_id = service
        .submit("customers", RuleSet::default(), ExportOptions::default())
        .await
        .expect("submitted");
    wait_for_terminal(&service, job_id).await;

    assert_eq!(service.purge_expired(chrono::Utc::now()).await, 0);
    let later = chrono::Utc::now() + chrono::Duration::hours(2);
    assert_eq!(service.purge_expired(later).await, 1);
    assert!(service.get_status(job_id).is_err(), "purged job is unknown");
    assert!(artifacts.is_empty(), "artifact deleted with the job");

    service.shutdown().await;
}
