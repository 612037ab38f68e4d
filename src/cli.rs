#![expect(clippy::print_stdout)]

use anyhow::{Context as _, Result};
use cleanser::config::{ServiceSettings, load_app_config};
use cleanser::dataset::io::read_csv_from;
use cleanser::export::{CodecRegistry, ExportOptions};
use cleanser::jobs::{FsArtifactStore, InMemoryUploadStore, JobService, JobStatus};
use cleanser::pipeline::RuleSet;
use cleanser::utils::fmt_progress;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLI_UPLOAD_ID: &str = "cli";

#[derive(Parser)]
#[command(name = "cleanser", about = "Rule-driven tabular data cleaning")]
pub struct Cli {
    /// Directory for log files. Defaults to the platform data directory.
    #[arg(long, global = true, env = "CLEANSER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the column types inferred from a CSV file
    Infer {
        file: PathBuf,

        /// Field delimiter of the input
        #[arg(short, long, default_value_t = ',')]
        delimiter: char,
    },
    /// Run rules over the first rows of a CSV file and print the result as JSON
    Preview {
        file: PathBuf,

        /// JSON rule set. Without it the rows are shown as read.
        #[arg(short, long)]
        rules: Option<PathBuf>,

        #[arg(short, long, default_value_t = ',')]
        delimiter: char,

        /// Rows to include. Defaults to the configured preview limit.
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Clean a CSV file as a job and write the artifact
    Run {
        file: PathBuf,

        /// JSON rule set
        #[arg(short, long)]
        rules: PathBuf,

        /// JSON export options. Defaults to CSV.
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Artifact directory. Defaults to the configured output directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value_t = ',')]
        delimiter: char,
    },
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let settings = load_settings()?;
    match cli.command {
        Commands::Infer { file, delimiter } => handle_infer(&settings, &file, delimiter),
        Commands::Preview {
            file,
            rules,
            delimiter,
            limit,
        } => handle_preview(&settings, &file, rules.as_deref(), delimiter, limit),
        Commands::Run {
            file,
            rules,
            export,
            output,
            delimiter,
        } => handle_run(settings, &file, &rules, export.as_deref(), output, delimiter).await,
    }
}

fn load_settings() -> Result<ServiceSettings> {
    let mut settings = load_app_config().settings;
    settings.apply_env_overrides()?;
    settings.validate()?;
    Ok(settings)
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("Delimiter must be a single ASCII character, got '{delimiter}'"))
}

fn load_dataset(
    settings: &ServiceSettings,
    file: &Path,
    delimiter: char,
) -> Result<cleanser::dataset::Dataset> {
    let reader = std::fs::File::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let dataset = read_csv_from(reader, delimiter_byte(delimiter)?, settings.inference_sample_size)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    tracing::info!(
        rows = dataset.len(),
        columns = dataset.width(),
        "Loaded {}",
        file.display()
    );
    Ok(dataset)
}

fn handle_infer(settings: &ServiceSettings, file: &Path, delimiter: char) -> Result<()> {
    let dataset = load_dataset(settings, file, delimiter)?;
    let width = dataset
        .column_names()
        .map(str::len)
        .max()
        .unwrap_or_default();
    for column in dataset.columns() {
        println!("{:<width$}  {}", column.name, column.dtype);
    }
    Ok(())
}

fn handle_preview(
    settings: &ServiceSettings,
    file: &Path,
    rules: Option<&Path>,
    delimiter: char,
    limit: Option<usize>,
) -> Result<()> {
    let dataset = load_dataset(settings, file, delimiter)?;
    let rules = rules
        .map(|path| {
            RuleSet::from_file(path).with_context(|| format!("Failed to load {}", path.display()))
        })
        .transpose()?;
    let limit = limit.unwrap_or(settings.preview_row_limit);

    let preview = cleanser::pipeline::preview_dataset(&dataset, rules.as_ref(), limit)?;
    let payload = serde_json::json!({
        "columns": preview.columns,
        "rows": preview.records(),
        "warnings": preview.warnings,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn handle_run(
    settings: ServiceSettings,
    file: &Path,
    rules_path: &Path,
    export_path: Option<&Path>,
    output: Option<PathBuf>,
    delimiter: char,
) -> Result<()> {
    let dataset = load_dataset(&settings, file, delimiter)?;
    let rules = RuleSet::from_file(rules_path)
        .with_context(|| format!("Failed to load {}", rules_path.display()))?;
    let export = match export_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<ExportOptions>(&content)
                .with_context(|| format!("Invalid export options in {}", path.display()))?
        }
        None => ExportOptions::default(),
    };

    let uploads = Arc::new(InMemoryUploadStore::new());
    uploads.insert(CLI_UPLOAD_ID, dataset);
    let output_dir = output.unwrap_or_else(|| settings.output_dir.clone());
    let artifacts = Arc::new(FsArtifactStore::new(output_dir));

    let service = JobService::start(settings, uploads, artifacts, CodecRegistry::with_defaults())?;
    let job_id = service.submit(CLI_UPLOAD_ID, rules, export).await?;
    println!("Submitted job {job_id}");

    let mut last_progress = -1.0;
    let view = loop {
        let view = service.get_status(job_id)?;
        if view.progress > last_progress {
            println!("  {:<9} {}", view.status, fmt_progress(view.progress));
            last_progress = view.progress;
        }
        if view.status.is_terminal() {
            break view;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    service.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&view)?);
    match (view.status, &view.result_ref) {
        (JobStatus::Completed, Some(artifact)) => {
            println!("Artifact written to {}", artifact.location);
            Ok(())
        }
        _ => anyhow::bail!(
            "Job {job_id} failed: {}",
            view.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
