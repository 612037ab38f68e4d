//! Service configuration.
//!
//! Settings live in `config.json` under the platform data directory and are
//! layered as: defaults, then the file (if present), then `CLEANSER_*`
//! environment variables.

use crate::error::{CleanserError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of environment variables that override settings.
pub const ENV_PREFIX: &str = "CLEANSER_";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceSettings {
    /// Jobs executed concurrently
    pub worker_count: usize,
    /// Jobs allowed to wait in the queue before submissions are rejected
    pub queue_capacity: usize,
    /// Maximum wall time of one job, from the moment a worker picks it up
    pub job_timeout_secs: u64,
    /// How long finished jobs and their artifacts are kept
    pub retention_secs: u64,
    /// Period of the purge task
    pub janitor_interval_secs: u64,
    /// Rows run through the rules by a preview
    pub preview_row_limit: usize,
    /// Rows inspected by type inference when reading raw input
    pub inference_sample_size: usize,
    /// Root directory of file-backed artifacts
    pub output_dir: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 64,
            job_timeout_secs: 300,
            retention_secs: 3600,
            janitor_interval_secs: 60,
            preview_row_limit: 200,
            inference_sample_size: 200,
            output_dir: base_dir().join("artifacts"),
        }
    }
}

impl ServiceSettings {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("worker_count", self.worker_count as u64),
            ("queue_capacity", self.queue_capacity as u64),
            ("job_timeout_secs", self.job_timeout_secs),
            ("janitor_interval_secs", self.janitor_interval_secs),
            ("preview_row_limit", self.preview_row_limit as u64),
            ("inference_sample_size", self.inference_sample_size as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(CleanserError::Config(format!("{name} must be greater than zero")));
        }
        Ok(())
    }

    /// Apply `CLEANSER_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from any key lookup (upper-case setting names).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
            raw.trim().parse().map_err(|_invalid| {
                CleanserError::Config(format!("{ENV_PREFIX}{key}: invalid value '{raw}'"))
            })
        }

        if let Some(v) = lookup("WORKER_COUNT") {
            self.worker_count = parse("WORKER_COUNT", &v)?;
        }
        if let Some(v) = lookup("QUEUE_CAPACITY") {
            self.queue_capacity = parse("QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("JOB_TIMEOUT_SECS") {
            self.job_timeout_secs = parse("JOB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("RETENTION_SECS") {
            self.retention_secs = parse("RETENTION_SECS", &v)?;
        }
        if let Some(v) = lookup("JANITOR_INTERVAL_SECS") {
            self.janitor_interval_secs = parse("JANITOR_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("PREVIEW_ROW_LIMIT") {
            self.preview_row_limit = parse("PREVIEW_ROW_LIMIT", &v)?;
        }
        if let Some(v) = lookup("INFERENCE_SAMPLE_SIZE") {
            self.inference_sample_size = parse("INFERENCE_SAMPLE_SIZE", &v)?;
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: ServiceSettings,
}

impl AppConfig {
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ServiceSettings {
        &mut self.settings
    }
}

/// `<data dir>/cleanser`, falling back to the working directory.
pub fn base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cleanser")
}

pub fn get_config_path() -> PathBuf {
    base_dir().join("config.json")
}

/// Load the config file, falling back to defaults when it is missing or unreadable.
pub fn load_app_config() -> AppConfig {
    load_app_config_from(&get_config_path())
}

pub fn load_app_config_from(path: &std::path::Path) -> AppConfig {
    if path.exists()
        && let Ok(content) = std::fs::read_to_string(path)
    {
        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Ignoring malformed config at {}: {e}", path.display());
            }
        }
    }
    AppConfig::default()
}

pub fn save_app_config(config: &AppConfig) -> Result<()> {
    save_app_config_to(config, &get_config_path())
}

pub fn save_app_config_to(config: &AppConfig, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
