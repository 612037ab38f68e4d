//! # Cleanser - Rule-Driven Data Cleaning
//!
//! Cleanser applies declarative cleaning rules to tabular data and exports
//! the result. Rules are checked against the dataset before anything runs,
//! then executed either synchronously (previews) or as queued jobs on a
//! bounded worker pool.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cleanser::dataset::io::read_csv;
//! use cleanser::export::{ExportAdapter, ExportOptions};
//! use cleanser::pipeline::{NoopObserver, RuleSet, prepare, run_pipeline};
//!
//! # fn example() -> cleanser::error::Result<()> {
//! let dataset = read_csv("data.csv", 200)?;
//! let rules = RuleSet::from_file("rules.json")?;
//!
//! let plan = prepare(&rules, &dataset)?;
//! let output = run_pipeline(dataset, &plan, &NoopObserver)?;
//! println!("{}", output.report.summary());
//!
//! let artifact = ExportAdapter::default().export(&output.dataset, &ExportOptions::default())?;
//! std::fs::write(&artifact.file_name, &artifact.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`dataset`]: typed values, columns and type inference
//! - [`pipeline`]: rule sets, normalization and the cleaning stages
//! - [`export`]: CSV, JSON and Parquet writers behind a codec registry
//! - [`jobs`]: job queue, worker pool and status tracking
//! - [`config`]: service settings
//! - [`error`]: error types and handling utilities
//! - [`logging`]: tracing setup
//!
//! ## Errors
//!
//! Row-level problems never fail a run; they come back as
//! [`ValidationWarning`](pipeline::ValidationWarning)s. Invalid rules, I/O
//! failures and timeouts are [`CleanserError`](error::CleanserError)s.

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod utils;
