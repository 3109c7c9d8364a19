// Gridstats - Electricity and energy statistics pipeline
// Copyright (c) 2025 Gridstats Contributors
// Licensed under the MIT License

//! # gridstats - electricity and energy statistics pipeline
//!
//! gridstats scrapes electricity-grid and energy-transition statistics for
//! many countries from heterogeneous public sources, normalizes them into
//! canonical records, reconciles overlapping values and commits the result
//! as an atomically published, versioned snapshot.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Registry, normalization, reconciliation, loading, state and
//!   run orchestration
//! - [`adapters`] - Fetching, per-source parsers and snapshot storage
//! - [`domain`] - Identifiers, records, snapshots and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridstats::config::load_config;
//! use gridstats::core::pipeline::{Pipeline, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("gridstats.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let pipeline = Pipeline::new(config, shutdown_rx).await?;
//!     let report = pipeline.run(RunRequest::default()).await?;
//!
//!     if let Some(snapshot) = report.outcome.snapshot() {
//!         println!("Committed snapshot {}", snapshot.version);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Reading Snapshots
//!
//! Presentation code reads the current snapshot and never writes:
//!
//! ```rust,no_run
//! use gridstats::adapters::storage::FileStore;
//! use gridstats::core::load::{SnapshotQuery, SnapshotView};
//! use gridstats::domain::CountryCode;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileStore::open("data/store").await?;
//! if let Some(view) = SnapshotView::current(&store).await? {
//!     let query = SnapshotQuery::new()
//!         .country(CountryCode::new("DEU")?)
//!         .metric_prefix("electricity.generation");
//!     for record in view.query(&query) {
//!         println!("{} {} {}", record.metric, record.period, record.value);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::Result`] with [`domain::GridError`];
//! the CLI maps outcomes onto exit codes with `anyhow` at the boundary.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
