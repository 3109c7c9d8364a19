//! Core business logic for gridstats.
//!
//! # Modules
//!
//! - [`registry`] - The configured set of sources and which are due
//! - [`normalize`] - Country resolution and annual roll-ups
//! - [`reconcile`] - One value per (country, metric, period)
//! - [`load`] - Atomic snapshot commits, rollback and queries
//! - [`state`] - Per-source watermarks and adapted-record caches
//! - [`verification`] - Content and record-set checksums
//! - [`pipeline`] - Run orchestration
//!
//! # Run Workflow
//!
//! 1. **Select**: pick due sources (or all, or the requested ones)
//! 2. **Fetch**: retrieve each artifact with retries and rate limiting
//! 3. **Adapt**: parse artifacts into canonical records, skipping unchanged ones
//! 4. **Reconcile**: merge candidates, recording conflicts and anomalies
//! 5. **Load**: write a candidate generation, verify it, switch "current"
//!
//! # Example
//!
//! ```rust,no_run
//! use gridstats::config::load_config;
//! use gridstats::core::pipeline::{Pipeline, RunRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("gridstats.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let pipeline = Pipeline::new(config, shutdown_rx).await?;
//! let report = pipeline.run(RunRequest::default()).await?;
//!
//! println!("Reconciled: {}", report.summary.reconciled_records);
//! println!("Exit code: {}", report.outcome.exit_code());
//! # Ok(())
//! # }
//! ```

pub mod load;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod state;
pub mod verification;
