//! External system integrations for gridstats.
//!
//! - [`fetch`] - HTTP and local-file retrieval with retry, rate limiting and
//!   an on-disk artifact cache
//! - [`sources`] - One parser per upstream format
//! - [`storage`] - Snapshot and state storage (trait-based, file backend)
//!
//! # Fetching
//!
//! ```rust,no_run
//! use gridstats::adapters::fetch::Fetcher;
//! use gridstats::config::load_config;
//! use gridstats::core::registry::SourceRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("gridstats.toml")?;
//! let registry = SourceRegistry::from_config(&config)?;
//! let fetcher = Fetcher::new(&config.fetch)?;
//!
//! for source in registry.all() {
//!     let artifact = fetcher.fetch(source).await?;
//!     println!("{}: {} bytes", source.key, artifact.bytes.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod fetch;
pub mod sources;
pub mod storage;
