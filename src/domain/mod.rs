//! Domain models and types for gridstats.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`SourceKey`], [`CountryCode`], [`MetricId`])
//! - **Periods and units** ([`Period`], [`Unit`], [`Dimension`])
//! - **Records** ([`CanonicalRecord`], [`ReconciledRecord`], [`Provenance`])
//! - **Sources and artifacts** ([`Source`], [`FetchArtifact`])
//! - **Error types** ([`GridError`], [`FetchError`]) and the [`Result`] alias
//!
//! # Type Safety
//!
//! Identifiers are validated newtypes, so a record key can only be built from
//! a well-formed country code, metric and period:
//!
//! ```rust
//! use gridstats::domain::{CountryCode, MetricId, Period, RecordKey};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let key = RecordKey::new(
//!     CountryCode::new("FRA")?,
//!     MetricId::new("electricity.generation.nuclear")?,
//!     Period::year(2023)?,
//! );
//! assert_eq!(key.to_string(), "FRA/electricity.generation.nuclear/2023");
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod period;
pub mod record;
pub mod result;
pub mod snapshot;
pub mod source;
pub mod units;

// Re-export commonly used types for convenience
pub use errors::{FetchError, GridError};
pub use ids::{CountryCode, MetricId, SourceKey};
pub use period::Period;
pub use record::{
    Anomaly, CanonicalRecord, Conflict, Contribution, Provenance, RecordKey, ReconciledRecord,
    Resolution,
};
pub use result::Result;
pub use snapshot::{CandidateId, Snapshot};
pub use source::{
    AdapterKind, ArtifactFormat, ArtifactMeta, CacheStatus, FetchArtifact, FetchDescriptor,
    Source, TabularMapping, TransportStatus,
};
pub use units::{Dimension, Unit};
