//! Logging and observability
//!
//! Structured logging through `tracing`, plus a few macros that keep the
//! field names of recurring pipeline events consistent across modules.
//!
//! # Example
//!
//! ```no_run
//! use gridstats::logging::init_logging;
//! use gridstats::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(source = "ember", records = 1200, "Source adapted");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a pipeline run
///
/// ```no_run
/// use gridstats::log_run_start;
///
/// log_run_start!("3f1c", false, 4);
/// ```
#[macro_export]
macro_rules! log_run_start {
    ($run_id:expr, $full_rebuild:expr, $source_count:expr) => {
        tracing::info!(
            run_id = %$run_id,
            full_rebuild = $full_rebuild,
            sources = $source_count,
            "Starting pipeline run"
        );
    };
}

/// Log a source that will not contribute fresh data to this run
///
/// ```no_run
/// use gridstats::log_source_degraded;
///
/// log_source_degraded!("iea", "Malformed source 'iea': missing header");
/// ```
#[macro_export]
macro_rules! log_source_degraded {
    ($source_key:expr, $reason:expr) => {
        tracing::warn!(
            source = %$source_key,
            reason = %$reason,
            "Source degraded for this run"
        );
    };
}

/// Log a retry attempt
///
/// ```no_run
/// use gridstats::log_retry_attempt;
///
/// log_retry_attempt!("ember", 2, 3, 2000u64, "Server error: 503");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($source_key:expr, $attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            source = %$source_key,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying fetch"
        );
    };
}

/// Log a committed snapshot
///
/// ```no_run
/// use gridstats::log_snapshot_committed;
///
/// log_snapshot_committed!(7u64, 52_000usize, "ab12");
/// ```
#[macro_export]
macro_rules! log_snapshot_committed {
    ($version:expr, $records:expr, $checksum:expr) => {
        tracing::info!(
            version = $version,
            records = $records,
            checksum = %$checksum,
            "Snapshot committed"
        );
    };
}
