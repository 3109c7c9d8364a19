//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::GridConfig;
use super::secret::secret_string;
use crate::domain::errors::GridError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`GridConfig`]
/// 4. Applies environment variable overrides (`GRIDSTATS_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`GridError::Configuration`] if any of these steps fails.
///
/// # Examples
///
/// ```no_run
/// use gridstats::config::loader::load_config;
///
/// let config = load_config("gridstats.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<GridConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(GridError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        GridError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config = parse_config(&contents)?;

    tracing::debug!(
        path = %path.display(),
        sources = config.sources.len(),
        "Configuration loaded"
    );

    Ok(config)
}

/// Parses and validates configuration from TOML text
///
/// Same pipeline as [`load_config`] minus the file read.
pub fn parse_config(contents: &str) -> Result<GridConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: GridConfig = toml::from_str(&contents)
        .map_err(|e| GridError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        GridError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are passed through untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| GridError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(GridError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the `GRIDSTATS_*` prefix
///
/// Section settings follow `GRIDSTATS_<SECTION>_<KEY>`, e.g.
/// `GRIDSTATS_STORE_PATH`. Source API keys follow
/// `GRIDSTATS_SOURCE_<KEY>_API_KEY` with the source key upper-cased and `-`
/// replaced by `_`.
fn apply_env_overrides(config: &mut GridConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("GRIDSTATS_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("GRIDSTATS_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    // Pipeline overrides
    if let Ok(val) = std::env::var("GRIDSTATS_PIPELINE_PARALLELISM") {
        if let Ok(parallelism) = val.parse() {
            config.pipeline.parallelism = parallelism;
        }
    }
    if let Ok(val) = std::env::var("GRIDSTATS_PIPELINE_STALE_FALLBACK") {
        config.pipeline.stale_fallback = val.parse().unwrap_or(true);
    }

    // Fetch overrides
    if let Ok(val) = std::env::var("GRIDSTATS_FETCH_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.fetch.timeout_seconds = timeout;
        }
    }
    if let Ok(val) = std::env::var("GRIDSTATS_FETCH_CACHE_DIR") {
        config.fetch.cache_dir = val;
    }
    if let Ok(val) = std::env::var("GRIDSTATS_FETCH_RETRY_MAX_ATTEMPTS") {
        if let Ok(attempts) = val.parse() {
            config.fetch.retry.max_attempts = attempts;
        }
    }

    // Reconcile overrides
    if let Ok(val) = std::env::var("GRIDSTATS_RECONCILE_TOLERANCE") {
        if let Ok(tolerance) = val.parse() {
            config.reconcile.tolerance = tolerance;
        }
    }
    if let Ok(val) = std::env::var("GRIDSTATS_RECONCILE_REQUIRE_AGREEMENT") {
        config.reconcile.require_agreement = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("GRIDSTATS_RECONCILE_DERIVE_ANNUAL_TOTALS") {
        config.reconcile.derive_annual_totals = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("GRIDSTATS_RECONCILE_DERIVE_TRENDS") {
        config.reconcile.derive_trends = val.parse().unwrap_or(true);
    }

    // Store overrides
    if let Ok(val) = std::env::var("GRIDSTATS_STORE_PATH") {
        config.store.path = val;
    }
    if let Ok(val) = std::env::var("GRIDSTATS_STORE_RETAIN_SNAPSHOTS") {
        if let Ok(retain) = val.parse() {
            config.store.retain_snapshots = retain;
        }
    }

    // Logging overrides
    if let Ok(val) = std::env::var("GRIDSTATS_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("GRIDSTATS_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    // Per-source API keys
    for source in &mut config.sources {
        let var = source_api_key_var(&source.key);
        if let Ok(val) = std::env::var(&var) {
            tracing::debug!(source = %source.key, env_var = %var, "Using API key from environment");
            source.api_key = Some(secret_string(val));
        }
    }

    Ok(())
}

/// Environment variable carrying the API key of a source
pub fn source_api_key_var(source_key: &str) -> String {
    format!(
        "GRIDSTATS_SOURCE_{}_API_KEY",
        source_key.to_ascii_uppercase().replace('-', "_")
    )
}
