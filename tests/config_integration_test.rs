//! Integration tests for configuration loading and validation
//!
//! Tests that touch environment variables hold `ENV_MUTEX`.

use gridstats::config::{load_config, Environment};
use gridstats::domain::GridError;
use secrecy::ExposeSecret;
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn cleanup_env_vars() {
    std::env::remove_var("GRIDSTATS_APPLICATION_LOG_LEVEL");
    std::env::remove_var("GRIDSTATS_APPLICATION_DRY_RUN");
    std::env::remove_var("GRIDSTATS_PIPELINE_PARALLELISM");
    std::env::remove_var("GRIDSTATS_RECONCILE_TOLERANCE");
    std::env::remove_var("GRIDSTATS_RECONCILE_DERIVE_TRENDS");
    std::env::remove_var("GRIDSTATS_STORE_PATH");
    std::env::remove_var("GRIDSTATS_SOURCE_EMBER_API_KEY");
    std::env::remove_var("TEST_EMBER_API_KEY");
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const COMPLETE: &str = r#"
environment = "staging"

[application]
log_level = "debug"
dry_run = true

[pipeline]
parallelism = 8
stale_fallback = false

[fetch]
timeout_seconds = 10
cache_dir = "/tmp/gridstats/cache"

[fetch.retry]
max_attempts = 5
initial_delay_ms = 200
max_delay_ms = 2000
backoff_multiplier = 3.0

[reconcile]
tolerance = 0.05
require_agreement = true
derive_annual_totals = false
derive_trends = false

[normalize.country_aliases]
"Kosovo" = "XKX"

[store]
path = "/tmp/gridstats/store"
retain_snapshots = 2
write_batch_size = 100

[logging]
local_enabled = true
local_path = "/tmp/gridstats/logs"
local_rotation = "hourly"

[[sources]]
key = "ember"
name = "Ember"
location = "https://api.ember-energy.org/v1/electricity-generation/monthly"
adapter = "ember_monthly"
trust_rank = 2
refresh_hours = 12
min_interval_ms = 500

[[sources]]
key = "national"
location = "/srv/data/national.csv"
adapter = "tabular_csv"
enabled = false

[sources.tabular]
country_column = "iso3"
period_column = "period"
value_column = "value"
metric_column = "metric"
unit_column = "unit"
delimiter = ";"
"#;

#[test]
fn test_load_complete_config() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let file = write_config(COMPLETE);

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.environment, Environment::Staging);
    assert_eq!(config.application.log_level, "debug");
    assert!(config.application.dry_run);
    assert_eq!(config.pipeline.parallelism, 8);
    assert!(!config.pipeline.stale_fallback);
    assert_eq!(config.fetch.retry.max_attempts, 5);
    assert_eq!(config.reconcile.tolerance, 0.05);
    assert!(config.reconcile.require_agreement);
    assert!(!config.reconcile.derive_annual_totals);
    assert!(!config.reconcile.derive_trends);
    assert_eq!(config.normalize.country_aliases["Kosovo"], "XKX");
    assert_eq!(config.store.retain_snapshots, 2);
    assert_eq!(config.logging.local_rotation, "hourly");
    assert_eq!(config.sources.len(), 2);
    assert_eq!(config.sources[0].refresh_hours, 12);
    let tabular = config.sources[1].tabular.as_ref().unwrap();
    assert_eq!(tabular.delimiter, ';');
}

#[test]
fn test_defaults_applied() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let file = write_config(
        r#"
[[sources]]
key = "iea"
location = "data/iea.csv"
adapter = "iea_balances"
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.environment, Environment::Development);
    assert_eq!(config.application.log_level, "info");
    assert!(!config.application.dry_run);
    assert_eq!(config.pipeline.parallelism, 4);
    assert!(config.pipeline.stale_fallback);
    assert_eq!(config.reconcile.tolerance, 0.02);
    assert!(!config.reconcile.require_agreement);
    assert_eq!(config.store.retain_snapshots, 5);
    assert_eq!(config.fetch.retry.max_attempts, 3);
    assert!(config.sources[0].enabled);
}

#[test]
fn test_env_var_substitution() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_EMBER_API_KEY", "from-env");
    let file = write_config(
        r#"
[[sources]]
key = "ember"
location = "https://api.ember-energy.org/v1/electricity-generation/monthly"
adapter = "ember_monthly"
# api_key = "${NOT_SET_BUT_COMMENTED}"
api_key = "${TEST_EMBER_API_KEY}"
"#,
    );

    let config = load_config(file.path()).unwrap();
    cleanup_env_vars();

    let key = config.sources[0].api_key.as_ref().unwrap();
    assert_eq!(key.expose_secret().as_str(), "from-env");
}

#[test]
fn test_missing_env_var_is_an_error() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let file = write_config(
        r#"
[[sources]]
key = "ember"
location = "https://api.ember-energy.org/v1/electricity-generation/monthly"
adapter = "ember_monthly"
api_key = "${TEST_EMBER_API_KEY}"
"#,
    );

    let err = load_config(file.path()).unwrap_err();

    assert!(matches!(err, GridError::Configuration(_)));
    assert!(err.to_string().contains("TEST_EMBER_API_KEY"));
}

#[test]
fn test_env_overrides() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("GRIDSTATS_APPLICATION_LOG_LEVEL", "warn");
    std::env::set_var("GRIDSTATS_PIPELINE_PARALLELISM", "2");
    std::env::set_var("GRIDSTATS_STORE_PATH", "/var/lib/gridstats");
    std::env::set_var("GRIDSTATS_SOURCE_EMBER_API_KEY", "override");
    std::env::set_var("GRIDSTATS_RECONCILE_DERIVE_TRENDS", "true");
    let file = write_config(COMPLETE);

    let config = load_config(file.path());
    cleanup_env_vars();
    let config = config.unwrap();

    assert_eq!(config.application.log_level, "warn");
    assert_eq!(config.pipeline.parallelism, 2);
    assert_eq!(config.store.path, "/var/lib/gridstats");
    assert!(config.reconcile.derive_trends);
    let key = config.sources[0].api_key.as_ref().unwrap();
    assert_eq!(key.expose_secret().as_str(), "override");
}

#[test]
fn test_validation_failures() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let cases = [
        ("", "At least one"),
        (
            "[reconcile]\ntolerance = 1.5\n[[sources]]\nkey = \"a\"\nlocation = \"a.csv\"\nadapter = \"iea_balances\"\n",
            "tolerance",
        ),
        (
            "[[sources]]\nkey = \"a\"\nlocation = \"a.csv\"\nadapter = \"html_table\"\n",
            "Unknown adapter",
        ),
        (
            "[[sources]]\nkey = \"a\"\nlocation = \"a.csv\"\nadapter = \"tabular_csv\"\n",
            "tabular",
        ),
        (
            "[[sources]]\nkey = \"a\"\nlocation = \"a.csv\"\nadapter = \"iea_balances\"\n[[sources]]\nkey = \"a\"\nlocation = \"b.csv\"\nadapter = \"iea_balances\"\n",
            "Duplicate",
        ),
        (
            "environment = \"production\"\n[[sources]]\nkey = \"a\"\nlocation = \"http://example.com/a.csv\"\nadapter = \"iea_balances\"\n",
            "plain http",
        ),
    ];

    for (contents, expected) in cases {
        let file = write_config(contents);
        let err = load_config(file.path()).unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "expected '{expected}' in '{err}'"
        );
    }
}

#[test]
fn test_missing_file() {
    let err = load_config("/nonexistent/gridstats.toml").unwrap_err();
    assert!(err.to_string().contains("not found"));
}
