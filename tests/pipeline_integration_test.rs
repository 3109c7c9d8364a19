//! End-to-end pipeline runs against local file sources
//!
//! Each test gets its own temporary directory holding the source files, the
//! artifact cache and the snapshot store.

use gridstats::adapters::fetch::Fetcher;
use gridstats::adapters::storage::{FileStore, SnapshotStore, StateStorage};
use gridstats::config::{parse_config, GridConfig};
use gridstats::core::load::{SnapshotQuery, SnapshotView};
use gridstats::core::pipeline::{
    Pipeline, RunOutcome, RunReport, RunRequest, SourceDisposition,
};
use gridstats::domain::{CountryCode, MetricId, Period, RecordKey, Resolution, SourceKey};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

const EMBER_JSON: &str = r#"{"data": [
  {"entity": "Germany", "entity_code": "DEU", "is_aggregate_entity": false, "date": "2024-01-01",
   "series": "Wind", "generation_twh": 14.2, "share_of_generation_pct": 31.5},
  {"entity": "France", "entity_code": "FRA", "is_aggregate_entity": false, "date": "2024-01-01",
   "series": "Nuclear", "generation_twh": 33.1, "share_of_generation_pct": 70.2},
  {"entity": "EU", "entity_code": null, "is_aggregate_entity": true, "date": "2024-01-01",
   "series": "Wind", "generation_twh": 50.0, "share_of_generation_pct": 20.0}
]}"#;

const IEA_CSV: &str = "Source: IEA World Energy Balances\n\
Country,Product,Flow,2022,2023\n\
France,Electricity,\"Electricity, CHP and heat plants (PJ)\",1656,1764\n\
Korea,Natural gas,Total energy supply (PJ),2160,2100\n";

// Annual totals, TWh: FRA 2023 disagrees with IEA (1764 PJ = 490 TWh)
const NATIONAL_CSV: &str = "country,year,value\n\
FRA,2023,515\n\
ESP,2023,270\n";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let workspace = Self { dir };
        workspace.write("ember.json", EMBER_JSON);
        workspace.write("iea.csv", IEA_CSV);
        workspace.write("national.csv", NATIONAL_CSV);
        workspace
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.path().join(name), contents).unwrap();
    }

    fn config(&self, extra: &str) -> GridConfig {
        let root = self.path().display();
        parse_config(&format!(
            r#"
{extra}

[fetch]
cache_dir = "{root}/cache"

[store]
path = "{root}/store"
retain_snapshots = 3

[[sources]]
key = "ember"
location = "{root}/ember.json"
adapter = "ember_monthly"
trust_rank = 2

[[sources]]
key = "iea"
location = "{root}/iea.csv"
adapter = "iea_balances"
trust_rank = 1

[[sources]]
key = "national"
location = "{root}/national.csv"
adapter = "tabular_csv"
trust_rank = 3

[sources.tabular]
country_column = "country"
period_column = "year"
value_column = "value"
metric = "electricity.generation.total"
unit = "TWh"
"#
        ))
        .unwrap()
    }

    async fn store(&self) -> Arc<FileStore> {
        Arc::new(FileStore::open(self.path().join("store")).await.unwrap())
    }

    async fn pipeline_with(&self, extra: &str) -> Pipeline {
        let config = self.config(extra);
        let store = self.store().await;
        let fetcher = Fetcher::new(&config.fetch).unwrap();
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the whole test
        std::mem::forget(tx);
        Pipeline::with_components(config, fetcher, store.clone(), store, rx).unwrap()
    }

    async fn pipeline(&self) -> Pipeline {
        self.pipeline_with("").await
    }
}

fn keys(names: &[&str]) -> Option<Vec<SourceKey>> {
    Some(names.iter().map(|n| SourceKey::new(*n).unwrap()).collect())
}

fn disposition(report: &RunReport, key: &str) -> SourceDisposition {
    report
        .summary
        .sources
        .iter()
        .find(|s| s.source_key.as_str() == key)
        .unwrap()
        .disposition
}

fn fra_2023_total() -> RecordKey {
    RecordKey::new(
        CountryCode::new("FRA").unwrap(),
        MetricId::new("electricity.generation.total").unwrap(),
        Period::year(2023).unwrap(),
    )
}

#[tokio::test]
async fn test_first_run_commits_all_sources() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;

    let report = pipeline.run(RunRequest::default()).await.unwrap();

    assert_eq!(report.outcome.exit_code(), 0);
    let snapshot = report.outcome.snapshot().unwrap().clone();
    assert_eq!(snapshot.version, 1);
    assert!(report.summary.degraded.is_empty());

    let store = ws.store().await;
    let view = SnapshotView::current(store.as_ref()).await.unwrap().unwrap();
    assert_eq!(view.snapshot(), &snapshot);
    assert_eq!(view.len(), snapshot.record_count);

    // Aggregate rows never make it in
    let wind = view.query(&SnapshotQuery::new().metric_prefix("electricity.generation.wind"));
    assert_eq!(wind.len(), 1);
    assert_eq!(wind[0].country.as_str(), "DEU");
}

#[tokio::test]
async fn test_conflict_resolved_by_trust_rank_with_provenance() {
    let ws = Workspace::new();
    let report = ws.pipeline().await.run(RunRequest::default()).await.unwrap();
    assert!(report.summary.conflicts >= 1);

    let store = ws.store().await;
    let view = SnapshotView::current(store.as_ref()).await.unwrap().unwrap();
    let record = view.get(&fra_2023_total()).unwrap();

    assert!((record.value - 490.0).abs() < 1e-6);
    assert_eq!(record.provenance.chosen_source.as_str(), "iea");
    assert_eq!(record.provenance.resolution, Resolution::TrustRank);
    assert_eq!(record.provenance.contributors.len(), 2);
    let conflict = record.provenance.conflict.as_ref().unwrap();
    assert_eq!(conflict.dissenting_sources[0].as_str(), "national");
}

#[tokio::test]
async fn test_full_rebuilds_are_idempotent() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;
    let full = RunRequest {
        full_rebuild: true,
        ..Default::default()
    };

    let first = pipeline.run(full.clone()).await.unwrap();
    let second = pipeline.run(full).await.unwrap();

    let first = first.outcome.snapshot().unwrap();
    let second = second.outcome.snapshot().unwrap();
    assert_eq!(second.version, first.version + 1);
    assert_eq!(first.checksum, second.checksum);
    assert_eq!(first.record_count, second.record_count);
}

#[tokio::test]
async fn test_unchanged_content_short_circuits_adapter() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;

    let first = pipeline.run(RunRequest::default()).await.unwrap();
    let second = pipeline
        .run(RunRequest {
            sources: keys(&["ember", "iea", "national"]),
            ..Default::default()
        })
        .await
        .unwrap();

    for key in ["ember", "iea", "national"] {
        assert_eq!(disposition(&second, key), SourceDisposition::Unchanged);
    }
    assert_eq!(
        first.outcome.snapshot().unwrap().checksum,
        second.outcome.snapshot().unwrap().checksum
    );
}

#[tokio::test]
async fn test_sources_not_due_reuse_adapted_records() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;

    let first = pipeline.run(RunRequest::default()).await.unwrap();
    // Nothing is due again within the default 24h refresh interval
    let second = pipeline.run(RunRequest::default()).await.unwrap();

    for key in ["ember", "iea", "national"] {
        assert_eq!(disposition(&second, key), SourceDisposition::Reused);
    }
    assert_eq!(
        first.outcome.snapshot().unwrap().checksum,
        second.outcome.snapshot().unwrap().checksum
    );
}

#[tokio::test]
async fn test_malformed_source_degrades_only_itself() {
    let ws = Workspace::new();
    ws.write("ember.json", r#"{"rows": "not what the adapter expects"}"#);
    let pipeline = ws.pipeline().await;

    let report = pipeline.run(RunRequest::default()).await.unwrap();

    match &report.outcome {
        RunOutcome::CommittedWithDegradedSources(snapshot, degraded) => {
            assert_eq!(degraded.len(), 1);
            assert_eq!(degraded[0].source_key.as_str(), "ember");
            assert_eq!(snapshot.degraded_sources, vec![SourceKey::new("ember").unwrap()]);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(report.outcome.exit_code(), 1);
    assert_eq!(disposition(&report, "ember"), SourceDisposition::Degraded);

    let store = ws.store().await;
    let view = SnapshotView::current(store.as_ref()).await.unwrap().unwrap();
    assert!(view.get(&fra_2023_total()).is_some());
    assert!(view
        .records()
        .iter()
        .all(|r| r.provenance.chosen_source.as_str() != "ember"));
}

#[tokio::test]
async fn test_failed_source_falls_back_to_last_adapted_records() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;
    let first = pipeline.run(RunRequest::default()).await.unwrap();

    std::fs::remove_file(ws.path().join("ember.json")).unwrap();
    let second = pipeline
        .run(RunRequest {
            sources: keys(&["ember"]),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(disposition(&second, "ember"), SourceDisposition::StaleFallback);
    assert_eq!(second.outcome.exit_code(), 1);
    assert_eq!(
        first.outcome.snapshot().unwrap().checksum,
        second.outcome.snapshot().unwrap().checksum
    );
}

#[tokio::test]
async fn test_full_rebuild_drops_stale_data_of_failed_source() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;
    pipeline.run(RunRequest::default()).await.unwrap();

    std::fs::remove_file(ws.path().join("ember.json")).unwrap();
    let report = pipeline
        .run(RunRequest {
            full_rebuild: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(disposition(&report, "ember"), SourceDisposition::Degraded);
    let store = ws.store().await;
    let view = SnapshotView::current(store.as_ref()).await.unwrap().unwrap();
    assert!(view
        .query(&SnapshotQuery::new().metric_prefix("electricity.share"))
        .is_empty());
}

#[tokio::test]
async fn test_partial_run_fetches_only_requested_sources() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;
    pipeline.run(RunRequest::default()).await.unwrap();

    ws.write("national.csv", "country,year,value\nFRA,2023,491\nESP,2023,270\n");
    let report = pipeline
        .run(RunRequest {
            sources: keys(&["national"]),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(disposition(&report, "national"), SourceDisposition::Fetched);
    assert_eq!(disposition(&report, "ember"), SourceDisposition::Reused);
    assert_eq!(disposition(&report, "iea"), SourceDisposition::Reused);

    // 491 is within 2% of 490: corroborated now
    let store = ws.store().await;
    let view = SnapshotView::current(store.as_ref()).await.unwrap().unwrap();
    let record = view.get(&fra_2023_total()).unwrap();
    assert_eq!(record.provenance.resolution, Resolution::Corroborated);
    assert!(record.provenance.conflict.is_none());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;

    let report = pipeline
        .run(RunRequest {
            dry_run: true,
            ..Default::default()
        })
        .await
        .unwrap();

    match report.outcome {
        RunOutcome::DryRun { records, ref degraded } => {
            assert!(records > 0);
            assert!(degraded.is_empty());
        }
        ref other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(report.outcome.exit_code(), 0);

    let store = ws.store().await;
    assert!(store.current().await.unwrap().is_none());
    let ember = SourceKey::new("ember").unwrap();
    assert!(store.load_watermark(&ember).await.unwrap().is_none());
    assert!(store.load_adapted(&ember).await.unwrap().is_none());
    assert!(store.list_runs(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_from_config() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline_with("[application]\ndry_run = true").await;

    let report = pipeline.run(RunRequest::default()).await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::DryRun { .. }));
}

#[tokio::test]
async fn test_all_sources_failing_keeps_previous_snapshot() {
    let ws = Workspace::new();
    let pipeline = ws.pipeline().await;
    let first = pipeline.run(RunRequest::default()).await.unwrap();
    let committed = first.outcome.snapshot().unwrap().clone();

    for name in ["ember.json", "iea.csv", "national.csv"] {
        std::fs::remove_file(ws.path().join(name)).unwrap();
    }
    let report = pipeline
        .run(RunRequest {
            full_rebuild: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(matches!(report.outcome, RunOutcome::Failed(_)));
    assert_eq!(report.outcome.exit_code(), 5);
    let store = ws.store().await;
    assert_eq!(store.current().await.unwrap(), Some(committed));
}

/// Two years of German monthly generation: wind, solar and coal, the
/// overlapping "Renewables" aggregate, and net imports
fn ember_two_years() -> String {
    let mut rows = Vec::new();
    for (year, wind, solar, coal) in [(2023, 10.0, 5.0, 25.0), (2024, 12.0, 6.0, 22.0)] {
        for month in 1..=12 {
            for (series, aggregate, twh) in [
                ("Wind", false, wind),
                ("Solar", false, solar),
                ("Coal", false, coal),
                ("Renewables", true, wind + solar),
                ("Net imports", false, 3.0),
            ] {
                rows.push(format!(
                    r#"{{"entity": "Germany", "entity_code": "DEU", "date": "{year}-{month:02}-01", "series": "{series}", "is_aggregate_series": {aggregate}, "generation_twh": {twh}}}"#
                ));
            }
        }
    }
    format!(r#"{{"data": [{}]}}"#, rows.join(",\n"))
}

fn deu(metric: &str, period: &str) -> RecordKey {
    RecordKey::new(
        CountryCode::new("DEU").unwrap(),
        MetricId::new(metric).unwrap(),
        period.parse().unwrap(),
    )
}

#[tokio::test]
async fn test_derived_metrics_follow_current_configuration() {
    let ws = Workspace::new();
    ws.write("ember.json", &ember_two_years());
    ws.pipeline().await.run(RunRequest::default()).await.unwrap();

    let store = ws.store().await;
    let view = SnapshotView::current(store.as_ref()).await.unwrap().unwrap();
    let value = |metric: &str, period: &str| view.get(&deu(metric, period)).map(|r| r.value);
    let close = |actual: Option<f64>, expected: f64| {
        let actual = actual.unwrap();
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    };

    // Aggregate series and net imports stay out of the total
    close(value("electricity.generation.total", "2024-01"), 40.0);
    close(value("electricity.share.low_carbon", "2024-01"), 45.0);
    close(value("electricity.generation.total", "2023"), 480.0);
    close(value("electricity.share.low_carbon", "2023"), 37.5);
    close(value("electricity.generation_yoy.wind", "2024-01"), 20.0);
    close(value("electricity.generation_yoy.wind", "2024"), 20.0);
    close(value("electricity.generation_ttm.wind", "2024-12"), 144.0);
    close(value("electricity.generation_ttm_yoy.wind", "2024-12"), 20.0);
    close(value("electricity.share_ttm.low_carbon", "2024-12"), 45.0);
    assert!(view.is_complete_year(
        &CountryCode::new("DEU").unwrap(),
        &MetricId::new("electricity.generation.total").unwrap(),
        2024
    ));
    let ttm = view.get(&deu("electricity.generation_ttm.wind", "2024-12")).unwrap();
    assert!(ttm.provenance.contributors[0].derived);

    // The next run reuses the cached adapter output without re-deriving the
    // metrics this configuration turns off
    let report = ws
        .pipeline_with("[reconcile]\nderive_annual_totals = false\nderive_trends = false")
        .await
        .run(RunRequest::default())
        .await
        .unwrap();
    assert_eq!(disposition(&report, "ember"), SourceDisposition::Reused);

    let view = SnapshotView::current(store.as_ref()).await.unwrap().unwrap();
    assert!(view.get(&deu("electricity.generation.total", "2023")).is_none());
    assert!(view.get(&deu("electricity.generation_ttm.wind", "2024-12")).is_none());
    assert!(view.get(&deu("electricity.generation_yoy.wind", "2024-01")).is_none());
    assert!(view.get(&deu("electricity.share.low_carbon", "2024-01")).is_some());
}
