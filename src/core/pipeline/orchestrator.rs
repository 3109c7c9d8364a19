//! Pipeline orchestrator
//!
//! Drives one run through fetch, adapt, reconcile and load. Sources are
//! processed concurrently with bounded parallelism; a failing source only
//! degrades itself. Nothing is committed unless the run gets all the way
//! through reconciliation without being cancelled.

use super::run_state::{RunRecord, RunState};
use super::summary::{
    DegradedSource, RunOutcome, RunReport, RunSummary, SourceDisposition, SourceReport,
};
use crate::adapters::fetch::Fetcher;
use crate::adapters::sources::adapter_for;
use crate::adapters::storage::open_store;
use crate::adapters::storage::traits::{SnapshotStore, StateStorage};
use crate::config::GridConfig;
use crate::core::load::Loader;
use crate::core::normalize::{derive_metrics, CountryResolver, DeriveOptions};
use crate::core::reconcile::Reconciler;
use crate::core::registry::SourceRegistry;
use crate::core::state::{AdaptedRecords, SourceWatermark, StateManager};
use crate::domain::ids::SourceKey;
use crate::domain::record::CanonicalRecord;
use crate::domain::source::Source;
use crate::domain::{GridError, Result};
use crate::{log_run_start, log_source_degraded};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// What a run should do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Re-fetch and re-parse every source, ignoring refresh intervals,
    /// unchanged-content short-circuits and stale fallback
    pub full_rebuild: bool,
    /// Only re-fetch these sources; the others contribute their last
    /// adapted records
    pub sources: Option<Vec<SourceKey>>,
    /// Stop after reconciliation; write nothing to the store
    pub dry_run: bool,
}

/// Per-source result of the fetch and adapt stage
struct SourceResult {
    report: SourceReport,
    records: Vec<CanonicalRecord>,
    degraded: Option<DegradedSource>,
}

pub struct Pipeline {
    config: GridConfig,
    registry: SourceRegistry,
    fetcher: Fetcher,
    countries: CountryResolver,
    reconciler: Reconciler,
    loader: Loader,
    state: StateManager,
    shutdown: watch::Receiver<bool>,
}

impl Pipeline {
    /// Build a pipeline from configuration, opening the configured store
    pub async fn new(config: GridConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let (snapshots, state) = open_store(&config.store).await?;
        let fetcher = Fetcher::new(&config.fetch)?;
        Self::with_components(config, fetcher, snapshots, state, shutdown)
    }

    /// Build a pipeline around explicit components
    pub fn with_components(
        config: GridConfig,
        fetcher: Fetcher,
        snapshots: Arc<dyn SnapshotStore + Send + Sync>,
        state: Arc<dyn StateStorage + Send + Sync>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let registry = SourceRegistry::from_config(&config)?;
        let countries = CountryResolver::new(&config.normalize.country_aliases)?;
        let reconciler = Reconciler::from_config(&config.reconcile);
        let loader = Loader::new(snapshots, &config.store);

        Ok(Self {
            registry,
            fetcher,
            countries,
            reconciler,
            loader,
            state: StateManager::new_with_storage(state),
            shutdown,
            config,
        })
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Execute one run
    ///
    /// # Errors
    ///
    /// Returns an error only when the request itself is invalid (e.g. an
    /// unknown source key). Failures during the run are reported through
    /// [`RunOutcome::Failed`].
    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        let started = Instant::now();
        let dry_run = request.dry_run || self.config.application.dry_run;

        if let Some(keys) = &request.sources {
            for key in keys {
                self.registry.get(key)?;
            }
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let mut run = RunRecord::new(
            run_id.clone(),
            request.full_rebuild,
            request.sources.clone(),
            dry_run,
        );
        let mut summary = RunSummary::new(&run_id);

        let targets = self.select_targets(&request).await?;
        log_run_start!(run_id, request.full_rebuild, targets.len());

        let outcome = self
            .execute(&request, dry_run, &targets, &mut run, &mut summary)
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Run failed");
                RunOutcome::Failed(e.to_string())
            }
        };

        let final_state = match &outcome {
            RunOutcome::Committed(_) | RunOutcome::CommittedWithDegradedSources(..) => {
                RunState::Committed
            }
            RunOutcome::DryRun { .. } => RunState::DryRun,
            RunOutcome::Failed(_) => RunState::Failed,
            RunOutcome::Cancelled => RunState::Cancelled,
        };
        if run.state != final_state {
            run.transition(final_state)?;
        }

        let summary = summary.with_duration(started.elapsed());
        summary.log_summary();

        if !dry_run {
            run.summary = Some(summary.clone());
            if let Err(e) = self.state.record_run(&run).await {
                tracing::warn!(run_id = %run_id, error = %e, "Failed to persist run record");
            }
        }

        Ok(RunReport { outcome, summary })
    }

    async fn select_targets(&self, request: &RunRequest) -> Result<Vec<Source>> {
        let targets: Vec<&Source> = match &request.sources {
            Some(keys) => {
                let wanted: BTreeSet<&SourceKey> = keys.iter().collect();
                self.registry
                    .all()
                    .into_iter()
                    .filter(|s| wanted.contains(&s.key))
                    .collect()
            }
            None if request.full_rebuild => self.registry.all(),
            None => {
                let last_success = self.state.last_success_map().await?;
                self.registry.list_due_sources(Utc::now(), &last_success)
            }
        };
        Ok(targets.into_iter().cloned().collect())
    }

    async fn execute(
        &self,
        request: &RunRequest,
        dry_run: bool,
        targets: &[Source],
        run: &mut RunRecord,
        summary: &mut RunSummary,
    ) -> Result<RunOutcome> {
        run.transition(RunState::Fetching)?;

        let mut results: Vec<SourceResult> = stream::iter(targets)
            .map(|source| self.process_source(source, request.full_rebuild, dry_run))
            .buffer_unordered(self.config.pipeline.parallelism.max(1))
            .collect()
            .await;

        if self.is_cancelled() {
            tracing::warn!("Run cancelled during fetch; nothing committed");
            results.sort_by(|a, b| a.report.source_key.cmp(&b.report.source_key));
            summary.sources = results.into_iter().map(|r| r.report).collect();
            return Ok(RunOutcome::Cancelled);
        }

        run.transition(RunState::Adapting)?;

        let targeted: BTreeSet<&SourceKey> = targets.iter().map(|s| &s.key).collect();
        for source in self.registry.all() {
            if !targeted.contains(&source.key) {
                results.push(self.reuse_source(source).await?);
            }
        }
        results.sort_by(|a, b| a.report.source_key.cmp(&b.report.source_key));

        let mut candidates = Vec::new();
        for result in results {
            candidates.extend(result.records);
            if let Some(degraded) = result.degraded {
                summary.degraded.push(degraded);
            }
            summary.sources.push(result.report);
        }
        summary.candidate_records = candidates.len();

        if candidates.is_empty() {
            return Ok(RunOutcome::Failed(
                "No records available from any source".to_string(),
            ));
        }

        run.transition(RunState::Reconciling)?;
        let reconciled = self.reconciler.reconcile(candidates)?;
        summary.reconciled_records = reconciled.records.len();
        summary.conflicts = reconciled.conflict_count();
        summary.anomalies = reconciled.anomaly_count();
        summary.unresolved = reconciled
            .unresolved
            .iter()
            .map(|u| u.to_error().to_string())
            .collect();

        if dry_run {
            tracing::info!(records = reconciled.records.len(), "Dry run; skipping load");
            return Ok(RunOutcome::DryRun {
                records: reconciled.records.len(),
                degraded: summary.degraded.clone(),
            });
        }

        if self.is_cancelled() {
            tracing::warn!("Run cancelled before load; nothing committed");
            return Ok(RunOutcome::Cancelled);
        }

        run.transition(RunState::Loading)?;
        let snapshot = self
            .loader
            .commit(&run.run_id, &reconciled.records, summary.degraded_keys())
            .await?;
        summary.snapshot_version = Some(snapshot.version);
        summary.checksum = Some(snapshot.checksum.clone());
        run.transition(RunState::Committed)?;

        if summary.degraded.is_empty() {
            Ok(RunOutcome::Committed(snapshot))
        } else {
            Ok(RunOutcome::CommittedWithDegradedSources(
                snapshot,
                summary.degraded.clone(),
            ))
        }
    }

    /// Fetch and adapt one source, isolating its failures
    async fn process_source(
        &self,
        source: &Source,
        full_rebuild: bool,
        dry_run: bool,
    ) -> SourceResult {
        let started = Instant::now();
        let report = |disposition, records: usize, hash: Option<String>, error: Option<String>| {
            SourceReport {
                source_key: source.key.clone(),
                disposition,
                records,
                content_hash: hash,
                error,
                duration_ms: started.elapsed().as_millis() as u64,
            }
        };

        if self.is_cancelled() {
            return SourceResult {
                report: report(SourceDisposition::Cancelled, 0, None, None),
                records: Vec::new(),
                degraded: None,
            };
        }

        let mut watermark = match self.state.watermark_or_default(&source.key).await {
            Ok(watermark) => watermark,
            Err(e) => return self.degrade(source, e, full_rebuild, started).await,
        };
        watermark.mark_started(Utc::now());

        let fetched = tokio::select! {
            fetched = self.fetcher.fetch(source) => fetched,
            _ = wait_for_shutdown(self.shutdown.clone()) => {
                return SourceResult {
                    report: report(SourceDisposition::Cancelled, 0, None, None),
                    records: Vec::new(),
                    degraded: None,
                };
            }
        };
        let artifact = match fetched {
            Ok(artifact) => artifact,
            Err(e) => {
                watermark.mark_failed(e.to_string());
                self.save_watermark(&watermark, dry_run).await;
                return self.degrade(source, e, full_rebuild, started).await;
            }
        };
        let hash = artifact.content_hash().to_string();

        // Identical bytes were already adapted: reuse instead of re-parsing
        if artifact.is_unchanged()
            && !full_rebuild
            && watermark.content_hash.as_deref() == Some(hash.as_str())
        {
            if let Ok(Some(cached)) = self.state.load_adapted(&source.key).await {
                if cached.content_hash == hash {
                    tracing::info!(source = %source.key, records = cached.len(), "Source unchanged; reusing adapted records");
                    watermark.mark_unchanged(Utc::now());
                    self.save_watermark(&watermark, dry_run).await;
                    let records = self.with_derived(cached.records);
                    return SourceResult {
                        report: report(SourceDisposition::Unchanged, records.len(), Some(hash), None),
                        records,
                        degraded: None,
                    };
                }
            }
        }

        let adapter = adapter_for(source.adapter);
        let records = match adapter.parse(source, &artifact, &self.countries) {
            Ok(records) => records,
            Err(e) => {
                watermark.mark_failed(e.to_string());
                self.save_watermark(&watermark, dry_run).await;
                return self.degrade(source, e, full_rebuild, started).await;
            }
        };
        // Only adapter output is cached; derived metrics follow the
        // configuration of the run that uses them
        if !dry_run {
            let adapted = AdaptedRecords::new(source.key.clone(), hash.clone(), records.clone());
            if let Err(e) = self.state.save_adapted(&adapted).await {
                tracing::warn!(source = %source.key, error = %e, "Failed to cache adapted records");
            }
        }

        watermark.mark_completed(
            Utc::now(),
            hash.clone(),
            artifact.cache_path.as_ref().map(|p| p.display().to_string()),
            records.len(),
        );
        self.save_watermark(&watermark, dry_run).await;

        let records = self.with_derived(records);
        SourceResult {
            report: report(SourceDisposition::Fetched, records.len(), Some(hash), None),
            records,
            degraded: None,
        }
    }

    /// Adapted records plus the metrics derived from them
    fn with_derived(&self, mut records: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
        let derived = derive_metrics(&records, DeriveOptions::from(&self.config.reconcile));
        records.extend(derived);
        records
    }

    /// Turn a source failure into a degraded result, falling back to the last
    /// adapted records when allowed
    async fn degrade(
        &self,
        source: &Source,
        error: GridError,
        full_rebuild: bool,
        started: Instant,
    ) -> SourceResult {
        let reason = error.to_string();
        log_source_degraded!(source.key, reason);

        let fallback = if self.config.pipeline.stale_fallback && !full_rebuild {
            match self.state.load_adapted(&source.key).await {
                Ok(cached) => cached,
                Err(e) => {
                    tracing::warn!(source = %source.key, error = %e, "Failed to load adapted records for fallback");
                    None
                }
            }
        } else {
            None
        };

        let (disposition, records, hash) = match fallback {
            Some(cached) => {
                tracing::info!(source = %source.key, records = cached.len(), "Using last adapted records");
                (
                    SourceDisposition::StaleFallback,
                    self.with_derived(cached.records),
                    Some(cached.content_hash),
                )
            }
            None => (SourceDisposition::Degraded, Vec::new(), None),
        };

        SourceResult {
            report: SourceReport {
                source_key: source.key.clone(),
                disposition,
                records: records.len(),
                content_hash: hash,
                error: Some(reason.clone()),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            records,
            degraded: Some(DegradedSource {
                source_key: source.key.clone(),
                reason,
            }),
        }
    }

    /// Contribution of a source that is not fetched this run
    async fn reuse_source(&self, source: &Source) -> Result<SourceResult> {
        let cached = self.state.load_adapted(&source.key).await?;
        let (disposition, records, hash) = match cached {
            Some(cached) => (
                SourceDisposition::Reused,
                self.with_derived(cached.records),
                Some(cached.content_hash),
            ),
            None => {
                tracing::warn!(source = %source.key, "Source has never been adapted; it contributes nothing");
                (SourceDisposition::Missing, Vec::new(), None)
            }
        };
        Ok(SourceResult {
            report: SourceReport {
                source_key: source.key.clone(),
                disposition,
                records: records.len(),
                content_hash: hash,
                error: None,
                duration_ms: 0,
            },
            records,
            degraded: None,
        })
    }

    async fn save_watermark(&self, watermark: &SourceWatermark, dry_run: bool) {
        if dry_run {
            return;
        }
        if let Err(e) = self.state.save_watermark(watermark).await {
            tracing::warn!(source = %watermark.source_key, error = %e, "Failed to save watermark");
        }
    }
}

/// Resolves once shutdown is signalled; never if the sender is gone
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::file::FileStore;
    use crate::config::parse_config;
    use tempfile::TempDir;

    const EMBER: &str = r#"{"data":[
        {"entity":"France","entity_code":"FRA","is_aggregate_entity":false,"date":"2024-01-01","series":"Nuclear","generation_twh":33.1,"share_of_generation_pct":70.2},
        {"entity":"Germany","entity_code":"DEU","is_aggregate_entity":false,"date":"2024-01-01","series":"Wind","generation_twh":14.2,"share_of_generation_pct":31.5}
    ]}"#;

    const TABULAR: &str = "country,month,value\nFRA,2024-01,30.0\nESP,2024-01,5.1\n";

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("ember.json"), EMBER).unwrap();
            std::fs::write(dir.path().join("national.csv"), TABULAR).unwrap();
            Self { dir }
        }

        fn config(&self) -> GridConfig {
            let root = self.dir.path().display();
            parse_config(&format!(
                r#"
[fetch]
cache_dir = "{root}/cache"

[store]
path = "{root}/store"

[[sources]]
key = "ember"
location = "{root}/ember.json"
adapter = "ember_monthly"
trust_rank = 2

[[sources]]
key = "national"
location = "{root}/national.csv"
adapter = "tabular_csv"
trust_rank = 1

[sources.tabular]
country_column = "country"
period_column = "month"
value_column = "value"
metric = "electricity.generation.nuclear"
unit = "TWh"
"#
            ))
            .unwrap()
        }

        async fn pipeline(&self, shutdown: watch::Receiver<bool>) -> Pipeline {
            let config = self.config();
            let store = Arc::new(FileStore::open(&config.store.path).await.unwrap());
            let fetcher = Fetcher::new(&config.fetch).unwrap();
            Pipeline::with_components(config, fetcher, store.clone(), store, shutdown).unwrap()
        }
    }

    fn live() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_run_commits_reconciled_snapshot() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(live()).await;

        let report = pipeline.run(RunRequest::default()).await.unwrap();

        let snapshot = report.outcome.snapshot().unwrap();
        assert_eq!(snapshot.version, 1);
        // FRA nuclear overlaps; national wins on trust rank
        assert_eq!(report.summary.conflicts, 1);
        assert_eq!(report.outcome.exit_code(), 0);
        assert!(report
            .summary
            .sources
            .iter()
            .all(|s| s.disposition == SourceDisposition::Fetched));
    }

    #[tokio::test]
    async fn test_failing_source_degrades_without_failing_run() {
        let fixture = Fixture::new();
        std::fs::write(fixture.dir.path().join("ember.json"), "{not json").unwrap();
        let pipeline = fixture.pipeline(live()).await;

        let report = pipeline.run(RunRequest::default()).await.unwrap();

        match &report.outcome {
            RunOutcome::CommittedWithDegradedSources(_, degraded) => {
                assert_eq!(degraded.len(), 1);
                assert_eq!(degraded[0].source_key.as_str(), "ember");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(report.outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_unknown_source_rejected_before_run() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(live()).await;

        let err = pipeline
            .run(RunRequest {
                sources: Some(vec![SourceKey::new("nope").unwrap()]),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GridError::UnknownSource(_)));
    }

    #[tokio::test]
    async fn test_cancelled_run_commits_nothing() {
        let fixture = Fixture::new();
        let (tx, rx) = watch::channel(false);
        let pipeline = fixture.pipeline(rx).await;
        tx.send(true).unwrap();

        let report = pipeline.run(RunRequest::default()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.outcome.exit_code(), 130);
        let store = FileStore::open(fixture.dir.path().join("store")).await.unwrap();
        assert!(store.current().await.unwrap().is_none());
    }

    fn ember_year(country: &str, code: &str, series: &str, year: i32, twh: f64) -> String {
        let rows: Vec<String> = (1..=12)
            .map(|month| {
                format!(
                    r#"{{"entity":"{country}","entity_code":"{code}","date":"{year}-{month:02}-01","series":"{series}","generation_twh":{twh}}}"#
                )
            })
            .collect();
        format!(r#"{{"data":[{}]}}"#, rows.join(","))
    }

    #[tokio::test]
    async fn test_roll_up_contributes_as_derived() {
        let fixture = Fixture::new();
        std::fs::write(
            fixture.dir.path().join("ember.json"),
            ember_year("France", "FRA", "Nuclear", 2023, 30.0),
        )
        .unwrap();
        std::fs::write(
            fixture.dir.path().join("national.csv"),
            "country,month,value\nFRA,2023,335.0\n",
        )
        .unwrap();
        let pipeline = fixture.pipeline(live()).await;

        pipeline.run(RunRequest::default()).await.unwrap();

        let store = FileStore::open(fixture.dir.path().join("store")).await.unwrap();
        let view = crate::core::load::SnapshotView::current(&store)
            .await
            .unwrap()
            .unwrap();
        let key = crate::domain::RecordKey::new(
            crate::domain::CountryCode::new("FRA").unwrap(),
            crate::domain::MetricId::new("electricity.generation.nuclear").unwrap(),
            crate::domain::Period::year(2023).unwrap(),
        );
        let record = view.get(&key).unwrap();

        assert_eq!(record.value, 335.0);
        assert_eq!(record.provenance.chosen_source.as_str(), "national");
        let contributors = &record.provenance.contributors;
        assert_eq!(contributors.len(), 2);
        assert!(!contributors[0].derived);
        assert_eq!(contributors[1].source_key.as_str(), "ember");
        assert!(contributors[1].derived);
        assert!((contributors[1].value - 360.0).abs() < 1e-9);

        // Only what the adapter produced is cached
        let cached = store
            .load_adapted(&SourceKey::new("ember").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(cached.records.iter().all(|r| !r.period.is_annual()));
    }
}
