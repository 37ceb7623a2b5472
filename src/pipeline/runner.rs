use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::relations::*;
use crate::models::{AuditEntry, SourceKind};
use crate::pipeline::stage::{PipelineState, Progress, Stage};
use crate::processor::{
    AnomalyDetector, Aggregator, CleanOutput, Cleaner, DedupOutput, Deduplicator, Fuser, Gate,
    Loader, RawCounts, Reporter, report_frame,
};
use crate::storage::{ArtifactExporter, ArtifactSink, RelationStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

pub const RUN_SUMMARY: &str = "run_summary";

/// What a run did, written next to the artifacts as `run_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<Stage>,
    pub final_state: PipelineState,
    pub error: Option<String>,
    pub audit: Vec<AuditEntry>,
    pub artifacts: Vec<PathBuf>,
}

/// Owns the shared store handle and runs stages against it.
pub struct PipelineRunner {
    config: PipelineConfig,
    store: RelationStore,
    exporter: ArtifactExporter,
    loader: Loader,
    progress: Progress,
    artifacts: Vec<PathBuf>,
    audit: Vec<AuditEntry>,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let store = RelationStore::open(&config.paths.store_dir)?;
        let exporter = ArtifactExporter::new(&config.paths.output_dir)?;
        let loader = Loader::from_config(&config);

        Ok(PipelineRunner {
            config,
            store,
            exporter,
            loader,
            progress: Progress::new(),
            artifacts: Vec::new(),
            audit: Vec::new(),
        })
    }

    pub fn store(&self) -> &RelationStore {
        &self.store
    }

    pub fn state(&self) -> PipelineState {
        self.progress.state()
    }

    /// Runs every stage in order. Aggregation and outlier detection run
    /// side by side once the catalog is fused.
    pub fn run_all(&mut self) -> Result<RunSummary> {
        let started_at = Utc::now();
        self.reset(Progress::new());
        let result = self.execute_all();
        self.finish(started_at, Stage::ALL.to_vec(), result)
    }

    /// Runs one stage against whatever the store currently holds.
    pub fn run_stage(&mut self, stage: Stage) -> Result<RunSummary> {
        let started_at = Utc::now();
        self.reset(Progress::resume_before(stage));
        let result = self.step(stage);
        self.finish(started_at, vec![stage], result)
    }

    fn reset(&mut self, progress: Progress) {
        self.progress = progress;
        self.artifacts.clear();
        self.audit.clear();
    }

    fn execute_all(&mut self) -> Result<()> {
        for stage in [Stage::Clean, Stage::Dedup, Stage::Fuse, Stage::Snapshot] {
            self.step(stage)?;
        }

        self.progress.begin(Stage::Aggregate)?;
        self.progress.begin(Stage::Detect)?;
        let runner = &*self;
        let (aggregated, detected) = thread::scope(|scope| {
            let aggregate = scope.spawn(|| runner.aggregate());
            let detect = scope.spawn(|| runner.detect());
            (join_worker(Stage::Aggregate, aggregate), join_worker(Stage::Detect, detect))
        });
        let aggregated = aggregated?;
        self.artifacts.extend(aggregated);
        self.progress.complete(Stage::Aggregate);
        let detected = detected?;
        self.artifacts.extend(detected);
        self.progress.complete(Stage::Detect);

        self.step(Stage::Report)
    }

    fn step(&mut self, stage: Stage) -> Result<()> {
        self.progress.begin(stage)?;
        let produced = match stage {
            Stage::Clean => self.clean()?,
            Stage::Dedup => self.dedup()?,
            Stage::Fuse => self.fuse()?,
            Stage::Snapshot => self.snapshot()?,
            Stage::Aggregate => self.aggregate()?,
            Stage::Detect => self.detect()?,
            Stage::Report => {
                let (entries, produced) = self.report()?;
                self.audit = entries;
                produced
            }
        };
        self.artifacts.extend(produced);
        self.progress.complete(stage);
        Ok(())
    }

    fn finish(
        &mut self,
        started_at: DateTime<Utc>,
        stages: Vec<Stage>,
        result: Result<()>,
    ) -> Result<RunSummary> {
        if let Err(e) = &result {
            self.progress.fail();
            error!("❌ Pipeline failed in state {:?}: {}", self.progress.state(), e);
        }

        let mut summary = RunSummary {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            stages,
            final_state: self.progress.state(),
            error: result.as_ref().err().map(|e| e.to_string()),
            audit: self.audit.clone(),
            artifacts: self.artifacts.clone(),
        };

        match self.exporter.write_json(RUN_SUMMARY, &summary) {
            Ok(path) => {
                self.artifacts.push(path.clone());
                summary.artifacts.push(path);
            }
            Err(e) => warn!("⚠️ Could not write run summary: {}", e),
        }

        result.map(|_| {
            info!(
                "🎉 Run {} finished in state {:?} with {} artifacts",
                summary.run_id,
                summary.final_state,
                summary.artifacts.len()
            );
            summary
        })
    }

    fn gate(&self, stage: Stage) -> Gate {
        Gate::new(stage.name(), self.config.baselines.policy)
    }

    fn clean(&self) -> Result<Vec<PathBuf>> {
        let _span = info_span!("clean").entered();
        let raw = self.loader.load_all()?;
        let output = Cleaner.clean(&raw)?;
        Cleaner.validate(&self.gate(Stage::Clean), &output)?;

        let mut produced = Vec::new();
        for source in SourceKind::ALL {
            let mut df = output.get(source).clone();
            self.store.replace(source.clean_relation(), &mut df)?;
            produced.push(self.exporter.write_csv(source.clean_relation(), &mut df)?);
        }

        let mut summary = output.summary_frame()?;
        self.store.replace(CLEAN_SUMMARY, &mut summary)?;
        produced.push(self.exporter.write_csv(CLEAN_SUMMARY, &mut summary)?);
        Ok(produced)
    }

    fn dedup(&self) -> Result<Vec<PathBuf>> {
        let _span = info_span!("dedup").entered();
        let clean = CleanOutput {
            erp: self.store.read(ERP_CLEAN)?,
            web: self.store.read(WEB_CLEAN)?,
            liaison: self.store.read(LIAISON_CLEAN)?,
            counts: Vec::new(),
        };

        let output = Deduplicator.dedup(&clean)?;
        Deduplicator.validate(&self.gate(Stage::Dedup), &output, &self.config.baselines)?;

        for source in SourceKind::ALL {
            let mut df = output.get(source).clone();
            self.store.replace(source.dedup_relation(), &mut df)?;
        }
        Ok(Vec::new())
    }

    fn fuse(&self) -> Result<Vec<PathBuf>> {
        let _span = info_span!("fuse").entered();
        let dedup = DedupOutput {
            erp: self.store.read(ERP_DEDUP)?,
            web: self.store.read(WEB_DEDUP)?,
            liaison: self.store.read(LIAISON_DEDUP)?,
        };

        let mut fusion = Fuser.fuse(&dedup)?;
        Fuser.validate(&self.gate(Stage::Fuse), &fusion, &self.config.baselines)?;

        self.store.replace(FUSION, &mut fusion)?;
        Ok(vec![self.exporter.write_csv(FUSION, &mut fusion)?])
    }

    fn snapshot(&self) -> Result<Vec<PathBuf>> {
        let _span = info_span!("snapshot").entered();
        self.store.snapshot(
            &self.config.paths.snapshot_dir,
            &self.config.rules.snapshot_label,
            &FUSION_CHECKPOINT,
        )?;
        Ok(Vec::new())
    }

    fn aggregate(&self) -> Result<Vec<PathBuf>> {
        let _span = info_span!("aggregate").entered();
        let fusion = self.store.read(FUSION)?;

        let aggregator = Aggregator::new(self.config.rules.in_stock_status.as_str());
        let output = aggregator.compute(&fusion)?;
        aggregator.validate(&self.gate(Stage::Aggregate), &output, &self.config.baselines)?;

        let mut by_product = output.by_product.clone();
        let mut total = output.total_frame()?;
        self.store.replace(REVENUE_BY_PRODUCT, &mut by_product)?;
        self.store.replace(REVENUE_TOTAL, &mut total)?;

        Ok(vec![
            self.exporter.write_csv(REVENUE_BY_PRODUCT, &mut by_product)?,
            self.exporter.write_xlsx(REVENUE_BY_PRODUCT, &by_product)?,
            self.exporter.write_csv(REVENUE_TOTAL, &mut total)?,
        ])
    }

    fn detect(&self) -> Result<Vec<PathBuf>> {
        let _span = info_span!("detect").entered();
        let fusion = self.store.read(FUSION)?;

        let detector = AnomalyDetector::new(self.config.rules.z_threshold);
        let output = detector.detect(&fusion)?;
        detector.validate(&self.gate(Stage::Detect), &output, &self.config.baselines)?;

        let mut outliers = output.outliers;
        let mut ordinaries = output.ordinaries;
        self.store.replace(OUTLIERS, &mut outliers)?;
        self.store.replace(ORDINARIES, &mut ordinaries)?;

        Ok(vec![
            self.exporter.write_csv(OUTLIERS, &mut outliers)?,
            self.exporter.write_csv(ORDINARIES, &mut ordinaries)?,
        ])
    }

    fn report(&self) -> Result<(Vec<AuditEntry>, Vec<PathBuf>)> {
        let _span = info_span!("report").entered();
        let raw = RawCounts {
            erp: self.loader.count_rows(SourceKind::Erp)?,
            web: self.loader.count_rows(SourceKind::Web)?,
            liaison: self.loader.count_rows(SourceKind::Liaison)?,
        };

        let entries = Reporter::new(&self.store, &self.config.baselines).audit(&raw)?;
        let mut frame = report_frame(&entries)?;
        self.store.replace(AUDIT_REPORT, &mut frame)?;

        let produced = vec![
            self.exporter.write_csv(AUDIT_REPORT, &mut frame)?,
            self.exporter.write_xlsx(AUDIT_REPORT, &frame)?,
        ];
        Ok((entries, produced))
    }
}

fn join_worker(
    stage: Stage,
    handle: thread::ScopedJoinHandle<'_, Result<Vec<PathBuf>>>,
) -> Result<Vec<PathBuf>> {
    handle
        .join()
        .map_err(|_| PipelineError::InvalidState(format!("stage '{}' worker panicked", stage)))?
}

/// Uploads run artifacts and checks every key landed.
pub async fn publish_artifacts(
    sink: &dyn ArtifactSink,
    files: &[PathBuf],
) -> anyhow::Result<Vec<String>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }
    let keys = sink.publish(files).await?;
    sink.verify(&keys).await?;
    info!("📤 Published {} artifacts", keys.len());
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ERP_CSV: &str = "product_id,onsale_web,price,stock_quantity,stock_status\n\
        1,1,10.0,2,instock\n\
        1,1,12.0,1,instock\n\
        2,1,20.0,0,outofstock\n\
        3,0,30.0,5,instock\n\
        4,1,,3,instock\n";
    const WEB_CSV: &str = "sku,post_title,post_excerpt,post_status,post_type,post_date,average_rating,total_sales\n\
        A,Alpha,a,publish,product,2020-01-01 00:00:00,4.0,3\n\
        B,Beta,b,publish,product,2020-01-01 00:00:00,3.5,1\n\
        C,Gamma,c,publish,product,2021-01-01 00:00:00,5.0,8\n\
        A,Alpha,a,inherit,attachment,2022-01-01 00:00:00,0,0\n";
    const LIAISON_CSV: &str = "product_id,id_web\n1,A\n2,B\n3,C\n";

    fn workspace() -> (TempDir, PipelineConfig) {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());
        fs::create_dir_all(&config.paths.input_dir).unwrap();
        fs::write(config.erp_path(), ERP_CSV).unwrap();
        fs::write(config.web_path(), WEB_CSV).unwrap();
        fs::write(config.liaison_path(), LIAISON_CSV).unwrap();
        (dir, config)
    }

    #[test]
    fn test_run_all_reaches_reported() {
        let (_dir, config) = workspace();
        let output_dir = config.paths.output_dir.clone();
        let mut runner = PipelineRunner::new(config).unwrap();

        let summary = runner.run_all().unwrap();
        assert_eq!(summary.final_state, PipelineState::Reported);
        assert_eq!(runner.store().row_count(FUSION).unwrap(), 3);
        assert_eq!(runner.store().row_count(REVENUE_BY_PRODUCT).unwrap(), 2);
        assert_eq!(summary.audit.len(), 13);
        assert!(output_dir.join("run_summary.json").is_file());
        assert!(output_dir.join("audit_report.xlsx").is_file());
    }

    #[test]
    fn test_single_stage_needs_upstream_relations() {
        let (_dir, config) = workspace();
        let mut runner = PipelineRunner::new(config).unwrap();

        let err = runner.run_stage(Stage::Fuse).unwrap_err();
        assert!(err.is_missing_input());
        assert_eq!(runner.state(), PipelineState::Failed);
    }

    #[test]
    fn test_stages_can_be_run_one_by_one() {
        let (_dir, config) = workspace();
        let snapshot_dir = config.paths.snapshot_dir.clone();
        let mut runner = PipelineRunner::new(config).unwrap();

        for stage in Stage::ALL {
            runner.run_stage(stage).unwrap();
        }
        assert_eq!(runner.state(), PipelineState::Reported);
        assert!(snapshot_dir.join("fusion_ok").join("fusion.parquet").is_file());
    }

    #[test]
    fn test_missing_input_fails_clean() {
        let (_dir, config) = workspace();
        fs::remove_file(config.web_path()).unwrap();
        let mut runner = PipelineRunner::new(config).unwrap();

        let err = runner.run_all().unwrap_err();
        assert!(err.is_missing_input());
        assert!(!runner.store().exists(ERP_CLEAN));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let (_dir, config) = workspace();
        let mut runner = PipelineRunner::new(config).unwrap();

        runner.run_all().unwrap();
        let first = runner.store().read(FUSION).unwrap();
        runner.run_all().unwrap();
        let second = runner.store().read(FUSION).unwrap();
        assert!(first.equals_missing(&second));
    }

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArtifactSink for RecordingSink {
        async fn publish(&self, files: &[PathBuf]) -> anyhow::Result<Vec<String>> {
            let keys: Vec<String> = files
                .iter()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                .map(|n| format!("data/outputs/{}", n))
                .collect();
            self.published.lock().unwrap().extend(keys.clone());
            Ok(keys)
        }

        async fn verify(&self, keys: &[String]) -> anyhow::Result<()> {
            let published = self.published.lock().unwrap();
            match keys.iter().find(|k| !published.contains(k)) {
                Some(missing) => Err(anyhow::anyhow!("missing {}", missing)),
                None => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_artifacts() {
        let sink = RecordingSink::default();
        let files = vec![PathBuf::from("/tmp/out/fusion.csv"), PathBuf::from("/tmp/out/audit_report.xlsx")];

        let keys = publish_artifacts(&sink, &files).await.unwrap();
        assert_eq!(keys, vec!["data/outputs/fusion.csv", "data/outputs/audit_report.xlsx"]);
        assert!(publish_artifacts(&sink, &[]).await.unwrap().is_empty());
    }
}
