use catalog_pipeline::config::{BaselineConfig, BaselinePolicy, PipelineConfig};
use catalog_pipeline::models::AuditStatus;
use catalog_pipeline::models::relations::*;
use catalog_pipeline::pipeline::{PipelineRunner, PipelineState, Stage};
use catalog_pipeline::processor::read_csv_as_text;
use std::fs;
use tempfile::TempDir;

fn erp_csv() -> String {
    let mut rows = vec!["product_id,onsale_web,price,stock_quantity,stock_status".to_string()];
    for id in 1..=10 {
        let price = if id == 10 { 200.0 } else { 10.0 };
        let quantity = if id == 5 { 0 } else { 2 };
        let status = if id == 6 { "outofstock" } else { "instock" };
        rows.push(format!("{},1,{:.1},{},{}", id, price, quantity, status));
    }
    rows.push("1,0,8.0,5,instock".to_string());
    rows.push("11,1,0,4,instock".to_string());
    rows.push(",1,15.0,1,instock".to_string());
    rows.join("\n") + "\n"
}

fn web_csv() -> String {
    let mut rows = vec![
        "sku,post_title,post_excerpt,post_status,post_type,post_date,average_rating,total_sales".to_string(),
    ];
    for id in 1..=10 {
        rows.push(format!(
            "W{},Product {},Excerpt {},publish,product,2020-01-01 00:00:00,4.5,{}",
            id, id, id, id
        ));
    }
    rows.push("W2,Old product 2,Old,publish,product,2019-06-01 00:00:00,1.0,0".to_string());
    rows.push("W4,Image,,inherit,attachment,2021-01-01 00:00:00,0,0".to_string());
    rows.push(",Orphan,,draft,product,2020-01-01 00:00:00,0,0".to_string());
    rows.join("\n") + "\n"
}

fn liaison_csv() -> String {
    let mut rows = vec!["product_id,id_web".to_string()];
    for id in 1..=10 {
        rows.push(format!("{},W{}", id, id));
    }
    rows.push("3,W99".to_string());
    rows.push("12,W12".to_string());
    rows.join("\n") + "\n"
}

/// Expected figures for the fixture above.
fn fixture_baselines(policy: BaselinePolicy) -> BaselineConfig {
    BaselineConfig {
        policy,
        erp_dedup: Some(10),
        web_dedup: Some(10),
        liaison_dedup: Some(11),
        fusion: Some(10),
        revenue_products: Some(8),
        revenue_total: Some(570.0),
        outliers: Some(1),
    }
}

fn workspace(baselines: BaselineConfig) -> (TempDir, PipelineConfig) {
    let dir = TempDir::new().unwrap();
    let mut config = PipelineConfig::rooted_at(dir.path());
    config.baselines = baselines;

    fs::create_dir_all(&config.paths.input_dir).unwrap();
    fs::write(config.erp_path(), erp_csv()).unwrap();
    fs::write(config.web_path(), web_csv()).unwrap();
    fs::write(config.liaison_path(), liaison_csv()).unwrap();
    (dir, config)
}

#[test]
fn test_full_run_matches_fixture_baselines() {
    let (_dir, config) = workspace(fixture_baselines(BaselinePolicy::Enforce));
    let mut runner = PipelineRunner::new(config).unwrap();

    let summary = runner.run_all().unwrap();
    assert_eq!(summary.final_state, PipelineState::Reported);
    assert!(summary.error.is_none());

    let stages: Vec<&str> = summary.audit.iter().map(|e| e.stage.as_str()).collect();
    assert_eq!(stages[0], "Raw - ERP");
    assert_eq!(stages[12], "Outliers");
    assert_eq!(summary.audit[0].observed, 13.0);
    assert_eq!(summary.audit[3].observed, 11.0);
    assert!(summary.audit.iter().all(|e| e.status != AuditStatus::Mismatch));

    let store = runner.store();
    assert_eq!(store.row_count(ORDINARIES).unwrap(), 9);
    assert_eq!(store.row_count(AUDIT_REPORT).unwrap(), 13);
}

#[test]
fn test_every_artifact_is_written() {
    let (_dir, config) = workspace(BaselineConfig::default());
    let output_dir = config.paths.output_dir.clone();
    let snapshot_dir = config.paths.snapshot_dir.clone();
    let mut runner = PipelineRunner::new(config).unwrap();
    let summary = runner.run_all().unwrap();

    for name in [
        "erp_clean.csv",
        "web_clean.csv",
        "liaison_clean.csv",
        "clean_summary.csv",
        "fusion.csv",
        "revenue_by_product.csv",
        "revenue_by_product.xlsx",
        "revenue_total.csv",
        "outliers.csv",
        "ordinaries.csv",
        "audit_report.csv",
        "audit_report.xlsx",
        "run_summary.json",
    ] {
        let path = output_dir.join(name);
        assert!(path.is_file(), "missing artifact {}", name);
        assert!(summary.artifacts.contains(&path), "{} not listed in summary", name);
    }

    let snapshot = snapshot_dir.join("fusion_ok");
    for relation in [ERP_DEDUP, WEB_DEDUP, LIAISON_DEDUP, FUSION] {
        assert!(snapshot.join(format!("{}.parquet", relation)).is_file());
    }
    assert!(!snapshot.join("revenue_by_product.parquet").exists());
}

#[test]
fn test_rerun_snapshot_leaves_out_downstream_relations() {
    let (_dir, config) = workspace(BaselineConfig::default());
    let snapshot = config.paths.snapshot_dir.join("fusion_ok");
    let mut runner = PipelineRunner::new(config).unwrap();
    runner.run_all().unwrap();
    assert!(runner.store().exists(REVENUE_BY_PRODUCT));

    runner.run_stage(Stage::Snapshot).unwrap();
    for relation in FUSION_CHECKPOINT {
        assert!(snapshot.join(format!("{}.parquet", relation)).is_file());
    }
    for relation in [REVENUE_BY_PRODUCT, REVENUE_TOTAL, OUTLIERS, ORDINARIES, AUDIT_REPORT] {
        assert!(!snapshot.join(format!("{}.parquet", relation)).exists());
    }
}

#[test]
fn test_exported_csv_round_trips() {
    let (_dir, config) = workspace(BaselineConfig::default());
    let output_dir = config.paths.output_dir.clone();
    let mut runner = PipelineRunner::new(config).unwrap();
    runner.run_all().unwrap();

    for relation in [FUSION, REVENUE_BY_PRODUCT, OUTLIERS, AUDIT_REPORT] {
        let stored = runner.store().read(relation).unwrap();
        let exported = read_csv_as_text(&output_dir.join(format!("{}.csv", relation))).unwrap();
        assert_eq!(stored.height(), exported.height(), "{}", relation);
        assert_eq!(stored.get_column_names(), exported.get_column_names(), "{}", relation);
    }
}

#[test]
fn test_baseline_mismatch_policies() {
    let mut wrong = fixture_baselines(BaselinePolicy::Enforce);
    wrong.fusion = Some(714);

    let (_dir, config) = workspace(wrong.clone());
    let mut runner = PipelineRunner::new(config).unwrap();
    let err = runner.run_all().unwrap_err();
    assert!(err.is_validation_failure());
    assert_eq!(runner.state(), PipelineState::Failed);
    assert!(!runner.store().exists(REVENUE_BY_PRODUCT));

    wrong.policy = BaselinePolicy::Warn;
    let (_dir, config) = workspace(wrong);
    let mut runner = PipelineRunner::new(config).unwrap();
    let summary = runner.run_all().unwrap();
    let fusion = summary.audit.iter().find(|e| e.stage == "Fusion").unwrap();
    assert_eq!(fusion.status, AuditStatus::Mismatch);
}

#[test]
fn test_constant_prices_abort_detection() {
    let (_dir, config) = workspace(BaselineConfig::default());
    let erp = erp_csv().replace("200.0", "10.0");
    fs::write(config.erp_path(), erp).unwrap();

    let mut runner = PipelineRunner::new(config).unwrap();
    let err = runner.run_all().unwrap_err();
    assert!(err.is_validation_failure());
    assert!(!runner.store().exists(OUTLIERS));
    assert!(!runner.store().exists(AUDIT_REPORT));
}

#[test]
fn test_stage_rerun_after_full_run() {
    let (_dir, config) = workspace(fixture_baselines(BaselinePolicy::Enforce));
    let mut runner = PipelineRunner::new(config).unwrap();
    runner.run_all().unwrap();

    let before = runner.store().read(REVENUE_BY_PRODUCT).unwrap();
    let summary = runner.run_stage(Stage::Aggregate).unwrap();
    assert_eq!(summary.final_state, PipelineState::Aggregated);
    let after = runner.store().read(REVENUE_BY_PRODUCT).unwrap();
    assert!(before.equals_missing(&after));
}
