use crate::config::BaselineConfig;
use crate::error::{PipelineError, Result};
use crate::models::columns::REVENUE_TOTAL;
use crate::models::relations::*;
use crate::models::{AuditEntry, AuditStatus, SourceKind};
use crate::storage::RelationStore;
use polars::prelude::*;
use tracing::{info, warn};

/// Raw row counts of the three extracts, re-read from the input files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounts {
    pub erp: usize,
    pub web: usize,
    pub liaison: usize,
}

impl RawCounts {
    pub fn get(&self, source: SourceKind) -> usize {
        match source {
            SourceKind::Erp => self.erp,
            SourceKind::Web => self.web,
            SourceKind::Liaison => self.liaison,
        }
    }
}

fn title(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Erp => "ERP",
        SourceKind::Web => "Web",
        SourceKind::Liaison => "Liaison",
    }
}

fn as_expected(value: Option<usize>) -> Option<f64> {
    value.map(|v| v as f64)
}

/// Consolidates row counts of every persisted stage against the configured
/// baselines.
pub struct Reporter<'a> {
    store: &'a RelationStore,
    baselines: &'a BaselineConfig,
}

impl<'a> Reporter<'a> {
    pub fn new(store: &'a RelationStore, baselines: &'a BaselineConfig) -> Self {
        Reporter { store, baselines }
    }

    pub fn audit(&self, raw: &RawCounts) -> Result<Vec<AuditEntry>> {
        let mut entries = Vec::new();

        for source in SourceKind::ALL {
            entries.push(AuditEntry::new(
                format!("Raw - {}", title(source)),
                raw.get(source) as f64,
                None,
            ));
        }
        for source in SourceKind::ALL {
            let rows = self.store.row_count(source.clean_relation())?;
            entries.push(AuditEntry::new(format!("Clean - {}", title(source)), rows as f64, None));
        }

        let dedup_expected = [
            (SourceKind::Erp, self.baselines.erp_dedup),
            (SourceKind::Web, self.baselines.web_dedup),
            (SourceKind::Liaison, self.baselines.liaison_dedup),
        ];
        for (source, expected) in dedup_expected {
            let rows = self.store.row_count(source.dedup_relation())?;
            entries.push(AuditEntry::new(
                format!("Dedup - {}", title(source)),
                rows as f64,
                as_expected(expected),
            ));
        }

        entries.push(AuditEntry::new(
            "Fusion",
            self.store.row_count(FUSION)? as f64,
            as_expected(self.baselines.fusion),
        ));
        entries.push(AuditEntry::new(
            "Revenue - products",
            self.store.row_count(REVENUE_BY_PRODUCT)? as f64,
            as_expected(self.baselines.revenue_products),
        ));
        entries.push(AuditEntry::new(
            "Revenue - total",
            self.revenue_total()?,
            self.baselines.revenue_total,
        ));
        entries.push(AuditEntry::new(
            "Outliers",
            self.store.row_count(OUTLIERS)? as f64,
            as_expected(self.baselines.outliers),
        ));

        for entry in &entries {
            if entry.status == AuditStatus::Mismatch {
                warn!(
                    "⚠️ Audit mismatch on '{}': {} (baseline: {:?})",
                    entry.stage, entry.observed, entry.expected
                );
            }
        }
        info!("📋 Audit report built with {} entries", entries.len());
        Ok(entries)
    }

    fn revenue_total(&self) -> Result<f64> {
        let df = self.store.read(REVENUE_TOTAL)?;
        df.column(REVENUE_TOTAL)?
            .f64()?
            .get(0)
            .ok_or_else(|| PipelineError::validation("report", "relation 'revenue_total' holds no value"))
    }
}

/// Tabular form of the audit: stage, observed, expected, status.
pub fn report_frame(entries: &[AuditEntry]) -> Result<DataFrame> {
    let stages: Vec<&str> = entries.iter().map(|e| e.stage.as_str()).collect();
    let observed: Vec<f64> = entries.iter().map(|e| e.observed).collect();
    let expected: Vec<Option<f64>> = entries.iter().map(|e| e.expected).collect();
    let status: Vec<&str> = entries.iter().map(|e| e.status.as_str()).collect();

    Ok(DataFrame::new(vec![
        Series::new("stage".into(), stages).into(),
        Series::new("observed".into(), observed).into(),
        Series::new("expected".into(), expected).into(),
        Series::new("status".into(), status).into(),
    ])?)
}
