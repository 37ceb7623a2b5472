use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod columns {
    pub const PRODUCT_ID: &str = "product_id";
    pub const ONSALE_WEB: &str = "onsale_web";
    pub const PRICE: &str = "price";
    pub const STOCK_QUANTITY: &str = "stock_quantity";
    pub const STOCK_STATUS: &str = "stock_status";

    pub const SKU: &str = "sku";
    pub const POST_TITLE: &str = "post_title";
    pub const POST_EXCERPT: &str = "post_excerpt";
    pub const POST_STATUS: &str = "post_status";
    pub const POST_TYPE: &str = "post_type";
    pub const POST_DATE: &str = "post_date";
    pub const AVERAGE_RATING: &str = "average_rating";
    pub const TOTAL_SALES: &str = "total_sales";

    pub const ID_WEB: &str = "id_web";

    pub const REVENUE: &str = "revenue";
    pub const REVENUE_TOTAL: &str = "revenue_total";
    pub const Z_SCORE: &str = "z_score";
    pub const CLASSIFICATION: &str = "classification";
}

/// Names of every relation the pipeline persists in the store.
pub mod relations {
    pub const ERP_CLEAN: &str = "erp_clean";
    pub const WEB_CLEAN: &str = "web_clean";
    pub const LIAISON_CLEAN: &str = "liaison_clean";
    pub const CLEAN_SUMMARY: &str = "clean_summary";
    pub const ERP_DEDUP: &str = "erp_dedup";
    pub const WEB_DEDUP: &str = "web_dedup";
    pub const LIAISON_DEDUP: &str = "liaison_dedup";
    pub const FUSION: &str = "fusion";
    pub const REVENUE_BY_PRODUCT: &str = "revenue_by_product";
    pub const REVENUE_TOTAL: &str = "revenue_total";
    pub const OUTLIERS: &str = "outliers";
    pub const ORDINARIES: &str = "ordinaries";
    pub const AUDIT_REPORT: &str = "audit_report";

    /// Relations that make up the post-fusion checkpoint.
    pub const FUSION_CHECKPOINT: [&str; 8] = [
        ERP_CLEAN,
        WEB_CLEAN,
        LIAISON_CLEAN,
        CLEAN_SUMMARY,
        ERP_DEDUP,
        WEB_DEDUP,
        LIAISON_DEDUP,
        FUSION,
    ];
}

pub const POST_TYPE_PRODUCT: &str = "product";
pub const LABEL_OUTLIER: &str = "outlier";
pub const LABEL_ORDINARY: &str = "ordinary";

/// The three upstream extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Erp,
    Web,
    Liaison,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Erp, SourceKind::Web, SourceKind::Liaison];

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Erp => "erp",
            SourceKind::Web => "web",
            SourceKind::Liaison => "liaison",
        }
    }

    /// Typed schema the raw text columns are cast to on load.
    pub fn schema(&self) -> Vec<(&'static str, DataType)> {
        use columns::*;
        match self {
            SourceKind::Erp => vec![
                (PRODUCT_ID, DataType::Int64),
                (ONSALE_WEB, DataType::Int64),
                (PRICE, DataType::Float64),
                (STOCK_QUANTITY, DataType::Int64),
                (STOCK_STATUS, DataType::String),
            ],
            SourceKind::Web => vec![
                (SKU, DataType::String),
                (POST_TITLE, DataType::String),
                (POST_EXCERPT, DataType::String),
                (POST_STATUS, DataType::String),
                (POST_TYPE, DataType::String),
                (POST_DATE, DataType::String),
                (AVERAGE_RATING, DataType::Float64),
                (TOTAL_SALES, DataType::Int64),
            ],
            SourceKind::Liaison => vec![(PRODUCT_ID, DataType::Int64), (ID_WEB, DataType::String)],
        }
    }

    /// Columns the Cleaner requires to be non-null.
    pub fn required_columns(&self) -> &'static [&'static str] {
        use columns::*;
        match self {
            SourceKind::Erp => &[PRODUCT_ID, ONSALE_WEB, PRICE, STOCK_QUANTITY, STOCK_STATUS],
            SourceKind::Web => &[SKU],
            SourceKind::Liaison => &[PRODUCT_ID, ID_WEB],
        }
    }

    pub fn natural_key(&self) -> &'static str {
        match self {
            SourceKind::Erp | SourceKind::Liaison => columns::PRODUCT_ID,
            SourceKind::Web => columns::SKU,
        }
    }

    pub fn clean_relation(&self) -> &'static str {
        match self {
            SourceKind::Erp => relations::ERP_CLEAN,
            SourceKind::Web => relations::WEB_CLEAN,
            SourceKind::Liaison => relations::LIAISON_CLEAN,
        }
    }

    pub fn dedup_relation(&self) -> &'static str {
        match self {
            SourceKind::Erp => relations::ERP_DEDUP,
            SourceKind::Web => relations::WEB_DEDUP,
            SourceKind::Liaison => relations::LIAISON_DEDUP,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row counts recorded by the Cleaner for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanCounts {
    pub source: SourceKind,
    pub initial_rows: usize,
    pub clean_rows: usize,
}

impl CleanCounts {
    pub fn excluded_rows(&self) -> usize {
        self.initial_rows.saturating_sub(self.clean_rows)
    }
}

/// Outcome of comparing an observed metric with its regression baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Ok,
    Mismatch,
    #[serde(rename = "n/a")]
    NotApplicable,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "ok",
            AuditStatus::Mismatch => "mismatch",
            AuditStatus::NotApplicable => "n/a",
        }
    }
}

/// One row of the final audit report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub stage: String,
    pub observed: f64,
    pub expected: Option<f64>,
    pub status: AuditStatus,
}

impl AuditEntry {
    pub fn new(stage: impl Into<String>, observed: f64, expected: Option<f64>) -> Self {
        let status = match expected {
            None => AuditStatus::NotApplicable,
            Some(e) if (e - observed).abs() < 0.005 => AuditStatus::Ok,
            Some(_) => AuditStatus::Mismatch,
        };
        Self {
            stage: stage.into(),
            observed,
            expected,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_keys() {
        assert_eq!(SourceKind::Erp.natural_key(), "product_id");
        assert_eq!(SourceKind::Liaison.natural_key(), "product_id");
        assert_eq!(SourceKind::Web.natural_key(), "sku");
    }

    #[test]
    fn test_required_columns_are_in_schema() {
        for source in SourceKind::ALL {
            let schema = source.schema();
            for required in source.required_columns() {
                assert!(
                    schema.iter().any(|(name, _)| name == required),
                    "{} missing {}",
                    source,
                    required
                );
            }
        }
    }

    #[test]
    fn test_audit_entry_status() {
        assert_eq!(AuditEntry::new("Fusion", 714.0, Some(714.0)).status, AuditStatus::Ok);
        assert_eq!(
            AuditEntry::new("Fusion", 713.0, Some(714.0)).status,
            AuditStatus::Mismatch
        );
        assert_eq!(
            AuditEntry::new("Raw - ERP", 825.0, None).status,
            AuditStatus::NotApplicable
        );
        assert_eq!(
            AuditEntry::new("Revenue total", 387837.6, Some(387837.60)).status,
            AuditStatus::Ok
        );
    }

    #[test]
    fn test_excluded_rows() {
        let counts = CleanCounts {
            source: SourceKind::Erp,
            initial_rows: 10,
            clean_rows: 7,
        };
        assert_eq!(counts.excluded_rows(), 3);
    }
}
