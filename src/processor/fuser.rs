use crate::config::BaselineConfig;
use crate::error::Result;
use crate::models::columns::*;
use crate::models::relations::FUSION;
use crate::processor::deduplicator::DedupOutput;
use crate::processor::validation::Gate;
use polars::prelude::*;
use tracing::info;

/// Columns downstream stages cannot run without.
pub const CRITICAL_COLUMNS: [&str; 4] = [PRODUCT_ID, PRICE, STOCK_STATUS, POST_TITLE];

/// Column order of the catalog relation.
pub const FUSION_COLUMNS: [&str; 12] = [
    PRODUCT_ID,
    SKU,
    ONSALE_WEB,
    PRICE,
    STOCK_QUANTITY,
    STOCK_STATUS,
    POST_TITLE,
    POST_EXCERPT,
    POST_STATUS,
    POST_TYPE,
    AVERAGE_RATING,
    TOTAL_SALES,
];

/// erp ⋈ liaison ON product_id ⋈ web ON liaison.id_web = web.sku, inner
/// semantics on both edges.
pub fn fusion_plan(erp: LazyFrame, liaison: LazyFrame, web: LazyFrame) -> LazyFrame {
    erp.inner_join(liaison, col(PRODUCT_ID), col(PRODUCT_ID))
        .inner_join(web, col(ID_WEB), col(SKU))
        .select([
            col(PRODUCT_ID),
            col(ID_WEB).alias(SKU),
            col(ONSALE_WEB),
            col(PRICE),
            col(STOCK_QUANTITY),
            col(STOCK_STATUS),
            col(POST_TITLE),
            col(POST_EXCERPT),
            col(POST_STATUS),
            col(POST_TYPE),
            col(AVERAGE_RATING),
            col(TOTAL_SALES),
        ])
        .sort([PRODUCT_ID], SortMultipleOptions::default())
}

pub struct Fuser;

impl Fuser {
    pub fn fuse(&self, dedup: &DedupOutput) -> Result<DataFrame> {
        let fusion = fusion_plan(
            dedup.erp.clone().lazy(),
            dedup.liaison.clone().lazy(),
            dedup.web.clone().lazy(),
        )
        .collect()?;

        info!(
            "✅ fusion: {} rows from erp={}, liaison={}, web={}",
            fusion.height(),
            dedup.erp.height(),
            dedup.liaison.height(),
            dedup.web.height()
        );
        Ok(fusion)
    }

    pub fn validate(&self, gate: &Gate, fusion: &DataFrame, baselines: &BaselineConfig) -> Result<()> {
        gate.columns_present(FUSION, fusion, &CRITICAL_COLUMNS)?;
        gate.non_empty(FUSION, fusion)?;
        gate.baseline("fusion rows", fusion.height() as f64, baselines.fusion.map(|v| v as f64))?;
        Ok(())
    }
}
