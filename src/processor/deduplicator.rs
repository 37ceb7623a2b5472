use crate::config::BaselineConfig;
use crate::error::Result;
use crate::models::columns::*;
use crate::models::{POST_TYPE_PRODUCT, SourceKind};
use crate::processor::cleaner::CleanOutput;
use crate::processor::validation::Gate;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::info;

const POST_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

// Sort key of the web rule, dropped before the relation is written.
const POSTED_AT: &str = "posted_at";

/// Product master: one row per product_id holding the per-column maximum of
/// every duplicate, so no favourable value is discarded.
pub fn erp_dedup_plan(clean: LazyFrame) -> LazyFrame {
    clean
        .group_by_stable([col(PRODUCT_ID)])
        .agg([
            col(ONSALE_WEB).max(),
            col(PRICE).max(),
            col(STOCK_QUANTITY).max(),
            col(STOCK_STATUS).max(),
        ])
        .sort([PRODUCT_ID], SortMultipleOptions::default())
}

/// Liaison: one row per product_id mapped to its lowest web identifier.
pub fn liaison_dedup_plan(clean: LazyFrame) -> LazyFrame {
    clean
        .group_by_stable([col(PRODUCT_ID)])
        .agg([col(ID_WEB).min()])
        .sort([PRODUCT_ID], SortMultipleOptions::default())
}

/// Web posts that describe products; everything else is dropped outright.
pub fn product_posts(clean: LazyFrame) -> LazyFrame {
    clean.filter(col(POST_TYPE).eq(lit(POST_TYPE_PRODUCT)))
}

pub fn parse_post_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    POST_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Keeps, for each SKU, the row with the most recent post_date. Unparseable
/// dates rank below any real date and ties keep the earliest input row.
/// Output is ordered by SKU.
pub fn latest_post_per_sku(posts: &DataFrame) -> Result<DataFrame> {
    let posted_at: Vec<Option<i64>> = posts
        .column(POST_DATE)?
        .str()?
        .into_iter()
        .map(|date| date.and_then(parse_post_date).map(|d| d.and_utc().timestamp_micros()))
        .collect();

    let mut ranked = posts.clone();
    ranked.with_column(Series::new(POSTED_AT.into(), posted_at))?;

    let newest_first = ranked
        .lazy()
        .filter(col(SKU).is_not_null())
        .sort(
            [POSTED_AT],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?;

    let latest = newest_first
        .unique_stable(Some(&[SKU.to_string()]), UniqueKeepStrategy::First, None)?
        .drop(POSTED_AT)?;
    Ok(latest
        .lazy()
        .sort([SKU], SortMultipleOptions::default())
        .collect()?)
}

#[derive(Debug, Clone)]
pub struct DedupOutput {
    pub erp: DataFrame,
    pub web: DataFrame,
    pub liaison: DataFrame,
}

impl DedupOutput {
    pub fn get(&self, source: SourceKind) -> &DataFrame {
        match source {
            SourceKind::Erp => &self.erp,
            SourceKind::Web => &self.web,
            SourceKind::Liaison => &self.liaison,
        }
    }
}

pub struct Deduplicator;

impl Deduplicator {
    pub fn dedup(&self, clean: &CleanOutput) -> Result<DedupOutput> {
        let erp = erp_dedup_plan(clean.erp.clone().lazy()).collect()?;
        info!("✅ erp_dedup: {} → {} rows (max per product_id)", clean.erp.height(), erp.height());

        let liaison = liaison_dedup_plan(clean.liaison.clone().lazy()).collect()?;
        info!(
            "✅ liaison_dedup: {} → {} rows (min id_web per product_id)",
            clean.liaison.height(),
            liaison.height()
        );

        let posts = product_posts(clean.web.clone().lazy()).collect()?;
        let web = latest_post_per_sku(&posts)?;
        info!(
            "✅ web_dedup: {} → {} product posts → {} rows (latest per sku)",
            clean.web.height(),
            posts.height(),
            web.height()
        );

        Ok(DedupOutput { erp, web, liaison })
    }

    pub fn validate(&self, gate: &Gate, output: &DedupOutput, baselines: &BaselineConfig) -> Result<()> {
        for source in SourceKind::ALL {
            let relation = source.dedup_relation();
            let df = output.get(source);
            gate.non_empty(relation, df)?;
            gate.unique_key(relation, df, source.natural_key())?;
        }

        gate.baseline("erp_dedup rows", output.erp.height() as f64, baselines.erp_dedup.map(|v| v as f64))?;
        gate.baseline("web_dedup rows", output.web.height() as f64, baselines.web_dedup.map(|v| v as f64))?;
        gate.baseline(
            "liaison_dedup rows",
            output.liaison.height() as f64,
            baselines.liaison_dedup.map(|v| v as f64),
        )?;

        info!(
            "✔️ Dedup rows - ERP: {}, Web: {}, Liaison: {}",
            output.erp.height(),
            output.web.height(),
            output.liaison.height()
        );
        Ok(())
    }
}
