use crate::config::BaselineConfig;
use crate::error::Result;
use crate::models::columns::*;
use crate::models::relations::REVENUE_BY_PRODUCT;
use crate::processor::validation::Gate;
use polars::prelude::*;
use tracing::info;

/// Rows that generate revenue: positive stock and the in-stock status.
pub fn revenue_scope(in_stock_status: &str) -> Expr {
    col(STOCK_QUANTITY)
        .gt(lit(0))
        .and(col(STOCK_STATUS).eq(lit(in_stock_status.to_string())))
}

/// Half away from zero, two decimals.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// round(price × stock_quantity, 2)
pub fn line_revenue(price: f64, stock_quantity: i64) -> f64 {
    round_cents(price * stock_quantity as f64)
}

#[derive(Debug, Clone)]
pub struct RevenueOutput {
    pub by_product: DataFrame,
    pub total: f64,
}

impl RevenueOutput {
    pub fn total_frame(&self) -> Result<DataFrame> {
        Ok(DataFrame::new(vec![
            Series::new(REVENUE_TOTAL.into(), vec![self.total]).into(),
        ])?)
    }
}

pub struct Aggregator {
    in_stock_status: String,
}

impl Aggregator {
    pub fn new(in_stock_status: impl Into<String>) -> Self {
        Aggregator {
            in_stock_status: in_stock_status.into(),
        }
    }

    pub fn compute(&self, fusion: &DataFrame) -> Result<RevenueOutput> {
        let mut by_product = fusion
            .clone()
            .lazy()
            .filter(revenue_scope(&self.in_stock_status))
            .select([col(PRODUCT_ID), col(POST_TITLE), col(PRICE), col(STOCK_QUANTITY)])
            .sort([PRODUCT_ID], SortMultipleOptions::default())
            .collect()?;

        let prices = by_product.column(PRICE)?.f64()?;
        let quantities = by_product.column(STOCK_QUANTITY)?.i64()?;
        let revenues: Vec<Option<f64>> = prices
            .into_iter()
            .zip(quantities.into_iter())
            .map(|(price, quantity)| match (price, quantity) {
                (Some(p), Some(q)) => Some(line_revenue(p, q)),
                _ => None,
            })
            .collect();

        let total = round_cents(revenues.iter().flatten().sum());
        by_product.with_column(Series::new(REVENUE.into(), revenues))?;

        info!(
            "💰 Revenue computed for {} products, total {:.2}",
            by_product.height(),
            total
        );
        Ok(RevenueOutput { by_product, total })
    }

    pub fn validate(&self, gate: &Gate, output: &RevenueOutput, baselines: &BaselineConfig) -> Result<()> {
        let df = &output.by_product;
        gate.non_empty(REVENUE_BY_PRODUCT, df)?;
        gate.no_nulls(
            REVENUE_BY_PRODUCT,
            df,
            &[PRODUCT_ID, POST_TITLE, PRICE, STOCK_QUANTITY, REVENUE],
        )?;
        gate.finite(REVENUE_BY_PRODUCT, df, &[PRICE, REVENUE])?;
        gate.non_negative(REVENUE_BY_PRODUCT, df, REVENUE)?;

        gate.baseline(
            "revenue products",
            df.height() as f64,
            baselines.revenue_products.map(|v| v as f64),
        )?;
        gate.baseline(
            "revenue total",
            round_cents(output.total),
            baselines.revenue_total.map(round_cents),
        )?;
        Ok(())
    }
}
