use crate::config::BaselineConfig;
use crate::error::{PipelineError, Result};
use crate::models::columns::*;
use crate::models::relations::{ORDINARIES, OUTLIERS};
use crate::models::{LABEL_ORDINARY, LABEL_OUTLIER};
use crate::processor::validation::Gate;
use ndarray::Array1;
use polars::prelude::*;
use tracing::{debug, info};

pub const DEFAULT_Z_THRESHOLD: f64 = 2.0;

/// Population statistics (ddof = 0) of the catalog price column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl PriceStats {
    pub fn from_prices(prices: &[f64]) -> Result<Self> {
        let values = Array1::from_vec(prices.to_vec());
        let Some(mean) = values.mean() else {
            return Err(PipelineError::validation(
                "detect",
                "no prices to compute statistics from",
            ));
        };
        let std_dev = values.std(0.0);

        if !mean.is_finite() || !std_dev.is_finite() || std_dev == 0.0 {
            return Err(PipelineError::validation(
                "detect",
                format!(
                    "price distribution is degenerate (mean {}, std {}), z-scores are undefined",
                    mean, std_dev
                ),
            ));
        }

        Ok(PriceStats {
            count: prices.len(),
            mean,
            std_dev,
        })
    }
}

pub fn price_z_score(price: f64, stats: &PriceStats) -> f64 {
    (price - stats.mean) / stats.std_dev
}

#[derive(Debug, Clone)]
pub struct AnomalyOutput {
    pub stats: PriceStats,
    pub outliers: DataFrame,
    pub ordinaries: DataFrame,
}

pub struct AnomalyDetector {
    threshold: f64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        AnomalyDetector::new(DEFAULT_Z_THRESHOLD)
    }
}

impl AnomalyDetector {
    pub fn new(threshold: f64) -> Self {
        AnomalyDetector { threshold }
    }

    /// Splits the catalog into rows whose price z-score exceeds the
    /// threshold and the rest. Statistics are checked before any row is
    /// scored.
    pub fn detect(&self, fusion: &DataFrame) -> Result<AnomalyOutput> {
        let scored = fusion
            .clone()
            .lazy()
            .select([col(PRODUCT_ID), col(POST_TITLE), col(PRICE)])
            .filter(col(PRICE).is_not_null())
            .sort([PRODUCT_ID], SortMultipleOptions::default())
            .collect()?;

        let prices: Vec<f64> = scored.column(PRICE)?.f64()?.into_no_null_iter().collect();
        let stats = PriceStats::from_prices(&prices)?;
        debug!(
            "Price stats over {} rows: mean {:.4}, std {:.4}",
            stats.count, stats.mean, stats.std_dev
        );

        let z_scores: Vec<f64> = prices.iter().map(|p| price_z_score(*p, &stats)).collect();
        let labels: Vec<&str> = z_scores
            .iter()
            .map(|z| if *z > self.threshold { LABEL_OUTLIER } else { LABEL_ORDINARY })
            .collect();

        let mut scored = scored;
        scored.with_column(Series::new(Z_SCORE.into(), z_scores))?;
        scored.with_column(Series::new(CLASSIFICATION.into(), labels))?;

        let outliers = scored
            .clone()
            .lazy()
            .filter(col(CLASSIFICATION).eq(lit(LABEL_OUTLIER)))
            .collect()?;
        let ordinaries = scored
            .lazy()
            .filter(col(CLASSIFICATION).eq(lit(LABEL_ORDINARY)))
            .collect()?;

        info!(
            "🔎 {} outliers and {} ordinaries (z > {})",
            outliers.height(),
            ordinaries.height(),
            self.threshold
        );
        Ok(AnomalyOutput {
            stats,
            outliers,
            ordinaries,
        })
    }

    pub fn validate(&self, gate: &Gate, output: &AnomalyOutput, baselines: &BaselineConfig) -> Result<()> {
        gate.finite(OUTLIERS, &output.outliers, &[PRICE, Z_SCORE])?;
        gate.finite(ORDINARIES, &output.ordinaries, &[PRICE, Z_SCORE])?;
        gate.baseline(
            "outliers",
            output.outliers.height() as f64,
            baselines.outliers.map(|v| v as f64),
        )?;
        Ok(())
    }
}
