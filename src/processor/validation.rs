use crate::config::BaselinePolicy;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use tracing::{info, warn};

/// Post-stage assertions. Every failed check becomes a
/// `ValidationFailure` naming the stage, the relation and the offending
/// row or metric.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    stage: &'static str,
    policy: BaselinePolicy,
}

impl Gate {
    pub fn new(stage: &'static str, policy: BaselinePolicy) -> Self {
        Gate { stage, policy }
    }

    fn fail(&self, detail: String) -> PipelineError {
        PipelineError::validation(self.stage, detail)
    }

    pub fn non_empty(&self, relation: &str, df: &DataFrame) -> Result<()> {
        if df.height() == 0 {
            return Err(self.fail(format!("relation '{}' is empty", relation)));
        }
        Ok(())
    }

    pub fn columns_present(&self, relation: &str, df: &DataFrame, columns: &[&str]) -> Result<()> {
        let missing: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|name| df.column(name).is_err())
            .collect();
        if !missing.is_empty() {
            return Err(self.fail(format!(
                "relation '{}' is missing critical columns: {}",
                relation,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub fn no_nulls(&self, relation: &str, df: &DataFrame, columns: &[&str]) -> Result<()> {
        self.columns_present(relation, df, columns)?;
        for name in columns {
            let column = df.column(name)?;
            if column.null_count() == 0 {
                continue;
            }
            let first_row = column
                .is_null()
                .into_iter()
                .position(|is_null| is_null == Some(true))
                .unwrap_or(0);
            return Err(self.fail(format!(
                "relation '{}' has {} null value(s) in '{}' (first at row {})",
                relation,
                column.null_count(),
                name,
                first_row
            )));
        }
        Ok(())
    }

    /// count(*) == count(distinct key)
    pub fn unique_key(&self, relation: &str, df: &DataFrame, key: &str) -> Result<()> {
        self.columns_present(relation, df, &[key])?;
        let distinct = df.column(key)?.as_materialized_series().n_unique()?;
        if distinct != df.height() {
            return Err(self.fail(format!(
                "relation '{}' has {} duplicate value(s) on key '{}'",
                relation,
                df.height() - distinct,
                key
            )));
        }
        Ok(())
    }

    pub fn positive(&self, relation: &str, df: &DataFrame, column: &str) -> Result<()> {
        self.numeric_rule(relation, df, column, "> 0", |v| v > 0.0)
    }

    pub fn non_negative(&self, relation: &str, df: &DataFrame, column: &str) -> Result<()> {
        self.numeric_rule(relation, df, column, ">= 0", |v| v >= 0.0)
    }

    /// No null, NaN or infinite values.
    pub fn finite(&self, relation: &str, df: &DataFrame, columns: &[&str]) -> Result<()> {
        self.no_nulls(relation, df, columns)?;
        for name in columns {
            self.numeric_rule(relation, df, name, "finite", f64::is_finite)?;
        }
        Ok(())
    }

    fn numeric_rule(
        &self,
        relation: &str,
        df: &DataFrame,
        column: &str,
        rule: &str,
        check: impl Fn(f64) -> bool,
    ) -> Result<()> {
        self.columns_present(relation, df, &[column])?;
        let values = df.column(column)?.cast(&DataType::Float64)?;
        let values = values.f64()?;

        let violations: Vec<(usize, f64)> = values
            .into_iter()
            .enumerate()
            .filter_map(|(row, value)| value.filter(|v| !check(*v)).map(|v| (row, v)))
            .collect();

        if let Some((row, value)) = violations.first() {
            return Err(self.fail(format!(
                "relation '{}' has {} value(s) in '{}' violating {} (first: {} at row {})",
                relation,
                violations.len(),
                column,
                rule,
                value,
                row
            )));
        }
        Ok(())
    }

    /// Compares a metric with its dataset-specific expectation. Under the
    /// `warn` policy a mismatch is only logged.
    pub fn baseline(&self, metric: &str, observed: f64, expected: Option<f64>) -> Result<()> {
        let Some(expected) = expected else {
            return Ok(());
        };

        if (observed - expected).abs() < 0.005 {
            info!("✔️ {} matches baseline: {}", metric, expected);
            return Ok(());
        }

        match self.policy {
            BaselinePolicy::Warn => {
                warn!(
                    "⚠️ [{}] {} is {} (baseline: {})",
                    self.stage, metric, observed, expected
                );
                Ok(())
            }
            BaselinePolicy::Enforce => Err(self.fail(format!(
                "{} is {} (baseline: {})",
                metric, observed, expected
            ))),
        }
    }
}
