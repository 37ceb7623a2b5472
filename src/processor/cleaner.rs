use crate::error::Result;
use crate::models::columns::PRICE;
use crate::models::{CleanCounts, SourceKind};
use crate::processor::loader::RawSources;
use crate::processor::validation::Gate;
use polars::prelude::*;
use tracing::info;

/// Conjunction of `IS NOT NULL` over `columns`.
pub fn required_non_null(columns: &[&str]) -> Expr {
    columns
        .iter()
        .map(|name| col(*name).is_not_null())
        .reduce(|acc, expr| acc.and(expr))
        .unwrap_or_else(|| lit(true))
}

/// Product master rows need every field plus a strictly positive, finite
/// price.
pub fn erp_validity() -> Expr {
    required_non_null(SourceKind::Erp.required_columns())
        .and(col(PRICE).gt(lit(0.0)))
        .and(col(PRICE).is_finite())
}

pub fn web_validity() -> Expr {
    required_non_null(SourceKind::Web.required_columns())
}

pub fn liaison_validity() -> Expr {
    required_non_null(SourceKind::Liaison.required_columns())
}

pub fn validity_rule(source: SourceKind) -> Expr {
    match source {
        SourceKind::Erp => erp_validity(),
        SourceKind::Web => web_validity(),
        SourceKind::Liaison => liaison_validity(),
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub erp: DataFrame,
    pub web: DataFrame,
    pub liaison: DataFrame,
    pub counts: Vec<CleanCounts>,
}

impl CleanOutput {
    pub fn get(&self, source: SourceKind) -> &DataFrame {
        match source {
            SourceKind::Erp => &self.erp,
            SourceKind::Web => &self.web,
            SourceKind::Liaison => &self.liaison,
        }
    }

    /// One row per source: initial, kept and excluded row counts.
    pub fn summary_frame(&self) -> Result<DataFrame> {
        let sources: Vec<&str> = self.counts.iter().map(|c| c.source.name()).collect();
        let initial: Vec<u64> = self.counts.iter().map(|c| c.initial_rows as u64).collect();
        let clean: Vec<u64> = self.counts.iter().map(|c| c.clean_rows as u64).collect();
        let excluded: Vec<u64> = self.counts.iter().map(|c| c.excluded_rows() as u64).collect();

        let df = DataFrame::new(vec![
            Series::new("source".into(), sources).into(),
            Series::new("initial_rows".into(), initial).into(),
            Series::new("clean_rows".into(), clean).into(),
            Series::new("excluded_rows".into(), excluded).into(),
        ])?;
        Ok(df)
    }
}

/// Filters each raw source with its validity rule. Rows are never modified.
pub struct Cleaner;

impl Cleaner {
    pub fn clean(&self, raw: &RawSources) -> Result<CleanOutput> {
        let erp = self.clean_source(SourceKind::Erp, &raw.erp)?;
        let web = self.clean_source(SourceKind::Web, &raw.web)?;
        let liaison = self.clean_source(SourceKind::Liaison, &raw.liaison)?;

        let counts = SourceKind::ALL
            .iter()
            .zip([&erp, &web, &liaison])
            .map(|(source, clean)| CleanCounts {
                source: *source,
                initial_rows: raw.get(*source).height(),
                clean_rows: clean.height(),
            })
            .collect();

        Ok(CleanOutput {
            erp,
            web,
            liaison,
            counts,
        })
    }

    pub fn clean_source(&self, source: SourceKind, df: &DataFrame) -> Result<DataFrame> {
        let clean = df.clone().lazy().filter(validity_rule(source)).collect()?;
        info!(
            "✅ {} clean: kept {} of {} rows",
            source,
            clean.height(),
            df.height()
        );
        Ok(clean)
    }

    pub fn validate(&self, gate: &Gate, output: &CleanOutput) -> Result<()> {
        for source in SourceKind::ALL {
            let relation = source.clean_relation();
            let df = output.get(source);
            gate.non_empty(relation, df)?;
            gate.no_nulls(relation, df, source.required_columns())?;
        }
        gate.finite(SourceKind::Erp.clean_relation(), &output.erp, &[PRICE])?;
        gate.positive(SourceKind::Erp.clean_relation(), &output.erp, PRICE)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BaselinePolicy;

    fn raw() -> RawSources {
        RawSources {
            erp: df!(
                "product_id" => [Some(1i64), Some(2), None, Some(4), Some(5)],
                "onsale_web" => [Some(1i64), Some(1), Some(1), Some(0), Some(1)],
                "price" => [Some(10.0), Some(0.0), Some(5.0), Some(7.5), None],
                "stock_quantity" => [Some(3i64), Some(1), Some(1), Some(0), Some(2)],
                "stock_status" => [Some("instock"), Some("instock"), Some("instock"), Some("outofstock"), Some("instock")]
            )
            .unwrap(),
            web: df!(
                "sku" => [Some("A1"), None, Some("B2")],
                "post_type" => ["product", "product", "attachment"]
            )
            .unwrap(),
            liaison: df!(
                "product_id" => [Some(1i64), Some(4), None],
                "id_web" => [Some("A1"), None, Some("B2")]
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_erp_rule_filters_nulls_and_non_positive_prices() {
        let output = Cleaner.clean(&raw()).unwrap();
        let ids: Vec<Option<i64>> = output.erp.column("product_id").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(ids, vec![Some(1), Some(4)]);
    }

    #[test]
    fn test_infinite_price_is_excluded() {
        let erp = df!(
            "product_id" => [1i64, 2, 3],
            "onsale_web" => [1i64, 1, 1],
            "price" => [f64::INFINITY, 10.0, f64::NAN],
            "stock_quantity" => [3i64, 1, 2],
            "stock_status" => ["instock", "instock", "instock"]
        )
        .unwrap();

        let clean = Cleaner.clean_source(SourceKind::Erp, &erp).unwrap();
        let prices: Vec<Option<f64>> = clean.column("price").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(prices, vec![Some(10.0)]);
    }

    #[test]
    fn test_gate_rejects_infinite_price() {
        let mut output = Cleaner.clean(&raw()).unwrap();
        output.erp = df!(
            "product_id" => [1i64],
            "onsale_web" => [1i64],
            "price" => [f64::INFINITY],
            "stock_quantity" => [3i64],
            "stock_status" => ["instock"]
        )
        .unwrap();

        let gate = Gate::new("clean", BaselinePolicy::Enforce);
        let err = Cleaner.validate(&gate, &output).unwrap_err();
        assert!(err.is_validation_failure());
        assert!(err.to_string().contains("erp_clean"));
    }

    #[test]
    fn test_web_and_liaison_rules() {
        let output = Cleaner.clean(&raw()).unwrap();
        assert_eq!(output.web.height(), 2);
        assert_eq!(output.liaison.height(), 1);
        // Non-product posts survive cleaning; they are dropped by dedup.
        assert_eq!(output.web.column("sku").unwrap().null_count(), 0);
    }

    #[test]
    fn test_counts_and_summary() {
        let output = Cleaner.clean(&raw()).unwrap();
        assert_eq!(output.counts[0].initial_rows, 5);
        assert_eq!(output.counts[0].clean_rows, 2);
        assert_eq!(output.counts[0].excluded_rows(), 3);

        let summary = output.summary_frame().unwrap();
        assert_eq!(summary.height(), 3);
        let excluded = summary.column("excluded_rows").unwrap().u64().unwrap();
        assert_eq!(excluded.get(1), Some(1));
    }

    #[test]
    fn test_gate_passes_on_clean_output() {
        let output = Cleaner.clean(&raw()).unwrap();
        let gate = Gate::new("clean", BaselinePolicy::Enforce);
        assert!(Cleaner.validate(&gate, &output).is_ok());
    }

    #[test]
    fn test_gate_rejects_empty_source() {
        let mut sources = raw();
        sources.liaison = df!(
            "product_id" => [None::<i64>],
            "id_web" => [Some("A1")]
        )
        .unwrap();

        let output = Cleaner.clean(&sources).unwrap();
        let gate = Gate::new("clean", BaselinePolicy::Enforce);
        let err = Cleaner.validate(&gate, &output).unwrap_err();
        assert!(err.to_string().contains("liaison_clean"));
    }

    #[test]
    fn test_cleaning_twice_is_identical() {
        let first = Cleaner.clean(&raw()).unwrap();
        let second = Cleaner.clean(&raw()).unwrap();
        assert!(first.erp.equals_missing(&second.erp));
        assert!(first.web.equals_missing(&second.web));
        assert!(first.liaison.equals_missing(&second.liaison));
    }
}
