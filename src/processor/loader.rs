use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::SourceKind;
use polars::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

/// The three raw extracts, cast to their typed schemas.
#[derive(Debug, Clone)]
pub struct RawSources {
    pub erp: DataFrame,
    pub web: DataFrame,
    pub liaison: DataFrame,
}

impl RawSources {
    pub fn get(&self, source: SourceKind) -> &DataFrame {
        match source {
            SourceKind::Erp => &self.erp,
            SourceKind::Web => &self.web,
            SourceKind::Liaison => &self.liaison,
        }
    }
}

pub struct Loader {
    erp_path: PathBuf,
    web_path: PathBuf,
    liaison_path: PathBuf,
}

impl Loader {
    pub fn new(erp_path: PathBuf, web_path: PathBuf, liaison_path: PathBuf) -> Self {
        Loader {
            erp_path,
            web_path,
            liaison_path,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.erp_path(), config.web_path(), config.liaison_path())
    }

    pub fn path_for(&self, source: SourceKind) -> &Path {
        match source {
            SourceKind::Erp => &self.erp_path,
            SourceKind::Web => &self.web_path,
            SourceKind::Liaison => &self.liaison_path,
        }
    }

    /// Loads all three sources. Any missing file aborts before anything else
    /// is read.
    pub fn load_all(&self) -> Result<RawSources> {
        for source in SourceKind::ALL {
            let path = self.path_for(source);
            if !path.is_file() {
                return Err(PipelineError::missing(format!("{} extract", source), path));
            }
        }

        Ok(RawSources {
            erp: self.load(SourceKind::Erp)?,
            web: self.load(SourceKind::Web)?,
            liaison: self.load(SourceKind::Liaison)?,
        })
    }

    pub fn load(&self, source: SourceKind) -> Result<DataFrame> {
        let path = self.path_for(source);
        let mut df = read_csv_as_text(path)?;
        normalize_headers(&mut df)?;

        let column_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        for (name, _) in source.schema() {
            if !column_names.iter().any(|c| c == name) {
                return Err(PipelineError::missing(
                    format!("column '{}' in {} extract", name, source),
                    path,
                ));
            }
        }

        let empty_rows = count_empty_rows(&df);
        let typed = cast_to_schema(df, source)?;

        info!(
            "{:<8}: {} rows (empty rows: {}) from {}",
            source.name().to_uppercase(),
            typed.height(),
            empty_rows,
            path.display()
        );
        Ok(typed)
    }

    /// Row count of a raw extract, as used by the audit report.
    pub fn count_rows(&self, source: SourceKind) -> Result<usize> {
        let path = self.path_for(source);
        Ok(read_csv_as_text(path)?.height())
    }
}

/// Reads a CSV file with every column as text; typing happens afterwards so
/// malformed values become nulls instead of failing the read.
pub fn read_csv_as_text(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(PipelineError::missing("CSV file", path));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

fn header_regex() -> &'static Regex {
    static HEADER_RE: OnceLock<Regex> = OnceLock::new();
    HEADER_RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static header pattern"))
}

/// `" Product ID "` -> `"product_id"`.
pub fn normalize_header(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    header_regex()
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

fn normalize_headers(df: &mut DataFrame) -> Result<()> {
    let originals: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    for original in originals {
        let normalized = normalize_header(&original);
        if normalized != original {
            df.rename(&original, normalized.into())?;
        }
    }
    Ok(())
}

fn count_empty_rows(df: &DataFrame) -> usize {
    (0..df.height())
        .filter(|&row| {
            df.get_columns()
                .iter()
                .all(|column| column.get(row).map(|v| v.is_null()).unwrap_or(false))
        })
        .count()
}

/// Non-strict casts: unparseable cells become null, as do empty text
/// cells. Integer columns go through Float64 so values exported as `12.0`
/// still parse; a fractional value such as `2.5` is not an integer and
/// becomes null rather than being truncated.
fn cast_to_schema(df: DataFrame, source: SourceKind) -> Result<DataFrame> {
    let casts: Vec<Expr> = source
        .schema()
        .into_iter()
        .map(|(name, dtype)| match dtype {
            DataType::String => when(col(name).eq(lit("")))
                .then(lit(NULL))
                .otherwise(col(name))
                .cast(DataType::String)
                .alias(name),
            DataType::Int64 => {
                let float = col(name).cast(DataType::Float64);
                let integral = float
                    .clone()
                    .cast(DataType::Int64)
                    .cast(DataType::Float64)
                    .eq(float.clone());
                when(integral)
                    .then(float.cast(DataType::Int64))
                    .otherwise(lit(NULL))
                    .cast(DataType::Int64)
                    .alias(name)
            }
            other => col(name).cast(other),
        })
        .collect();

    Ok(df.lazy().with_columns(casts).collect()?)
}
