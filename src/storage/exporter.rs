use crate::error::Result;
use polars::prelude::*;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::fs::{self, File};
use std::path::PathBuf;
use tracing::info;

/// Writes pipeline relations out as files the collaborator layer picks up.
#[derive(Debug, Clone)]
pub struct ArtifactExporter {
    output_dir: PathBuf,
}

impl ArtifactExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(ArtifactExporter { output_dir })
    }

    pub fn write_csv(&self, name: &str, df: &mut DataFrame) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}.csv", name));
        let mut file = File::create(&path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(df)?;

        info!("📁 Exported {} rows to {}", df.height(), path.display());
        Ok(path)
    }

    /// Single-sheet workbook with a bold header row. Numeric columns are
    /// written as numbers, everything else as text; nulls stay empty.
    pub fn write_xlsx(&self, name: &str, df: &DataFrame) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}.xlsx", name));

        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name(name))?;

        for (col_idx, column) in df.get_columns().iter().enumerate() {
            let col_idx = col_idx as u16;
            worksheet.write_string_with_format(0, col_idx, column.name().as_str(), &header_format)?;

            if is_numeric(column.dtype()) {
                let values = column.cast(&DataType::Float64)?;
                for (row_idx, value) in values.f64()?.into_iter().enumerate() {
                    if let Some(v) = value {
                        worksheet.write_number(row_idx as u32 + 1, col_idx, v)?;
                    }
                }
            } else {
                let values = column.cast(&DataType::String)?;
                for (row_idx, value) in values.str()?.into_iter().enumerate() {
                    if let Some(v) = value {
                        worksheet.write_string(row_idx as u32 + 1, col_idx, v)?;
                    }
                }
            }
        }

        workbook.save(&path)?;
        info!("📁 Exported {} rows to {}", df.height(), path.display());
        Ok(path)
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}.json", name));
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content)?;
        info!("📁 Wrote {}", path.display());
        Ok(path)
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// Excel caps worksheet names at 31 characters.
fn sheet_name(name: &str) -> String {
    name.chars().take(31).collect()
}
