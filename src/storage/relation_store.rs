use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const RELATION_EXT: &str = "parquet";

/// Embedded relational store: one parquet file per named relation inside a
/// single directory. Writes replace the whole relation atomically, so a
/// stage can always be rerun from scratch.
#[derive(Debug, Clone)]
pub struct RelationStore {
    root: PathBuf,
}

impl RelationStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| PipelineError::StoreConnection {
            path: root.clone(),
            source,
        })?;

        if !root.is_dir() {
            return Err(PipelineError::StoreConnection {
                path: root.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotADirectory,
                    "store root is not a directory",
                ),
            });
        }

        debug!("Opened relation store at {}", root.display());
        Ok(RelationStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relation_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, RELATION_EXT))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.relation_path(name).is_file()
    }

    /// Overwrites `name` with `df`. The file is written beside the target and
    /// renamed over it, so readers never observe a half-written relation.
    pub fn replace(&self, name: &str, df: &mut DataFrame) -> Result<()> {
        let target = self.relation_path(name);
        let staging = self.root.join(format!(".{}.{}.tmp", name, RELATION_EXT));

        {
            let file = File::create(&staging)?;
            ParquetWriter::new(file).finish(df)?;
        }
        fs::rename(&staging, &target)?;

        info!("Stored relation '{}' ({} rows)", name, df.height());
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<DataFrame> {
        let path = self.relation_path(name);
        if !path.is_file() {
            return Err(PipelineError::missing(format!("relation '{}'", name), path));
        }

        let file = File::open(&path)?;
        let df = ParquetReader::new(file).finish()?;
        Ok(df)
    }

    pub fn row_count(&self, name: &str) -> Result<usize> {
        Ok(self.read(name)?.height())
    }

    /// Names of every stored relation, sorted.
    pub fn relation_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RELATION_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Copies the named relations into `snapshot_dir/label`, replacing a
    /// previous snapshot with the same label. Every relation must exist;
    /// nothing is touched otherwise.
    pub fn snapshot(&self, snapshot_dir: &Path, label: &str, relations: &[&str]) -> Result<PathBuf> {
        if let Some(missing) = relations.iter().find(|name| !self.exists(name)) {
            return Err(PipelineError::missing(
                format!("relation '{}'", missing),
                self.relation_path(missing),
            ));
        }

        let destination = snapshot_dir.join(label);
        if destination.exists() {
            fs::remove_dir_all(&destination)?;
        }
        fs::create_dir_all(&destination)?;

        for name in relations {
            let source = self.relation_path(name);
            fs::copy(&source, destination.join(format!("{}.{}", name, RELATION_EXT)))?;
        }

        info!(
            "Snapshot '{}' written with {} relations: {}",
            label,
            relations.len(),
            destination.display()
        );
        Ok(destination)
    }
}
