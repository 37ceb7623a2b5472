use crate::config::MinioConfig;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PREFIX: &str = "CATALOG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub sources: SourcesConfig,
    pub rules: RulesConfig,
    pub baselines: BaselineConfig,
    pub publish: MinioConfig,
    pub logging: LoggingConfig,
}

/// Filesystem layout shared with the collaborator layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub store_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub erp_file: String,
    pub web_file: String,
    pub liaison_file: String,
}

/// Business rule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Literal stock_status value meaning "in stock".
    pub in_stock_status: String,
    /// Rows whose z-score strictly exceeds this are outliers.
    pub z_threshold: f64,
    pub snapshot_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselinePolicy {
    #[default]
    Warn,
    Enforce,
}

/// Dataset-specific regression expectations. Every value is optional; an
/// absent value disables that comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub policy: BaselinePolicy,
    pub erp_dedup: Option<usize>,
    pub web_dedup: Option<usize>,
    pub liaison_dedup: Option<usize>,
    pub fusion: Option<usize>,
    pub revenue_products: Option<usize>,
    pub revenue_total: Option<f64>,
    pub outliers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_name: String,
    pub json: bool,
}

impl PipelineConfig {
    /// Loads the TOML file (when present) and layers `CATALOG__SECTION__KEY`
    /// environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(file.as_path()).required(required))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PipelineError::Config(format!("{}: {}", file.display(), e)))?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rules.z_threshold.is_finite() {
            return Err(PipelineError::Config(
                "rules.z_threshold must be a finite number".to_string(),
            ));
        }
        if self.rules.in_stock_status.trim().is_empty() {
            return Err(PipelineError::Config(
                "rules.in_stock_status cannot be empty".to_string(),
            ));
        }
        for (name, file) in [
            ("erp_file", &self.sources.erp_file),
            ("web_file", &self.sources.web_file),
            ("liaison_file", &self.sources.liaison_file),
        ] {
            if file.trim().is_empty() {
                return Err(PipelineError::Config(format!("sources.{} cannot be empty", name)));
            }
        }
        Ok(())
    }

    pub fn erp_path(&self) -> PathBuf {
        self.paths.input_dir.join(&self.sources.erp_file)
    }

    pub fn web_path(&self) -> PathBuf {
        self.paths.input_dir.join(&self.sources.web_file)
    }

    pub fn liaison_path(&self) -> PathBuf {
        self.paths.input_dir.join(&self.sources.liaison_file)
    }

    /// Points every directory under one root, the layout used by tests and
    /// ad-hoc runs.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            paths: PathsConfig {
                input_dir: root.join("inputs"),
                output_dir: root.join("outputs"),
                store_dir: root.join("warehouse"),
                snapshot_dir: root.join("snapshots"),
                log_dir: root.join("logs"),
            },
            ..Self::default()
        }
    }
}

impl BaselineConfig {
    /// Expectations observed on the reference extracts.
    pub fn reference() -> Self {
        Self {
            policy: BaselinePolicy::Warn,
            erp_dedup: Some(825),
            web_dedup: Some(714),
            liaison_dedup: Some(825),
            fusion: Some(714),
            revenue_products: Some(573),
            revenue_total: Some(387_837.60),
            outliers: Some(30),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/inputs"),
            output_dir: PathBuf::from("data/outputs"),
            store_dir: PathBuf::from("data/warehouse"),
            snapshot_dir: PathBuf::from("data/snapshots"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            erp_file: "erp.csv".to_string(),
            web_file: "web.csv".to_string(),
            liaison_file: "liaison.csv".to_string(),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            in_stock_status: "instock".to_string(),
            z_threshold: 2.0,
            snapshot_label: "fusion_ok".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_name: "catalog-pipeline.log".to_string(),
            json: true,
        }
    }
}
