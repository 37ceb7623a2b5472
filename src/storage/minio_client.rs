use crate::config::MinioConfig;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::future::try_join_all;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for finished run artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Uploads every file and returns the keys it was stored under.
    async fn publish(&self, files: &[PathBuf]) -> Result<Vec<String>>;

    /// Confirms each key is visible in the destination.
    async fn verify(&self, keys: &[String]) -> Result<()>;
}

pub struct MinioStorage {
    bucket: Bucket,
    config: MinioConfig,
}

impl MinioStorage {
    pub fn from_config(config: &MinioConfig) -> Result<Self> {
        config.validate()?;

        let region = Region::Custom {
            region: config.get_region().to_owned(),
            endpoint: config.endpoint.clone(),
        };

        let credentials = Credentials::new(
            Some(config.get_access_key()?),
            Some(config.get_secret_key()?),
            None, // security_token
            None, // session_token
            None, // expiration
        )?;

        let bucket = Bucket::new(&config.bucket_name, region, credentials)?;

        let bucket = if config.is_path_style() {
            *bucket.with_path_style()
        } else {
            *bucket
        };

        Ok(MinioStorage {
            bucket,
            config: config.clone(),
        })
    }

    pub async fn ensure_bucket(&self) -> Result<()> {
        match self.bucket.exists().await {
            Ok(true) => {
                info!("Bucket '{}' already exists", self.bucket.name);
            }
            Ok(false) => {
                let config = s3::BucketConfiguration::default();
                s3::Bucket::create(
                    &self.bucket.name,
                    self.bucket.region.clone(),
                    self.bucket.credentials().await?,
                    config,
                )
                .await
                .map_err(|e| anyhow!("Failed to create bucket: {}", e))?;
                info!("Created bucket: {}", self.bucket.name);
            }
            Err(e) => {
                return Err(anyhow!("Failed to check bucket existence: {}", e));
            }
        }
        Ok(())
    }

    pub async fn put_file(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Artifact path has no file name: {}", path.display()))?;
        let key = self.config.object_key(file_name);

        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let response = self.bucket.put_object(&key, &content).await?;

        if response.status_code() == 200 {
            info!("🚀 Uploaded {} ➔ {}", file_name, key);
            Ok(key)
        } else {
            Err(anyhow!(
                "Failed to store {}: HTTP {}",
                key,
                response.status_code()
            ))
        }
    }

    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let list = self.bucket.list(prefix.to_string(), None).await?;

        let mut object_names = Vec::new();
        for result in list {
            for object in result.contents {
                object_names.push(object.key);
            }
        }

        Ok(object_names)
    }

    pub fn get_bucket_name(&self) -> &str {
        &self.bucket.name
    }
}

#[async_trait]
impl ArtifactSink for MinioStorage {
    async fn publish(&self, files: &[PathBuf]) -> Result<Vec<String>> {
        self.ensure_bucket().await?;
        try_join_all(files.iter().map(|path| self.put_file(path))).await
    }

    async fn verify(&self, keys: &[String]) -> Result<()> {
        let found: BTreeSet<String> = self
            .list_objects(&self.config.prefix)
            .await?
            .into_iter()
            .collect();

        let missing = missing_keys(keys, &found);
        if !missing.is_empty() {
            return Err(anyhow!(
                "Objects missing from {}/{}: {}",
                self.get_bucket_name(),
                self.config.prefix,
                missing.join(", ")
            ));
        }

        info!("🎯 All {} artifacts present in bucket '{}'", keys.len(), self.get_bucket_name());
        Ok(())
    }
}

fn missing_keys(expected: &[String], found: &BTreeSet<String>) -> Vec<String> {
    expected
        .iter()
        .filter(|key| !found.contains(*key))
        .cloned()
        .collect()
}
