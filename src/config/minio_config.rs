use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// `[publish]` section: where run artifacts are mirrored after a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinioConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub bucket_name: String,
    /// Key prefix for every uploaded artifact, e.g. `data/outputs/`.
    pub prefix: String,
    pub region: Option<String>,
    pub path_style: Option<bool>,
    // Optional environment variable names for customization
    pub env_access_key: Option<String>,
    pub env_secret_key: Option<String>,
    // These fields will be loaded from environment variables
    #[serde(skip)]
    pub access_key: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl MinioConfig {
    pub fn load_credentials(&mut self) -> Result<()> {
        let access_key_var = self.env_access_key.as_deref().unwrap_or("MINIO_ACCESS_KEY");
        let secret_key_var = self.env_secret_key.as_deref().unwrap_or("MINIO_SECRET_KEY");

        self.access_key = env::var(access_key_var)
            .with_context(|| format!("Missing environment variable: {}", access_key_var))?
            .into();

        self.secret_key = env::var(secret_key_var)
            .with_context(|| format!("Missing environment variable: {}", secret_key_var))?
            .into();

        Ok(())
    }

    pub fn get_access_key(&self) -> Result<&str> {
        self.access_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Access key not loaded"))
    }

    pub fn get_secret_key(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Secret key not loaded"))
    }

    pub fn is_path_style(&self) -> bool {
        self.path_style.unwrap_or(true)
    }

    pub fn get_region(&self) -> &str {
        self.region.as_deref().unwrap_or("us-east-1")
    }

    /// Object key for an artifact file name under the configured prefix.
    pub fn object_key(&self, file_name: &str) -> String {
        if self.prefix.is_empty() || self.prefix.ends_with('/') {
            format!("{}{}", self.prefix, file_name)
        } else {
            format!("{}/{}", self.prefix, file_name)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(anyhow::anyhow!("MinIO endpoint cannot be empty"));
        }

        if self.bucket_name.is_empty() {
            return Err(anyhow::anyhow!("MinIO bucket name cannot be empty"));
        }

        if self.access_key.is_none() {
            return Err(anyhow::anyhow!("MinIO access key not loaded"));
        }

        if self.secret_key.is_none() {
            return Err(anyhow::anyhow!("MinIO secret key not loaded"));
        }

        Ok(())
    }
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:9000".to_string(),
            bucket_name: "catalog".to_string(),
            prefix: "data/outputs/".to_string(),
            region: Some("us-east-1".to_string()),
            path_style: Some(true),
            env_access_key: None,
            env_secret_key: None,
            access_key: None,
            secret_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = MinioConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.endpoint, "http://localhost:9000");
        assert_eq!(config.bucket_name, "catalog");
        assert_eq!(config.get_region(), "us-east-1");
        assert!(config.is_path_style());
    }

    #[test]
    fn test_object_key_joins_prefix() {
        let mut config = MinioConfig::default();
        assert_eq!(config.object_key("fusion.csv"), "data/outputs/fusion.csv");

        config.prefix = "exports".to_string();
        assert_eq!(config.object_key("fusion.csv"), "exports/fusion.csv");

        config.prefix = String::new();
        assert_eq!(config.object_key("fusion.csv"), "fusion.csv");
    }

    #[test]
    fn test_credentials_loading() {
        unsafe {
            env::set_var("TEST_CATALOG_ACCESS_KEY", "test_access");
            env::set_var("TEST_CATALOG_SECRET_KEY", "test_secret");
        }

        let mut config = MinioConfig::default();
        config.env_access_key = Some("TEST_CATALOG_ACCESS_KEY".to_string());
        config.env_secret_key = Some("TEST_CATALOG_SECRET_KEY".to_string());

        let result = config.load_credentials();
        assert!(result.is_ok());
        assert_eq!(config.get_access_key().unwrap(), "test_access");
        assert_eq!(config.get_secret_key().unwrap(), "test_secret");
        assert!(config.validate().is_ok());

        unsafe {
            env::remove_var("TEST_CATALOG_ACCESS_KEY");
            env::remove_var("TEST_CATALOG_SECRET_KEY");
        }
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = MinioConfig::default();
        assert!(config.validate().is_err());
    }
}
