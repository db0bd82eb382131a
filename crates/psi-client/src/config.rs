//! Client configuration

use psi_core::constants::{DEFAULT_KEY_SIZE, DEFAULT_PAGE_SIZE};
use psi_core::AlgorithmKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::http::{normalize_base_url, DEFAULT_TIMEOUT_SECS};

/// Default Redis port
pub const DEFAULT_CACHE_PORT: u16 = 6379;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: DEFAULT_CACHE_PORT,
        }
    }
}

/// Everything one `compute` run needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the PSI server
    pub server_url: String,
    /// Algorithm wire name (BS, DH, ECBS, ECDH)
    pub algorithm: String,
    pub key_size: u32,
    /// Server entries requested per page
    pub page_size: u32,
    /// Bloom filters older than this are ignored; unset disables pre-filtering
    pub bloom_filter_max_age_minutes: Option<i64>,
    pub request_timeout_secs: u64,
    /// Client dataset, one entry per line
    pub input_dataset: Option<PathBuf>,
    /// Intersection output, one entry per line
    pub output: PathBuf,
    /// Key description to reuse
    pub key_description: Option<PathBuf>,
    /// Where the run's key description is written
    pub output_key_description: PathBuf,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            algorithm: AlgorithmKind::DiffieHellman.as_str().to_string(),
            key_size: DEFAULT_KEY_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            bloom_filter_max_age_minutes: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            input_dataset: None,
            output: PathBuf::from("out.txt"),
            key_description: None,
            output_key_description: PathBuf::from("key.json"),
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Check the values a run depends on before any network activity
    pub fn validate(&self) -> Result<()> {
        normalize_base_url(&self.server_url)?;
        self.algorithm_kind()?;
        if self.key_size == 0 {
            return Err(ClientError::Config("key_size must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(ClientError::Config("page_size must be positive".into()));
        }
        if matches!(self.bloom_filter_max_age_minutes, Some(m) if m <= 0) {
            return Err(ClientError::Config(
                "bloom_filter_max_age_minutes must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn algorithm_kind(&self) -> Result<AlgorithmKind> {
        Ok(self.algorithm.parse::<AlgorithmKind>()?)
    }

    pub fn bloom_filter_max_age(&self) -> Option<chrono::Duration> {
        self.bloom_filter_max_age_minutes.map(chrono::Duration::minutes)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.algorithm, "DH");
        assert_eq!(config.key_size, 2048);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.output, PathBuf::from("out.txt"));
        assert_eq!(config.output_key_description, PathBuf::from("key.json"));
        assert_eq!(config.cache.port, 6379);
        assert!(config.bloom_filter_max_age().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");

        let mut config = ClientConfig::default();
        config.algorithm = "ECDH".into();
        config.key_size = 256;
        config.bloom_filter_max_age_minutes = Some(30);
        config.cache.enabled = true;
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.bloom_filter_max_age(), Some(chrono::Duration::minutes(30)));
    }

    #[test]
    fn test_partial_document_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(&path, r#"{"server_url":"https://psi.example.com","cache":{"enabled":true}}"#).unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.server_url, "https://psi.example.com");
        assert_eq!(config.page_size, 100);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.host, "localhost");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ClientConfig::default();
        config.algorithm = "RSA".into();
        assert!(matches!(config.validate(), Err(ClientError::UnsupportedAlgorithm(_))));

        let mut config = ClientConfig::default();
        config.page_size = 0;
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let mut config = ClientConfig::default();
        config.server_url = "localhost".into();
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let mut config = ClientConfig::default();
        config.bloom_filter_max_age_minutes = Some(0);
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }
}
