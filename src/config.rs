//! Runtime configuration
//!
//! Priority: CLI flag > env var > YAML file > default. The YAML path comes
//! from `--config`/`NEURAL_CONFIG`; without one, `neural-memory.yaml` in the
//! working directory is used if it exists.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::search::embedding::Embedder;
use crate::search::provider::{EmbeddingBackend, LazyEmbedder};

pub const DEFAULT_CONFIG_FILE: &str = "neural-memory.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },
    #[error("no API key configured; set NEURAL_API_KEY or api_key in the config file")]
    MissingApiKey,
    #[error("cannot resolve listen address {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite note database
    pub db_path: PathBuf,
    /// Calibration baseline JSON
    pub calibration_file: PathBuf,
    pub host: String,
    pub port: u16,
    /// Shared secret for the HTTP transport
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub embedding_backend: EmbeddingBackend,
    /// Model download cache for the `mini-lm` backend
    pub model_cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/memory.db"),
            calibration_file: PathBuf::from("data/embedding_calibration.json"),
            host: "0.0.0.0".to_string(),
            port: 5000,
            api_key: None,
            embedding_backend: EmbeddingBackend::default(),
            model_cache_dir: None,
        }
    }
}

impl Config {
    /// Load from the YAML file (if any), then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_yaml_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file is a valid, empty config
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Apply environment-style overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("CALIBRATION_FILE") {
            self.calibration_file = PathBuf::from(v);
        }
        if let Some(v) = get("NEURAL_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = get("NEURAL_HOST") {
            self.host = v;
        }
        if let Some(v) = get("NEURAL_PORT") {
            self.port = v.trim().parse().map_err(|e| ConfigError::InvalidEnv {
                var: "NEURAL_PORT",
                reason: format!("{}", e),
            })?;
        }
        if let Some(v) = get("EMBEDDING_BACKEND") {
            self.embedding_backend = v
                .parse()
                .map_err(|reason| ConfigError::InvalidEnv {
                    var: "EMBEDDING_BACKEND",
                    reason,
                })?;
        }
        if let Some(v) = get("FASTEMBED_CACHE_DIR") {
            self.model_cache_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let target = format!("{}:{}", self.host, self.port);
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ConfigError::InvalidAddress(target))
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// The process-wide provider; the model loads on first use
    pub fn build_embedder(&self) -> Arc<dyn Embedder> {
        LazyEmbedder::for_backend(self.embedding_backend, self.model_cache_dir.clone()).shared()
    }
}
