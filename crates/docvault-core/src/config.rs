//! Process-wide configuration, built once at startup and passed by reference.

use crate::chunking::ChunkingConfig;
use crate::error::{VaultError, VaultResult};
use crate::key_derivation::KdfConfig;
use crate::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable holding the master secret.
pub const ENV_MASTER_SECRET: &str = "DOCVAULT_MASTER_SECRET";
/// Environment variable overriding the storage directory.
pub const ENV_DATA_DIR: &str = "DOCVAULT_DATA_DIR";

/// The secret every tenant key is derived from. Never serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Deserialize)]
#[serde(transparent)]
pub struct MasterSecret(String);

impl MasterSecret {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw secret bytes, for key derivation only.
    pub fn expose_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// True if the secret is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterSecret([REDACTED])")
    }
}

/// Where the local object store and catalog live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for blobs and the document catalog
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./docvault-data"),
        }
    }
}

impl StorageConfig {
    /// Directory holding encrypted blobs.
    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    /// Snapshot file holding document and chunk records.
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.json")
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Master secret for tenant key derivation
    #[serde(skip_serializing)]
    pub master_secret: Option<MasterSecret>,
    /// Key derivation parameters
    pub kdf: KdfConfig,
    /// Chunking parameters
    pub chunking: ChunkingConfig,
    /// Pipeline batching and scheduling
    pub pipeline: PipelineConfig,
    /// Local storage layout
    pub storage: StorageConfig,
    /// Default tracing filter directive
    pub log_level: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            master_secret: None,
            kdf: KdfConfig::default(),
            chunking: ChunkingConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            log_level: String::from("info"),
        }
    }
}

impl VaultConfig {
    /// Load configuration from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> VaultResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| VaultError::Configuration(format!("{}: {}", path.display(), e))),
            "json" => serde_json::from_str(&contents)
                .map_err(|e| VaultError::Configuration(format!("{}: {}", path.display(), e))),
            _ => Err(VaultError::Configuration(format!(
                "unsupported config file extension: {:?}",
                ext
            ))),
        }
    }

    /// Set the master secret.
    pub fn with_master_secret(mut self, secret: impl Into<String>) -> Self {
        self.master_secret = Some(MasterSecret::new(secret));
        self
    }

    /// Apply `DOCVAULT_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_MASTER_SECRET) {
            self.master_secret = Some(MasterSecret::new(secret));
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        self
    }

    /// The configured master secret, or a configuration error.
    pub fn require_master_secret(&self) -> VaultResult<&MasterSecret> {
        match &self.master_secret {
            Some(secret) if !secret.is_blank() => Ok(secret),
            _ => Err(VaultError::Configuration(format!(
                "no master secret configured (set {} or master_secret)",
                ENV_MASTER_SECRET
            ))),
        }
    }

    /// Check every section; called once at startup.
    pub fn validate(&self) -> VaultResult<()> {
        self.require_master_secret()?;
        self.kdf.validate()?;
        self.chunking.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}
