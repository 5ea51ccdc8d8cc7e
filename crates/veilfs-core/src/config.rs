use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{VeilError, VeilResult};

/// Top-level configuration (loaded from veilfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    pub crypto: CryptoConfig,
}

/// Content encryption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Content cipher name (default: "AES-256-CFB"; unsupported names fall
    /// back to the default with a warning)
    pub cipher: String,
    /// RSA modulus size in bits for generated key pairs (default: 4096)
    pub private_key_bits: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            cipher: "AES-256-CFB".into(),
            private_key_bits: 4096,
        }
    }
}

impl VeilConfig {
    /// Load configuration from a TOML file. Missing sections and fields
    /// take their defaults.
    pub fn load(path: &Path) -> VeilResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw).map_err(|e| VeilError::Config(e.to_string()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}
