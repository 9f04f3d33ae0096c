//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pkd_validation::EngineConfig;

use crate::error::ConfigError;

/// Configuration for a bundle [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Emit a progress event every this many records (default: 50).
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Link limit when building trust paths (default: 5).
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Deadline for one revocation lookup, in seconds (default: 5).
    #[serde(default = "default_revocation_timeout")]
    pub revocation_timeout_secs: u64,

    /// Smallest Master List accepted, in bytes (default: 100).
    #[serde(default = "default_min_container_len")]
    pub min_container_len: usize,

    /// PEM or DER certificate that Master List signers must chain to.
    #[serde(default)]
    pub trust_anchor_path: Option<PathBuf>,

    /// Accept Master Lists without a trust anchor, trusting whichever
    /// embedded certificate signed them (default: false).
    #[serde(default)]
    pub allow_unanchored_master_lists: bool,

    /// Validation policy.
    #[serde(default)]
    pub validation: ValidationPolicy,
}

/// Policy knobs for the validation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Treat a DSC asserting `cA` as a warning rather than a failure
    /// (default: true).
    #[serde(default = "default_allow_dsc_ca_flag")]
    pub allow_dsc_ca_flag: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
            max_chain_depth: default_max_chain_depth(),
            revocation_timeout_secs: default_revocation_timeout(),
            min_container_len: default_min_container_len(),
            trust_anchor_path: None,
            allow_unanchored_master_lists: false,
            validation: ValidationPolicy::default(),
        }
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            allow_dsc_ca_flag: default_allow_dsc_ca_flag(),
        }
    }
}

impl PipelineConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Engine tuning derived from this config.
    #[must_use]
    pub const fn engine(&self) -> EngineConfig {
        EngineConfig {
            revocation_timeout: Duration::from_secs(self.revocation_timeout_secs),
            allow_dsc_ca_flag: self.validation.allow_dsc_ca_flag,
            progress_interval: self.progress_interval,
            max_chain_depth: self.max_chain_depth,
        }
    }
}

// Default value functions for serde.
const fn default_progress_interval() -> usize {
    50
}

const fn default_max_chain_depth() -> usize {
    pkd_validation::DEFAULT_MAX_CHAIN_DEPTH
}

const fn default_revocation_timeout() -> u64 {
    5
}

const fn default_min_container_len() -> usize {
    pkd_parser::DEFAULT_MIN_CONTAINER_LEN
}

const fn default_allow_dsc_ca_flag() -> bool {
    true
}
