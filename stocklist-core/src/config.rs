//! Job configuration.
//!
//! Every field has a default, so running without a config file is the normal
//! case. A TOML file can override any subset:
//!
//! ```toml
//! snapshot_path = "public/stock_list.json"
//! legacy_dir = "."
//! retention_days = 7
//!
//! [provider]
//! timeout_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default primary token variable.
pub const DEFAULT_TOKEN_VAR: &str = "FINMIND_TOKEN";

/// Default fallback token variable (shared with the frontend build).
pub const DEFAULT_FALLBACK_TOKEN_VAR: &str = "VITE_FINMIND_TOKEN";

/// Market label attached to every instrument entry.
pub const DEFAULT_MARKET_LABEL: &str = "台股";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one run of the refresh job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobConfig {
    /// Fixed-path snapshot consulted by the freshness check and overwritten on refresh.
    pub snapshot_path: PathBuf,

    /// Directory holding legacy `stock_list_YYYY-MM-DD.json` files.
    pub legacy_dir: PathBuf,

    /// Filename prefix of legacy dated files.
    pub legacy_prefix: String,

    /// Dated files strictly older than this many days are removed.
    pub retention_days: u32,

    /// Optional key=value credential file.
    pub env_file: Option<PathBuf>,

    pub token_var: String,
    pub fallback_token_var: String,
    pub market_label: String,
    pub provider: ProviderConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("public/stock_list.json"),
            legacy_dir: PathBuf::from("."),
            legacy_prefix: "stock_list_".to_string(),
            retention_days: 7,
            env_file: Some(PathBuf::from(".env")),
            token_var: DEFAULT_TOKEN_VAR.to_string(),
            fallback_token_var: DEFAULT_FALLBACK_TOKEN_VAR.to_string(),
            market_label: DEFAULT_MARKET_LABEL.to_string(),
            provider: ProviderConfig::default(),
        }
    }
}

impl JobConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_var.trim().is_empty() {
            return Err(ConfigError::Invalid("token_var must not be empty".into()));
        }
        if self.legacy_prefix.is_empty() {
            return Err(ConfigError::Invalid("legacy_prefix must not be empty".into()));
        }
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("snapshot_path must not be empty".into()));
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "provider.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Upstream provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub dataset: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.finmindtrade.com/api/v4/data".to_string(),
            dataset: "TaiwanStockInfo".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
