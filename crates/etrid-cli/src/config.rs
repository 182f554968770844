//! CLI configuration
//!
//! Read from `etrid.toml` when present, then overridden by `ETRID_*`
//! environment variables, with `__` separating nested keys:
//!
//! ```text
//! ETRID_CLIENT__REQUEST_TIMEOUT_SECS=10
//! ETRID_METRICS__URL=https://dashboard.etrid.org/metrics.json
//! ETRID_LOGGING__FORMAT=json
//! ```

use etrid_client::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete CLI configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Chain and EVM endpoints
    #[serde(default)]
    pub client: ClientConfig,

    /// Dashboard metrics snapshot
    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSettings {
    #[serde(default = "default_metrics_url")]
    pub url: String,

    #[serde(default = "default_metrics_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_metrics_url() -> String {
    "http://127.0.0.1:3000/metrics.json".to_string()
}

fn default_metrics_timeout_secs() -> u64 {
    10
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            url: default_metrics_url(),
            timeout_secs: default_metrics_timeout_secs(),
        }
    }
}

impl MetricsSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl CliConfig {
    /// Layer the file at `path` (if it exists) and the environment over the defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("ETRID")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Resolve a leading `~` against the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
