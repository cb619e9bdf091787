//! Application configuration for LinkGraph.
//!
//! User config lives at `~/.linkgraph/linkgraph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LinkGraphError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "linkgraph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".linkgraph";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "linkgraph.db";

/// Retries of the append-else-create loop before an edge write is reported as conflicting.
pub const DEFAULT_EDGE_RETRY_BUDGET: u32 = 5;

// ---------------------------------------------------------------------------
// Config structs (matching linkgraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Key-value store settings.
    #[serde(default)]
    pub store: StoreSection,

    /// Content source (MediaWiki API) settings.
    #[serde(default)]
    pub source: SourceSection,

    /// Build pipeline settings.
    #[serde(default)]
    pub build: BuildSection,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Database file path. Defaults to `~/.linkgraph/linkgraph.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Read capacity recorded for each logical table.
    #[serde(default = "default_capacity")]
    pub read_capacity: u64,

    /// Write capacity recorded for each logical table.
    #[serde(default = "default_capacity")]
    pub write_capacity: u64,

    /// Attempts of the edge upsert loop before giving up.
    #[serde(default = "default_edge_retry_budget")]
    pub edge_retry_budget: u32,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: None,
            read_capacity: default_capacity(),
            write_capacity: default_capacity(),
            edge_retry_budget: default_edge_retry_budget(),
        }
    }
}

fn default_capacity() -> u64 {
    1000
}
fn default_edge_retry_budget() -> u32 {
    DEFAULT_EDGE_RETRY_BUDGET
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    /// MediaWiki `api.php` endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Overrides the default User-Agent header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

fn default_api_url() -> String {
    "https://en.wikipedia.org/w/api.php".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Maximum number of titles processed concurrently within a phase.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Fraction of failed titles (0.0..=1.0) a phase may have before the run is failed.
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_failure_rate: default_max_failure_rate(),
        }
    }
}

fn default_concurrency() -> u32 {
    16
}
fn default_max_failure_rate() -> f64 {
    0.5
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Capacity policy handed to `ensure_schema`. Recorded, not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub read_capacity: u64,
    pub write_capacity: u64,
}

/// Runtime store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Resolved database path.
    pub path: PathBuf,
    /// Capacity policy for table creation.
    pub capacity: Capacity,
    /// Attempts of the edge upsert loop.
    pub edge_retry_budget: u32,
}

impl StoreConfig {
    /// Resolve the store config, falling back to `~/.linkgraph/linkgraph.db`.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        let path = match &config.store.path {
            Some(p) => PathBuf::from(p),
            None => config_dir()?.join(DB_FILE_NAME),
        };
        Ok(Self {
            path,
            capacity: Capacity {
                read_capacity: config.store.read_capacity,
                write_capacity: config.store.write_capacity,
            },
            edge_retry_budget: config.store.edge_retry_budget.max(1),
        })
    }
}

/// Runtime content-source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub api_url: Url,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl SourceConfig {
    /// Validate and convert the `[source]` section.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        let api_url = Url::parse(&config.source.api_url).map_err(|e| {
            LinkGraphError::config(format!("invalid api_url '{}': {e}", config.source.api_url))
        })?;
        Ok(Self {
            api_url,
            timeout_secs: config.source.timeout_secs,
            user_agent: config.source.user_agent.clone(),
        })
    }
}

/// Runtime build configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Maximum concurrent tasks per phase.
    pub concurrency: usize,
    /// Allowed failure fraction per phase.
    pub max_failure_rate: f64,
    /// Capacity policy passed to `ensure_schema`.
    pub capacity: Capacity,
}

impl From<&AppConfig> for BuildConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.build.concurrency.max(1) as usize,
            max_failure_rate: config.build.max_failure_rate,
            capacity: Capacity {
                read_capacity: config.store.read_capacity,
                write_capacity: config.store.write_capacity,
            },
        }
    }
}

impl BuildConfig {
    /// Reject thresholds outside `0.0..=1.0`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.max_failure_rate) {
            return Err(LinkGraphError::config(format!(
                "max_failure_rate must be within 0.0..=1.0, got {}",
                self.max_failure_rate
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.linkgraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LinkGraphError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.linkgraph/linkgraph.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LinkGraphError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LinkGraphError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LinkGraphError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LinkGraphError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LinkGraphError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("read_capacity"));
        assert!(toml_str.contains("en.wikipedia.org"));
        assert!(toml_str.contains("max_failure_rate"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[store]
path = "/tmp/graph.db"
write_capacity = 50

[build]
concurrency = 64
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.store.path.as_deref(), Some("/tmp/graph.db"));
        assert_eq!(config.store.read_capacity, 1000);
        assert_eq!(config.store.write_capacity, 50);
        assert_eq!(config.build.concurrency, 64);
        assert_eq!(config.build.max_failure_rate, 0.5);
        assert_eq!(config.source.timeout_secs, 30);
    }

    #[test]
    fn build_config_from_app_config() {
        let mut app = AppConfig::default();
        app.build.concurrency = 0;
        let build = BuildConfig::from(&app);
        assert_eq!(build.concurrency, 1);
        assert_eq!(build.capacity.read_capacity, 1000);
        assert!(build.validate().is_ok());
    }

    #[test]
    fn failure_rate_out_of_range_is_rejected() {
        let mut app = AppConfig::default();
        app.build.max_failure_rate = 1.5;
        let err = BuildConfig::from(&app).validate().unwrap_err();
        assert!(err.to_string().contains("max_failure_rate"));
    }

    #[test]
    fn store_config_uses_explicit_path() {
        let mut app = AppConfig::default();
        app.store.path = Some("/var/lib/linkgraph/graph.db".into());
        app.store.edge_retry_budget = 0;
        let store = StoreConfig::from_app(&app).expect("store config");
        assert_eq!(store.path, PathBuf::from("/var/lib/linkgraph/graph.db"));
        assert_eq!(store.edge_retry_budget, 1);
    }

    #[test]
    fn source_config_rejects_bad_url() {
        let mut app = AppConfig::default();
        app.source.api_url = "not a url".into();
        assert!(SourceConfig::from_app(&app).is_err());
    }
}
