//! Application configuration for Devize.
//!
//! User config lives at `~/.devize/devize.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DevizeError, Result};
use crate::types::StandardParameters;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "devize.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".devize";

// ---------------------------------------------------------------------------
// Config structs (matching devize.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Back-office API used to fetch recipes and the materials catalog.
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Standard markup for new projects.
    #[serde(default)]
    pub standard_markup_percent: f64,

    /// Standard discount for new projects.
    #[serde(default)]
    pub standard_discount_percent: f64,

    /// Indirect costs for new projects.
    #[serde(default)]
    pub indirect_costs_percent: f64,

    /// Path of the quote database. `~` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            standard_markup_percent: 0.0,
            standard_discount_percent: 0.0,
            indirect_costs_percent: 0.0,
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.devize/devize.db".into()
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Base URL of the back-office API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent recipe requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_concurrency() -> u32 {
    4
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Never zero; a configured 0 is raised to 1.
    pub concurrency: u32,
}

impl From<&AppConfig> for SourceConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.sources.base_url.clone(),
            timeout_secs: config.sources.timeout_secs,
            concurrency: config.sources.concurrency.max(1),
        }
    }
}

impl SourceConfig {
    /// Parse `base_url`, failing with a config error when malformed.
    pub fn parsed_base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| DevizeError::config(format!("invalid base_url '{}': {e}", self.base_url)))
    }
}

impl From<&AppConfig> for StandardParameters {
    fn from(config: &AppConfig) -> Self {
        Self::new(
            config.defaults.standard_markup_percent,
            config.defaults.standard_discount_percent,
            config.defaults.indirect_costs_percent,
        )
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.devize/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DevizeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.devize/devize.toml`).
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
///
/// Default standard percentages are validated on load.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DevizeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| DevizeError::config(format!("failed to parse {}: {e}", path.display())))?;

    StandardParameters::from(&config)
        .validate()
        .map_err(|e| DevizeError::config(format!("{}: {e}", path.display())))?;

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DevizeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DevizeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DevizeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the configured database path, expanding a leading `~`.
pub fn resolve_database_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = config.defaults.database_path.as_str();
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| DevizeError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("base_url"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.sources.concurrency, 4);
        assert_eq!(parsed.sources.timeout_secs, 10);
        assert_eq!(parsed.defaults.standard_markup_percent, 0.0);
    }

    #[test]
    fn config_with_standards() {
        let toml_str = r#"
[defaults]
standard_markup_percent = 12.5
indirect_costs_percent = 8

[sources]
base_url = "https://erp.example.com/api"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let standards = StandardParameters::from(&config);
        assert_eq!(standards.standard_markup_percent, 12.5);
        assert_eq!(standards.standard_discount_percent, 0.0);
        assert_eq!(standards.indirect_costs_percent, 8.0);
        assert_eq!(config.sources.base_url, "https://erp.example.com/api");
    }

    #[test]
    fn source_config_from_app_config() {
        let mut app = AppConfig::default();
        app.sources.concurrency = 0;
        let source = SourceConfig::from(&app);
        assert_eq!(source.concurrency, 1);
        assert_eq!(source.timeout_secs, 10);
        assert!(source.parsed_base_url().is_ok());
    }

    #[test]
    fn malformed_base_url_is_config_error() {
        let mut app = AppConfig::default();
        app.sources.base_url = "not a url".into();
        let err = SourceConfig::from(&app).parsed_base_url().unwrap_err();
        assert!(err.to_string().starts_with("config error"));
    }

    #[test]
    fn negative_default_standard_rejected_on_load() {
        let path = std::env::temp_dir().join(format!("devize_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[defaults]\nstandard_discount_percent = -5\n").expect("write");
        let result = load_config_from(&path);
        let _ = std::fs::remove_file(&path);
        assert!(result.unwrap_err().to_string().contains("standard discount"));
    }

    #[test]
    fn absolute_database_path_kept() {
        let mut app = AppConfig::default();
        app.defaults.database_path = "/var/lib/devize/quotes.db".into();
        assert_eq!(
            resolve_database_path(&app).unwrap(),
            PathBuf::from("/var/lib/devize/quotes.db")
        );
    }
}
