//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: ACTON_, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/acton-persistence/{service_name}/config.toml
//! 4. System directory: /etc/acton-persistence/{service_name}/config.toml
//! 5. Default values
//!
//! ```toml
//! [persistence]
//! max_in_clause_size = 500
//! load_all_graph_suffix = ".loadAll"
//! load_by_id_graph_suffix = ".loadByGuid"
//! case_insensitive_search = true
//!
//! [logging]
//! level = "debug"
//! json = true
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::query::MAX_IN_CLAUSE_SIZE;

const CONFIG_PREFIX: &str = "acton-persistence";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Repository and query behavior
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Repository and query behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Values bound per membership clause (clamped to 1..=1000)
    #[serde(default = "default_max_in_clause_size")]
    pub max_in_clause_size: usize,

    /// Suffix appended to the entity name for the load-all graph
    #[serde(default = "default_load_all_graph_suffix")]
    pub load_all_graph_suffix: String,

    /// Suffix appended to the entity name for the load-by-id graph
    #[serde(default = "default_load_by_id_graph_suffix")]
    pub load_by_id_graph_suffix: String,

    /// Lower-case search patterns built by repositories
    #[serde(default = "default_true")]
    pub case_insensitive_search: bool,
}

impl PersistenceConfig {
    /// Chunk size actually used for membership clauses
    pub fn effective_in_clause_size(&self) -> usize {
        self.max_in_clause_size.clamp(1, MAX_IN_CLAUSE_SIZE)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_in_clause_size: default_max_in_clause_size(),
            load_all_graph_suffix: default_load_all_graph_suffix(),
            load_by_id_graph_suffix: default_load_by_id_graph_suffix(),
            case_insensitive_search: default_true(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default = "default_true")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_true(),
        }
    }
}

// Default value functions
fn default_max_in_clause_size() -> usize {
    MAX_IN_CLAUSE_SIZE
}

fn default_load_all_graph_suffix() -> String {
    ".loadAll".to_string()
}

fn default_load_by_id_graph_suffix() -> String {
    ".loadByGuid".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| CONFIG_PREFIX.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("ACTON_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the directory search; environment variables still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ACTON_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Candidate config files, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(CONFIG_PREFIX);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(CONFIG_PREFIX)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.persistence.max_in_clause_size, 1000);
        assert_eq!(config.persistence.load_all_graph_suffix, ".loadAll");
        assert_eq!(config.persistence.load_by_id_graph_suffix, ".loadByGuid");
        assert!(config.persistence.case_insensitive_search);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_in_clause_size_is_clamped() {
        let mut config = PersistenceConfig::default();
        config.max_in_clause_size = 5000;
        assert_eq!(config.effective_in_clause_size(), 1000);
        config.max_in_clause_size = 0;
        assert_eq!(config.effective_in_clause_size(), 1);
        config.max_in_clause_size = 250;
        assert_eq!(config.effective_in_clause_size(), 250);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "[persistence]\nmax_in_clause_size = 200\nload_all_graph_suffix = \".all\"\n\n[logging]\nlevel = \"debug\""
        )
        .expect("write config");

        let config = Config::load_from(file.path()).expect("load config");
        assert_eq!(config.persistence.max_in_clause_size, 200);
        assert_eq!(config.persistence.load_all_graph_suffix, ".all");
        assert_eq!(config.persistence.load_by_id_graph_suffix, ".loadByGuid");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::load_from(dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config.persistence, PersistenceConfig::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[persistence]\nmax_in_clause_size = \"many\"").expect("write config");
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
