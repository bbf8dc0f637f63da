//! Engine configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional file,
//! then `WORLDSTATE_*` environment variables (`WORLDSTATE_DATABASE_URL`,
//! `WORLDSTATE_MAX_HIERARCHY_DEPTH`, ...).

use serde::{Deserialize, Serialize};

/// Configuration for one world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Human-readable world name, recorded by `world.created`
    pub world_name: String,
    /// SQLite connection URL
    pub database_url: String,
    /// Pool size for file databases; in-memory databases always use one
    pub max_connections: u32,
    /// How far up a region chain the resolver walks before giving up
    pub max_hierarchy_depth: usize,
    /// Events returned by a query that names no limit
    pub default_event_limit: u32,
    /// Fallback tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world_name: "Untitled World".to_string(),
            database_url: "sqlite://world.db".to_string(),
            max_connections: 5,
            max_hierarchy_depth: 100,
            default_event_limit: 100,
            log_filter: "worldstate_engine=info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration, optionally layering a file under the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("WORLDSTATE").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// A throwaway world held entirely in memory
    pub fn in_memory(world_name: impl Into<String>) -> Self {
        Self {
            world_name: world_name.into(),
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_hierarchy_depth, 100);
        assert_eq!(config.default_event_limit, 100);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "world_name = \"Eldoria\"\nmax_hierarchy_depth = 12").unwrap();

        let config = EngineConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.world_name, "Eldoria");
        assert_eq!(config.max_hierarchy_depth, 12);
        assert_eq!(config.default_event_limit, 100);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load(Some("/nonexistent/worldstate")).unwrap();
        assert_eq!(config.database_url, EngineConfig::default().database_url);
    }
}
