// ⚙️ Engine configuration
// Loaded from a TOML file; every field has a default so the file is optional.

use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "raisket.toml";

/// Environment variable that overrides `database_path`
pub const DATABASE_ENV_VAR: &str = "RAISKET_DB";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite file backing the store
    pub database_path: PathBuf,

    /// Base URL for generated product images (provider name goes in `?text=`)
    pub placeholder_image_base: String,

    /// Aguinaldo days when the caller does not supply them (statutory minimum)
    pub default_bonus_days: f64,

    /// tracing filter used when RUST_LOG is not set
    pub log_filter: String,

    /// Extra category spellings: raw key → canonical category slug
    /// Example: `tdc = "credit"`
    pub category_aliases: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: PathBuf::from("raisket.db"),
            placeholder_image_base: "https://placehold.co/600x400.png".to_string(),
            default_bonus_days: 15.0,
            log_filter: "raisket_engine=info,raisket=info".to_string(),
            category_aliases: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load config from an explicit path (must exist)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config: EngineConfig = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {}", path.display(), e)))?;

        config.validate()?;
        config.apply_env();
        Ok(config)
    }

    /// Load `path` if given, else `raisket.toml` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => {
                let mut config = EngineConfig::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(db) = std::env::var(DATABASE_ENV_VAR) {
            if !db.trim().is_empty() {
                self.database_path = PathBuf::from(db);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.default_bonus_days.is_finite() || self.default_bonus_days < 0.0 {
            return Err(EngineError::Config(
                "default_bonus_days must be a non-negative number".to_string(),
            ));
        }
        if self.placeholder_image_base.trim().is_empty() {
            return Err(EngineError::Config(
                "placeholder_image_base must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
