use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::yaml_provider;

pub const IN_MEMORY_PATH: &str = ":memory:";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_foreign_keys() -> bool {
    true
}

/// Store connection settings, usually read from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }

    pub fn load(path: &Path) -> Result<Self> {
        yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading store configuration from {path:?}"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        yaml_provider::save_to_path(path, self)
            .with_context(|| format!("Writing store configuration to {path:?}"))
    }

    /// Command-line database path wins over the configuration file.
    pub fn resolve(config: Option<&Path>, db: Option<&Path>) -> Result<Self> {
        let mut resolved = match config {
            Some(path) => Self::load(path)?,
            None => Self::in_memory(),
        };
        if let Some(db) = db {
            resolved.path = db.to_path_buf();
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_defaults_fill_optional_fields() {
        let config: StoreConfig = serde_yaml::from_str("path: templates.db\n").unwrap();
        assert_eq!(config.path, PathBuf::from("templates.db"));
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert!(config.foreign_keys);
        assert!(!config.is_in_memory());
    }

    #[test]
    fn db_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yml");
        StoreConfig {
            path: PathBuf::from("from-file.db"),
            busy_timeout_ms: 10,
            foreign_keys: false,
        }
        .save(&path)
        .unwrap();

        let resolved = StoreConfig::resolve(Some(&path), Some(Path::new("cli.db"))).unwrap();
        assert_eq!(resolved.path, PathBuf::from("cli.db"));
        assert_eq!(resolved.busy_timeout_ms, 10);
        assert!(!resolved.foreign_keys);
    }
}
