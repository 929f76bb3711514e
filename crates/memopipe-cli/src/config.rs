//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for memopipe
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheFileConfig,
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheFileConfig {
    /// Store directory; `None` disables caching unless --cache-dir is given.
    pub dir: Option<PathBuf>,
    /// Idle eviction window for single-flight entries, in seconds.
    pub timeout_secs: u64,
}

impl Default for CacheFileConfig {
    fn default() -> Self {
        Self {
            dir: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub min: usize,
    pub max: usize,
    /// Per-transform deadline, in seconds.
    pub timeout_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 2,
            timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load from an explicit file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config: {}", path.display()))
    }

    /// Load from ./memopipe.toml, then the user config dir, then defaults.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("./memopipe.toml");
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "memopipe") {
            let user = dirs.config_dir().join("config.toml");
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.cache.dir.is_none());
        assert_eq!(config.cache.timeout_secs, 60);
        assert_eq!(config.workers.min, 1);
        assert_eq!(config.workers.max, 2);
        assert_eq!(config.workers.timeout_secs, 60);
    }

    #[test]
    fn partial_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            dir = "/tmp/memo"

            [workers]
            max = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/memo")));
        assert_eq!(config.cache.timeout_secs, 60);
        assert_eq!(config.workers.max, 8);
        assert_eq!(config.workers.min, 1);
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memopipe.toml");
        std::fs::write(&path, "[workers]\ntimeout_secs = 5\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.workers.timeout_secs, 5);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memopipe.toml");
        std::fs::write(&path, "not toml [").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
