//! Immutable per-run options

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options for one pipeline run.
///
/// The flattened `transform` map carries transform-specific settings; it is
/// part of the cache key, so two runs with different transform options never
/// share entries. The `cache` section controls where results are persisted
/// and is deliberately excluded from the key since it cannot affect output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(skip)]
    pub cache: Option<CacheConfig>,
    #[serde(flatten)]
    pub transform: serde_json::Map<String, serde_json::Value>,
}

/// Cache settings for a run. Absence of the whole section disables caching.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Base directory of the persistent content store.
    pub dir: PathBuf,
    /// Idle window before an unused flight entry is evicted
    /// (default 60 s, see [`crate::flight::DEFAULT_IDLE_TIMEOUT`]).
    pub timeout: Option<Duration>,
}

impl RunOptions {
    /// Options with caching rooted at `dir` and no transform settings.
    pub fn cached(dir: impl Into<PathBuf>) -> Self {
        Self {
            cache: Some(CacheConfig {
                dir: dir.into(),
                timeout: None,
            }),
            transform: serde_json::Map::new(),
        }
    }

    /// Set one transform-specific option.
    pub fn with_option(mut self, name: &str, value: serde_json::Value) -> Self {
        self.transform.insert(name.to_string(), value);
        self
    }
}
