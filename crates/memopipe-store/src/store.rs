//! Content-addressable store for transform results
//!
//! Directory layout:
//! ```text
//! {base}/
//! ├── content/
//! │   └── {aa}/             # shard: first two hex chars of the key
//! │       ├── {key}         # raw result bytes
//! │       └── {key}.json    # integrity + metadata sidecar
//! └── tmp/                  # staging for atomic publishes
//! ```
//!
//! A miss is `Ok(None)`; any other failure is an `Err`. The two are kept
//! apart so a broken store surfaces as an error instead of silently
//! degrading every lookup into a recompute.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::hash;

/// A stored result: raw bytes plus the integrity recorded at put time.
#[derive(Debug)]
pub struct Content {
    pub data: Vec<u8>,
    pub integrity: String,
}

/// Metadata sidecar written next to each content file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    integrity: String,
    size: u64,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Summary of a store entry for listing.
#[derive(Debug, Serialize)]
pub struct StoreEntry {
    pub key: String,
    pub size: u64,
    pub integrity: String,
    pub created_at: String,
}

/// Verification result for a single entry.
#[derive(Debug)]
pub struct VerifyResult {
    pub key: String,
    pub expected: String,
    pub actual: String,
    pub ok: bool,
}

/// Content-addressable store.
pub struct Store {
    base: PathBuf,
}

impl Store {
    /// Create a store rooted at `base`, creating its directories if needed.
    pub fn new(base: &Path) -> Result<Self> {
        let content_dir = base.join("content");
        let tmp_dir = base.join("tmp");
        fs::create_dir_all(&content_dir)
            .with_context(|| format!("failed to create content dir: {}", content_dir.display()))?;
        fs::create_dir_all(&tmp_dir)
            .with_context(|| format!("failed to create tmp dir: {}", tmp_dir.display()))?;
        Ok(Self {
            base: base.to_path_buf(),
        })
    }

    pub fn content_dir(&self) -> PathBuf {
        self.base.join("content")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.base.join("tmp")
    }

    /// Path of the content file for a key.
    pub fn data_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.shard_dir(key)?.join(key))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.shard_dir(key)?.join(format!("{key}.json")))
    }

    fn shard_dir(&self, key: &str) -> Result<PathBuf> {
        if key.len() < 2 || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("malformed store key: {key:?}");
        }
        Ok(self.content_dir().join(&key[..2]))
    }

    /// Look up a key. `Ok(None)` means not found; `Err` means the store
    /// itself failed. A corrupt metadata sidecar invalidates the entry
    /// (logged miss), matching cache semantics: the content is still
    /// reproducible.
    pub fn get(&self, key: &str) -> Result<Option<Content>> {
        let data_path = self.data_path(key)?;
        if !data_path.exists() {
            return Ok(None);
        }

        let meta_path = self.meta_path(key)?;
        let meta: EntryMeta = match fs::read_to_string(&meta_path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from))
        {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("corrupt store entry {}: {e}, invalidating", short(key));
                return Ok(None);
            }
        };

        let data = fs::read(&data_path)
            .with_context(|| format!("failed to read store content: {}", data_path.display()))?;
        Ok(Some(Content {
            data,
            integrity: meta.integrity,
        }))
    }

    /// Store bytes under a key, returning the integrity string.
    ///
    /// Data and sidecar are staged under `tmp/` and published by rename.
    /// If another process published the same key first, the staged copy is
    /// discarded: same key means same content.
    pub fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        let integrity = hash::integrity_of(data);
        let data_path = self.data_path(key)?;
        let meta_path = self.meta_path(key)?;

        let shard = self.shard_dir(key)?;
        fs::create_dir_all(&shard)
            .with_context(|| format!("failed to create shard dir: {}", shard.display()))?;

        // Per-process staging names, so concurrent processes never clobber
        // each other's staged files.
        let pid = std::process::id();
        let tmp_data = self.tmp_dir().join(format!("{key}.{pid}"));
        let tmp_meta = self.tmp_dir().join(format!("{key}.{pid}.json"));

        fs::write(&tmp_data, data)
            .with_context(|| format!("failed to stage content: {}", tmp_data.display()))?;
        let meta = EntryMeta {
            integrity: integrity.clone(),
            size: data.len() as u64,
            created_at: chrono::Utc::now(),
        };
        fs::write(&tmp_meta, serde_json::to_string_pretty(&meta)?)
            .with_context(|| format!("failed to stage metadata: {}", tmp_meta.display()))?;

        if data_path.exists() {
            log::debug!(
                "store: {} already present (concurrent put), discarding staged copy",
                short(key)
            );
            fs::remove_file(&tmp_data).ok();
            fs::remove_file(&tmp_meta).ok();
            return Ok(integrity);
        }

        // Sidecar first: readers check the content file, so an entry only
        // becomes visible once both halves exist.
        fs::rename(&tmp_meta, &meta_path).with_context(|| {
            format!(
                "failed to publish metadata {} -> {}",
                tmp_meta.display(),
                meta_path.display()
            )
        })?;
        fs::rename(&tmp_data, &data_path).with_context(|| {
            format!(
                "failed to publish content {} -> {}",
                tmp_data.display(),
                data_path.display()
            )
        })?;

        log::debug!("store: put {} ({} bytes)", short(key), data.len());
        Ok(integrity)
    }

    /// List all entries, oldest first. Corrupt sidecars are skipped.
    pub fn list(&self) -> Result<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        for key in self.keys()? {
            let meta_path = self.meta_path(&key)?;
            let meta: EntryMeta = match fs::read_to_string(&meta_path)
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from))
            {
                Ok(meta) => meta,
                Err(e) => {
                    log::warn!("skipping {}: {e}", short(&key));
                    continue;
                }
            };
            entries.push(StoreEntry {
                key,
                size: meta.size,
                integrity: meta.integrity,
                created_at: meta.created_at.format("%Y-%m-%d %H:%M").to_string(),
            });
        }
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    /// Recompute the integrity of one entry and compare to its sidecar.
    pub fn verify(&self, key: &str) -> Result<VerifyResult> {
        let meta_path = self.meta_path(key)?;
        let meta: EntryMeta = serde_json::from_str(
            &fs::read_to_string(&meta_path)
                .with_context(|| format!("no metadata for {}", short(key)))?,
        )
        .with_context(|| format!("unreadable metadata for {}", short(key)))?;

        let data_path = self.data_path(key)?;
        let (actual, ok) = if data_path.exists() {
            match fs::read(&data_path) {
                Ok(data) => {
                    let actual = hash::integrity_of(&data);
                    let ok = actual == meta.integrity;
                    (actual, ok)
                }
                Err(e) => (format!("error: {e}"), false),
            }
        } else {
            ("MISSING".to_string(), false)
        };

        Ok(VerifyResult {
            key: key.to_string(),
            expected: meta.integrity,
            actual,
            ok,
        })
    }

    /// Verify every entry in the store.
    pub fn verify_all(&self) -> Result<Vec<VerifyResult>> {
        let mut results = Vec::new();
        for key in self.keys()? {
            match self.verify(&key) {
                Ok(result) => results.push(result),
                Err(e) => log::warn!("verify {}: {e}", short(&key)),
            }
        }
        Ok(results)
    }

    /// Remove stale staging files. Returns the number removed.
    pub fn cleanup_tmp(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(self.tmp_dir())? {
            let entry = entry?;
            if entry.path().is_file() {
                log::info!("cleaning stale tmp: {}", entry.file_name().to_string_lossy());
                fs::remove_file(entry.path())?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Remove every entry. Returns the number of keys removed.
    pub fn clear(&self) -> Result<usize> {
        let keys = self.keys()?;
        for key in &keys {
            fs::remove_file(self.data_path(key)?).ok();
            fs::remove_file(self.meta_path(key)?).ok();
        }
        log::info!("store: cleared {} entries", keys.len());
        Ok(keys.len())
    }

    /// All keys present under content/, discovered from the data files.
    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for shard in fs::read_dir(self.content_dir())? {
            let shard = shard?;
            if !shard.path().is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.ends_with(".json") {
                    keys.push(name);
                }
            }
        }
        Ok(keys)
    }
}

fn short(key: &str) -> &str {
    &key[..std::cmp::min(8, key.len())]
}
