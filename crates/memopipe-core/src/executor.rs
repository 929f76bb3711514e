//! Cache-aside executor: digest, store lookup, compute-and-populate

use std::sync::Arc;
use std::time::Duration;

use memopipe_store::Store;

use crate::digest::Digest;
use crate::error::PipelineError;
use crate::flight::{FlightRegistry, DEFAULT_IDLE_TIMEOUT};
use crate::options::RunOptions;
use crate::transform::{Transform, TransformJob};

/// Result of one cached-or-computed execution.
#[derive(Debug, Clone)]
pub struct CacheResult {
    pub data: Arc<[u8]>,
    /// Integrity string from the store: recorded at put time on the miss
    /// path, carried from the sidecar on a hit, `None` when caching is
    /// bypassed.
    pub integrity: Option<String>,
}

/// Executes transforms through the cache-aside protocol.
///
/// Constructed once per run: the digest canonicalizes the options up
/// front (a per-run value reused across all inputs), so a malformed
/// configuration fails here, before any work starts.
pub struct CacheExecutor {
    registry: FlightRegistry,
    store: Option<Arc<Store>>,
    digest: Option<Digest>,
    idle_timeout: Duration,
}

impl CacheExecutor {
    pub fn new(registry: FlightRegistry, opts: &RunOptions) -> Result<Self, PipelineError> {
        let (store, digest, idle_timeout) = match &opts.cache {
            Some(cache) => {
                let store =
                    Store::new(&cache.dir).map_err(|e| PipelineError::Store(Arc::new(e)))?;
                let digest = Digest::new(opts)?;
                let idle_timeout = cache.timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT);
                (Some(Arc::new(store)), Some(digest), idle_timeout)
            }
            None => (None, None, DEFAULT_IDLE_TIMEOUT),
        };
        Ok(Self {
            registry,
            store,
            digest,
            idle_timeout,
        })
    }

    /// Run `transform` for one job, going through the store and the
    /// single-flight registry when caching is configured.
    pub async fn execute(
        &self,
        transform: &Arc<dyn Transform>,
        job: TransformJob,
    ) -> Result<CacheResult, PipelineError> {
        let (Some(store), Some(digest)) = (&self.store, &self.digest) else {
            // No cache dir: no key, no registry, the transform runs every time.
            let data = transform.apply(job).await?;
            return Ok(CacheResult {
                data: data.into(),
                integrity: None,
            });
        };

        let key = digest.key(&job.content);
        let store = Arc::clone(store);
        let transform = Arc::clone(transform);

        self.registry
            .acquire(&key, self.idle_timeout, {
                let key = key.clone();
                move || flight_compute(store, key, transform, job)
            })
            .await
    }
}

/// The miss path shared by all single-flight waiters: store lookup, then
/// transform + put when nothing is stored yet. Store calls are sync
/// filesystem code and run on the blocking pool.
async fn flight_compute(
    store: Arc<Store>,
    key: String,
    transform: Arc<dyn Transform>,
    job: TransformJob,
) -> Result<CacheResult, PipelineError> {
    let found = {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.get(&key))
            .await
            .map_err(|e| PipelineError::Worker(format!("store task failed: {e}")))?
            .map_err(|e| PipelineError::Store(Arc::new(e)))?
    };

    if let Some(content) = found {
        log::debug!("cache hit for {}", &key[..8]);
        return Ok(CacheResult {
            data: content.data.into(),
            integrity: Some(content.integrity),
        });
    }

    log::debug!("cache miss for {}, computing", &key[..8]);
    let data: Arc<[u8]> = transform.apply(job).await?.into();

    let integrity = {
        let data = Arc::clone(&data);
        tokio::task::spawn_blocking(move || store.put(&key, &data))
            .await
            .map_err(|e| PipelineError::Worker(format!("store task failed: {e}")))?
            .map_err(|e| PipelineError::Store(Arc::new(e)))?
    };

    Ok(CacheResult {
        data,
        integrity: Some(integrity),
    })
}
