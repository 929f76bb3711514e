//! Single-flight deduplication registry keyed by cache digest
//!
//! Concurrent requests for the same key share one in-flight computation:
//! the first `acquire` starts it, later ones attach to the same shared
//! future (before or after it settles). Once the last waiter for a key is
//! gone, a per-entry eviction timer fires after the idle window and drops
//! the entry; a new waiter arriving first aborts the timer in the same
//! critical section that re-registers interest. Idle is measured from the
//! last time the waiter count hit zero, not per waiter.

use std::collections::hash_map::Entry as MapEntry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use rustc_hash::FxHashMap;

use crate::error::PipelineError;
use crate::executor::CacheResult;

/// Idle window before an entry with no waiters is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

type FlightResult = Result<CacheResult, PipelineError>;
type SharedFlight = Shared<BoxFuture<'static, FlightResult>>;

/// One tracked computation. At most one exists per key at any time.
struct QueueEntry {
    /// Callers currently interested in this key.
    waiters: u32,
    /// The shared computation; settles exactly once, success or failure,
    /// and every attached waiter observes the same outcome.
    pending: SharedFlight,
    /// Set under the registry lock just before removal. A stale timer that
    /// lost the race can never kill an entry twice.
    dead: bool,
    /// Distinguishes this entry instance from a later one under the same
    /// key, so an old eviction timer cannot remove a recreated entry.
    generation: u64,
    /// Scheduled eviction, present only while the entry is idle.
    eviction: Option<tokio::task::JoinHandle<()>>,
}

struct RegistryInner {
    entries: Mutex<FxHashMap<String, QueueEntry>>,
    next_generation: AtomicU64,
}

/// Table of in-flight and recently-settled computations.
///
/// A cheap clonable handle owned by the application (typically via
/// [`crate::Pipeline`]) rather than process-global state, so independent
/// registries can coexist and tests never leak entries into each other.
#[derive(Clone)]
pub struct FlightRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for FlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(FxHashMap::default()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Attach to the computation for `key`, starting it if absent.
    ///
    /// `compute` is only run for the first caller of a given entry; every
    /// caller receives the entry's settled result, error included. Waiter
    /// accounting is drop-guarded, so a caller cancelled mid-await still
    /// releases its slot.
    pub async fn acquire<F, Fut>(
        &self,
        key: &str,
        idle_timeout: Duration,
        compute: F,
    ) -> FlightResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightResult> + Send + 'static,
    {
        // Built unconditionally so no caller-supplied code runs under the
        // registry lock; if another flight is already up, this future is
        // dropped unpolled and has no effect.
        let computation: BoxFuture<'static, FlightResult> = compute().boxed();

        let pending = {
            let mut entries = self.inner.entries.lock().unwrap();
            match entries.entry(key.to_string()) {
                MapEntry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    entry.waiters += 1;
                    if let Some(timer) = entry.eviction.take() {
                        timer.abort();
                    }
                    entry.pending.clone()
                }
                MapEntry::Vacant(vacant) => {
                    let pending = computation.shared();
                    vacant.insert(QueueEntry {
                        waiters: 1,
                        pending: pending.clone(),
                        dead: false,
                        generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
                        eviction: None,
                    });
                    pending
                }
            }
        };

        let _waiter = WaiterGuard {
            registry: self.clone(),
            key: key.to_string(),
            idle_timeout,
        };
        pending.await
    }

    /// Number of live entries, settled or not. Exposed for tests and stats.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop one waiter; when the count reaches zero, schedule eviction.
    fn release(&self, key: &str, idle_timeout: Duration) {
        let mut entries = self.inner.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters > 0 {
            return;
        }

        let generation = entry.generation;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            // Weak: a parked timer must not keep a dropped registry alive.
            let registry = Arc::downgrade(&self.inner);
            let key = key.to_string();
            entry.eviction = Some(handle.spawn(async move {
                tokio::time::sleep(idle_timeout).await;
                if let Some(registry) = registry.upgrade() {
                    registry.evict_if_idle(&key, generation);
                }
            }));
        } else {
            // No runtime to host the timer (runtime teardown): evict now.
            entry.dead = true;
            entries.remove(key);
        }
    }
}

impl RegistryInner {
    fn evict_if_idle(&self, key: &str, generation: u64) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            if entry.generation != generation || entry.waiters != 0 || entry.dead {
                return;
            }
            entry.dead = true;
        } else {
            return;
        }
        entries.remove(key);
        log::debug!("flight: evicted idle entry {}", &key[..key.len().min(8)]);
    }
}

/// Decrements the waiter count when an `acquire` caller finishes or is
/// cancelled at the await point.
struct WaiterGuard {
    registry: FlightRegistry,
    key: String,
    idle_timeout: Duration,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.idle_timeout);
    }
}
