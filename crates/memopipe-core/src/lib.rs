//! Memopipe Core - Cache-aside batch transform pipeline
//!
//! This crate provides the memoization layer that sits in front of an
//! expensive, deterministic transform: a content-addressed digest, a
//! single-flight registry that deduplicates concurrent computations per
//! key, a cache-aside executor backed by the persistent store, and a
//! pipeline runner that fans the transform out over a batch of inputs
//! and writes results in input order.

pub mod digest;
pub mod error;
pub mod executor;
pub mod flight;
pub mod logging;
pub mod options;
pub mod progress;
pub mod runner;
pub mod transform;
pub mod worker;

// Re-exports for convenience
pub use digest::Digest;
pub use error::PipelineError;
pub use executor::{CacheExecutor, CacheResult};
pub use flight::{FlightRegistry, DEFAULT_IDLE_TIMEOUT};
pub use logging::init_logging;
pub use options::{CacheConfig, RunOptions};
pub use progress::ProgressContext;
pub use runner::{Pipeline, RunStats};
pub use transform::{transform_fn, Transform, TransformJob};
pub use worker::{CommandTransform, PoolConfig, WorkerPool};
