//! Common error type for the cache-aside pipeline

use std::sync::Arc;

/// Error from any stage of a pipeline run.
///
/// Clone-able so a single failure can fan out to every waiter attached to
/// the same in-flight computation; sources are Arc-wrapped for that reason.
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// Run options could not be canonicalized for the digest.
    Config(String),
    /// Input read or output sink failure.
    Io(Arc<std::io::Error>),
    /// The persistent store failed for a reason other than a miss.
    Store(Arc<anyhow::Error>),
    /// The transform reported a failure for one input.
    Transform { input: String, message: String },
    /// Worker pool failure: timeout, closed pool, or a runtime task error.
    Worker(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration: {msg}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Transform { input, message } => write!(f, "transform {input}: {message}"),
            Self::Worker(msg) => write!(f, "worker: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e.as_ref()),
            Self::Store(e) => {
                let source: &(dyn std::error::Error + Send + Sync) = e.as_ref().as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}
