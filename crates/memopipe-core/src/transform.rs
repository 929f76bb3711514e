//! Transform abstraction: the expensive computation the pipeline memoizes

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::PipelineError;
use crate::options::RunOptions;

/// One unit of work handed to a transform. Owned throughout, so the
/// resulting future can outlive the caller's borrows and be shared
/// between single-flight waiters.
#[derive(Clone)]
pub struct TransformJob {
    /// Identifier of the input (its path for file pipelines).
    pub input: PathBuf,
    /// Raw input content.
    pub content: Arc<[u8]>,
    /// Options for the run this job belongs to.
    pub opts: Arc<RunOptions>,
}

impl TransformJob {
    /// Input identifier for error messages and logs.
    pub fn label(&self) -> String {
        self.input.display().to_string()
    }
}

/// A deterministic transform from input content to output bytes.
///
/// Implementations must be deterministic with respect to (options,
/// content) or cached results become meaningless.
pub trait Transform: Send + Sync + 'static {
    fn apply(&self, job: TransformJob) -> BoxFuture<'static, Result<Vec<u8>, PipelineError>>;
}

/// Build a transform from an async closure. Mostly useful in tests and
/// for embedding memopipe as a library.
pub fn transform_fn<F, Fut>(f: F) -> Arc<dyn Transform>
where
    F: Fn(TransformJob) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, PipelineError>> + Send + 'static,
{
    Arc::new(FnTransform(f))
}

struct FnTransform<F>(F);

impl<F, Fut> Transform for FnTransform<F>
where
    F: Fn(TransformJob) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, PipelineError>> + Send + 'static,
{
    fn apply(&self, job: TransformJob) -> BoxFuture<'static, Result<Vec<u8>, PipelineError>> {
        (self.0)(job).boxed()
    }
}
