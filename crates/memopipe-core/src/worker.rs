//! Bounded, timeout-guarded transform execution

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::error::PipelineError;
use crate::transform::{Transform, TransformJob};

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Per-call deadline for the wrapped transform.
    pub timeout: Duration,
    /// Minimum concurrency; `max` is clamped to at least this.
    pub min: usize,
    /// Maximum concurrent transform executions.
    pub max: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            min: 1,
            max: 2,
        }
    }
}

/// Wraps a transform with bounded concurrency and a per-call timeout.
///
/// The cache/dedup core treats this as any other transform; it only
/// changes how many executions run at once and how long each may take.
pub struct WorkerPool {
    inner: Arc<dyn Transform>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, inner: Arc<dyn Transform>) -> Arc<dyn Transform> {
        let max = config.max.max(config.min).max(1);
        Arc::new(Self {
            inner,
            permits: Arc::new(Semaphore::new(max)),
            timeout: config.timeout,
        })
    }
}

impl Transform for WorkerPool {
    fn apply(&self, job: TransformJob) -> BoxFuture<'static, Result<Vec<u8>, PipelineError>> {
        let permits = Arc::clone(&self.permits);
        let inner = Arc::clone(&self.inner);
        let deadline = self.timeout;
        let label = job.label();
        async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::Worker("worker pool closed".into()))?;
            match tokio::time::timeout(deadline, inner.apply(job)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Worker(format!(
                    "{label}: transform timed out after {deadline:?}"
                ))),
            }
        }
        .boxed()
    }
}

/// Transform that pipes content through a subprocess: content on stdin,
/// result on stdout. A non-zero exit is a transform failure carrying
/// whatever the process wrote to stderr.
pub struct CommandTransform {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTransform {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Arc<dyn Transform> {
        Arc::new(Self {
            program: program.into(),
            args,
        })
    }
}

impl Transform for CommandTransform {
    fn apply(&self, job: TransformJob) -> BoxFuture<'static, Result<Vec<u8>, PipelineError>> {
        let program = self.program.clone();
        let args = self.args.clone();
        async move {
            let label = job.label();
            let mut child = tokio::process::Command::new(&program)
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| PipelineError::Transform {
                    input: label.clone(),
                    message: format!("failed to spawn {}: {e}", program.display()),
                })?;

            // Feed stdin from a separate task: the child may emit more than
            // a pipe buffer of output before it finishes reading.
            let mut stdin = child.stdin.take().ok_or_else(|| PipelineError::Transform {
                input: label.clone(),
                message: "child stdin unavailable".into(),
            })?;
            let content = Arc::clone(&job.content);
            let feeder = tokio::spawn(async move {
                // A child that stops reading early is reported via its
                // exit status, not the broken pipe.
                let _ = stdin.write_all(&content).await;
                let _ = stdin.shutdown().await;
            });

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| PipelineError::Transform {
                    input: label.clone(),
                    message: format!("failed to run {}: {e}", program.display()),
                })?;
            feeder.await.ok();

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(PipelineError::Transform {
                    input: label,
                    message: format!(
                        "{} exited with {}: {}",
                        program.display(),
                        output.status,
                        stderr.trim()
                    ),
                });
            }
            Ok(output.stdout)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::options::RunOptions;
    use crate::transform::transform_fn;

    fn job(content: &[u8]) -> TransformJob {
        TransformJob {
            input: "input.txt".into(),
            content: content.to_vec().into(),
            opts: Arc::new(RunOptions::default()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pool_times_out_stuck_transform() {
        let stuck = transform_fn(|_job| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        });
        let pool = WorkerPool::new(
            PoolConfig {
                timeout: Duration::from_secs(5),
                ..PoolConfig::default()
            },
            stuck,
        );

        let err = pool.apply(job(b"x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Worker(_)));
    }

    #[tokio::test]
    async fn pool_bounds_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let gauge = {
            let (active, peak) = (Arc::clone(&active), Arc::clone(&peak));
            transform_fn(move |_job| {
                let (active, peak) = (Arc::clone(&active), Arc::clone(&peak));
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(Vec::new())
                }
            })
        };
        let pool = WorkerPool::new(
            PoolConfig {
                max: 2,
                ..PoolConfig::default()
            },
            gauge,
        );

        let jobs: Vec<_> = (0..8).map(|_| pool.apply(job(b"x"))).collect();
        futures_util::future::try_join_all(jobs).await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn command_pipes_content_through() {
        let cat = CommandTransform::new("cat", vec![]);
        let out = cat.apply(job(b"hello worker")).await.unwrap();
        assert_eq!(out, b"hello worker");
    }

    #[tokio::test]
    async fn command_failure_reports_status_and_stderr() {
        let fail = CommandTransform::new("sh", vec!["-c".into(), "echo oops >&2; exit 3".into()]);
        let err = fail.apply(job(b"ignored")).await.unwrap_err();
        match err {
            PipelineError::Transform { message, .. } => {
                assert!(message.contains("oops"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn command_spawn_failure() {
        let missing = CommandTransform::new("/nonexistent/program", vec![]);
        let err = missing.apply(job(b"x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transform { .. }));
    }
}
