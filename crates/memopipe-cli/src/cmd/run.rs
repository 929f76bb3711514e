//! `memopipe run` - transform a batch of inputs into one output

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use memopipe_core::{
    CacheConfig, CommandTransform, Pipeline, PoolConfig, ProgressContext, RunOptions, WorkerPool,
};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input files or glob patterns, in output order
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Output file; results are concatenated in input order
    #[arg(short, long)]
    pub output: PathBuf,

    /// Transform command; each input's content is piped through its
    /// stdin/stdout (e.g. `-- zstd -c`)
    #[arg(last = true, required = true)]
    pub command: Vec<String>,

    /// Store directory (overrides config; absence disables caching)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Disable caching even if the config names a store directory
    #[arg(long, conflicts_with = "cache_dir")]
    pub no_cache: bool,

    /// Idle eviction window in seconds (overrides config)
    #[arg(long)]
    pub cache_timeout: Option<u64>,

    /// Maximum concurrent transform executions (overrides config)
    #[arg(short = 'w', long)]
    pub max_workers: Option<usize>,

    /// Per-transform deadline in seconds (overrides config)
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub fn run(args: RunArgs, config: &Config, progress: &ProgressContext) -> Result<()> {
    let inputs = expand_inputs(&args.inputs)?;
    log::info!("{} inputs -> {}", inputs.len(), args.output.display());

    let (program, program_args) = args
        .command
        .split_first()
        .context("transform command required (after --)")?;

    // The transform command shapes the output, so it is part of the digest.
    let mut opts = RunOptions::default()
        .with_option("exec", serde_json::json!(args.command));
    let cache_dir = if args.no_cache {
        None
    } else {
        args.cache_dir.clone().or_else(|| config.cache.dir.clone())
    };
    if let Some(dir) = cache_dir {
        let timeout = args.cache_timeout.unwrap_or(config.cache.timeout_secs);
        opts.cache = Some(CacheConfig {
            dir,
            timeout: Some(Duration::from_secs(timeout)),
        });
    }

    let pool = PoolConfig {
        timeout: Duration::from_secs(args.timeout.unwrap_or(config.workers.timeout_secs)),
        min: config.workers.min,
        max: args.max_workers.unwrap_or(config.workers.max),
    };
    let transform = WorkerPool::new(pool, CommandTransform::new(program, program_args.to_vec()));

    let pb = progress.batch_bar("transform", inputs.len() as u64);
    let pipeline = Pipeline::new();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let stats = runtime.block_on(async {
        let mut sink = tokio::fs::File::create(&args.output)
            .await
            .with_context(|| format!("failed to create output: {}", args.output.display()))?;
        pipeline
            .run(&inputs, &mut sink, opts, &transform, Some(&pb))
            .await
            .map_err(anyhow::Error::from)
    })?;
    pb.finish_and_clear();

    eprintln!(
        "Wrote {} bytes from {} inputs in {:.1?}",
        stats.bytes_written, stats.inputs, stats.elapsed
    );
    Ok(())
}

/// Expand input arguments, treating each as a literal path when it exists
/// and as a glob pattern otherwise. Argument order is preserved; matches
/// within one pattern come back sorted from the glob walk.
fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        if literal.exists() {
            inputs.push(literal);
            continue;
        }

        let before = inputs.len();
        for entry in glob::glob(pattern).with_context(|| format!("bad pattern: {pattern}"))? {
            inputs.push(entry?);
        }
        if inputs.len() == before {
            bail!("no inputs match: {pattern}");
        }
    }
    Ok(inputs)
}
