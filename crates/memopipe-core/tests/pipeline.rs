//! End-to-end pipeline runs against real files and a real store.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memopipe_core::{transform_fn, Pipeline, PipelineError, RunOptions, Transform, TransformJob};

fn write_inputs(dir: &std::path::Path, contents: &[&[u8]]) -> Vec<PathBuf> {
    contents
        .iter()
        .enumerate()
        .map(|(i, content)| {
            let path = dir.join(format!("input_{i}.txt"));
            std::fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

fn counting_upper(calls: Arc<AtomicUsize>) -> Arc<dyn Transform> {
    transform_fn(move |job: TransformJob| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(job.content.to_ascii_uppercase())
        }
    })
}

async fn run_to_file(
    pipeline: &Pipeline,
    inputs: &[PathBuf],
    output: &std::path::Path,
    opts: RunOptions,
    transform: &Arc<dyn Transform>,
) -> Result<memopipe_core::RunStats, PipelineError> {
    let mut sink = tokio::fs::File::create(output).await?;
    pipeline.run(inputs, &mut sink, opts, transform, None).await
}

#[tokio::test]
async fn output_preserves_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), &[b"aa", b"bb", b"cc"]);
    let output = dir.path().join("out.bin");

    // Completion order is reversed on purpose: the first input finishes
    // last, the last finishes first.
    let transform = transform_fn(|job: TransformJob| async move {
        let delay = match &*job.content {
            b"aa" => 30,
            b"bb" => 20,
            _ => 10,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(job.content.to_ascii_uppercase())
    });

    let pipeline = Pipeline::new();
    let stats = run_to_file(&pipeline, &inputs, &output, RunOptions::default(), &transform)
        .await
        .unwrap();

    assert_eq!(stats.inputs, 3);
    assert_eq!(stats.bytes_written, 6);
    assert_eq!(std::fs::read(&output).unwrap(), b"AABBCC");
}

#[tokio::test]
async fn empty_batch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.bin");
    let calls = Arc::new(AtomicUsize::new(0));
    let transform = counting_upper(Arc::clone(&calls));

    let pipeline = Pipeline::new();
    let stats = run_to_file(&pipeline, &[], &output, RunOptions::default(), &transform)
        .await
        .unwrap();

    assert_eq!(stats.inputs, 0);
    assert_eq!(stats.bytes_written, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read(&output).unwrap().len(), 0);
}

#[tokio::test]
async fn one_failing_input_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), &[b"good", b"poison", b"good"]);
    let output = dir.path().join("out.bin");

    let transform = transform_fn(|job: TransformJob| async move {
        if &*job.content == b"poison" {
            return Err(PipelineError::Transform {
                input: job.label(),
                message: "unparseable".into(),
            });
        }
        Ok(job.content.to_vec())
    });

    let pipeline = Pipeline::new();
    let err = run_to_file(&pipeline, &inputs, &output, RunOptions::default(), &transform)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Transform { .. }));
}

#[tokio::test]
async fn missing_input_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![dir.path().join("does_not_exist.txt")];
    let output = dir.path().join("out.bin");
    let transform = counting_upper(Arc::new(AtomicUsize::new(0)));

    let pipeline = Pipeline::new();
    let err = run_to_file(&pipeline, &inputs, &output, RunOptions::default(), &transform)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io(_)));
}

#[tokio::test]
async fn duplicate_content_shares_one_flight() {
    let dir = tempfile::tempdir().unwrap();
    // Three distinct files, identical content: one digest, one transform
    // invocation, three copies in the output.
    let inputs = write_inputs(dir.path(), &[b"same", b"same", b"same"]);
    let output = dir.path().join("out.bin");
    let cache = dir.path().join("cache");

    let calls = Arc::new(AtomicUsize::new(0));
    let transform = counting_upper(Arc::clone(&calls));

    let pipeline = Pipeline::new();
    let stats = run_to_file(&pipeline, &inputs, &output, RunOptions::cached(&cache), &transform)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.bytes_written, 12);
    assert_eq!(std::fs::read(&output).unwrap(), b"SAMESAMESAME");
}

#[tokio::test]
async fn second_run_hits_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), &[b"one", b"two"]);
    let cache = dir.path().join("cache");

    let calls = Arc::new(AtomicUsize::new(0));
    let transform = counting_upper(Arc::clone(&calls));

    let out1 = dir.path().join("out1.bin");
    let first = Pipeline::new();
    run_to_file(&first, &inputs, &out1, RunOptions::cached(&cache), &transform)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // A brand-new pipeline (fresh registry) must be served entirely from
    // the persistent store.
    let out2 = dir.path().join("out2.bin");
    let second = Pipeline::new();
    run_to_file(&second, &inputs, &out2, RunOptions::cached(&cache), &transform)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        std::fs::read(&out1).unwrap(),
        std::fs::read(&out2).unwrap()
    );
}

#[tokio::test]
async fn pipelines_sharing_a_registry_deduplicate_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), &[b"shared payload"]);
    let cache = dir.path().join("cache");

    let calls = Arc::new(AtomicUsize::new(0));
    let transform = counting_upper(Arc::clone(&calls));

    // Two pipelines over one registry: concurrent runs of the same input
    // attach to a single in-flight computation.
    let registry = memopipe_core::FlightRegistry::new();
    let p1 = Pipeline::with_registry(registry.clone());
    let p2 = Pipeline::with_registry(registry.clone());

    let out1 = dir.path().join("out1.bin");
    let out2 = dir.path().join("out2.bin");
    let (r1, r2) = tokio::join!(
        run_to_file(&p1, &inputs, &out1, RunOptions::cached(&cache), &transform),
        run_to_file(&p2, &inputs, &out2, RunOptions::cached(&cache), &transform),
    );
    r1.unwrap();
    r2.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        std::fs::read(&out1).unwrap(),
        std::fs::read(&out2).unwrap()
    );
    // Both pipelines expose the same table: the settled entry is still
    // resident (inside its idle window) from either handle.
    assert_eq!(p1.registry().len(), 1);
    assert_eq!(p2.registry().len(), 1);
}

#[tokio::test]
async fn without_cache_dir_every_run_recomputes() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), &[b"payload"]);
    let calls = Arc::new(AtomicUsize::new(0));
    let transform = counting_upper(Arc::clone(&calls));

    let pipeline = Pipeline::new();
    for i in 0..2 {
        let output = dir.path().join(format!("out{i}.bin"));
        run_to_file(&pipeline, &inputs, &output, RunOptions::default(), &transform)
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn transform_options_partition_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), &[b"data"]);
    let cache = dir.path().join("cache");
    let calls = Arc::new(AtomicUsize::new(0));
    let transform = counting_upper(Arc::clone(&calls));

    let pipeline = Pipeline::new();
    let out1 = dir.path().join("out1.bin");
    let opts1 = RunOptions::cached(&cache).with_option("mode", serde_json::json!("fast"));
    run_to_file(&pipeline, &inputs, &out1, opts1, &transform)
        .await
        .unwrap();

    // Different transform options: different digest, fresh computation.
    let out2 = dir.path().join("out2.bin");
    let opts2 = RunOptions::cached(&cache).with_option("mode", serde_json::json!("slow"));
    run_to_file(&pipeline, &inputs, &out2, opts2, &transform)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
