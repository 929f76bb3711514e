//! Cache key derivation benchmark

use memopipe_core::{Digest, RunOptions};

fn main() {
    divan::main();
}

fn digest() -> Digest {
    let opts = RunOptions::default()
        .with_option("mode", serde_json::json!("fast"))
        .with_option("level", serde_json::json!(3));
    Digest::new(&opts).unwrap()
}

#[divan::bench]
fn key_1kib(bencher: divan::Bencher) {
    let digest = digest();
    let content = vec![0xabu8; 1024];
    bencher.bench_local(|| digest.key(&content));
}

#[divan::bench]
fn key_1mib(bencher: divan::Bencher) {
    let digest = digest();
    let content = vec![0xabu8; 1024 * 1024];
    bencher.bench_local(|| digest.key(&content));
}
