//! Benchmarks for ghost-crypto

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ghost_crypto::{
    chunk::{plan, CHUNK_SIZE},
    keys::FileEncryptionKey,
    symmetric::{decrypt, encrypt},
    worker::{process, CryptoWorkerPool, WorkerRequest},
};

fn bench_symmetric(c: &mut Criterion) {
    let mut group = c.benchmark_group("symmetric");
    let key = FileEncryptionKey::generate();

    for size in [1024, 64 * 1024, 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(
            BenchmarkId::new("aes-256-gcm-seal", size),
            &data,
            |b, data| b.iter(|| encrypt(&key, data).unwrap()),
        );

        let sealed = encrypt(&key, &data).unwrap();
        group.bench_with_input(
            BenchmarkId::new("aes-256-gcm-open", size),
            &sealed,
            |b, sealed| b.iter(|| decrypt(&key, sealed).unwrap()),
        );
    }

    group.finish();
}

fn bench_key_wrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_wrap");
    let key = FileEncryptionKey::generate();
    let wrapped = key.wrap("123456").unwrap();

    group.bench_function("wrap", |b| b.iter(|| key.wrap("123456").unwrap()));
    group.bench_function("unwrap", |b| b.iter(|| wrapped.unwrap("123456").unwrap()));
    group.bench_function("unwrap-wrong-pin", |b| b.iter(|| wrapped.unwrap("000000").is_err()));

    group.finish();
}

fn bench_worker(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker");
    let key = FileEncryptionKey::generate();
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for size in [64 * 1024, 1024 * 1024].iter() {
        let data = Bytes::from(vec![0xABu8; *size]);
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("inline", size), &data, |b, data| {
            b.iter(|| process(WorkerRequest::encrypt(0, data.clone(), key.clone())))
        });

        let mut pool = CryptoWorkerPool::new(2).unwrap();
        group.bench_with_input(BenchmarkId::new("pool-roundtrip", size), &data, |b, data| {
            b.iter(|| {
                runtime.block_on(pool.submit(WorkerRequest::encrypt(0, data.clone(), key.clone())))
            })
        });
    }

    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");

    group.bench_function("plan-5gib", |b| b.iter(|| plan(5 * 1024 * 1024 * 1024, CHUNK_SIZE)));

    group.finish();
}

criterion_group!(benches, bench_symmetric, bench_key_wrap, bench_worker, bench_planning);
criterion_main!(benches);
