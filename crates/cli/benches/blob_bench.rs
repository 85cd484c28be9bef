use blobstore::{BlobOptions, BlobReader, BlobWriter};
use codec::{sort_by_key_hash, CompressionCodec};
use config::BlobConfig;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::path::Path;
use tempfile::tempdir;

const N_KEYS: usize = 5_000;

fn entries() -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..N_KEYS)
        .map(|i| {
            let len = 64 + (i * 31) % 512;
            (format!("doc{}", i).into_bytes(), vec![(i % 251) as u8; len])
        })
        .collect()
}

fn opts(compression: CompressionCodec, value_cache_capacity: usize) -> BlobOptions {
    BlobOptions::new(10, 10)
        .with_compression(compression)
        .with_blob(BlobConfig {
            value_cache_capacity,
            ..BlobConfig::default()
        })
}

fn write_store(dir: &Path, opts: &BlobOptions) -> BlobReader {
    let index = dir.join("bench.hidx");
    let records = dir.join("bench.blob");
    let mut sorted = entries();
    sort_by_key_hash(opts.hasher, opts.key_hash_size, &mut sorted);
    let mut w = BlobWriter::create(&index, &records, opts.clone()).unwrap();
    for (k, v) in &sorted {
        w.write(k, v).unwrap();
    }
    w.finish().unwrap();
    BlobReader::open(&index, &records, opts).unwrap()
}

fn blob_write_benchmark(c: &mut Criterion) {
    for (name, codec) in [
        ("blob_write_5k_flat", CompressionCodec::None),
        ("blob_write_5k_snappy", CompressionCodec::Snappy),
    ] {
        c.bench_function(name, |b| {
            b.iter_batched(
                || tempdir().unwrap(),
                |dir| {
                    write_store(dir.path(), &opts(codec, 0));
                },
                BatchSize::SmallInput,
            );
        });
    }
}

fn blob_get_benchmark(c: &mut Criterion) {
    for (name, codec, cache) in [
        ("blob_get_hit_5k_flat", CompressionCodec::None, 0),
        ("blob_get_hit_5k_deflate", CompressionCodec::Deflate, 0),
        ("blob_get_hit_5k_snappy", CompressionCodec::Snappy, 0),
        ("blob_get_hit_5k_snappy_cached", CompressionCodec::Snappy, N_KEYS),
    ] {
        let dir = tempdir().unwrap();
        let reader = write_store(dir.path(), &opts(codec, cache));
        let keys: Vec<Vec<u8>> = (0..N_KEYS).map(|i| format!("doc{}", i).into_bytes()).collect();

        c.bench_function(name, |b| {
            b.iter(|| {
                for k in &keys {
                    assert!(reader.get(k).unwrap().is_found());
                }
            });
        });
    }
}

fn blob_scan_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let reader = write_store(dir.path(), &opts(CompressionCodec::Snappy, 0));

    c.bench_function("blob_scan_5k_snappy", |b| {
        b.iter(|| {
            let n = reader.iter().map(|r| r.unwrap()).count();
            assert_eq!(n, N_KEYS);
        });
    });
}

criterion_group!(benches, blob_write_benchmark, blob_get_benchmark, blob_scan_benchmark);
criterion_main!(benches);
