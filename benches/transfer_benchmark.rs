//! Performance benchmarks for filekit
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use filekit::config::{ConflictPolicy, HashAlgorithm, TransferConfig};
use filekit::core::TransferEngine;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a test file of the specified size
fn create_test_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();

    let chunk_size = 64 * 1024;
    let chunk: Vec<u8> = (0..chunk_size).map(|i| (i % 251) as u8).collect();
    let mut remaining = size;

    while remaining > 0 {
        let to_write = remaining.min(chunk_size);
        file.write_all(&chunk[..to_write]).unwrap();
        remaining -= to_write;
    }

    path
}

fn bench_config(threads: usize, verify: Option<HashAlgorithm>) -> TransferConfig {
    TransferConfig {
        conflict: ConflictPolicy::Overwrite,
        check_space: false,
        threads,
        verify,
        ..Default::default()
    }
}

fn bench_copy_tree(c: &mut Criterion) {
    let src_dir = TempDir::new().unwrap();
    for i in 0..10 {
        let sub = src_dir.path().join(format!("dir_{}", i));
        std::fs::create_dir_all(&sub).unwrap();
        for j in 0..20 {
            create_test_file(&sub, &format!("file_{}.dat", j), 4096);
        }
    }

    let mut group = c.benchmark_group("copy_tree_200_files");
    for (label, threads, verify) in [
        ("sequential", 1, None),
        ("parallel_4", 4, None),
        ("verified_xxhash3", 4, Some(HashAlgorithm::XXHash3)),
    ] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let dst_dir = TempDir::new().unwrap();
                let engine = TransferEngine::new(bench_config(threads, verify));
                black_box(engine.copy_tree(src_dir.path(), &dst_dir.path().join("out")).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_copy_large_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_file_copy");
    group.sample_size(10);

    for size in [1024 * 1024, 16 * 1024 * 1024] {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src_file = create_test_file(src_dir.path(), "large.bin", size);
        let dst_file = dst_dir.path().join("large.bin");

        group.throughput(Throughput::Bytes(size as u64));
        for (label, verify) in [("plain", None), ("sha256", Some(HashAlgorithm::Sha256))] {
            group.bench_with_input(
                BenchmarkId::new(label, humansize::format_size(size as u64, humansize::BINARY)),
                &size,
                |b, _| {
                    let engine = TransferEngine::new(bench_config(1, verify));
                    b.iter(|| black_box(engine.copy_file(&src_file, &dst_file).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_hash_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_algorithms");

    let data_size = 10 * 1024 * 1024; // 10 MB
    let data: Vec<u8> = (0..data_size).map(|i| (i % 256) as u8).collect();

    group.throughput(Throughput::Bytes(data_size as u64));

    for algo in [
        HashAlgorithm::XXHash3,
        HashAlgorithm::Blake3,
        HashAlgorithm::Sha256,
        HashAlgorithm::Md5,
    ] {
        group.bench_with_input(BenchmarkId::new("hash", algo.name()), &data, |b, data| {
            b.iter(|| black_box(filekit::hash::hash_bytes(data, algo)));
        });
    }

    group.finish();
}

fn bench_manifest(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    for i in 0..10 {
        let subdir = dir.path().join(format!("subdir_{}", i));
        std::fs::create_dir_all(&subdir).unwrap();
        for j in 0..100 {
            create_test_file(&subdir, &format!("file_{}.txt", j), 1024);
        }
    }

    c.bench_function("manifest_1000_files", |b| {
        b.iter(|| {
            black_box(
                filekit::hash::calculate_directory_hashes(dir.path(), HashAlgorithm::XXHash3)
                    .unwrap(),
            )
        });
    });
}

fn bench_normalize(c: &mut Criterion) {
    let inputs = [
        r"C:\Users\me\Documents\report.pdf",
        "/c/Users/me/Documents/report.pdf",
        "/mnt/c/Users/me/Documents/report.pdf",
        r"\\server\share\team\report.pdf",
        "./relative/../path/report.pdf",
    ];

    c.bench_function("normalize_mixed_dialects", |b| {
        b.iter(|| {
            for input in &inputs {
                black_box(filekit::normalize_cross_platform_path(input).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_copy_tree,
    bench_copy_large_file,
    bench_hash_algorithms,
    bench_manifest,
    bench_normalize
);

criterion_main!(benches);
