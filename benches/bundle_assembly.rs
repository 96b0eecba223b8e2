//! Benchmarks for bundle assembly
//!
//! Measures building a delivery archive from converted outputs, with and
//! without nested archives to flatten.

use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use convertforge::bundle::{build_delivery, BundleItem};
use convertforge::types::ConversionOutput;
use zip::write::SimpleFileOptions;

fn plain_items(count: usize, size: usize) -> Vec<BundleItem> {
    (0..count)
        .map(|i| {
            BundleItem::new(
                format!("photo_{i}.png"),
                ConversionOutput::new(format!("photo_{i}.jpg"), vec![(i % 251) as u8; size]),
            )
        })
        .collect()
}

fn nested_archive(pages: usize) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for page in 1..=pages {
        writer
            .start_file(format!("page_{page}.png"), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&[page as u8; 4096]).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn nested_items(count: usize) -> Vec<BundleItem> {
    let archive = nested_archive(8);
    (0..count)
        .map(|i| {
            BundleItem::new(
                format!("report_{i}.pdf"),
                ConversionOutput::new(format!("report_{i}_pages.zip"), archive.clone()),
            )
        })
        .collect()
}

fn bench_plain(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle_plain");
    for &size in &[1024usize, 64 * 1024] {
        let items = plain_items(10, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| build_delivery(black_box(items), "Pack-1", 6).unwrap())
        });
    }
    group.finish();
}

fn bench_nested(c: &mut Criterion) {
    let items = nested_items(10);
    c.bench_function("bundle_nested_flatten", |b| {
        b.iter(|| build_delivery(black_box(&items), "Pack-1", 6).unwrap())
    });
}

fn bench_compression_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle_compression_level");
    let items = plain_items(10, 32 * 1024);
    for level in [0u32, 6, 9] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            b.iter(|| build_delivery(black_box(&items), "Pack-1", level).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plain, bench_nested, bench_compression_levels);
criterion_main!(benches);
