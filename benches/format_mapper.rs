//! Format Mapper Benchmarks
//!
//! Measures text transcoding, bitmap header reconstruction and file
//! descriptor list parsing at clipboard-sized payloads.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use clipsync_core::image::wrap_bitmap_payload;
use clipsync_core::{map_local_type_to_remote, FileDescriptor, FormatConverter, CF_TEXT, CF_UNICODETEXT};

/// Multi-line text of roughly `len` bytes with some non-ASCII content
fn generate_text(len: usize) -> String {
    let line = "Grüße from the remote clipboard, line with ümlauts\n";
    line.repeat(len / line.len() + 1)
}

/// A BITMAPINFOHEADER DIB of the given size, 32 bpp, no colour table
fn generate_dib(width: u32, height: u32) -> Vec<u8> {
    let mut dib = Vec::with_capacity(40 + (width * height * 4) as usize);
    dib.extend_from_slice(&40u32.to_le_bytes());
    dib.extend_from_slice(&(width as i32).to_le_bytes());
    dib.extend_from_slice(&(height as i32).to_le_bytes());
    dib.extend_from_slice(&1u16.to_le_bytes());
    dib.extend_from_slice(&32u16.to_le_bytes());
    dib.extend_from_slice(&[0u8; 24]);
    dib.resize(40 + (width * height * 4) as usize, 0x7f);
    dib
}

fn bench_text(c: &mut Criterion) {
    let converter = FormatConverter::new();
    let mut group = c.benchmark_group("text");

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let text = generate_text(size);
        group.throughput(Throughput::Bytes(text.len() as u64));

        for (format, name) in [(CF_UNICODETEXT, "unicode"), (CF_TEXT, "ansi")] {
            let wire = converter.encode_text(format, &text).unwrap();

            group.bench_with_input(BenchmarkId::new(format!("encode_{}", name), size), &text, |b, text| {
                b.iter(|| converter.encode_text(format, black_box(text)).unwrap());
            });
            group.bench_with_input(BenchmarkId::new(format!("decode_{}", name), size), &wire, |b, wire| {
                b.iter(|| converter.decode_text(format, black_box(wire)).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_bitmap_wrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("wrap_bitmap_payload");

    for (width, height, name) in [(64, 64, "icon"), (1920, 1080, "1080p")] {
        let dib = generate_dib(width, height);
        group.throughput(Throughput::Bytes(dib.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &dib, |b, dib| {
            b.iter(|| wrap_bitmap_payload(black_box(dib)).unwrap());
        });
    }

    group.finish();
}

fn bench_descriptors(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_descriptors");

    for count in [1usize, 100, 1000] {
        let descriptors: Vec<FileDescriptor> = (0..count)
            .map(|i| FileDescriptor {
                flags: FileDescriptor::FLAG_ATTRIBUTES | FileDescriptor::FLAG_FILESIZE,
                attributes: 0x80,
                write_time: None,
                size: (i as u64) * 4096,
                name: format!("folder\\file-{:04}.dat", i),
            })
            .collect();
        let data = FileDescriptor::encode_list(&descriptors).unwrap();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("parse_list", count), &data, |b, data| {
            b.iter(|| FileDescriptor::parse_list(black_box(data)).unwrap());
        });
    }

    group.finish();
}

fn bench_target_lookup(c: &mut Criterion) {
    let targets = [
        "UTF8_STRING",
        "TEXT",
        "text/html",
        "image/png",
        "image/bmp",
        "text/uri-list",
        "application/x-unknown",
    ];

    c.bench_function("map_local_type_to_remote", |b| {
        b.iter(|| {
            for target in targets {
                black_box(map_local_type_to_remote(black_box(target)));
            }
        });
    });
}

criterion_group!(benches, bench_text, bench_bitmap_wrap, bench_descriptors, bench_target_lookup);
criterion_main!(benches);
