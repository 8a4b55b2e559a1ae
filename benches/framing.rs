// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for `Content-Length` framing.
//!
//! These benchmark:
//! - Encoding messages of different sizes
//! - Decoding whole and chunked streams
//!
//! Run with: `cargo bench --bench framing`

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

use conductor::rpc::{encode_frame, ContentLengthCodec};

fn message(size: usize) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": { "text": "x".repeat(size) }
    })
}

/// Benchmark encoding.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");
    for size in [64usize, 4 * 1024, 256 * 1024] {
        let msg = message(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("codec", size), &msg, |b, msg| {
            let mut codec = ContentLengthCodec::new();
            let mut dst = BytesMut::new();
            b.iter(|| {
                dst.clear();
                codec.encode(black_box(msg.clone()), &mut dst).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark decoding a buffer holding many frames, whole and in chunks.
fn bench_decode(c: &mut Criterion) {
    let mut stream = Vec::new();
    for _ in 0..100 {
        stream.extend(encode_frame(&message(512)).unwrap());
    }

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("coalesced_100", |b| {
        b.iter(|| {
            let mut codec = ContentLengthCodec::new();
            let mut buf = BytesMut::from(&stream[..]);
            let mut count = 0;
            while let Some(value) = codec.decode(&mut buf).unwrap() {
                black_box(value);
                count += 1;
            }
            assert_eq!(count, 100);
        });
    });

    for chunk in [7usize, 1024] {
        group.bench_with_input(BenchmarkId::new("chunked", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut codec = ContentLengthCodec::new();
                let mut buf = BytesMut::new();
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    buf.extend_from_slice(piece);
                    while let Some(value) = codec.decode(&mut buf).unwrap() {
                        black_box(value);
                        count += 1;
                    }
                }
                assert_eq!(count, 100);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
