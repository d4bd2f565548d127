//! # Coalescer Benchmark
//!
//! Measures:
//! 1. Many writes followed by one flush (the per-frame pattern)
//! 2. Flush on a clean value (the lock-free fast path)
//! 3. Writers on other threads racing the flushing thread

#![allow(missing_docs)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lumen_core::Coalesced;

const WRITES_PER_FRAME: u32 = 1_000;

type Transform = [f32; 16];

fn transform(seed: u32) -> Transform {
    let mut m = [0.0; 16];
    m[0] = 1.0;
    m[5] = 1.0;
    m[10] = 1.0;
    m[15] = 1.0;
    #[allow(clippy::cast_precision_loss)]
    {
        m[12] = seed as f32;
    }
    m
}

fn bench_writes_then_flush(c: &mut Criterion) {
    let value = Coalesced::new(transform(0));
    let mut mirror = transform(0);

    c.bench_function("coalescer_1k_writes_1_flush", |b| {
        b.iter(|| {
            for i in 0..WRITES_PER_FRAME {
                value.set(transform(i));
            }
            value
                .flush(|v| {
                    mirror = *v;
                    Ok::<_, Infallible>(())
                })
                .ok();
            black_box(mirror[12])
        });
    });
}

fn bench_clean_flush(c: &mut Criterion) {
    let value = Coalesced::new(transform(0));
    value.flush(|_| Ok::<_, Infallible>(())).ok();

    c.bench_function("coalescer_clean_flush", |b| {
        b.iter(|| black_box(value.flush(|_| Ok::<_, Infallible>(()))));
    });
}

fn bench_contended_flush(c: &mut Criterion) {
    let value = Arc::new(Coalesced::new(transform(0)));
    let running = Arc::new(AtomicBool::new(true));

    let writers: Vec<_> = (0..3)
        .map(|t| {
            let value = Arc::clone(&value);
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                let mut i = t;
                while running.load(Ordering::Relaxed) {
                    value.set(transform(i));
                    i = i.wrapping_add(3);
                }
            })
        })
        .collect();

    c.bench_function("coalescer_flush_with_3_writers", |b| {
        b.iter(|| black_box(value.flush(|v| {
            black_box(v[12]);
            Ok::<_, Infallible>(())
        })));
    });

    running.store(false, Ordering::Relaxed);
    for writer in writers {
        writer.join().ok();
    }
}

criterion_group!(
    benches,
    bench_writes_then_flush,
    bench_clean_flush,
    bench_contended_flush
);
criterion_main!(benches);
