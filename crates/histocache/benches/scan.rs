// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Benchmarks for point lookups and forward scans.

#![allow(missing_docs, reason = "Benchmark code")]

use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use histocache::{GapCache, Key};
use histocache_tier::testing::MockReader;

const TICKS: i64 = 10_000;
const TICK_SPACING_MS: i64 = 250;

type Tick = (Key, u64);

fn reader() -> MockReader<Tick> {
    MockReader::new(|tick: &Tick| tick.0).with_values((0..TICKS).map(|i| (Key::from_millis(i * TICK_SPACING_MS), i.unsigned_abs())))
}

fn bench_lookups(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookups");

    group.bench_function("get_hit", |b| {
        let cache = GapCache::builder(reader()).memory().build();
        for i in 0..1000 {
            let _ = cache.get(Key::from_millis(i * TICK_SPACING_MS));
        }
        b.iter(|| {
            for i in 0..1000 {
                let _ = black_box(cache.get(Key::from_millis(i * TICK_SPACING_MS)));
            }
        });
    });

    group.bench_function("get_between_ticks_sequential", |b| {
        b.iter_batched(
            || GapCache::builder(reader()).memory().build(),
            |cache| {
                for i in 0..1000 {
                    let _ = black_box(cache.get(Key::from_millis(i * TICK_SPACING_MS + 100)));
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("get_after_eviction", |b| {
        b.iter_batched(
            || GapCache::builder(reader()).initial_maximum_size(128).memory().build(),
            |cache| {
                for i in (0..1000).rev() {
                    let _ = black_box(cache.get(Key::from_millis(i * TICK_SPACING_MS + 100)));
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_scans(c: &mut Criterion) {
    let mut group = c.benchmark_group("scans");

    group.bench_function("next_entries_1000", |b| {
        b.iter_batched(
            || GapCache::builder(reader()).memory().build(),
            |cache| {
                let query = cache.query().with_future();
                if let Ok(entries) = query.get_next_entries(Key::from_millis(0), 1000) {
                    black_box(entries.filter_map(Result::ok).count());
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("next_entry_shift_100", |b| {
        let cache = GapCache::builder(reader()).memory().build();
        b.iter(|| {
            let query = cache.query().with_future();
            let _ = black_box(query.get_next_entry(Key::from_millis(0), 100));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_lookups, bench_scans);
criterion_main!(benches);
