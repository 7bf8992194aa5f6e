// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{Criterion, criterion_group, criterion_main};
use fair_mutex::Mutex;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

fn uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");

    let fair = Mutex::new(0_u64);
    group.bench_function("fair_mutex", |b| {
        b.iter(|| {
            *fair.lock() += 1;
        });
    });

    let std = std::sync::Mutex::new(0_u64);
    group.bench_function("std_mutex", |b| {
        b.iter(|| {
            *std.lock().unwrap() += 1;
        });
    });

    group.finish();
}

fn contended(c: &mut Criterion) {
    const THREADS: usize = 4;
    const ITERS: usize = 10_000;

    let mut group = c.benchmark_group("contended_4x10k");
    group.sample_size(20);

    group.bench_function("fair_mutex", |b| {
        b.iter(|| {
            let m = Arc::new(Mutex::new(0_usize));
            let joins: Vec<_> = (0..THREADS)
                .map(|_| {
                    let m = m.clone();
                    thread::spawn(move || {
                        for _ in 0..ITERS {
                            *m.lock() += 1;
                        }
                    })
                })
                .collect();
            for join in joins {
                join.join().unwrap();
            }
            black_box(*m.lock())
        });
    });

    group.bench_function("std_mutex", |b| {
        b.iter(|| {
            let m = Arc::new(std::sync::Mutex::new(0_usize));
            let joins: Vec<_> = (0..THREADS)
                .map(|_| {
                    let m = m.clone();
                    thread::spawn(move || {
                        for _ in 0..ITERS {
                            *m.lock().unwrap() += 1;
                        }
                    })
                })
                .collect();
            for join in joins {
                join.join().unwrap();
            }
            black_box(*m.lock().unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, uncontended, contended);
criterion_main!(benches);
