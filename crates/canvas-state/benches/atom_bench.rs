//! Benchmarks for atom transitions and container dispatch.
//!
//! Run with: `cargo bench --package canvas-state --bench atom_bench`
//!
//! Each transition snapshots the watcher set before notifying, so cost grows
//! linearly with the number of watchers. The `watchers/*` group tracks that
//! slope; `container/set_state` adds event construction and dispatch on top.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use canvas_state::{Atom, Container, EventKind, Listener, StateEvent, Watcher};
use std::hint::black_box;

fn bench_reset_no_watchers(c: &mut Criterion) {
    let atom = Atom::new(0u64);
    let mut n = 0u64;
    c.bench_function("atom/reset_unwatched", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            atom.reset(black_box(n)).unwrap();
        });
    });
}

fn bench_swap_with_watchers(c: &mut Criterion) {
    let mut group = c.benchmark_group("watchers");
    for count in [1usize, 8, 64] {
        let atom = Atom::with_validator(0u64, |next: &u64, prev: &u64| next >= prev);
        let watchers: Vec<Watcher<u64>> = (0..count)
            .map(|_| {
                Watcher::new(|next: &u64, _: &u64, _: &Atom<u64>| {
                    black_box(*next);
                })
            })
            .collect();
        for watcher in &watchers {
            atom.watch(watcher);
        }
        group.bench_with_input(BenchmarkId::new("swap", count), &count, |b, _| {
            b.iter(|| {
                atom.swap(|v| v + 1).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_container_set_state(c: &mut Criterion) {
    let container = Container::new("bench", vec![0u8; 64]);
    let listener = Listener::new(|event: &StateEvent<Vec<u8>>| {
        black_box(event.kind());
    });
    container.add_event_listener(EventKind::Changed, &listener);
    let mut n = 0u8;
    c.bench_function("container/set_state", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            container.set_state(vec![n; 64]).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_reset_no_watchers,
    bench_swap_with_watchers,
    bench_container_set_state
);
criterion_main!(benches);
