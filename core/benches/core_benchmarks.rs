use criterion::{Criterion, black_box, criterion_group, criterion_main};

use thistle_core::arena::Arena;

// ---------------------------------------------------------------------------
// Arena churn
// ---------------------------------------------------------------------------

fn bench_arena_insert(c: &mut Criterion) {
    c.bench_function("arena_insert_1024", |b| {
        b.iter(|| {
            let mut arena = Arena::new();
            for i in 0..1024u32 {
                black_box(arena.insert(i));
            }
            arena
        });
    });
}

fn bench_arena_reuse(c: &mut Criterion) {
    c.bench_function("arena_remove_reinsert_1024", |b| {
        let mut arena = Arena::new();
        let mut live: Vec<_> = (0..1024u32).map(|i| arena.insert(i)).collect();
        b.iter(|| {
            for index in live.drain(..) {
                black_box(arena.remove(index));
            }
            live.extend((0..1024u32).map(|i| arena.insert(i)));
        });
    });
}

fn bench_arena_lookup(c: &mut Criterion) {
    c.bench_function("arena_lookup_1024", |b| {
        let mut arena = Arena::new();
        let live: Vec<_> = (0..1024u32).map(|i| arena.insert(i)).collect();
        b.iter(|| {
            let mut sum = 0u64;
            for &index in &live {
                sum += *arena.get(black_box(index)).unwrap_or(&0) as u64;
            }
            sum
        });
    });
}

criterion_group!(
    benches,
    bench_arena_insert,
    bench_arena_reuse,
    bench_arena_lookup
);
criterion_main!(benches);
