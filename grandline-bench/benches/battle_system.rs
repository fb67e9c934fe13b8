//! grandline benchmark suite.
//!
//! Rough budgets:
//!   battle_plain_single ............ < 20μs
//!   battle_moves_single ............ < 30μs
//!   store_scoped_update_memory ..... < 10μs
//!   store_scoped_update_sqlite ..... < 500μs
//!   sweep_bounty_drift_500_members . < 5ms

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use grandline_core::combat::BattleMode;
use grandline_core::config::{SchemaDefaults, StorageConfig, SweepConfig};
use grandline_core::store::SqliteBackend;
use grandline_core::world::{StaticDirectory, SweepKind, Sweeper};
use grandline_core::{BattleResolver, Combatant, GuildId, MemberRecord, RecordKey, RecordStore, UserId};

fn fighters() -> (Combatant, Combatant) {
    (
        Combatant::new("Luffy", 20, 5, 10, 100),
        Combatant::new("Crocodile", 15, 10, 10, 100),
    )
}

/// Benchmark: one plain battle from start to finish.
fn bench_battle_plain(c: &mut Criterion) {
    let resolver = BattleResolver::default();
    let mut rng = StdRng::seed_from_u64(1);
    c.bench_function("battle_plain_single", |b| {
        b.iter(|| {
            let (x, y) = fighters();
            black_box(resolver.resolve(x, y, &BattleMode::Plain, &mut rng));
        });
    });
}

/// Benchmark: one battle with the special-move table.
fn bench_battle_moves(c: &mut Criterion) {
    let resolver = BattleResolver::default();
    let mode = BattleMode::standard_moves();
    let mut rng = StdRng::seed_from_u64(2);
    c.bench_function("battle_moves_single", |b| {
        b.iter(|| {
            let (x, y) = fighters();
            black_box(resolver.resolve(x, y, black_box(&mode), &mut rng));
        });
    });
}

/// Benchmark: read-modify-write of one member, in memory and on disk.
fn bench_scoped_update(c: &mut Criterion) {
    let key = RecordKey::Member(GuildId(1), UserId(1));

    let memory = RecordStore::in_memory(SchemaDefaults::default());
    c.bench_function("store_scoped_update_memory", |b| {
        b.iter(|| {
            memory
                .scoped_update(black_box(&key), |m: &mut MemberRecord| m.berries += 1)
                .expect("update");
        });
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let backend = SqliteBackend::open(dir.path().join("bench.db"), &StorageConfig::default()).expect("open");
    let sqlite = RecordStore::new(Arc::new(backend), SchemaDefaults::default());
    c.bench_function("store_scoped_update_sqlite", |b| {
        b.iter(|| {
            sqlite
                .scoped_update(black_box(&key), |m: &mut MemberRecord| m.berries += 1)
                .expect("update");
        });
    });
}

/// Benchmark: a bounty drift sweep over 500 members.
fn bench_sweep(c: &mut Criterion) {
    let store = RecordStore::in_memory(SchemaDefaults::default());
    let directory = Arc::new(StaticDirectory::new());
    for u in 0..500 {
        let key = RecordKey::Member(GuildId(u % 5), UserId(u));
        directory.add_member(GuildId(u % 5), UserId(u));
        store
            .scoped_update(&key, |m: &mut MemberRecord| m.bounty = 1_000_000)
            .expect("seed");
    }
    let sweeper = Sweeper::new(store, directory, SweepConfig::default());
    let mut rng = StdRng::seed_from_u64(3);
    c.bench_function("sweep_bounty_drift_500_members", |b| {
        b.iter(|| black_box(sweeper.run(SweepKind::BountyDrift, &mut rng)));
    });
}

criterion_group!(
    benches,
    bench_battle_plain,
    bench_battle_moves,
    bench_scoped_update,
    bench_sweep,
);
criterion_main!(benches);
