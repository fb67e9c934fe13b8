//! End-to-end flows across the store, resolver, actions and sweeps.

use std::sync::Arc;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;

use grandline_core::actions;
use grandline_core::combat::{BattleMode, EndReason, TurnEvent};
use grandline_core::config::{BattleConfig, RestConfig, SchemaDefaults, StorageConfig, SweepConfig};
use grandline_core::store::SqliteBackend;
use grandline_core::world::StaticDirectory;
use grandline_core::{
    BattleResolver, Combatant, GrandlineError, GuildId, MemberRecord, RecordKey, RecordStore,
    Scope, SweepKind, Sweeper, UserId,
};

fn member_key(g: u64, u: u64) -> RecordKey {
    RecordKey::Member(GuildId(g), UserId(u))
}

// ---------------------------------------------------------------------------
// Battles
// ---------------------------------------------------------------------------

#[test]
fn plain_duel_always_finishes_within_cap() {
    let resolver = BattleResolver::default();
    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        let outcome = resolver.resolve(
            Combatant::new("X", 20, 5, 10, 100),
            Combatant::new("Y", 15, 10, 10, 100),
            &BattleMode::Plain,
            &mut rng,
        );
        assert!(outcome.turns <= 20, "seed {seed}: {} turns", outcome.turns);
        assert!(outcome.turns > 0);
        if outcome.reason != EndReason::TurnCap {
            assert!(outcome.loser().is_down());
            assert!(!outcome.winner().is_down());
        }
    }
}

#[test]
fn same_seed_same_battle() {
    let resolver = BattleResolver::default();
    let run = |seed| {
        resolver.resolve(
            Combatant::new("Luffy", 18, 6, 14, 120),
            Combatant::new("Buggy", 12, 8, 9, 110),
            &BattleMode::standard_moves(),
            &mut StdRng::seed_from_u64(seed),
        )
    };
    assert_eq!(run(99), run(99));
}

#[test]
fn duel_result_lands_on_both_records_atomically() {
    let store = RecordStore::in_memory(SchemaDefaults::default());
    let (a, b) = (member_key(1, 1), member_key(1, 2));
    store
        .scoped_update(&a, |m: &mut MemberRecord| m.strength = 40)
        .expect("seed a");

    let config = BattleConfig::default();
    let resolver = BattleResolver::new(config.clone());
    let mut rng = StdRng::seed_from_u64(5);

    let payout = store
        .update_pair(&a, &b, |ra: &mut MemberRecord, rb: &mut MemberRecord| {
            let outcome = resolver.resolve(
                Combatant::from_member("A", ra, &config),
                Combatant::from_member("B", rb, &config),
                &BattleMode::Plain,
                &mut rng,
            );
            assert_eq!(outcome.winner().name, "A");
            Ok(actions::apply_battle_result(ra, rb, &outcome, &config))
        })
        .expect("duel");

    let winner: MemberRecord = store.get(&a).expect("get a");
    let loser: MemberRecord = store.get(&b).expect("get b");
    assert_eq!(winner.wins, 1);
    assert_eq!(loser.losses, 1);
    assert_eq!(winner.berries, 500 + payout.berries);
    assert!((0..=loser.max_hp).contains(&loser.hp));
    assert!((0..=winner.max_hp).contains(&winner.hp));
}

// ---------------------------------------------------------------------------
// Actions through the store
// ---------------------------------------------------------------------------

#[test]
fn resting_through_the_store() {
    let store = RecordStore::in_memory(SchemaDefaults::default());
    let key = member_key(3, 3);
    store
        .scoped_update(&key, |m: &mut MemberRecord| m.hp = 30)
        .expect("seed");

    let mut rng = StdRng::seed_from_u64(8);
    let now = Utc::now();
    store
        .try_scoped_update(&key, |m: &mut MemberRecord| {
            actions::rest(m, &mut rng, now, &RestConfig::default())
        })
        .expect("rest");
    let hp = store.get::<MemberRecord>(&key).expect("get").hp;
    assert!((50..=80).contains(&hp));

    // Second rest inside the cooldown changes nothing.
    let err = store
        .try_scoped_update(&key, |m: &mut MemberRecord| {
            actions::rest(m, &mut rng, now, &RestConfig::default())
        })
        .expect_err("cooldown");
    assert!(matches!(err, GrandlineError::Cooldown { .. }));
    assert_eq!(store.get::<MemberRecord>(&key).expect("get").hp, hp);
}

// ---------------------------------------------------------------------------
// Sweeps
// ---------------------------------------------------------------------------

#[test]
fn sweep_skips_member_of_vanished_guild() {
    let store = RecordStore::in_memory(SchemaDefaults::default());
    let directory = Arc::new(StaticDirectory::new());
    directory.add_member(GuildId(1), UserId(1));
    directory.add_member(GuildId(1), UserId(2));

    let config = SweepConfig {
        encounter_chance: 1.0,
        ..SweepConfig::default()
    };
    for key in [member_key(1, 1), member_key(1, 2), member_key(99, 3)] {
        store
            .scoped_update(&key, |m: &mut MemberRecord| m.hp = 50)
            .expect("seed");
    }
    let before: MemberRecord = store.get(&member_key(99, 3)).expect("get");

    let sweeper = Sweeper::new(store.clone(), directory, config);
    let report = sweeper.run(SweepKind::Encounter, &mut StdRng::seed_from_u64(13));

    assert_eq!(report.visited, 3);
    assert_eq!(report.updated, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, member_key(99, 3));
    assert_eq!(store.get::<MemberRecord>(&member_key(99, 3)).expect("get"), before);
}

// ---------------------------------------------------------------------------
// SQLite persistence
// ---------------------------------------------------------------------------

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("grandline.db");
    let storage = StorageConfig::default();
    let key = member_key(4, 4);

    {
        let backend = SqliteBackend::open(&path, &storage).expect("open");
        let store = RecordStore::new(Arc::new(backend), SchemaDefaults::default());
        store
            .scoped_update(&key, |m: &mut MemberRecord| {
                m.bounty = 30_000_000;
                m.give_item("sake", 2);
            })
            .expect("write");
    }

    let backend = SqliteBackend::open(&path, &storage).expect("reopen");
    let store = RecordStore::new(Arc::new(backend), SchemaDefaults::default());
    let member: MemberRecord = store.get(&key).expect("read");
    assert_eq!(member.bounty, 30_000_000);
    assert_eq!(member.inventory.get("sake"), Some(&2));
    assert_eq!(store.list_keys(Scope::Member).expect("list"), vec![key]);
}

#[test]
fn turn_log_reads_like_chat() {
    let resolver = BattleResolver::default();
    let outcome = resolver.resolve(
        Combatant::new("Zoro", 30, 5, 0, 40),
        Combatant::new("Kuro", 10, 4, 0, 40),
        &BattleMode::Plain,
        &mut StdRng::seed_from_u64(1),
    );
    let first = outcome.lines().into_iter().next().expect("a line");
    assert!(first.contains("Zoro"), "{first}");
    assert!(matches!(outcome.log[0], TurnEvent::Attack { damage: 28, .. }));
}
