//! Single-member actions: rest, train, buy, battle payouts and sea
//! encounters.
//!
//! Each action mutates records in place and leaves them untouched when it
//! returns an error, so callers can run them inside
//! [`RecordStore::try_scoped_update`](crate::store::RecordStore::try_scoped_update).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::combat::{BattleOutcome, Combatant, Side};
use crate::config::{BattleConfig, RestConfig, TrainingConfig};
use crate::error::{GrandlineError, Result};
use crate::record::{GlobalRecord, MemberRecord};

// ---------------------------------------------------------------------------
// Rest
// ---------------------------------------------------------------------------

/// What a rest did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestOutcome {
    /// Health actually restored after clamping.
    pub healed: i64,
    /// Health after resting.
    pub hp: i64,
}

/// Heal a random amount in `[min_heal, max_heal]`, capped at `max_hp`.
///
/// # Errors
/// `Cooldown` if the member rested less than `cooldown_secs` ago.
pub fn rest<R: Rng + ?Sized>(
    member: &mut MemberRecord,
    rng: &mut R,
    now: DateTime<Utc>,
    config: &RestConfig,
) -> Result<RestOutcome> {
    if let Some(last) = member.last_rest {
        let elapsed = (now - last).num_seconds();
        if elapsed < config.cooldown_secs {
            return Err(GrandlineError::Cooldown {
                remaining_secs: config.cooldown_secs - elapsed,
            });
        }
    }

    let before = member.hp;
    member.hp += rng.gen_range(config.min_heal..=config.max_heal);
    member.clamp_hp();
    member.last_rest = Some(now);
    Ok(RestOutcome {
        healed: member.hp - before,
        hp: member.hp,
    })
}

// ---------------------------------------------------------------------------
// Train
// ---------------------------------------------------------------------------

/// A trainable stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    /// Attack power.
    Strength,
    /// Damage reduction.
    Defense,
    /// Crit weight.
    Speed,
    /// Health ceiling.
    MaxHp,
}

impl FromStr for Attribute {
    type Err = GrandlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strength" | "str" => Ok(Self::Strength),
            "defense" | "defence" | "def" => Ok(Self::Defense),
            "speed" | "spd" => Ok(Self::Speed),
            "max_hp" | "hp" | "health" => Ok(Self::MaxHp),
            other => Err(GrandlineError::InvalidArgument(format!(
                "unknown attribute `{other}`, pick strength, defense, speed or hp"
            ))),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strength => "strength",
            Self::Defense => "defense",
            Self::Speed => "speed",
            Self::MaxHp => "max hp",
        })
    }
}

/// Spend berries to raise one stat: 1–3 points, or 5–15 max hp.
/// Returns the gain.
///
/// # Errors
/// `InvalidArgument` when the member cannot afford the session.
pub fn train<R: Rng + ?Sized>(
    member: &mut MemberRecord,
    attribute: Attribute,
    rng: &mut R,
    config: &TrainingConfig,
) -> Result<i64> {
    if member.berries < config.cost_berries {
        return Err(GrandlineError::InvalidArgument(format!(
            "training costs {} berries, you have {}",
            config.cost_berries, member.berries
        )));
    }
    member.berries -= config.cost_berries;

    let gain = match attribute {
        Attribute::MaxHp => rng.gen_range(5..=15),
        _ => rng.gen_range(1..=3),
    };
    match attribute {
        Attribute::Strength => member.strength += gain,
        Attribute::Defense => member.defense += gain,
        Attribute::Speed => member.speed += gain,
        Attribute::MaxHp => member.max_hp += gain,
    }
    Ok(gain)
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Buy `quantity` of `item` at the current market price. Returns the total
/// cost.
///
/// # Errors
/// `InvalidArgument` for unknown items, zero quantity, or too few berries.
pub fn buy(
    member: &mut MemberRecord,
    global: &GlobalRecord,
    item: &str,
    quantity: u32,
) -> Result<u64> {
    let item = item.trim().to_ascii_lowercase();
    let Some(&price) = global.market.get(&item) else {
        return Err(GrandlineError::InvalidArgument(format!(
            "the market doesn't sell `{item}`"
        )));
    };
    if quantity == 0 {
        return Err(GrandlineError::InvalidArgument("buy at least one".into()));
    }
    let cost = price.saturating_mul(u64::from(quantity));
    if member.berries < cost {
        return Err(GrandlineError::InvalidArgument(format!(
            "{quantity} {item} cost {cost} berries, you have {}",
            member.berries
        )));
    }
    member.berries -= cost;
    member.give_item(&item, quantity);
    Ok(cost)
}

// ---------------------------------------------------------------------------
// Battle payout
// ---------------------------------------------------------------------------

/// Berries and bounty moved by one battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattlePayout {
    /// Berries credited to the winner.
    pub berries: u64,
    /// Bounty added to the winner.
    pub bounty: u64,
}

/// Write a finished battle back to the two member records: remaining hp
/// (clamped), win/loss counters, the winner's berries and bounty.
pub fn apply_battle_result(
    winner: &mut MemberRecord,
    loser: &mut MemberRecord,
    outcome: &BattleOutcome,
    config: &BattleConfig,
) -> BattlePayout {
    winner.hp = outcome.winner().hp;
    winner.clamp_hp();
    loser.hp = outcome.loser().hp;
    loser.clamp_hp();

    winner.wins += 1;
    loser.losses += 1;

    let berries = config.reward_berries + loser.bounty * config.reward_bounty_percent / 100;
    winner.berries = winner.berries.saturating_add(berries);
    winner.bounty = winner.bounty.saturating_add(config.bounty_gain);

    BattlePayout {
        berries,
        bounty: config.bounty_gain,
    }
}

// ---------------------------------------------------------------------------
// Sea battles
// ---------------------------------------------------------------------------

const SEA_ENEMIES: [&str; 4] = ["Marine Captain", "Sea King", "Bounty Hunter", "Fishman Pirate"];

/// An opponent met while exploring, scaled to within ±20% of the member's
/// stats (health 70–110%).
pub fn sea_enemy<R: Rng + ?Sized>(member: &MemberRecord, rng: &mut R) -> Combatant {
    let mut jitter = |value: i64, lo: i64, hi: i64| (value * rng.gen_range(lo..=hi) / 100).max(1);
    let strength = jitter(member.strength, 80, 120);
    let defense = jitter(member.defense, 80, 120);
    let speed = jitter(member.speed, 80, 120);
    let hp = jitter(member.max_hp, 70, 110);
    let name = SEA_ENEMIES.choose(rng).copied().unwrap_or("Sea King");
    Combatant::new(name, strength, defense, speed, hp)
}

/// Write a battle against a sea enemy back to the member, who fought as
/// the challenger. Returns the payout if the member won.
pub fn settle_sea_battle(
    member: &mut MemberRecord,
    outcome: &BattleOutcome,
    config: &BattleConfig,
) -> Option<BattlePayout> {
    member.hp = outcome.side(Side::Challenger).hp;
    member.clamp_hp();
    if outcome.winner != Side::Challenger {
        member.losses += 1;
        return None;
    }
    member.wins += 1;
    member.berries = member.berries.saturating_add(config.reward_berries);
    member.bounty = member.bounty.saturating_add(config.bounty_gain);
    Some(BattlePayout {
        berries: config.reward_berries,
        bounty: config.bounty_gain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{BattleMode, BattleResolver, Combatant};
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rest_heals_within_range() {
        let config = RestConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let mut member = MemberRecord::default();
            member.hp = 30;
            let outcome = rest(&mut member, &mut rng, Utc::now(), &config).expect("rest");
            assert!((50..=80).contains(&member.hp), "hp {}", member.hp);
            assert_eq!(outcome.hp, member.hp);
        }
    }

    #[test]
    fn rest_clamps_to_max_hp() {
        let mut member = MemberRecord::default();
        member.hp = 95;
        let mut rng = StdRng::seed_from_u64(12);
        let outcome = rest(&mut member, &mut rng, Utc::now(), &RestConfig::default()).expect("rest");
        assert_eq!(member.hp, 100);
        assert_eq!(outcome.healed, 5);
    }

    #[test]
    fn rest_respects_cooldown() {
        let now = Utc::now();
        let mut member = MemberRecord::default();
        member.last_rest = Some(now - Duration::seconds(100));
        member.hp = 10;
        let mut rng = StdRng::seed_from_u64(13);

        let err = rest(&mut member, &mut rng, now, &RestConfig::default()).expect_err("cooldown");
        assert!(matches!(err, GrandlineError::Cooldown { remaining_secs: 200 }));
        assert_eq!(member.hp, 10);
    }

    #[test]
    fn unknown_attribute_is_invalid() {
        assert!(matches!("charisma".parse::<Attribute>(), Err(GrandlineError::InvalidArgument(_))));
        assert_eq!("DEF".parse::<Attribute>().expect("parse"), Attribute::Defense);
    }

    #[test]
    fn training_costs_berries() {
        let mut member = MemberRecord::default();
        let mut rng = StdRng::seed_from_u64(14);
        let gain = train(&mut member, Attribute::Speed, &mut rng, &TrainingConfig::default()).expect("train");
        assert!((1..=3).contains(&gain));
        assert_eq!(member.speed, 10 + gain);
        assert_eq!(member.berries, 300);

        member.berries = 10;
        let before = member.clone();
        assert!(train(&mut member, Attribute::Speed, &mut rng, &TrainingConfig::default()).is_err());
        assert_eq!(member, before);
    }

    #[test]
    fn buying_moves_items_and_berries() {
        let mut member = MemberRecord::default();
        let global = GlobalRecord::default();
        assert_eq!(buy(&mut member, &global, "Meat", 3).expect("buy"), 150);
        assert_eq!(member.inventory.get("meat"), Some(&3));
        assert_eq!(member.berries, 350);

        assert!(buy(&mut member, &global, "gold", 1).is_err());
        assert!(buy(&mut member, &global, "log_pose", 1).is_err());
        assert_eq!(member.berries, 350);
    }

    #[test]
    fn sea_enemy_tracks_member_stats() {
        let member = MemberRecord::default();
        let mut rng = StdRng::seed_from_u64(16);
        for _ in 0..50 {
            let enemy = sea_enemy(&member, &mut rng);
            assert!((8..=12).contains(&enemy.strength));
            assert!((70..=110).contains(&enemy.hp));
            assert_eq!(enemy.hp, enemy.max_hp);
        }
    }

    #[test]
    fn losing_at_sea_pays_nothing() {
        let resolver = BattleResolver::default();
        let outcome = resolver.resolve(
            Combatant::new("Coby", 1, 0, 0, 10),
            Combatant::new("Sea King", 50, 0, 0, 80),
            &BattleMode::Plain,
            &mut StdRng::seed_from_u64(17),
        );
        let mut member = MemberRecord::default();
        assert!(settle_sea_battle(&mut member, &outcome, &BattleConfig::default()).is_none());
        assert_eq!(member.hp, 0);
        assert_eq!(member.losses, 1);
        assert_eq!(member.berries, 500);
    }

    #[test]
    fn payout_restores_hp_invariant() {
        let resolver = BattleResolver::default();
        let mut rng = StdRng::seed_from_u64(15);
        let outcome = resolver.resolve(
            Combatant::new("A", 60, 0, 0, 50),
            Combatant::new("B", 1, 0, 0, 50),
            &BattleMode::Plain,
            &mut rng,
        );
        let mut winner = MemberRecord::default();
        let mut loser = MemberRecord::default();
        loser.bounty = 10_000;

        let payout = apply_battle_result(&mut winner, &mut loser, &outcome, &BattleConfig::default());
        assert_eq!(loser.hp, 0);
        assert_eq!(winner.hp, 50);
        assert_eq!(payout.berries, 100 + 1_000);
        assert_eq!(winner.bounty, 5_000);
        assert_eq!((winner.wins, loser.losses), (1, 1));
    }
}
