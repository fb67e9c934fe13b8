//! Randomised per-record transforms applied by the sweeps.

use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::config::SweepConfig;
use crate::record::{GlobalRecord, MemberRecord, Weather};

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn scale(value: u64, factor: f64) -> u64 {
    (value as f64 * factor).round().max(0.0) as u64
}

/// Multiply the member's bounty by a factor drawn from
/// `[bounty_min_factor, bounty_max_factor]`. Returns whether it changed.
pub fn drift_bounty<R: Rng + ?Sized>(member: &mut MemberRecord, rng: &mut R, config: &SweepConfig) -> bool {
    let factor = rng.gen_range(config.bounty_min_factor..=config.bounty_max_factor);
    let before = member.bounty;
    member.bounty = scale(before, factor);
    member.bounty != before
}

/// Pick the next weather for a guild.
pub fn roll_weather<R: Rng + ?Sized>(rng: &mut R) -> Weather {
    Weather::ALL.choose(rng).copied().unwrap_or_default()
}

/// Move every market price by its own factor drawn from
/// `[market_min_factor, market_max_factor]`; prices never drop below 1.
pub fn move_market<R: Rng + ?Sized>(global: &mut GlobalRecord, rng: &mut R, config: &SweepConfig) {
    for price in global.market.values_mut() {
        let factor = rng.gen_range(config.market_min_factor..=config.market_max_factor);
        *price = scale(*price, factor).max(1);
    }
    global.sweeps_run += 1;
}

/// Something that happened to a member at sea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encounter {
    /// Found a chest.
    Treasure {
        /// Berries found.
        berries: u64,
    },
    /// Caught in a storm.
    Storm {
        /// Health lost.
        damage: i64,
    },
    /// Spotted by the Marines; infamy grows.
    Marines {
        /// Bounty added.
        bounty: u64,
    },
}

impl Encounter {
    /// Apply the encounter to a member, keeping `hp` within bounds.
    pub fn apply(self, member: &mut MemberRecord) {
        match self {
            Self::Treasure { berries } => member.berries = member.berries.saturating_add(berries),
            Self::Storm { damage } => {
                member.hp -= damage;
                member.clamp_hp();
            }
            Self::Marines { bounty } => member.bounty = member.bounty.saturating_add(bounty),
        }
    }
}

impl fmt::Display for Encounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Treasure { berries } => write!(f, "found a treasure chest with {berries} berries"),
            Self::Storm { damage } => write!(f, "got caught in a storm and lost {damage} HP"),
            Self::Marines { bounty } => write!(f, "was spotted by the Marines; bounty up by {bounty}"),
        }
    }
}

/// With probability `encounter_chance`, roll one encounter. Storm damage
/// doubles when the guild's weather is already stormy.
pub fn roll_encounter<R: Rng + ?Sized>(
    weather: Weather,
    rng: &mut R,
    config: &SweepConfig,
) -> Option<Encounter> {
    if !rng.gen_bool(config.encounter_chance) {
        return None;
    }
    Some(pick_encounter(weather, rng))
}

/// Roll one of the three encounters unconditionally.
pub fn pick_encounter<R: Rng + ?Sized>(weather: Weather, rng: &mut R) -> Encounter {
    match rng.gen_range(0..3) {
        0 => Encounter::Treasure {
            berries: rng.gen_range(50..=300),
        },
        1 => {
            let damage = rng.gen_range(5..=25);
            Encounter::Storm {
                damage: if weather == Weather::Storm { damage * 2 } else { damage },
            }
        }
        _ => Encounter::Marines {
            bounty: rng.gen_range(1_000..=10_000),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn bounty_drift_stays_within_factor_bounds() {
        let config = SweepConfig::default();
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..100 {
            let mut member = MemberRecord::default();
            member.bounty = 1_000_000;
            drift_bounty(&mut member, &mut rng, &config);
            assert!((900_000..=1_100_000).contains(&member.bounty));
        }
    }

    #[test]
    fn zero_bounty_stays_zero() {
        let mut member = MemberRecord::default();
        let mut rng = StdRng::seed_from_u64(22);
        assert!(!drift_bounty(&mut member, &mut rng, &SweepConfig::default()));
        assert_eq!(member.bounty, 0);
    }

    #[test]
    fn market_prices_never_hit_zero() {
        let config = SweepConfig {
            market_min_factor: 0.0,
            market_max_factor: 0.0,
            ..SweepConfig::default()
        };
        let mut global = GlobalRecord::default();
        let mut rng = StdRng::seed_from_u64(23);
        move_market(&mut global, &mut rng, &config);
        assert!(global.market.values().all(|&p| p == 1));
        assert_eq!(global.sweeps_run, 1);
    }

    #[test]
    fn storm_damage_clamps_at_zero() {
        let mut member = MemberRecord::default();
        member.hp = 3;
        Encounter::Storm { damage: 20 }.apply(&mut member);
        assert_eq!(member.hp, 0);
    }

    #[test]
    fn zero_chance_means_no_encounters() {
        let config = SweepConfig {
            encounter_chance: 0.0,
            ..SweepConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(24);
        assert!((0..100).all(|_| roll_encounter(Weather::Clear, &mut rng, &config).is_none()));
    }
}
