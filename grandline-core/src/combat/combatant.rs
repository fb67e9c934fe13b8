//! Battle-scoped view of a member's stats.

use serde::{Deserialize, Serialize};

use crate::combat::status::StatusEffects;
use crate::config::BattleConfig;
use crate::record::MemberRecord;

/// One side of a battle. Built from a record at battle start, mutated only
/// by the resolver, and discarded once the result is written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    /// Display name.
    pub name: String,
    /// Current health; may go negative inside the loop.
    pub hp: i64,
    /// Health ceiling, for display.
    pub max_hp: i64,
    /// Attack power, haki included.
    pub strength: i64,
    /// Damage reduction.
    pub defense: i64,
    /// Critical-hit weight.
    pub speed: i64,
    /// Active status effects.
    pub status: StatusEffects,
}

impl Combatant {
    /// Combatant with explicit stats and full health.
    #[must_use]
    pub fn new(name: impl Into<String>, strength: i64, defense: i64, speed: i64, hp: i64) -> Self {
        Self {
            name: name.into(),
            hp,
            max_hp: hp,
            strength,
            defense,
            speed,
            status: StatusEffects::default(),
        }
    }

    /// Snapshot a member record. Haki adds `haki_strength_bonus` strength
    /// per level.
    #[must_use]
    pub fn from_member(name: impl Into<String>, record: &MemberRecord, config: &BattleConfig) -> Self {
        Self {
            name: name.into(),
            hp: record.hp,
            max_hp: record.max_hp,
            strength: record.strength + record.haki_level * config.haki_strength_bonus,
            defense: record.defense,
            speed: record.speed,
            status: StatusEffects::default(),
        }
    }

    /// Health floored at zero, for display.
    #[must_use]
    pub fn display_hp(&self) -> i64 {
        self.hp.max(0)
    }

    /// Whether this side is down.
    #[must_use]
    pub fn is_down(&self) -> bool {
        self.hp <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haki_folds_into_strength() {
        let mut record = MemberRecord::default();
        record.strength = 12;
        record.haki_level = 3;
        record.hp = 70;
        let fighter = Combatant::from_member("Zoro", &record, &BattleConfig::default());
        assert_eq!(fighter.strength, 18);
        assert_eq!(fighter.hp, 70);
        assert_eq!(fighter.max_hp, record.max_hp);
    }

    #[test]
    fn display_hp_floors_at_zero() {
        let mut fighter = Combatant::new("Usopp", 5, 5, 5, 10);
        fighter.hp = -8;
        assert_eq!(fighter.display_hp(), 0);
        assert!(fighter.is_down());
    }
}
