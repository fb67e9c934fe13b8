//! Transient combat modifiers.

use serde::{Deserialize, Serialize};

/// Which status a special move inflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Damage over time, one stack consumed per tick.
    Burn,
    /// Lose the next turn.
    Stun,
}

/// Status effects currently on a combatant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffects {
    /// Burn stacks; each tick deals `stacks * per_stack` damage.
    pub burn: u32,
    /// Skip the next turn.
    pub stun: bool,
}

impl StatusEffects {
    /// Inflict a status.
    pub fn apply(&mut self, kind: StatusKind, burn_stacks: u32) {
        match kind {
            StatusKind::Burn => self.burn = self.burn.saturating_add(burn_stacks),
            StatusKind::Stun => self.stun = true,
        }
    }

    /// Consume a pending stun. Returns whether the turn must be skipped.
    pub fn take_stun(&mut self) -> bool {
        std::mem::take(&mut self.stun)
    }

    /// Tick burn: returns the damage for the current stacks and removes
    /// exactly one stack, or `None` when not burning.
    pub fn tick_burn(&mut self, per_stack: i64) -> Option<i64> {
        if self.burn == 0 {
            return None;
        }
        let damage = per_stack * i64::from(self.burn);
        self.burn -= 1;
        Some(damage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stun_is_consumed_once() {
        let mut status = StatusEffects::default();
        status.apply(StatusKind::Stun, 0);
        assert!(status.take_stun());
        assert!(!status.take_stun());
    }

    #[test]
    fn burn_ticks_then_decrements() {
        let mut status = StatusEffects::default();
        status.apply(StatusKind::Burn, 2);
        status.apply(StatusKind::Burn, 1);
        assert_eq!(status.tick_burn(5), Some(15));
        assert_eq!(status.burn, 2);
        assert_eq!(status.tick_burn(5), Some(10));
        assert_eq!(status.tick_burn(5), Some(5));
        assert_eq!(status.tick_burn(5), None);
    }
}
