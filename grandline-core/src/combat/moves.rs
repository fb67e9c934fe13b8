//! Named moves for the move-based battle variant.

use serde::{Deserialize, Serialize};

use crate::combat::status::StatusKind;

/// Whether a move can inflict a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveCategory {
    /// Plain damage.
    Normal,
    /// Damage plus a chance to inflict the given status.
    Special(StatusKind),
}

/// A named attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    /// Display name.
    pub name: String,
    /// Damage scaling in percent of the base hit.
    pub power: i64,
    /// Normal or special.
    pub category: MoveCategory,
}

impl Move {
    /// Build a move.
    #[must_use]
    pub fn new(name: impl Into<String>, power: i64, category: MoveCategory) -> Self {
        Self {
            name: name.into(),
            power,
            category,
        }
    }

    /// Scale a base hit by this move's power, never below 1.
    #[must_use]
    pub fn scale(&self, base: i64) -> i64 {
        (base * self.power / 100).max(1)
    }
}

/// How attacks are chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BattleMode {
    /// Every turn is a plain attack; no status rolls.
    #[default]
    Plain,
    /// Each turn the actor picks a random move from the list.
    Moves(Vec<Move>),
}

impl BattleMode {
    /// The default move table.
    #[must_use]
    pub fn standard_moves() -> Self {
        Self::Moves(vec![
            Move::new("Cutlass Slash", 100, MoveCategory::Normal),
            Move::new("Cannon Volley", 125, MoveCategory::Normal),
            Move::new("Flame Fist", 90, MoveCategory::Special(StatusKind::Burn)),
            Move::new("Thunder Heel", 80, MoveCategory::Special(StatusKind::Stun)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_never_drops_below_one() {
        let weak = Move::new("Poke", 10, MoveCategory::Normal);
        assert_eq!(weak.scale(3), 1);
        assert_eq!(weak.scale(50), 5);
    }

    #[test]
    fn standard_table_has_both_statuses() {
        let BattleMode::Moves(moves) = BattleMode::standard_moves() else {
            panic!("expected moves");
        };
        assert!(moves.iter().any(|m| m.category == MoveCategory::Special(StatusKind::Burn)));
        assert!(moves.iter().any(|m| m.category == MoveCategory::Special(StatusKind::Stun)));
    }
}
