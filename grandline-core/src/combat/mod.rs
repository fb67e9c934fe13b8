//! Turn-based combat between two combatants.
//!
//! `Start -> {ChallengerTurn, DefenderTurn} (alternating) -> Resolved(winner)`.
//! The challenger always acts first. The battle ends the instant either
//! side's health drops to zero or below, or when the turn cap runs out.

pub mod combatant;
pub mod moves;
pub mod resolver;
pub mod status;

pub use combatant::Combatant;
pub use moves::{BattleMode, Move, MoveCategory};
pub use resolver::{BattleOutcome, BattleResolver, EndReason, HitKind, Side, TurnEvent, base_damage, crit_chance};
pub use status::{StatusEffects, StatusKind};
