//! The Battle Resolver.
//!
//! Per turn, for the acting side against its target:
//!
//! 1. A stunned actor loses the turn; the stun is cleared.
//! 2. A burning target takes `burn_damage_per_stack * stacks` and loses one
//!    stack. If that drops it, the actor wins on the spot.
//! 3. Base damage is `max(1, strength - defense / 2)` (move power applies
//!    in the move variant).
//! 4. A massive hit (optional) or a critical hit multiplies the damage; the
//!    crit chance is `speed / (speed + target speed)`.
//! 5. Special moves roll their status against the target.
//! 6. Damage is subtracted; `hp <= 0` ends the battle.
//! 7. Roles swap.
//!
//! After `turn_cap` turns the side with more health wins, ties broken by
//! the RNG. Given a fixed RNG stream the whole run is deterministic.

use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::combat::combatant::Combatant;
use crate::combat::moves::{BattleMode, Move, MoveCategory};
use crate::combat::status::StatusKind;
use crate::config::BattleConfig;

/// Which side of the battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The side that started the fight and moves first.
    Challenger,
    /// The side that was challenged.
    Defender,
}

impl Side {
    /// The opposing side.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Challenger => Self::Defender,
            Self::Defender => Self::Challenger,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Challenger => 0,
            Self::Defender => 1,
        }
    }
}

/// How the battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// An attack dropped the loser.
    Knockout,
    /// A burn tick dropped the loser.
    Burn,
    /// The turn cap ran out; decided on remaining health.
    TurnCap,
}

/// Damage multiplier that applied to an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitKind {
    /// No multiplier.
    Normal,
    /// Critical hit.
    Critical,
    /// Massive hit.
    Massive,
}

/// One observable step of the battle, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEvent {
    /// The actor was stunned and lost the turn.
    Stunned {
        /// Turn number, from 1.
        turn: u32,
        /// Who lost the turn.
        name: String,
    },
    /// Burn ticked on the target.
    Burned {
        /// Turn number, from 1.
        turn: u32,
        /// Who burned.
        name: String,
        /// Damage taken.
        damage: i64,
        /// Health left, floored at zero.
        hp_left: i64,
    },
    /// An attack landed.
    Attack {
        /// Turn number, from 1.
        turn: u32,
        /// Attacker name.
        attacker: String,
        /// Target name.
        target: String,
        /// Move used, in the move variant.
        move_name: Option<String>,
        /// Damage dealt.
        damage: i64,
        /// Multiplier that applied.
        hit: HitKind,
        /// Target health left, floored at zero.
        hp_left: i64,
    },
    /// A special move inflicted a status.
    StatusApplied {
        /// Turn number, from 1.
        turn: u32,
        /// Who received it.
        target: String,
        /// Which status.
        status: StatusKind,
    },
    /// The turn cap ran out.
    TurnCapReached {
        /// Turns played.
        turns: u32,
    },
}

impl fmt::Display for TurnEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stunned { turn, name } => write!(f, "[{turn}] {name} is stunned and can't move!"),
            Self::Burned { turn, name, damage, hp_left } => {
                write!(f, "[{turn}] {name} burns for {damage} damage ({hp_left} HP left)")
            }
            Self::Attack {
                turn,
                attacker,
                target,
                move_name,
                damage,
                hit,
                hp_left,
            } => {
                write!(f, "[{turn}] {attacker}")?;
                match move_name {
                    Some(name) => write!(f, " uses {name} on {target}")?,
                    None => write!(f, " strikes {target}")?,
                }
                match hit {
                    HitKind::Normal => {}
                    HitKind::Critical => f.write_str(", a critical hit")?,
                    HitKind::Massive => f.write_str(", a MASSIVE hit")?,
                }
                write!(f, " for {damage} damage ({hp_left} HP left)")
            }
            Self::StatusApplied { turn, target, status } => match status {
                StatusKind::Burn => write!(f, "[{turn}] {target} catches fire!"),
                StatusKind::Stun => write!(f, "[{turn}] {target} is stunned!"),
            },
            Self::TurnCapReached { turns } => {
                write!(f, "Both fighters are exhausted after {turns} turns!")
            }
        }
    }
}

/// Result of one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleOutcome {
    /// Winning side.
    pub winner: Side,
    /// Turns played, including skipped ones.
    pub turns: u32,
    /// How it ended.
    pub reason: EndReason,
    /// Final state of `[challenger, defender]`.
    pub combatants: [Combatant; 2],
    /// Everything that happened, in order.
    pub log: Vec<TurnEvent>,
}

impl BattleOutcome {
    /// Final state of one side.
    #[must_use]
    pub fn side(&self, side: Side) -> &Combatant {
        &self.combatants[side.index()]
    }

    /// Final state of the winner.
    #[must_use]
    pub fn winner(&self) -> &Combatant {
        self.side(self.winner)
    }

    /// Final state of the loser.
    #[must_use]
    pub fn loser(&self) -> &Combatant {
        self.side(self.winner.other())
    }

    /// Human-readable turn lines for chat.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.log.iter().map(ToString::to_string).collect()
    }
}

/// `max(1, strength - defense / 2)`, halving with floor division.
#[must_use]
pub fn base_damage(strength: i64, defense: i64) -> i64 {
    (strength - defense.div_euclid(2)).max(1)
}

/// Probability that `speed` lands a critical hit against `target_speed`.
#[must_use]
pub fn crit_chance(speed: i64, target_speed: i64) -> f64 {
    let (a, b) = (speed.max(0), target_speed.max(0));
    if a + b == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let p = a as f64 / (a + b) as f64;
    p.clamp(0.0, 1.0)
}

/// Runs battles with one tuning table.
#[derive(Debug, Clone, Default)]
pub struct BattleResolver {
    config: BattleConfig,
}

impl BattleResolver {
    /// Create a resolver with the given tuning.
    #[must_use]
    pub fn new(config: BattleConfig) -> Self {
        Self { config }
    }

    /// Tuning table in use.
    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Fight until one side drops or the turn cap runs out.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        challenger: Combatant,
        defender: Combatant,
        mode: &BattleMode,
        rng: &mut R,
    ) -> BattleOutcome {
        let mut sides = [challenger, defender];
        let mut log = Vec::new();

        // Someone already down never gets to act.
        if sides[1].is_down() || sides[0].is_down() {
            let winner = if sides[1].is_down() { Side::Challenger } else { Side::Defender };
            return BattleOutcome {
                winner,
                turns: 0,
                reason: EndReason::Knockout,
                combatants: sides,
                log,
            };
        }

        let mut actor = Side::Challenger;
        for turn in 1..=self.config.turn_cap {
            if let Some(reason) = self.play_turn(turn, actor, &mut sides, mode, rng, &mut log) {
                debug!(turn, winner = ?actor, reason = ?reason, "battle resolved");
                return BattleOutcome {
                    winner: actor,
                    turns: turn,
                    reason,
                    combatants: sides,
                    log,
                };
            }
            actor = actor.other();
        }

        let turns = self.config.turn_cap;
        log.push(TurnEvent::TurnCapReached { turns });
        let winner = match sides[0].hp.cmp(&sides[1].hp) {
            std::cmp::Ordering::Greater => Side::Challenger,
            std::cmp::Ordering::Less => Side::Defender,
            std::cmp::Ordering::Equal if rng.gen_bool(0.5) => Side::Challenger,
            std::cmp::Ordering::Equal => Side::Defender,
        };
        debug!(turns, winner = ?winner, "battle hit the turn cap");
        BattleOutcome {
            winner,
            turns,
            reason: EndReason::TurnCap,
            combatants: sides,
            log,
        }
    }

    /// Play one turn. Returns `Some` if the actor won during it.
    fn play_turn<R: Rng + ?Sized>(
        &self,
        turn: u32,
        actor: Side,
        sides: &mut [Combatant; 2],
        mode: &BattleMode,
        rng: &mut R,
        log: &mut Vec<TurnEvent>,
    ) -> Option<EndReason> {
        let [challenger, defender] = sides;
        let (attacker, target) = match actor {
            Side::Challenger => (challenger, defender),
            Side::Defender => (defender, challenger),
        };

        if attacker.status.take_stun() {
            log.push(TurnEvent::Stunned {
                turn,
                name: attacker.name.clone(),
            });
            return None;
        }

        if let Some(damage) = target.status.tick_burn(self.config.burn_damage_per_stack) {
            target.hp -= damage;
            log.push(TurnEvent::Burned {
                turn,
                name: target.name.clone(),
                damage,
                hp_left: target.display_hp(),
            });
            if target.is_down() {
                return Some(EndReason::Burn);
            }
        }

        let chosen: Option<&Move> = match mode {
            BattleMode::Plain => None,
            BattleMode::Moves(moves) => moves.choose(rng),
        };

        let base = base_damage(attacker.strength, target.defense);
        let base = chosen.map_or(base, |m| m.scale(base));

        let (damage, hit) = if self.config.massive_chance > 0.0 && rng.gen_bool(self.config.massive_chance) {
            (base * self.config.massive_multiplier, HitKind::Massive)
        } else if rng.gen_bool(crit_chance(attacker.speed, target.speed)) {
            (base * self.config.crit_multiplier, HitKind::Critical)
        } else {
            (base, HitKind::Normal)
        };

        let mut inflicted = None;
        if let Some(Move {
            category: MoveCategory::Special(kind),
            ..
        }) = chosen
        {
            let chance = match kind {
                StatusKind::Burn => self.config.burn_chance,
                StatusKind::Stun => self.config.stun_chance,
            };
            if rng.gen_bool(chance) {
                target.status.apply(*kind, self.config.burn_stacks_per_hit);
                inflicted = Some(*kind);
            }
        }

        target.hp -= damage;
        log.push(TurnEvent::Attack {
            turn,
            attacker: attacker.name.clone(),
            target: target.name.clone(),
            move_name: chosen.map(|m| m.name.clone()),
            damage,
            hit,
            hp_left: target.display_hp(),
        });

        if target.is_down() {
            return Some(EndReason::Knockout);
        }
        if let Some(status) = inflicted {
            log.push(TurnEvent::StatusApplied {
                turn,
                target: target.name.clone(),
                status,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn no_crit_config() -> BattleConfig {
        BattleConfig::default()
    }

    /// Speed 0 on the attacker means no crits, which makes damage exact.
    fn steady(name: &str, strength: i64, defense: i64, hp: i64) -> Combatant {
        Combatant::new(name, strength, defense, 0, hp)
    }

    #[test]
    fn base_damage_floor_is_one() {
        assert_eq!(base_damage(5, 1_000), 1);
        assert_eq!(base_damage(20, 5), 18);
        assert_eq!(base_damage(15, 10), 10);
    }

    #[test]
    fn crit_chance_is_speed_ratio() {
        assert!((crit_chance(10, 10) - 0.5).abs() < f64::EPSILON);
        assert!((crit_chance(0, 0)).abs() < f64::EPSILON);
        assert!((crit_chance(30, 10) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn challenger_moves_first_and_can_one_shot() {
        let resolver = BattleResolver::new(no_crit_config());
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = resolver.resolve(
            steady("Luffy", 50, 0, 10),
            steady("Buggy", 50, 0, 10),
            &BattleMode::Plain,
            &mut rng,
        );
        assert_eq!(outcome.winner, Side::Challenger);
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.reason, EndReason::Knockout);
        assert_eq!(outcome.loser().display_hp(), 0);
        assert!(outcome.loser().hp < 0);
    }

    #[test]
    fn stunned_actor_skips_exactly_one_turn() {
        let resolver = BattleResolver::new(no_crit_config());
        let mut rng = StdRng::seed_from_u64(2);
        let mut luffy = steady("Luffy", 10, 0, 100);
        luffy.status.stun = true;
        let outcome = resolver.resolve(luffy, steady("Alvida", 10, 0, 100), &BattleMode::Plain, &mut rng);

        assert!(matches!(&outcome.log[0], TurnEvent::Stunned { turn: 1, name } if name == "Luffy"));
        assert!(matches!(&outcome.log[1], TurnEvent::Attack { turn: 2, attacker, .. } if attacker == "Alvida"));
        assert!(matches!(&outcome.log[2], TurnEvent::Attack { turn: 3, attacker, .. } if attacker == "Luffy"));
    }

    #[test]
    fn burn_ticks_before_the_attack() {
        let resolver = BattleResolver::new(no_crit_config());
        let mut rng = StdRng::seed_from_u64(3);
        let mut target = steady("Smoker", 1, 0, 100);
        target.status.burn = 2;
        let outcome = resolver.resolve(steady("Ace", 10, 0, 100), target, &BattleMode::Plain, &mut rng);

        assert_eq!(
            outcome.log[0],
            TurnEvent::Burned { turn: 1, name: "Smoker".into(), damage: 10, hp_left: 90 }
        );
        assert!(matches!(outcome.log[1], TurnEvent::Attack { damage: 10, hp_left: 80, .. }));
    }

    #[test]
    fn burn_knockout_skips_the_attack() {
        let resolver = BattleResolver::new(no_crit_config());
        let mut rng = StdRng::seed_from_u64(4);
        let mut target = steady("Smoker", 1, 0, 5);
        target.status.burn = 1;
        let outcome = resolver.resolve(steady("Ace", 10, 0, 100), target, &BattleMode::Plain, &mut rng);

        assert_eq!(outcome.reason, EndReason::Burn);
        assert_eq!(outcome.winner, Side::Challenger);
        assert_eq!(outcome.log.len(), 1);
    }

    #[test]
    fn turn_cap_decides_on_health() {
        let config = BattleConfig {
            turn_cap: 4,
            ..BattleConfig::default()
        };
        let resolver = BattleResolver::new(config);
        let mut rng = StdRng::seed_from_u64(5);
        let outcome = resolver.resolve(
            steady("Tank", 1, 100, 1_000),
            steady("Glass", 1, 100, 500),
            &BattleMode::Plain,
            &mut rng,
        );
        assert_eq!(outcome.reason, EndReason::TurnCap);
        assert_eq!(outcome.turns, 4);
        assert_eq!(outcome.winner, Side::Challenger);
        assert_eq!(outcome.log.last(), Some(&TurnEvent::TurnCapReached { turns: 4 }));
    }

    #[test]
    fn same_seed_same_battle() {
        let resolver = BattleResolver::default();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            resolver.resolve(
                Combatant::new("X", 20, 5, 10, 100),
                Combatant::new("Y", 15, 10, 10, 100),
                &BattleMode::standard_moves(),
                &mut rng,
            )
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn certain_massive_hit_triples() {
        let config = BattleConfig {
            massive_chance: 1.0,
            ..BattleConfig::default()
        };
        let resolver = BattleResolver::new(config);
        let mut rng = StdRng::seed_from_u64(6);
        let outcome = resolver.resolve(
            steady("Kaido", 10, 0, 100),
            steady("Momo", 10, 0, 100),
            &BattleMode::Plain,
            &mut rng,
        );
        assert!(matches!(outcome.log[0], TurnEvent::Attack { damage: 30, hit: HitKind::Massive, .. }));
    }

    #[test]
    fn guaranteed_stun_move_costs_the_target_a_turn() {
        let config = BattleConfig {
            stun_chance: 1.0,
            ..BattleConfig::default()
        };
        let resolver = BattleResolver::new(config);
        let mut rng = StdRng::seed_from_u64(7);
        let mode = BattleMode::Moves(vec![Move::new(
            "Thunder Heel",
            100,
            MoveCategory::Special(StatusKind::Stun),
        )]);
        let outcome = resolver.resolve(steady("Nami", 5, 0, 200), steady("Arlong", 5, 0, 200), &mode, &mut rng);

        assert!(matches!(outcome.log[1], TurnEvent::StatusApplied { status: StatusKind::Stun, .. }));
        assert!(matches!(&outcome.log[2], TurnEvent::Stunned { turn: 2, name } if name == "Arlong"));
    }

    #[test]
    fn lines_render_for_chat() {
        let event = TurnEvent::Attack {
            turn: 3,
            attacker: "Sanji".into(),
            target: "Kuro".into(),
            move_name: Some("Diable Jambe".into()),
            damage: 24,
            hit: HitKind::Critical,
            hp_left: 0,
        };
        assert_eq!(
            event.to_string(),
            "[3] Sanji uses Diable Jambe on Kuro, a critical hit for 24 damage (0 HP left)"
        );
    }
}
