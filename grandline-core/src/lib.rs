//! # grandline core library
//!
//! Host-agnostic game logic behind the grandline chat plugins.
//!
//! - **Records**: typed per-scope documents (global, guild, member, user)
//!   persisted through a [`RecordStore`] with registered default schemas.
//! - **Combat**: the turn-based [`BattleResolver`]: alternating attacks,
//!   critical hits, burn and stun, with a hard turn cap.
//! - **Actions**: single-member mutations (rest, train, buy, battle payout).
//! - **World**: periodic sweeps that drift bounties, roll weather, move
//!   market prices and spawn encounters across every known record.
//!
//! The host framework owns command routing and message rendering; this crate
//! only consumes identities and arguments and produces records and turn logs.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actions;
pub mod combat;
pub mod config;
pub mod error;
pub mod record;
pub mod store;
pub mod types;
pub mod world;

pub use combat::{BattleOutcome, BattleResolver, Combatant};
pub use config::GrandlineConfig;
pub use error::{GrandlineError, Result};
pub use record::{Document, GlobalRecord, GuildRecord, MemberRecord, UserRecord};
pub use store::RecordStore;
pub use types::*;
pub use world::{Directory, SweepKind, SweepReport, Sweeper};
