//! # grandline-bot
//!
//! Host boundary for the grandline game: turns chat events into commands
//! against [`grandline_core`], posts replies over an mpsc channel, and runs
//! the periodic world sweeps on tokio timers.
//!
//! ```text
//!   host ──BotEvent──▶ GrandlinePlugin ──▶ commands ──▶ RecordStore
//!    ▲                      │                  │
//!    └──OutgoingMessage─────┴── MessageSink ◀──┘
//!                     SweepScheduler ──▶ Sweeper ──▶ RecordStore
//! ```

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod commands;
pub mod context;
pub mod directory;
pub mod events;
pub mod messages;
pub mod plugin;
pub mod prompt;
pub mod scheduler;
pub mod session;

pub use events::{BotEvent, CommandInvocation};
pub use messages::{MessageBody, MessageSink, OutgoingMessage};
pub use plugin::GrandlinePlugin;
