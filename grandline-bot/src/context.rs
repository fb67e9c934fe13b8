//! Shared state every command handler sees.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;

use grandline_core::{BattleResolver, GrandlineConfig, RecordStore};

use crate::directory::PresenceDirectory;
use crate::messages::MessageSink;
use crate::session::{ActiveBattles, PendingPrompts};

/// Everything a command needs, owned by one plugin instance.
#[derive(Debug)]
pub struct GameContext {
    /// Persistent records.
    pub store: RecordStore,
    /// Loaded configuration.
    pub config: GrandlineConfig,
    /// Battle rules.
    pub resolver: BattleResolver,
    /// Outbound messages.
    pub sink: MessageSink,
    /// Live membership.
    pub directory: Arc<PresenceDirectory>,
    /// Channels with a battle in progress.
    pub battles: ActiveBattles,
    /// Questions awaiting replies.
    pub prompts: PendingPrompts,
    /// Randomness for rolls made while handling commands. Never held
    /// across an await.
    pub rng: Mutex<StdRng>,
}

impl GameContext {
    /// Assemble a context with fresh registries.
    #[must_use]
    pub fn new(
        store: RecordStore,
        config: GrandlineConfig,
        sink: MessageSink,
        directory: Arc<PresenceDirectory>,
        rng: StdRng,
    ) -> Self {
        Self {
            resolver: BattleResolver::new(config.battle.clone()),
            store,
            config,
            sink,
            directory,
            battles: ActiveBattles::new(),
            prompts: PendingPrompts::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Drop all per-channel interaction state.
    pub fn clear_sessions(&self) {
        self.prompts.clear();
        self.battles.clear();
        self.store.locks().prune();
    }
}
