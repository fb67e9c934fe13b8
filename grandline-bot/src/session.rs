//! Per-channel interaction state: running battles and open prompts.
//!
//! Both registries live on the plugin instance, are created on load and
//! cleared on unload.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::debug;

use grandline_core::{BattleId, ChannelId, GrandlineError, Result, UserId};

// ---------------------------------------------------------------------------
// Active battles
// ---------------------------------------------------------------------------

/// One battle per channel at a time.
#[derive(Debug, Default, Clone)]
pub struct ActiveBattles {
    running: Arc<DashMap<ChannelId, BattleId>>,
}

/// Marks a channel busy; frees it on drop.
#[derive(Debug)]
pub struct BattleGuard {
    running: Arc<DashMap<ChannelId, BattleId>>,
    channel: ChannelId,
    id: BattleId,
}

impl BattleGuard {
    /// Id of the battle holding the channel.
    #[must_use]
    pub fn id(&self) -> BattleId {
        self.id
    }
}

impl Drop for BattleGuard {
    fn drop(&mut self) {
        self.running.remove_if(&self.channel, |_, id| *id == self.id);
    }
}

impl ActiveBattles {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `channel` for a new battle.
    ///
    /// # Errors
    /// `InvalidArgument` if a battle is already running there.
    pub fn begin(&self, channel: ChannelId) -> Result<BattleGuard> {
        match self.running.entry(channel) {
            Entry::Occupied(_) => Err(GrandlineError::InvalidArgument(
                "a battle is already raging in this channel, wait for it to end".into(),
            )),
            Entry::Vacant(slot) => {
                let id = BattleId::new();
                slot.insert(id);
                debug!(channel = %channel, battle = %id, "battle started");
                Ok(BattleGuard {
                    running: Arc::clone(&self.running),
                    channel,
                    id,
                })
            }
        }
    }

    /// Whether a battle is running in `channel`.
    #[must_use]
    pub fn is_busy(&self, channel: ChannelId) -> bool {
        self.running.contains_key(&channel)
    }

    /// Forget every running battle.
    pub fn clear(&self) {
        self.running.clear();
    }
}

// ---------------------------------------------------------------------------
// Pending prompts
// ---------------------------------------------------------------------------

struct Pending {
    options: Vec<String>,
    reply: oneshot::Sender<usize>,
}

/// Questions waiting on a specific user's reply in a specific channel.
#[derive(Default, Clone)]
pub struct PendingPrompts {
    waiting: Arc<DashMap<(ChannelId, UserId), Pending>>,
}

impl std::fmt::Debug for PendingPrompts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPrompts")
            .field("waiting", &self.waiting.len())
            .finish()
    }
}

impl PendingPrompts {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a prompt for `user` in `channel` accepting any of `options`
    /// (case-insensitive). The receiver yields the chosen index.
    ///
    /// # Errors
    /// `InvalidArgument` if that user already has an open prompt there.
    pub fn register(
        &self,
        channel: ChannelId,
        user: UserId,
        options: &[&str],
    ) -> Result<oneshot::Receiver<usize>> {
        match self.waiting.entry((channel, user)) {
            Entry::Occupied(_) => Err(GrandlineError::InvalidArgument(
                "you already have a question to answer here".into(),
            )),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(Pending {
                    options: options.iter().map(|o| o.to_ascii_lowercase()).collect(),
                    reply: tx,
                });
                Ok(rx)
            }
        }
    }

    /// Offer a chat message as an answer. Returns whether it answered an
    /// open prompt; messages that match no option leave the prompt open.
    pub fn deliver(&self, channel: ChannelId, user: UserId, text: &str) -> bool {
        let answer = text.trim().to_ascii_lowercase();
        let Some((_, pending)) = self.waiting.remove_if(&(channel, user), |_, p| p.options.contains(&answer))
        else {
            return false;
        };
        let Some(index) = pending.options.iter().position(|o| *o == answer) else {
            return false;
        };
        pending.reply.send(index).is_ok()
    }

    /// Close a prompt without answering it.
    pub fn cancel(&self, channel: ChannelId, user: UserId) {
        self.waiting.remove(&(channel, user));
    }

    /// Whether `user` has an open prompt in `channel`.
    #[must_use]
    pub fn is_waiting(&self, channel: ChannelId, user: UserId) -> bool {
        self.waiting.contains_key(&(channel, user))
    }

    /// Close every prompt; waiters see their default fire.
    pub fn clear(&self) {
        self.waiting.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_battle_in_channel_is_refused() {
        let battles = ActiveBattles::new();
        let guard = battles.begin(ChannelId(1)).expect("first");
        assert!(matches!(battles.begin(ChannelId(1)), Err(GrandlineError::InvalidArgument(_))));
        assert!(battles.begin(ChannelId(2)).is_ok());
        drop(guard);
        assert!(!battles.is_busy(ChannelId(1)));
        assert!(battles.begin(ChannelId(1)).is_ok());
    }

    #[tokio::test]
    async fn only_matching_replies_answer() {
        let prompts = PendingPrompts::new();
        let rx = prompts
            .register(ChannelId(1), UserId(9), &["fight", "run"])
            .expect("register");
        assert!(!prompts.deliver(ChannelId(1), UserId(9), "maybe"));
        assert!(!prompts.deliver(ChannelId(1), UserId(8), "run"));
        assert!(prompts.deliver(ChannelId(1), UserId(9), " RUN "));
        assert_eq!(rx.await.expect("answer"), 1);
        assert!(!prompts.is_waiting(ChannelId(1), UserId(9)));
    }

    #[test]
    fn one_prompt_per_user_and_channel() {
        let prompts = PendingPrompts::new();
        let _rx = prompts.register(ChannelId(1), UserId(9), &["yes"]).expect("first");
        assert!(prompts.register(ChannelId(1), UserId(9), &["yes"]).is_err());
        prompts.cancel(ChannelId(1), UserId(9));
        assert!(prompts.register(ChannelId(1), UserId(9), &["yes"]).is_ok());
    }
}
