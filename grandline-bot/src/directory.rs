//! Live guild membership, kept current by presence events.

use dashmap::DashMap;
use tracing::debug;

use grandline_core::world::Directory;
use grandline_core::{GuildId, UserId};

use crate::events::BotEvent;

/// Who is in which guild, and what they are called.
#[derive(Debug, Default)]
pub struct PresenceDirectory {
    guilds: DashMap<GuildId, DashMap<UserId, String>>,
}

impl PresenceDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `user` is in `guild` under `name`.
    pub fn join(&self, guild: GuildId, user: UserId, name: impl Into<String>) {
        self.guilds.entry(guild).or_default().insert(user, name.into());
    }

    /// Record that `user` left `guild`.
    pub fn leave(&self, guild: GuildId, user: UserId) {
        if let Some(members) = self.guilds.get(&guild) {
            members.remove(&user);
        }
    }

    /// Forget a guild entirely.
    pub fn remove_guild(&self, guild: GuildId) {
        self.guilds.remove(&guild);
    }

    /// Display name of a member, falling back to a generic tag.
    #[must_use]
    pub fn name_of(&self, guild: GuildId, user: UserId) -> String {
        self.guilds
            .get(&guild)
            .and_then(|members| members.get(&user).map(|n| n.value().clone()))
            .unwrap_or_else(|| format!("pirate#{user}"))
    }

    /// Apply a presence event. Returns whether the event was one.
    pub fn observe(&self, event: &BotEvent) -> bool {
        match event {
            BotEvent::MemberJoined { guild, user, name } => self.join(*guild, *user, name.clone()),
            BotEvent::MemberLeft { guild, user } => self.leave(*guild, *user),
            BotEvent::GuildRemoved { guild } => self.remove_guild(*guild),
            BotEvent::Command(_) | BotEvent::Message { .. } => return false,
        }
        debug!(?event, "presence updated");
        true
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.guilds.clear();
    }
}

impl Directory for PresenceDirectory {
    fn has_guild(&self, guild: GuildId) -> bool {
        self.guilds.contains_key(&guild)
    }

    fn has_member(&self, guild: GuildId, user: UserId) -> bool {
        self.guilds
            .get(&guild)
            .is_some_and(|members| members.contains_key(&user))
    }

    fn guilds(&self) -> Vec<GuildId> {
        self.guilds.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_events_drive_membership() {
        let dir = PresenceDirectory::new();
        assert!(dir.observe(&BotEvent::MemberJoined {
            guild: GuildId(1),
            user: UserId(2),
            name: "Robin".into(),
        }));
        assert!(dir.has_member(GuildId(1), UserId(2)));
        assert_eq!(dir.name_of(GuildId(1), UserId(2)), "Robin");

        dir.observe(&BotEvent::MemberLeft {
            guild: GuildId(1),
            user: UserId(2),
        });
        assert!(!dir.has_member(GuildId(1), UserId(2)));
        assert!(dir.has_guild(GuildId(1)));
        assert_eq!(dir.name_of(GuildId(1), UserId(2)), "pirate#2");

        dir.observe(&BotEvent::GuildRemoved { guild: GuildId(1) });
        assert!(dir.guilds().is_empty());
    }
}
