//! Inbound events from the chat host.

use serde::{Deserialize, Serialize};

use grandline_core::{ChannelId, GuildId, UserId};

/// A command the host routed to the plugin, already split from its prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    /// Guild the command was issued in.
    pub guild: GuildId,
    /// Channel to answer in.
    pub channel: ChannelId,
    /// Who issued it.
    pub author: UserId,
    /// Author display name.
    pub author_name: String,
    /// Command name, lowercase.
    pub name: String,
    /// Whitespace-separated arguments.
    pub args: Vec<String>,
}

impl CommandInvocation {
    /// Parse `text` if it starts with `prefix`, e.g. `!duel <@42> moves`.
    #[must_use]
    pub fn parse(
        prefix: &str,
        text: &str,
        guild: GuildId,
        channel: ChannelId,
        author: UserId,
        author_name: impl Into<String>,
    ) -> Option<Self> {
        let rest = text.trim().strip_prefix(prefix)?;
        let mut words = rest.split_whitespace();
        let name = words.next()?.to_ascii_lowercase();
        Some(Self {
            guild,
            channel,
            author,
            author_name: author_name.into(),
            name,
            args: words.map(str::to_string).collect(),
        })
    }
}

/// Something that happened on the host side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotEvent {
    /// A prefixed command.
    Command(CommandInvocation),
    /// Any other message; may answer a pending prompt.
    Message {
        /// Guild it was posted in.
        guild: GuildId,
        /// Channel it was posted in.
        channel: ChannelId,
        /// Who posted it.
        author: UserId,
        /// Message body.
        text: String,
    },
    /// A user joined a guild (or was present at startup).
    MemberJoined {
        /// The guild.
        guild: GuildId,
        /// The user.
        user: UserId,
        /// Display name.
        name: String,
    },
    /// A user left a guild.
    MemberLeft {
        /// The guild.
        guild: GuildId,
        /// The user.
        user: UserId,
    },
    /// The bot was removed from a guild.
    GuildRemoved {
        /// The guild.
        guild: GuildId,
    },
}

/// Parse a mention argument: `<@42>`, `<@!42>`, `@42` or a bare id.
#[must_use]
pub fn parse_mention(arg: &str) -> Option<UserId> {
    let trimmed = arg
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_start_matches('@')
        .trim_start_matches('!');
    trimmed.parse().ok().map(UserId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_command() {
        let inv = CommandInvocation::parse("!", "!Duel <@7> moves", GuildId(1), ChannelId(2), UserId(3), "Nami")
            .expect("command");
        assert_eq!(inv.name, "duel");
        assert_eq!(inv.args, vec!["<@7>", "moves"]);
        assert!(CommandInvocation::parse("!", "hello", GuildId(1), ChannelId(2), UserId(3), "Nami").is_none());
        assert!(CommandInvocation::parse("!", "!", GuildId(1), ChannelId(2), UserId(3), "Nami").is_none());
    }

    #[test]
    fn mention_forms() {
        assert_eq!(parse_mention("<@42>"), Some(UserId(42)));
        assert_eq!(parse_mention("<@!42>"), Some(UserId(42)));
        assert_eq!(parse_mention("@42"), Some(UserId(42)));
        assert_eq!(parse_mention("42"), Some(UserId(42)));
        assert_eq!(parse_mention("usopp"), None);
    }
}
