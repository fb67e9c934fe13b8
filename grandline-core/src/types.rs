//! Core identity and key types.
//!
//! Guild, user and channel ids are opaque numeric snowflakes handed over by
//! the host framework. Records are addressed by a [`RecordKey`], whose
//! textual form is the primary key in the persistence backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GrandlineError;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// A guild (server) known to the host framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GuildId(pub u64);

/// A user known to the host framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// A chat channel inside a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one battle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleId(pub Uuid);

impl BattleId {
    /// Create a new random battle ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BattleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BattleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Scopes & Keys
// ---------------------------------------------------------------------------

/// Key namespace a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One record for the whole process.
    Global,
    /// One record per guild.
    Guild,
    /// One record per (guild, user) pair.
    Member,
    /// One record per user, shared across guilds.
    User,
}

impl Scope {
    /// Stable name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Guild => "guild",
            Self::Member => "member",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    /// The global record.
    Global,
    /// A guild record.
    Guild(GuildId),
    /// A guild member record.
    Member(GuildId, UserId),
    /// A cross-guild user record.
    User(UserId),
}

impl RecordKey {
    /// Scope this key belongs to.
    #[must_use]
    pub fn scope(&self) -> Scope {
        match self {
            Self::Global => Scope::Global,
            Self::Guild(_) => Scope::Guild,
            Self::Member(..) => Scope::Member,
            Self::User(_) => Scope::User,
        }
    }

    /// Guild this key is tied to, if any.
    #[must_use]
    pub fn guild(&self) -> Option<GuildId> {
        match self {
            Self::Guild(g) | Self::Member(g, _) => Some(*g),
            Self::Global | Self::User(_) => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Guild(g) => write!(f, "guild:{g}"),
            Self::Member(g, u) => write!(f, "member:{g}:{u}"),
            Self::User(u) => write!(f, "user:{u}"),
        }
    }
}

impl FromStr for RecordKey {
    type Err = GrandlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GrandlineError::InvalidArgument(format!("malformed record key: {s}"));
        let num = |part: Option<&str>| -> Result<u64, GrandlineError> {
            part.and_then(|p| p.parse().ok()).ok_or_else(invalid)
        };

        let mut parts = s.split(':');
        let key = match parts.next() {
            Some("global") => Self::Global,
            Some("guild") => Self::Guild(GuildId(num(parts.next())?)),
            Some("member") => {
                let guild = GuildId(num(parts.next())?);
                Self::Member(guild, UserId(num(parts.next())?))
            }
            Some("user") => Self::User(UserId(num(parts.next())?)),
            _ => return Err(invalid()),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(key)
    }
}
