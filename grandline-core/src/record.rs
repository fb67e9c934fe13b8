//! Typed record schemas, one per [`Scope`].
//!
//! Every record implements [`Document`]: it knows its scope and how to build
//! its registered default from [`SchemaDefaults`]. Fields missing from a
//! stored document are filled from the store's registered defaults on load
//! (`#[serde(default)]` only covers decoding outside a store), and fields
//! this version does not know about are kept in `extra` so they survive a
//! save.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::SchemaDefaults;
use crate::types::Scope;

/// Unrecognised fields carried through load/save untouched.
pub type ExtraFields = BTreeMap<String, serde_json::Value>;

/// A persisted document type bound to one scope.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Scope whose keys hold this document.
    const SCOPE: Scope;

    /// Fresh copy of the registered default schema.
    fn fresh(defaults: &SchemaDefaults) -> Self;
}

// ---------------------------------------------------------------------------
// Global
// ---------------------------------------------------------------------------

/// Process-wide state: the shared market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalRecord {
    /// Item name → current price in berries.
    pub market: BTreeMap<String, u64>,
    /// Number of market sweeps applied so far.
    pub sweeps_run: u64,
    /// Unknown fields.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Default for GlobalRecord {
    fn default() -> Self {
        let market = [("meat", 50), ("sake", 90), ("cola", 120), ("log_pose", 800)]
            .into_iter()
            .map(|(item, price)| (item.to_string(), price))
            .collect();
        Self {
            market,
            sweeps_run: 0,
            extra: ExtraFields::new(),
        }
    }
}

impl Document for GlobalRecord {
    const SCOPE: Scope = Scope::Global;

    fn fresh(_defaults: &SchemaDefaults) -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Guild
// ---------------------------------------------------------------------------

/// Sea conditions around a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    /// Nothing to report.
    #[default]
    Clear,
    /// Light rain.
    Rain,
    /// Storm; encounters hit harder.
    Storm,
    /// Thick fog.
    Fog,
    /// Windless calm belt.
    Calm,
}

impl Weather {
    /// Every weather kind, in roll order.
    pub const ALL: [Self; 5] = [Self::Clear, Self::Rain, Self::Storm, Self::Fog, Self::Calm];
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clear => "clear skies",
            Self::Rain => "rain",
            Self::Storm => "a raging storm",
            Self::Fog => "thick fog",
            Self::Calm => "a dead calm",
        };
        f.write_str(name)
    }
}

/// Per-guild state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildRecord {
    /// Current weather.
    pub weather: Weather,
    /// Battles fought in this guild.
    pub battles_fought: u64,
    /// Unknown fields.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Document for GuildRecord {
    const SCOPE: Scope = Scope::Guild;

    fn fresh(_defaults: &SchemaDefaults) -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// A pirate in one guild: battle stats plus bookkeeping.
///
/// Between battles `0 <= hp <= max_hp` holds; [`MemberRecord::clamp_hp`]
/// restores it after any arithmetic on `hp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberRecord {
    /// Raw attack power.
    pub strength: i64,
    /// Damage reduction; halved against incoming hits.
    pub defense: i64,
    /// Drives the critical-hit chance.
    pub speed: i64,
    /// Current health.
    pub hp: i64,
    /// Health ceiling.
    pub max_hp: i64,
    /// Haki level; each level adds strength in battle.
    pub haki_level: i64,
    /// Bounty on this pirate's head.
    pub bounty: u64,
    /// Wallet.
    pub berries: u64,
    /// Item name → count.
    pub inventory: BTreeMap<String, u32>,
    /// Battles won.
    pub wins: u64,
    /// Battles lost.
    pub losses: u64,
    /// When the member last rested.
    pub last_rest: Option<DateTime<Utc>>,
    /// Unknown fields.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl MemberRecord {
    /// Bring `hp` back into `[0, max_hp]`.
    pub fn clamp_hp(&mut self) {
        self.hp = self.hp.clamp(0, self.max_hp.max(0));
    }

    /// Whether the member can still fight.
    #[must_use]
    pub fn is_standing(&self) -> bool {
        self.hp > 0
    }

    /// Add `count` of `item` to the inventory.
    pub fn give_item(&mut self, item: &str, count: u32) {
        *self.inventory.entry(item.to_string()).or_insert(0) += count;
    }
}

impl Default for MemberRecord {
    fn default() -> Self {
        Self::fresh(&SchemaDefaults::default())
    }
}

impl Document for MemberRecord {
    const SCOPE: Scope = Scope::Member;

    fn fresh(defaults: &SchemaDefaults) -> Self {
        Self {
            strength: defaults.strength,
            defense: defaults.defense,
            speed: defaults.speed,
            hp: defaults.max_hp,
            max_hp: defaults.max_hp,
            haki_level: 0,
            bounty: 0,
            berries: defaults.berries,
            inventory: BTreeMap::new(),
            wins: 0,
            losses: 0,
            last_rest: None,
            extra: ExtraFields::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Cross-guild profile of a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    /// Battles fought in any guild.
    pub total_battles: u64,
    /// Battles won in any guild.
    pub total_wins: u64,
    /// Unknown fields.
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Document for UserRecord {
    const SCOPE: Scope = Scope::User;

    fn fresh(_defaults: &SchemaDefaults) -> Self {
        Self::default()
    }
}
