//! Periodic world-state sweeps.
//!
//! A sweep visits every record of one scope and applies a randomised
//! transform to it. Records are independent: a failure on one key is logged
//! and reported, and the sweep moves on. Each record is written with the
//! store's compare-and-set, so a sweep racing a command never overwrites
//! the command's result; the sweep skips that key with a conflict instead.

pub mod transforms;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SweepConfig;
use crate::error::{GrandlineError, Result};
use crate::record::{GlobalRecord, GuildRecord, MemberRecord, Weather};
use crate::store::{RecordStore, Versioned};
use crate::types::{GuildId, RecordKey, Scope, UserId};

pub use transforms::Encounter;

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// What the host currently knows about guilds and their members.
pub trait Directory: Send + Sync {
    /// Whether the bot is still in `guild`.
    fn has_guild(&self, guild: GuildId) -> bool;
    /// Whether `user` is still a member of `guild`.
    fn has_member(&self, guild: GuildId, user: UserId) -> bool;
    /// Every guild the bot is in.
    fn guilds(&self) -> Vec<GuildId>;
}

/// A fixed guild/member listing.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    guilds: RwLock<BTreeMap<GuildId, BTreeSet<UserId>>>,
}

impl StaticDirectory {
    /// Empty listing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user` in `guild`, creating the guild if needed.
    pub fn add_member(&self, guild: GuildId, user: UserId) {
        self.guilds.write().entry(guild).or_default().insert(user);
    }

    /// Register an empty guild.
    pub fn add_guild(&self, guild: GuildId) {
        self.guilds.write().entry(guild).or_default();
    }
}

impl Directory for StaticDirectory {
    fn has_guild(&self, guild: GuildId) -> bool {
        self.guilds.read().contains_key(&guild)
    }

    fn has_member(&self, guild: GuildId, user: UserId) -> bool {
        self.guilds
            .read()
            .get(&guild)
            .is_some_and(|members| members.contains(&user))
    }

    fn guilds(&self) -> Vec<GuildId> {
        self.guilds.read().keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Sweep kinds and reports
// ---------------------------------------------------------------------------

/// The four periodic sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SweepKind {
    /// Member bounties drift up or down.
    BountyDrift,
    /// Each guild gets new weather.
    Weather,
    /// Market prices move.
    Market,
    /// Members may meet something at sea.
    Encounter,
}

impl SweepKind {
    /// Every sweep kind.
    pub const ALL: [Self; 4] = [Self::Encounter, Self::Weather, Self::BountyDrift, Self::Market];

    /// Scope of the records this sweep visits.
    #[must_use]
    pub fn scope(self) -> Scope {
        match self {
            Self::BountyDrift | Self::Encounter => Scope::Member,
            Self::Weather => Scope::Guild,
            Self::Market => Scope::Global,
        }
    }

    /// How often this sweep runs.
    #[must_use]
    pub fn interval(self, config: &SweepConfig) -> Duration {
        match self {
            Self::BountyDrift => config.bounty_interval(),
            Self::Weather => config.weather_interval(),
            Self::Market => config.market_interval(),
            Self::Encounter => config.encounter_interval(),
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BountyDrift => "bounty_drift",
            Self::Weather => "weather",
            Self::Market => "market",
            Self::Encounter => "encounter",
        })
    }
}

/// What one sweep did.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    /// Which sweep ran.
    pub kind: SweepKind,
    /// Records looked at.
    pub visited: usize,
    /// Records written back.
    pub updated: usize,
    /// Records skipped, with the reason.
    pub skipped: Vec<(RecordKey, String)>,
    /// Encounters rolled during an encounter sweep.
    pub encounters: Vec<(RecordKey, Encounter)>,
    /// Set when the sweep could not even enumerate its keys.
    pub aborted: Option<String>,
}

impl SweepReport {
    fn new(kind: SweepKind) -> Self {
        Self {
            kind,
            visited: 0,
            updated: 0,
            skipped: Vec::new(),
            encounters: Vec::new(),
            aborted: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

/// Runs sweeps against a store, consulting the host directory.
#[derive(Clone)]
pub struct Sweeper {
    store: RecordStore,
    directory: Arc<dyn Directory>,
    config: SweepConfig,
}

impl fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sweeper")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Records visited between yields in [`Sweeper::run_cooperative`].
const YIELD_EVERY: usize = 32;

impl Sweeper {
    /// Create a sweeper.
    #[must_use]
    pub fn new(store: RecordStore, directory: Arc<dyn Directory>, config: SweepConfig) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    /// Sweep configuration in use.
    #[must_use]
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run one sweep to completion.
    pub fn run<R: Rng + ?Sized>(&self, kind: SweepKind, rng: &mut R) -> SweepReport {
        let mut report = SweepReport::new(kind);
        let Some(keys) = self.keys_for(kind, &mut report) else {
            return report;
        };
        let mut weather = HashMap::new();
        for key in keys {
            self.step(kind, key, rng, &mut weather, &mut report);
        }
        Self::finish(&report);
        report
    }

    /// Like [`run`](Self::run), yielding to the runtime every few records so
    /// commands on the same executor keep flowing during a long sweep.
    pub async fn run_cooperative<R: Rng + Send + ?Sized>(
        &self,
        kind: SweepKind,
        rng: &mut R,
    ) -> SweepReport {
        let mut report = SweepReport::new(kind);
        let Some(keys) = self.keys_for(kind, &mut report) else {
            return report;
        };
        let mut weather = HashMap::new();
        for (i, key) in keys.into_iter().enumerate() {
            if i > 0 && i % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
            self.step(kind, key, rng, &mut weather, &mut report);
        }
        Self::finish(&report);
        report
    }

    fn finish(report: &SweepReport) {
        info!(
            kind = %report.kind,
            visited = report.visited,
            updated = report.updated,
            skipped = report.skipped.len(),
            "sweep finished"
        );
    }

    fn keys_for(&self, kind: SweepKind, report: &mut SweepReport) -> Option<Vec<RecordKey>> {
        let keys = match kind {
            SweepKind::Market => Ok(vec![RecordKey::Global]),
            SweepKind::Weather => self.store.list_keys(Scope::Guild).map(|stored| {
                let mut all: BTreeSet<RecordKey> = stored.into_iter().collect();
                all.extend(self.directory.guilds().into_iter().map(RecordKey::Guild));
                all.into_iter().collect()
            }),
            SweepKind::BountyDrift | SweepKind::Encounter => self.store.list_keys(Scope::Member),
        };
        match keys {
            Ok(keys) => Some(keys),
            Err(e) => {
                warn!(kind = %kind, error = %e, "sweep aborted: cannot list records");
                report.aborted = Some(e.to_string());
                None
            }
        }
    }

    fn step<R: Rng + ?Sized>(
        &self,
        kind: SweepKind,
        key: RecordKey,
        rng: &mut R,
        weather: &mut HashMap<GuildId, Weather>,
        report: &mut SweepReport,
    ) {
        report.visited += 1;
        match self.visit(kind, key, rng, weather) {
            Ok(Visit::Updated(encounter)) => {
                report.updated += 1;
                if let Some(encounter) = encounter {
                    debug!(key = %key, %encounter, "encounter");
                    report.encounters.push((key, encounter));
                }
            }
            Ok(Visit::Unchanged) => {}
            Err(e) => {
                warn!(kind = %kind, key = %key, error = %e, "sweep skipped record");
                report.skipped.push((key, e.to_string()));
            }
        }
    }

    fn check_present(&self, key: RecordKey) -> Result<()> {
        match key {
            RecordKey::Guild(g) | RecordKey::Member(g, _) if !self.directory.has_guild(g) => {
                Err(GrandlineError::not_found("guild", g))
            }
            RecordKey::Member(g, u) if !self.directory.has_member(g, u) => {
                Err(GrandlineError::not_found("member", format!("{g}/{u}")))
            }
            _ => Ok(()),
        }
    }

    fn guild_weather(&self, guild: GuildId, cache: &mut HashMap<GuildId, Weather>) -> Result<Weather> {
        if let Some(w) = cache.get(&guild) {
            return Ok(*w);
        }
        let w = self.store.get::<GuildRecord>(&RecordKey::Guild(guild))?.weather;
        cache.insert(guild, w);
        Ok(w)
    }

    fn visit<R: Rng + ?Sized>(
        &self,
        kind: SweepKind,
        key: RecordKey,
        rng: &mut R,
        weather: &mut HashMap<GuildId, Weather>,
    ) -> Result<Visit> {
        self.check_present(key)?;
        let config = &self.config;
        match kind {
            SweepKind::BountyDrift => {
                let Versioned { doc: mut member, version } = self.store.get_versioned::<MemberRecord>(&key)?;
                if !transforms::drift_bounty(&mut member, rng, config) {
                    return Ok(Visit::Unchanged);
                }
                self.store.compare_and_set(&key, version, &member)?;
                Ok(Visit::Updated(None))
            }
            SweepKind::Weather => {
                let next = transforms::roll_weather(rng);
                self.store.scoped_update(&key, |g: &mut GuildRecord| g.weather = next)?;
                Ok(Visit::Updated(None))
            }
            SweepKind::Market => {
                self.store
                    .scoped_update(&key, |g: &mut GlobalRecord| transforms::move_market(g, rng, config))?;
                Ok(Visit::Updated(None))
            }
            SweepKind::Encounter => {
                let RecordKey::Member(guild, _) = key else {
                    return Err(GrandlineError::InvalidArgument(format!("{key} is not a member key")));
                };
                let current = self.guild_weather(guild, weather)?;
                let Some(encounter) = transforms::roll_encounter(current, rng, config) else {
                    return Ok(Visit::Unchanged);
                };
                self.store
                    .scoped_update(&key, |m: &mut MemberRecord| encounter.apply(m))?;
                Ok(Visit::Updated(Some(encounter)))
            }
        }
    }
}

enum Visit {
    Updated(Option<Encounter>),
    Unchanged,
}
