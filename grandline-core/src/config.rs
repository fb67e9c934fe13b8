//! Configuration for the grandline plugins.
//!
//! Maps directly to `grandline.toml`. Every section and field is optional;
//! missing values fall back to the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GrandlineError, Result};

/// Top-level grandline configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrandlineConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Persistence backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Default schema values for freshly created records.
    #[serde(default)]
    pub defaults: SchemaDefaults,
    /// Battle tuning table.
    #[serde(default)]
    pub battle: BattleConfig,
    /// Rest action tuning.
    #[serde(default)]
    pub rest: RestConfig,
    /// Training action tuning.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Periodic sweep intervals and factors.
    #[serde(default)]
    pub sweeps: SweepConfig,
    /// Interactive prompts and chat pacing.
    #[serde(default)]
    pub interaction: InteractionConfig,
}

impl GrandlineConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `GrandlineError::Config` if the TOML is invalid or a value is
    /// out of range.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| GrandlineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns `GrandlineError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(GrandlineError::Config(msg.to_string()));

        if self.battle.turn_cap == 0 {
            return fail("battle.turn_cap must be at least 1");
        }
        for (name, p) in [
            ("battle.massive_chance", self.battle.massive_chance),
            ("battle.burn_chance", self.battle.burn_chance),
            ("battle.stun_chance", self.battle.stun_chance),
            ("sweeps.encounter_chance", self.sweeps.encounter_chance),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(GrandlineError::Config(format!("{name} must be within [0, 1]")));
            }
        }
        if self.rest.min_heal > self.rest.max_heal {
            return fail("rest.min_heal must not exceed rest.max_heal");
        }
        for (name, factor) in [
            ("sweeps.bounty_min_factor", self.sweeps.bounty_min_factor),
            ("sweeps.bounty_max_factor", self.sweeps.bounty_max_factor),
            ("sweeps.market_min_factor", self.sweeps.market_min_factor),
            ("sweeps.market_max_factor", self.sweeps.market_max_factor),
        ] {
            if !factor.is_finite() {
                return Err(GrandlineError::Config(format!("{name} must be a finite number")));
            }
        }
        if self.sweeps.bounty_min_factor > self.sweeps.bounty_max_factor {
            return fail("sweeps.bounty_min_factor must not exceed sweeps.bounty_max_factor");
        }
        if self.sweeps.market_min_factor > self.sweeps.market_max_factor {
            return fail("sweeps.market_min_factor must not exceed sweeps.market_max_factor");
        }
        if [
            self.sweeps.encounter_interval_secs,
            self.sweeps.weather_interval_secs,
            self.sweeps.bounty_interval_secs,
            self.sweeps.market_interval_secs,
        ]
        .contains(&0)
        {
            return fail("sweep intervals must be at least one second");
        }
        if self.sweeps.bounty_min_factor < 0.0 || self.sweeps.market_min_factor < 0.0 {
            return fail("sweep factors must not be negative");
        }
        if self.defaults.max_hp <= 0 {
            return fail("defaults.max_hp must be positive");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prefix that marks a chat message as a command.
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            command_prefix: "!".to_string(),
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend: "sqlite" or "memory" (tests, throwaway runs).
    #[serde(default = "default_sqlite")]
    pub backend: String,
    /// Database file for the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Number of rotating backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
    /// Records kept in the read cache.
    #[serde(default = "default_256")]
    pub cache_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: "grandline.db".to_string(),
            wal_mode: true,
            checksum_enabled: true,
            backup_count: 3,
            cache_capacity: 256,
        }
    }
}

/// Registered default schema values for new member records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefaults {
    /// Starting strength.
    #[serde(default = "default_10_i64")]
    pub strength: i64,
    /// Starting defense.
    #[serde(default = "default_5_i64")]
    pub defense: i64,
    /// Starting speed.
    #[serde(default = "default_10_i64")]
    pub speed: i64,
    /// Starting (and maximum) health.
    #[serde(default = "default_100_i64")]
    pub max_hp: i64,
    /// Starting wallet.
    #[serde(default = "default_500_u64")]
    pub berries: u64,
}

impl Default for SchemaDefaults {
    fn default() -> Self {
        Self {
            strength: 10,
            defense: 5,
            speed: 10,
            max_hp: 100,
            berries: 500,
        }
    }
}

/// Canonical battle tuning table.
///
/// Critical hits double damage with probability
/// `attacker.speed / (attacker.speed + defender.speed)`. The "massive hit"
/// roll is checked first and is disabled unless `massive_chance > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Hard cap on turns before the battle is decided on remaining health.
    #[serde(default = "default_20")]
    pub turn_cap: u32,
    /// Damage dealt per burn stack when it ticks.
    #[serde(default = "default_5_i64")]
    pub burn_damage_per_stack: i64,
    /// Burn stacks added by a successful burn roll.
    #[serde(default = "default_1")]
    pub burn_stacks_per_hit: u32,
    /// Damage multiplier on a critical hit.
    #[serde(default = "default_2_i64")]
    pub crit_multiplier: i64,
    /// Chance of a massive hit per attack.
    #[serde(default)]
    pub massive_chance: f64,
    /// Damage multiplier on a massive hit.
    #[serde(default = "default_3_i64")]
    pub massive_multiplier: i64,
    /// Chance that a burning special move applies burn.
    #[serde(default = "default_0_5")]
    pub burn_chance: f64,
    /// Chance that a stunning special move applies stun.
    #[serde(default = "default_0_3")]
    pub stun_chance: f64,
    /// Strength granted per haki level.
    #[serde(default = "default_2_i64")]
    pub haki_strength_bonus: i64,
    /// Berries paid to the winner on top of the bounty share.
    #[serde(default = "default_100_u64")]
    pub reward_berries: u64,
    /// Percentage of the loser's bounty paid to the winner in berries.
    #[serde(default = "default_10_u64")]
    pub reward_bounty_percent: u64,
    /// Flat bounty increase for the winner.
    #[serde(default = "default_5000")]
    pub bounty_gain: u64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            turn_cap: 20,
            burn_damage_per_stack: 5,
            burn_stacks_per_hit: 1,
            crit_multiplier: 2,
            massive_chance: 0.0,
            massive_multiplier: 3,
            burn_chance: 0.5,
            stun_chance: 0.3,
            haki_strength_bonus: 2,
            reward_berries: 100,
            reward_bounty_percent: 10,
            bounty_gain: 5_000,
        }
    }
}

/// Rest action tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Minimum health restored.
    #[serde(default = "default_20_i64")]
    pub min_heal: i64,
    /// Maximum health restored.
    #[serde(default = "default_50_i64")]
    pub max_heal: i64,
    /// Seconds between two rests.
    #[serde(default = "default_300_i64")]
    pub cooldown_secs: i64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            min_heal: 20,
            max_heal: 50,
            cooldown_secs: 300,
        }
    }
}

/// Training action tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Berries spent per training session.
    #[serde(default = "default_200_u64")]
    pub cost_berries: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self { cost_berries: 200 }
    }
}

/// Periodic world-state sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Whether the scheduler starts sweeps at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between encounter sweeps.
    #[serde(default = "default_1800")]
    pub encounter_interval_secs: u64,
    /// Seconds between weather sweeps.
    #[serde(default = "default_3600")]
    pub weather_interval_secs: u64,
    /// Seconds between bounty drift sweeps.
    #[serde(default = "default_21600")]
    pub bounty_interval_secs: u64,
    /// Seconds between market sweeps.
    #[serde(default = "default_86400")]
    pub market_interval_secs: u64,
    /// Lower bound of the bounty drift factor.
    #[serde(default = "default_0_9")]
    pub bounty_min_factor: f64,
    /// Upper bound of the bounty drift factor.
    #[serde(default = "default_1_1")]
    pub bounty_max_factor: f64,
    /// Lower bound of the market price factor.
    #[serde(default = "default_0_8")]
    pub market_min_factor: f64,
    /// Upper bound of the market price factor.
    #[serde(default = "default_1_25")]
    pub market_max_factor: f64,
    /// Chance that a member meets an encounter in one sweep.
    #[serde(default = "default_0_25")]
    pub encounter_chance: f64,
}

impl SweepConfig {
    /// Interval for the encounter sweep.
    #[must_use]
    pub fn encounter_interval(&self) -> Duration {
        Duration::from_secs(self.encounter_interval_secs)
    }

    /// Interval for the weather sweep.
    #[must_use]
    pub fn weather_interval(&self) -> Duration {
        Duration::from_secs(self.weather_interval_secs)
    }

    /// Interval for the bounty drift sweep.
    #[must_use]
    pub fn bounty_interval(&self) -> Duration {
        Duration::from_secs(self.bounty_interval_secs)
    }

    /// Interval for the market sweep.
    #[must_use]
    pub fn market_interval(&self) -> Duration {
        Duration::from_secs(self.market_interval_secs)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            encounter_interval_secs: 1_800,
            weather_interval_secs: 3_600,
            bounty_interval_secs: 21_600,
            market_interval_secs: 86_400,
            bounty_min_factor: 0.9,
            bounty_max_factor: 1.1,
            market_min_factor: 0.8,
            market_max_factor: 1.25,
            encounter_chance: 0.25,
        }
    }
}

/// Interactive prompt and chat pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// How long a prompt waits for a reply before the default fires.
    #[serde(default = "default_30")]
    pub prompt_timeout_secs: u64,
    /// Delay between battle turn lines.
    #[serde(default = "default_1500")]
    pub turn_delay_ms: u64,
    /// Entries shown on the bounty board.
    #[serde(default = "default_10_usize")]
    pub leaderboard_size: usize,
}

impl InteractionConfig {
    /// Prompt timeout as a [`Duration`].
    #[must_use]
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    /// Turn pacing delay as a [`Duration`].
    #[must_use]
    pub fn turn_delay(&self) -> Duration {
        Duration::from_millis(self.turn_delay_ms)
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            prompt_timeout_secs: 30,
            turn_delay_ms: 1_500,
            leaderboard_size: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_prefix() -> String { "!".to_string() }
fn default_sqlite() -> String { "sqlite".to_string() }
fn default_db_path() -> String { "grandline.db".to_string() }
fn default_0_25() -> f64 { 0.25 }
fn default_0_3() -> f64 { 0.3 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_8() -> f64 { 0.8 }
fn default_0_9() -> f64 { 0.9 }
fn default_1_1() -> f64 { 1.1 }
fn default_1_25() -> f64 { 1.25 }
fn default_1() -> u32 { 1 }
fn default_3() -> u32 { 3 }
fn default_20() -> u32 { 20 }
fn default_2_i64() -> i64 { 2 }
fn default_3_i64() -> i64 { 3 }
fn default_5_i64() -> i64 { 5 }
fn default_10_i64() -> i64 { 10 }
fn default_20_i64() -> i64 { 20 }
fn default_50_i64() -> i64 { 50 }
fn default_100_i64() -> i64 { 100 }
fn default_300_i64() -> i64 { 300 }
fn default_10_u64() -> u64 { 10 }
fn default_100_u64() -> u64 { 100 }
fn default_200_u64() -> u64 { 200 }
fn default_500_u64() -> u64 { 500 }
fn default_5000() -> u64 { 5_000 }
fn default_30() -> u64 { 30 }
fn default_1500() -> u64 { 1_500 }
fn default_1800() -> u64 { 1_800 }
fn default_3600() -> u64 { 3_600 }
fn default_21600() -> u64 { 21_600 }
fn default_86400() -> u64 { 86_400 }
fn default_10_usize() -> usize { 10 }
fn default_256() -> usize { 256 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = GrandlineConfig::from_toml("").expect("parse");
        assert_eq!(config.battle.turn_cap, 20);
        assert_eq!(config.rest.min_heal, 20);
        assert_eq!(config.rest.max_heal, 50);
        assert_eq!(config.interaction.prompt_timeout_secs, 30);
        assert!((config.battle.massive_chance).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = GrandlineConfig::from_toml(
            "[battle]\nturn_cap = 12\nmassive_chance = 0.05\n",
        )
        .expect("parse");
        assert_eq!(config.battle.turn_cap, 12);
        assert_eq!(config.battle.crit_multiplier, 2);
        assert_eq!(config.storage.backend, "sqlite");
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(GrandlineConfig::from_toml("[battle]\nturn_cap = 0\n").is_err());
        assert!(GrandlineConfig::from_toml("[battle]\nstun_chance = 1.5\n").is_err());
        assert!(GrandlineConfig::from_toml("[rest]\nmin_heal = 60\n").is_err());
        assert!(GrandlineConfig::from_toml("[sweeps]\nbounty_max_factor = inf\n").is_err());
        assert!(GrandlineConfig::from_toml("[sweeps]\nmarket_max_factor = nan\n").is_err());
        assert!(GrandlineConfig::from_toml("[battle]\nburn_chance = nan\n").is_err());
    }

    #[test]
    fn garbage_is_config_error() {
        let err = GrandlineConfig::from_toml("battle = [").expect_err("invalid");
        assert!(matches!(err, GrandlineError::Config(_)));
    }
}
