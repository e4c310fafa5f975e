//! Engine configuration with documented defaults
//!
//! Loaded from TOML (`data/battle.toml`). Every section falls back to its
//! defaults when omitted, so a partial file only overrides what it names.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::combat::modifiers::{Terrain, Weather};
use crate::core::error::{BattleError, Result};
use crate::core::types::Tick;

/// Slowest allowed playback speed
pub const MIN_SPEED: f64 = 0.5;
/// Fastest allowed playback speed
pub const MAX_SPEED: f64 = 4.0;

/// Rules for a single battle. Stored in replays so a replay is judged by the
/// same rules it was recorded under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleRules {
    /// Hard cap on combat ticks before the battle is called on time
    pub max_ticks: Tick,

    /// Logical ticks per real-time second at 1x speed
    ///
    /// Independent of render frame rate. The speed multiplier scales how many
    /// of these run per second, never the math inside a tick.
    pub tick_rate_hz: u32,

    /// Squad morale below this forces a retreat and a rout
    pub rout_threshold: f64,

    /// Force-wide morale below this ends the battle
    ///
    /// Routing squads contribute zero, so a side with every squad routing
    /// always collapses.
    pub collapse_threshold: f64,

    /// Battlefield terrain (applies to every engagement)
    pub terrain: Terrain,

    /// Battlefield weather (mostly affects ranged units)
    pub weather: Weather,

    /// Half-width of the square battlefield in metres
    pub field_half_extent: f64,

    /// Speed multiplier the loop starts at
    pub initial_speed: f64,
}

impl Default for BattleRules {
    fn default() -> Self {
        Self {
            max_ticks: 600,
            tick_rate_hz: 10,
            rout_threshold: 25.0,
            collapse_threshold: 20.0,
            terrain: Terrain::Open,
            weather: Weather::Clear,
            field_half_extent: 250.0,
            initial_speed: 1.0,
        }
    }
}

impl BattleRules {
    /// Validate rules for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_ticks == 0 {
            return Err("max_ticks must be positive".into());
        }

        if self.tick_rate_hz == 0 {
            return Err("tick_rate_hz must be positive".into());
        }

        if !(0.0..=100.0).contains(&self.rout_threshold)
            || !(0.0..=100.0).contains(&self.collapse_threshold)
        {
            return Err("morale thresholds must lie within 0..=100".into());
        }

        // A force must be able to collapse without every squad routing first
        if self.collapse_threshold > self.rout_threshold {
            return Err(format!(
                "collapse_threshold ({}) should be <= rout_threshold ({})",
                self.collapse_threshold, self.rout_threshold
            ));
        }

        if !(MIN_SPEED..=MAX_SPEED).contains(&self.initial_speed) {
            return Err(format!(
                "initial_speed ({}) must lie within {}..={}",
                self.initial_speed, MIN_SPEED, MAX_SPEED
            ));
        }

        if self.field_half_extent <= 0.0 {
            return Err("field_half_extent must be positive".into());
        }

        Ok(())
    }
}

/// Settings for posting results to the authoritative backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Result endpoint URL
    pub endpoint: String,

    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry; doubles each retry
    pub initial_backoff_ms: u64,

    /// Ceiling for the retry delay
    pub max_backoff_ms: u64,

    /// Per-request timeout
    pub timeout_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/api/battles/results".into(),
            max_attempts: 4,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
            timeout_ms: 10_000,
        }
    }
}

impl SubmissionConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "initial_backoff_ms ({}) should be <= max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        Ok(())
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rules: BattleRules,
    pub submission: SubmissionConfig,
}

impl EngineConfig {
    /// Parse from a TOML string and validate
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.rules.validate().map_err(BattleError::Config)?;
        self.submission.validate().map_err(BattleError::Config)?;
        Ok(())
    }
}
