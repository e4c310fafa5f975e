//! AI profile configuration loaded from TOML
//!
//! Profiles tune how squads score targets and when they commit or withdraw.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::core::error::Result;

/// Target scoring weights (all non-negative)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWeights {
    /// Preference for close targets
    pub distance: f64,
    /// Preference for shaken targets
    pub morale: f64,
    /// Preference for depleted targets
    pub troops: f64,
    /// Weight of the archetype's own policy (nearest / weakest / flanking)
    pub policy_bias: f64,
}

impl Default for TargetWeights {
    fn default() -> Self {
        Self {
            distance: 1.0,
            morale: 0.6,
            troops: 0.6,
            policy_bias: 1.0,
        }
    }
}

/// When to commit and when to pull back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// Defensive squads only engage targets within this many metres
    pub defensive_radius: f64,
    /// Local enemy:friendly troop ratio that counts as outnumbered
    pub outnumbered_ratio: f64,
    /// Troop fraction under which an outnumbered squad withdraws
    pub withdraw_troop_fraction: f64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            defensive_radius: 40.0,
            outnumbered_ratio: 2.5,
            withdraw_troop_fraction: 0.15,
        }
    }
}

/// Complete AI profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiProfile {
    /// Name of this profile (set from filename)
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub weights: TargetWeights,
    #[serde(default)]
    pub engagement: EngagementConfig,
}

impl Default for AiProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            weights: TargetWeights::default(),
            engagement: EngagementConfig::default(),
        }
    }
}

impl AiProfile {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let w = &self.weights;
        for (label, value) in [
            ("distance", w.distance),
            ("morale", w.morale),
            ("troops", w.troops),
            ("policy_bias", w.policy_bias),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("weight {} must be a non-negative number", label));
            }
        }
        let e = &self.engagement;
        if e.defensive_radius <= 0.0 {
            return Err("defensive_radius must be positive".into());
        }
        if e.outnumbered_ratio <= 0.0 {
            return Err("outnumbered_ratio must be positive".into());
        }
        if !(0.0..=1.0).contains(&e.withdraw_troop_fraction) {
            return Err("withdraw_troop_fraction must be within 0..=1".into());
        }
        Ok(())
    }
}

/// Load a profile from TOML
///
/// Loads from `data/ai_profiles/{name}.toml`
pub fn load_profile(name: &str) -> Result<AiProfile> {
    let contents = fs::read_to_string(profile_path(name))?;
    let mut profile: AiProfile = toml::from_str(&contents)?;
    profile.name = name.to_string();
    profile
        .validate()
        .map_err(crate::core::error::BattleError::Config)?;
    Ok(profile)
}

fn profile_path(name: &str) -> PathBuf {
    PathBuf::from("data/ai_profiles").join(format!("{}.toml", name))
}
