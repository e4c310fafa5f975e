//! Situational modifiers: terrain, weather, formation
//!
//! All values are ADDITIVE adjustments to offense, defense or evasion.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    #[default]
    Open,
    Forest,
    Hills,
    Marsh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Fog,
    Storm,
}

/// Squad formation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationType {
    #[default]
    Line,
    Column,
    Wedge,
}

impl FormationType {
    /// Soldiers per rank, which is also the number that can strike per tick
    pub fn frontage(&self) -> u32 {
        match self {
            FormationType::Line => 40,
            FormationType::Column => 12,
            FormationType::Wedge => 20,
        }
    }

    pub fn offense_modifier(&self) -> f64 {
        match self {
            FormationType::Line => 0.0,
            FormationType::Column => 0.0,
            FormationType::Wedge => 2.0,
        }
    }

    pub fn defense_modifier(&self) -> f64 {
        match self {
            FormationType::Line => 1.0,
            FormationType::Column => -1.0,
            FormationType::Wedge => -1.0,
        }
    }

    /// Extra march speed in metres per tick
    pub fn speed_modifier(&self) -> f64 {
        match self {
            FormationType::Column => 1.0,
            FormationType::Line | FormationType::Wedge => 0.0,
        }
    }
}

/// Additive modifiers contributed by terrain
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TerrainModifiers {
    pub offense: f64,
    pub ranged_offense: f64,
    pub defense: f64,
    pub evasion: f64,
}

impl Terrain {
    pub fn modifiers(&self) -> TerrainModifiers {
        match self {
            Terrain::Open => TerrainModifiers::default(),
            Terrain::Forest => TerrainModifiers {
                offense: 0.0,
                ranged_offense: -3.0,
                defense: 2.0,
                evasion: 0.05,
            },
            Terrain::Hills => TerrainModifiers {
                offense: 0.0,
                ranged_offense: 1.0,
                defense: 1.0,
                evasion: 0.0,
            },
            Terrain::Marsh => TerrainModifiers {
                offense: -2.0,
                ranged_offense: 0.0,
                defense: 0.0,
                evasion: -0.03,
            },
        }
    }
}

impl Weather {
    /// (melee offense, ranged offense) adjustments
    pub fn offense_modifiers(&self) -> (f64, f64) {
        match self {
            Weather::Clear => (0.0, 0.0),
            Weather::Rain => (0.0, -3.0),
            Weather::Fog => (0.0, -2.0),
            Weather::Storm => (-1.0, -4.0),
        }
    }
}

/// Formation adjustments for one attacker/defender pairing
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FormationModifiers {
    pub attacker_offense: f64,
    pub defender_defense: f64,
}

impl FormationModifiers {
    pub fn between(attacker: FormationType, defender: FormationType) -> Self {
        Self {
            attacker_offense: attacker.offense_modifier(),
            defender_defense: defender.defense_modifier(),
        }
    }
}

/// Everything about an engagement that is not a property of either squad
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CombatContext {
    pub terrain: Terrain,
    pub weather: Weather,
    pub formation: FormationModifiers,
    /// Defender is already locked in combat with someone else
    pub flanking: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_widest_frontage() {
        assert!(FormationType::Line.frontage() > FormationType::Wedge.frontage());
        assert!(FormationType::Wedge.frontage() > FormationType::Column.frontage());
    }

    #[test]
    fn test_wedge_trades_defense_for_offense() {
        let mods = FormationModifiers::between(FormationType::Wedge, FormationType::Wedge);
        assert!(mods.attacker_offense > 0.0);
        assert!(mods.defender_defense < 0.0);
    }

    #[test]
    fn test_weather_hurts_ranged_more() {
        for weather in [Weather::Rain, Weather::Fog, Weather::Storm] {
            let (melee, ranged) = weather.offense_modifiers();
            assert!(ranged < melee);
        }
    }

    #[test]
    fn test_open_terrain_neutral() {
        assert_eq!(Terrain::Open.modifiers(), TerrainModifiers::default());
    }
}
