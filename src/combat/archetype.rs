//! Unit archetypes and their base combat properties

use serde::{Deserialize, Serialize};

/// Kind of squad. Drives base stats and the behaviour tree it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitArchetype {
    Infantry, // Standard foot soldiers
    Spearmen, // Anti-cavalry, defensive
    Archers,  // Ranged, vulnerable in melee
    Cavalry,  // Fast, hits hard, flanks
}

/// Base properties for an archetype
#[derive(Debug, Clone, PartialEq)]
pub struct ArchetypeProperties {
    pub offense: f64,
    pub defense: f64,
    pub evasion: f64,
    pub crit_chance: f64,
    pub crit_multiplier: f64,
    pub soldier_health: f64,
    /// Metres per tick at march pace
    pub speed: f64,
    /// Centre-to-centre distance at which the squad can strike
    pub attack_range: f64,
    pub is_ranged: bool,
}

impl UnitArchetype {
    pub fn properties(&self) -> ArchetypeProperties {
        match self {
            UnitArchetype::Infantry => ArchetypeProperties {
                offense: 10.0,
                defense: 6.0,
                evasion: 0.05,
                crit_chance: 0.05,
                crit_multiplier: 1.5,
                soldier_health: 100.0,
                speed: 3.0,
                attack_range: 6.0,
                is_ranged: false,
            },
            UnitArchetype::Spearmen => ArchetypeProperties {
                offense: 9.0,
                defense: 8.0,
                evasion: 0.03,
                crit_chance: 0.04,
                crit_multiplier: 1.5,
                soldier_health: 100.0,
                speed: 2.5,
                attack_range: 7.0,
                is_ranged: false,
            },
            UnitArchetype::Archers => ArchetypeProperties {
                offense: 7.0,
                defense: 3.0,
                evasion: 0.08,
                crit_chance: 0.08,
                crit_multiplier: 1.75,
                soldier_health: 80.0,
                speed: 3.0,
                attack_range: 60.0,
                is_ranged: true,
            },
            UnitArchetype::Cavalry => ArchetypeProperties {
                offense: 13.0,
                defense: 5.0,
                evasion: 0.10,
                crit_chance: 0.10,
                crit_multiplier: 1.75,
                soldier_health: 140.0,
                speed: 6.0,
                attack_range: 6.0,
                is_ranged: false,
            },
        }
    }

    pub fn is_ranged(&self) -> bool {
        matches!(self, UnitArchetype::Archers)
    }

    pub fn is_mounted(&self) -> bool {
        matches!(self, UnitArchetype::Cavalry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cavalry_fastest() {
        let cav = UnitArchetype::Cavalry.properties().speed;
        for other in [
            UnitArchetype::Infantry,
            UnitArchetype::Spearmen,
            UnitArchetype::Archers,
        ] {
            assert!(cav > other.properties().speed);
        }
    }

    #[test]
    fn test_only_archers_ranged() {
        assert!(UnitArchetype::Archers.is_ranged());
        assert!(UnitArchetype::Archers.properties().is_ranged);
        assert!(!UnitArchetype::Infantry.is_ranged());
        assert!(
            UnitArchetype::Archers.properties().attack_range
                > UnitArchetype::Infantry.properties().attack_range
        );
    }

    #[test]
    fn test_spearmen_best_defense() {
        let spear = UnitArchetype::Spearmen.properties().defense;
        assert!(spear > UnitArchetype::Infantry.properties().defense);
        assert!(spear > UnitArchetype::Cavalry.properties().defense);
    }
}
