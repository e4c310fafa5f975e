//! Attack resolution
//!
//! Pure: no battle state, no side effects beyond advancing the supplied RNG.
//! Evasion and critical hits are settled before the damage magnitude.

use serde::{Deserialize, Serialize};

use crate::combat::archetype::UnitArchetype;
use crate::combat::constants::{
    ARMOR_FACTOR, CAVALRY_VS_ARCHER_BONUS, FLANK_OFFENSE_BONUS, MAX_CRIT_CHANCE, MAX_EVASION,
    MIN_STRIKE_DAMAGE, SPEAR_VS_CAVALRY_BONUS, VARIANCE_MIN, VARIANCE_SPAN,
};
use crate::combat::modifiers::{CombatContext, FormationType};
use crate::combat::rng::BattleRng;

/// One side of an engagement, reduced to the numbers combat math needs
#[derive(Debug, Clone, PartialEq)]
pub struct CombatProfile {
    pub archetype: UnitArchetype,
    pub offense: f64,
    pub defense: f64,
    pub evasion: f64,
    pub crit_chance: f64,
    pub crit_multiplier: f64,
    /// Soldiers able to strike this tick
    pub strikes: u32,
}

impl CombatProfile {
    /// Profile for a squad of `troops` in `formation`
    pub fn for_squad(archetype: UnitArchetype, formation: FormationType, troops: u32) -> Self {
        let props = archetype.properties();
        Self {
            archetype,
            offense: props.offense,
            defense: props.defense,
            evasion: props.evasion,
            crit_chance: props.crit_chance,
            crit_multiplier: props.crit_multiplier,
            strikes: troops.min(formation.frontage()),
        }
    }
}

/// Result of one attack
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub damage: f64,
    pub is_critical: bool,
    pub is_evaded: bool,
}

/// Additive bonus for favourable archetype pairings
fn matchup_bonus(attacker: UnitArchetype, defender: UnitArchetype) -> f64 {
    match (attacker, defender) {
        (UnitArchetype::Spearmen, UnitArchetype::Cavalry) => SPEAR_VS_CAVALRY_BONUS,
        (UnitArchetype::Cavalry, UnitArchetype::Archers) => CAVALRY_VS_ARCHER_BONUS,
        _ => 0.0,
    }
}

/// Effective offense after all additive modifiers
pub fn effective_offense(
    attacker: &CombatProfile,
    defender: &CombatProfile,
    context: &CombatContext,
) -> f64 {
    let terrain = context.terrain.modifiers();
    let (weather_melee, weather_ranged) = context.weather.offense_modifiers();

    let mut offense = attacker.offense + context.formation.attacker_offense;
    offense += matchup_bonus(attacker.archetype, defender.archetype);

    if attacker.archetype.is_ranged() {
        offense += terrain.ranged_offense + weather_ranged;
    } else {
        offense += terrain.offense + weather_melee;
    }

    if context.flanking {
        offense += FLANK_OFFENSE_BONUS;
    }

    offense
}

/// Effective defense after all additive modifiers
pub fn effective_defense(defender: &CombatProfile, context: &CombatContext) -> f64 {
    defender.defense + context.terrain.modifiers().defense + context.formation.defender_defense
}

/// Chance the whole volley misses
pub fn evasion_chance(defender: &CombatProfile, context: &CombatContext) -> f64 {
    let mut evasion = defender.evasion + context.terrain.modifiers().evasion;
    // Flanked troops cannot sidestep what they cannot see
    if context.flanking {
        evasion = 0.0;
    }
    evasion.clamp(0.0, MAX_EVASION)
}

/// Resolve one attack from `attacker` on `defender`
///
/// Always draws exactly three rolls (evade, crit, variance) so the RNG stream
/// advances identically whatever the outcome.
pub fn resolve_attack(
    attacker: &CombatProfile,
    defender: &CombatProfile,
    context: &CombatContext,
    rng: &mut BattleRng,
) -> AttackOutcome {
    let evade_roll = rng.roll();
    let crit_roll = rng.roll();
    let variance_roll = rng.roll();

    if attacker.strikes == 0 {
        return AttackOutcome {
            damage: 0.0,
            is_critical: false,
            is_evaded: false,
        };
    }

    if evade_roll < evasion_chance(defender, context) {
        return AttackOutcome {
            damage: 0.0,
            is_critical: false,
            is_evaded: true,
        };
    }

    let is_critical = crit_roll < attacker.crit_chance.clamp(0.0, MAX_CRIT_CHANCE);

    let offense = effective_offense(attacker, defender, context);
    let defense = effective_defense(defender, context);
    let per_strike = (offense - defense * ARMOR_FACTOR).max(MIN_STRIKE_DAMAGE);

    let variance = VARIANCE_MIN + variance_roll * VARIANCE_SPAN;
    let crit = if is_critical {
        attacker.crit_multiplier
    } else {
        1.0
    };

    AttackOutcome {
        damage: per_strike * variance * crit * attacker.strikes as f64,
        is_critical,
        is_evaded: false,
    }
}
