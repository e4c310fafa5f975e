//! Combat constants - all tunable values in one place
//!
//! Modifiers are ADDITIVE to offense/defense/evasion, never percentage scalars.

// Soldiers
pub const SOLDIER_BASE_HEALTH: f64 = 100.0;
pub const SOLDIER_SPACING_METERS: f64 = 1.5;

// Strike damage
pub const ARMOR_FACTOR: f64 = 0.5; // Fraction of defense subtracted per strike
pub const MIN_STRIKE_DAMAGE: f64 = 1.0;
pub const VARIANCE_MIN: f64 = 0.85;
pub const VARIANCE_SPAN: f64 = 0.30; // Roll maps onto [0.85, 1.15)

// Chance bounds
pub const MAX_EVASION: f64 = 0.6;
pub const MAX_CRIT_CHANCE: f64 = 0.5;

// Situational bonuses - ADDITIVE
pub const FLANK_OFFENSE_BONUS: f64 = 3.0;
pub const SPEAR_VS_CAVALRY_BONUS: f64 = 4.0;
pub const CAVALRY_VS_ARCHER_BONUS: f64 = 3.0;

// Morale
pub const MORALE_MAX: f64 = 100.0;
pub const MORALE_MIN: f64 = 0.0;
pub const CASUALTY_MORALE_FACTOR: f64 = 100.0; // Morale lost for losing the whole squad
pub const CRITICAL_MORALE_SHOCK: f64 = 2.0;
pub const FLANK_MORALE_SHOCK: f64 = 3.0;
pub const ROUT_CONTAGION_SHOCK: f64 = 5.0;
pub const ROUT_CONTAGION_RADIUS: f64 = 40.0;
pub const IDLE_MORALE_RECOVERY: f64 = 0.2;

// Movement (metres per tick)
pub const ROUT_SPEED_BONUS: f64 = 1.0; // Panicked running, faster than march
pub const CLOSE_TO_RANGE_FACTOR: f64 = 0.8; // Stop inside range when closing
