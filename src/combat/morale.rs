//! Morale math
//!
//! Morale is a 0-100 scalar. Losses accumulate from casualties and shocks;
//! once it drops under the rout threshold the squad breaks.

use crate::combat::constants::{
    CASUALTY_MORALE_FACTOR, CRITICAL_MORALE_SHOCK, FLANK_MORALE_SHOCK, IDLE_MORALE_RECOVERY,
    MORALE_MAX, MORALE_MIN, ROUT_CONTAGION_SHOCK,
};

/// Clamp a morale value into its legal range
pub fn clamp_morale(morale: f64) -> f64 {
    morale.clamp(MORALE_MIN, MORALE_MAX)
}

/// Morale lost for `casualties` out of a squad that started with `initial_troops`
pub fn casualty_morale_loss(casualties: u32, initial_troops: u32) -> f64 {
    if initial_troops == 0 {
        return 0.0;
    }
    casualties as f64 / initial_troops as f64 * CASUALTY_MORALE_FACTOR
}

/// Extra morale lost from the manner of an attack
pub fn shock_morale_loss(is_critical: bool, flanked: bool) -> f64 {
    let mut loss = 0.0;
    if is_critical {
        loss += CRITICAL_MORALE_SHOCK;
    }
    if flanked {
        loss += FLANK_MORALE_SHOCK;
    }
    loss
}

/// Morale lost from seeing `routing_allies` nearby allies break this tick
pub fn contagion_morale_loss(routing_allies: usize) -> f64 {
    routing_allies as f64 * ROUT_CONTAGION_SHOCK
}

/// Morale regained by a squad that spent the tick out of combat
pub fn idle_recovery(current: f64) -> f64 {
    (MORALE_MAX - current).clamp(0.0, IDLE_MORALE_RECOVERY)
}

/// Does this morale force a rout?
pub fn should_rout(morale: f64, rout_threshold: f64) -> bool {
    morale < rout_threshold
}
