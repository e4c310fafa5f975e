//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Simulation time unit (one logical battle step)
pub type Tick = u64;

/// Unique identifier for a battle session
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleId(pub Uuid);

impl BattleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BattleId {
    fn default() -> Self {
        Self::new()
    }
}

/// Squad identifier. Ordering is the deterministic processing order.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "squad#{}", _0)]
pub struct SquadId(pub u32);

/// Soldier identifier, unique within a battle
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "soldier#{}", _0)]
pub struct SoldierId(pub u32);

/// The two belligerents
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Attacker,
    Defender,
}

impl Side {
    pub fn opponent(&self) -> Self {
        match self {
            Side::Attacker => Side::Defender,
            Side::Defender => Side::Attacker,
        }
    }

    /// Direction (along x) this side retreats towards
    pub fn home_direction(&self) -> f64 {
        match self {
            Side::Attacker => -1.0,
            Side::Defender => 1.0,
        }
    }
}

/// Ground-plane position in metres
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0001 {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            Self::default()
        }
    }

    /// Perpendicular vector (rotated 90 degrees clockwise)
    pub fn perpendicular(&self) -> Self {
        Self {
            x: self.y,
            y: -self.x,
        }
    }

    /// Step towards `target` by at most `max_step`, never overshooting
    pub fn step_towards(&self, target: &Self, max_step: f64) -> Self {
        let delta = *target - *self;
        let dist = delta.length();
        if dist <= max_step || dist < 0.0001 {
            *target
        } else {
            *self + delta * (max_step / dist)
        }
    }

    /// Clamp both axes into `[-half_extent, half_extent]`
    pub fn clamp_to_field(&self, half_extent: f64) -> Self {
        Self {
            x: self.x.clamp(-half_extent, half_extent),
            y: self.y.clamp(-half_extent, half_extent),
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}
