//! Combat math library
//!
//! Pure functions over plain numbers. Nothing here reads or writes battle
//! state; randomness arrives through an explicit `BattleRng`.

pub mod archetype;
pub mod constants;
pub mod modifiers;
pub mod morale;
pub mod resolution;
pub mod rng;

pub use archetype::{ArchetypeProperties, UnitArchetype};
pub use modifiers::{CombatContext, FormationModifiers, FormationType, Terrain, Weather};
pub use resolution::{resolve_attack, AttackOutcome, CombatProfile};
pub use rng::BattleRng;
