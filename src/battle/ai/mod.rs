//! Squad AI for battle decision-making
//!
//! Architecture: Trait + Data hybrid
//! - IntentSource trait lets the loop swap live AI for recorded intents
//! - AiProfile holds TOML-loaded targeting weights and engagement rules
//! - BehaviorTree per archetype picks an action from a snapshot

pub mod behavior_tree;
pub mod controller;
pub mod profile;
pub mod targeting;

pub use behavior_tree::{ActionKind, BehaviorNode, BehaviorTree, Blackboard, Condition};
pub use controller::AiController;
pub use profile::{load_profile, AiProfile, EngagementConfig, TargetWeights};
pub use targeting::{select_target, TargetPolicy, TargetingOrigin};

use crate::battle::intent::Intent;
use crate::battle::state::BattleState;

/// Anything that can propose a tick's intents from a snapshot
pub trait IntentSource {
    /// Intents for the tick about to be applied (`snapshot.tick + 1`)
    fn intents_for_tick(&mut self, snapshot: &BattleState) -> Vec<Intent>;

    /// Short label for logs
    fn name(&self) -> &str;
}
