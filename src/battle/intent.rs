//! Intents: actions proposed by AI (or a replay), applied later by the store

use serde::{Deserialize, Serialize};

use crate::core::types::{SquadId, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    MoveTo { squad: SquadId, destination: Vec2 },
    AttackTarget { squad: SquadId, target: SquadId },
    Hold { squad: SquadId },
    Retreat { squad: SquadId },
}

impl Intent {
    /// The squad that would carry out this intent
    pub fn squad(&self) -> SquadId {
        match self {
            Intent::MoveTo { squad, .. }
            | Intent::AttackTarget { squad, .. }
            | Intent::Hold { squad }
            | Intent::Retreat { squad } => *squad,
        }
    }

    pub fn target(&self) -> Option<SquadId> {
        match self {
            Intent::AttackTarget { target, .. } => Some(*target),
            _ => None,
        }
    }
}
