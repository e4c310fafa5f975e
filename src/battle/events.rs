//! Battle events: the append-only record of every state change
//!
//! Events are ordered by tick and, within a tick, by application order (which
//! follows ascending squad id). Serialized shape:
//! `{ "type", "tick", "payload", "sourceId", "targetId"? }`.

use serde::{Deserialize, Serialize};

use crate::battle::result::EndCondition;
use crate::battle::state::BattlePhase;
use crate::core::types::{Side, SoldierId, SquadId, Tick, Vec2};

/// Why a squad moved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveReason {
    /// Ordered to a point
    Advance { destination: Vec2 },
    /// Wanted to attack but the target was out of range
    Close,
    /// Fleeing towards home
    Retreat,
}

/// Why morale changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoraleCause {
    Casualties,
    Contagion,
    Recovery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BattleEventKind {
    Move {
        from: Vec2,
        to: Vec2,
        reason: MoveReason,
    },
    Attack {
        damage: f64,
        is_critical: bool,
        is_evaded: bool,
        flanking: bool,
    },
    Damage {
        side: Side,
        amount: f64,
        casualties: u32,
        killed: Vec<SoldierId>,
        remaining_troops: u32,
    },
    MoraleShift {
        from: f64,
        to: f64,
        cause: MoraleCause,
    },
    SquadRouted {
        side: Side,
        morale: f64,
    },
    SquadDestroyed {
        side: Side,
    },
    PhaseChange {
        from: BattlePhase,
        to: BattlePhase,
        end_condition: Option<EndCondition>,
    },
}

/// Immutable, timestamped record of a state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleEvent {
    pub tick: Tick,
    pub source_id: Option<SquadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<SquadId>,
    #[serde(flatten)]
    pub kind: BattleEventKind,
}

impl BattleEvent {
    pub fn new(
        tick: Tick,
        source_id: Option<SquadId>,
        target_id: Option<SquadId>,
        kind: BattleEventKind,
    ) -> Self {
        Self {
            tick,
            source_id,
            target_id,
            kind,
        }
    }

    /// Short machine name of the event type
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            BattleEventKind::Move { .. } => "move",
            BattleEventKind::Attack { .. } => "attack",
            BattleEventKind::Damage { .. } => "damage",
            BattleEventKind::MoraleShift { .. } => "morale_shift",
            BattleEventKind::SquadRouted { .. } => "squad_routed",
            BattleEventKind::SquadDestroyed { .. } => "squad_destroyed",
            BattleEventKind::PhaseChange { .. } => "phase_change",
        }
    }

    /// Move and attack events are the direct trace of an applied intent
    pub fn is_primary(&self) -> bool {
        matches!(
            self.kind,
            BattleEventKind::Move { .. } | BattleEventKind::Attack { .. }
        )
    }
}
