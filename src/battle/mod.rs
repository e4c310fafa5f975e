//! Battle system - deterministic squad combat driven by AI intents
//!
//! One store owns the state; the loop feeds it intents a tick at a time.
//!
//! Key properties:
//! - Same seed + same initial squads = same event log, bit for bit
//! - AI only ever sees immutable snapshots
//! - Every state change is recorded as an event

pub mod ai;
pub mod events;
pub mod intent;
pub mod result;
pub mod simulation;
pub mod state;
pub mod units;

// Re-exports for convenient access
pub use ai::{AiController, AiProfile, IntentSource};
pub use events::{BattleEvent, BattleEventKind, MoraleCause, MoveReason};
pub use intent::Intent;
pub use result::{
    determine_winner, finalize_battle, BattleResult, EndCondition, MvpRecord, RewardPayload,
    SideRewards, Winner,
};
pub use simulation::{LoopControls, SimulationLoop};
pub use state::{BattlePhase, BattleSnapshot, BattleState, BattleStats, BattleStore};
pub use units::{Force, Soldier, SoldierAction, Squad, SquadSpec, SquadStance, SquadState};
