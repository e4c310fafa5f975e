pub mod config;
pub mod error;
pub mod types;

pub use config::{BattleRules, EngineConfig, SubmissionConfig};
pub use error::{BattleError, InitializationError, Result};
pub use types::{BattleId, Side, SoldierId, SquadId, Tick, Vec2};
