use thiserror::Error;

use crate::battle::state::BattlePhase;
use crate::core::types::{SquadId, Tick};

/// Faults raised while building a battle from its initial squads
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationError {
    #[error("Battle already initialized")]
    AlreadyInitialized,

    #[error("Malformed initial squads: {0}")]
    MalformedSquads(String),
}

#[derive(Error, Debug)]
pub enum BattleError {
    #[error("Initialization error: {0}")]
    Initialization(#[from] InitializationError),

    #[error("Battle has not been initialized")]
    NotInitialized,

    #[error("Invalid intent from {squad}: {reason}")]
    InvalidIntent { squad: SquadId, reason: String },

    #[error("Illegal phase transition from {from:?}: {reason}")]
    IllegalTransition { from: BattlePhase, reason: String },

    #[error("Operation requires phase {expected:?}, battle is in {actual:?}")]
    WrongPhase {
        expected: BattlePhase,
        actual: BattlePhase,
    },

    #[error("Battle result already finalized")]
    ResultAlreadyFinalized,

    #[error("Speed multiplier {0} outside 0.5..=4.0")]
    InvalidSpeed(f64),

    #[error("Simulation loop cancelled")]
    Cancelled,

    #[error("Simulation loop is paused")]
    Paused,

    #[error("Submission failed after {attempts} attempts: {reason}")]
    SubmissionFailed { attempts: u32, reason: String },

    #[error("Unsupported replay version {found} (supported: {supported})")]
    UnsupportedReplayVersion { found: u32, supported: u32 },

    #[error("Replay diverged at tick {tick}: {detail}")]
    ReplayDiverged { tick: Tick, detail: String },

    #[error("Divergence detected: {0}")]
    DivergenceDetected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, BattleError>;
