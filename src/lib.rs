//! Voxel Battle - Deterministic Squad Battle Simulation
//!
//! Layers, bottom up:
//! - `core`: ids, geometry, errors, configuration
//! - `combat`: pure combat math with an explicit seeded RNG
//! - `battle`: state store, AI, simulation loop, results
//! - `sync`: backend submission and versioned replays

pub mod battle;
pub mod combat;
pub mod core;
pub mod sync;
