//! Headless Battle Runner
//!
//! Runs AI vs AI battles and prints JSON summaries. Can also write replays,
//! verify stored replays and submit results to a backend.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use voxel_battle::battle::ai::{load_profile, AiController, AiProfile};
use voxel_battle::battle::{
    BattleResult, BattleStore, EndCondition, SimulationLoop, SquadSpec, SquadStance,
};
use voxel_battle::combat::{FormationType, UnitArchetype};
use voxel_battle::core::config::EngineConfig;
use voxel_battle::core::error::{BattleError, Result};
use voxel_battle::core::types::Vec2;
use voxel_battle::sync::{
    HttpTransport, ReplayBundle, ReplayManager, ResultSubmitter, SubmissionBundle,
};

/// Headless Battle Runner - AI vs AI battles
#[derive(Parser, Debug)]
#[command(name = "battle_runner")]
#[command(about = "Run deterministic AI vs AI battles and output JSON results")]
struct Args {
    /// Engine config (rules and submission settings)
    #[arg(long, default_value = "data/battle.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one battle to completion
    Run {
        #[arg(long, value_enum, default_value_t = Scenario::Duel)]
        scenario: Scenario,

        /// Random seed for deterministic runs
        #[arg(long)]
        seed: Option<u64>,

        /// Override the configured tick limit
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Attacker AI profile (loaded from data/ai_profiles/)
        #[arg(long, default_value = "default")]
        attacker: String,

        /// Defender AI profile (loaded from data/ai_profiles/)
        #[arg(long, default_value = "default")]
        defender: String,

        /// Write a replay bundle here
        #[arg(long)]
        replay_out: Option<PathBuf>,

        /// Submit the result to this endpoint
        #[arg(long)]
        submit: Option<String>,

        /// Run against the wall clock instead of as fast as possible
        #[arg(long)]
        realtime: bool,

        /// Playback speed for --realtime (0.5 to 4.0)
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },
    /// Verify a stored replay by re-simulating it
    Replay { path: PathBuf },
    /// Run many seeds in parallel
    Batch {
        #[arg(long, default_value_t = 16)]
        battles: u64,

        #[arg(long, value_enum, default_value_t = Scenario::Skirmish)]
        scenario: Scenario,

        /// First seed; battle i uses seed + i
        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[arg(long)]
        max_ticks: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Scenario {
    /// One large squad per side
    Duel,
    /// Three infantry squads per side
    Skirmish,
    /// Mixed arms on both sides
    Combined,
}

/// JSON output structure
#[derive(Serialize)]
struct RunSummary {
    battle_id: String,
    seed: u64,
    events: usize,
    result: BattleResult,
}

fn scenario_squads(scenario: Scenario) -> (Vec<SquadSpec>, Vec<SquadSpec>) {
    let west = Vec2::new(1.0, 0.0);
    let east = Vec2::new(-1.0, 0.0);
    match scenario {
        Scenario::Duel => (
            vec![SquadSpec::infantry(1, 500, 80.0, Vec2::new(-40.0, 0.0))],
            vec![SquadSpec::infantry(2, 400, 70.0, Vec2::new(40.0, 0.0)).facing(east)],
        ),
        Scenario::Skirmish => (
            (0..3)
                .map(|i| {
                    SquadSpec::infantry(1 + i, 120, 75.0, Vec2::new(-60.0, i as f64 * 30.0 - 30.0))
                        .facing(west)
                })
                .collect(),
            (0..3)
                .map(|i| {
                    SquadSpec::infantry(4 + i, 120, 75.0, Vec2::new(60.0, i as f64 * 30.0 - 30.0))
                        .facing(east)
                })
                .collect(),
        ),
        Scenario::Combined => (
            vec![
                SquadSpec::infantry(1, 160, 80.0, Vec2::new(-70.0, 0.0)),
                SquadSpec::infantry(2, 80, 70.0, Vec2::new(-90.0, 20.0))
                    .with_archetype(UnitArchetype::Archers)
                    .with_stance(SquadStance::Defensive),
                SquadSpec::infantry(3, 60, 85.0, Vec2::new(-70.0, -50.0))
                    .with_archetype(UnitArchetype::Cavalry)
                    .with_formation(FormationType::Wedge),
            ],
            vec![
                SquadSpec::infantry(4, 140, 75.0, Vec2::new(70.0, -20.0))
                    .with_archetype(UnitArchetype::Spearmen)
                    .facing(east),
                SquadSpec::infantry(5, 140, 75.0, Vec2::new(70.0, 20.0)).facing(east),
                SquadSpec::infantry(6, 80, 70.0, Vec2::new(95.0, 0.0))
                    .with_archetype(UnitArchetype::Archers)
                    .with_stance(SquadStance::Hold)
                    .facing(east),
            ],
        ),
    }
}

fn load_profile_or_default(name: &str) -> AiProfile {
    load_profile(name).unwrap_or_else(|e| {
        tracing::warn!(profile = name, error = %e, "Failed to load AI profile, using default");
        AiProfile::default()
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxel_battle=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = if args.config.exists() {
        EngineConfig::load(&args.config)?
    } else {
        tracing::warn!(path = ?args.config, "Config not found, using defaults");
        EngineConfig::default()
    };
    config.validate()?;

    match args.command {
        Command::Run {
            scenario,
            seed,
            max_ticks,
            attacker,
            defender,
            replay_out,
            submit,
            realtime,
            speed,
        } => {
            let seed = seed.unwrap_or_else(rand::random);
            let mut rules = config.rules.clone();
            if let Some(max_ticks) = max_ticks {
                rules.max_ticks = max_ticks;
            }

            let (attackers, defenders) = scenario_squads(scenario);
            let store = BattleStore::with_battle(rules, attackers, defenders, seed)?;
            let initial = store.snapshot()?;

            let ai = AiController::new(
                load_profile_or_default(&attacker),
                load_profile_or_default(&defender),
            );
            let mut sim = SimulationLoop::new(store, Box::new(ai))?;

            let result = if realtime {
                sim.set_speed(speed)?;
                let controls = sim.controls();
                let rt = Runtime::new()?;
                let outcome = rt.block_on(async {
                    // Ctrl-C stops the loop between ticks; the battle is then aborted
                    let watcher = tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            controls.cancel();
                        }
                    });
                    let outcome = sim.run_realtime().await;
                    watcher.abort();
                    outcome
                });
                match outcome {
                    Err(BattleError::Cancelled) => {
                        tracing::warn!("Interrupted, aborting battle");
                        sim.finalize(EndCondition::Aborted)?
                    }
                    other => other?,
                }
            } else {
                sim.run_to_completion()?
            };
            let completed = sim.snapshot()?;

            if let Some(path) = replay_out {
                ReplayBundle::capture(&initial, &completed)?.save(&path)?;
                tracing::info!(path = ?path, "Replay written");
            }

            if let Some(endpoint) = submit {
                let mut submission = config.submission.clone();
                submission.endpoint = endpoint;
                let submitter = ResultSubmitter::new(HttpTransport::new(&submission)?, submission);
                let bundle = SubmissionBundle::from_state(&completed)?;
                let rt = Runtime::new()?;
                match rt.block_on(submitter.submit(&bundle)) {
                    Ok(outcome) => {
                        if let Some(divergence) = outcome.divergence {
                            eprintln!("Warning: {}", divergence.to_error());
                        }
                    }
                    Err(e) => eprintln!("Warning: {}", e),
                }
            }

            let summary = RunSummary {
                battle_id: completed.battle_id.to_string(),
                seed,
                events: completed.events.len(),
                result,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Replay { path } => {
            let bundle = ReplayBundle::load(&path)?;
            let replayed = ReplayManager::replay(&bundle)?;
            let summary = RunSummary {
                battle_id: bundle.battle_id.to_string(),
                seed: bundle.seed,
                events: replayed.events.len(),
                result: bundle.result.clone(),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Batch {
            battles,
            scenario,
            seed,
            max_ticks,
        } => {
            let mut rules = config.rules.clone();
            if let Some(max_ticks) = max_ticks {
                rules.max_ticks = max_ticks;
            }

            let summaries: Vec<Result<RunSummary>> = (0..battles)
                .into_par_iter()
                .map(|i| {
                    let seed = seed.wrapping_add(i);
                    let (attackers, defenders) = scenario_squads(scenario);
                    let store = BattleStore::with_battle(rules.clone(), attackers, defenders, seed)?;
                    let mut sim = SimulationLoop::live(store)?;
                    let result = sim.run_to_completion()?;
                    let state = sim.snapshot()?;
                    Ok(RunSummary {
                        battle_id: state.battle_id.to_string(),
                        seed,
                        events: state.events.len(),
                        result,
                    })
                })
                .collect();

            for summary in summaries {
                println!("{}", serde_json::to_string(&summary?)?);
            }
        }
    }

    Ok(())
}
