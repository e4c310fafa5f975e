//! Versioned replay bundles and deterministic playback
//!
//! A replay stores the untouched pre-battle state, the seed and the event
//! log. Playback rebuilds each tick's intents from the log's move and attack
//! events and re-runs the same store and loop, so the regenerated log must
//! match the stored one exactly.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::battle::ai::IntentSource;
use crate::battle::events::{BattleEvent, BattleEventKind, MoveReason};
use crate::battle::intent::Intent;
use crate::battle::result::{BattleResult, EndCondition};
use crate::battle::simulation::SimulationLoop;
use crate::battle::state::{BattlePhase, BattleSnapshot, BattleState, BattleStore};
use crate::core::config::BattleRules;
use crate::core::error::{BattleError, Result};
use crate::core::types::{BattleId, Tick};

/// Bump whenever combat math or event shapes change
pub const REPLAY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayBundle {
    pub version: u32,
    pub battle_id: BattleId,
    pub seed: u64,
    pub rules: BattleRules,
    pub initial_snapshot: BattleState,
    pub event_log: Vec<BattleEvent>,
    pub result: BattleResult,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

impl ReplayBundle {
    /// Package a finished battle with the state it started from
    pub fn capture(initial: &BattleState, completed: &BattleState) -> Result<Self> {
        let result = match (&completed.result, completed.phase) {
            (Some(result), BattlePhase::Completed) => result.clone(),
            _ => {
                return Err(BattleError::WrongPhase {
                    expected: BattlePhase::Completed,
                    actual: completed.phase,
                })
            }
        };
        if initial.phase != BattlePhase::Preparation || initial.battle_id != completed.battle_id {
            return Err(BattleError::ReplayDiverged {
                tick: 0,
                detail: "initial snapshot does not belong to this battle".into(),
            });
        }

        Ok(Self {
            version: REPLAY_FORMAT_VERSION,
            battle_id: completed.battle_id,
            seed: completed.seed,
            rules: completed.rules.clone(),
            initial_snapshot: initial.clone(),
            event_log: completed.events.clone(),
            result,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored replay, checking the format version before the body
    pub fn from_json(text: &str) -> Result<Self> {
        let header: VersionHeader = serde_json::from_str(text)?;
        if header.version != REPLAY_FORMAT_VERSION {
            return Err(BattleError::UnsupportedReplayVersion {
                found: header.version,
                supported: REPLAY_FORMAT_VERSION,
            });
        }
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Last tick any event was recorded at
    pub fn final_tick(&self) -> Tick {
        self.event_log.iter().map(|e| e.tick).max().unwrap_or(0)
    }
}

/// Intents recovered from an event log, keyed by tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedIntents {
    by_tick: BTreeMap<Tick, Vec<Intent>>,
}

impl RecordedIntents {
    /// Rebuild intents from primary (move / attack) events
    pub fn from_events(events: &[BattleEvent]) -> Self {
        let mut by_tick: BTreeMap<Tick, Vec<Intent>> = BTreeMap::new();

        for event in events.iter().filter(|e| e.is_primary()) {
            let Some(squad) = event.source_id else {
                continue;
            };
            let intent = match (&event.kind, event.target_id) {
                (
                    BattleEventKind::Move {
                        reason: MoveReason::Advance { destination },
                        ..
                    },
                    _,
                ) => Intent::MoveTo {
                    squad,
                    destination: *destination,
                },
                (
                    BattleEventKind::Move {
                        reason: MoveReason::Retreat,
                        ..
                    },
                    _,
                ) => Intent::Retreat { squad },
                (
                    BattleEventKind::Move {
                        reason: MoveReason::Close,
                        ..
                    },
                    Some(target),
                )
                | (BattleEventKind::Attack { .. }, Some(target)) => {
                    Intent::AttackTarget { squad, target }
                }
                _ => {
                    warn!(tick = event.tick, kind = ?event.kind, "Primary event without a target");
                    continue;
                }
            };
            by_tick.entry(event.tick).or_default().push(intent);
        }

        Self { by_tick }
    }

    pub fn intents_at(&self, tick: Tick) -> &[Intent] {
        self.by_tick.get(&tick).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_tick.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tick.is_empty()
    }
}

impl IntentSource for RecordedIntents {
    fn intents_for_tick(&mut self, snapshot: &BattleState) -> Vec<Intent> {
        self.intents_at(snapshot.tick + 1).to_vec()
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Rebuilds battles from replay bundles
pub struct ReplayManager;

impl ReplayManager {
    fn replay_loop(bundle: &ReplayBundle) -> Result<SimulationLoop> {
        if bundle.seed != bundle.initial_snapshot.seed {
            return Err(BattleError::ReplayDiverged {
                tick: 0,
                detail: format!(
                    "bundle seed {} does not match snapshot seed {}",
                    bundle.seed, bundle.initial_snapshot.seed
                ),
            });
        }
        let store = BattleStore::restore(bundle.initial_snapshot.clone())?;
        let source = RecordedIntents::from_events(&bundle.event_log);
        debug!(intents = source.len(), "Recovered intents from event log");
        SimulationLoop::new(store, Box::new(source))
    }

    /// Replay the whole battle and return its final state
    ///
    /// Fails with `ReplayDiverged` if any regenerated event or the result
    /// differs from what the bundle recorded.
    pub fn replay(bundle: &ReplayBundle) -> Result<BattleState> {
        let mut sim = Self::replay_loop(bundle)?;
        let final_tick = bundle.final_tick();

        sim.start()?;
        while !sim.is_completed() && sim.snapshot()?.tick < final_tick {
            sim.step()?;
        }
        if !sim.is_completed() {
            // Stopped from outside in the original run
            if bundle.result.end_condition != EndCondition::Aborted {
                return Err(BattleError::ReplayDiverged {
                    tick: sim.snapshot()?.tick,
                    detail: "battle did not end where the recording ended".into(),
                });
            }
            sim.finalize(EndCondition::Aborted)?;
        }

        let state = sim.snapshot()?;
        Self::compare(bundle, &state)?;
        info!(
            battle = %bundle.battle_id,
            events = state.events.len(),
            "Replay verified"
        );
        Ok(BattleState::clone(&state))
    }

    /// Replay up to (and including) `tick` and return the snapshot there
    pub fn reconstruct_at(bundle: &ReplayBundle, tick: Tick) -> Result<BattleSnapshot> {
        let mut sim = Self::replay_loop(bundle)?;
        sim.start()?;
        while !sim.is_completed() && sim.snapshot()?.tick < tick {
            sim.step()?;
        }
        sim.snapshot()
    }

    fn compare(bundle: &ReplayBundle, replayed: &BattleState) -> Result<()> {
        let recorded = &bundle.event_log;
        let regenerated = &replayed.events;

        if let Some((index, (want, got))) = recorded
            .iter()
            .zip(regenerated.iter())
            .enumerate()
            .find(|(_, (want, got))| want != got)
        {
            return Err(BattleError::ReplayDiverged {
                tick: want.tick,
                detail: format!(
                    "event {} differs: recorded {} vs replayed {}",
                    index,
                    want.type_name(),
                    got.type_name()
                ),
            });
        }

        if recorded.len() != regenerated.len() {
            return Err(BattleError::ReplayDiverged {
                tick: replayed.tick,
                detail: format!(
                    "recorded {} events, replay produced {}",
                    recorded.len(),
                    regenerated.len()
                ),
            });
        }

        if replayed.result.as_ref() != Some(&bundle.result) {
            return Err(BattleError::ReplayDiverged {
                tick: replayed.tick,
                detail: "result differs".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::units::SquadSpec;
    use crate::core::types::{SquadId, Vec2};

    fn played() -> (BattleState, BattleState) {
        let rules = BattleRules {
            max_ticks: 60,
            ..BattleRules::default()
        };
        let store = BattleStore::with_battle(
            rules,
            vec![SquadSpec::infantry(1, 80, 80.0, Vec2::new(-12.0, 0.0))],
            vec![SquadSpec::infantry(2, 80, 75.0, Vec2::new(12.0, 0.0))],
            9,
        )
        .unwrap();
        let initial = store.state().unwrap().clone();
        let mut sim = SimulationLoop::live(store).unwrap();
        sim.run_to_completion().unwrap();
        let completed = sim.store().state().unwrap().clone();
        (initial, completed)
    }

    #[test]
    fn test_recorded_intents_from_events() {
        let events = vec![
            BattleEvent::new(
                1,
                Some(SquadId(1)),
                None,
                BattleEventKind::Move {
                    from: Vec2::new(0.0, 0.0),
                    to: Vec2::new(3.0, 0.0),
                    reason: MoveReason::Advance {
                        destination: Vec2::new(9.0, 0.0),
                    },
                },
            ),
            BattleEvent::new(
                1,
                Some(SquadId(2)),
                Some(SquadId(1)),
                BattleEventKind::Move {
                    from: Vec2::new(20.0, 0.0),
                    to: Vec2::new(17.0, 0.0),
                    reason: MoveReason::Close,
                },
            ),
            BattleEvent::new(
                2,
                Some(SquadId(1)),
                Some(SquadId(2)),
                BattleEventKind::Attack {
                    damage: 10.0,
                    is_critical: false,
                    is_evaded: false,
                    flanking: false,
                },
            ),
        ];

        let recorded = RecordedIntents::from_events(&events);
        assert_eq!(recorded.len(), 3);
        assert_eq!(
            recorded.intents_at(1),
            &[
                Intent::MoveTo {
                    squad: SquadId(1),
                    destination: Vec2::new(9.0, 0.0)
                },
                Intent::AttackTarget {
                    squad: SquadId(2),
                    target: SquadId(1)
                },
            ]
        );
        assert_eq!(recorded.intents_at(3), &[] as &[Intent]);
    }

    #[test]
    fn test_replay_matches_original() {
        let (initial, completed) = played();
        let bundle = ReplayBundle::capture(&initial, &completed).unwrap();
        let replayed = ReplayManager::replay(&bundle).unwrap();
        assert_eq!(replayed.events, completed.events);
        assert_eq!(replayed.result, completed.result);
    }

    #[test]
    fn test_version_checked_before_body() {
        let text = r#"{"version": 99, "garbage": true}"#;
        assert!(matches!(
            ReplayBundle::from_json(text),
            Err(BattleError::UnsupportedReplayVersion {
                found: 99,
                supported: 1
            })
        ));
    }

    #[test]
    fn test_tampered_log_diverges() {
        let (initial, completed) = played();
        let mut bundle = ReplayBundle::capture(&initial, &completed).unwrap();
        let damage = bundle
            .event_log
            .iter_mut()
            .find_map(|e| match &mut e.kind {
                BattleEventKind::Damage { amount, .. } => Some(amount),
                _ => None,
            })
            .expect("battle had damage");
        *damage += 1.0;

        assert!(matches!(
            ReplayManager::replay(&bundle),
            Err(BattleError::ReplayDiverged { .. })
        ));
    }

    #[test]
    fn test_capture_requires_completed_battle() {
        let (initial, _) = played();
        assert!(ReplayBundle::capture(&initial, &initial).is_err());
    }

    #[test]
    fn test_reconstruct_at_tick() {
        let (initial, completed) = played();
        let bundle = ReplayBundle::capture(&initial, &completed).unwrap();
        let mid = ReplayManager::reconstruct_at(&bundle, 3).unwrap();
        assert_eq!(mid.tick, 3);
        assert_eq!(mid.phase, BattlePhase::Combat);
    }
}
