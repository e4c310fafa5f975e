//! AI controller: turns a snapshot into one intent per living squad
//!
//! Reads only the snapshot it is handed and draws no randomness, so the same
//! snapshot always produces the same intents.

use std::collections::HashMap;

use tracing::trace;

use crate::battle::ai::behavior_tree::{ActionKind, BehaviorTree, Blackboard};
use crate::battle::ai::profile::AiProfile;
use crate::battle::ai::targeting::{select_target, TargetPolicy};
use crate::battle::ai::IntentSource;
use crate::battle::intent::Intent;
use crate::battle::state::BattleState;
use crate::battle::units::Squad;
use crate::combat::constants::CLOSE_TO_RANGE_FACTOR;
use crate::combat::UnitArchetype;
use crate::core::types::Side;

/// Radius a squad counts friends and foes in when judging local odds
pub const LOCAL_AWARENESS_METERS: f64 = 60.0;

const ARCHETYPES: [UnitArchetype; 4] = [
    UnitArchetype::Infantry,
    UnitArchetype::Spearmen,
    UnitArchetype::Archers,
    UnitArchetype::Cavalry,
];

#[derive(Debug, Clone)]
pub struct AiController {
    attacker_profile: AiProfile,
    defender_profile: AiProfile,
    trees: HashMap<(Side, UnitArchetype), BehaviorTree>,
}

impl Default for AiController {
    fn default() -> Self {
        Self::new(AiProfile::default(), AiProfile::default())
    }
}

impl AiController {
    pub fn new(attacker_profile: AiProfile, defender_profile: AiProfile) -> Self {
        let mut trees = HashMap::new();
        for (side, profile) in [
            (Side::Attacker, &attacker_profile),
            (Side::Defender, &defender_profile),
        ] {
            for archetype in ARCHETYPES {
                trees.insert(
                    (side, archetype),
                    BehaviorTree::for_archetype(archetype, &profile.engagement),
                );
            }
        }

        Self {
            attacker_profile,
            defender_profile,
            trees,
        }
    }

    pub fn profile(&self, side: Side) -> &AiProfile {
        match side {
            Side::Attacker => &self.attacker_profile,
            Side::Defender => &self.defender_profile,
        }
    }

    /// One intent per living squad, ascending squad id
    pub fn tick(&self, state: &BattleState) -> Vec<Intent> {
        state
            .squads()
            .into_iter()
            .filter(|s| s.is_alive())
            .map(|squad| self.decide_for(state, squad))
            .collect()
    }

    /// Decide what a single squad does this tick
    pub fn decide_for(&self, state: &BattleState, squad: &Squad) -> Intent {
        // Broken squads skip the tree entirely
        if squad.is_routing() || squad.morale < state.rules.rout_threshold {
            return Intent::Retreat { squad: squad.id };
        }

        let profile = self.profile(squad.side);
        let enemies = &state.force(squad.side.opponent()).squads;
        let target_id = select_target(
            squad,
            enemies,
            TargetPolicy::for_archetype(squad.archetype),
            &profile.weights,
        );
        let target = target_id.and_then(|id| state.squad(id));

        let (nearby_friends, nearby_enemies) = local_odds(state, squad);
        let board = Blackboard {
            squad,
            target,
            nearby_enemies,
            nearby_friends,
        };

        let action = self
            .trees
            .get(&(squad.side, squad.archetype))
            .map(|tree| tree.decide(&board))
            .unwrap_or(ActionKind::Hold);

        trace!(squad = %squad.id, ?action, target = ?target_id, "AI decision");

        match (action, target) {
            (ActionKind::AttackTarget, Some(target)) => Intent::AttackTarget {
                squad: squad.id,
                target: target.id,
            },
            (ActionKind::AdvanceOnTarget, Some(target)) => Intent::MoveTo {
                squad: squad.id,
                destination: approach_point(squad, target),
            },
            (ActionKind::Retreat, _) => Intent::Retreat { squad: squad.id },
            _ => Intent::Hold { squad: squad.id },
        }
    }
}

impl IntentSource for AiController {
    fn intents_for_tick(&mut self, snapshot: &BattleState) -> Vec<Intent> {
        self.tick(snapshot)
    }

    fn name(&self) -> &str {
        "ai"
    }
}

/// Point just inside attack range on the line towards the target
fn approach_point(squad: &Squad, target: &Squad) -> crate::core::types::Vec2 {
    let range = squad.archetype.properties().attack_range * CLOSE_TO_RANGE_FACTOR;
    let direction = (target.position - squad.position).normalize();
    target.position - direction * range
}

/// (friendly, enemy) living troops within awareness radius of a squad
fn local_odds(state: &BattleState, squad: &Squad) -> (u32, u32) {
    let mut friends = 0;
    let mut enemies = 0;
    for other in state.squads() {
        if !other.can_fight()
            || other.position.distance(&squad.position) > LOCAL_AWARENESS_METERS
        {
            continue;
        }
        if other.side == squad.side {
            friends += other.troops;
        } else {
            enemies += other.troops;
        }
    }
    (friends, enemies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::units::{SquadSpec, SquadStance};
    use crate::battle::BattleStore;
    use crate::core::config::BattleRules;
    use crate::core::types::{SquadId, Vec2};

    fn state(attackers: Vec<SquadSpec>, defenders: Vec<SquadSpec>) -> BattleState {
        BattleStore::with_battle(BattleRules::default(), attackers, defenders, 3)
            .unwrap()
            .state()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_one_intent_per_living_squad_in_id_order() {
        let s = state(
            vec![
                SquadSpec::infantry(4, 100, 80.0, Vec2::new(-50.0, 0.0)),
                SquadSpec::infantry(1, 100, 80.0, Vec2::new(-50.0, 30.0)),
            ],
            vec![SquadSpec::infantry(2, 100, 80.0, Vec2::new(50.0, 0.0))],
        );
        let intents = AiController::default().tick(&s);
        let order: Vec<SquadId> = intents.iter().map(|i| i.squad()).collect();
        assert_eq!(order, vec![SquadId(1), SquadId(2), SquadId(4)]);
    }

    #[test]
    fn test_far_target_gets_move_to_approach_point() {
        let s = state(
            vec![SquadSpec::infantry(1, 100, 80.0, Vec2::new(-50.0, 0.0))],
            vec![SquadSpec::infantry(2, 100, 80.0, Vec2::new(50.0, 0.0))],
        );
        let intent = AiController::default().decide_for(&s, s.squad(SquadId(1)).unwrap());
        match intent {
            Intent::MoveTo { destination, .. } => {
                assert!((destination.x - (50.0 - 4.8)).abs() < 1e-9);
                assert_eq!(destination.y, 0.0);
            }
            other => panic!("expected MoveTo, got {:?}", other),
        }
    }

    #[test]
    fn test_in_range_attacks() {
        let s = state(
            vec![SquadSpec::infantry(1, 100, 80.0, Vec2::new(0.0, 0.0))],
            vec![SquadSpec::infantry(2, 100, 80.0, Vec2::new(5.0, 0.0))],
        );
        let intent = AiController::default().decide_for(&s, s.squad(SquadId(1)).unwrap());
        assert_eq!(
            intent,
            Intent::AttackTarget {
                squad: SquadId(1),
                target: SquadId(2)
            }
        );
    }

    #[test]
    fn test_low_morale_overrides_tree() {
        let s = state(
            vec![SquadSpec::infantry(1, 100, 10.0, Vec2::new(0.0, 0.0))],
            vec![SquadSpec::infantry(2, 100, 80.0, Vec2::new(5.0, 0.0))],
        );
        let intent = AiController::default().decide_for(&s, s.squad(SquadId(1)).unwrap());
        assert_eq!(intent, Intent::Retreat { squad: SquadId(1) });
    }

    #[test]
    fn test_hold_stance_without_reachable_target() {
        let s = state(
            vec![SquadSpec::infantry(1, 100, 80.0, Vec2::new(-100.0, 0.0))
                .with_stance(SquadStance::Hold)],
            vec![SquadSpec::infantry(2, 100, 80.0, Vec2::new(100.0, 0.0))],
        );
        let intent = AiController::default().decide_for(&s, s.squad(SquadId(1)).unwrap());
        assert_eq!(intent, Intent::Hold { squad: SquadId(1) });
    }

    #[test]
    fn test_same_snapshot_same_intents() {
        let s = state(
            vec![
                SquadSpec::infantry(1, 100, 80.0, Vec2::new(-20.0, 0.0)),
                SquadSpec::infantry(3, 60, 50.0, Vec2::new(-20.0, 15.0)),
            ],
            vec![
                SquadSpec::infantry(2, 100, 80.0, Vec2::new(20.0, 0.0)),
                SquadSpec::infantry(4, 80, 60.0, Vec2::new(20.0, 15.0)),
            ],
        );
        let ai = AiController::default();
        assert_eq!(ai.tick(&s), ai.tick(&s));
    }
}
