//! Behaviour trees for squad decisions
//!
//! Conditions read a `Blackboard` built from the snapshot; actions name what
//! the squad should do. Evaluation is pure, so the same snapshot always
//! yields the same action.

use crate::battle::ai::profile::EngagementConfig;
use crate::battle::units::{Squad, SquadStance};
use crate::combat::UnitArchetype;

/// Archers pull back once melee troops are this close
const ARCHER_CONTACT_METERS: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    HasTarget,
    /// Target is within the squad's attack range
    TargetInRange,
    TargetWithin(f64),
    StanceIs(SquadStance),
    /// Troop fraction strictly below the value
    TroopsBelow(f64),
    /// Local enemy:friendly ratio at least the value
    Outnumbered(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    AttackTarget,
    AdvanceOnTarget,
    Hold,
    Retreat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorNode {
    /// First child that succeeds wins
    Selector(Vec<BehaviorNode>),
    /// Every child must succeed
    Sequence(Vec<BehaviorNode>),
    Invert(Box<BehaviorNode>),
    Condition(Condition),
    Action(ActionKind),
}

/// What a node reports back to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Failure,
    Success(Option<ActionKind>),
}

/// Facts about one squad's situation, read by conditions
#[derive(Debug, Clone, Copy)]
pub struct Blackboard<'a> {
    pub squad: &'a Squad,
    pub target: Option<&'a Squad>,
    /// Living enemy troops near the squad
    pub nearby_enemies: u32,
    /// Living friendly troops near the squad, including its own
    pub nearby_friends: u32,
}

impl Blackboard<'_> {
    fn target_distance(&self) -> Option<f64> {
        self.target
            .map(|t| self.squad.position.distance(&t.position))
    }

    fn check(&self, condition: &Condition) -> bool {
        match *condition {
            Condition::HasTarget => self.target.is_some(),
            Condition::TargetInRange => self
                .target_distance()
                .is_some_and(|d| d <= self.squad.archetype.properties().attack_range),
            Condition::TargetWithin(meters) => self.target_distance().is_some_and(|d| d <= meters),
            Condition::StanceIs(stance) => self.squad.stance == stance,
            Condition::TroopsBelow(fraction) => self.squad.strength_fraction() < fraction,
            Condition::Outnumbered(ratio) => {
                if self.nearby_friends == 0 {
                    return self.nearby_enemies > 0;
                }
                self.nearby_enemies as f64 / self.nearby_friends as f64 >= ratio
            }
        }
    }
}

impl BehaviorNode {
    pub fn evaluate(&self, board: &Blackboard) -> NodeStatus {
        match self {
            BehaviorNode::Selector(children) => children
                .iter()
                .map(|child| child.evaluate(board))
                .find(|status| *status != NodeStatus::Failure)
                .unwrap_or(NodeStatus::Failure),
            BehaviorNode::Sequence(children) => {
                let mut chosen = None;
                for child in children {
                    match child.evaluate(board) {
                        NodeStatus::Failure => return NodeStatus::Failure,
                        NodeStatus::Success(Some(action)) => chosen = Some(action),
                        NodeStatus::Success(None) => {}
                    }
                }
                NodeStatus::Success(chosen)
            }
            BehaviorNode::Invert(child) => match child.evaluate(board) {
                NodeStatus::Failure => NodeStatus::Success(None),
                NodeStatus::Success(_) => NodeStatus::Failure,
            },
            BehaviorNode::Condition(condition) => {
                if board.check(condition) {
                    NodeStatus::Success(None)
                } else {
                    NodeStatus::Failure
                }
            }
            BehaviorNode::Action(action) => NodeStatus::Success(Some(*action)),
        }
    }
}

fn cond(c: Condition) -> BehaviorNode {
    BehaviorNode::Condition(c)
}

fn act(a: ActionKind) -> BehaviorNode {
    BehaviorNode::Action(a)
}

fn seq(children: Vec<BehaviorNode>) -> BehaviorNode {
    BehaviorNode::Sequence(children)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorTree {
    pub root: BehaviorNode,
}

impl BehaviorTree {
    pub fn new(root: BehaviorNode) -> Self {
        Self { root }
    }

    /// Standard tree for an archetype, tuned by the profile's engagement rules
    pub fn for_archetype(archetype: UnitArchetype, engagement: &EngagementConfig) -> Self {
        let withdraw = match archetype {
            // Hit and run: pull out as soon as the squad is spent
            UnitArchetype::Cavalry => seq(vec![
                cond(Condition::TroopsBelow(engagement.withdraw_troop_fraction)),
                act(ActionKind::Retreat),
            ]),
            // Skirmishers give ground when caught in melee by superior numbers
            UnitArchetype::Archers => BehaviorNode::Selector(vec![
                seq(vec![
                    cond(Condition::HasTarget),
                    cond(Condition::TargetWithin(ARCHER_CONTACT_METERS)),
                    cond(Condition::Outnumbered(engagement.outnumbered_ratio)),
                    act(ActionKind::Retreat),
                ]),
                seq(vec![
                    cond(Condition::TroopsBelow(engagement.withdraw_troop_fraction)),
                    cond(Condition::Outnumbered(engagement.outnumbered_ratio)),
                    act(ActionKind::Retreat),
                ]),
            ]),
            UnitArchetype::Infantry | UnitArchetype::Spearmen => seq(vec![
                cond(Condition::TroopsBelow(engagement.withdraw_troop_fraction)),
                cond(Condition::Outnumbered(engagement.outnumbered_ratio)),
                act(ActionKind::Retreat),
            ]),
        };

        let strike = seq(vec![
            cond(Condition::HasTarget),
            cond(Condition::TargetInRange),
            act(ActionKind::AttackTarget),
        ]);

        let root = BehaviorNode::Selector(vec![
            withdraw,
            // Hold stance: fight what reaches us, never move
            seq(vec![
                cond(Condition::StanceIs(SquadStance::Hold)),
                BehaviorNode::Selector(vec![strike.clone(), act(ActionKind::Hold)]),
            ]),
            // Defensive stance: only engage inside the defensive radius
            seq(vec![
                cond(Condition::StanceIs(SquadStance::Defensive)),
                BehaviorNode::Selector(vec![
                    seq(vec![
                        cond(Condition::HasTarget),
                        cond(Condition::TargetWithin(engagement.defensive_radius)),
                        act(ActionKind::AttackTarget),
                    ]),
                    act(ActionKind::Hold),
                ]),
            ]),
            strike,
            seq(vec![
                cond(Condition::HasTarget),
                act(ActionKind::AdvanceOnTarget),
            ]),
            act(ActionKind::Hold),
        ]);

        Self::new(root)
    }

    /// Evaluate the tree; a tree that fails or names no action holds
    pub fn decide(&self, board: &Blackboard) -> ActionKind {
        match self.root.evaluate(board) {
            NodeStatus::Success(Some(action)) => action,
            _ => ActionKind::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::units::SquadSpec;
    use crate::core::types::{Side, Vec2};

    fn squad(id: u32, x: f64, stance: SquadStance) -> Squad {
        let spec = SquadSpec::infantry(id, 100, 80.0, Vec2::new(x, 0.0)).with_stance(stance);
        Squad::from_spec(&spec, Side::Attacker, id * 1000, Vec2::new(-250.0, 0.0))
    }

    fn board<'a>(me: &'a Squad, target: Option<&'a Squad>) -> Blackboard<'a> {
        Blackboard {
            squad: me,
            target,
            nearby_enemies: 100,
            nearby_friends: 100,
        }
    }

    fn tree() -> BehaviorTree {
        BehaviorTree::for_archetype(UnitArchetype::Infantry, &EngagementConfig::default())
    }

    #[test]
    fn test_aggressive_attacks_in_range_and_advances_otherwise() {
        let me = squad(1, 0.0, SquadStance::Aggressive);
        let near = squad(2, 5.0, SquadStance::Aggressive);
        let far = squad(3, 100.0, SquadStance::Aggressive);

        assert_eq!(tree().decide(&board(&me, Some(&near))), ActionKind::AttackTarget);
        assert_eq!(tree().decide(&board(&me, Some(&far))), ActionKind::AdvanceOnTarget);
        assert_eq!(tree().decide(&board(&me, None)), ActionKind::Hold);
    }

    #[test]
    fn test_hold_stance_never_advances() {
        let me = squad(1, 0.0, SquadStance::Hold);
        let far = squad(2, 100.0, SquadStance::Aggressive);
        let near = squad(3, 5.0, SquadStance::Aggressive);
        assert_eq!(tree().decide(&board(&me, Some(&far))), ActionKind::Hold);
        assert_eq!(tree().decide(&board(&me, Some(&near))), ActionKind::AttackTarget);
    }

    #[test]
    fn test_defensive_engages_inside_radius() {
        let me = squad(1, 0.0, SquadStance::Defensive);
        let inside = squad(2, 30.0, SquadStance::Aggressive);
        let outside = squad(3, 80.0, SquadStance::Aggressive);
        assert_eq!(tree().decide(&board(&me, Some(&inside))), ActionKind::AttackTarget);
        assert_eq!(tree().decide(&board(&me, Some(&outside))), ActionKind::Hold);
    }

    #[test]
    fn test_spent_and_outnumbered_withdraws() {
        let mut me = squad(1, 0.0, SquadStance::Aggressive);
        me.absorb_damage(9_000.0); // 10 of 100 left
        let enemy = squad(2, 5.0, SquadStance::Aggressive);
        let mut situation = board(&me, Some(&enemy));
        situation.nearby_friends = 10;
        situation.nearby_enemies = 100;
        assert_eq!(tree().decide(&situation), ActionKind::Retreat);

        // Not outnumbered: keeps fighting
        situation.nearby_enemies = 10;
        assert_eq!(tree().decide(&situation), ActionKind::AttackTarget);
    }

    #[test]
    fn test_invert_and_empty_selector() {
        let me = squad(1, 0.0, SquadStance::Aggressive);
        let b = board(&me, None);
        let inverted = BehaviorNode::Invert(Box::new(cond(Condition::HasTarget)));
        assert_eq!(inverted.evaluate(&b), NodeStatus::Success(None));
        assert_eq!(BehaviorNode::Selector(vec![]).evaluate(&b), NodeStatus::Failure);
        assert_eq!(BehaviorTree::new(inverted).decide(&b), ActionKind::Hold);
    }
}
