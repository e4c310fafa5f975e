//! Target selection
//!
//! Candidates are scored as a weighted sum of closeness, low morale, low
//! troops and a per-archetype policy term. Candidates are visited in
//! ascending id and only a strictly better score replaces the current best,
//! so ties always go to the lowest id.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::battle::ai::profile::TargetWeights;
use crate::battle::units::{Soldier, Squad};
use crate::combat::UnitArchetype;
use crate::core::types::{SquadId, Vec2};

/// Distance at which closeness has halved
const CLOSENESS_SCALE_METERS: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPolicy {
    Nearest,
    Weakest,
    /// Prefer targets already tied up with someone else
    Flanking,
}

impl TargetPolicy {
    pub fn for_archetype(archetype: UnitArchetype) -> Self {
        match archetype {
            UnitArchetype::Infantry | UnitArchetype::Spearmen => TargetPolicy::Nearest,
            UnitArchetype::Archers => TargetPolicy::Weakest,
            UnitArchetype::Cavalry => TargetPolicy::Flanking,
        }
    }
}

/// Anything targeting can be measured from
pub trait TargetingOrigin {
    fn origin(&self) -> Vec2;
}

impl TargetingOrigin for Vec2 {
    fn origin(&self) -> Vec2 {
        *self
    }
}

impl TargetingOrigin for Squad {
    fn origin(&self) -> Vec2 {
        self.position
    }
}

impl TargetingOrigin for Soldier {
    fn origin(&self) -> Vec2 {
        self.position
    }
}

fn closeness(distance: f64) -> f64 {
    1.0 / (1.0 + distance / CLOSENESS_SCALE_METERS)
}

/// Score one candidate. Higher is more attractive.
pub fn score_target(
    origin: Vec2,
    candidate: &Squad,
    policy: TargetPolicy,
    weights: &TargetWeights,
) -> f64 {
    let near = closeness(origin.distance(&candidate.position));
    let shaken = (100.0 - candidate.morale).clamp(0.0, 100.0) / 100.0;
    let depleted = 1.0 - candidate.strength_fraction();

    let policy_term = match policy {
        TargetPolicy::Nearest => near,
        TargetPolicy::Weakest => (shaken + depleted) / 2.0,
        TargetPolicy::Flanking => {
            if candidate.engaged_with.is_some() {
                1.0
            } else {
                0.0
            }
        }
    };

    weights.distance * near
        + weights.morale * shaken
        + weights.troops * depleted
        + weights.policy_bias * policy_term
}

/// Pick the best living, non-routing candidate, or `None` if there is none
pub fn select_target<'a, O, I>(
    origin: &O,
    candidates: I,
    policy: TargetPolicy,
    weights: &TargetWeights,
) -> Option<SquadId>
where
    O: TargetingOrigin + ?Sized,
    I: IntoIterator<Item = &'a Squad>,
{
    let from = origin.origin();
    let mut valid: Vec<&Squad> = candidates.into_iter().filter(|s| s.can_fight()).collect();
    valid.sort_by_key(|s| s.id);

    let mut best: Option<(SquadId, OrderedFloat<f64>)> = None;
    for candidate in valid {
        let score = OrderedFloat(score_target(from, candidate, policy, weights));
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((candidate.id, score)),
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::units::{SquadSpec, SquadState};
    use crate::core::types::Side;

    fn enemy(id: u32, troops: u32, morale: f64, x: f64) -> Squad {
        let spec = SquadSpec::infantry(id, troops, morale, Vec2::new(x, 0.0));
        Squad::from_spec(&spec, Side::Defender, id * 1000, Vec2::new(250.0, 0.0))
    }

    #[test]
    fn test_nearest_prefers_closer() {
        let squads = vec![enemy(1, 100, 80.0, 100.0), enemy(2, 100, 80.0, 20.0)];
        let target = select_target(
            &Vec2::new(0.0, 0.0),
            &squads,
            TargetPolicy::Nearest,
            &TargetWeights::default(),
        );
        assert_eq!(target, Some(SquadId(2)));
    }

    #[test]
    fn test_weakest_prefers_shaken() {
        let mut weak = enemy(1, 100, 30.0, 100.0);
        weak.absorb_damage(5_000.0);
        let squads = vec![weak, enemy(2, 100, 90.0, 60.0)];
        let target = select_target(
            &Vec2::new(0.0, 0.0),
            &squads,
            TargetPolicy::Weakest,
            &TargetWeights::default(),
        );
        assert_eq!(target, Some(SquadId(1)));
    }

    #[test]
    fn test_flanking_prefers_engaged() {
        let mut busy = enemy(2, 100, 80.0, 30.0);
        busy.engaged_with = Some(SquadId(9));
        let squads = vec![enemy(1, 100, 80.0, 30.0), busy];
        let target = select_target(
            &Vec2::new(0.0, 0.0),
            &squads,
            TargetPolicy::Flanking,
            &TargetWeights::default(),
        );
        assert_eq!(target, Some(SquadId(2)));
    }

    #[test]
    fn test_ties_go_to_lowest_id() {
        // Mirror positions give identical scores
        let squads = vec![enemy(7, 100, 80.0, 30.0), enemy(3, 100, 80.0, -30.0)];
        let target = select_target(
            &Vec2::new(0.0, 0.0),
            &squads,
            TargetPolicy::Nearest,
            &TargetWeights::default(),
        );
        assert_eq!(target, Some(SquadId(3)));
    }

    #[test]
    fn test_routing_and_destroyed_skipped() {
        let mut routing = enemy(1, 100, 10.0, 5.0);
        routing.set_state(SquadState::Routing);
        let mut dead = enemy(2, 100, 80.0, 5.0);
        dead.set_state(SquadState::Destroyed);
        let squads = vec![routing, dead];

        let target = select_target(
            &Vec2::new(0.0, 0.0),
            &squads,
            TargetPolicy::Nearest,
            &TargetWeights::default(),
        );
        assert_eq!(target, None);
    }

    #[test]
    fn test_soldier_origin() {
        let squads = vec![enemy(1, 100, 80.0, -50.0), enemy(2, 100, 80.0, 50.0)];
        let mut soldier = squads[0].soldiers[0].clone();
        soldier.position = Vec2::new(40.0, 0.0);
        let target = select_target(
            &soldier,
            &squads,
            TargetPolicy::Nearest,
            &TargetWeights::default(),
        );
        assert_eq!(target, Some(SquadId(2)));
    }
}
