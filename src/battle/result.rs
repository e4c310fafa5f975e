//! Battle result: winner, casualties, MVP and rewards
//!
//! `finalize_battle` is a pure fold over the event log plus the initial
//! roster. Running it twice on the same state gives identical results.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::battle::events::BattleEventKind;
use crate::battle::state::BattleState;
use crate::core::types::{Side, SquadId, Tick};

/// Surviving fractions closer than this are a draw
const DRAW_MARGIN: f64 = 0.05;

// Reward weights
const XP_PER_KILL: u32 = 2;
const XP_TICKS_PER_POINT: u64 = 10;
const XP_VICTORY_BONUS: u32 = 50;
const XP_DRAW_BONUS: u32 = 20;
const GOLD_PER_KILL: u32 = 1;
const GOLD_VICTORY: u32 = 100;
const GOLD_DRAW: u32 = 30;
const GOLD_DEFEAT: u32 = 10;

/// Why combat ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndCondition {
    /// `side` has no living squads left
    ForceEliminated { side: Side },
    /// `side`'s aggregate morale fell under the collapse threshold
    MoraleCollapse { side: Side },
    TimeLimit,
    /// Stopped from outside
    Aborted,
    /// Both sides eliminated or collapsed on the same tick
    MutualDestruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Attacker,
    Defender,
    Draw,
}

impl From<Side> for Winner {
    fn from(side: Side) -> Self {
        match side {
            Side::Attacker => Winner::Attacker,
            Side::Defender => Winner::Defender,
        }
    }
}

/// Standout squad of the battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MvpRecord {
    pub squad: SquadId,
    pub side: Side,
    pub damage_dealt: f64,
    pub damage_taken: f64,
}

impl MvpRecord {
    pub fn score(&self) -> f64 {
        self.damage_dealt - self.damage_taken
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideRewards {
    pub experience: u32,
    pub gold: u32,
}

/// What each side takes home
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPayload {
    pub attacker: SideRewards,
    pub defender: SideRewards,
}

/// Terminal battle summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleResult {
    pub winner: Winner,
    pub end_condition: EndCondition,
    pub attacker_casualties: u32,
    pub defender_casualties: u32,
    pub surviving_attackers: u32,
    pub surviving_defenders: u32,
    pub duration_ticks: Tick,
    pub mvp: Option<MvpRecord>,
    pub rewards: RewardPayload,
}

impl BattleResult {
    pub fn casualties(&self, side: Side) -> u32 {
        match side {
            Side::Attacker => self.attacker_casualties,
            Side::Defender => self.defender_casualties,
        }
    }
}

/// Decide the winner from how combat ended and what is left standing
pub fn determine_winner(
    end_condition: EndCondition,
    attacker_fraction: f64,
    defender_fraction: f64,
) -> Winner {
    match end_condition {
        EndCondition::ForceEliminated { side } | EndCondition::MoraleCollapse { side } => {
            side.opponent().into()
        }
        EndCondition::MutualDestruction => Winner::Draw,
        EndCondition::TimeLimit | EndCondition::Aborted => {
            let diff = attacker_fraction - defender_fraction;
            if diff.abs() <= DRAW_MARGIN {
                Winner::Draw
            } else if diff > 0.0 {
                Winner::Attacker
            } else {
                Winner::Defender
            }
        }
    }
}

/// Rewards for one side
pub fn side_rewards(kills: u32, duration: Tick, winner: Winner, side: Side) -> SideRewards {
    let won = winner == Winner::from(side);
    let draw = winner == Winner::Draw;

    let outcome_xp = if won {
        XP_VICTORY_BONUS
    } else if draw {
        XP_DRAW_BONUS
    } else {
        0
    };
    let gold_base = if won {
        GOLD_VICTORY
    } else if draw {
        GOLD_DRAW
    } else {
        GOLD_DEFEAT
    };

    let duration_xp = u32::try_from(duration / XP_TICKS_PER_POINT).unwrap_or(u32::MAX);

    SideRewards {
        experience: kills
            .saturating_mul(XP_PER_KILL)
            .saturating_add(duration_xp)
            .saturating_add(outcome_xp),
        gold: kills.saturating_mul(GOLD_PER_KILL).saturating_add(gold_base),
    }
}

fn fraction(surviving: u32, initial: u32) -> f64 {
    if initial == 0 {
        0.0
    } else {
        surviving as f64 / initial as f64
    }
}

/// Aggregate the terminal result from the event log and initial roster
pub fn finalize_battle(state: &BattleState, end_condition: EndCondition) -> BattleResult {
    let mut attacker_casualties = 0u32;
    let mut defender_casualties = 0u32;
    let mut dealt: BTreeMap<SquadId, f64> = BTreeMap::new();
    let mut taken: BTreeMap<SquadId, f64> = BTreeMap::new();
    let mut destroyed: BTreeSet<SquadId> = BTreeSet::new();
    let mut duration: Tick = 0;

    for event in &state.events {
        duration = duration.max(event.tick);
        match &event.kind {
            BattleEventKind::Attack { damage, .. } => {
                if let Some(source) = event.source_id {
                    *dealt.entry(source).or_default() += damage;
                }
            }
            BattleEventKind::Damage {
                side,
                amount,
                casualties,
                ..
            } => {
                match side {
                    Side::Attacker => attacker_casualties += casualties,
                    Side::Defender => defender_casualties += casualties,
                }
                if let Some(target) = event.target_id {
                    *taken.entry(target).or_default() += amount;
                }
            }
            BattleEventKind::SquadDestroyed { .. } => {
                if let Some(source) = event.source_id {
                    destroyed.insert(source);
                }
            }
            _ => {}
        }
    }

    let attacker_initial = state.attacker.initial_troops;
    let defender_initial = state.defender.initial_troops;
    let surviving_attackers = attacker_initial.saturating_sub(attacker_casualties);
    let surviving_defenders = defender_initial.saturating_sub(defender_casualties);

    let winner = determine_winner(
        end_condition,
        fraction(surviving_attackers, attacker_initial),
        fraction(surviving_defenders, defender_initial),
    );

    // Ascending id with a strict comparison: ties keep the lowest id
    let mut mvp: Option<MvpRecord> = None;
    for squad in state.squads() {
        if destroyed.contains(&squad.id) {
            continue;
        }
        let candidate = MvpRecord {
            squad: squad.id,
            side: squad.side,
            damage_dealt: dealt.get(&squad.id).copied().unwrap_or(0.0),
            damage_taken: taken.get(&squad.id).copied().unwrap_or(0.0),
        };
        if mvp
            .as_ref()
            .map_or(true, |best| candidate.score() > best.score())
        {
            mvp = Some(candidate);
        }
    }

    let rewards = RewardPayload {
        attacker: side_rewards(defender_casualties, duration, winner, Side::Attacker),
        defender: side_rewards(attacker_casualties, duration, winner, Side::Defender),
    };

    BattleResult {
        winner,
        end_condition,
        attacker_casualties,
        defender_casualties,
        surviving_attackers,
        surviving_defenders,
        duration_ticks: duration,
        mvp,
        rewards,
    }
}
