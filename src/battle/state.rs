//! Battle state and the store that owns it
//!
//! The store is the single writer. Everyone else sees `BattleSnapshot`s:
//! shared, immutable `Arc`s. Mutation goes through `Arc::make_mut`, so a
//! snapshot somebody is still holding is never changed underneath them.
//!
//! Each `apply_intents` call is one tick:
//! reset -> intents (move / attack -> damage -> morale -> destroyed/routed) -> upkeep

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::battle::events::{BattleEvent, BattleEventKind, MoraleCause, MoveReason};
use crate::battle::intent::Intent;
use crate::battle::result::{BattleResult, EndCondition};
use crate::battle::units::{Force, Squad, SquadSpec, SquadState};
use crate::combat::constants::{CLOSE_TO_RANGE_FACTOR, ROUT_CONTAGION_RADIUS, ROUT_SPEED_BONUS};
use crate::combat::morale::{
    casualty_morale_loss, clamp_morale, contagion_morale_loss, idle_recovery, shock_morale_loss,
    should_rout,
};
use crate::combat::{resolve_attack, BattleRng, CombatContext, CombatProfile, FormationModifiers};
use crate::core::config::{BattleRules, MAX_SPEED, MIN_SPEED};
use crate::core::error::{BattleError, InitializationError, Result};
use crate::core::types::{BattleId, Side, SquadId, Tick, Vec2};

/// Battle lifecycle
///
/// `preparation -[start]-> combat -[end condition]-> resolution -[result]-> completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattlePhase {
    #[default]
    Preparation,
    Combat,
    Resolution,
    Completed,
}

/// Running counters, for diagnostics only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleStats {
    pub intents_applied: u64,
    pub intents_discarded: u64,
    pub attacks: u64,
    pub evasions: u64,
    pub criticals: u64,
    pub soldiers_killed: u64,
}

/// Complete battle state (the aggregate root)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleState {
    pub battle_id: BattleId,
    pub seed: u64,
    pub rules: BattleRules,

    // Time
    pub phase: BattlePhase,
    pub tick: Tick,
    pub speed: f64,

    // Forces
    pub attacker: Force,
    pub defender: Force,

    // Log
    pub events: Vec<BattleEvent>,
    pub stats: BattleStats,

    // Terminal
    pub end_condition: Option<EndCondition>,
    pub result: Option<BattleResult>,
}

/// Read-only view handed to AI, renderers and telemetry
pub type BattleSnapshot = Arc<BattleState>;

impl BattleState {
    pub fn force(&self, side: Side) -> &Force {
        match side {
            Side::Attacker => &self.attacker,
            Side::Defender => &self.defender,
        }
    }

    fn force_mut(&mut self, side: Side) -> &mut Force {
        match side {
            Side::Attacker => &mut self.attacker,
            Side::Defender => &mut self.defender,
        }
    }

    /// Find a squad on either side
    pub fn squad(&self, id: SquadId) -> Option<&Squad> {
        self.attacker
            .get_squad(id)
            .or_else(|| self.defender.get_squad(id))
    }

    fn squad_mut(&mut self, id: SquadId) -> Option<&mut Squad> {
        if self.attacker.get_squad(id).is_some() {
            self.attacker.get_squad_mut(id)
        } else {
            self.defender.get_squad_mut(id)
        }
    }

    /// Every squad, ordered by ascending id
    pub fn squads(&self) -> Vec<&Squad> {
        let mut all: Vec<&Squad> = self
            .attacker
            .squads
            .iter()
            .chain(self.defender.squads.iter())
            .collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Every squad id, ascending
    pub fn squad_ids(&self) -> Vec<SquadId> {
        self.squads().iter().map(|s| s.id).collect()
    }

    pub fn is_completed(&self) -> bool {
        self.phase == BattlePhase::Completed
    }

    /// Evaluate the end-of-combat conditions against current state
    pub fn evaluate_end_condition(&self) -> Option<EndCondition> {
        let attacker_alive = self.attacker.has_living_squads();
        let defender_alive = self.defender.has_living_squads();

        match (attacker_alive, defender_alive) {
            (false, false) => return Some(EndCondition::MutualDestruction),
            (false, true) => {
                return Some(EndCondition::ForceEliminated {
                    side: Side::Attacker,
                })
            }
            (true, false) => {
                return Some(EndCondition::ForceEliminated {
                    side: Side::Defender,
                })
            }
            (true, true) => {}
        }

        let threshold = self.rules.collapse_threshold;
        let attacker_collapsed = self.attacker.aggregate_morale() < threshold;
        let defender_collapsed = self.defender.aggregate_morale() < threshold;

        match (attacker_collapsed, defender_collapsed) {
            (true, true) => return Some(EndCondition::MutualDestruction),
            (true, false) => {
                return Some(EndCondition::MoraleCollapse {
                    side: Side::Attacker,
                })
            }
            (false, true) => {
                return Some(EndCondition::MoraleCollapse {
                    side: Side::Defender,
                })
            }
            (false, false) => {}
        }

        if self.tick >= self.rules.max_ticks {
            return Some(EndCondition::TimeLimit);
        }

        None
    }
}

/// Validate initial squads for one side
fn validate_specs(side: Side, specs: &[SquadSpec]) -> std::result::Result<(), String> {
    if specs.is_empty() {
        return Err(format!("{:?} has no squads", side));
    }
    for spec in specs {
        if spec.troops == 0 {
            return Err(format!("{} has no troops", spec.id));
        }
        if !spec.morale.is_finite() || !(0.0..=100.0).contains(&spec.morale) {
            return Err(format!("{} morale {} outside 0..=100", spec.id, spec.morale));
        }
        if !spec.position.x.is_finite() || !spec.position.y.is_finite() {
            return Err(format!("{} has a non-finite position", spec.id));
        }
    }
    Ok(())
}

/// Owner of the single mutable `BattleState` for one battle session
#[derive(Debug)]
pub struct BattleStore {
    rules: BattleRules,
    state: Option<Arc<BattleState>>,
    rng: Option<BattleRng>,
}

impl BattleStore {
    pub fn new(rules: BattleRules) -> Self {
        Self {
            rules,
            state: None,
            rng: None,
        }
    }

    /// Create and initialize in one step
    pub fn with_battle(
        rules: BattleRules,
        attackers: Vec<SquadSpec>,
        defenders: Vec<SquadSpec>,
        seed: u64,
    ) -> Result<Self> {
        let mut store = Self::new(rules);
        store.initialize(attackers, defenders, seed)?;
        Ok(store)
    }

    /// Rebuild a store from a stored pre-battle snapshot (used by replays)
    pub fn restore(initial: BattleState) -> Result<Self> {
        if initial.phase != BattlePhase::Preparation || !initial.events.is_empty() {
            return Err(InitializationError::MalformedSquads(
                "initial snapshot must be an untouched preparation state".into(),
            )
            .into());
        }
        initial.rules.validate().map_err(BattleError::Config)?;
        let rng = BattleRng::from_seed(initial.seed);
        Ok(Self {
            rules: initial.rules.clone(),
            state: Some(Arc::new(initial)),
            rng: Some(rng),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn rules(&self) -> &BattleRules {
        &self.rules
    }

    /// Random draws consumed so far
    pub fn rng_draws(&self) -> u64 {
        self.rng.as_ref().map(|r| r.draws()).unwrap_or(0)
    }

    /// Build the battle from both sides' squads
    pub fn initialize(
        &mut self,
        attackers: Vec<SquadSpec>,
        defenders: Vec<SquadSpec>,
        seed: u64,
    ) -> Result<()> {
        if self.state.is_some() {
            return Err(InitializationError::AlreadyInitialized.into());
        }
        self.rules.validate().map_err(BattleError::Config)?;

        validate_specs(Side::Attacker, &attackers).map_err(InitializationError::MalformedSquads)?;
        validate_specs(Side::Defender, &defenders).map_err(InitializationError::MalformedSquads)?;

        let mut seen = BTreeSet::new();
        for spec in attackers.iter().chain(defenders.iter()) {
            if !seen.insert(spec.id) {
                return Err(InitializationError::MalformedSquads(format!(
                    "duplicate squad id {}",
                    spec.id
                ))
                .into());
            }
        }

        // Soldier ids are handed out in ascending squad-id order across both sides
        let mut ordered: Vec<(Side, &SquadSpec)> = attackers
            .iter()
            .map(|s| (Side::Attacker, s))
            .chain(defenders.iter().map(|s| (Side::Defender, s)))
            .collect();
        ordered.sort_by_key(|(_, spec)| spec.id);

        let mut attacker = Force::new(Side::Attacker, "Attackers", "#3060c0");
        let mut defender = Force::new(Side::Defender, "Defenders", "#c03030");
        let mut next_soldier = 0u32;

        for (side, spec) in ordered {
            let home = Vec2::new(
                side.home_direction() * self.rules.field_half_extent,
                spec.position.y,
            );
            let squad = Squad::from_spec(spec, side, next_soldier, home);
            next_soldier += spec.troops;
            let force = match side {
                Side::Attacker => &mut attacker,
                Side::Defender => &mut defender,
            };
            force.initial_troops += squad.troops;
            force.squads.push(squad);
        }

        info!(
            seed,
            attacker_troops = attacker.initial_troops,
            defender_troops = defender.initial_troops,
            "Battle initialized"
        );

        self.state = Some(Arc::new(BattleState {
            battle_id: BattleId::new(),
            seed,
            rules: self.rules.clone(),
            phase: BattlePhase::Preparation,
            tick: 0,
            speed: self.rules.initial_speed,
            attacker,
            defender,
            events: Vec::new(),
            stats: BattleStats::default(),
            end_condition: None,
            result: None,
        }));
        self.rng = Some(BattleRng::from_seed(seed));
        Ok(())
    }

    /// Immutable view of the current state
    pub fn snapshot(&self) -> Result<BattleSnapshot> {
        self.state.clone().ok_or(BattleError::NotInitialized)
    }

    /// Borrow the current state without taking a snapshot
    pub fn state(&self) -> Result<&BattleState> {
        self.state.as_deref().ok_or(BattleError::NotInitialized)
    }

    fn state_mut(&mut self) -> Result<&mut BattleState> {
        self.state
            .as_mut()
            .map(Arc::make_mut)
            .ok_or(BattleError::NotInitialized)
    }

    pub(crate) fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(BattleError::InvalidSpeed(speed));
        }
        self.state_mut()?.speed = speed;
        Ok(())
    }

    /// Record why combat ends. First recorded condition wins.
    pub(crate) fn record_end_condition(&mut self, condition: EndCondition) -> Result<()> {
        let state = self.state_mut()?;
        if state.end_condition.is_none() {
            state.end_condition = Some(condition);
        }
        Ok(())
    }

    /// Store the terminal result. Only legal once, during resolution.
    pub(crate) fn set_result(&mut self, result: BattleResult) -> Result<()> {
        let state = self.state_mut()?;
        if state.result.is_some() {
            return Err(BattleError::ResultAlreadyFinalized);
        }
        if state.phase != BattlePhase::Resolution {
            return Err(BattleError::WrongPhase {
                expected: BattlePhase::Resolution,
                actual: state.phase,
            });
        }
        state.result = Some(result);
        Ok(())
    }

    /// Step the phase machine forward, enforcing its guards
    pub(crate) fn advance_phase(&mut self) -> Result<BattlePhase> {
        let state = self.state_mut()?;
        let from = state.phase;

        let (to, end_condition) = match from {
            BattlePhase::Preparation => (BattlePhase::Combat, None),
            BattlePhase::Combat => match state.end_condition {
                Some(condition) => (BattlePhase::Resolution, Some(condition)),
                None => {
                    return Err(BattleError::IllegalTransition {
                        from,
                        reason: "no end condition has been met".into(),
                    })
                }
            },
            BattlePhase::Resolution => {
                if state.result.is_none() {
                    return Err(BattleError::IllegalTransition {
                        from,
                        reason: "result has not been finalized".into(),
                    });
                }
                (BattlePhase::Completed, None)
            }
            BattlePhase::Completed => {
                return Err(BattleError::IllegalTransition {
                    from,
                    reason: "completed is terminal".into(),
                })
            }
        };

        state.phase = to;
        let tick = state.tick;
        state.events.push(BattleEvent::new(
            tick,
            None,
            None,
            BattleEventKind::PhaseChange {
                from,
                to,
                end_condition,
            },
        ));
        info!(tick, ?from, ?to, ?end_condition, "Battle phase changed");

        if from == BattlePhase::Preparation {
            rout_wavering_squads(state);
        }
        Ok(to)
    }

    /// Apply one tick's worth of intents and return the events produced
    ///
    /// Bad intents are discarded with a warning; they never abort the tick.
    pub fn apply_intents(&mut self, intents: &[Intent]) -> Result<Vec<BattleEvent>> {
        let mut rng = self.rng.take().ok_or(BattleError::NotInitialized)?;
        let result = self.apply_intents_with(intents, &mut rng);
        self.rng = Some(rng);
        result
    }

    fn apply_intents_with(
        &mut self,
        intents: &[Intent],
        rng: &mut BattleRng,
    ) -> Result<Vec<BattleEvent>> {
        let state = self.state_mut()?;
        if state.phase != BattlePhase::Combat {
            return Err(BattleError::WrongPhase {
                expected: BattlePhase::Combat,
                actual: state.phase,
            });
        }

        state.tick += 1;
        let tick = state.tick;
        let mut tick_state = TickState::new(tick);

        // Fighting squads start every tick idle; intents say otherwise
        for force in [&mut state.attacker, &mut state.defender] {
            for squad in force.squads.iter_mut().filter(|s| s.can_fight()) {
                squad.set_state(SquadState::Idle);
            }
        }

        for intent in intents {
            if let Err(e) = validate_intent(state, intent, &tick_state.acted) {
                warn!(tick, ?intent, error = %e, "Discarding invalid intent");
                state.stats.intents_discarded += 1;
                continue;
            }
            tick_state.acted.insert(intent.squad());
            state.stats.intents_applied += 1;
            apply_intent(state, intent, rng, &mut tick_state);
        }

        spread_contagion(state, &mut tick_state);
        recover_idle_morale(state, &mut tick_state);

        debug!(
            tick,
            events = tick_state.events.len(),
            attacker_troops = state.attacker.total_troops(),
            defender_troops = state.defender.total_troops(),
            "Tick applied"
        );

        state.events.extend(tick_state.events.iter().cloned());
        Ok(tick_state.events)
    }
}

/// Scratch data for one tick
struct TickState {
    tick: Tick,
    events: Vec<BattleEvent>,
    acted: BTreeSet<SquadId>,
    hit: BTreeSet<SquadId>,
    newly_routed: VecDeque<SquadId>,
}

impl TickState {
    fn new(tick: Tick) -> Self {
        Self {
            tick,
            events: Vec::new(),
            acted: BTreeSet::new(),
            hit: BTreeSet::new(),
            newly_routed: VecDeque::new(),
        }
    }

    fn push(&mut self, source: SquadId, target: Option<SquadId>, kind: BattleEventKind) {
        self.events
            .push(BattleEvent::new(self.tick, Some(source), target, kind));
    }
}

fn invalid(squad: SquadId, reason: impl Into<String>) -> BattleError {
    BattleError::InvalidIntent {
        squad,
        reason: reason.into(),
    }
}

/// Check an intent against current state
fn validate_intent(state: &BattleState, intent: &Intent, acted: &BTreeSet<SquadId>) -> Result<()> {
    let id = intent.squad();
    let squad = state
        .squad(id)
        .ok_or_else(|| invalid(id, "unknown squad"))?;

    if !squad.is_alive() {
        return Err(invalid(id, "squad is destroyed"));
    }
    if acted.contains(&id) {
        return Err(invalid(id, "squad already acted this tick"));
    }
    if squad.is_routing() && !matches!(intent, Intent::Retreat { .. }) {
        return Err(invalid(id, "routing squads can only retreat"));
    }

    match intent {
        Intent::AttackTarget { target, .. } => {
            let target_squad = state
                .squad(*target)
                .ok_or_else(|| invalid(id, format!("unknown target {}", target)))?;
            if !target_squad.is_alive() {
                return Err(invalid(id, format!("target {} is destroyed", target)));
            }
            if target_squad.side == squad.side {
                return Err(invalid(id, format!("target {} is friendly", target)));
            }
        }
        Intent::MoveTo { destination, .. } => {
            if !destination.x.is_finite() || !destination.y.is_finite() {
                return Err(invalid(id, "non-finite destination"));
            }
        }
        Intent::Hold { .. } | Intent::Retreat { .. } => {}
    }

    Ok(())
}

/// Apply a validated intent. Every intent except `Hold` emits exactly one
/// primary (move or attack) event sourced from its squad.
fn apply_intent(
    state: &mut BattleState,
    intent: &Intent,
    rng: &mut BattleRng,
    tick_state: &mut TickState,
) {
    let half_extent = state.rules.field_half_extent;

    match *intent {
        Intent::Hold { .. } => {}
        Intent::MoveTo { squad, destination } => {
            let destination = destination.clamp_to_field(half_extent);
            let Some(mover) = state.squad_mut(squad) else {
                return;
            };
            let speed = mover.archetype.properties().speed + mover.formation.speed_modifier();
            let from = mover.position;
            let to = from.step_towards(&destination, speed);
            mover.move_to(to);
            mover.engaged_with = None;
            mover.set_state(SquadState::Moving);
            tick_state.push(
                squad,
                None,
                BattleEventKind::Move {
                    from,
                    to,
                    reason: MoveReason::Advance { destination },
                },
            );
        }
        Intent::Retreat { squad } => {
            let Some(mover) = state.squad_mut(squad) else {
                return;
            };
            let mut speed = mover.archetype.properties().speed;
            if mover.is_routing() {
                speed += ROUT_SPEED_BONUS;
            }
            let from = mover.position;
            let to = from
                .step_towards(&mover.home, speed)
                .clamp_to_field(half_extent);
            mover.move_to(to);
            mover.engaged_with = None;
            if !mover.is_routing() {
                mover.set_state(SquadState::Moving);
            }
            tick_state.push(
                squad,
                None,
                BattleEventKind::Move {
                    from,
                    to,
                    reason: MoveReason::Retreat,
                },
            );
        }
        Intent::AttackTarget { squad, target } => {
            resolve_attack_intent(state, squad, target, rng, tick_state);
        }
    }
}

fn resolve_attack_intent(
    state: &mut BattleState,
    attacker_id: SquadId,
    target_id: SquadId,
    rng: &mut BattleRng,
    tick_state: &mut TickState,
) {
    let (Some(attacker), Some(target)) = (state.squad(attacker_id), state.squad(target_id)) else {
        return;
    };

    let props = attacker.archetype.properties();
    let distance = attacker.position.distance(&target.position);
    let target_position = target.position;

    if distance > props.attack_range {
        // Out of reach: close the distance instead
        let step = (distance - props.attack_range * CLOSE_TO_RANGE_FACTOR)
            .min(props.speed + attacker.formation.speed_modifier());
        let Some(mover) = state.squad_mut(attacker_id) else {
            return;
        };
        let from = mover.position;
        let to = from.step_towards(&target_position, step);
        mover.move_to(to);
        mover.engaged_with = None;
        mover.set_state(SquadState::Moving);
        tick_state.push(
            attacker_id,
            Some(target_id),
            BattleEventKind::Move {
                from,
                to,
                reason: MoveReason::Close,
            },
        );
        return;
    }

    let attacker_profile =
        CombatProfile::for_squad(attacker.archetype, attacker.formation, attacker.troops);
    let defender_profile = CombatProfile::for_squad(target.archetype, target.formation, target.troops);
    let flanking = target.engaged_with.is_some_and(|e| e != attacker_id);
    let context = CombatContext {
        terrain: state.rules.terrain,
        weather: state.rules.weather,
        formation: FormationModifiers::between(attacker.formation, target.formation),
        flanking,
    };

    let outcome = resolve_attack(&attacker_profile, &defender_profile, &context, rng);

    state.stats.attacks += 1;
    if outcome.is_evaded {
        state.stats.evasions += 1;
    }
    if outcome.is_critical {
        state.stats.criticals += 1;
    }

    if let Some(attacker) = state.squad_mut(attacker_id) {
        attacker.face_towards(target_position);
        attacker.engaged_with = Some(target_id);
        attacker.damage_dealt += outcome.damage;
        attacker.set_state(SquadState::Engaging);
    }

    tick_state.push(
        attacker_id,
        Some(target_id),
        BattleEventKind::Attack {
            damage: outcome.damage,
            is_critical: outcome.is_critical,
            is_evaded: outcome.is_evaded,
            flanking,
        },
    );

    if outcome.damage <= 0.0 {
        return;
    }

    let rout_threshold = state.rules.rout_threshold;
    let tick = tick_state.tick;
    let Some(target) = state.squad_mut(target_id) else {
        return;
    };

    let killed = target.absorb_damage(outcome.damage);
    let casualties = killed.len() as u32;
    let side = target.side;
    tick_state.hit.insert(target_id);

    tick_state.push(
        attacker_id,
        Some(target_id),
        BattleEventKind::Damage {
            side,
            amount: outcome.damage,
            casualties,
            killed,
            remaining_troops: target.troops,
        },
    );

    let loss = casualty_morale_loss(casualties, target.initial_troops)
        + shock_morale_loss(outcome.is_critical, flanking);
    let from = target.morale;
    let to = clamp_morale(from - loss);
    if to != from {
        target.morale = to;
        tick_state.push(
            target_id,
            Some(attacker_id),
            BattleEventKind::MoraleShift {
                from,
                to,
                cause: MoraleCause::Casualties,
            },
        );
    }

    if target.troops == 0 {
        target.set_state(SquadState::Destroyed);
        target.engaged_with = None;
        tick_state.push(target_id, None, BattleEventKind::SquadDestroyed { side });
        info!(tick, squad = %target_id, "Squad destroyed");
    } else if !target.is_routing() && should_rout(target.morale, rout_threshold) {
        rout_squad(target, tick, tick_state);
    }

    state.stats.soldiers_killed += casualties as u64;
}

fn rout_squad(squad: &mut Squad, tick: Tick, tick_state: &mut TickState) {
    squad.set_state(SquadState::Routing);
    squad.routed_at = Some(tick);
    squad.engaged_with = None;
    tick_state.push(
        squad.id,
        None,
        BattleEventKind::SquadRouted {
            side: squad.side,
            morale: squad.morale,
        },
    );
    tick_state.newly_routed.push_back(squad.id);
    info!(tick, squad = %squad.id, morale = squad.morale, "Squad routed");
}

/// Squads that enter combat already below the rout threshold break at once
fn rout_wavering_squads(state: &mut BattleState) {
    let rout_threshold = state.rules.rout_threshold;
    let tick = state.tick;
    let mut tick_state = TickState::new(tick);

    let mut wavering: Vec<SquadId> = state
        .squads()
        .iter()
        .filter(|s| s.can_fight() && should_rout(s.morale, rout_threshold))
        .map(|s| s.id)
        .collect();
    wavering.sort();

    for id in wavering {
        if let Some(squad) = state.squad_mut(id) {
            rout_squad(squad, tick, &mut tick_state);
        }
    }
    spread_contagion(state, &mut tick_state);
    state.events.extend(tick_state.events);
}

/// Nearby allies of a squad that broke this tick lose morale, possibly breaking in turn
fn spread_contagion(state: &mut BattleState, tick_state: &mut TickState) {
    let rout_threshold = state.rules.rout_threshold;
    let tick = tick_state.tick;

    while let Some(routed_id) = tick_state.newly_routed.pop_front() {
        let Some(routed) = state.squad(routed_id) else {
            continue;
        };
        let side = routed.side;
        let origin = routed.position;

        let force = state.force_mut(side);
        for ally in force.squads.iter_mut() {
            if ally.id == routed_id
                || !ally.can_fight()
                || ally.position.distance(&origin) > ROUT_CONTAGION_RADIUS
            {
                continue;
            }

            let from = ally.morale;
            let to = clamp_morale(from - contagion_morale_loss(1));
            if to == from {
                continue;
            }
            ally.morale = to;
            tick_state.push(
                ally.id,
                Some(routed_id),
                BattleEventKind::MoraleShift {
                    from,
                    to,
                    cause: MoraleCause::Contagion,
                },
            );

            if should_rout(ally.morale, rout_threshold) {
                rout_squad(ally, tick, tick_state);
            }
        }
    }
}

/// Squads that neither moved, fought nor got hit this tick steady themselves
fn recover_idle_morale(state: &mut BattleState, tick_state: &mut TickState) {
    let mut ids: Vec<SquadId> = state
        .squads()
        .iter()
        .filter(|s| s.can_fight() && s.state == SquadState::Idle && !tick_state.hit.contains(&s.id))
        .map(|s| s.id)
        .collect();
    ids.sort();

    for id in ids {
        let Some(squad) = state.squad_mut(id) else {
            continue;
        };
        let gain = idle_recovery(squad.morale);
        if gain <= 0.0 {
            continue;
        }
        let from = squad.morale;
        let to = clamp_morale(from + gain);
        squad.morale = to;
        tick_state.push(
            id,
            None,
            BattleEventKind::MoraleShift {
                from,
                to,
                cause: MoraleCause::Recovery,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duel_store() -> BattleStore {
        BattleStore::with_battle(
            BattleRules::default(),
            vec![SquadSpec::infantry(1, 100, 80.0, Vec2::new(0.0, 0.0))],
            vec![
                SquadSpec::infantry(2, 100, 70.0, Vec2::new(5.0, 0.0)).facing(Vec2::new(-1.0, 0.0))
            ],
            42,
        )
        .expect("valid battle")
    }

    fn combat_store() -> BattleStore {
        let mut store = duel_store();
        store.advance_phase().expect("start combat");
        store
    }

    fn attack(squad: u32, target: u32) -> Intent {
        Intent::AttackTarget {
            squad: SquadId(squad),
            target: SquadId(target),
        }
    }

    #[test]
    fn test_initialize_twice_fails() {
        let mut store = duel_store();
        let err = store
            .initialize(
                vec![SquadSpec::infantry(1, 10, 50.0, Vec2::default())],
                vec![SquadSpec::infantry(2, 10, 50.0, Vec2::default())],
                1,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            BattleError::Initialization(InitializationError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_malformed_squads_rejected() {
        let cases = vec![
            (vec![], vec![SquadSpec::infantry(2, 10, 50.0, Vec2::default())]),
            (
                vec![SquadSpec::infantry(1, 0, 50.0, Vec2::default())],
                vec![SquadSpec::infantry(2, 10, 50.0, Vec2::default())],
            ),
            (
                vec![SquadSpec::infantry(1, 10, 150.0, Vec2::default())],
                vec![SquadSpec::infantry(2, 10, 50.0, Vec2::default())],
            ),
            (
                vec![SquadSpec::infantry(1, 10, 50.0, Vec2::default())],
                vec![SquadSpec::infantry(1, 10, 50.0, Vec2::default())],
            ),
        ];

        for (attackers, defenders) in cases {
            let mut store = BattleStore::new(BattleRules::default());
            let err = store.initialize(attackers, defenders, 1).unwrap_err();
            assert!(matches!(
                err,
                BattleError::Initialization(InitializationError::MalformedSquads(_))
            ));
            assert!(!store.is_initialized());
        }
    }

    #[test]
    fn test_invalid_rules_rejected_at_initialize() {
        let bad_rules = [
            BattleRules {
                initial_speed: 9.0,
                ..BattleRules::default()
            },
            BattleRules {
                tick_rate_hz: 0,
                ..BattleRules::default()
            },
            BattleRules {
                collapse_threshold: 60.0,
                ..BattleRules::default()
            },
        ];

        for rules in bad_rules {
            let mut store = BattleStore::new(rules);
            let err = store
                .initialize(
                    vec![SquadSpec::infantry(1, 10, 50.0, Vec2::default())],
                    vec![SquadSpec::infantry(2, 10, 50.0, Vec2::default())],
                    1,
                )
                .unwrap_err();
            assert!(matches!(err, BattleError::Config(_)));
            assert!(!store.is_initialized());
        }
    }

    #[test]
    fn test_restore_rejects_invalid_rules() {
        let mut fresh = duel_store().state().unwrap().clone();
        fresh.rules.initial_speed = 9.0;
        assert!(matches!(
            BattleStore::restore(fresh),
            Err(BattleError::Config(_))
        ));
    }

    #[test]
    fn test_snapshot_before_init_fails() {
        let store = BattleStore::new(BattleRules::default());
        assert!(matches!(store.snapshot(), Err(BattleError::NotInitialized)));
    }

    #[test]
    fn test_soldier_ids_follow_squad_order() {
        let store = duel_store();
        let state = store.state().unwrap();
        assert_eq!(state.attacker.squads[0].soldiers[0].id.0, 0);
        assert_eq!(state.defender.squads[0].soldiers[0].id.0, 100);
        assert_eq!(state.attacker.initial_troops, 100);
    }

    #[test]
    fn test_phase_machine() {
        let mut store = duel_store();
        assert_eq!(store.state().unwrap().phase, BattlePhase::Preparation);

        assert_eq!(store.advance_phase().unwrap(), BattlePhase::Combat);

        // No end condition yet
        assert!(matches!(
            store.advance_phase(),
            Err(BattleError::IllegalTransition { .. })
        ));

        store.record_end_condition(EndCondition::Aborted).unwrap();
        assert_eq!(store.advance_phase().unwrap(), BattlePhase::Resolution);

        // Result missing
        assert!(store.advance_phase().is_err());

        let state = store.state().unwrap().clone();
        let result = crate::battle::result::finalize_battle(&state, EndCondition::Aborted);
        store.set_result(result.clone()).unwrap();
        assert!(matches!(
            store.set_result(result),
            Err(BattleError::ResultAlreadyFinalized)
        ));

        assert_eq!(store.advance_phase().unwrap(), BattlePhase::Completed);
        assert!(matches!(
            store.advance_phase(),
            Err(BattleError::IllegalTransition { .. })
        ));

        let phase_events = store
            .state()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.type_name() == "phase_change")
            .count();
        assert_eq!(phase_events, 3);
    }

    #[test]
    fn test_apply_intents_requires_combat() {
        let mut store = duel_store();
        assert!(matches!(
            store.apply_intents(&[]),
            Err(BattleError::WrongPhase { .. })
        ));
    }

    #[test]
    fn test_snapshot_is_isolated_from_mutation() {
        let mut store = combat_store();
        let before = store.snapshot().unwrap();
        store.apply_intents(&[attack(1, 2)]).unwrap();
        let after = store.snapshot().unwrap();

        assert_eq!(before.tick, 0);
        assert_eq!(after.tick, 1);
        assert_eq!(before.defender.squads[0].troops, 100);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_attack_in_range_emits_attack_and_keeps_troop_invariant() {
        let mut store = combat_store();
        let events = store.apply_intents(&[attack(1, 2)]).unwrap();

        assert_eq!(events[0].type_name(), "attack");
        assert_eq!(events[0].source_id, Some(SquadId(1)));
        assert_eq!(events[0].target_id, Some(SquadId(2)));

        let state = store.state().unwrap();
        for squad in state.squads() {
            assert_eq!(squad.troops as usize, squad.soldiers.len());
            assert!(squad.soldiers.iter().all(|s| s.health > 0.0));
        }
        assert_eq!(store.rng_draws(), 3);
    }

    #[test]
    fn test_out_of_range_attack_closes_distance() {
        let mut store = BattleStore::with_battle(
            BattleRules::default(),
            vec![SquadSpec::infantry(1, 50, 80.0, Vec2::new(0.0, 0.0))],
            vec![SquadSpec::infantry(2, 50, 80.0, Vec2::new(50.0, 0.0))],
            7,
        )
        .unwrap();
        store.advance_phase().unwrap();

        let events = store.apply_intents(&[attack(1, 2)]).unwrap();
        // The idle target also steadies itself; only the close-in is primary
        let primary: Vec<&BattleEvent> = events.iter().filter(|e| e.is_primary()).collect();
        assert_eq!(primary.len(), 1);
        assert!(matches!(
            primary[0].kind,
            BattleEventKind::Move {
                reason: MoveReason::Close,
                ..
            }
        ));
        assert_eq!(primary[0].source_id, Some(SquadId(1)));
        assert_eq!(primary[0].target_id, Some(SquadId(2)));
        assert!(events
            .iter()
            .filter(|e| !e.is_primary())
            .all(|e| e.source_id == Some(SquadId(2)) && e.type_name() == "morale_shift"));
        assert_eq!(store.rng_draws(), 0);

        let squad = store.state().unwrap().squad(SquadId(1)).unwrap().clone();
        assert_eq!(squad.state, SquadState::Moving);
        assert!((squad.position.x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_intents_discarded() {
        let mut store = combat_store();
        let events = store
            .apply_intents(&[
                attack(1, 99),                     // unknown target
                Intent::Hold { squad: SquadId(42) }, // unknown squad
                attack(1, 1),                      // self / friendly
                Intent::Retreat { squad: SquadId(2) },
                Intent::Retreat { squad: SquadId(2) }, // second intent same tick
            ])
            .unwrap();

        let state = store.state().unwrap();
        assert_eq!(state.stats.intents_discarded, 4);
        assert_eq!(state.stats.intents_applied, 1);
        assert_eq!(events.iter().filter(|e| e.is_primary()).count(), 1);
    }

    #[test]
    fn test_move_to_clamps_and_emits_move() {
        let mut store = combat_store();
        let events = store
            .apply_intents(&[Intent::MoveTo {
                squad: SquadId(1),
                destination: Vec2::new(-1000.0, 0.0),
            }])
            .unwrap();

        match &events[0].kind {
            BattleEventKind::Move {
                reason: MoveReason::Advance { destination },
                to,
                ..
            } => {
                assert_eq!(destination.x, -250.0);
                assert!((to.x + 3.0).abs() < 1e-9);
            }
            other => panic!("expected move, got {:?}", other),
        }
    }

    #[test]
    fn test_routed_squad_only_retreats() {
        let mut store = combat_store();
        {
            let state = store.state_mut().unwrap();
            let squad = state.squad_mut(SquadId(2)).unwrap();
            squad.morale = 10.0;
            squad.set_state(SquadState::Routing);
        }
        store.apply_intents(&[attack(2, 1)]).unwrap();
        assert_eq!(store.state().unwrap().stats.intents_discarded, 1);

        let events = store
            .apply_intents(&[Intent::Retreat { squad: SquadId(2) }])
            .unwrap();
        assert!(matches!(
            events[0].kind,
            BattleEventKind::Move {
                reason: MoveReason::Retreat,
                ..
            }
        ));
        let squad = store.state().unwrap().squad(SquadId(2)).unwrap().clone();
        assert_eq!(squad.state, SquadState::Routing);
        assert!(squad.position.x > 5.0);
    }

    #[test]
    fn test_low_morale_target_routs_once() {
        let mut store = combat_store();
        {
            let state = store.state_mut().unwrap();
            state.squad_mut(SquadId(2)).unwrap().morale = 25.5;
        }

        let mut routed_events = 0;
        for _ in 0..20 {
            let events = store.apply_intents(&[attack(1, 2)]).unwrap();
            routed_events += events
                .iter()
                .filter(|e| e.type_name() == "squad_routed")
                .count();
        }

        let squad = store.state().unwrap().squad(SquadId(2)).unwrap().clone();
        assert!(squad.is_routing() || !squad.is_alive());
        assert_eq!(routed_events, 1);
        assert!(squad.routed_at.is_some());
    }

    #[test]
    fn test_squad_below_rout_threshold_routs_when_combat_starts() {
        let mut store = BattleStore::with_battle(
            BattleRules::default(),
            vec![SquadSpec::infantry(1, 100, 80.0, Vec2::new(0.0, 0.0))],
            vec![SquadSpec::infantry(2, 40, 10.0, Vec2::new(5.0, 0.0))],
            42,
        )
        .unwrap();
        store.advance_phase().unwrap();

        let state = store.state().unwrap();
        let squad = state.squad(SquadId(2)).unwrap();
        assert_eq!(squad.state, SquadState::Routing);
        assert!(!squad.can_fight());
        assert_eq!(squad.routed_at, Some(0));

        let routed: Vec<&BattleEvent> = state
            .events
            .iter()
            .filter(|e| e.type_name() == "squad_routed")
            .collect();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].source_id, Some(SquadId(2)));
        assert_eq!(routed[0].tick, 0);
        assert_eq!(state.events[0].type_name(), "phase_change");

        // Later ticks never rout it again
        for _ in 0..5 {
            let events = store
                .apply_intents(&[Intent::Retreat { squad: SquadId(2) }])
                .unwrap();
            assert!(events.iter().all(|e| e.type_name() != "squad_routed"));
        }
        assert!(store
            .state()
            .unwrap()
            .squad(SquadId(1))
            .unwrap()
            .can_fight());
    }

    #[test]
    fn test_idle_squads_recover_morale() {
        let mut store = combat_store();
        let events = store.apply_intents(&[]).unwrap();

        let recoveries: Vec<_> = events
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    BattleEventKind::MoraleShift {
                        cause: MoraleCause::Recovery,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(recoveries.len(), 2);
        // Ascending squad id
        assert_eq!(recoveries[0].source_id, Some(SquadId(1)));
        assert_eq!(recoveries[1].source_id, Some(SquadId(2)));
    }

    #[test]
    fn test_set_speed_bounds() {
        let mut store = combat_store();
        assert!(store.set_speed(2.0).is_ok());
        assert_eq!(store.state().unwrap().speed, 2.0);
        assert!(matches!(
            store.set_speed(0.25),
            Err(BattleError::InvalidSpeed(_))
        ));
    }

    #[test]
    fn test_restore_requires_fresh_snapshot() {
        let store = combat_store();
        let used = store.state().unwrap().clone();
        assert!(BattleStore::restore(used).is_err());

        let fresh = duel_store().state().unwrap().clone();
        let restored = BattleStore::restore(fresh).unwrap();
        assert_eq!(restored.rng_draws(), 0);
    }
}
