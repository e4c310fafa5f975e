//! Unit hierarchy: Soldier → Squad → Force
//!
//! Soldiers are modelled individually. A squad's troop count is always the
//! number of soldiers it still holds; dead soldiers are removed.

use serde::{Deserialize, Serialize};

use crate::combat::constants::SOLDIER_SPACING_METERS;
use crate::combat::{FormationType, UnitArchetype};
use crate::core::types::{Side, SoldierId, SquadId, Tick, Vec2};

/// Squad posture chosen before battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquadStance {
    #[default]
    Aggressive, // Seek out and close with the enemy
    Defensive, // Engage only what comes near
    Hold,      // Never leave position
}

/// What a squad is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquadState {
    #[default]
    Idle,
    Moving,
    Engaging,
    Routing,
    Destroyed,
}

/// Animation label for renderers. The simulation never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoldierAction {
    #[default]
    Stand,
    March,
    Strike,
    Flee,
}

impl SoldierAction {
    pub fn for_state(state: SquadState) -> Self {
        match state {
            SquadState::Idle | SquadState::Destroyed => SoldierAction::Stand,
            SquadState::Moving => SoldierAction::March,
            SquadState::Engaging => SoldierAction::Strike,
            SquadState::Routing => SoldierAction::Flee,
        }
    }
}

/// Atomic combat entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Soldier {
    pub id: SoldierId,
    pub squad: SquadId,
    pub position: Vec2,
    pub health: f64,
    pub stance: SquadStance,
    pub action: SoldierAction,
}

impl Soldier {
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

/// Initial description of a squad, as handed to `BattleStore::initialize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadSpec {
    pub id: SquadId,
    pub name: String,
    pub archetype: UnitArchetype,
    pub formation: FormationType,
    pub stance: SquadStance,
    pub troops: u32,
    pub morale: f64,
    pub position: Vec2,
    pub facing: Vec2,
}

impl SquadSpec {
    /// Line infantry facing along +x
    pub fn infantry(id: u32, troops: u32, morale: f64, position: Vec2) -> Self {
        Self {
            id: SquadId(id),
            name: format!("Squad {}", id),
            archetype: UnitArchetype::Infantry,
            formation: FormationType::Line,
            stance: SquadStance::Aggressive,
            troops,
            morale,
            position,
            facing: Vec2::new(1.0, 0.0),
        }
    }

    pub fn with_archetype(mut self, archetype: UnitArchetype) -> Self {
        self.archetype = archetype;
        self
    }

    pub fn with_formation(mut self, formation: FormationType) -> Self {
        self.formation = formation;
        self
    }

    pub fn with_stance(mut self, stance: SquadStance) -> Self {
        self.stance = stance;
        self
    }

    pub fn facing(mut self, facing: Vec2) -> Self {
        self.facing = facing;
        self
    }
}

/// Offset of soldier `index` behind the squad centre, as (lateral, depth)
fn formation_slot(formation: FormationType, index: u32) -> (f64, f64) {
    let frontage = formation.frontage();
    let rank = index / frontage;
    let file = index % frontage;
    let lateral = (file as f64 - (frontage as f64 - 1.0) / 2.0) * SOLDIER_SPACING_METERS;
    let mut depth = rank as f64 * SOLDIER_SPACING_METERS;
    if formation == FormationType::Wedge {
        // Flanks trail the point
        depth += lateral.abs() * 0.5;
    }
    (lateral, depth)
}

/// A cohesive group of soldiers sharing formation and stance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Squad {
    pub id: SquadId,
    /// Back-reference to the owning force
    pub side: Side,
    pub name: String,
    pub archetype: UnitArchetype,
    pub formation: FormationType,
    pub stance: SquadStance,
    pub state: SquadState,

    // Position
    pub position: Vec2,
    pub facing: Vec2,
    /// Where the squad flees to when routing
    pub home: Vec2,

    // Strength
    pub troops: u32,
    pub initial_troops: u32,
    pub morale: f64,
    pub soldiers: Vec<Soldier>,

    // Combat tracking
    pub engaged_with: Option<SquadId>,
    pub damage_dealt: f64,
    pub damage_taken: f64,
    pub routed_at: Option<Tick>,
}

impl Squad {
    /// Build a squad from its spec; soldier ids start at `first_soldier_id`
    pub fn from_spec(spec: &SquadSpec, side: Side, first_soldier_id: u32, home: Vec2) -> Self {
        let health = spec.archetype.properties().soldier_health;
        let soldiers = (0..spec.troops)
            .map(|i| Soldier {
                id: SoldierId(first_soldier_id + i),
                squad: spec.id,
                position: spec.position,
                health,
                stance: spec.stance,
                action: SoldierAction::Stand,
            })
            .collect();

        let mut squad = Self {
            id: spec.id,
            side,
            name: spec.name.clone(),
            archetype: spec.archetype,
            formation: spec.formation,
            stance: spec.stance,
            state: SquadState::Idle,
            position: spec.position,
            facing: spec.facing.normalize(),
            home,
            troops: spec.troops,
            initial_troops: spec.troops,
            morale: spec.morale,
            soldiers,
            engaged_with: None,
            damage_dealt: 0.0,
            damage_taken: 0.0,
            routed_at: None,
        };
        squad.layout_soldiers();
        squad
    }

    pub fn is_alive(&self) -> bool {
        self.state != SquadState::Destroyed
    }

    pub fn is_routing(&self) -> bool {
        self.state == SquadState::Routing
    }

    /// Alive and not routing
    pub fn can_fight(&self) -> bool {
        self.is_alive() && !self.is_routing() && self.troops > 0
    }

    /// Fraction of the starting strength still standing
    pub fn strength_fraction(&self) -> f64 {
        if self.initial_troops == 0 {
            return 0.0;
        }
        self.troops as f64 / self.initial_troops as f64
    }

    pub fn set_state(&mut self, state: SquadState) {
        self.state = state;
        let action = SoldierAction::for_state(state);
        for soldier in &mut self.soldiers {
            soldier.action = action;
        }
    }

    /// Move the squad centre, turning to face the direction of travel
    pub fn move_to(&mut self, position: Vec2) {
        let heading = (position - self.position).normalize();
        if heading.length() > 0.0 {
            self.facing = heading;
        }
        self.position = position;
        self.layout_soldiers();
    }

    /// Turn to face a point without moving
    pub fn face_towards(&mut self, point: Vec2) {
        let heading = (point - self.position).normalize();
        if heading.length() > 0.0 && heading != self.facing {
            self.facing = heading;
            self.layout_soldiers();
        }
    }

    /// Place living soldiers in formation slots behind the squad centre
    pub fn layout_soldiers(&mut self) {
        let forward = self.facing;
        let right = forward.perpendicular();
        let formation = self.formation;
        let center = self.position;
        for (index, soldier) in self.soldiers.iter_mut().enumerate() {
            let (lateral, depth) = formation_slot(formation, index as u32);
            soldier.position = center + right * lateral - forward * depth;
        }
    }

    /// Allocate `damage` to soldiers front rank first. Returns the killed ids.
    ///
    /// Soldier order is ascending id, so allocation is deterministic.
    pub fn absorb_damage(&mut self, damage: f64) -> Vec<SoldierId> {
        let mut remaining = damage;
        let mut killed = Vec::new();

        for soldier in &mut self.soldiers {
            if remaining <= 0.0 {
                break;
            }
            let absorbed = remaining.min(soldier.health);
            soldier.health -= absorbed;
            remaining -= absorbed;
            if !soldier.is_alive() {
                killed.push(soldier.id);
            }
        }

        self.soldiers.retain(|s| s.is_alive());
        self.troops = self.soldiers.len() as u32;
        self.damage_taken += damage;
        killed
    }
}

/// One belligerent side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Force {
    pub side: Side,
    pub name: String,
    pub color: String,
    pub initial_troops: u32,
    /// Ordered by ascending squad id
    pub squads: Vec<Squad>,
}

impl Force {
    pub fn new(side: Side, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            side,
            name: name.into(),
            color: color.into(),
            initial_troops: 0,
            squads: Vec::new(),
        }
    }

    /// Living soldiers across all squads
    pub fn total_troops(&self) -> u32 {
        self.squads.iter().map(|s| s.troops).sum()
    }

    pub fn living_squads(&self) -> impl Iterator<Item = &Squad> {
        self.squads.iter().filter(|s| s.is_alive())
    }

    pub fn has_living_squads(&self) -> bool {
        self.living_squads().next().is_some()
    }

    /// Troop-weighted morale of living squads; routing squads count as zero
    pub fn aggregate_morale(&self) -> f64 {
        let troops: u32 = self.living_squads().map(|s| s.troops).sum();
        if troops == 0 {
            return 0.0;
        }
        let weighted: f64 = self
            .living_squads()
            .filter(|s| !s.is_routing())
            .map(|s| s.morale * s.troops as f64)
            .sum();
        weighted / troops as f64
    }

    /// Fraction of squads routing, among living squads
    pub fn percentage_routing(&self) -> f64 {
        let living = self.living_squads().count();
        if living == 0 {
            return 0.0;
        }
        let routing = self.living_squads().filter(|s| s.is_routing()).count();
        routing as f64 / living as f64
    }

    pub fn get_squad(&self, id: SquadId) -> Option<&Squad> {
        self.squads.iter().find(|s| s.id == id)
    }

    pub fn get_squad_mut(&mut self, id: SquadId) -> Option<&mut Squad> {
        self.squads.iter_mut().find(|s| s.id == id)
    }
}
