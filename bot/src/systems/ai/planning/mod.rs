// tactical_bot_core/bot/src/systems/ai/planning/mod.rs
//! Goal-oriented action planning: world states, actions, goals and the A* planner.
pub mod action;
pub mod goal;
pub mod hash_set;
pub mod heap;
pub mod node_pool;
pub mod planner;
pub mod record;
pub mod world_state;

use crate::core::constants::GOAL_PICKUP_ACTION_RADIUS;
use crate::core::types::*;
use crate::systems::ai::awareness::Hazard;
use crate::world::aas::TFL_DEFAULT;

pub use action::{PlanningAction, PlanningContext, Transition};
pub use goal::{Goal, GoalKind};
pub use planner::{GoalOrientedPlanner, Plan};
pub use record::{ActionRecord, ExecutionState, MiscTactics, RecordStatus};
pub use world_state::{BoolVarName, OriginVarName, ShortVarName, WorldState};

/// Per-frame facts about the bot that goals and records read besides the world state.
#[derive(Debug, Clone)]
pub struct BotFacts {
    pub level_time: LevelTime,
    pub origin: Vec3,
    pub area_num: AreaNum,
    pub health: f32,
    pub armor: f32,
    pub travel_flags: u32,
    pub goal_pickup_action_radius: f32,
    pub selected_nav_entity: Option<NavEntity>,
    pub nav_entity_travel_time_millis: Option<u32>,
    pub enemies_valid: bool,
    pub enemy_origin: Option<Vec3>,
    pub enemies_damage_to_kill: f32,
    pub max_threat_factor: f32,
    pub could_be_hit_if_bot_turns: bool,
    pub hazard: Option<Hazard>,
}

impl Default for BotFacts {
    fn default() -> Self {
        BotFacts {
            level_time: 0,
            origin: Vec3::ZERO,
            area_num: 0,
            health: 100.0,
            armor: 0.0,
            travel_flags: TFL_DEFAULT,
            goal_pickup_action_radius: GOAL_PICKUP_ACTION_RADIUS,
            selected_nav_entity: None,
            nav_entity_travel_time_millis: None,
            enemies_valid: false,
            enemy_origin: None,
            enemies_damage_to_kill: 0.0,
            max_threat_factor: 0.0,
            could_be_hit_if_bot_turns: false,
            hazard: None,
        }
    }
}

impl BotFacts {
    #[inline]
    pub fn damage_to_be_killed(&self) -> f32 {
        self.health + self.armor
    }
}
