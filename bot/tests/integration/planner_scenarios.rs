// tactical_bot_core/bot/tests/integration/planner_scenarios.rs
//! The planner state machine on real goals and a generated corridor map.

use tactical_bot_core::core::config::PlannerConfig;
use tactical_bot_core::core::types::*;
use tactical_bot_core::systems::ai::awareness::Hazard;
use tactical_bot_core::systems::ai::planning::{
    ActionRecord, BoolVarName, BotFacts, ExecutionState, GoalKind, GoalOrientedPlanner, OriginVarName, PlanningContext,
    ShortVarName, WorldState,
};
use tactical_bot_core::world::map_generator::{GeneratedMap, MapGenerator};
use tactical_bot_core::world::route_cache::AasRouteCache;
use tactical_bot_core::BotError;

use std::sync::Arc;

struct Scenario {
    map: GeneratedMap,
    route_cache: AasRouteCache,
    config: PlannerConfig,
}

impl Scenario {
    fn corridor() -> Self {
        let map = MapGenerator::generate_corridor("planner_corridor", 8, 192.0).expect("corridor");
        let route_cache = AasRouteCache::new(Arc::clone(&map.aas));
        Scenario { map, route_cache, config: PlannerConfig::default() }
    }

    fn cell(&self, i: usize) -> Vec3 {
        self.map.aas.area(self.map.cell_area(i, 0)).standing_point()
    }

    fn entity(&self, i: usize) -> NavEntity {
        NavEntity { id: 100 + i as u32, origin: self.cell(i), kind: ItemKind::Health, area_num: self.map.cell_area(i, 0) }
    }

    fn facts_at(&self, i: usize, level_time: LevelTime) -> BotFacts {
        BotFacts { level_time, origin: self.cell(i), area_num: self.map.cell_area(i, 0), ..BotFacts::default() }
    }

    fn ctx<'a>(&'a self, facts: &'a BotFacts) -> PlanningContext<'a> {
        PlanningContext { aas: &self.map.aas, route_cache: &self.route_cache, config: &self.config, facts }
    }
}

fn base_world_state(facts: &BotFacts) -> WorldState {
    let mut ws = WorldState::new();
    ws.set_origin(OriginVarName::BotOrigin, facts.origin);
    ws.set_short(ShortVarName::Health, facts.health as i16);
    ws.set_short(ShortVarName::Armor, facts.armor as i16);
    for name in [
        BoolVarName::HasJustPickedGoalItem,
        BoolVarName::HasJustKilledEnemy,
        BoolVarName::IsRunningAway,
        BoolVarName::HasRunAway,
        BoolVarName::HasReactedToHazard,
    ] {
        ws.set_bool(name, false);
    }
    if let Some(entity) = facts.selected_nav_entity {
        ws.set_origin(OriginVarName::NavTargetOrigin, entity.origin);
    }
    ws
}

#[test]
fn grab_item_plan_runs_then_picks_up() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("grabber", &GoalKind::ALL).unwrap();
    let mut exec = ExecutionState::default();
    let entity = scenario.entity(5);

    let mut facts = scenario.facts_at(0, 1000);
    facts.selected_nav_entity = Some(entity);
    facts.nav_entity_travel_time_millis = Some(1500);
    let ws = base_world_state(&facts);
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();

    assert_eq!(planner.active_goal(), Some(GoalKind::GrabItem));
    let names: Vec<&str> = planner.plan().iter().map(ActionRecord::name).collect();
    assert_eq!(names, ["RunToNavEntity", "PickupNavEntity"]);
    assert_eq!(exec.nav_target.map(|t| t.area_num), Some(entity.area_num));
    assert!(planner.last_nodes_expanded() >= 2);

    // The bot has arrived: the run record completes and the pickup record becomes the head
    let mut facts = scenario.facts_at(5, 1100);
    facts.selected_nav_entity = Some(entity);
    facts.nav_entity_travel_time_millis = Some(1);
    let ws = base_world_state(&facts);
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("PickupNavEntity"));
    assert!(exec.nav_target.is_some());

    // The item selector drops a picked up item, which completes the plan
    let facts = scenario.facts_at(5, 1200);
    let ws = base_world_state(&facts);
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert!(planner.plan().is_empty());
    assert!(exec.nav_target.is_none());

    // Nothing is relevant and plannable anymore
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.active_goal(), None);
}

#[test]
fn strong_bot_attacks_a_hittable_enemy() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("attacker", &GoalKind::ALL).unwrap();
    let mut exec = ExecutionState::default();

    let mut facts = scenario.facts_at(1, 500);
    facts.health = 200.0;
    facts.armor = 100.0;
    facts.enemies_valid = true;
    facts.enemy_origin = Some(scenario.cell(4));
    facts.enemies_damage_to_kill = 100.0;
    facts.could_be_hit_if_bot_turns = true;
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::EnemyOrigin, scenario.cell(4));
    ws.set_bool(BoolVarName::CanHitEnemy, true);
    ws.set_bool(BoolVarName::HasPositionalAdvantage, false);

    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::KillEnemy));
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("AttackFromCurrentPosition"));
    assert!(exec.misc_tactics.should_keep_crosshair_on_enemy);
    assert!(exec.nav_target.is_none());
}

#[test]
fn weak_threatened_bot_runs_away() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("coward", &GoalKind::ALL).unwrap();
    let mut exec = ExecutionState::default();

    let mut facts = scenario.facts_at(3, 500);
    facts.health = 20.0;
    facts.enemies_valid = true;
    facts.enemy_origin = Some(scenario.cell(1));
    facts.enemies_damage_to_kill = 150.0;
    facts.max_threat_factor = 1.0;
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::EnemyOrigin, scenario.cell(1));
    ws.set_bool(BoolVarName::HasThreateningEnemy, true);
    ws.set_bool(BoolVarName::CanHitEnemy, false);
    ws.set_origin(OriginVarName::RunAwaySpot, scenario.cell(7));

    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::RunAway));
    let names: Vec<&str> = planner.plan().iter().map(ActionRecord::name).collect();
    assert_eq!(names, ["StartRunningAway", "FleeToSpot"]);
    assert!(exec.misc_tactics.will_retreat);

    // The start record completes at once and the flee record takes over
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("FleeToSpot"));
    assert_eq!(exec.nav_target.map(|t| t.area_num), Some(scenario.map.cell_area(7, 0)));
}

#[test]
fn cover_is_preferred_when_it_is_closer() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("hider", &[GoalKind::RunAway]).unwrap();
    let mut exec = ExecutionState::default();

    let mut facts = scenario.facts_at(3, 500);
    facts.health = 10.0;
    facts.enemies_valid = true;
    facts.enemy_origin = Some(scenario.cell(0));
    facts.max_threat_factor = 1.0;
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::EnemyOrigin, scenario.cell(0));
    ws.set_bool(BoolVarName::HasThreateningEnemy, true);
    ws.set_origin(OriginVarName::RunAwaySpot, scenario.cell(7));
    ws.set_origin(OriginVarName::CoverSpot, scenario.cell(4));

    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    let names: Vec<&str> = planner.plan().iter().map(ActionRecord::name).collect();
    assert_eq!(names, ["StartGotoCover", "TakeCover"]);
}

#[test]
fn live_hazard_outweighs_roaming() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("dodger", &GoalKind::ALL).unwrap();
    let mut exec = ExecutionState::default();

    let mut facts = scenario.facts_at(2, 1000);
    facts.hazard = Some(Hazard::splash(scenario.cell(2), 120.0, 80.0, 1400));
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::DodgeSpot, scenario.cell(3));
    ws.set_origin(OriginVarName::RoamSpot, scenario.cell(6));

    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::ReactToHazard));
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("DodgeToSpot"));

    // Once the hazard is gone the dodge record completes
    let mut facts = scenario.facts_at(2, 1500);
    facts.hazard = None;
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::RoamSpot, scenario.cell(6));
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert!(planner.plan().is_empty());
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::Roam));
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("RoamToSpot"));
}

#[test]
fn node_pool_exhaustion_is_reported_and_recoverable() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::with_node_capacity("tiny", &GoalKind::ALL, 1).unwrap();
    let mut exec = ExecutionState::default();

    let facts = scenario.facts_at(0, 100);
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::RoamSpot, scenario.cell(5));

    let err = planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap_err();
    assert!(matches!(err, BotError::CapacityExceeded { what: "planner nodes", .. }));
    assert!(err.is_internal_consistency_error());

    planner.clear_goal_and_plan(&mut exec);
    assert_eq!(planner.active_goal(), None);
    assert!(exec.nav_target.is_none());
    assert_eq!(planner.num_used_nodes(), 0);
}

#[test]
fn unreachable_item_is_not_planned() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("stuck", &[GoalKind::GrabItem]).unwrap();
    let mut exec = ExecutionState::default();

    let entity = NavEntity { id: 9, origin: Vec3::new(-4000.0, -4000.0, 24.0), kind: ItemKind::Armor, area_num: 0 };
    let mut facts = scenario.facts_at(0, 100);
    facts.selected_nav_entity = Some(entity);
    facts.nav_entity_travel_time_millis = Some(5000);
    let ws = base_world_state(&facts);
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.active_goal(), None);
    assert!(exec.nav_target.is_none());
    // A failed search gives every node back
    assert_eq!(planner.num_used_nodes(), 0);
    assert!(planner.build_plan(0, &scenario.ctx(&facts), &ws).unwrap().is_none());
    assert_eq!(planner.num_used_nodes(), 0);
}

#[test]
fn plan_cost_is_the_sum_of_transition_costs() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("summer", &GoalKind::ALL).unwrap();
    let goal_index = |planner: &GoalOrientedPlanner, kind: GoalKind| planner.goals().iter().position(|g| g.kind == kind).unwrap();

    let mut facts = scenario.facts_at(0, 1000);
    facts.selected_nav_entity = Some(scenario.entity(6));
    facts.nav_entity_travel_time_millis = Some(2000);
    let ws = base_world_state(&facts);
    let index = goal_index(&planner, GoalKind::GrabItem);
    let plan = planner.build_plan(index, &scenario.ctx(&facts), &ws).unwrap().unwrap();
    assert_eq!(plan.records.len(), 2);
    assert_eq!(plan.transition_costs.len(), plan.records.len());
    assert!(plan.transition_costs.iter().all(|&cost| cost > 0.0));
    assert!((plan.cost - plan.transition_costs.iter().sum::<f32>()).abs() < 1e-3);
    assert_eq!(planner.num_used_nodes(), 0);

    let mut facts = scenario.facts_at(3, 1000);
    facts.health = 10.0;
    facts.enemies_valid = true;
    facts.enemy_origin = Some(scenario.cell(0));
    facts.max_threat_factor = 1.0;
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::EnemyOrigin, scenario.cell(0));
    ws.set_bool(BoolVarName::HasThreateningEnemy, true);
    ws.set_origin(OriginVarName::RunAwaySpot, scenario.cell(7));
    ws.set_origin(OriginVarName::CoverSpot, scenario.cell(5));
    let index = goal_index(&planner, GoalKind::RunAway);
    let plan = planner.build_plan(index, &scenario.ctx(&facts), &ws).unwrap().unwrap();
    assert_eq!(plan.transition_costs.len(), plan.records.len());
    assert!((plan.cost - plan.transition_costs.iter().sum::<f32>()).abs() < 1e-3);
    assert_eq!(planner.num_used_nodes(), 0);
}

#[test]
fn heavier_goal_preempts_only_beyond_the_keep_threshold() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("wanderer", &[GoalKind::GrabItem, GoalKind::Roam]).unwrap();
    let mut exec = ExecutionState::default();
    let entity = scenario.entity(5);
    let roam_period = scenario.config.roam_update_period_millis as LevelTime;
    let grab_period = scenario.config.grab_item_update_period_millis as LevelTime;
    let world_state = |facts: &BotFacts| {
        let mut ws = base_world_state(facts);
        ws.set_origin(OriginVarName::RoamSpot, scenario.cell(6));
        ws
    };
    let facts_with_item = |level_time: LevelTime, travel_time_millis: u32| {
        let mut facts = scenario.facts_at(0, level_time);
        facts.selected_nav_entity = Some(entity);
        facts.nav_entity_travel_time_millis = Some(travel_time_millis);
        facts
    };

    let facts = scenario.facts_at(0, 1000);
    planner.think(&scenario.ctx(&facts), &world_state(&facts), &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::Roam));
    assert_eq!(planner.next_active_goal_update_at(), 1000 + roam_period);

    // A heavy item does not matter until the goal update is due
    let facts = facts_with_item(2000, 1000);
    planner.think(&scenario.ctx(&facts), &world_state(&facts), &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::Roam));
    assert_eq!(planner.next_active_goal_update_at(), 1000 + roam_period);

    // A far item is heavier than roaming but within the threshold: the current goal is kept and replanned
    let facts = facts_with_item(2600, 8000);
    planner.think(&scenario.ctx(&facts), &world_state(&facts), &mut exec).unwrap();
    let weight_of = |kind: GoalKind| planner.goals().iter().find(|g| g.kind == kind).unwrap().weight;
    let (grab_weight, roam_weight) = (weight_of(GoalKind::GrabItem), weight_of(GoalKind::Roam));
    assert!(grab_weight > roam_weight);
    assert!(grab_weight < roam_weight + scenario.config.keep_curr_goal_weight_threshold);
    assert_eq!(planner.active_goal(), Some(GoalKind::Roam));
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("RoamToSpot"));
    assert_eq!(planner.next_active_goal_update_at(), 2600 + roam_period);

    // A close item beats the threshold
    let facts = facts_with_item(4200, 1000);
    planner.think(&scenario.ctx(&facts), &world_state(&facts), &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::GrabItem));
    let names: Vec<&str> = planner.plan().iter().map(ActionRecord::name).collect();
    assert_eq!(names, ["RunToNavEntity", "PickupNavEntity"]);
    assert_eq!(exec.nav_target.map(|t| t.area_num), Some(entity.area_num));
    assert_eq!(planner.next_active_goal_update_at(), 4200 + grab_period);
}

#[test]
fn unplannable_current_goal_yields_to_another_one() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("runner", &[GoalKind::RunAway, GoalKind::Roam]).unwrap();
    let mut exec = ExecutionState::default();

    let mut facts = scenario.facts_at(3, 500);
    facts.health = 20.0;
    facts.enemies_valid = true;
    facts.enemy_origin = Some(scenario.cell(1));
    facts.enemies_damage_to_kill = 150.0;
    facts.max_threat_factor = 1.0;
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::EnemyOrigin, scenario.cell(1));
    ws.set_bool(BoolVarName::HasThreateningEnemy, true);
    ws.set_origin(OriginVarName::RoamSpot, scenario.cell(0));
    let mut ws_with_spot = ws.clone();
    ws_with_spot.set_origin(OriginVarName::RunAwaySpot, scenario.cell(7));

    planner.think(&scenario.ctx(&facts), &ws_with_spot, &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::RunAway));
    planner.think(&scenario.ctx(&facts), &ws_with_spot, &mut exec).unwrap();
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("FleeToSpot"));

    // No spot to run away to is known anymore when the goal gets updated
    facts.level_time = 500 + scenario.config.run_away_update_period_millis as LevelTime + 50;
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert!(planner.goals().iter().any(|g| g.kind == GoalKind::RunAway && g.is_relevant()));
    assert_eq!(planner.active_goal(), Some(GoalKind::Roam));
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("RoamToSpot"));
    assert_eq!(exec.nav_target.map(|t| t.area_num), Some(scenario.map.cell_area(0, 0)));
}

fn hazard_scenario_start(scenario: &Scenario, planner: &mut GoalOrientedPlanner, exec: &mut ExecutionState) -> Hazard {
    let hazard = Hazard::splash(scenario.cell(2), 120.0, 80.0, 1400);
    let mut facts = scenario.facts_at(2, 1000);
    facts.hazard = Some(hazard);
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::DodgeSpot, scenario.cell(3));
    ws.set_origin(OriginVarName::RoamSpot, scenario.cell(6));
    planner.think(&scenario.ctx(&facts), &ws, exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::ReactToHazard));
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("DodgeToSpot"));
    hazard
}

#[test]
fn irrelevant_current_goal_is_replaced() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("dodger", &[GoalKind::ReactToHazard, GoalKind::Roam]).unwrap();
    let mut exec = ExecutionState::default();
    let hazard = hazard_scenario_start(&scenario, &mut planner, &mut exec);

    // The hazard has timed out but is still reported, so the dodge record stays valid
    let mut facts = scenario.facts_at(2, 1500);
    facts.hazard = Some(hazard);
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::DodgeSpot, scenario.cell(3));
    ws.set_origin(OriginVarName::RoamSpot, scenario.cell(6));
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert_eq!(planner.active_goal(), Some(GoalKind::Roam));
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("RoamToSpot"));
    assert_eq!(exec.nav_target.map(|t| t.area_num), Some(scenario.map.cell_area(6, 0)));
}

#[test]
fn plan_is_kept_when_no_goal_is_relevant() {
    let scenario = Scenario::corridor();
    let mut planner = GoalOrientedPlanner::new("dodger", &[GoalKind::ReactToHazard]).unwrap();
    let mut exec = ExecutionState::default();
    let hazard = hazard_scenario_start(&scenario, &mut planner, &mut exec);
    let update_at = planner.next_active_goal_update_at();

    let mut facts = scenario.facts_at(2, 1500);
    facts.hazard = Some(hazard);
    let mut ws = base_world_state(&facts);
    ws.set_origin(OriginVarName::DodgeSpot, scenario.cell(3));
    assert!(facts.level_time >= update_at);
    planner.think(&scenario.ctx(&facts), &ws, &mut exec).unwrap();
    assert!(planner.goals().iter().all(|g| !g.is_relevant()));
    assert_eq!(planner.active_goal(), Some(GoalKind::ReactToHazard));
    assert_eq!(planner.plan_head().map(ActionRecord::name), Some("DodgeToSpot"));
    assert_eq!(exec.nav_target.map(|t| t.area_num), Some(scenario.map.cell_area(3, 0)));
    assert_eq!(planner.next_active_goal_update_at(), update_at);
}
