// tactical_bot_core/bot/src/systems/ai/bot.rs
use crate::core::config::BotAiConfig;
use crate::core::constants::{PLAYERBOX_STAND_VIEWHEIGHT, PMFEAT_DEFAULT};
use crate::core::error::BotResult;
use crate::core::types::*;
use crate::systems::ai::awareness::{EnemyFacts, Hazard, SelectedEnemies};
use crate::systems::ai::movement::{BotMovementModule, FrameEvents, MovementEnv, MovementFacts, PlayerMovePredictor, PlayerMoveState};
use crate::systems::ai::planning::{BotFacts, ExecutionState, GoalKind, GoalOrientedPlanner, PlanningContext};
use crate::systems::ai::world_state_builder::{EnemyAssessment, TacticalSpotsCache, WorldStateBuilder};
use crate::world::aas::{AasWorld, TravelType, TFL_DEFAULT};
use crate::world::collision::CollisionWorld;
use crate::world::route_cache::RouteCache;
use crate::world::tactical_spots::{SpotsQueryScratch, SpotsSolverEnv, TacticalSpotsRegistry};
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{debug, error, trace};

/// A trigger reachability fires once the bot is this close to its start.
const TRIGGER_TOUCH_DISTANCE: f32 = 40.0;
const JUMP_PAD_FLIGHT_SECONDS: f32 = 1.0;
pub const MAX_HEALTH: f32 = 100.0;
pub const MAX_ARMOR: f32 = 150.0;

/// Map data shared read-only by every bot.
#[derive(Clone, Copy)]
pub struct BotWorld<'w> {
    pub aas: &'w AasWorld,
    pub route_cache: &'w dyn RouteCache,
    pub collision: &'w dyn CollisionWorld,
    pub registry: &'w TacticalSpotsRegistry,
    pub predictor: &'w dyn PlayerMovePredictor,
    pub config: &'w BotAiConfig,
}

impl<'w> BotWorld<'w> {
    pub fn movement_env(&self) -> MovementEnv<'w> {
        MovementEnv {
            aas: self.aas,
            route_cache: self.route_cache,
            collision: self.collision,
            predictor: self.predictor,
            config: &self.config.movement,
        }
    }

    pub fn spots_env(&self) -> SpotsSolverEnv<'w> {
        SpotsSolverEnv { registry: self.registry, route_cache: self.route_cache, collision: self.collision }
    }
}

/// What the external item and enemy selectors supply for a think frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct BotPerception<'p> {
    pub level_time: LevelTime,
    pub selected_nav_entity: Option<NavEntity>,
    /// The primary enemy goes first. An empty slice keeps the previous selection until it times out.
    pub enemies: &'p [EnemyFacts],
    pub hazard: Option<Hazard>,
}

pub struct Bot {
    id: BotId,
    name: String,
    skill: f32,
    move_state: PlayerMoveState,
    last_area_num: AreaNum,
    travel_flags: u32,
    health: f32,
    armor: f32,
    planner: GoalOrientedPlanner,
    exec: ExecutionState,
    movement: BotMovementModule,
    enemies: SelectedEnemies,
    spots: TacticalSpotsCache,
    scratch: SpotsQueryScratch,
    selected_nav_entity: Option<NavEntity>,
    hazard: Option<Hazard>,
    last_input: BotInput,
}

impl Bot {
    pub fn new(id: BotId, name: impl Into<String>, skill: f32, origin: Vec3, world: &BotWorld) -> BotResult<Self> {
        let name = name.into();
        let planner = GoalOrientedPlanner::new(name.clone(), &GoalKind::ALL)?;
        Ok(Bot {
            id,
            skill: skill.clamp(0.0, 1.0),
            move_state: PlayerMoveState::new(origin, PMFEAT_DEFAULT),
            last_area_num: world.aas.find_area_num(origin),
            travel_flags: TFL_DEFAULT,
            health: MAX_HEALTH,
            armor: 0.0,
            planner,
            exec: ExecutionState::default(),
            movement: BotMovementModule::new(&world.config.movement),
            enemies: SelectedEnemies::new(),
            spots: TacticalSpotsCache::new(seahash::hash(name.as_bytes())),
            scratch: SpotsQueryScratch::for_registry(world.registry),
            selected_nav_entity: None,
            hazard: None,
            last_input: BotInput::default(),
            name,
        })
    }

    #[inline]
    pub fn id(&self) -> BotId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn skill(&self) -> f32 {
        self.skill
    }

    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.move_state.physics.origin
    }

    pub fn move_state(&self) -> &PlayerMoveState {
        &self.move_state
    }

    #[inline]
    pub fn health(&self) -> f32 {
        self.health
    }

    #[inline]
    pub fn armor(&self) -> f32 {
        self.armor
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn planner(&self) -> &GoalOrientedPlanner {
        &self.planner
    }

    pub fn execution_state(&self) -> &ExecutionState {
        &self.exec
    }

    pub fn movement(&self) -> &BotMovementModule {
        &self.movement
    }

    pub fn last_input(&self) -> &BotInput {
        &self.last_input
    }

    /// Armor absorbs two thirds of the damage while it lasts. Returns true if the bot has been killed.
    pub fn apply_damage(&mut self, damage: f32) -> bool {
        let absorbed = (damage * 2.0 / 3.0).min(self.armor);
        self.armor -= absorbed;
        self.health -= damage - absorbed;
        !self.is_alive()
    }

    pub fn pickup(&mut self, kind: ItemKind) {
        match kind {
            ItemKind::Health => self.health = (self.health + 25.0).min(MAX_HEALTH),
            ItemKind::Armor => self.armor = (self.armor + 50.0).min(MAX_ARMOR),
            ItemKind::Powerup => self.health = (self.health + 50.0).min(2.0 * MAX_HEALTH),
            ItemKind::Weapon | ItemKind::Ammo => {}
        }
        debug!("[Bot {}] Picked up {:?}", self.name, kind);
    }

    /// Puts the bot at a spawn point with a fresh state. Nothing of the previous life is kept.
    pub fn respawn(&mut self, world: &BotWorld, origin: Vec3) {
        debug!("[Bot {}] Respawning at {}", self.name, origin);
        self.move_state = PlayerMoveState::new(origin, PMFEAT_DEFAULT);
        self.last_area_num = world.aas.find_area_num(origin);
        self.health = MAX_HEALTH;
        self.armor = 0.0;
        self.planner.clear_goal_and_plan(&mut self.exec);
        self.movement.reset();
        self.enemies.invalidate();
        self.spots.invalidate();
        self.selected_nav_entity = None;
        self.hazard = None;
        self.last_input = BotInput::default();
    }

    fn update_awareness(&mut self, world: &BotWorld, perception: &BotPerception) {
        let level_time = perception.level_time;
        self.selected_nav_entity = perception.selected_nav_entity;
        self.hazard = perception.hazard.filter(|hazard| hazard.is_valid(level_time));
        if !perception.enemies.is_empty() {
            let timeout_millis = world.config.simulation.enemy_selection_timeout_millis;
            self.enemies.set(perception.enemies, level_time, timeout_millis);
        } else if !self.enemies.enemies().is_empty() && !self.enemies.are_valid(level_time) {
            self.enemies.invalidate();
        }
        let hazard_attacker = self.hazard.and_then(|hazard| hazard.attacker_id.map(|id| (id, hazard.damage)));
        let physics = &self.move_state.physics;
        self.enemies.update_bot_view(physics.origin, physics.forward_dir, hazard_attacker);

        let area_num = world.aas.find_area_num(physics.origin);
        if area_num != 0 {
            self.last_area_num = area_num;
        }
    }

    fn build_facts(&mut self, world: &BotWorld, level_time: LevelTime) -> BotFacts {
        let origin = self.origin();
        let area_num = self.last_area_num;
        let nav_entity_travel_time_millis = self.selected_nav_entity.and_then(|entity| {
            let centis = world.route_cache.travel_time_to_area(area_num, entity.area_num, self.travel_flags);
            (centis != 0).then_some(centis * 10)
        });
        let mut facts = BotFacts {
            level_time,
            origin,
            area_num,
            health: self.health,
            armor: self.armor,
            travel_flags: self.travel_flags,
            goal_pickup_action_radius: world.config.planner.goal_pickup_action_radius,
            selected_nav_entity: self.selected_nav_entity,
            nav_entity_travel_time_millis,
            hazard: self.hazard,
            ..BotFacts::default()
        };
        if self.enemies.are_valid(level_time) {
            facts.enemies_valid = true;
            facts.enemy_origin = self.enemies.closest_enemy_origin(origin);
            facts.enemies_damage_to_kill = self.enemies.damage_to_kill();
            facts.max_threat_factor = self.enemies.max_threat_factor(level_time, world.collision);
            facts.could_be_hit_if_bot_turns = self.enemies.could_be_hit_if_bot_turns(level_time, world.collision);
        }
        facts
    }

    fn assess_enemies(&mut self, world: &BotWorld, level_time: LevelTime) -> EnemyAssessment {
        if !self.enemies.are_valid(level_time) {
            return EnemyAssessment::default();
        }
        EnemyAssessment {
            can_hit_enemy: self.enemies.could_be_hit_if_bot_turns(level_time, world.collision),
            enemy_can_hit: self.enemies.can_hit(level_time, world.collision),
            has_threatening_enemy: self.enemies.are_threatening(level_time, world.collision),
        }
    }

    /// Runs the planner state machine and the movement module for a single frame.
    pub fn think(&mut self, world: &BotWorld, perception: &BotPerception) -> BotResult<BotInput> {
        let started_at = Instant::now();
        let level_time = perception.level_time;
        self.update_awareness(world, perception);
        let facts = self.build_facts(world, level_time);
        let assessment = self.assess_enemies(world, level_time);

        let world_state = WorldStateBuilder {
            env: world.spots_env(),
            config: &world.config.tactical,
            scratch: &mut self.scratch,
            spots: &mut self.spots,
        }
        .build(&facts, &assessment);

        let ctx = PlanningContext { aas: world.aas, route_cache: world.route_cache, config: &world.config.planner, facts: &facts };
        if let Err(err) = self.planner.think(&ctx, &world_state, &mut self.exec) {
            if !err.is_internal_consistency_error() {
                return Err(err);
            }
            error!("[Bot {}] The planner has failed: {}", self.name, err);
            counter!("ai_planner_internal_errors_total").increment(1);
            self.planner.clear_goal_and_plan(&mut self.exec);
        }

        let keep_crosshair_on_enemy = self.exec.misc_tactics.should_keep_crosshair_on_enemy;
        let movement_facts = MovementFacts {
            level_time,
            skill: self.skill,
            travel_flags: self.travel_flags,
            nav_target: self.exec.nav_target,
            keep_crosshair_on_enemy: keep_crosshair_on_enemy && facts.enemy_origin.is_some(),
            enemy_origin: facts.enemy_origin,
            enemies_potentially_hittable: facts.enemies_valid
                && self.enemies.are_potentially_hittable(level_time, world.collision),
            should_attack: !self.exec.misc_tactics.will_retreat && facts.enemies_valid,
            hazard: self.hazard,
            ..MovementFacts::default()
        };
        let mut input = self.movement.frame(&world.movement_env(), &movement_facts, &self.move_state);

        if keep_crosshair_on_enemy {
            if let Some(enemy_origin) = facts.enemy_origin {
                let eye = self.origin() + Vec3::Z * PLAYERBOX_STAND_VIEWHEIGHT;
                input.intended_look_dir = (enemy_origin - eye).normalize_or_zero();
                input.can_override_look_vec = false;
            }
        }
        self.last_input = input;
        histogram!("ai_bot_think_time_seconds").record(started_at.elapsed().as_secs_f64());
        Ok(input)
    }

    /// Moves the bot for `millis` with the given input and fires triggers it has touched.
    pub fn apply_input(&mut self, world: &BotWorld, input: &BotInput, millis: u32) -> FrameEvents {
        let (mut state, mut events) = world.predictor.predict(&self.move_state, input, millis, world.collision);
        let area_num = world.aas.find_area_num(self.move_state.physics.origin);
        if area_num != 0 {
            for reach_num in world.aas.area_reach_nums(area_num) {
                let reach = world.aas.reach(reach_num);
                if reach.start.distance(state.physics.origin) > TRIGGER_TOUCH_DISTANCE {
                    continue;
                }
                match reach.travel_type {
                    TravelType::Teleport => {
                        trace!("[Bot {}] Teleported to {}", self.name, reach.end);
                        state.physics.origin = reach.end;
                        state.physics.velocity = Vec3::ZERO;
                        state.physics.on_ground = true;
                        self.movement.reset();
                    }
                    TravelType::JumpPad => {
                        let delta = reach.end - state.physics.origin;
                        let t = JUMP_PAD_FLIGHT_SECONDS;
                        let lift = delta.z / t + 0.5 * world.predictor.gravity() * t;
                        state.physics.velocity = Vec3::new(delta.x / t, delta.y / t, lift);
                        state.physics.on_ground = false;
                    }
                    _ => continue,
                }
                events.has_touched_trigger = true;
                break;
            }
        }
        self.move_state = state;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::ai::movement::SimplePmove;
    use crate::world::map_generator::{GeneratedMap, MapGenerator};
    use crate::world::route_cache::AasRouteCache;
    use std::sync::Arc;

    struct Fixture {
        map: GeneratedMap,
        route_cache: AasRouteCache,
        registry: TacticalSpotsRegistry,
        predictor: SimplePmove,
        config: BotAiConfig,
    }

    impl Fixture {
        fn arena() -> Self {
            let config = BotAiConfig::default();
            let map = MapGenerator::generate_arena("bot_test", 6, 6, 192.0, 11).unwrap();
            let route_cache = AasRouteCache::new(Arc::clone(&map.aas));
            let registry =
                TacticalSpotsRegistry::load_or_build(&map.name, &map.aas, &route_cache, map.collision.as_ref(), &config.tactical)
                    .unwrap();
            let predictor = SimplePmove::from_config(&config.movement);
            Fixture { map, route_cache, registry, predictor, config }
        }

        fn world(&self) -> BotWorld<'_> {
            BotWorld {
                aas: &self.map.aas,
                route_cache: &self.route_cache,
                collision: self.map.collision.as_ref(),
                registry: &self.registry,
                predictor: &self.predictor,
                config: &self.config,
            }
        }

        fn cell_origin(&self, ix: usize, iy: usize) -> Vec3 {
            self.map.aas.area(self.map.cell_area(ix, iy)).standing_point()
        }
    }

    #[test]
    fn armor_absorbs_damage() {
        let fixture = Fixture::arena();
        let world = fixture.world();
        let mut bot = Bot::new(1, "armored", 0.5, fixture.cell_origin(0, 0), &world).unwrap();
        bot.pickup(ItemKind::Armor);
        assert!(!bot.apply_damage(30.0));
        assert_eq!(bot.armor(), 30.0);
        assert_eq!(bot.health(), 90.0);
        assert!(bot.apply_damage(500.0));
        bot.respawn(&world, fixture.cell_origin(1, 0));
        assert!(bot.is_alive());
        assert_eq!(bot.armor(), 0.0);
    }

    #[test]
    fn thinks_toward_a_selected_item() {
        let fixture = Fixture::arena();
        let world = fixture.world();
        let mut bot = Bot::new(2, "collector", 0.9, fixture.cell_origin(0, 0), &world).unwrap();
        let target = fixture.cell_origin(2, 0);
        let entity = NavEntity { id: 77, origin: target, kind: ItemKind::Health, area_num: fixture.map.cell_area(2, 0) };
        let perception = BotPerception { level_time: 1000, selected_nav_entity: Some(entity), ..Default::default() };
        let input = bot.think(&world, &perception).unwrap();
        assert_eq!(bot.planner().active_goal(), Some(GoalKind::GrabItem));
        assert_eq!(bot.execution_state().nav_target.map(|t| t.area_num), Some(entity.area_num));
        assert!(input.has_movement());
    }

    #[test]
    fn aims_at_a_visible_enemy() {
        let fixture = Fixture::arena();
        let world = fixture.world();
        let origin = fixture.cell_origin(0, 0);
        let mut bot = Bot::new(3, "shooter", 0.5, origin, &world).unwrap();
        let enemy_origin = fixture.cell_origin(0, 1);
        let mut enemy = EnemyFacts::new(9, enemy_origin);
        enemy.look_dir = (origin - enemy_origin).normalize();
        let enemies = [enemy];
        let perception = BotPerception { level_time: 500, enemies: &enemies, ..Default::default() };
        let input = bot.think(&world, &perception).unwrap();
        assert!(bot.planner().active_goal().is_some());
        if bot.execution_state().misc_tactics.should_keep_crosshair_on_enemy {
            assert!(input.intended_look_dir.y > 0.5);
        }
    }

    #[test]
    fn touching_a_teleporter_moves_the_bot() {
        let fixture = Fixture::arena();
        let world = fixture.world();
        let mut bot = Bot::new(4, "traveller", 0.5, fixture.cell_origin(0, 0), &world).unwrap();
        let events = bot.apply_input(&world, &BotInput::default(), 16);
        assert!(events.has_touched_trigger);
        assert_eq!(fixture.map.aas.find_area_num(bot.origin()), fixture.map.cell_area(5, 5));
    }
}
