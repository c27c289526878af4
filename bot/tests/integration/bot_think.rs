// tactical_bot_core/bot/tests/integration/bot_think.rs
//! Whole bots thinking and moving over many ticks.

use tactical_bot_core::core::constants::TICK_DURATION_MS;
use tactical_bot_core::core::types::*;
use tactical_bot_core::systems::ai::awareness::EnemyFacts;
use tactical_bot_core::systems::ai::movement::SimplePmove;
use tactical_bot_core::systems::ai::planning::GoalKind;
use tactical_bot_core::world::collision::CollisionWorld;
use tactical_bot_core::world::map_generator::{GeneratedMap, MapGenerator};
use tactical_bot_core::world::route_cache::AasRouteCache;
use tactical_bot_core::world::tactical_spots::TacticalSpotsRegistry;
use tactical_bot_core::{Bot, BotAiConfig, BotPerception, BotWorld};

use std::sync::Arc;

struct Level {
    map: GeneratedMap,
    route_cache: AasRouteCache,
    registry: TacticalSpotsRegistry,
    predictor: SimplePmove,
    config: BotAiConfig,
}

impl Level {
    fn new(map: GeneratedMap) -> Self {
        let config = BotAiConfig::default();
        let route_cache = AasRouteCache::new(Arc::clone(&map.aas));
        let registry =
            TacticalSpotsRegistry::load_or_build(&map.name, &map.aas, &route_cache, map.collision.as_ref(), &config.tactical)
                .expect("registry");
        let predictor = SimplePmove::from_config(&config.movement);
        Level { map, route_cache, registry, predictor, config }
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

    fn cell(&self, ix: usize, iy: usize) -> Vec3 {
        self.map.aas.area(self.map.cell_area(ix, iy)).standing_point()
    }
}

#[test]
fn bot_walks_to_a_selected_item() {
    let level = Level::new(MapGenerator::generate_corridor("think_corridor", 8, 192.0).expect("corridor"));
    let world = level.world();
    let mut bot = Bot::new(1, "walker", 0.8, level.cell(0, 0), &world).unwrap();
    let entity = NavEntity { id: 5, origin: level.cell(5, 0), kind: ItemKind::Health, area_num: level.map.cell_area(5, 0) };

    let mut level_time = 0;
    let mut reached = false;
    for _ in 0..600 {
        level_time += TICK_DURATION_MS as LevelTime;
        let perception = BotPerception { level_time, selected_nav_entity: Some(entity), ..Default::default() };
        let input = bot.think(&world, &perception).unwrap();
        bot.apply_input(&world, &input, TICK_DURATION_MS as u32);
        assert_eq!(level.map.collision.point_contents(bot.origin()) & CONTENTS_SOLID, 0);
        if bot.origin().distance(entity.origin) < 64.0 {
            reached = true;
            break;
        }
    }
    assert!(reached, "the bot stopped at {:?}", bot.origin());
    assert_eq!(bot.planner().active_goal(), Some(GoalKind::GrabItem));
}

#[test]
fn bots_facing_each_other_pick_combat_goals() {
    let level = Level::new(MapGenerator::generate_arena("think_arena", 8, 8, 192.0, 5).expect("arena"));
    let world = level.world();
    let (a_origin, b_origin) = (level.cell(0, 0), level.cell(0, 2));
    let mut a = Bot::new(1, "alpha", 0.7, a_origin, &world).unwrap();
    let mut b = Bot::new(2, "bravo", 0.7, b_origin, &world).unwrap();

    let mut level_time = 1000;
    for _ in 0..60 {
        level_time += TICK_DURATION_MS as LevelTime;
        let mut b_as_enemy = EnemyFacts::new(b.id(), b.origin());
        b_as_enemy.look_dir = (a.origin() - b.origin()).normalize_or_zero();
        let mut a_as_enemy = EnemyFacts::new(a.id(), a.origin());
        a_as_enemy.look_dir = (b.origin() - a.origin()).normalize_or_zero();
        let (a_enemies, b_enemies) = ([b_as_enemy], [a_as_enemy]);

        let a_input = a.think(&world, &BotPerception { level_time, enemies: &a_enemies, ..Default::default() }).unwrap();
        let b_input = b.think(&world, &BotPerception { level_time, enemies: &b_enemies, ..Default::default() }).unwrap();
        a.apply_input(&world, &a_input, TICK_DURATION_MS as u32);
        b.apply_input(&world, &b_input, TICK_DURATION_MS as u32);

        for bot in [&a, &b] {
            assert!(matches!(
                bot.planner().active_goal(),
                None | Some(GoalKind::KillEnemy) | Some(GoalKind::RunAway) | Some(GoalKind::Roam)
            ));
        }
    }
    assert!(a.planner().active_goal().is_some() || b.planner().active_goal().is_some());
}

#[test]
fn roaming_bots_stay_out_of_solids() {
    let level = Level::new(MapGenerator::generate_arena("roam_arena", 8, 8, 192.0, 23).expect("arena"));
    let world = level.world();
    let mut bots: Vec<Bot> = level
        .map
        .spawn_points
        .iter()
        .take(4)
        .enumerate()
        .map(|(i, &spawn)| Bot::new(i as BotId + 1, format!("roamer{}", i), 0.25 * i as f32, spawn, &world).unwrap())
        .collect();
    assert!(!bots.is_empty());

    let mut level_time = 0;
    for _ in 0..300 {
        level_time += TICK_DURATION_MS as LevelTime;
        for bot in &mut bots {
            let input = bot.think(&world, &BotPerception { level_time, ..Default::default() }).unwrap();
            bot.apply_input(&world, &input, TICK_DURATION_MS as u32);
            assert_eq!(level.map.collision.point_contents(bot.origin()) & CONTENTS_SOLID, 0);
            assert!(bot.is_alive());
        }
    }
}
