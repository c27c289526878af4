// tactical_bot_core/bot/src/main.rs
use tactical_bot_core::core::config::BotAiConfig;
use tactical_bot_core::core::constants::TICK_DURATION_MS;
use tactical_bot_core::core::types::*;
use tactical_bot_core::operational::monitoring::metrics::{init_logging, MetricsSystem};
use tactical_bot_core::systems::ai::awareness::{EnemyFacts, Hazard};
use tactical_bot_core::systems::ai::movement::{FrameEvents, SimplePmove};
use tactical_bot_core::systems::ai::{Bot, BotPerception, BotWorld};
use tactical_bot_core::world::aas::TFL_DEFAULT;
use tactical_bot_core::world::map_generator::{GeneratedMap, MapGenerator};
use tactical_bot_core::world::route_cache::{AasRouteCache, RouteCache};
use tactical_bot_core::world::tactical_spots::TacticalSpotsRegistry;
use tactical_bot_core::BotResult;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const ROCKET_SPLASH_RADIUS: f32 = 96.0;
const ROCKET_FLIGHT_MILLIS: u64 = 400;

#[derive(Debug, Clone, Copy)]
struct ItemState {
    entity: NavEntity,
    respawn_at: LevelTime,
}

impl ItemState {
    fn is_available(&self, level_time: LevelTime) -> bool {
        self.respawn_at <= level_time
    }
}

#[derive(Debug, Default, Serialize)]
struct BotSummary {
    name: String,
    skill: f32,
    health: f32,
    armor: f32,
    kills: u32,
    deaths: u32,
    items: u32,
    active_goal: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct SimulationStats {
    map: String,
    ticks: u64,
    tactical_spots: usize,
    think_errors: u64,
    teleports: u64,
    items_picked: u64,
    kills: u64,
    wall_time_seconds: f64,
    bots: Vec<BotSummary>,
}

/// What happened to a bot during a tick, produced in parallel and applied sequentially.
struct TickOutcome {
    input: Option<BotInput>,
    events: FrameEvents,
}

struct Simulation {
    map: GeneratedMap,
    route_cache: AasRouteCache,
    registry: TacticalSpotsRegistry,
    predictor: SimplePmove,
    config: BotAiConfig,
    bots: Vec<Bot>,
    items: Vec<ItemState>,
    hazards: Vec<Option<Hazard>>,
    rng: StdRng,
    level_time: LevelTime,
    stats: SimulationStats,
}

fn world<'w>(
    map: &'w GeneratedMap,
    route_cache: &'w AasRouteCache,
    registry: &'w TacticalSpotsRegistry,
    predictor: &'w SimplePmove,
    config: &'w BotAiConfig,
) -> BotWorld<'w> {
    BotWorld { aas: &map.aas, route_cache, collision: map.collision.as_ref(), registry, predictor, config }
}

impl Simulation {
    fn new(config: BotAiConfig) -> anyhow::Result<Self> {
        let sim = &config.simulation;
        let map = MapGenerator::generate_arena(
            &sim.map_name,
            sim.map_cells_x as usize,
            sim.map_cells_y as usize,
            sim.map_cell_side,
            sim.rng_seed,
        )
        .context("Failed to generate the arena")?;
        let route_cache = AasRouteCache::new(Arc::clone(&map.aas));
        let registry =
            TacticalSpotsRegistry::load_or_build(&map.name, &map.aas, &route_cache, map.collision.as_ref(), &config.tactical)
                .context("Failed to load or build tactical spots")?;
        info!("Tactical spots registry is ready: {} spots", registry.num_spots());
        let predictor = SimplePmove::from_config(&config.movement);

        let mut rng = StdRng::seed_from_u64(sim.rng_seed);
        let items = map.nav_entities.iter().map(|&entity| ItemState { entity, respawn_at: 0 }).collect();
        let mut bots = Vec::with_capacity(sim.bot_count);
        {
            let world = world(&map, &route_cache, &registry, &predictor, &config);
            for i in 0..sim.bot_count {
                let skill = match sim.skills.is_empty() {
                    true => 0.5,
                    false => sim.skills[i % sim.skills.len()],
                };
                let origin = Self::pick_spawn_point(&map, &mut rng);
                let bot = Bot::new(i as BotId, format!("bot{:02}", i), skill, origin, &world)
                    .with_context(|| format!("Failed to create bot #{}", i))?;
                bots.push(bot);
            }
        }
        let stats = SimulationStats {
            map: map.name.clone(),
            tactical_spots: registry.num_spots(),
            bots: bots
                .iter()
                .map(|bot| BotSummary { name: bot.name().to_string(), skill: bot.skill(), ..Default::default() })
                .collect(),
            ..Default::default()
        };
        let hazards = vec![None; bots.len()];
        Ok(Simulation { map, route_cache, registry, predictor, config, bots, items, hazards, rng, level_time: 0, stats })
    }

    fn pick_spawn_point(map: &GeneratedMap, rng: &mut StdRng) -> Vec3 {
        match map.spawn_points.len() {
            0 => map.aas.area(map.cell_area(1, 0)).standing_point(),
            n => map.spawn_points[rng.gen_range(0..n)],
        }
    }

    /// The nearest available item by travel time.
    fn select_nav_entity(&self, bot: &Bot) -> Option<NavEntity> {
        let from_area = self.map.aas.find_area_num(bot.origin());
        if from_area == 0 {
            return None;
        }
        self.items
            .iter()
            .filter(|item| item.is_available(self.level_time))
            .filter_map(|item| {
                let travel_time = self.route_cache.travel_time_to_area(from_area, item.entity.area_num, TFL_DEFAULT);
                (travel_time != 0 || from_area == item.entity.area_num).then_some((travel_time, item.entity))
            })
            .min_by_key(|&(travel_time, _)| travel_time)
            .map(|(_, entity)| entity)
    }

    /// Alive bots in view range, closest first.
    fn select_enemies(&self, bot_index: usize) -> Vec<EnemyFacts> {
        let bot = &self.bots[bot_index];
        let view_distance = self.config.simulation.enemy_view_distance;
        let mut enemies: Vec<(f32, EnemyFacts)> = self
            .bots
            .iter()
            .enumerate()
            .filter(|&(i, other)| i != bot_index && other.is_alive())
            .filter_map(|(_, other)| {
                let distance = other.origin().distance(bot.origin());
                if distance > view_distance {
                    return None;
                }
                let physics = &other.move_state().physics;
                let mut facts = EnemyFacts::new(other.id(), physics.origin);
                facts.last_seen_velocity = physics.velocity;
                facts.look_dir = physics.forward_dir;
                facts.damage_to_kill = other.health() + other.armor();
                Some((distance, facts))
            })
            .collect();
        enemies.sort_by(|a, b| a.0.total_cmp(&b.0));
        enemies.into_iter().map(|(_, facts)| facts).collect()
    }

    fn step(&mut self) {
        let level_time = self.level_time;
        let nav_entities: Vec<Option<NavEntity>> = self.bots.iter().map(|bot| self.select_nav_entity(bot)).collect();
        let enemies: Vec<Vec<EnemyFacts>> = (0..self.bots.len()).map(|i| self.select_enemies(i)).collect();
        let hazards = std::mem::take(&mut self.hazards);

        let world = world(&self.map, &self.route_cache, &self.registry, &self.predictor, &self.config);
        let outcomes: Vec<TickOutcome> = self
            .bots
            .par_iter_mut()
            .enumerate()
            .map(|(i, bot)| {
                if !bot.is_alive() {
                    return TickOutcome { input: None, events: FrameEvents::default() };
                }
                let perception = BotPerception {
                    level_time,
                    selected_nav_entity: nav_entities[i],
                    enemies: &enemies[i],
                    hazard: hazards[i],
                };
                let input: BotResult<BotInput> = bot.think(&world, &perception);
                match input {
                    Ok(input) => {
                        let events = bot.apply_input(&world, &input, TICK_DURATION_MS as u32);
                        TickOutcome { input: Some(input), events }
                    }
                    Err(err) => {
                        error!("[Bot {}] Think has failed: {}", bot.name(), err);
                        TickOutcome { input: None, events: FrameEvents::default() }
                    }
                }
            })
            .collect();

        self.hazards = vec![None; self.bots.len()];
        for (i, outcome) in outcomes.iter().enumerate() {
            if outcome.input.is_none() && self.bots[i].is_alive() {
                self.stats.think_errors += 1;
            }
            if outcome.events.has_touched_trigger {
                self.stats.teleports += 1;
            }
        }
        self.resolve_pickups();
        self.resolve_attacks(&enemies);
        self.level_time += TICK_DURATION_MS;
        self.stats.ticks += 1;
    }

    fn resolve_pickups(&mut self) {
        let radius = self.config.planner.goal_pickup_action_radius;
        let respawn_millis = self.config.simulation.item_respawn_millis;
        for (i, bot) in self.bots.iter_mut().enumerate() {
            if !bot.is_alive() {
                continue;
            }
            for item in self.items.iter_mut().filter(|item| item.is_available(self.level_time)) {
                if item.entity.origin.distance(bot.origin()) <= radius {
                    bot.pickup(item.entity.kind);
                    item.respawn_at = self.level_time + respawn_millis;
                    self.stats.items_picked += 1;
                    self.stats.bots[i].items += 1;
                }
            }
        }
    }

    /// Bots keeping the crosshair on an enemy fire a rocket at it. The victim sees the hazard next tick.
    fn resolve_attacks(&mut self, enemies: &[Vec<EnemyFacts>]) {
        let world = world(&self.map, &self.route_cache, &self.registry, &self.predictor, &self.config);
        let mut killed = Vec::new();
        for attacker_index in 0..self.bots.len() {
            let attacker = &self.bots[attacker_index];
            if !attacker.is_alive() || !attacker.execution_state().misc_tactics.should_keep_crosshair_on_enemy {
                continue;
            }
            let Some(target) = enemies[attacker_index].first() else {
                continue;
            };
            let (attacker_id, skill) = (attacker.id(), attacker.skill());
            let Some(victim_index) = self.bots.iter().position(|bot| bot.id() == target.id) else {
                continue;
            };
            let damage = 0.5 + 1.5 * skill;
            let hazard = Hazard::splash(target.last_seen_origin, ROCKET_SPLASH_RADIUS, damage, self.level_time + ROCKET_FLIGHT_MILLIS)
                .with_attacker(attacker_id);
            self.hazards[victim_index] = Some(hazard);
            if self.bots[victim_index].is_alive() && self.bots[victim_index].apply_damage(damage) {
                killed.push(victim_index);
                self.stats.kills += 1;
                self.stats.bots[attacker_index].kills += 1;
            }
        }
        for victim_index in killed {
            self.stats.bots[victim_index].deaths += 1;
            let origin = Self::pick_spawn_point(&self.map, &mut self.rng);
            self.bots[victim_index].respawn(&world, origin);
            self.hazards[victim_index] = None;
        }
    }

    fn finish(mut self, wall_time_seconds: f64) -> SimulationStats {
        self.stats.wall_time_seconds = wall_time_seconds;
        for (bot, summary) in self.bots.iter().zip(self.stats.bots.iter_mut()) {
            summary.health = bot.health();
            summary.armor = bot.armor();
            summary.active_goal = bot.planner().active_goal().map(|goal| goal.name().to_string());
        }
        self.stats
    }
}

fn load_config() -> anyhow::Result<BotAiConfig> {
    match std::env::args().nth(1) {
        Some(path) => BotAiConfig::from_yaml_file(&path).with_context(|| format!("Failed to load config from {}", path)),
        None => {
            let config = BotAiConfig::default();
            config.validate().context("Default config is invalid")?;
            Ok(config)
        }
    }
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {:?}", e);
        return Err(e);
    }

    info!("Bot simulation starting up...");
    let config = load_config()?;
    info!(
        "Configuration loaded. Bots: {}, ticks: {}, AI threads: {}",
        config.simulation.bot_count, config.simulation.ticks, config.simulation.ai_threads
    );
    let metrics = MetricsSystem::new(config.simulation.metrics_port)?;

    let ai_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.simulation.ai_threads.max(1))
        .thread_name(|i| format!("bot-ai-{}", i))
        .build()
        .context("Failed to build the AI thread pool")?;

    let ticks = config.simulation.ticks;
    let mut simulation = Simulation::new(config)?;
    let started_at = Instant::now();
    ai_pool.install(|| {
        for _ in 0..ticks {
            let tick_started_at = Instant::now();
            simulation.step();
            metrics.record_tick_time(tick_started_at.elapsed().as_secs_f64());
            metrics.update_alive_bots(simulation.bots.iter().filter(|bot| bot.is_alive()).count());
        }
    });

    let stats = simulation.finish(started_at.elapsed().as_secs_f64());
    if stats.think_errors > 0 {
        warn!("{} bot think frames have failed", stats.think_errors);
    }
    info!("Simulation finished in {:.2}s", stats.wall_time_seconds);
    println!("{}", serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?);
    Ok(())
}
