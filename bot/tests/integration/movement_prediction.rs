// tactical_bot_core/bot/tests/integration/movement_prediction.rs
//! Movement module and player move prediction on generated maps.

use tactical_bot_core::core::config::MovementConfig;
use tactical_bot_core::core::constants::PMFEAT_DEFAULT;
use tactical_bot_core::core::types::*;
use tactical_bot_core::systems::ai::movement::{
    BotMovementModule, MovementEnv, MovementFacts, MovementSource, PlayerMovePredictor, PlayerMoveState, SimplePmove,
};
use tactical_bot_core::world::collision::CollisionWorld;
use tactical_bot_core::world::map_generator::{GeneratedMap, MapGenerator};
use tactical_bot_core::world::route_cache::AasRouteCache;

use proptest::prelude::*;
use std::sync::Arc;

const FRAME_MILLIS: u32 = 16;

struct Track {
    map: GeneratedMap,
    route_cache: AasRouteCache,
    predictor: SimplePmove,
    config: MovementConfig,
}

impl Track {
    fn corridor(length_cells: usize) -> Self {
        let map = MapGenerator::generate_corridor("movement_corridor", length_cells, 192.0).expect("corridor");
        let route_cache = AasRouteCache::new(Arc::clone(&map.aas));
        let config = MovementConfig::default();
        let predictor = SimplePmove::from_config(&config);
        Track { map, route_cache, predictor, config }
    }

    fn env(&self) -> MovementEnv<'_> {
        MovementEnv {
            aas: &self.map.aas,
            route_cache: &self.route_cache,
            collision: self.map.collision.as_ref(),
            predictor: &self.predictor,
            config: &self.config,
        }
    }

    fn cell(&self, i: usize) -> Vec3 {
        self.map.aas.area(self.map.cell_area(i, 0)).standing_point()
    }

    fn target(&self, i: usize) -> NavTarget {
        NavTarget { origin: self.cell(i), area_num: self.map.cell_area(i, 0), is_entity: false }
    }
}

/// Drives the module and the predictor like the game loop does. Returns the frame the target has been reached at.
fn run_to(track: &Track, skill: f32, target: NavTarget, max_frames: usize) -> (Option<usize>, Vec<MovementSource>) {
    let env = track.env();
    let mut module = BotMovementModule::new(&track.config);
    let mut state = PlayerMoveState::new(track.cell(0), PMFEAT_DEFAULT);
    let mut sources = Vec::with_capacity(max_frames);
    for frame in 0..max_frames {
        let facts = MovementFacts {
            level_time: 1000 + (frame as u64) * FRAME_MILLIS as u64,
            skill,
            nav_target: Some(target),
            ..MovementFacts::default()
        };
        let input = module.frame(&env, &facts, &state);
        sources.push(module.last_source());
        state = track.predictor.predict(&state, &input, FRAME_MILLIS, track.map.collision.as_ref()).0;
        if state.physics.origin.distance(target.origin) < 64.0 {
            return (Some(frame), sources);
        }
    }
    (None, sources)
}

#[test]
fn bot_reaches_the_end_of_a_corridor() {
    let track = Track::corridor(8);
    let (reached_at, sources) = run_to(&track, 0.9, track.target(7), 600);
    assert!(reached_at.is_some(), "the target has not been reached, sources: {:?}", &sources[sources.len().saturating_sub(8)..]);
    assert!(!sources.contains(&MovementSource::Idle));
}

#[test]
fn low_skill_bot_also_makes_progress() {
    let track = Track::corridor(6);
    let (reached_at, _) = run_to(&track, 0.1, track.target(5), 600);
    assert!(reached_at.is_some());
}

#[test]
fn a_new_plan_has_ordered_frames() {
    let track = Track::corridor(8);
    let env = track.env();
    let mut module = BotMovementModule::new(&track.config);
    let state = PlayerMoveState::new(track.cell(0), PMFEAT_DEFAULT);
    let facts = MovementFacts { level_time: 1000, skill: 0.5, nav_target: Some(track.target(7)), ..MovementFacts::default() };
    module.frame(&env, &facts, &state);
    if module.last_source() == MovementSource::NewPlan {
        let frames = module.planned_frames();
        assert!(!frames.is_empty());
        assert!(frames.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(frames[0].state.physics.origin, state.physics.origin);
    } else {
        assert_eq!(module.last_source(), MovementSource::Fallback);
    }
}

#[test]
fn losing_the_nav_target_stops_the_bot() {
    let track = Track::corridor(4);
    let env = track.env();
    let mut module = BotMovementModule::new(&track.config);
    let state = PlayerMoveState::new(track.cell(0), PMFEAT_DEFAULT);
    let facts = MovementFacts { level_time: 1000, nav_target: Some(track.target(3)), ..MovementFacts::default() };
    assert!(module.frame(&env, &facts, &state).has_movement());
    let idle = MovementFacts { level_time: 1016, ..MovementFacts::default() };
    assert!(!module.frame(&env, &idle, &state).has_movement());
    assert_eq!(module.last_source(), MovementSource::Idle);
    assert!(module.planned_frames().is_empty());
}

fn arb_input() -> impl Strategy<Value = BotInput> {
    (-1i8..=1, -1i8..=1, -1i8..=1, any::<bool>(), -1.0f32..1.0, -1.0f32..1.0).prop_map(|(f, r, u, special, x, y)| BotInput {
        forward_movement: f,
        right_movement: r,
        up_movement: u,
        special_button: special,
        intended_look_dir: Vec3::new(x, y, 0.0).normalize_or_zero(),
        ..BotInput::default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prediction_never_enters_solid(inputs in prop::collection::vec(arb_input(), 1..120)) {
        let track = Track::corridor(4);
        let collision = track.map.collision.as_ref();
        let mut state = PlayerMoveState::new(track.cell(1), PMFEAT_DEFAULT);
        for input in &inputs {
            state = track.predictor.predict(&state, input, FRAME_MILLIS, collision).0;
            prop_assert_eq!(collision.point_contents(state.physics.origin) & CONTENTS_SOLID, 0);
        }
    }
}
