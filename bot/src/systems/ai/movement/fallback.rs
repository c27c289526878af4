// tactical_bot_core/bot/src/systems/ai/movement/fallback.rs
//! Non-predictive ground movement used when no bunnying trajectory is accepted.
use crate::core::constants::*;
use crate::core::types::*;
use crate::systems::ai::movement::context::{MovementEnv, MovementFacts, MovementPredictionContext};
use crate::world::aas::TFL_GROUND_ONLY;
use tracing::trace;

const REACH_START_PASSED_SQUARE_DISTANCE_2D: f32 = 32.0 * 32.0;
const OBSTACLE_PROBE_DISTANCE: f32 = 40.0;

/// The point to walk to: the next ground reachability or the nav target itself.
fn walk_target(env: &MovementEnv, facts: &MovementFacts, physics: &EntityPhysicsState) -> Option<Vec3> {
    let nav_target = facts.nav_target?;
    let area_num = env.aas.find_area_num(physics.origin);
    if area_num == 0 || area_num == nav_target.area_num {
        return Some(nav_target.origin);
    }
    let step = env
        .route_cache
        .next_route_step(area_num, nav_target.area_num, TFL_GROUND_ONLY)
        .or_else(|| env.route_cache.next_route_step(area_num, nav_target.area_num, facts.travel_flags));
    let Some(step) = step else {
        return Some(nav_target.origin);
    };
    let reach = env.aas.reach(step.reach_num);
    if square_distance_2d(reach.start, physics.origin) < REACH_START_PASSED_SQUARE_DISTANCE_2D {
        return Some(reach.end);
    }
    Some(reach.start)
}

/// Walks toward the next reachability, jumping over obstacles of a jumpable height.
pub fn walk_fallback_input(env: &MovementEnv, facts: &MovementFacts, physics: &EntityPhysicsState) -> BotInput {
    let mut input = BotInput::default();
    let Some(target) = walk_target(env, facts, physics) else {
        return input;
    };
    let dir_2d = flat(target - physics.origin).normalize_or_zero();
    if dir_2d == Vec3::ZERO {
        return input;
    }
    input.forward_movement = 1;
    input.intended_look_dir = (target - physics.origin).normalize_or_zero();
    input.can_override_pitch = true;

    if physics.on_ground {
        let mins = vec3(PLAYERBOX_STAND_MINS);
        let maxs = vec3(PLAYERBOX_STAND_MAXS);
        let end = physics.origin + dir_2d * OBSTACLE_PROBE_DISTANCE;
        let blocked = env.collision.trace(physics.origin, mins + Vec3::Z * AI_STEPSIZE, maxs, end);
        if blocked.fraction < 1.0 {
            let above = env.collision.trace(physics.origin, mins + Vec3::Z * AI_JUMPABLE_HEIGHT, maxs, end);
            if above.fraction >= 1.0 {
                trace!("Walk fallback: jumping over an obstacle");
                input.up_movement = 1;
            }
        }
    }
    input
}

pub fn plan_prediction_step(ctx: &mut MovementPredictionContext) {
    if ctx.nav_target_aas_area_num() == 0 {
        ctx.cannot_apply(None);
        return;
    }
    let physics = ctx.movement_state.physics;
    ctx.record = walk_fallback_input(ctx.env, ctx.facts, &physics);
    ctx.prediction_step_millis = ctx.default_frame_millis();
}

pub fn check_prediction_step_results(ctx: &mut MovementPredictionContext) {
    let origin = ctx.movement_state.physics.origin;
    let area_num = ctx.curr_aas_area_num();
    let is_dangerous = (area_num != 0 && ctx.env.aas.area(area_num).is_do_not_enter())
        || ctx.env.collision.point_contents(origin) & BAD_CONTENTS != 0;
    if is_dangerous {
        trace!("Walk fallback: the step leads to a dangerous area");
        ctx.set_pending_rollback();
        return;
    }
    ctx.is_completed = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::ai::movement::context::test_support::CorridorFixture;

    #[test]
    fn walks_toward_the_next_reach() {
        let fixture = CorridorFixture::new(4);
        let env = fixture.env();
        let facts = MovementFacts { nav_target: Some(fixture.cell_target(3)), ..Default::default() };
        let origin = fixture.map.aas.area(fixture.map.cell_area(0, 0)).standing_point();
        let physics = EntityPhysicsState { on_ground: true, ..EntityPhysicsState::new(origin) };
        let input = walk_fallback_input(&env, &facts, &physics);
        assert_eq!(input.forward_movement, 1);
        assert!(input.intended_look_dir.x > 0.9);
        assert_eq!(input.up_movement, 0);
    }

    #[test]
    fn no_nav_target_means_no_movement() {
        let fixture = CorridorFixture::new(3);
        let env = fixture.env();
        let facts = MovementFacts::default();
        let physics = EntityPhysicsState::new(Vec3::new(128.0, 128.0, 24.0));
        assert!(!walk_fallback_input(&env, &facts, &physics).has_movement());
    }
}
