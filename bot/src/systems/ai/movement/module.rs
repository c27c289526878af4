// tactical_bot_core/bot/src/systems/ai/movement/module.rs
use crate::core::config::MovementConfig;
use crate::core::types::*;
use crate::systems::ai::movement::action::{MovementActionKind, MovementActions};
use crate::systems::ai::movement::context::{MovementEnv, MovementFacts, MovementPredictionContext, PredictedFrame};
use crate::systems::ai::movement::fallback::walk_fallback_input;
use crate::systems::ai::movement::physics::PlayerMoveState;
use metrics::counter;
use tracing::{debug, trace};

/// How long the module keeps using the fallback once prediction keeps failing.
const FALLBACK_MODE_MILLIS: u64 = 500;
/// A cached plan frame is reused only while the bot stays this close to the predicted origin.
const PLAN_REUSE_MAX_SQUARE_DISTANCE: f32 = 16.0 * 16.0;

/// How the input of the last frame was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementSource {
    Idle,
    CachedPlan,
    NewPlan,
    Fallback,
}

/// Turns a nav target into per-frame input using the movement prediction.
#[derive(Debug)]
pub struct BotMovementModule {
    actions: MovementActions,
    /// Scratch stack reused by every prediction.
    stack: Vec<PredictedFrame>,
    plan: Vec<PredictedFrame>,
    plan_started_at: LevelTime,
    plan_nav_target: Option<NavTarget>,
    failed_prediction_frames: u32,
    max_failed_prediction_frames: u32,
    fallback_until: LevelTime,
    last_source: MovementSource,
}

impl BotMovementModule {
    pub fn new(config: &MovementConfig) -> Self {
        BotMovementModule {
            actions: MovementActions::new(config),
            stack: Vec::with_capacity(crate::core::constants::MAX_PREDICTED_STATES),
            plan: Vec::new(),
            plan_started_at: 0,
            plan_nav_target: None,
            failed_prediction_frames: 0,
            max_failed_prediction_frames: config.max_failed_prediction_frames.max(1),
            fallback_until: 0,
            last_source: MovementSource::Idle,
        }
    }

    #[inline]
    pub fn last_source(&self) -> MovementSource {
        self.last_source
    }

    #[inline]
    pub fn is_in_fallback_mode(&self, level_time: LevelTime) -> bool {
        level_time < self.fallback_until
    }

    pub fn planned_frames(&self) -> &[PredictedFrame] {
        &self.plan
    }

    pub fn reset(&mut self) {
        self.plan.clear();
        self.plan_nav_target = None;
        self.failed_prediction_frames = 0;
        self.fallback_until = 0;
    }

    pub fn frame(&mut self, env: &MovementEnv, facts: &MovementFacts, state: &PlayerMoveState) -> BotInput {
        if facts.nav_target.is_none() {
            self.plan.clear();
            self.plan_nav_target = None;
            self.last_source = MovementSource::Idle;
            return BotInput::default();
        }

        if self.is_in_fallback_mode(facts.level_time) {
            return self.fallback_frame(env, facts, state);
        }

        if let Some(input) = self.cached_plan_input(facts, state) {
            self.last_source = MovementSource::CachedPlan;
            return input;
        }

        let has_plan = {
            let mut ctx = MovementPredictionContext::new(env, facts, &mut self.stack, *state);
            ctx.build_plan(&mut self.actions, MovementActionKind::BunnyStraighteningReachChain)
        };
        if has_plan {
            self.failed_prediction_frames = 0;
            self.plan.clear();
            self.plan.extend_from_slice(&self.stack);
            self.plan_started_at = facts.level_time;
            self.plan_nav_target = facts.nav_target;
            self.last_source = MovementSource::NewPlan;
            trace!("Built a movement plan of {} frames", self.plan.len());
            return self.plan[0].input;
        }

        self.plan.clear();
        self.failed_prediction_frames += 1;
        if self.failed_prediction_frames >= self.max_failed_prediction_frames {
            debug!(
                "Movement prediction has failed for {} frames in a row, using the fallback for {} millis",
                self.failed_prediction_frames, FALLBACK_MODE_MILLIS
            );
            counter!("ai_movement_fallbacks_total").increment(1);
            self.failed_prediction_frames = 0;
            self.fallback_until = facts.level_time + FALLBACK_MODE_MILLIS;
        }
        self.fallback_frame(env, facts, state)
    }

    /// The frame of the cached plan matching the elapsed time, if the bot follows the plan.
    fn cached_plan_input(&self, facts: &MovementFacts, state: &PlayerMoveState) -> Option<BotInput> {
        if self.plan.is_empty() || self.plan_nav_target != facts.nav_target {
            return None;
        }
        let elapsed = facts.level_time.checked_sub(self.plan_started_at)?;
        let frame = self
            .plan
            .iter()
            .find(|frame| elapsed >= frame.timestamp && elapsed < frame.timestamp + frame.step_millis as u64)?;
        let square_error = frame.state.physics.origin.distance_squared(state.physics.origin);
        if square_error > PLAN_REUSE_MAX_SQUARE_DISTANCE {
            trace!("The bot has deviated from the predicted origin by {} units", square_error.sqrt());
            return None;
        }
        // The velocity cheat was computed for the predicted state
        Some(BotInput { modified_velocity: None, ..frame.input })
    }

    /// A single checked walk step, or no movement if even that is unsafe.
    fn fallback_frame(&mut self, env: &MovementEnv, facts: &MovementFacts, state: &PlayerMoveState) -> BotInput {
        self.last_source = MovementSource::Fallback;
        let has_step = {
            let mut ctx = MovementPredictionContext::new(env, facts, &mut self.stack, *state);
            ctx.build_plan(&mut self.actions, MovementActionKind::WalkFallback)
        };
        match self.stack.first() {
            Some(frame) if has_step => frame.input,
            _ => {
                trace!("Even the walk fallback is unsafe, staying in place");
                let mut input = walk_fallback_input(env, facts, &state.physics);
                input.clear_movement_directions();
                input
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::PMFEAT_DEFAULT;
    use crate::systems::ai::movement::context::test_support::CorridorFixture;

    #[test]
    fn no_nav_target_is_idle() {
        let fixture = CorridorFixture::new(4);
        let env = fixture.env();
        let mut module = BotMovementModule::new(&fixture.config);
        let state = PlayerMoveState::new(Vec3::new(128.0, 128.0, 24.0), PMFEAT_DEFAULT);
        let input = module.frame(&env, &MovementFacts::default(), &state);
        assert!(!input.has_movement());
        assert_eq!(module.last_source(), MovementSource::Idle);
    }

    #[test]
    fn always_moves_toward_a_reachable_target() {
        let fixture = CorridorFixture::new(8);
        let env = fixture.env();
        let mut module = BotMovementModule::new(&fixture.config);
        let facts = MovementFacts { nav_target: Some(fixture.cell_target(7)), level_time: 1000, ..Default::default() };
        let start = fixture.map.aas.area(fixture.map.cell_area(0, 0)).standing_point();
        let state = PlayerMoveState::new(start, PMFEAT_DEFAULT);
        let input = module.frame(&env, &facts, &state);
        assert!(input.has_movement());
        assert!(input.intended_look_dir.x > 0.5);
        assert_ne!(module.last_source(), MovementSource::Idle);
    }

    #[test]
    fn fallback_mode_expires() {
        let fixture = CorridorFixture::new(4);
        let mut module = BotMovementModule::new(&fixture.config);
        module.fallback_until = 1500;
        assert!(module.is_in_fallback_mode(1000));
        assert!(!module.is_in_fallback_mode(1500));
        module.reset();
        assert!(!module.is_in_fallback_mode(1000));
    }
}
