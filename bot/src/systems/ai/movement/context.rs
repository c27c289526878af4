// tactical_bot_core/bot/src/systems/ai/movement/context.rs
use crate::core::config::MovementConfig;
use crate::core::constants::*;
use crate::core::frame_cache::FrameCached;
use crate::core::types::*;
use crate::systems::ai::awareness::Hazard;
use crate::systems::ai::movement::action::{MovementActionKind, MovementActions};
use crate::systems::ai::movement::physics::{FrameEvents, PlayerMovePredictor, PlayerMoveState};
use crate::systems::ai::movement::trace_cache::{EnvironmentTraceCache, TraceCacheEntry, TraceQuery};
use crate::world::aas::AasWorld;
use crate::world::collision::CollisionWorld;
use crate::world::route_cache::{ReachChain, RouteCache};
use metrics::counter;
use smallvec::SmallVec;
use tracing::trace;

/// Prediction steps a single planning pass may take, including rolled back ones.
const MAX_PREDICTION_ITERATIONS: usize = 256;
const NAV_TARGET_TOUCH_RADIUS: f32 = 32.0;
const TRIGGER_TOUCH_RADIUS: f32 = 40.0;

/// Map data and engine services the prediction runs against.
pub struct MovementEnv<'a> {
    pub aas: &'a AasWorld,
    pub route_cache: &'a dyn RouteCache,
    pub collision: &'a dyn CollisionWorld,
    pub predictor: &'a dyn PlayerMovePredictor,
    pub config: &'a MovementConfig,
}

/// What the rest of the bot wants from movement this frame.
#[derive(Debug, Clone)]
pub struct MovementFacts {
    pub level_time: LevelTime,
    pub skill: f32,
    pub travel_flags: u32,
    pub nav_target: Option<NavTarget>,
    pub keep_crosshair_on_enemy: bool,
    pub enemy_origin: Option<Vec3>,
    pub enemies_potentially_hittable: bool,
    pub should_be_silent: bool,
    pub should_attack: bool,
    /// Carriers and bots rushing headless use every look dir and ignore hazards.
    pub should_rush_headless: bool,
    pub should_move_carefully: bool,
    pub hazard: Option<Hazard>,
}

impl Default for MovementFacts {
    fn default() -> Self {
        MovementFacts {
            level_time: 0,
            skill: 0.5,
            travel_flags: crate::world::aas::TFL_DEFAULT,
            nav_target: None,
            keep_crosshair_on_enemy: false,
            enemy_origin: None,
            enemies_potentially_hittable: false,
            should_be_silent: false,
            should_attack: false,
            should_rush_headless: false,
            should_move_carefully: false,
            hazard: None,
        }
    }
}

/// A predicted frame: the state before the step and the input applied to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedFrame {
    pub state: PlayerMoveState,
    pub input: BotInput,
    pub action: MovementActionKind,
    pub step_millis: u32,
    /// Millis since the start of the prediction.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStopReason {
    Succeeded,
    Switched,
    Disabled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitWhileRunningTestResult {
    pub can_hit_as_is: bool,
    pub may_hit_looking_aside: bool,
}

impl HitWhileRunningTestResult {
    #[inline]
    pub fn can_hit(&self) -> bool {
        self.can_hit_as_is || self.may_hit_looking_aside
    }
}

#[derive(Debug, Clone, Default)]
struct FrameQueries {
    area_num: Option<AreaNum>,
    grounded_area_num: Option<AreaNum>,
    travel_time_to_nav_target: Option<u32>,
    reach_chain: Option<ReachChain>,
}

pub struct MovementPredictionContext<'a> {
    pub env: &'a MovementEnv<'a>,
    pub facts: &'a MovementFacts,
    stack: &'a mut Vec<PredictedFrame>,
    /// The state at the top of the stack, i.e. after the last accepted or tested step.
    pub movement_state: PlayerMoveState,
    /// The state before the last step.
    pub old_state: PlayerMoveState,
    /// The input being built for the current frame.
    pub record: BotInput,
    pub prediction_step_millis: u32,
    pub frame_events: FrameEvents,
    pub is_completed: bool,
    pub cannot_apply_action: bool,
    pub action_suggested_by_action: Option<MovementActionKind>,
    should_rollback: bool,
    saved_suggested_action: Option<MovementActionKind>,
    truncate_at: Option<usize>,
    savepoint_top_of_stack_index: usize,
    savepoint_state: PlayerMoveState,
    savepoint_millis: u64,
    total_millis: u64,
    frame_key: u64,
    queries: FrameCached<FrameQueries>,
    trace_cache: EnvironmentTraceCache,
    num_rollbacks: u32,
}

impl<'a> MovementPredictionContext<'a> {
    pub fn new(
        env: &'a MovementEnv<'a>,
        facts: &'a MovementFacts,
        stack: &'a mut Vec<PredictedFrame>,
        initial_state: PlayerMoveState,
    ) -> Self {
        stack.clear();
        MovementPredictionContext {
            env,
            facts,
            stack,
            movement_state: initial_state,
            old_state: initial_state,
            record: BotInput::default(),
            prediction_step_millis: env.config.prediction_step_millis,
            frame_events: FrameEvents::default(),
            is_completed: false,
            cannot_apply_action: false,
            action_suggested_by_action: None,
            should_rollback: false,
            saved_suggested_action: None,
            truncate_at: None,
            savepoint_top_of_stack_index: 0,
            savepoint_state: initial_state,
            savepoint_millis: 0,
            total_millis: 0,
            frame_key: 1,
            queries: FrameCached::new(),
            trace_cache: EnvironmentTraceCache::new(),
            num_rollbacks: 0,
        }
    }

    // --- Stack and control flow ---

    #[inline]
    pub fn top_of_stack_index(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn savepoint_top_of_stack_index(&self) -> usize {
        self.savepoint_top_of_stack_index
    }

    pub fn predicted_frames(&self) -> &[PredictedFrame] {
        &self.stack[..]
    }

    #[inline]
    pub fn num_rollbacks(&self) -> u32 {
        self.num_rollbacks
    }

    /// Millis covered by the accepted frames plus the current step.
    #[inline]
    pub fn total_millis(&self) -> u64 {
        self.total_millis
    }

    #[inline]
    pub fn physics_state_before_step(&self) -> &EntityPhysicsState {
        &self.old_state.physics
    }

    #[inline]
    pub fn is_pending_rollback(&self) -> bool {
        self.should_rollback
    }

    pub fn set_pending_rollback(&mut self) {
        self.should_rollback = true;
    }

    pub fn cannot_apply(&mut self, suggested_action: Option<MovementActionKind>) {
        self.cannot_apply_action = true;
        self.action_suggested_by_action = suggested_action;
    }

    pub fn save_suggested_action_for_next_frame(&mut self, action: MovementActionKind) {
        self.saved_suggested_action = Some(action);
    }

    /// Completes the prediction keeping frames up to `frame_index` inclusive.
    pub fn stop_truncating_stack_at(&mut self, frame_index: usize) {
        self.is_completed = true;
        self.truncate_at = Some(frame_index);
    }

    pub fn mark_savepoint(&mut self, frame_index: usize) {
        self.savepoint_top_of_stack_index = frame_index;
        self.savepoint_state = self.movement_state;
        self.savepoint_millis = self.total_millis;
    }

    fn rollback_to_savepoint(&mut self) {
        trace!("Rolling back to savepoint {} from {}", self.savepoint_top_of_stack_index, self.stack.len());
        self.stack.truncate(self.savepoint_top_of_stack_index);
        self.movement_state = self.savepoint_state;
        self.old_state = self.savepoint_state;
        self.total_millis = self.savepoint_millis;
        self.frame_key += 1;
        self.num_rollbacks += 1;
        counter!("ai_movement_rollbacks_total").increment(1);
    }

    fn begin_frame(&mut self) {
        self.record = BotInput::default();
        self.prediction_step_millis = self.env.config.prediction_step_millis;
        self.is_completed = false;
        self.cannot_apply_action = false;
        self.action_suggested_by_action = None;
        self.should_rollback = false;
        self.truncate_at = None;
        self.frame_events = FrameEvents::default();
    }

    fn predict_step(&mut self) {
        let next_reach_num = self.next_reach_num();
        let (next, mut events) = self.env.predictor.predict(
            &self.movement_state,
            &self.record,
            self.prediction_step_millis,
            self.env.collision,
        );
        let origin = next.physics.origin;
        if let Some(target) = self.facts.nav_target {
            if origin.distance_squared(target.origin) < NAV_TARGET_TOUCH_RADIUS * NAV_TARGET_TOUCH_RADIUS {
                events.has_touched_nav_target = true;
            }
        }
        if next_reach_num != 0 {
            let reach = self.env.aas.reach(next_reach_num);
            if reach.travel_type.is_trigger() && origin.distance_squared(reach.start) < TRIGGER_TOUCH_RADIUS * TRIGGER_TOUCH_RADIUS {
                events.has_touched_trigger = true;
            }
        }
        self.old_state = self.movement_state;
        self.movement_state = next;
        self.frame_events = events;
        self.total_millis += self.prediction_step_millis as u64;
        self.frame_key += 1;
    }

    fn push_frame(&mut self, action: MovementActionKind) {
        let timestamp = self.total_millis - self.prediction_step_millis as u64;
        self.stack.push(PredictedFrame {
            state: self.old_state,
            input: self.record,
            action,
            step_millis: self.prediction_step_millis,
            timestamp,
        });
    }

    /// Runs the prediction until an action sequence completes.
    /// Returns false if no action could produce an acceptable trajectory.
    pub fn build_plan(&mut self, actions: &mut MovementActions, default_action: MovementActionKind) -> bool {
        actions.before_planning(self.facts, self.env.config);
        let mut current = default_action;
        let mut prev_action: Option<MovementActionKind> = None;

        for _ in 0..MAX_PREDICTION_ITERATIONS {
            if self.stack.len() >= MAX_PREDICTED_STATES {
                trace!("The prediction stack is full");
                return false;
            }

            self.begin_frame();
            if prev_action != Some(current) {
                if let Some(prev) = prev_action {
                    let top = self.stack.len();
                    actions.on_application_sequence_stopped(prev, self, SequenceStopReason::Switched, top);
                }
                actions.on_application_sequence_started(current, self);
                prev_action = Some(current);
            }

            actions.plan_prediction_step(current, self);
            let top = self.stack.len();
            if self.cannot_apply_action {
                if self.should_rollback {
                    actions.on_application_sequence_stopped(current, self, SequenceStopReason::Failed, top);
                    self.rollback_to_savepoint();
                } else {
                    actions.on_application_sequence_stopped(current, self, SequenceStopReason::Disabled, top);
                }
                prev_action = None;
                match self.action_suggested_by_action.take() {
                    Some(suggested) if suggested != current => {
                        current = suggested;
                        continue;
                    }
                    _ => return false,
                }
            }
            if self.should_rollback {
                actions.on_application_sequence_stopped(current, self, SequenceStopReason::Failed, top);
                self.rollback_to_savepoint();
                prev_action = None;
                current = self.saved_suggested_action.take().unwrap_or(default_action);
                continue;
            }

            self.predict_step();
            actions.check_prediction_step_results(current, self);

            if self.should_rollback {
                actions.on_application_sequence_stopped(current, self, SequenceStopReason::Failed, top);
                self.rollback_to_savepoint();
                prev_action = None;
                current = self.saved_suggested_action.take().unwrap_or(default_action);
                continue;
            }

            let frame_index = self.stack.len();
            self.push_frame(current);
            if self.is_completed {
                if let Some(truncate_at) = self.truncate_at.take() {
                    self.stack.truncate(truncate_at + 1);
                }
                actions.on_application_sequence_stopped(current, self, SequenceStopReason::Succeeded, frame_index);
                return !self.stack.is_empty();
            }
            current = self.saved_suggested_action.take().unwrap_or(current);
        }
        trace!("The prediction has not converged in {} iterations", MAX_PREDICTION_ITERATIONS);
        false
    }

    // --- Per-frame queries ---

    fn frame_queries(&mut self) -> &mut FrameQueries {
        self.queries.get_or_compute_mut(self.frame_key, FrameQueries::default)
    }

    pub fn curr_aas_area_num(&mut self) -> AreaNum {
        if let Some(area_num) = self.frame_queries().area_num {
            return area_num;
        }
        let area_num = self.env.aas.find_area_num(self.movement_state.physics.origin);
        self.frame_queries().area_num = Some(area_num);
        area_num
    }

    /// The grounded area below the bot, 0 if the bot is too high or above no area.
    pub fn curr_grounded_aas_area_num(&mut self) -> AreaNum {
        if let Some(area_num) = self.frame_queries().grounded_area_num {
            return area_num;
        }
        let physics = self.movement_state.physics;
        let area_num = if physics.on_ground {
            self.curr_aas_area_num()
        } else if physics.height_over_ground.is_finite() {
            let ground_point = physics.origin - Vec3::Z * physics.height_over_ground;
            let area_num = self.env.aas.find_area_num(ground_point);
            if area_num != 0 && self.env.aas.area(area_num).is_grounded() { area_num } else { 0 }
        } else {
            0
        };
        self.frame_queries().grounded_area_num = Some(area_num);
        area_num
    }

    /// Distinct nonzero areas a route may start from.
    pub fn routing_start_areas(&mut self) -> SmallVec<[AreaNum; 2]> {
        let mut areas = SmallVec::new();
        let area_num = self.curr_aas_area_num();
        if area_num != 0 {
            areas.push(area_num);
        }
        let grounded_area_num = self.curr_grounded_aas_area_num();
        if grounded_area_num != 0 && grounded_area_num != area_num {
            areas.push(grounded_area_num);
        }
        areas
    }

    pub fn nav_target_aas_area_num(&self) -> AreaNum {
        self.facts.nav_target.map_or(0, |target| target.area_num)
    }

    pub fn nav_target_origin(&self) -> Option<Vec3> {
        self.facts.nav_target.map(|target| target.origin)
    }

    pub fn is_in_nav_target_area(&mut self) -> bool {
        let nav_area_num = self.nav_target_aas_area_num();
        if nav_area_num == 0 {
            return false;
        }
        self.curr_aas_area_num() == nav_area_num || self.curr_grounded_aas_area_num() == nav_area_num
    }

    pub fn is_close_to_nav_target(&self) -> bool {
        self.nav_target_origin().is_some_and(|origin| {
            origin.distance_squared(self.movement_state.physics.origin) < CLOSE_TO_NAV_TARGET_DISTANCE * CLOSE_TO_NAV_TARGET_DISTANCE
        })
    }

    /// AAS centiseconds to the nav target, 0 if it is unreachable.
    pub fn travel_time_to_nav_target(&mut self) -> u32 {
        if let Some(travel_time) = self.frame_queries().travel_time_to_nav_target {
            return travel_time;
        }
        let nav_area_num = self.nav_target_aas_area_num();
        let mut best = 0;
        if nav_area_num != 0 {
            for area_num in self.routing_start_areas() {
                let travel_time = self.env.route_cache.travel_time_to_area(area_num, nav_area_num, self.facts.travel_flags);
                if travel_time != 0 && (best == 0 || travel_time < best) {
                    best = travel_time;
                }
            }
        }
        self.frame_queries().travel_time_to_nav_target = Some(best);
        best
    }

    pub fn next_reach_chain(&mut self) -> ReachChain {
        if let Some(chain) = &self.frame_queries().reach_chain {
            return chain.clone();
        }
        let nav_area_num = self.nav_target_aas_area_num();
        let mut chain = ReachChain::new();
        if let Some(&start_area) = self.routing_start_areas().first() {
            self.env.route_cache.reach_chain(start_area, nav_area_num, self.facts.travel_flags, &mut chain);
        }
        self.frame_queries().reach_chain = Some(chain.clone());
        chain
    }

    pub fn next_reach_num(&mut self) -> ReachNum {
        self.next_reach_chain().first().map_or(0, |step| step.reach_num)
    }

    pub fn trace_cache_query(&mut self, query: TraceQuery) -> TraceCacheEntry {
        let physics = self.movement_state.physics;
        self.trace_cache.test_for_query(self.frame_key, &physics, query, self.env.collision)
    }

    pub fn trace_cache_mask(&mut self, mask: u32) {
        let physics = self.movement_state.physics;
        self.trace_cache.test_for_results_mask(self.frame_key, &physics, mask, self.env.collision);
    }

    pub fn trace_cache_result(&self, query: TraceQuery) -> Option<TraceCacheEntry> {
        self.trace_cache.result_for_query(self.frame_key, query)
    }

    pub fn may_hit_while_running(&self) -> HitWhileRunningTestResult {
        let Some(enemy_origin) = self.facts.enemy_origin else {
            return HitWhileRunningTestResult::default();
        };
        let physics = &self.movement_state.physics;
        let to_enemy = flat(enemy_origin - physics.origin).normalize_or_zero();
        let move_dir = physics.velocity_dir_2d().unwrap_or_else(|| flat(physics.forward_dir).normalize_or_zero());
        let dot = move_dir.dot(to_enemy);
        HitWhileRunningTestResult { can_hit_as_is: dot > 0.7, may_hit_looking_aside: dot > -0.3 }
    }

    #[inline]
    pub fn run_speed(&self) -> f32 {
        self.env.predictor.run_speed()
    }

    #[inline]
    pub fn dash_speed(&self) -> f32 {
        self.env.predictor.dash_speed()
    }

    #[inline]
    pub fn default_frame_millis(&self) -> u32 {
        self.env.config.default_frame_millis
    }

    // --- Velocity cheats applied through the input ---

    fn current_velocity(&self) -> Vec3 {
        self.record.modified_velocity.unwrap_or(self.movement_state.physics.velocity)
    }

    /// Adds some speed in air along the velocity; the gain falls off with the speed.
    pub fn cheating_accelerate(&mut self, frac: f32) {
        if self.facts.should_move_carefully {
            return;
        }
        let physics = &self.movement_state.physics;
        if physics.on_ground {
            return;
        }
        let velocity = self.current_velocity();
        let speed = velocity.length();
        let speed_threshold = self.run_speed() - 15.0;
        if speed < speed_threshold {
            return;
        }
        const MAX_SPEED_GAIN_PER_SECOND: f32 = 250.0;
        const MIN_SPEED_GAIN_PER_SECOND: f32 = 75.0;
        const FALLOFF_SPEED: f32 = 1000.0;
        let speed_frac = bounded_fraction(speed - speed_threshold, FALLOFF_SPEED - speed_threshold);
        let gain_per_second = MAX_SPEED_GAIN_PER_SECOND - (MAX_SPEED_GAIN_PER_SECOND - MIN_SPEED_GAIN_PER_SECOND) * speed_frac;
        let gain = gain_per_second * frac.clamp(0.0, 1.0) * 0.001 * self.prediction_step_millis as f32;
        self.record.modified_velocity = Some(velocity * ((speed + gain) / speed));
    }

    /// Turns the velocity a bit toward the target direction keeping the speed.
    pub fn cheating_correct_velocity(&mut self, velocity_2d_dir_dot_to_target_2d_dir: f32, to_target_dir_2d: Vec3) {
        if !self.movement_state.stats.has_feature(PMFEAT_AIRCONTROL) {
            return;
        }
        let mut control = 0.05 + velocity_2d_dir_dot_to_target_2d_dir.abs() * 0.05;
        if self.facts.should_move_carefully {
            control += 0.10;
        }
        let velocity = self.current_velocity();
        let speed = velocity.length();
        if speed < 100.0 {
            return;
        }
        let corrected = (velocity / speed + to_target_dir_2d * control).normalize_or_zero() * speed;
        self.record.modified_velocity = Some(corrected);
    }
}
