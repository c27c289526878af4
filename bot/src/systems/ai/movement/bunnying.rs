// tactical_bot_core/bot/src/systems/ai/movement/bunnying.rs
//! Shared logic of the jump-chaining run actions: preconditions, input setup
//! and the cascade of checks every predicted step has to pass.
use crate::core::config::MovementConfig;
use crate::core::constants::*;
use crate::core::types::*;
use crate::systems::ai::movement::action::MovementActionKind;
use crate::systems::ai::movement::context::{MovementPredictionContext, SequenceStopReason};
use crate::systems::ai::movement::trace_cache::TraceQuery;
use crate::world::aas::{TravelType, AREA_NOFALL, TFL_GROUND_ONLY};
use smallvec::SmallVec;
use tracing::trace;

const BOUNCE_BACK_MIN_SQUARE_SPEED_2D: f32 = 100.0 * 100.0;
const BOUNCE_BACK_MAX_DOT: f32 = 0.3;
const BUMP_MIN_OLD_SQUARE_SPEED_2D: f32 = 100.0 * 100.0;
const BUMP_MAX_NEW_SQUARE_SPEED_2D: f32 = 50.0 * 50.0;
const MIN_WALLJUMP_SPEED_2D: f32 = 400.0;
const SKIM_STUCK_CHECK_MILLIS: u64 = 400;
const SKIM_STUCK_MIN_SQUARE_DISTANCE_2D: f32 = 128.0 * 128.0;

#[derive(Debug, Clone)]
pub struct GenericBunnying {
    pub name: &'static str,
    /// Where to go once this action has been disabled.
    pub suggested_action: Option<MovementActionKind>,
    pub supports_obstacle_avoidance: bool,
    pub should_try_obstacle_avoidance: bool,
    pub is_trying_obstacle_avoidance: bool,
    pub is_disabled_for_planning: bool,
    pub disabled_for_application_frame_index: Option<usize>,
    /// Touching the ground in one of these areas completes the sequence.
    pub check_stop_at_area_nums: SmallVec<[AreaNum; 8]>,

    min_desired_speed_gain_per_second: f32,
    tolerable_speed_loss_sequential_millis: u32,
    tolerable_walkable_increased_travel_time_millis: u32,
    tolerable_unreachable_target_sequential_millis: u32,

    min_travel_time_to_nav_target_so_far: u32,
    min_travel_time_area_num_so_far: AreaNum,
    may_stop_at_area_num: AreaNum,
    may_stop_at_stack_frame: Option<usize>,
    may_stop_at_travel_time: u32,
    may_stop_at_origin: Vec3,
    travel_time_at_sequence_start: u32,
    reach_at_sequence_start: ReachNum,
    grounded_area_at_sequence_start: AreaNum,
    origin_at_sequence_start: Vec3,
    sequence_start_millis: u64,
    current_speed_loss_sequential_millis: u32,
    current_unreachable_target_sequential_millis: u32,
    has_entered_nav_target_area: bool,
    has_touched_nav_target: bool,
}

impl GenericBunnying {
    pub fn new(name: &'static str, suggested_action: Option<MovementActionKind>, config: &MovementConfig) -> Self {
        GenericBunnying {
            name,
            suggested_action,
            supports_obstacle_avoidance: false,
            should_try_obstacle_avoidance: false,
            is_trying_obstacle_avoidance: false,
            is_disabled_for_planning: false,
            disabled_for_application_frame_index: None,
            check_stop_at_area_nums: SmallVec::new(),
            min_desired_speed_gain_per_second: config.min_desired_speed_gain_per_second,
            tolerable_speed_loss_sequential_millis: config.tolerable_speed_loss_sequential_millis,
            tolerable_walkable_increased_travel_time_millis: config.tolerable_walkable_increased_travel_time_millis,
            tolerable_unreachable_target_sequential_millis: config.tolerable_unreachable_target_sequential_millis,
            min_travel_time_to_nav_target_so_far: u32::MAX,
            min_travel_time_area_num_so_far: 0,
            may_stop_at_area_num: 0,
            may_stop_at_stack_frame: None,
            may_stop_at_travel_time: 0,
            may_stop_at_origin: Vec3::ZERO,
            travel_time_at_sequence_start: 0,
            reach_at_sequence_start: 0,
            grounded_area_at_sequence_start: 0,
            origin_at_sequence_start: Vec3::ZERO,
            sequence_start_millis: 0,
            current_speed_loss_sequential_millis: 0,
            current_unreachable_target_sequential_millis: 0,
            has_entered_nav_target_area: false,
            has_touched_nav_target: false,
        }
    }

    /// Travel time tolerance in AAS centiseconds.
    #[inline]
    fn tolerable_increased_travel_time(&self) -> u32 {
        self.tolerable_walkable_increased_travel_time_millis / 10
    }

    fn reset_obstacle_avoidance_state(&mut self) {
        self.should_try_obstacle_avoidance = false;
        self.is_trying_obstacle_avoidance = false;
    }

    pub fn before_planning(&mut self) {
        self.is_disabled_for_planning = false;
        self.disabled_for_application_frame_index = None;
        self.reset_obstacle_avoidance_state();
    }

    pub fn sequence_duration(&self, ctx: &MovementPredictionContext) -> u64 {
        ctx.total_millis().saturating_sub(self.sequence_start_millis)
    }

    pub fn generic_check_is_action_enabled(&mut self, ctx: &mut MovementPredictionContext) -> bool {
        if self.is_disabled_for_planning {
            trace!("{}: cannot apply action: the action is disabled for planning", self.name);
            ctx.cannot_apply(self.suggested_action);
            return false;
        }
        if self.disabled_for_application_frame_index != Some(ctx.top_of_stack_index()) {
            return true;
        }
        trace!("{}: cannot apply action: disabled for application on frame {}", self.name, ctx.top_of_stack_index());
        ctx.cannot_apply(self.suggested_action);
        false
    }

    pub fn check_common_bunnying_preconditions(&mut self, ctx: &mut MovementPredictionContext) -> bool {
        if ctx.curr_aas_area_num() == 0 {
            trace!("{}: cannot apply action: curr AAS area num is undefined", self.name);
            ctx.set_pending_rollback();
            return false;
        }
        if ctx.nav_target_aas_area_num() == 0 {
            trace!("{}: cannot apply action: nav target AAS area num is undefined", self.name);
            ctx.set_pending_rollback();
            return false;
        }

        let facts = ctx.facts;
        if facts.keep_crosshair_on_enemy && facts.enemy_origin.is_some() && facts.enemies_potentially_hittable {
            if !ctx.may_hit_while_running().can_hit() {
                trace!("{}: cannot apply action: cannot hit an enemy while keeping the crosshair on it", self.name);
                ctx.set_pending_rollback();
                self.is_disabled_for_planning = true;
                return false;
            }
        }

        // Looks like the bot is too high above the ground
        if !ctx.is_in_nav_target_area() && ctx.next_reach_num() == 0 {
            trace!("{}: cannot apply action: next reachability is undefined outside of the nav target area", self.name);
            ctx.set_pending_rollback();
            return false;
        }

        if !ctx.movement_state.stats.has_feature(PMFEAT_JUMP) {
            trace!("{}: cannot apply action: the bot does not have the jump movement feature", self.name);
            ctx.set_pending_rollback();
            self.is_disabled_for_planning = true;
            return false;
        }

        if facts.should_be_silent {
            trace!("{}: cannot apply action: the bot should be silent", self.name);
            ctx.set_pending_rollback();
            self.is_disabled_for_planning = true;
            return false;
        }
        true
    }

    pub fn setup_common_bunnying_input(&self, ctx: &mut MovementPredictionContext) {
        let stats = ctx.movement_state.stats;
        let physics = ctx.movement_state.physics;
        let hit_test = ctx.may_hit_while_running();

        ctx.record.forward_movement = 1;
        ctx.record.can_override_look_vec = hit_test.can_hit_as_is;
        ctx.record.can_override_pitch = true;

        if stats.has_feature(PMFEAT_DASH) && stats.dash_time == 0 {
            let mut should_dash = false;
            if physics.speed() < ctx.dash_speed() && physics.on_ground {
                // Prevent dashing into obstacles
                let front = ctx.trace_cache_query(TraceQuery::front());
                should_dash = front.trace.fraction >= 1.0;
            }
            if should_dash {
                ctx.record.special_button = true;
                ctx.record.up_movement = 0;
                ctx.prediction_step_millis = ctx.default_frame_millis();
            } else {
                ctx.record.up_movement = 1;
            }
        } else if physics.speed() < ctx.run_speed() {
            ctx.record.up_movement = 0;
        } else {
            ctx.record.up_movement = 1;
        }
    }

    fn can_fly_above_ground_relaxed(&self, ctx: &MovementPredictionContext) -> bool {
        let physics = &ctx.movement_state.physics;
        !physics.on_ground && physics.height_over_ground >= 0.3 * AI_JUMPABLE_HEIGHT
    }

    /// Fills the input to run and jump along `intended_look_vec`.
    pub fn setup_bunnying(&self, intended_look_vec: Vec3, ctx: &mut MovementPredictionContext, max_accel_dot_threshold: f32) -> bool {
        let physics = ctx.movement_state.physics;
        let mut to_target_dir_2d = flat(intended_look_vec);
        let square_speed_2d = physics.square_speed_2d();
        let to_target_dir_2d_sq_len = to_target_dir_2d.length_squared();
        ctx.record.intended_look_dir = intended_look_vec.normalize_or_zero();

        if square_speed_2d > 1.0 {
            self.setup_common_bunnying_input(ctx);
            let velocity_dir_2d = flat(physics.velocity) / physics.speed_2d();
            if to_target_dir_2d_sq_len > 0.1 && !ctx.movement_state.is_skimming_since(&ctx.old_state) {
                to_target_dir_2d /= to_target_dir_2d_sq_len.sqrt();
                let dot = velocity_dir_2d.dot(to_target_dir_2d);
                if dot > 0.0 {
                    if dot >= max_accel_dot_threshold {
                        ctx.cheating_accelerate(1.0);
                    } else {
                        ctx.cheating_accelerate(dot);
                    }
                }
                // A correction for a negative dot product looks like hovering in air
                if dot != 0.0 && dot < STRAIGHT_MOVEMENT_DOT_THRESHOLD {
                    ctx.cheating_correct_velocity(dot, to_target_dir_2d);
                }
            }
        } else if !physics.on_ground {
            // Falling vertically: release keys to allow full control over view
            if ctx.facts.should_attack && self.can_fly_above_ground_relaxed(ctx) {
                ctx.record.clear_movement_directions();
                ctx.record.can_override_look_vec = true;
            }
            return true;
        } else {
            self.setup_common_bunnying_input(ctx);
            return true;
        }

        if ctx.facts.should_attack && self.can_fly_above_ground_relaxed(ctx) {
            ctx.record.clear_movement_directions();
            ctx.record.can_override_look_vec = true;
        }

        // Skip dashes and walljumps near triggers and nav targets
        let next_reach_num = ctx.next_reach_num();
        if next_reach_num == 0 {
            ctx.record.special_button = false;
            ctx.record.can_override_look_vec = false;
            ctx.record.can_override_pitch = false;
            return true;
        }
        match ctx.env.aas.reach(next_reach_num).travel_type {
            TravelType::Teleport | TravelType::JumpPad | TravelType::Elevator | TravelType::Ladder | TravelType::BarrierJump => {
                ctx.record.special_button = false;
                ctx.record.can_override_look_vec = false;
                ctx.record.can_override_pitch = true;
                return true;
            }
            _ => {
                if ctx.is_close_to_nav_target() {
                    ctx.record.special_button = false;
                    ctx.record.can_override_look_vec = false;
                    ctx.record.can_override_pitch = false;
                    return true;
                }
            }
        }

        self.try_set_walljump(ctx);
        true
    }

    fn try_set_walljump(&self, ctx: &mut MovementPredictionContext) {
        if !self.can_set_walljump(ctx) {
            return;
        }
        ctx.record.clear_movement_directions();
        ctx.record.special_button = true;
        ctx.prediction_step_millis = ctx.default_frame_millis();
    }

    fn can_set_walljump(&self, ctx: &mut MovementPredictionContext) -> bool {
        let stats = ctx.movement_state.stats;
        if !stats.has_feature(PMFEAT_WALLJUMP) || stats.walljump_time != 0 || stats.stun_time != 0 {
            return false;
        }
        let physics = ctx.movement_state.physics;
        if physics.on_ground {
            return false;
        }
        if physics.height_over_ground < 8.0 && physics.velocity.z <= 0.0 {
            return false;
        }
        let speed_2d = physics.speed_2d();
        if speed_2d < MIN_WALLJUMP_SPEED_2D {
            return false;
        }
        let velocity_2d_dir = flat(physics.velocity) / speed_2d;

        let front = ctx.trace_cache_query(TraceQuery::front());
        if velocity_2d_dir.dot(front.trace_dir) < 0.7 {
            return false;
        }

        let side_queries = [
            TraceQuery::left().jumpable_height(),
            TraceQuery::right().jumpable_height(),
            TraceQuery::front_left().jumpable_height(),
            TraceQuery::front_right().jumpable_height(),
        ];
        let mask = side_queries.iter().fold(0, |mask, query| mask | query.mask());
        ctx.trace_cache_mask(mask);

        let mut has_good_walljump_normal = false;
        let entries = std::iter::once(Some(front)).chain(side_queries.iter().map(|query| ctx.trace_cache_result(*query)));
        for entry in entries.flatten() {
            if entry.trace.fraction < 1.0 {
                if velocity_2d_dir.dot(entry.trace.normal) < -0.5 {
                    return false;
                }
                has_good_walljump_normal = true;
            }
        }
        has_good_walljump_normal
    }

    /// Rejects steps that bounce back, bump into walls or lose speed for too long.
    pub fn check_step_speed_gain_or_loss(&mut self, ctx: &mut MovementPredictionContext) -> bool {
        let old_physics = *ctx.physics_state_before_step();
        let new_physics = ctx.movement_state.physics;
        let old_square_speed_2d = old_physics.square_speed_2d();
        let new_square_speed_2d = new_physics.square_speed_2d();

        // Unintended bouncing back
        if old_square_speed_2d > BOUNCE_BACK_MIN_SQUARE_SPEED_2D && new_square_speed_2d > 1.0 {
            let old_dir = flat(old_physics.velocity) / old_physics.speed_2d();
            let new_dir = flat(new_physics.velocity) / new_physics.speed_2d();
            if old_dir.dot(new_dir) < BOUNCE_BACK_MAX_DOT {
                trace!("{}: a prediction step has lead to an unintended bouncing back", self.name);
                return false;
            }
        }

        // Bumping into walls
        if new_square_speed_2d < BUMP_MAX_NEW_SQUARE_SPEED_2D && old_square_speed_2d > BUMP_MIN_OLD_SQUARE_SPEED_2D {
            trace!("{}: a prediction step has lead to close to zero 2D speed while it was significant", self.name);
            self.should_try_obstacle_avoidance = true;
            return false;
        }

        let step_millis = ctx.prediction_step_millis.max(1);
        let actual_speed_gain_per_second = (new_physics.speed() - old_physics.speed()) / (0.001 * step_millis as f32);
        if actual_speed_gain_per_second >= self.min_desired_speed_gain_per_second || ctx.is_in_nav_target_area() {
            self.current_speed_loss_sequential_millis = 0;
            return true;
        }

        self.current_speed_loss_sequential_millis += step_millis;
        if self.tolerable_speed_loss_sequential_millis < self.current_speed_loss_sequential_millis {
            // Only interrupt slow trajectories, many feasible ones lose some speed
            if new_physics.speed_2d() < 0.5 * (ctx.run_speed() + ctx.dash_speed()) {
                trace!(
                    "{}: a sequential speed loss interval of {} millis exceeds the tolerable one of {} millis",
                    self.name,
                    self.current_speed_loss_sequential_millis,
                    self.tolerable_speed_loss_sequential_millis
                );
                self.should_try_obstacle_avoidance = true;
                return false;
            }
        }
        true
    }

    fn mark_for_truncation(&mut self, ctx: &mut MovementPredictionContext) {
        self.may_stop_at_area_num = ctx.curr_grounded_aas_area_num();
        self.may_stop_at_travel_time = ctx.travel_time_to_nav_target();
        self.may_stop_at_stack_frame = Some(ctx.top_of_stack_index());
        self.may_stop_at_origin = ctx.movement_state.physics.origin;
    }

    /// Checks common to all predicted actions: dangerous contents and triggers.
    fn base_check_prediction_step_results(&mut self, ctx: &mut MovementPredictionContext) {
        let origin = ctx.movement_state.physics.origin;
        let area_num = ctx.curr_aas_area_num();
        if (area_num != 0 && ctx.env.aas.area(area_num).is_do_not_enter())
            || ctx.env.collision.point_contents(origin) & BAD_CONTENTS != 0
        {
            trace!("{}: a prediction step has lead to a dangerous area", self.name);
            ctx.set_pending_rollback();
            return;
        }
        if ctx.top_of_stack_index() + 1 >= MAX_PREDICTED_STATES {
            trace!("{}: the prediction stack overflow", self.name);
            ctx.set_pending_rollback();
            self.is_disabled_for_planning = true;
            return;
        }
        if ctx.frame_events.has_touched_trigger {
            ctx.is_completed = true;
        }
    }

    pub fn check_prediction_step_results(&mut self, ctx: &mut MovementPredictionContext, this_action: MovementActionKind) {
        self.base_check_prediction_step_results(ctx);
        if ctx.is_pending_rollback() || ctx.is_completed {
            return;
        }

        if ctx.movement_state.is_skimming_since(&ctx.old_state) {
            // Jumping in front of a wall contacting it forever updating the skim timer
            if self.sequence_duration(ctx) > SKIM_STUCK_CHECK_MILLIS
                && square_distance_2d(self.origin_at_sequence_start, ctx.movement_state.physics.origin) < SKIM_STUCK_MIN_SQUARE_DISTANCE_2D
            {
                trace!("{}: looks like the bot is stuck and is resetting the skim timer forever by jumping", self.name);
                ctx.set_pending_rollback();
                return;
            }
            ctx.save_suggested_action_for_next_frame(this_action);
            return;
        }

        if !self.check_step_speed_gain_or_loss(ctx) {
            ctx.set_pending_rollback();
            return;
        }

        let new_physics = ctx.movement_state.physics;

        if ctx.is_in_nav_target_area() {
            self.has_entered_nav_target_area = true;
            if ctx.frame_events.has_touched_nav_target {
                self.has_touched_nav_target = true;
                if self.may_stop_at_area_num == 0 {
                    self.may_stop_at_area_num = ctx.nav_target_aas_area_num();
                    self.may_stop_at_stack_frame = Some(ctx.top_of_stack_index());
                    self.may_stop_at_travel_time = 1;
                    self.may_stop_at_origin = new_physics.origin;
                }
            }
            if !self.has_touched_nav_target {
                if let (Some(target_origin), Some(velocity_dir)) = (ctx.nav_target_origin(), new_physics.velocity_dir()) {
                    let to_target_dir = (target_origin - new_physics.origin).normalize_or_zero();
                    if velocity_dir.dot(to_target_dir) < 0.7 {
                        trace!("{}: the bot is very likely going to miss the nav target", self.name);
                        ctx.set_pending_rollback();
                        return;
                    }
                }
            }
        } else if self.has_entered_nav_target_area && !self.has_touched_nav_target {
            trace!("{}: the bot has left the nav target area without touching the nav target", self.name);
            ctx.set_pending_rollback();
            return;
        }

        let curr_travel_time = ctx.travel_time_to_nav_target();
        if curr_travel_time == 0 {
            self.current_unreachable_target_sequential_millis += ctx.prediction_step_millis;
            // Be strict with jumps right after landing
            if self.current_unreachable_target_sequential_millis > self.tolerable_unreachable_target_sequential_millis {
                trace!("{}: a prediction step has lead to undefined travel time to the nav target", self.name);
                ctx.set_pending_rollback();
                return;
            }
            ctx.save_suggested_action_for_next_frame(this_action);
            return;
        }
        self.current_unreachable_target_sequential_millis = 0;

        let aas = ctx.env.aas;
        let square_distance_from_start = self.origin_at_sequence_start.distance_squared(new_physics.origin);
        let grounded_area_num = ctx.curr_grounded_aas_area_num();

        if curr_travel_time <= self.min_travel_time_to_nav_target_so_far {
            self.min_travel_time_to_nav_target_so_far = curr_travel_time;
            self.min_travel_time_area_num_so_far = ctx.curr_aas_area_num();
            if self.may_stop_at_area_num == 0 && self.should_try_marking_stop(ctx, curr_travel_time, square_distance_from_start, grounded_area_num) {
                let new_physics = ctx.movement_state.physics;
                let speed = new_physics.speed();
                if (speed > 0.0 && new_physics.velocity.z / speed < -0.1) || new_physics.on_ground || ctx.frame_events.has_jumped {
                    self.mark_for_truncation(ctx);
                }
            }
        } else {
            if curr_travel_time > self.min_travel_time_to_nav_target_so_far.saturating_add(self.tolerable_increased_travel_time()) {
                trace!("{}: a prediction step has lead to increased travel time to nav target", self.name);
                ctx.set_pending_rollback();
                return;
            }
            if grounded_area_num != 0 && self.min_travel_time_area_num_so_far != 0 {
                let best_area_num = self.min_travel_time_area_num_so_far;
                let best_cluster = aas.floor_cluster_num(best_area_num);
                let mut walkable = best_cluster != 0 && best_cluster == aas.floor_cluster_num(grounded_area_num);
                if !walkable {
                    // The best area must be reachable by walking from here within the tolerance
                    for area_num in ctx.routing_start_areas() {
                        let time = ctx.env.route_cache.travel_time_to_area(area_num, best_area_num, TFL_GROUND_ONLY);
                        if time != 0 && time * 10 < self.tolerable_walkable_increased_travel_time_millis {
                            walkable = true;
                            break;
                        }
                    }
                }
                if !walkable {
                    trace!("{}: a prediction step has lead to increased travel time to nav target", self.name);
                    ctx.set_pending_rollback();
                    return;
                }
            }
        }

        if square_distance_from_start < STUCK_CHECK_MIN_DISTANCE * STUCK_CHECK_MIN_DISTANCE {
            if self.sequence_duration(ctx) < STUCK_CHECK_MILLIS as u64 {
                ctx.save_suggested_action_for_next_frame(this_action);
                return;
            }
            trace!("{}: the bot still has not covered {} units in {} millis", self.name, STUCK_CHECK_MIN_DISTANCE, STUCK_CHECK_MILLIS);
            ctx.set_pending_rollback();
            return;
        }

        let has_touched_ground = new_physics.on_ground || ctx.frame_events.has_jumped;
        if grounded_area_num != 0 && self.check_stop_at_area_nums.contains(&grounded_area_num) {
            if has_touched_ground {
                ctx.is_completed = true;
                return;
            }
            let floor_cluster_num = aas.floor_cluster_num(grounded_area_num);
            if floor_cluster_num != 0 {
                if self.check_for_premature_completion_in_floor_cluster(ctx, grounded_area_num) {
                    ctx.is_completed = true;
                    return;
                }
            } else if aas.area(grounded_area_num).flags & AREA_NOFALL != 0 && self.generic_check_for_premature_completion(ctx) {
                ctx.is_completed = true;
                return;
            }
            if self.may_stop_at_area_num == 0 {
                self.may_stop_at_area_num = grounded_area_num;
                self.may_stop_at_stack_frame = Some(ctx.top_of_stack_index());
                self.may_stop_at_travel_time = curr_travel_time;
                self.may_stop_at_origin = new_physics.origin;
            }
        }

        if !has_touched_ground {
            ctx.save_suggested_action_for_next_frame(this_action);
            return;
        }

        // At the best reached position
        if self.travel_time_at_sequence_start > curr_travel_time && curr_travel_time == self.min_travel_time_to_nav_target_so_far {
            // Chop the last frame so the next jump is not wasted
            if ctx.frame_events.has_jumped && ctx.top_of_stack_index() > 0 {
                ctx.stop_truncating_stack_at(ctx.top_of_stack_index() - 1);
            } else {
                ctx.is_completed = true;
            }
            return;
        }

        let Some(may_stop_at_stack_frame) = self.may_stop_at_stack_frame.filter(|_| self.may_stop_at_area_num != 0) else {
            const MAX_STEPS_LIMIT: usize = (7 * MAX_PREDICTED_STATES) / 8;
            if square_distance_from_start > 192.0 * 192.0 || ctx.top_of_stack_index() > MAX_STEPS_LIMIT {
                // Accept if the travel time is close to the best one, much better than at start
                // and the bot has landed in a floor cluster
                let min_so_far = self.min_travel_time_to_nav_target_so_far;
                if min_so_far != u32::MAX
                    && curr_travel_time < min_so_far + 25
                    && self.travel_time_at_sequence_start != 0
                    && curr_travel_time + 75 < self.travel_time_at_sequence_start
                    && aas.floor_cluster_num(grounded_area_num) != 0
                {
                    ctx.is_completed = true;
                    return;
                }
                ctx.set_pending_rollback();
                return;
            }
            ctx.save_suggested_action_for_next_frame(this_action);
            return;
        };

        let stop_cluster = aas.floor_cluster_num(self.may_stop_at_area_num);
        if stop_cluster != 0
            && stop_cluster == aas.floor_cluster_num(grounded_area_num)
            && aas.is_area_walkable_in_floor_cluster(grounded_area_num, self.may_stop_at_area_num)
        {
            ctx.stop_truncating_stack_at(may_stop_at_stack_frame);
            return;
        }

        let trace = ctx.env.collision.trace(
            new_physics.origin,
            Vec3::ZERO,
            vec3(PLAYERBOX_STAND_MAXS),
            self.may_stop_at_origin,
        );
        if trace.fraction < 1.0 {
            ctx.save_suggested_action_for_next_frame(this_action);
            return;
        }
        // There still might be a gap between the current and the best position
        ctx.stop_truncating_stack_at(may_stop_at_stack_frame);
    }

    fn should_try_marking_stop(
        &self,
        ctx: &mut MovementPredictionContext,
        curr_travel_time: u32,
        square_distance_from_start: f32,
        grounded_area_num: AreaNum,
    ) -> bool {
        if grounded_area_num == 0 || self.travel_time_at_sequence_start == 0 {
            return false;
        }
        // Just a bit closer to the target
        if self.travel_time_at_sequence_start > 1 + curr_travel_time {
            return square_distance_from_start > 72.0 * 72.0;
        }
        if self.travel_time_at_sequence_start != curr_travel_time || square_distance_from_start <= 96.0 * 96.0 {
            return false;
        }
        // Still in the start area which must be really huge
        if self.grounded_area_at_sequence_start == 0 || self.reach_at_sequence_start == 0 {
            return false;
        }
        let aas = ctx.env.aas;
        let start_area = aas.area(self.grounded_area_at_sequence_start);
        if square_distance_2d(start_area.mins, start_area.maxs) <= 108.0 * 108.0 {
            return false;
        }
        let physics = ctx.movement_state.physics;
        let Some(velocity_dir_2d) = physics.velocity_dir_2d() else {
            return false;
        };
        let reach = aas.reach(self.reach_at_sequence_start);
        // The next reachability must be relatively far
        if square_distance_2d(reach.start, physics.origin) <= 48.0 * 48.0 {
            return false;
        }
        let reach_dir_2d = flat(reach.end - reach.start).normalize_or_zero();
        velocity_dir_2d.dot(reach_dir_2d) > 0.9
    }

    /// Probes the trajectory ahead for a walkable landing surface.
    fn generic_check_for_premature_completion(&self, ctx: &MovementPredictionContext) -> bool {
        let physics = ctx.movement_state.physics;
        let speed_2d = physics.speed_2d();
        let Some(velocity_dir) = physics.velocity_dir() else {
            return false;
        };
        if speed_2d < 1.0 {
            return false;
        }
        let check_distance_limit = 48.0 + 72.0 * bounded_fraction(speed_2d, 750.0);
        let mut xerp_point = velocity_dir * 2.0 * check_distance_limit;
        let time_seconds = flat(xerp_point).length() / speed_2d;
        xerp_point += physics.origin;
        xerp_point.z -= 0.5 * ctx.env.predictor.gravity() * time_seconds * time_seconds;

        let collision = ctx.env.collision;
        let trace = collision.trace_line(physics.origin, xerp_point);
        if trace.fraction >= 1.0 || trace.contents & BAD_CONTENTS != 0 {
            return false;
        }
        let height_over_ground = if physics.height_over_ground.is_finite() { physics.height_over_ground } else { 0.0 };
        let min_permitted_z = physics.origin.z - height_over_ground - 16.0;
        if trace.endpos.z < min_permitted_z {
            return false;
        }
        if trace.normal.z >= 0.7 {
            return true;
        }

        let first_hit_point = trace.endpos;
        let first_hit_normal = trace.normal;
        // Check the ground below the hit point
        let start = trace.endpos + trace.normal;
        let below = collision.trace_line(start, start - Vec3::Z * 64.0);
        if below.fraction >= 1.0 || below.contents & BAD_CONTENTS != 0 || below.endpos.z < min_permitted_z {
            return false;
        }
        if square_distance_2d(first_hit_point, physics.origin) > check_distance_limit * check_distance_limit {
            return true;
        }
        first_hit_normal.dot(velocity_dir) > -0.3
    }

    /// Extrapolates the landing point and checks it stays in the floor cluster.
    fn check_for_premature_completion_in_floor_cluster(&self, ctx: &MovementPredictionContext, curr_grounded_area_num: AreaNum) -> bool {
        let physics = ctx.movement_state.physics;
        let height_over_ground = physics.height_over_ground;
        if !height_over_ground.is_finite() {
            return false;
        }
        // Almost landed
        if height_over_ground < 1.0 {
            return true;
        }
        if physics.speed_2d() < 1.0 {
            return true;
        }

        // (0.5 * g) * t^2 - vz * t - h = 0
        let gravity = ctx.env.predictor.gravity();
        let velocity_z = physics.velocity.z;
        let d = velocity_z * velocity_z + 4.0 * (0.5 * gravity) * height_over_ground;
        if d < 0.0 {
            return false;
        }
        let sqd = d.sqrt();
        let mut time_till_landing = (velocity_z - sqd) / gravity;
        if time_till_landing < 0.0 {
            time_till_landing = (velocity_z + sqd) / gravity;
        }
        if !(0.0..=1.0).contains(&time_till_landing) {
            return false;
        }

        let mut landing_point = physics.origin + flat(physics.velocity) * time_till_landing;
        landing_point.z -= height_over_ground;
        landing_point.z += PLAYERBOX_STAND_MINS[2] + 4.0;

        let aas = ctx.env.aas;
        let landing_area_num = aas.find_area_num(landing_point);
        if landing_area_num == curr_grounded_area_num {
            return true;
        }
        if landing_area_num == 0 || aas.floor_cluster_num(landing_area_num) != aas.floor_cluster_num(curr_grounded_area_num) {
            return false;
        }
        aas.is_area_walkable_in_floor_cluster(curr_grounded_area_num, landing_area_num)
    }

    pub fn on_application_sequence_started(&mut self, ctx: &mut MovementPredictionContext) {
        ctx.mark_savepoint(ctx.top_of_stack_index());

        self.min_travel_time_to_nav_target_so_far = u32::MAX;
        self.min_travel_time_area_num_so_far = 0;
        self.may_stop_at_area_num = 0;
        self.may_stop_at_stack_frame = None;
        self.may_stop_at_travel_time = 0;
        self.travel_time_at_sequence_start = 0;
        self.reach_at_sequence_start = 0;
        self.grounded_area_at_sequence_start = ctx.curr_grounded_aas_area_num();

        if ctx.nav_target_aas_area_num() != 0 {
            let travel_time = ctx.travel_time_to_nav_target();
            if travel_time != 0 {
                self.min_travel_time_to_nav_target_so_far = travel_time;
                self.travel_time_at_sequence_start = travel_time;
                self.reach_at_sequence_start = ctx.next_reach_num();
            }
        }

        self.origin_at_sequence_start = ctx.movement_state.physics.origin;
        self.sequence_start_millis = ctx.total_millis();
        self.current_speed_loss_sequential_millis = 0;
        self.current_unreachable_target_sequential_millis = 0;
        self.has_entered_nav_target_area = false;
        self.has_touched_nav_target = false;
    }

    pub fn on_application_sequence_stopped(
        &mut self,
        ctx: &mut MovementPredictionContext,
        this_action: MovementActionKind,
        reason: SequenceStopReason,
    ) {
        if reason != SequenceStopReason::Failed {
            self.reset_obstacle_avoidance_state();
            if reason != SequenceStopReason::Disabled {
                self.disabled_for_application_frame_index = None;
            }
            return;
        }
        if self.is_disabled_for_planning {
            return;
        }
        if !self.supports_obstacle_avoidance {
            self.disabled_for_application_frame_index = Some(ctx.savepoint_top_of_stack_index());
            return;
        }
        if !self.is_trying_obstacle_avoidance && self.should_try_obstacle_avoidance {
            // Retry once from the savepoint avoiding obstacles
            self.is_trying_obstacle_avoidance = true;
            ctx.save_suggested_action_for_next_frame(this_action);
            return;
        }
        self.disabled_for_application_frame_index = Some(ctx.savepoint_top_of_stack_index());
        self.reset_obstacle_avoidance_state();
    }
}

/// Runs and jumps toward the next reachability of the route, avoiding obstacles on a retry.
#[derive(Debug, Clone)]
pub struct BunnyToNextReachAction {
    pub generic: GenericBunnying,
}

impl BunnyToNextReachAction {
    pub const NAME: &'static str = "BunnyToNextReachAction";

    pub fn new(config: &MovementConfig) -> Self {
        let mut generic = GenericBunnying::new(Self::NAME, None, config);
        generic.supports_obstacle_avoidance = true;
        BunnyToNextReachAction { generic }
    }

    fn intended_look_vec(&self, ctx: &mut MovementPredictionContext) -> Option<Vec3> {
        let origin = ctx.movement_state.physics.origin;
        if ctx.is_in_nav_target_area() {
            return ctx.nav_target_origin().map(|target| target - origin);
        }
        let chain = ctx.next_reach_chain();
        let first = chain.first()?;
        let reach = ctx.env.aas.reach(first.reach_num);
        // Look past a reachability the bot is about to pass
        if square_distance_2d(reach.start, origin) < 48.0 * 48.0 {
            if let Some(second) = chain.get(1) {
                return Some(ctx.env.aas.reach(second.reach_num).start - origin);
            }
            return Some(reach.end - origin);
        }
        Some(reach.start - origin)
    }

    fn avoid_obstacles(&self, intended: Vec3, ctx: &mut MovementPredictionContext) -> Vec3 {
        let front = ctx.trace_cache_query(TraceQuery::front().jumpable_height());
        if front.trace.fraction >= 1.0 {
            return intended;
        }
        let queries = [TraceQuery::front_left().jumpable_height(), TraceQuery::front_right().jumpable_height()];
        ctx.trace_cache_mask(queries[0].mask() | queries[1].mask());
        let intended_dir = flat(intended).normalize_or_zero();
        queries
            .iter()
            .filter_map(|query| ctx.trace_cache_result(*query))
            .filter(|entry| entry.trace.fraction >= 1.0)
            .max_by(|a, b| a.trace_dir.dot(intended_dir).total_cmp(&b.trace_dir.dot(intended_dir)))
            .map_or(intended, |entry| entry.trace_dir * intended.length().max(1.0))
    }

    pub fn plan_prediction_step(&mut self, ctx: &mut MovementPredictionContext) {
        if !self.generic.generic_check_is_action_enabled(ctx) {
            return;
        }
        if !self.generic.check_common_bunnying_preconditions(ctx) {
            return;
        }
        let Some(mut intended) = self.intended_look_vec(ctx) else {
            ctx.set_pending_rollback();
            return;
        };
        if self.generic.is_trying_obstacle_avoidance {
            intended = self.avoid_obstacles(intended, ctx);
        }
        if !self.generic.setup_bunnying(intended, ctx, 1.0) {
            ctx.set_pending_rollback();
        }
    }

    pub fn on_application_sequence_started(&mut self, ctx: &mut MovementPredictionContext) {
        self.generic.on_application_sequence_started(ctx);
        self.generic.check_stop_at_area_nums.clear();
        if let Some(step) = ctx.next_reach_chain().first() {
            self.generic.check_stop_at_area_nums.push(step.area_num);
        }
    }
}
