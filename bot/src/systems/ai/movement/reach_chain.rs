// tactical_bot_core/bot/src/systems/ai/movement/reach_chain.rs
//! Straightening a route: look past the next few walkable reachabilities
//! toward an area the bot can cut straight to.
use crate::core::config::MovementConfig;
use crate::core::constants::*;
use crate::core::types::*;
use crate::systems::ai::awareness::Hazard;
use crate::systems::ai::movement::action::MovementActionKind;
use crate::systems::ai::movement::bunnying::GenericBunnying;
use crate::systems::ai::movement::context::{MovementEnv, MovementFacts, MovementPredictionContext, SequenceStopReason};
use crate::world::aas::{TravelType, TFL_WALK, TFL_WALKOFFLEDGE};
use crate::world::collision::CollisionWorld;
use crate::world::route_cache::RouteStep;
use smallvec::SmallVec;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::trace;

/// Walking or falling to a candidate area must not take longer, in AAS centiseconds.
const MAX_WALKING_OR_FALLING_SHORT_TRAVEL_TIME: u32 = 200;
/// Horizontal speed assumed for arc traces.
const ARC_TRACE_SPEED: f32 = 550.0;
const TRIGGER_LOOK_DIR_SCORE: f32 = 2.0;

/// A point the bot may look at while running, with the area it lies in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaCandidate {
    pub target: Vec3,
    pub area_num: AreaNum,
    /// Index of the reach chain step leading into the area.
    pub chain_index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
struct ByScore(AreaCandidate);

impl PartialEq for ByScore {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ByScore {}

impl PartialOrd for ByScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.score.total_cmp(&other.0.score).then_with(|| other.0.chain_index.cmp(&self.0.chain_index))
    }
}

/// Where the selection starts from.
#[derive(Debug, Clone, Copy)]
pub struct SelectionStart {
    pub origin: Vec3,
    pub area_num: AreaNum,
    pub grounded_area_num: AreaNum,
}

/// How many look dirs a bot of the given skill may test.
pub fn max_suggested_look_dirs(skill: f32, should_rush_headless: bool, config_max: usize) -> usize {
    let max = config_max.clamp(1, MAX_SUGGESTED_LOOK_DIRS);
    if should_rush_headless || skill >= 0.66 {
        return max;
    }
    if skill <= 0.33 {
        return max.min(2);
    }
    let frac = (skill - 0.33) / (0.66 - 0.33);
    (2 + (frac * frac * max as f32) as usize).min(max)
}

/// Tests whether a jump arc between two points is free of solid.
pub fn trace_arc_in_solid_world(collision: &dyn CollisionWorld, gravity: f32, from: Vec3, to: Vec3) -> bool {
    let mut mid = 0.5 * (from + to);
    let t = from.distance(mid) / ARC_TRACE_SPEED;
    let raise = 0.5 * gravity * t * t;
    if raise < 2.0 {
        return collision.trace_line(from, to).is_clear();
    }
    mid.z += raise;
    collision.trace_line(from, mid).is_clear() && collision.trace_line(mid, to).is_clear()
}

fn is_walking_or_falling_short(env: &MovementEnv, start: &SelectionStart, area_num: AreaNum) -> bool {
    [start.area_num, start.grounded_area_num].into_iter().filter(|&num| num != 0).any(|from| {
        let travel_time = env.route_cache.travel_time_to_area(from, area_num, TFL_WALK | TFL_WALKOFFLEDGE);
        travel_time != 0 && travel_time <= MAX_WALKING_OR_FALLING_SHORT_TRAVEL_TIME
    })
}

fn can_cut_straight_to(env: &MovementEnv, start: &SelectionStart, candidate: &AreaCandidate) -> bool {
    let aas = env.aas;
    if start.grounded_area_num != 0 {
        let cluster = aas.floor_cluster_num(start.grounded_area_num);
        // Within a shared floor cluster the 2D walkability test is final
        if cluster != 0 && cluster == aas.floor_cluster_num(candidate.area_num) {
            return aas.is_area_walkable_in_floor_cluster(start.grounded_area_num, candidate.area_num);
        }
    }
    trace_arc_in_solid_world(env.collision, env.predictor.gravity(), start.origin, candidate.target)
        && is_walking_or_falling_short(env, start, candidate.area_num)
}

/// Selects up to `max_candidates` areas along the walkable prefix of a reach chain,
/// best scored first.
pub fn select_candidate_areas(
    env: &MovementEnv,
    start: &SelectionStart,
    chain: &[RouteStep],
    nav_target: Option<NavTarget>,
    hazard: Option<&Hazard>,
    max_candidates: usize,
) -> SmallVec<[AreaCandidate; MAX_SUGGESTED_LOOK_DIRS]> {
    let mut result = SmallVec::new();
    if chain.is_empty() || max_candidates == 0 {
        return result;
    }
    let aas = env.aas;
    let nav_target_area_num = nav_target.map_or(0, |target| target.area_num);
    let hazard = hazard.filter(|hazard| hazard.supports_impact_tests());
    let last_index = chain.len() - 1;

    // A min-heap of the best candidates seen so far
    let mut best: BinaryHeap<Reverse<ByScore>> = BinaryHeap::with_capacity(max_candidates + 1);
    for (i, step) in chain.iter().enumerate() {
        let reach = aas.reach(step.reach_num);
        if !matches!(reach.travel_type, TravelType::Walk | TravelType::WalkOffLedge) {
            break;
        }
        let area_num = reach.area_num;
        let area = aas.area(area_num);
        if !area.is_grounded() || area.is_disabled() || area.is_do_not_enter() {
            continue;
        }
        let (target, score) = match nav_target.filter(|_| area_num == nav_target_area_num) {
            Some(nav_target) => (nav_target.origin, NAV_TARGET_AREA_SCORE),
            None => (area.standing_point(), 0.1 + 0.9 * (i + 1) as f32 / (last_index + 1) as f32),
        };
        let square_distance = target.distance_squared(start.origin);
        if square_distance < MIN_CANDIDATE_AREA_SQUARE_DISTANCE {
            continue;
        }
        // Not monotonic along the chain, later areas may be closer again
        if square_distance > MAX_CANDIDATE_AREA_SQUARE_DISTANCE {
            continue;
        }
        if hazard.is_some_and(|hazard| hazard.has_impact_on_point(target)) {
            continue;
        }
        let candidate = AreaCandidate { target, area_num, chain_index: i, score };
        if !can_cut_straight_to(env, start, &candidate) {
            continue;
        }
        best.push(Reverse(ByScore(candidate)));
        if best.len() > max_candidates {
            best.pop();
        }
        if area_num == nav_target_area_num {
            break;
        }
    }

    let mut sorted = best.into_vec();
    sorted.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    result.extend(sorted.into_iter().map(|Reverse(ByScore(candidate))| candidate));
    result
}

/// The start of a trigger reachability the walkable prefix of the chain ends at.
fn trigger_look_dir(env: &MovementEnv, chain: &[RouteStep]) -> Option<AreaCandidate> {
    for (i, step) in chain.iter().enumerate() {
        let reach = env.aas.reach(step.reach_num);
        match reach.travel_type {
            TravelType::Walk | TravelType::WalkOffLedge => continue,
            TravelType::Teleport | TravelType::JumpPad | TravelType::Elevator => {
                return Some(AreaCandidate {
                    target: reach.start,
                    area_num: reach.start_area,
                    chain_index: i,
                    score: TRIGGER_LOOK_DIR_SCORE,
                });
            }
            _ => return None,
        }
    }
    None
}

/// Appends the trigger look dir after the reach chain ones, evicting the worst of them if the list is full.
fn append_trigger_look_dir(
    look_dirs: &mut SmallVec<[AreaCandidate; MAX_SUGGESTED_LOOK_DIRS]>,
    trigger: AreaCandidate,
    max_dirs: usize,
) {
    if max_dirs == 0 {
        return;
    }
    while look_dirs.len() >= max_dirs {
        look_dirs.pop();
    }
    look_dirs.push(trigger);
}

/// Bunnying that tests the look dirs suggested by the reach chain one by one.
#[derive(Debug, Clone)]
pub struct BunnyStraighteningReachChainAction {
    pub generic: GenericBunnying,
    max_suggested_look_dirs: usize,
    suggested_look_dirs: SmallVec<[AreaCandidate; MAX_SUGGESTED_LOOK_DIRS]>,
    curr_suggested_look_dir_num: usize,
    look_dirs_are_computed: bool,
}

impl BunnyStraighteningReachChainAction {
    pub const NAME: &'static str = "BunnyStraighteningReachChainAction";

    pub fn new(config: &MovementConfig) -> Self {
        BunnyStraighteningReachChainAction {
            generic: GenericBunnying::new(Self::NAME, Some(MovementActionKind::BunnyToNextReach), config),
            max_suggested_look_dirs: config.max_suggested_look_dirs,
            suggested_look_dirs: SmallVec::new(),
            curr_suggested_look_dir_num: 0,
            look_dirs_are_computed: false,
        }
    }

    pub fn suggested_look_dirs(&self) -> &[AreaCandidate] {
        &self.suggested_look_dirs
    }

    pub fn before_planning(&mut self, facts: &MovementFacts, config: &MovementConfig) {
        self.generic.before_planning();
        self.max_suggested_look_dirs = max_suggested_look_dirs(facts.skill, facts.should_rush_headless, config.max_suggested_look_dirs);
        self.suggested_look_dirs.clear();
        self.curr_suggested_look_dir_num = 0;
        self.look_dirs_are_computed = false;
    }

    fn save_suggested_look_dirs(&mut self, ctx: &mut MovementPredictionContext) {
        self.look_dirs_are_computed = true;
        self.suggested_look_dirs.clear();
        self.curr_suggested_look_dir_num = 0;

        let chain = ctx.next_reach_chain();
        let start = SelectionStart {
            origin: ctx.movement_state.physics.origin,
            area_num: ctx.curr_aas_area_num(),
            grounded_area_num: ctx.curr_grounded_aas_area_num(),
        };
        let facts = ctx.facts;
        let hazard = facts.hazard.as_ref().filter(|_| !facts.should_rush_headless);

        let max_dirs = self.max_suggested_look_dirs;
        let candidates = select_candidate_areas(ctx.env, &start, &chain, facts.nav_target, hazard, max_dirs);
        self.suggested_look_dirs.extend(candidates);
        if let Some(trigger) = trigger_look_dir(ctx.env, &chain) {
            append_trigger_look_dir(&mut self.suggested_look_dirs, trigger, max_dirs);
        }
        trace!("{}: {} suggested look dirs", Self::NAME, self.suggested_look_dirs.len());
    }

    pub fn on_application_sequence_started(&mut self, ctx: &mut MovementPredictionContext) {
        self.generic.on_application_sequence_started(ctx);
        if !self.look_dirs_are_computed {
            self.save_suggested_look_dirs(ctx);
        }
        self.generic.check_stop_at_area_nums.clear();
        if let Some(candidate) = self.suggested_look_dirs.get(self.curr_suggested_look_dir_num) {
            self.generic.check_stop_at_area_nums.push(candidate.area_num);
        }
    }

    pub fn plan_prediction_step(&mut self, ctx: &mut MovementPredictionContext) {
        if !self.generic.generic_check_is_action_enabled(ctx) {
            return;
        }
        if !self.generic.check_common_bunnying_preconditions(ctx) {
            return;
        }
        let Some(candidate) = self.suggested_look_dirs.get(self.curr_suggested_look_dir_num).copied() else {
            trace!("{}: there are no suggested look dirs left", Self::NAME);
            self.generic.is_disabled_for_planning = true;
            ctx.cannot_apply(self.generic.suggested_action);
            return;
        };
        let intended_look_vec = candidate.target - ctx.movement_state.physics.origin;
        if !self.generic.setup_bunnying(intended_look_vec, ctx, 0.9) {
            ctx.set_pending_rollback();
        }
    }

    pub fn on_application_sequence_stopped(&mut self, ctx: &mut MovementPredictionContext, reason: SequenceStopReason) {
        if reason != SequenceStopReason::Failed || self.generic.is_disabled_for_planning {
            self.generic.on_application_sequence_stopped(ctx, MovementActionKind::BunnyStraighteningReachChain, reason);
            return;
        }
        self.curr_suggested_look_dir_num += 1;
        if self.curr_suggested_look_dir_num < self.suggested_look_dirs.len() {
            trace!("{}: trying the look dir #{}", Self::NAME, self.curr_suggested_look_dir_num);
            ctx.save_suggested_action_for_next_frame(MovementActionKind::BunnyStraighteningReachChain);
            return;
        }
        self.generic.is_disabled_for_planning = true;
        if let Some(suggested) = self.generic.suggested_action {
            ctx.save_suggested_action_for_next_frame(suggested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::ai::movement::context::test_support::CorridorFixture;
    use crate::systems::ai::movement::physics::SimplePmove;
    use crate::world::aas::{AasWorld, AasWorldBuilder, AREA_GROUNDED, AREA_VOLUME_HEIGHT, TFL_DEFAULT};
    use crate::world::collision::BoxWorld;
    use crate::world::route_cache::{AasRouteCache, ReachChain, RouteCache};
    use proptest::prelude::*;
    use std::sync::Arc;

    /// A hand-built map with an open collision world.
    struct HandMap {
        aas: Arc<AasWorld>,
        route_cache: AasRouteCache,
        collision: BoxWorld,
        predictor: SimplePmove,
        config: MovementConfig,
    }

    impl HandMap {
        fn new(builder: AasWorldBuilder) -> Self {
            let aas = Arc::new(builder.build().unwrap());
            let route_cache = AasRouteCache::new(Arc::clone(&aas));
            HandMap {
                aas,
                route_cache,
                collision: BoxWorld::new(Vec::new()),
                predictor: SimplePmove::default(),
                config: MovementConfig::default(),
            }
        }

        fn env(&self) -> MovementEnv<'_> {
            MovementEnv {
                aas: &self.aas,
                route_cache: &self.route_cache,
                collision: &self.collision,
                predictor: &self.predictor,
                config: &self.config,
            }
        }

        /// A chain visiting the areas in order using their direct reachabilities.
        fn chain_through(&self, area_nums: &[AreaNum]) -> ReachChain {
            area_nums
                .windows(2)
                .map(|pair| {
                    let reach_num = self
                        .aas
                        .area_reach_nums(pair[0])
                        .find(|&num| self.aas.reach(num).area_num == pair[1])
                        .unwrap();
                    RouteStep { reach_num, area_num: pair[1], travel_time: 0 }
                })
                .collect()
        }

        fn select(&self, start_area: AreaNum, chain: &ReachChain, target_area: AreaNum) -> SmallVec<[AreaCandidate; MAX_SUGGESTED_LOOK_DIRS]> {
            let start = SelectionStart {
                origin: self.aas.area(start_area).standing_point(),
                area_num: start_area,
                grounded_area_num: start_area,
            };
            let target = NavTarget { origin: self.aas.area(target_area).standing_point(), area_num: target_area, is_entity: false };
            select_candidate_areas(&self.env(), &start, chain, Some(target), None, MAX_SUGGESTED_LOOK_DIRS)
        }
    }

    fn box_area(builder: &mut AasWorldBuilder, x: (f32, f32), y: (f32, f32), flags: u32) -> AreaNum {
        builder.add_area(Vec3::new(x.0, y.0, 0.0), Vec3::new(x.1, y.1, AREA_VOLUME_HEIGHT), flags, 0)
    }

    fn walk(builder: &mut AasWorldBuilder, from: AreaNum, to: AreaNum, travel_time: u16) {
        builder
            .add_reach_with_time(from, to, TravelType::Walk, Vec3::new(0.0, 0.0, 24.0), Vec3::new(0.0, 0.0, 24.0), travel_time)
            .unwrap();
    }

    fn candidate(area_num: AreaNum, score: f32) -> AreaCandidate {
        AreaCandidate { target: Vec3::ZERO, area_num, chain_index: 0, score }
    }

    fn corridor_selection(fixture: &CorridorFixture, target_cell: usize, max: usize) -> (ReachChain, SmallVec<[AreaCandidate; MAX_SUGGESTED_LOOK_DIRS]>) {
        let env = fixture.env();
        let start_area = fixture.map.cell_area(0, 0);
        let target = fixture.cell_target(target_cell);
        let mut chain = ReachChain::new();
        fixture.route_cache.reach_chain(start_area, target.area_num, TFL_DEFAULT, &mut chain);
        let start = SelectionStart {
            origin: fixture.map.aas.area(start_area).standing_point(),
            area_num: start_area,
            grounded_area_num: start_area,
        };
        let selected = select_candidate_areas(&env, &start, &chain, Some(target), None, max);
        (chain, selected)
    }

    #[test]
    fn look_dir_count_scales_with_skill() {
        assert_eq!(max_suggested_look_dirs(0.1, false, 16), 2);
        assert_eq!(max_suggested_look_dirs(0.9, false, 16), 16);
        assert_eq!(max_suggested_look_dirs(0.1, true, 16), 16);
        let mid = max_suggested_look_dirs(0.5, false, 16);
        assert!(mid > 2 && mid < 16);
        assert_eq!(max_suggested_look_dirs(0.9, false, 4), 4);
    }

    #[test]
    fn nav_target_area_is_preferred() {
        let fixture = CorridorFixture::new(6);
        let (_, selected) = corridor_selection(&fixture, 5, 16);
        assert!(!selected.is_empty());
        assert_eq!(selected[0].area_num, fixture.map.cell_area(5, 0));
        assert_eq!(selected[0].score, NAV_TARGET_AREA_SCORE);
        // The adjacent cell center is farther than the minimal distance
        assert!(selected.iter().any(|c| c.area_num == fixture.map.cell_area(1, 0)));
    }

    #[test]
    fn top_k_keeps_the_farthest_along_the_chain() {
        let fixture = CorridorFixture::new(6);
        let (_, selected) = corridor_selection(&fixture, 5, 2);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].area_num, fixture.map.cell_area(5, 0));
        assert_eq!(selected[1].area_num, fixture.map.cell_area(4, 0));
    }

    #[test]
    fn hazard_rejects_areas_it_reaches() {
        let fixture = CorridorFixture::new(6);
        let env = fixture.env();
        let start_area = fixture.map.cell_area(0, 0);
        let target = fixture.cell_target(5);
        let mut chain = ReachChain::new();
        fixture.route_cache.reach_chain(start_area, target.area_num, TFL_DEFAULT, &mut chain);
        let start = SelectionStart {
            origin: fixture.map.aas.area(start_area).standing_point(),
            area_num: start_area,
            grounded_area_num: start_area,
        };
        let hazard_point = fixture.map.aas.area(fixture.map.cell_area(3, 0)).standing_point();
        let hazard = Hazard::splash(hazard_point, 64.0, 80.0, 1000);
        let selected = select_candidate_areas(&env, &start, &chain, Some(target), Some(&hazard), 16);
        assert!(!selected.is_empty());
        assert!(selected.iter().all(|c| c.area_num != fixture.map.cell_area(3, 0)));
    }

    #[test]
    fn far_area_does_not_hide_later_near_ones() {
        // The route makes a U-turn through a far away area before reaching the target next to the start
        let mut builder = AasWorldBuilder::new();
        let start = box_area(&mut builder, (0.0, 256.0), (0.0, 256.0), AREA_GROUNDED);
        let target = box_area(&mut builder, (256.0, 768.0), (0.0, 256.0), AREA_GROUNDED);
        let far = box_area(&mut builder, (1600.0, 1856.0), (0.0, 256.0), AREA_GROUNDED);
        walk(&mut builder, start, far, 500);
        walk(&mut builder, far, target, 500);
        let map = HandMap::new(builder);
        assert!(map.aas.is_area_walkable_in_floor_cluster(start, target));

        let chain = map.chain_through(&[start, far, target]);
        let selected = map.select(start, &chain, target);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].area_num, target);
        assert_eq!(selected[0].score, NAV_TARGET_AREA_SCORE);
    }

    #[test]
    fn ungrounded_areas_are_skipped() {
        let mut builder = AasWorldBuilder::new();
        let start = box_area(&mut builder, (0.0, 256.0), (0.0, 256.0), AREA_GROUNDED);
        let air = box_area(&mut builder, (256.0, 768.0), (0.0, 256.0), 0);
        walk(&mut builder, start, air, 50);
        let map = HandMap::new(builder);
        assert_eq!(map.aas.floor_cluster_num(air), 0);
        assert_ne!(map.route_cache.travel_time_to_area(start, air, TFL_WALK), 0);

        let chain = map.chain_through(&[start, air]);
        assert!(map.select(start, &chain, air).is_empty());
    }

    #[test]
    fn same_cluster_area_must_be_walkable_in_a_straight_line() {
        // The target shares the floor cluster but a gap separates it from the start
        let mut builder = AasWorldBuilder::new();
        let start = box_area(&mut builder, (0.0, 256.0), (0.0, 256.0), AREA_GROUNDED);
        let detour = box_area(&mut builder, (0.0, 768.0), (256.0, 512.0), AREA_GROUNDED);
        let target = box_area(&mut builder, (512.0, 768.0), (0.0, 256.0), AREA_GROUNDED);
        walk(&mut builder, start, detour, 40);
        walk(&mut builder, detour, target, 40);
        walk(&mut builder, start, target, 50);
        let map = HandMap::new(builder);
        assert_ne!(map.aas.floor_cluster_num(start), 0);
        assert_eq!(map.aas.floor_cluster_num(start), map.aas.floor_cluster_num(target));
        assert!(!map.aas.is_area_walkable_in_floor_cluster(start, target));
        // An arc trace in the open world and a short walk would have accepted it
        let from = map.aas.area(start).standing_point();
        let to = map.aas.area(target).standing_point();
        assert!(trace_arc_in_solid_world(&map.collision, DEFAULT_GRAVITY, from, to));

        let chain = map.chain_through(&[start, target]);
        assert!(map.select(start, &chain, target).is_empty());
    }

    #[test]
    fn trigger_look_dir_goes_last_and_evicts_the_worst() {
        let mut dirs: SmallVec<[AreaCandidate; MAX_SUGGESTED_LOOK_DIRS]> = SmallVec::new();
        dirs.extend([candidate(1, 0.9), candidate(2, 0.5)]);
        append_trigger_look_dir(&mut dirs, candidate(7, TRIGGER_LOOK_DIR_SCORE), 3);
        assert_eq!(dirs.iter().map(|c| c.area_num).collect::<Vec<_>>(), vec![1, 2, 7]);

        append_trigger_look_dir(&mut dirs, candidate(8, TRIGGER_LOOK_DIR_SCORE), 3);
        assert_eq!(dirs.iter().map(|c| c.area_num).collect::<Vec<_>>(), vec![1, 2, 8]);

        let mut single: SmallVec<[AreaCandidate; MAX_SUGGESTED_LOOK_DIRS]> = SmallVec::new();
        single.push(candidate(1, 0.9));
        append_trigger_look_dir(&mut single, candidate(7, TRIGGER_LOOK_DIR_SCORE), 1);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].area_num, 7);
    }

    #[test]
    fn arc_trace_detects_low_ceiling() {
        use crate::world::collision::{BoxWorld, SolidBox};
        let world = BoxWorld::new(vec![SolidBox::new(
            Vec3::new(200.0, -64.0, 60.0),
            Vec3::new(300.0, 64.0, 130.0),
            CONTENTS_SOLID,
        )]);
        let from = Vec3::new(0.0, 0.0, 24.0);
        let to = Vec3::new(500.0, 0.0, 24.0);
        assert!(!trace_arc_in_solid_world(&world, DEFAULT_GRAVITY, from, to));
        assert!(trace_arc_in_solid_world(&world, DEFAULT_GRAVITY, from, Vec3::new(-500.0, 0.0, 24.0)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn selection_is_bounded_and_ordered(len in 2usize..10, max in 1usize..=MAX_SUGGESTED_LOOK_DIRS) {
            let fixture = CorridorFixture::new(len);
            let (chain, selected) = corridor_selection(&fixture, len - 1, max);
            prop_assert!(selected.len() <= chain.len().min(max));

            let mut by_chain_index: Vec<AreaCandidate> = selected.to_vec();
            by_chain_index.sort_by_key(|c| c.chain_index);
            for pair in by_chain_index.windows(2) {
                prop_assert!(pair[0].score < pair[1].score);
            }
            let nav_area_num = fixture.map.cell_area(len - 1, 0);
            for candidate in &selected {
                if candidate.area_num == nav_area_num {
                    prop_assert_eq!(candidate.score, NAV_TARGET_AREA_SCORE);
                } else {
                    prop_assert!(candidate.score < 1.0);
                }
            }
        }
    }
}
