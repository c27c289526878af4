// tactical_bot_core/bot/src/systems/ai/planning/action.rs
use crate::core::config::PlannerConfig;
use crate::core::constants::{ORIGIN_VAR_MAX_ROUNDING_SQUARE_DISTANCE_ERROR, UNREACHABLE_TRAVEL_TIME_MILLIS};
use crate::core::types::*;
use crate::systems::ai::planning::record::ActionRecord;
use crate::systems::ai::planning::world_state::{BoolVarName, OriginVarName, WorldState};
use crate::systems::ai::planning::BotFacts;
use crate::world::aas::AasWorld;
use crate::world::route_cache::RouteCache;
use tracing::trace;

/// Everything an action may consult besides the world state it is applied to.
pub struct PlanningContext<'a> {
    pub aas: &'a AasWorld,
    pub route_cache: &'a dyn RouteCache,
    pub config: &'a PlannerConfig,
    pub facts: &'a BotFacts,
}

impl<'a> PlanningContext<'a> {
    /// Travel time between two points in millis, 0 if there is no route.
    pub fn travel_time_millis(&self, from: Vec3, to: Vec3) -> u32 {
        let from_area = self.aas.find_area_num(from);
        let to_area = self.aas.find_area_num(to);
        if from_area == 0 || to_area == 0 {
            return 0;
        }
        // AAS travel times are centiseconds
        10 * self.route_cache.travel_time_to_area(from_area, to_area, self.facts.travel_flags)
    }

    fn spot_target(&self, origin: Vec3) -> NavTarget {
        NavTarget { origin, area_num: self.aas.find_area_num(origin), is_entity: false }
    }
}

/// A successful application of an action: the post-condition state, the edge cost and the record.
#[derive(Debug, Clone)]
pub struct Transition {
    pub world_state: WorldState,
    pub cost: f32,
    pub record: ActionRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningAction {
    RunToNavEntity,
    PickupNavEntity,
    FleeToSpot,
    StartRunningAway,
    StartGotoCover,
    TakeCover,
    AdvanceToGoodPosition,
    AttackFromCurrentPosition,
    DodgeToSpot,
    RoamToSpot,
}

impl PlanningAction {
    pub fn name(self) -> &'static str {
        match self {
            PlanningAction::RunToNavEntity => "RunToNavEntityAction",
            PlanningAction::PickupNavEntity => "PickupNavEntityAction",
            PlanningAction::FleeToSpot => "FleeToSpotAction",
            PlanningAction::StartRunningAway => "StartRunningAwayAction",
            PlanningAction::StartGotoCover => "StartGotoCoverAction",
            PlanningAction::TakeCover => "TakeCoverAction",
            PlanningAction::AdvanceToGoodPosition => "AdvanceToGoodPositionAction",
            PlanningAction::AttackFromCurrentPosition => "AttackFromCurrentPositionAction",
            PlanningAction::DodgeToSpot => "DodgeToSpotAction",
            PlanningAction::RoamToSpot => "RoamToSpotAction",
        }
    }

    /// Tests preconditions and produces a mutated copy of the world state on success.
    pub fn try_apply(self, ctx: &PlanningContext, ws: &WorldState) -> Option<Transition> {
        let result = match self {
            PlanningAction::RunToNavEntity => run_to_nav_entity(ctx, ws),
            PlanningAction::PickupNavEntity => pickup_nav_entity(ctx, ws),
            PlanningAction::FleeToSpot => flee_to_spot(ctx, ws),
            PlanningAction::StartRunningAway => start_retreat(ws, OriginVarName::RunAwaySpot, ActionRecord::StartRunningAway),
            PlanningAction::StartGotoCover => start_retreat(ws, OriginVarName::CoverSpot, ActionRecord::StartGotoCover),
            PlanningAction::TakeCover => take_cover(ctx, ws),
            PlanningAction::AdvanceToGoodPosition => advance_to_good_position(ctx, ws),
            PlanningAction::AttackFromCurrentPosition => attack_from_current_position(ws),
            PlanningAction::DodgeToSpot => move_to_spot(ctx, ws, OriginVarName::DodgeSpot, |mut next, spot| {
                next.set_bool(BoolVarName::HasReactedToHazard, true);
                (next, ActionRecord::DodgeToSpot { spot })
            }),
            PlanningAction::RoamToSpot => move_to_spot(ctx, ws, OriginVarName::RoamSpot, |next, spot| {
                (next, ActionRecord::RoamToSpot { spot })
            }),
        };
        if result.is_none() {
            trace!("{} is not applicable", self.name());
        }
        result
    }
}

/// The bot is moved to the origin, spots computed for the old origin are dropped.
fn moved_bot(ws: &WorldState, origin: Vec3) -> WorldState {
    let mut next = ws.clone();
    next.set_origin(OriginVarName::BotOrigin, origin);
    next.reset_tactical_spots();
    next
}

/// The nav target must be the selected nav entity, otherwise a generic action handles it.
fn selected_entity_target(ctx: &PlanningContext, ws: &WorldState) -> Option<NavEntity> {
    let entity = ctx.facts.selected_nav_entity?;
    let nav_target = ws.origin(OriginVarName::NavTargetOrigin)?;
    (entity.origin.distance_squared(nav_target) < ORIGIN_VAR_MAX_ROUNDING_SQUARE_DISTANCE_ERROR).then_some(entity)
}

fn run_to_nav_entity(ctx: &PlanningContext, ws: &WorldState) -> Option<Transition> {
    let entity = selected_entity_target(ctx, ws)?;
    if ws.distance_to_nav_target() <= ctx.config.goal_pickup_action_radius {
        return None;
    }
    let bot_origin = ws.origin(OriginVarName::BotOrigin)?;
    let travel_time = ctx.travel_time_millis(bot_origin, entity.origin);
    if travel_time == 0 {
        return None;
    }
    let nav_target = ws.origin(OriginVarName::NavTargetOrigin)?;
    Some(Transition {
        world_state: moved_bot(ws, nav_target),
        cost: travel_time as f32,
        record: ActionRecord::RunToNavEntity { entity },
    })
}

fn pickup_nav_entity(ctx: &PlanningContext, ws: &WorldState) -> Option<Transition> {
    let entity = selected_entity_target(ctx, ws)?;
    if ws.is_set(BoolVarName::HasJustPickedGoalItem) {
        return None;
    }
    if ws.distance_to_nav_target() > ctx.config.goal_pickup_action_radius {
        return None;
    }
    let mut next = ws.clone();
    next.set_bool(BoolVarName::HasJustPickedGoalItem, true);
    next.ignore_origin(OriginVarName::NavTargetOrigin);
    Some(Transition { world_state: next, cost: 1.0, record: ActionRecord::PickupNavEntity { entity } })
}

fn flee_to_spot(ctx: &PlanningContext, ws: &WorldState) -> Option<Transition> {
    if !ws.is_set(BoolVarName::IsRunningAway) {
        return None;
    }
    let nav_target = ws.origin(OriginVarName::NavTargetOrigin)?;
    if ws.distance_to_nav_target() <= ctx.config.goal_pickup_action_radius {
        return None;
    }
    // Item targets and cover spots have their own specialized actions
    if selected_entity_target(ctx, ws).is_some() || ws.origins_coincide(OriginVarName::NavTargetOrigin, OriginVarName::CoverSpot) {
        return None;
    }

    // Retreating may use kinds of movement the AAS graph is not aware of, so unreachable targets are allowed
    let bot_origin = ws.origin(OriginVarName::BotOrigin)?;
    let mut travel_time = ctx.travel_time_millis(bot_origin, nav_target);
    if travel_time == 0 {
        travel_time = UNREACHABLE_TRAVEL_TIME_MILLIS;
    }

    let mut next = moved_bot(ws, nav_target);
    next.set_bool(BoolVarName::HasRunAway, true);
    Some(Transition {
        world_state: next,
        cost: travel_time as f32,
        record: ActionRecord::FleeToSpot { spot: ctx.spot_target(nav_target) },
    })
}

fn start_retreat(ws: &WorldState, spot_var: OriginVarName, record: ActionRecord) -> Option<Transition> {
    if ws.is_set(BoolVarName::IsRunningAway) || ws.origin(OriginVarName::EnemyOrigin).is_none() {
        return None;
    }
    let spot = ws.origin(spot_var)?;
    let mut next = ws.clone();
    next.set_bool(BoolVarName::IsRunningAway, true);
    next.set_origin(OriginVarName::NavTargetOrigin, spot);
    Some(Transition { world_state: next, cost: 1.0, record })
}

fn take_cover(ctx: &PlanningContext, ws: &WorldState) -> Option<Transition> {
    if !ws.is_set(BoolVarName::IsRunningAway) {
        return None;
    }
    if !ws.origins_coincide(OriginVarName::NavTargetOrigin, OriginVarName::CoverSpot) {
        return None;
    }
    if ws.distance_to_nav_target() <= ctx.config.goal_pickup_action_radius {
        return None;
    }
    let spot = ws.origin(OriginVarName::CoverSpot)?;
    let bot_origin = ws.origin(OriginVarName::BotOrigin)?;
    let travel_time = ctx.travel_time_millis(bot_origin, spot);
    if travel_time == 0 {
        return None;
    }
    let mut next = moved_bot(ws, spot);
    next.set_bool(BoolVarName::HasRunAway, true);
    Some(Transition { world_state: next, cost: travel_time as f32, record: ActionRecord::TakeCover { spot: ctx.spot_target(spot) } })
}

fn advance_to_good_position(ctx: &PlanningContext, ws: &WorldState) -> Option<Transition> {
    if ws.is_set(BoolVarName::HasPositionalAdvantage) || ws.origin(OriginVarName::EnemyOrigin).is_none() {
        return None;
    }
    let spot = ws.origin(OriginVarName::AdvantageSpot)?;
    let bot_origin = ws.origin(OriginVarName::BotOrigin)?;
    // Combat movement must be simple enough to keep the crosshair on the enemy
    let travel_time = ctx.travel_time_millis(bot_origin, spot);
    if travel_time == 0 {
        return None;
    }
    let mut next = moved_bot(ws, spot);
    next.set_bool(BoolVarName::HasPositionalAdvantage, true);
    next.set_bool(BoolVarName::CanHitEnemy, true);
    Some(Transition {
        world_state: next,
        cost: travel_time as f32,
        record: ActionRecord::AdvanceToGoodPosition { spot: ctx.spot_target(spot) },
    })
}

fn attack_from_current_position(ws: &WorldState) -> Option<Transition> {
    let enemy_origin = ws.origin(OriginVarName::EnemyOrigin)?;
    if !ws.is_set(BoolVarName::CanHitEnemy) || ws.is_set(BoolVarName::HasJustKilledEnemy) {
        return None;
    }
    let cost = if ws.is_set(BoolVarName::HasPositionalAdvantage) { 500.0 } else { 1500.0 };
    let mut next = ws.clone();
    next.set_bool(BoolVarName::HasJustKilledEnemy, true);
    Some(Transition { world_state: next, cost, record: ActionRecord::AttackFromCurrentPosition { enemy_origin } })
}

fn move_to_spot(
    ctx: &PlanningContext,
    ws: &WorldState,
    spot_var: OriginVarName,
    finish: impl FnOnce(WorldState, NavTarget) -> (WorldState, ActionRecord),
) -> Option<Transition> {
    let spot = ws.origin(spot_var)?;
    let bot_origin = ws.origin(OriginVarName::BotOrigin)?;
    if bot_origin.distance(spot) <= ctx.config.goal_pickup_action_radius {
        return None;
    }
    let travel_time = ctx.travel_time_millis(bot_origin, spot);
    if travel_time == 0 {
        return None;
    }
    let (world_state, record) = finish(moved_bot(ws, spot), ctx.spot_target(spot));
    Some(Transition { world_state, cost: travel_time as f32, record })
}
