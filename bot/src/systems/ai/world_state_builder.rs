// tactical_bot_core/bot/src/systems/ai/world_state_builder.rs
//! Fills the planner world state from bot facts and lazily solved tactical spots.
use crate::core::config::TacticalConfig;
use crate::core::frame_cache::FrameCached;
use crate::core::types::*;
use crate::systems::ai::planning::world_state::{BoolVarName, OriginVarName, ShortVarName, WorldState};
use crate::systems::ai::planning::BotFacts;
use crate::world::tactical_spots::{ProblemParams, SpotSolution, SpotsQueryScratch, SpotsSolverEnv, TacticalSpotsProblemSolver};
use tracing::trace;

/// What the bot knows about the fight, computed from the selected enemies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnemyAssessment {
    pub can_hit_enemy: bool,
    pub enemy_can_hit: bool,
    pub has_threatening_enemy: bool,
}

type CachedSpot = FrameCached<Option<SpotSolution>>;

/// Spots solved for the current frame. The roaming spot persists until it is reached or lost.
#[derive(Debug, Clone, Default)]
pub struct TacticalSpotsCache {
    cover: CachedSpot,
    advantage: CachedSpot,
    run_away: CachedSpot,
    dodge: CachedSpot,
    roam_spot: Option<SpotSolution>,
    roam_seed: u64,
}

impl TacticalSpotsCache {
    pub fn new(roam_seed: u64) -> Self {
        TacticalSpotsCache { roam_seed, ..Default::default() }
    }

    pub fn invalidate(&mut self) {
        self.cover.invalidate();
        self.advantage.invalidate();
        self.run_away.invalidate();
        self.dodge.invalidate();
        self.roam_spot = None;
    }

    #[inline]
    pub fn roam_spot(&self) -> Option<SpotSolution> {
        self.roam_spot
    }
}

pub struct WorldStateBuilder<'a, 's> {
    pub env: SpotsSolverEnv<'a>,
    pub config: &'a TacticalConfig,
    pub scratch: &'s mut SpotsQueryScratch,
    pub spots: &'s mut TacticalSpotsCache,
}

fn clamp_short(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

impl<'a, 's> WorldStateBuilder<'a, 's> {
    fn params(&self, facts: &BotFacts, search_radius: f32) -> ProblemParams {
        ProblemParams::new(facts.origin, facts.area_num, search_radius, facts.travel_flags)
    }

    pub fn build(&mut self, facts: &BotFacts, assessment: &EnemyAssessment) -> WorldState {
        let tick = facts.level_time;
        let mut ws = WorldState::new();
        ws.set_origin(OriginVarName::BotOrigin, facts.origin);
        ws.set_short(ShortVarName::Health, clamp_short(facts.health));
        ws.set_short(ShortVarName::Armor, clamp_short(facts.armor));
        if let Some(entity) = facts.selected_nav_entity {
            ws.set_origin(OriginVarName::NavTargetOrigin, entity.origin);
        }
        for name in [
            BoolVarName::HasJustPickedGoalItem,
            BoolVarName::HasJustKilledEnemy,
            BoolVarName::IsRunningAway,
            BoolVarName::HasRunAway,
            BoolVarName::HasReactedToHazard,
        ] {
            ws.set_bool(name, false);
        }

        if let Some(enemy_origin) = facts.enemy_origin.filter(|_| facts.enemies_valid) {
            ws.set_origin(OriginVarName::EnemyOrigin, enemy_origin);
            ws.set_bool(BoolVarName::CanHitEnemy, assessment.can_hit_enemy);
            ws.set_bool(BoolVarName::EnemyCanHit, assessment.enemy_can_hit);
            ws.set_bool(BoolVarName::HasThreateningEnemy, assessment.has_threatening_enemy);
            let has_advantage = facts.origin.z - enemy_origin.z >= self.config.min_height_advantage;
            ws.set_bool(BoolVarName::HasPositionalAdvantage, has_advantage);

            let cover = self.cover_spot(facts, enemy_origin);
            ws.set_origin_opt(OriginVarName::CoverSpot, cover.map(|spot| spot.origin));
            let run_away = self.run_away_spot(facts, enemy_origin);
            ws.set_origin_opt(OriginVarName::RunAwaySpot, run_away.map(|spot| spot.origin));
            if !has_advantage {
                let advantage = self.advantage_spot(facts, enemy_origin);
                ws.set_origin_opt(OriginVarName::AdvantageSpot, advantage.map(|spot| spot.origin));
            }
        }

        if let Some(hazard) = facts.hazard.filter(|hazard| hazard.is_valid(tick) && hazard.supports_impact_tests()) {
            let params = self.params(facts, self.config.dodge_search_radius);
            let env = self.env;
            let scratch = &mut *self.scratch;
            let dodge = *self.spots.dodge.get_or_compute(tick, || {
                TacticalSpotsProblemSolver::new(env, scratch).find_dodge_spot(&params, |point| hazard.has_impact_on_point(point))
            });
            ws.set_origin_opt(OriginVarName::DodgeSpot, dodge.map(|spot| spot.origin));
        }

        let roam = self.roam_spot(facts);
        ws.set_origin_opt(OriginVarName::RoamSpot, roam.map(|spot| spot.origin));
        ws
    }

    fn cover_spot(&mut self, facts: &BotFacts, enemy_origin: Vec3) -> Option<SpotSolution> {
        let params = self.params(facts, self.config.cover_search_radius);
        let (env, scratch) = (self.env, &mut *self.scratch);
        *self.spots.cover.get_or_compute(facts.level_time, || {
            TacticalSpotsProblemSolver::new(env, scratch).find_cover_spot(&params, enemy_origin)
        })
    }

    fn run_away_spot(&mut self, facts: &BotFacts, enemy_origin: Vec3) -> Option<SpotSolution> {
        let params = self.params(facts, self.config.run_away_search_radius);
        let (env, scratch) = (self.env, &mut *self.scratch);
        *self.spots.run_away.get_or_compute(facts.level_time, || {
            TacticalSpotsProblemSolver::new(env, scratch).find_run_away_spot(&params, enemy_origin)
        })
    }

    fn advantage_spot(&mut self, facts: &BotFacts, enemy_origin: Vec3) -> Option<SpotSolution> {
        let params = self.params(facts, self.config.advantage_search_radius);
        let min_height_advantage = self.config.min_height_advantage;
        let (env, scratch) = (self.env, &mut *self.scratch);
        *self.spots.advantage.get_or_compute(facts.level_time, || {
            TacticalSpotsProblemSolver::new(env, scratch).find_advantage_spot(&params, enemy_origin, min_height_advantage)
        })
    }

    fn roam_spot(&mut self, facts: &BotFacts) -> Option<SpotSolution> {
        if let Some(spot) = self.spots.roam_spot {
            if spot.origin.distance(facts.origin) > facts.goal_pickup_action_radius {
                return Some(spot);
            }
            trace!("The roaming spot #{} has been reached", spot.spot_num);
            self.spots.roam_seed = self.spots.roam_seed.wrapping_add(1);
        }
        let params = self.params(facts, self.config.roam_search_radius);
        let spot = TacticalSpotsProblemSolver::new(self.env, &mut *self.scratch).find_roam_spot(&params, self.spots.roam_seed);
        self.spots.roam_spot = spot;
        spot
    }
}
