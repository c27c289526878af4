// tactical_bot_core/bot/src/world/tactical_spots/solvers.rs
use crate::core::constants::PLAYERBOX_STAND_VIEWHEIGHT;
use crate::core::types::*;
use crate::world::collision::CollisionWorld;
use crate::world::route_cache::RouteCache;
use crate::world::tactical_spots::registry::{SpotsQuery, SpotsQueryScratch, TacticalSpotsRegistry};
use smallvec::SmallVec;

/// Only this many best pre-scored candidates are confirmed by collision traces.
const MAX_TRACED_CANDIDATES: usize = 16;
const MIN_ENEMY_DISTANCE: f32 = 128.0;
const MIN_ROAM_DISTANCE: f32 = 256.0;

/// Shared read-only collaborators of the problem solvers.
#[derive(Clone, Copy)]
pub struct SpotsSolverEnv<'a> {
    pub registry: &'a TacticalSpotsRegistry,
    pub route_cache: &'a dyn RouteCache,
    pub collision: &'a dyn CollisionWorld,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProblemParams {
    pub origin: Vec3,
    pub origin_area_num: AreaNum,
    pub search_radius: f32,
    pub travel_flags: u32,
    /// Spots farther than this by travel time are not considered.
    pub max_travel_time_millis: u32,
}

impl ProblemParams {
    pub fn new(origin: Vec3, origin_area_num: AreaNum, search_radius: f32, travel_flags: u32) -> Self {
        ProblemParams { origin, origin_area_num, search_radius, travel_flags, max_travel_time_millis: 5000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotSolution {
    pub spot_num: SpotNum,
    pub origin: Vec3,
    pub area_num: AreaNum,
    pub travel_time_millis: u32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    spot_num: SpotNum,
    origin: Vec3,
    area_num: AreaNum,
    travel_time_millis: u32,
    score: f32,
}

type Candidates = SmallVec<[Candidate; 64]>;

/// Cover, advantage, run-away, dodge and roaming spot selection.
///
/// Every problem goes through the same pipeline: a radius query, cheap static
/// filters, the travel time table as a pre-filter, a route cache confirmation
/// and finally collision traces for the best few candidates.
pub struct TacticalSpotsProblemSolver<'a, 's> {
    env: SpotsSolverEnv<'a>,
    scratch: &'s mut SpotsQueryScratch,
}

impl<'a, 's> TacticalSpotsProblemSolver<'a, 's> {
    pub fn new(env: SpotsSolverEnv<'a>, scratch: &'s mut SpotsQueryScratch) -> Self {
        TacticalSpotsProblemSolver { env, scratch }
    }

    /// Collects reachable spots that pass `static_filter`, scored by `score_fn` (higher is better).
    fn collect_candidates(
        &mut self,
        params: &ProblemParams,
        query: SpotsQuery,
        static_filter: impl Fn(Vec3) -> bool,
        score_fn: impl Fn(Vec3, u32) -> f32,
    ) -> Candidates {
        let mut candidates = Candidates::new();
        if params.origin_area_num == 0 {
            return candidates;
        }
        let registry = self.env.registry;
        registry.find_spots_in_radius(&query, self.scratch);

        let max_table_time = (params.max_travel_time_millis / 10).min(u16::MAX as u32) as u16;
        for &spot_num in self.scratch.spots() {
            let Some(spot) = registry.spot(spot_num) else { continue };
            if !static_filter(spot.origin) {
                continue;
            }
            // The table is advisory, a nonzero entry is only "likely reachable"
            let table_time = registry.travel_time_from_area_to_spot(params.origin_area_num, spot_num);
            if table_time == 0 || table_time > max_table_time {
                continue;
            }
            let travel_time = self.env.route_cache.travel_time_to_area(params.origin_area_num, spot.area_num, params.travel_flags);
            if travel_time == 0 {
                continue;
            }
            let travel_time_millis = travel_time * 10;
            if travel_time_millis > params.max_travel_time_millis {
                continue;
            }
            candidates.push(Candidate {
                spot_num,
                origin: spot.origin,
                area_num: spot.area_num,
                travel_time_millis,
                score: score_fn(spot.origin, travel_time_millis),
            });
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    fn first_confirmed(candidates: &Candidates, confirm: impl Fn(&Candidate) -> bool) -> Option<SpotSolution> {
        candidates
            .iter()
            .take(MAX_TRACED_CANDIDATES)
            .find(|candidate| confirm(candidate))
            .map(|c| SpotSolution {
                spot_num: c.spot_num,
                origin: c.origin,
                area_num: c.area_num,
                travel_time_millis: c.travel_time_millis,
            })
    }

    fn is_visible_from(&self, viewer_origin: Vec3, spot_origin: Vec3) -> bool {
        let view_offset = Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);
        self.env.collision.trace_line(viewer_origin + view_offset, spot_origin + view_offset).is_clear()
    }

    /// A close spot the enemy can't see.
    pub fn find_cover_spot(&mut self, params: &ProblemParams, enemy_origin: Vec3) -> Option<SpotSolution> {
        let query = SpotsQuery::new(params.origin, params.search_radius).with_area_num(params.origin_area_num);
        let candidates = self.collect_candidates(
            params,
            query,
            |origin| origin.distance_squared(enemy_origin) > MIN_ENEMY_DISTANCE * MIN_ENEMY_DISTANCE,
            |_, travel_time_millis| 1.0 / (1.0 + travel_time_millis as f32),
        );
        Self::first_confirmed(&candidates, |c| !self.is_visible_from(enemy_origin, c.origin))
    }

    /// A spot higher than the enemy that still has a line of fire to it.
    pub fn find_advantage_spot(
        &mut self,
        params: &ProblemParams,
        enemy_origin: Vec3,
        min_height_advantage: f32,
    ) -> Option<SpotSolution> {
        let query = SpotsQuery::new(params.origin, params.search_radius).with_area_num(params.origin_area_num);
        let max_enemy_distance = 1.5 * params.search_radius;
        let candidates = self.collect_candidates(
            params,
            query,
            |origin| {
                let distance = origin.distance(enemy_origin);
                origin.z - enemy_origin.z >= min_height_advantage
                    && distance > MIN_ENEMY_DISTANCE
                    && distance < max_enemy_distance
            },
            |origin, travel_time_millis| {
                let height_factor = bounded_fraction(origin.z - enemy_origin.z, 256.0);
                (0.5 + height_factor) / (1.0 + 0.001 * travel_time_millis as f32)
            },
        );
        Self::first_confirmed(&candidates, |c| self.is_visible_from(enemy_origin, c.origin))
    }

    /// A spot that increases the distance to the enemy the most per travel time, preferring hidden ones.
    pub fn find_run_away_spot(&mut self, params: &ProblemParams, enemy_origin: Vec3) -> Option<SpotSolution> {
        let query = SpotsQuery::new(params.origin, params.search_radius).with_area_num(params.origin_area_num);
        let current_distance = params.origin.distance(enemy_origin);
        let candidates = self.collect_candidates(
            params,
            query,
            |origin| origin.distance(enemy_origin) > current_distance + MIN_ENEMY_DISTANCE,
            |origin, travel_time_millis| {
                let gain = origin.distance(enemy_origin) - current_distance;
                gain / (1.0 + travel_time_millis as f32)
            },
        );
        if let Some(hidden) = Self::first_confirmed(&candidates, |c| !self.is_visible_from(enemy_origin, c.origin)) {
            return Some(hidden);
        }
        Self::first_confirmed(&candidates, |_| true)
    }

    /// The closest spot the hazard has no impact on.
    pub fn find_dodge_spot(&mut self, params: &ProblemParams, is_affected: impl Fn(Vec3) -> bool) -> Option<SpotSolution> {
        let query = SpotsQuery::new(params.origin, params.search_radius).with_area_num(params.origin_area_num);
        let candidates = self.collect_candidates(
            params,
            query,
            |origin| !is_affected(origin),
            |_, travel_time_millis| 1.0 / (1.0 + travel_time_millis as f32),
        );
        Self::first_confirmed(&candidates, |_| true)
    }

    /// A reachable spot away from the origin, picked pseudo-randomly but stable for the same seed.
    pub fn find_roam_spot(&mut self, params: &ProblemParams, seed: u64) -> Option<SpotSolution> {
        let query = SpotsQuery::new(params.origin, params.search_radius).with_area_num(params.origin_area_num);
        let origin = params.origin;
        let candidates = self.collect_candidates(
            params,
            query,
            |spot_origin| spot_origin.distance_squared(origin) > MIN_ROAM_DISTANCE * MIN_ROAM_DISTANCE,
            |spot_origin, _| {
                let mut key = [0u8; 20];
                key[..8].copy_from_slice(&seed.to_le_bytes());
                key[8..12].copy_from_slice(&spot_origin.x.to_le_bytes());
                key[12..16].copy_from_slice(&spot_origin.y.to_le_bytes());
                key[16..20].copy_from_slice(&spot_origin.z.to_le_bytes());
                (seahash::hash(&key) >> 40) as f32
            },
        );
        Self::first_confirmed(&candidates, |_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TacticalConfig;
    use crate::world::aas::TFL_DEFAULT;
    use crate::world::map_generator::{CellKind, CellLayout, GeneratedMap, MapGenerator};
    use crate::world::route_cache::AasRouteCache;
    use crate::world::tactical_spots::builder::TacticalSpotsBuilder;

    struct Fixture {
        map: GeneratedMap,
        route_cache: AasRouteCache,
        registry: TacticalSpotsRegistry,
    }

    // 5x5 floor with a pillar in the middle
    fn fixture() -> Fixture {
        let mut layout = CellLayout::filled(5, 5, 192.0, CellKind::Floor);
        layout.set(2, 2, CellKind::Pillar);
        let map = MapGenerator::build_from_layout("solvers", layout).unwrap();
        let route_cache = AasRouteCache::new(map.aas.clone());
        let registry = TacticalSpotsBuilder::new(&map.aas, &route_cache, map.collision.as_ref(), &TacticalConfig::default())
            .build("solvers")
            .unwrap();
        Fixture { map, route_cache, registry }
    }

    fn params(f: &Fixture, ix: usize, iy: usize, radius: f32) -> ProblemParams {
        let origin = f.map.layout.cell_center(ix, iy);
        ProblemParams::new(origin, f.map.cell_area(ix, iy), radius, TFL_DEFAULT)
    }

    #[test]
    fn cover_spot_is_hidden_behind_pillar() {
        let f = fixture();
        let env = SpotsSolverEnv { registry: &f.registry, route_cache: &f.route_cache, collision: f.map.collision.as_ref() };
        let mut scratch = SpotsQueryScratch::for_registry(&f.registry);
        let enemy_origin = f.map.layout.cell_center(0, 2);
        let p = params(&f, 1, 1, 768.0);

        let solution = TacticalSpotsProblemSolver::new(env, &mut scratch).find_cover_spot(&p, enemy_origin).unwrap();
        let eye = Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);
        assert!(!f.map.collision.trace_line(enemy_origin + eye, solution.origin + eye).is_clear());
        assert!(solution.travel_time_millis > 0);
    }

    #[test]
    fn run_away_spot_increases_distance() {
        let f = fixture();
        let env = SpotsSolverEnv { registry: &f.registry, route_cache: &f.route_cache, collision: f.map.collision.as_ref() };
        let mut scratch = SpotsQueryScratch::for_registry(&f.registry);
        let enemy_origin = f.map.layout.cell_center(0, 0);
        let p = params(&f, 1, 0, 1536.0);

        let solution = TacticalSpotsProblemSolver::new(env, &mut scratch).find_run_away_spot(&p, enemy_origin).unwrap();
        assert!(solution.origin.distance(enemy_origin) > p.origin.distance(enemy_origin) + MIN_ENEMY_DISTANCE);
    }

    #[test]
    fn dodge_spot_is_not_affected() {
        let f = fixture();
        let env = SpotsSolverEnv { registry: &f.registry, route_cache: &f.route_cache, collision: f.map.collision.as_ref() };
        let mut scratch = SpotsQueryScratch::for_registry(&f.registry);
        let p = params(&f, 0, 0, 512.0);
        let danger_center = p.origin;

        let solution = TacticalSpotsProblemSolver::new(env, &mut scratch)
            .find_dodge_spot(&p, |point| point.distance(danger_center) < 100.0)
            .unwrap();
        assert!(solution.origin.distance(danger_center) >= 100.0);
    }

    #[test]
    fn roam_spot_is_stable_for_seed() {
        let f = fixture();
        let env = SpotsSolverEnv { registry: &f.registry, route_cache: &f.route_cache, collision: f.map.collision.as_ref() };
        let mut scratch = SpotsQueryScratch::for_registry(&f.registry);
        let p = params(&f, 0, 0, 1024.0);
        let mut solver = TacticalSpotsProblemSolver::new(env, &mut scratch);
        let a = solver.find_roam_spot(&p, 17).unwrap();
        let b = solver.find_roam_spot(&p, 17).unwrap();
        assert_eq!(a.spot_num, b.spot_num);
        assert!(a.origin.distance(p.origin) > MIN_ROAM_DISTANCE);
    }

    #[test]
    fn unknown_origin_area_gives_nothing() {
        let f = fixture();
        let env = SpotsSolverEnv { registry: &f.registry, route_cache: &f.route_cache, collision: f.map.collision.as_ref() };
        let mut scratch = SpotsQueryScratch::for_registry(&f.registry);
        let mut p = params(&f, 0, 0, 1024.0);
        p.origin_area_num = 0;
        assert!(TacticalSpotsProblemSolver::new(env, &mut scratch).find_roam_spot(&p, 1).is_none());
    }
}
