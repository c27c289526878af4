// tactical_bot_core/bot/tests/integration/tactical_spots.rs
//! Tactical spots registry build, precomputed cache and problem solvers on a generated arena.

use tactical_bot_core::core::config::TacticalConfig;
use tactical_bot_core::core::types::*;
use tactical_bot_core::world::map_generator::{GeneratedMap, MapGenerator};
use tactical_bot_core::world::route_cache::AasRouteCache;
use tactical_bot_core::world::tactical_spots::precomputed::cache_file_path;
use tactical_bot_core::world::aas::TFL_DEFAULT;
use tactical_bot_core::world::tactical_spots::{
    ProblemParams, SpotsQuery, SpotsQueryScratch, SpotsSolverEnv, TacticalSpotsProblemSolver, TacticalSpotsRegistry,
};

use std::sync::Arc;

fn arena() -> (GeneratedMap, AasRouteCache) {
    let map = MapGenerator::generate_arena("spots_arena", 8, 8, 192.0, 42).expect("arena");
    let route_cache = AasRouteCache::new(Arc::clone(&map.aas));
    (map, route_cache)
}

fn build(map: &GeneratedMap, route_cache: &AasRouteCache, config: &TacticalConfig) -> TacticalSpotsRegistry {
    TacticalSpotsRegistry::load_or_build(&map.name, &map.aas, route_cache, map.collision.as_ref(), config).expect("registry")
}

#[test]
fn built_spots_are_saved_and_loaded_back() {
    let (map, route_cache) = arena();
    let dir = tempfile::tempdir().unwrap();
    let config = TacticalConfig { cache_dir: Some(dir.path().to_path_buf()), ..TacticalConfig::default() };

    let built = build(&map, &route_cache, &config);
    assert!(!built.is_empty());
    let path = cache_file_path(dir.path(), &map.name);
    assert!(path.exists());

    let loaded = build(&map, &route_cache, &config);
    assert_eq!(loaded.num_spots(), built.num_spots());
    assert_eq!(loaded.num_areas(), built.num_areas());
    for (a, b) in built.spots().iter().zip(loaded.spots()) {
        assert_eq!(a.origin, b.origin);
        assert_eq!(a.area_num, b.area_num);
    }
    let last = (built.num_spots() - 1) as SpotNum;
    assert_eq!(built.visibility(0, last), loaded.visibility(0, last));
    let area_num = map.cell_area(0, 0);
    assert_eq!(built.travel_time_from_area_to_spot(area_num, last), loaded.travel_time_from_area_to_spot(area_num, last));
}

#[test]
fn corrupted_cache_is_rebuilt() {
    let (map, route_cache) = arena();
    let dir = tempfile::tempdir().unwrap();
    let path = cache_file_path(dir.path(), &map.name);
    std::fs::write(&path, b"TSPTgarbage").unwrap();
    let config = TacticalConfig { cache_dir: Some(dir.path().to_path_buf()), ..TacticalConfig::default() };

    let registry = build(&map, &route_cache, &config);
    assert!(!registry.is_empty());
    // The rebuilt registry replaces the garbage
    assert!(std::fs::metadata(&path).unwrap().len() > 11);
}

#[test]
fn radius_query_returns_only_close_spots() {
    let (map, route_cache) = arena();
    let registry = build(&map, &route_cache, &TacticalConfig::default());
    let mut scratch = SpotsQueryScratch::for_registry(&registry);

    let origin = map.aas.area(map.cell_area(3, 3)).standing_point();
    let radius = 400.0;
    registry.find_spots_in_radius(&SpotsQuery::new(origin, radius), &mut scratch);
    let found = scratch.spots().to_vec();
    assert!(!found.is_empty());
    for &spot_num in &found {
        let spot = registry.spot(spot_num).unwrap();
        assert!(spot.origin.distance(origin) <= radius);
    }
    let expected = registry.spots().iter().filter(|spot| spot.origin.distance(origin) <= radius).count();
    assert_eq!(found.len(), expected.min(registry.max_spots_per_query()));
}

#[test]
fn solvers_respect_search_radius_and_reachability() {
    let (map, route_cache) = arena();
    let config = TacticalConfig::default();
    let registry = build(&map, &route_cache, &config);
    let mut scratch = SpotsQueryScratch::for_registry(&registry);
    let env = SpotsSolverEnv { registry: &registry, route_cache: &route_cache, collision: map.collision.as_ref() };

    let origin_area = map.cell_area(0, 0);
    let origin = map.aas.area(origin_area).standing_point();
    let enemy_origin = map.aas.area(map.cell_area(7, 7)).standing_point();

    let run_away_params = ProblemParams::new(origin, origin_area, config.run_away_search_radius, TFL_DEFAULT);
    let mut solver = TacticalSpotsProblemSolver::new(env, &mut scratch);
    if let Some(solution) = solver.find_run_away_spot(&run_away_params, enemy_origin) {
        assert!(solution.origin.distance(origin) <= config.run_away_search_radius);
        assert!(solution.travel_time_millis > 0);
        // A run away spot does not bring the bot closer to the enemy
        assert!(solution.origin.distance(enemy_origin) >= origin.distance(enemy_origin) - 1.0);
    }

    let roam_params = ProblemParams::new(origin, origin_area, config.roam_search_radius, TFL_DEFAULT);
    let roam = solver.find_roam_spot(&roam_params, 7);
    let roam_again = solver.find_roam_spot(&roam_params, 7);
    assert_eq!(roam.map(|s| s.spot_num), roam_again.map(|s| s.spot_num));
    let roam = roam.expect("an open arena has roaming spots");
    assert!(roam.origin.distance(origin) <= config.roam_search_radius);

    let dodge_params = ProblemParams::new(origin, origin_area, config.dodge_search_radius, TFL_DEFAULT);
    if let Some(dodge) = solver.find_dodge_spot(&dodge_params, |point| point.distance(origin) < 64.0) {
        assert!(dodge.origin.distance(origin) >= 64.0);
    }
}
