// tactical_bot_core/bot/src/world/tactical_spots/builder.rs
use crate::core::config::TacticalConfig;
use crate::core::constants::{MAX_SPOTS, PLAYERBOX_STAND_MAXS, PLAYERBOX_STAND_MINS, PLAYERBOX_STAND_VIEWHEIGHT};
use crate::core::error::BotResult;
use crate::core::types::*;
use crate::world::aas::{AasArea, AasWorld, TFL_DEFAULT};
use crate::world::collision::CollisionWorld;
use crate::world::route_cache::RouteCache;
use crate::world::tactical_spots::grid::SpotsGrid;
use crate::world::tactical_spots::registry::{TacticalSpot, TacticalSpotsRegistry};
use ahash::AHashMap;
use smallvec::SmallVec;
use std::time::Instant;
use tracing::{info, warn};

/// Extra horizontal clearance a spot must have around the player box.
const SPOT_CLEARANCE: f32 = 8.0;

/// Generates spots and the lookup tables for a map. Runs once per map load on a single thread.
pub struct TacticalSpotsBuilder<'a> {
    aas: &'a AasWorld,
    route_cache: &'a dyn RouteCache,
    collision: &'a dyn CollisionWorld,
    config: &'a TacticalConfig,
}

impl<'a> TacticalSpotsBuilder<'a> {
    pub fn new(
        aas: &'a AasWorld,
        route_cache: &'a dyn RouteCache,
        collision: &'a dyn CollisionWorld,
        config: &'a TacticalConfig,
    ) -> Self {
        TacticalSpotsBuilder { aas, route_cache, collision, config }
    }

    pub fn build(&self, map_name: &str) -> BotResult<TacticalSpotsRegistry> {
        let start_time = Instant::now();

        let spots = self.sample_spots();
        let visibility = self.compute_visibility_table(&spots);
        let travel_times = self.compute_travel_time_table(&spots);
        let (world_mins, world_maxs) = self.aas.world_bounds();
        let grid = SpotsGrid::build(
            world_mins,
            world_maxs,
            &spots,
            self.config.min_grid_cell_side,
            self.config.max_grid_dimension,
        )?;

        info!(
            "Built {} tactical spots for '{}' in {:.2?} ({} grid cells)",
            spots.len(),
            map_name,
            start_time.elapsed(),
            grid.num_cells()
        );

        TacticalSpotsRegistry::from_parts(
            map_name,
            spots,
            grid,
            self.aas.num_areas(),
            visibility,
            travel_times,
            self.config.max_spots_per_query,
        )
    }

    fn is_area_suitable(area: &AasArea) -> bool {
        area.is_grounded() && !area.is_disabled() && !area.is_do_not_enter()
    }

    /// Candidate origins of an area, the center first.
    fn area_candidates(&self, area: &AasArea) -> SmallVec<[Vec3; 16]> {
        let step = self.config.spot_sampling_step.max(16.0);
        let margin = -PLAYERBOX_STAND_MINS[0] + SPOT_CLEARANCE;
        let z = area.floor_z() - PLAYERBOX_STAND_MINS[2];

        let axis_points = |lo: f32, hi: f32, center: f32| -> SmallVec<[f32; 8]> {
            let usable = hi - lo - 2.0 * margin;
            if usable <= 0.0 {
                return SmallVec::from_slice(&[center]);
            }
            let count = ((usable / step).floor() as usize + 1).min(8);
            let first = center - 0.5 * (count - 1) as f32 * step;
            (0..count).map(|i| first + i as f32 * step).collect()
        };

        let xs = axis_points(area.mins.x, area.maxs.x, area.center.x);
        let ys = axis_points(area.mins.y, area.maxs.y, area.center.y);
        let mut candidates: SmallVec<[Vec3; 16]> = SmallVec::new();
        candidates.push(Vec3::new(area.center.x, area.center.y, z));
        for &x in &xs {
            for &y in &ys {
                if candidates.len() == candidates.inline_size() {
                    break;
                }
                let point = Vec3::new(x, y, z);
                if point != candidates[0] {
                    candidates.push(point);
                }
            }
        }
        let center = candidates[0];
        candidates[1..].sort_by(|a, b| a.distance_squared(center).total_cmp(&b.distance_squared(center)));
        candidates
    }

    fn does_player_fit(&self, origin: Vec3) -> bool {
        let clearance = Vec3::new(SPOT_CLEARANCE, SPOT_CLEARANCE, 0.0);
        let mins = vec3(PLAYERBOX_STAND_MINS) - clearance;
        let maxs = vec3(PLAYERBOX_STAND_MAXS) + clearance;
        if self.collision.trace(origin, mins, maxs, origin).start_solid {
            return false;
        }
        let feet = origin + Vec3::new(0.0, 0.0, PLAYERBOX_STAND_MINS[2] + 4.0);
        self.collision.point_contents(feet) & BAD_CONTENTS == 0 && self.collision.point_contents(origin) & BAD_CONTENTS == 0
    }

    fn sample_spots(&self) -> Vec<TacticalSpot> {
        let spacing = self.config.min_spot_spacing.max(1.0);
        let spacing_cell = |p: Vec3| -> [i32; 3] {
            [(p.x / spacing).floor() as i32, (p.y / spacing).floor() as i32, (p.z / spacing).floor() as i32]
        };
        let mut spacing_grid: AHashMap<[i32; 3], SmallVec<[SpotNum; 4]>> = AHashMap::new();
        let mut spots: Vec<TacticalSpot> = Vec::new();
        let square_spacing = spacing * spacing;

        for area_num in self.aas.area_nums() {
            let area = self.aas.area(area_num);
            if !Self::is_area_suitable(area) {
                continue;
            }
            for origin in self.area_candidates(area) {
                if spots.len() >= MAX_SPOTS {
                    warn!("Tactical spots limit {} has been reached, the rest of the map is skipped", MAX_SPOTS);
                    return spots;
                }

                let cell = spacing_cell(origin);
                let mut too_close = false;
                'neighbours: for dz in -1..=1 {
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            let Some(nearby) = spacing_grid.get(&[cell[0] + dx, cell[1] + dy, cell[2] + dz]) else { continue };
                            if nearby.iter().any(|&n| spots[n as usize].origin.distance_squared(origin) < square_spacing) {
                                too_close = true;
                                break 'neighbours;
                            }
                        }
                    }
                }
                if too_close || !self.does_player_fit(origin) {
                    continue;
                }

                let spot_num = spots.len() as SpotNum;
                spots.push(TacticalSpot {
                    origin,
                    absmin: origin + vec3(PLAYERBOX_STAND_MINS) - Vec3::new(SPOT_CLEARANCE, SPOT_CLEARANCE, 0.0),
                    absmax: origin + vec3(PLAYERBOX_STAND_MAXS) + Vec3::new(SPOT_CLEARANCE, SPOT_CLEARANCE, 0.0),
                    area_num,
                });
                spacing_grid.entry(cell).or_default().push(spot_num);
            }
        }
        spots
    }

    fn compute_visibility_table(&self, spots: &[TacticalSpot]) -> Vec<u8> {
        let num_spots = spots.len();
        let mut table = vec![0u8; num_spots * num_spots];
        let view_offset = Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);

        for i in 0..num_spots {
            table[i * num_spots + i] = 255;
            let (origin_i, eye_i) = (spots[i].origin, spots[i].origin + view_offset);
            for j in (i + 1)..num_spots {
                let (origin_j, eye_j) = (spots[j].origin, spots[j].origin + view_offset);
                let probes = [(eye_i, eye_j), (eye_i, origin_j), (origin_i, eye_j), (origin_i, origin_j)];
                let num_clear = probes
                    .iter()
                    .filter(|(from, to)| self.collision.trace_line(*from, *to).is_clear())
                    .count();
                let value = (num_clear * 255 / probes.len()) as u8;
                table[i * num_spots + j] = value;
                table[j * num_spots + i] = value;
            }
        }
        table
    }

    fn compute_travel_time_table(&self, spots: &[TacticalSpot]) -> Vec<u16> {
        let num_spots = spots.len();
        let num_areas = self.aas.num_areas();
        let mut table = vec![0u16; 2 * num_areas * num_spots];

        for area_num in self.aas.area_nums() {
            if self.aas.area(area_num).is_disabled() {
                continue;
            }
            for (spot_num, spot) in spots.iter().enumerate() {
                let index = 2 * (area_num as usize * num_spots + spot_num);
                let to_area = self.route_cache.travel_time_to_area(spot.area_num, area_num, TFL_DEFAULT);
                let to_spot = self.route_cache.travel_time_to_area(area_num, spot.area_num, TFL_DEFAULT);
                table[index] = to_area.min(u16::MAX as u32) as u16;
                table[index + 1] = to_spot.min(u16::MAX as u32) as u16;
            }
        }
        table
    }
}
