// tactical_bot_core/bot/src/world/tactical_spots/registry.rs
use crate::core::config::TacticalConfig;
use crate::core::constants::MAX_SPOTS;
use crate::core::error::{BotError, BotResult};
use crate::core::types::*;
use crate::world::aas::AasWorld;
use crate::world::collision::CollisionWorld;
use crate::world::route_cache::RouteCache;
use crate::world::tactical_spots::builder::TacticalSpotsBuilder;
use crate::world::tactical_spots::grid::{SpotsExclusionMask, SpotsGrid};
use crate::world::tactical_spots::precomputed;
use metrics::counter;
use std::io::ErrorKind;
use tracing::{debug, info, warn};

/// A precomputed candidate position for cover, advantage and roaming decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TacticalSpot {
    pub origin: Vec3,
    pub absmin: Vec3,
    pub absmax: Vec3,
    pub area_num: AreaNum,
}

/// Parameters of a radius query around an origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotsQuery {
    pub origin: Vec3,
    pub search_radius: f32,
    pub origin_area_num: AreaNum,
    /// Spots lower than `origin.z + min_height_advantage` are skipped.
    pub min_height_advantage: f32,
}

impl SpotsQuery {
    pub fn new(origin: Vec3, search_radius: f32) -> Self {
        SpotsQuery { origin, search_radius, origin_area_num: 0, min_height_advantage: f32::NEG_INFINITY }
    }

    pub fn with_area_num(mut self, area_num: AreaNum) -> Self {
        self.origin_area_num = area_num;
        self
    }

    pub fn with_min_height_advantage(mut self, min_height_advantage: f32) -> Self {
        self.min_height_advantage = min_height_advantage;
        self
    }
}

/// Per-bot buffers reused by spot queries so querying never allocates in steady state.
#[derive(Debug, Clone)]
pub struct SpotsQueryScratch {
    mask: SpotsExclusionMask,
    spots: Vec<SpotNum>,
}

impl SpotsQueryScratch {
    pub fn new(num_spots: usize, max_spots_per_query: usize) -> Self {
        SpotsQueryScratch {
            mask: SpotsExclusionMask::new(num_spots),
            spots: Vec::with_capacity(max_spots_per_query.min(num_spots)),
        }
    }

    pub fn for_registry(registry: &TacticalSpotsRegistry) -> Self {
        Self::new(registry.num_spots(), registry.max_spots_per_query())
    }

    /// Results of the last query.
    pub fn spots(&self) -> &[SpotNum] {
        &self.spots
    }
}

/// Immutable after construction; shared by all bots of a map behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TacticalSpotsRegistry {
    map_name: String,
    spots: Vec<TacticalSpot>,
    grid: SpotsGrid,
    num_areas: usize,
    /// `num_spots * num_spots` visibility values, 255 is fully visible.
    visibility: Vec<u8>,
    /// Centiseconds at `2 * (area * num_spots + spot)`, spot to area first, area to spot second.
    travel_times: Vec<u16>,
    max_spots_per_query: usize,
}

impl TacticalSpotsRegistry {
    pub fn from_parts(
        map_name: &str,
        spots: Vec<TacticalSpot>,
        grid: SpotsGrid,
        num_areas: usize,
        visibility: Vec<u8>,
        travel_times: Vec<u16>,
        max_spots_per_query: usize,
    ) -> BotResult<Self> {
        let num_spots = spots.len();
        if num_spots > MAX_SPOTS {
            return Err(BotError::CapacityExceeded { what: "tactical spots", capacity: MAX_SPOTS });
        }
        if visibility.len() != num_spots * num_spots {
            return Err(BotError::PrecomputedData(format!(
                "Visibility table size {} does not match {} spots",
                visibility.len(),
                num_spots
            )));
        }
        if travel_times.len() != 2 * num_areas * num_spots {
            return Err(BotError::PrecomputedData(format!(
                "Travel time table size {} does not match {} areas and {} spots",
                travel_times.len(),
                num_areas,
                num_spots
            )));
        }
        if let Some(spot) = spots.iter().find(|spot| spot.area_num == 0 || spot.area_num as usize >= num_areas) {
            return Err(BotError::PrecomputedData(format!("A spot has an illegal area number {}", spot.area_num)));
        }
        Ok(TacticalSpotsRegistry {
            map_name: map_name.to_string(),
            spots,
            grid,
            num_areas,
            visibility,
            travel_times,
            max_spots_per_query: max_spots_per_query.max(1),
        })
    }

    /// Loads the precomputed spots of the map if a consistent cache file exists, builds and saves them otherwise.
    pub fn load_or_build(
        map_name: &str,
        aas: &AasWorld,
        route_cache: &dyn RouteCache,
        collision: &dyn CollisionWorld,
        config: &TacticalConfig,
    ) -> BotResult<Self> {
        if let Some(cache_dir) = &config.cache_dir {
            let path = precomputed::cache_file_path(cache_dir, map_name);
            match precomputed::load(&path, map_name, aas.num_areas(), config.max_spots_per_query) {
                Ok(registry) => {
                    counter!("ai_tactical_spots_cache_hits_total").increment(1);
                    info!("Loaded {} precomputed tactical spots for '{}' from {:?}", registry.num_spots(), map_name, path);
                    return Ok(registry);
                }
                Err(BotError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    debug!("No precomputed tactical spots for '{}' at {:?}", map_name, path);
                }
                Err(e) => {
                    warn!("Discarding precomputed tactical spots for '{}': {}", map_name, e);
                }
            }
        }

        let registry = TacticalSpotsBuilder::new(aas, route_cache, collision, config).build(map_name)?;
        let stats = registry.grid().get_stats();
        debug!(
            "Tactical spots grid for '{}': {}/{} cells occupied, at most {} spots per cell",
            map_name, stats.occupied_cells, stats.num_cells, stats.max_spots_per_cell
        );
        if let Some(cache_dir) = &config.cache_dir {
            match precomputed::save(cache_dir, &registry) {
                Ok(path) => info!("Saved {} tactical spots for '{}' to {:?}", registry.num_spots(), map_name, path),
                Err(e) => warn!("Failed to save tactical spots for '{}': {}", map_name, e),
            }
        }
        Ok(registry)
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    #[inline]
    pub fn num_spots(&self) -> usize {
        self.spots.len()
    }

    pub fn num_areas(&self) -> usize {
        self.num_areas
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    #[inline]
    pub fn spot(&self, spot_num: SpotNum) -> Option<&TacticalSpot> {
        self.spots.get(spot_num as usize)
    }

    pub fn spots(&self) -> &[TacticalSpot] {
        &self.spots
    }

    pub fn grid(&self) -> &SpotsGrid {
        &self.grid
    }

    pub fn max_spots_per_query(&self) -> usize {
        self.max_spots_per_query
    }

    pub(crate) fn visibility_table(&self) -> &[u8] {
        &self.visibility
    }

    pub(crate) fn travel_time_table(&self) -> &[u16] {
        &self.travel_times
    }

    /// Spots within the query radius, written to the scratch buffer. Returns the spot containing the origin if any.
    pub fn find_spots_in_radius(&self, query: &SpotsQuery, scratch: &mut SpotsQueryScratch) -> Option<SpotNum> {
        if scratch.mask.len() != self.spots.len() {
            scratch.mask = SpotsExclusionMask::new(self.spots.len());
        }
        scratch.mask.clear();
        self.find_spots_in_radius_with_mask(query, &mut scratch.mask, &mut scratch.spots)
    }

    /// Same as `find_spots_in_radius` with explicit buffers. The mask must be cleared by the caller.
    pub fn find_spots_in_radius_with_mask(
        &self,
        query: &SpotsQuery,
        mask: &mut SpotsExclusionMask,
        result: &mut Vec<SpotNum>,
    ) -> Option<SpotNum> {
        self.grid.find_spots_in_radius(&self.spots, query, mask, result, self.max_spots_per_query)
    }

    /// Pairwise visibility in 0..=255. Illegal spot numbers are treated as invisible.
    #[inline]
    pub fn visibility(&self, spot_num: SpotNum, other_spot_num: SpotNum) -> u8 {
        let (i, j) = (spot_num as usize, other_spot_num as usize);
        if i >= self.spots.len() || j >= self.spots.len() {
            return 0;
        }
        self.visibility[i * self.spots.len() + j]
    }

    #[inline]
    fn travel_time_index(&self, area_num: AreaNum, spot_num: SpotNum) -> Option<usize> {
        let (area, spot) = (area_num as usize, spot_num as usize);
        if area >= self.num_areas || spot >= self.spots.len() {
            return None;
        }
        Some(2 * (area * self.spots.len() + spot))
    }

    /// Centiseconds, zero if the area is probably unreachable from the spot.
    #[inline]
    pub fn travel_time_from_spot_to_area(&self, spot_num: SpotNum, area_num: AreaNum) -> u16 {
        self.travel_time_index(area_num, spot_num).map_or(0, |i| self.travel_times[i])
    }

    /// Centiseconds, zero if the spot is probably unreachable from the area.
    #[inline]
    pub fn travel_time_from_area_to_spot(&self, area_num: AreaNum, spot_num: SpotNum) -> u16 {
        self.travel_time_index(area_num, spot_num).map_or(0, |i| self.travel_times[i + 1])
    }
}
