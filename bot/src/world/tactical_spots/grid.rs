// tactical_bot_core/bot/src/world/tactical_spots/grid.rs
use crate::core::error::{BotError, BotResult};
use crate::core::types::*;
use crate::world::tactical_spots::registry::{SpotsQuery, TacticalSpot};
use tracing::debug;

/// Marks spots already visited by a query. Must be cleared by the caller before each query.
#[derive(Debug, Clone)]
pub struct SpotsExclusionMask {
    excluded: Vec<bool>,
}

impl SpotsExclusionMask {
    pub fn new(num_spots: usize) -> Self {
        SpotsExclusionMask { excluded: vec![false; num_spots] }
    }

    pub fn clear(&mut self) {
        self.excluded.iter_mut().for_each(|e| *e = false);
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    /// Returns true if the spot had not been excluded before.
    #[inline]
    pub fn exclude(&mut self, spot_num: SpotNum) -> bool {
        match self.excluded.get_mut(spot_num as usize) {
            Some(slot) if !*slot => {
                *slot = true;
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn is_excluded(&self, spot_num: SpotNum) -> bool {
        self.excluded.get(spot_num as usize).copied().unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotsGridStats {
    pub num_cells: usize,
    pub occupied_cells: usize,
    pub max_spots_per_cell: usize,
    pub total_entries: usize,
}

/// Uniform 3D grid over the world bounds with packed per-cell spot lists.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotsGrid {
    world_mins: Vec3,
    world_maxs: Vec3,
    cell_size: [f32; 3],
    num_cells: [u32; 3],
    total_cells: usize,
    /// `cell_offsets[i]..cell_offsets[i + 1]` is the range of cell `i` in `cell_spots`.
    cell_offsets: Vec<u32>,
    cell_spots: Vec<SpotNum>,
}

/// The number of cells of a grid with the given dimensions, `None` on overflow.
fn checked_total_cells(num_cells: [u32; 3]) -> Option<usize> {
    num_cells.iter().try_fold(1usize, |total, &n| total.checked_mul(n as usize))
}

impl SpotsGrid {
    pub fn build(
        world_mins: Vec3,
        world_maxs: Vec3,
        spots: &[TacticalSpot],
        min_cell_side: u32,
        max_dimension: u32,
    ) -> BotResult<Self> {
        let (cell_size, num_cells) = Self::setup_grid_params(world_mins, world_maxs, min_cell_side, max_dimension);
        let total_cells = checked_total_cells(num_cells)
            .ok_or(BotError::CapacityExceeded { what: "spots grid cells", capacity: usize::MAX })?;

        let mut grid = SpotsGrid {
            world_mins,
            world_maxs,
            cell_size,
            num_cells,
            total_cells,
            cell_offsets: Vec::new(),
            cell_spots: Vec::new(),
        };

        // Spots are added to every cell their bounds overlap so radius queries can stay cell-local
        let mut cell_lists: Vec<Vec<SpotNum>> = vec![Vec::new(); total_cells];
        for (spot_num, spot) in spots.iter().enumerate() {
            let lo = grid.cell_coords(spot.absmin);
            let hi = grid.cell_coords(spot.absmax);
            for z in lo[2]..=hi[2] {
                for y in lo[1]..=hi[1] {
                    for x in lo[0]..=hi[0] {
                        cell_lists[grid.linear_cell_num([x, y, z])].push(spot_num as SpotNum);
                    }
                }
            }
        }

        grid.cell_offsets.reserve(total_cells + 1);
        grid.cell_offsets.push(0);
        for list in &cell_lists {
            grid.cell_spots.extend_from_slice(list);
            grid.cell_offsets.push(grid.cell_spots.len() as u32);
        }

        debug!(
            "Spots grid built: {}x{}x{} cells of {:?}, {} entries",
            num_cells[0],
            num_cells[1],
            num_cells[2],
            cell_size,
            grid.cell_spots.len()
        );
        Ok(grid)
    }

    /// Reassembles a grid from stored parts, validating the packed lists.
    pub fn from_parts(
        world_mins: Vec3,
        world_maxs: Vec3,
        cell_size: [f32; 3],
        num_cells: [u32; 3],
        cell_offsets: Vec<u32>,
        cell_spots: Vec<SpotNum>,
        num_spots: usize,
    ) -> BotResult<Self> {
        if num_cells.iter().any(|&n| n == 0) || cell_size.iter().any(|&s| !(s > 0.0)) {
            return Err(BotError::PrecomputedData("Illegal grid dimensions".into()));
        }
        let total_cells = checked_total_cells(num_cells)
            .filter(|&total| total < usize::MAX)
            .ok_or_else(|| BotError::PrecomputedData(format!("Grid dimensions {:?} overflow the cell count", num_cells)))?;
        if cell_offsets.len() != total_cells + 1 {
            return Err(BotError::PrecomputedData(format!(
                "Expected {} grid cell offsets, got {}",
                total_cells + 1,
                cell_offsets.len()
            )));
        }
        if cell_offsets.windows(2).any(|w| w[0] > w[1]) || cell_offsets.last().copied() != Some(cell_spots.len() as u32) {
            return Err(BotError::PrecomputedData("Grid cell offsets are not monotonic".into()));
        }
        if cell_spots.iter().any(|&s| s as usize >= num_spots) {
            return Err(BotError::PrecomputedData("A grid cell refers to an illegal spot".into()));
        }
        Ok(SpotsGrid { world_mins, world_maxs, cell_size, num_cells, total_cells, cell_offsets, cell_spots })
    }

    fn setup_grid_params(world_mins: Vec3, world_maxs: Vec3, min_cell_side: u32, max_dimension: u32) -> ([f32; 3], [u32; 3]) {
        let mut cell_size = [0.0f32; 3];
        let mut num_cells = [1u32; 3];
        for axis in 0..3 {
            let extent = (world_maxs[axis] - world_mins[axis]).max(1.0);
            let side = (min_cell_side as f32).max(extent / max_dimension as f32);
            cell_size[axis] = side;
            num_cells[axis] = ((extent / side).ceil() as u32).clamp(1, max_dimension);
        }
        (cell_size, num_cells)
    }

    #[inline]
    fn cell_coords(&self, point: Vec3) -> [u32; 3] {
        let mut coords = [0u32; 3];
        for axis in 0..3 {
            let cell = ((point[axis] - self.world_mins[axis]) / self.cell_size[axis]).floor().max(0.0) as u32;
            coords[axis] = cell.min(self.num_cells[axis] - 1);
        }
        coords
    }

    #[inline]
    fn linear_cell_num(&self, coords: [u32; 3]) -> usize {
        let [nx, ny, _] = self.num_cells.map(|n| n as usize);
        let [x, y, z] = coords.map(|c| c as usize);
        (z * ny + y) * nx + x
    }

    pub fn point_cell_num(&self, point: Vec3) -> usize {
        self.linear_cell_num(self.cell_coords(point))
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.total_cells
    }

    pub fn cell_spots(&self, cell_num: usize) -> &[SpotNum] {
        match (self.cell_offsets.get(cell_num), self.cell_offsets.get(cell_num + 1)) {
            (Some(&start), Some(&end)) => &self.cell_spots[start as usize..end as usize],
            _ => &[],
        }
    }

    pub fn world_bounds(&self) -> (Vec3, Vec3) {
        (self.world_mins, self.world_maxs)
    }

    pub fn cell_size(&self) -> [f32; 3] {
        self.cell_size
    }

    pub fn dimensions(&self) -> [u32; 3] {
        self.num_cells
    }

    pub fn cell_offsets(&self) -> &[u32] {
        &self.cell_offsets
    }

    pub fn packed_cell_spots(&self) -> &[SpotNum] {
        &self.cell_spots
    }

    /// Unions the spot lists of every cell overlapping the query box and keeps spots within the radius.
    ///
    /// `mask` must be cleared by the caller. Returns the number of the spot whose bounds
    /// contain the query origin, if any.
    pub fn find_spots_in_radius(
        &self,
        spots: &[TacticalSpot],
        query: &SpotsQuery,
        mask: &mut SpotsExclusionMask,
        result: &mut Vec<SpotNum>,
        max_spots: usize,
    ) -> Option<SpotNum> {
        result.clear();
        let radius = query.search_radius;
        let square_radius = radius * radius;
        let box_mins = query.origin + Vec3::new(-radius, -radius, query.min_height_advantage.min(radius).max(-radius));
        let box_maxs = query.origin + Vec3::splat(radius);
        let lo = self.cell_coords(box_mins.max(self.world_mins));
        let hi = self.cell_coords(box_maxs.min(self.world_maxs));

        let mut inside_spot_num = None;
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let cell_num = self.linear_cell_num([x, y, z]);
                    for &spot_num in self.cell_spots(cell_num) {
                        if !mask.exclude(spot_num) {
                            continue;
                        }
                        let Some(spot) = spots.get(spot_num as usize) else { continue };
                        if inside_spot_num.is_none()
                            && query.origin.cmpge(spot.absmin).all()
                            && query.origin.cmple(spot.absmax).all()
                        {
                            inside_spot_num = Some(spot_num);
                        }
                        if spot.origin.distance_squared(query.origin) > square_radius {
                            continue;
                        }
                        if spot.origin.z - query.origin.z < query.min_height_advantage {
                            continue;
                        }
                        result.push(spot_num);
                        if result.len() >= max_spots {
                            return inside_spot_num;
                        }
                    }
                }
            }
        }
        inside_spot_num
    }

    pub fn get_stats(&self) -> SpotsGridStats {
        let mut occupied_cells = 0;
        let mut max_spots_per_cell = 0;
        for cell_num in 0..self.num_cells() {
            let count = self.cell_spots(cell_num).len();
            if count > 0 {
                occupied_cells += 1;
                max_spots_per_cell = max_spots_per_cell.max(count);
            }
        }
        SpotsGridStats {
            num_cells: self.num_cells(),
            occupied_cells,
            max_spots_per_cell,
            total_entries: self.cell_spots.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spot_at(origin: Vec3) -> TacticalSpot {
        TacticalSpot {
            origin,
            absmin: origin - Vec3::new(16.0, 16.0, 24.0),
            absmax: origin + Vec3::new(16.0, 16.0, 40.0),
            area_num: 1,
        }
    }

    fn scattered_spots(seed_points: &[(f32, f32, f32)]) -> Vec<TacticalSpot> {
        seed_points.iter().map(|&(x, y, z)| spot_at(Vec3::new(x, y, z))).collect()
    }

    #[test]
    fn grid_params_respect_limits() {
        let grid = SpotsGrid::build(Vec3::ZERO, Vec3::new(100_000.0, 600.0, 10.0), &[], 512, 32).unwrap();
        let dims = grid.dimensions();
        assert_eq!(dims[0], 32);
        assert_eq!(dims[1], 2);
        assert_eq!(dims[2], 1);
        assert!(grid.cell_size().iter().all(|&s| s >= 512.0));
        assert_eq!(grid.cell_offsets().len(), grid.num_cells() + 1);
    }

    #[test]
    fn corrupted_dimensions_are_rejected() {
        let parts = |num_cells: [u32; 3]| {
            SpotsGrid::from_parts(Vec3::ZERO, Vec3::splat(1024.0), [512.0; 3], num_cells, vec![0, 0], Vec::new(), 0)
        };
        for num_cells in [[u32::MAX; 3], [65_536, 65_536, 65_536], [0, 1, 1]] {
            assert!(matches!(parts(num_cells), Err(BotError::PrecomputedData(_))), "{:?}", num_cells);
        }
        let grid = parts([1, 1, 1]).unwrap();
        assert_eq!(grid.num_cells(), 1);
        assert_eq!(checked_total_cells([u32::MAX; 3]), None);
        assert_eq!(checked_total_cells([2, 3, 4]), Some(24));
    }

    #[test]
    fn finds_inside_spot() {
        let spots = scattered_spots(&[(100.0, 100.0, 24.0), (900.0, 900.0, 24.0)]);
        let grid = SpotsGrid::build(Vec3::ZERO, Vec3::new(2048.0, 2048.0, 256.0), &spots, 512, 32).unwrap();
        let mut mask = SpotsExclusionMask::new(spots.len());
        let mut result = Vec::new();
        let query = SpotsQuery::new(Vec3::new(105.0, 95.0, 24.0), 128.0);
        let inside = grid.find_spots_in_radius(&spots, &query, &mut mask, &mut result, 768);
        assert_eq!(inside, Some(0));
        assert_eq!(result, vec![0]);
    }

    #[test]
    fn query_is_capped() {
        let points: Vec<(f32, f32, f32)> = (0..50).map(|i| (10.0 * i as f32, 0.0, 24.0)).collect();
        let spots = scattered_spots(&points);
        let grid = SpotsGrid::build(Vec3::ZERO, Vec3::new(1024.0, 1024.0, 256.0), &spots, 512, 32).unwrap();
        let mut mask = SpotsExclusionMask::new(spots.len());
        let mut result = Vec::new();
        grid.find_spots_in_radius(&spots, &SpotsQuery::new(Vec3::ZERO, 2048.0), &mut mask, &mut result, 10);
        assert_eq!(result.len(), 10);
    }

    proptest! {
        #[test]
        fn radius_query_is_duplicate_free_superset(
            points in prop::collection::vec((0.0f32..4000.0, 0.0f32..4000.0, 24.0f32..400.0), 1..120),
            origin in (0.0f32..4000.0, 0.0f32..4000.0, 0.0f32..400.0),
            radius in 16.0f32..1500.0,
        ) {
            let spots = scattered_spots(&points);
            let grid = SpotsGrid::build(Vec3::ZERO, Vec3::new(4000.0, 4000.0, 512.0), &spots, 512, 32).unwrap();
            let origin = Vec3::new(origin.0, origin.1, origin.2);
            let query = SpotsQuery::new(origin, radius);
            let mut mask = SpotsExclusionMask::new(spots.len());
            let mut result = Vec::new();

            for _ in 0..2 {
                mask.clear();
                grid.find_spots_in_radius(&spots, &query, &mut mask, &mut result, usize::MAX);

                let mut sorted = result.clone();
                sorted.sort_unstable();
                sorted.dedup();
                prop_assert_eq!(sorted.len(), result.len());

                for (i, spot) in spots.iter().enumerate() {
                    let within = spot.origin.distance_squared(origin) <= radius * radius;
                    if within && spot.origin.z - origin.z >= query.min_height_advantage {
                        prop_assert!(result.contains(&(i as SpotNum)), "spot {} is missing", i);
                    }
                }
            }
        }
    }
}
