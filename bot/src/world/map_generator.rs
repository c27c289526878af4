// tactical_bot_core/bot/src/world/map_generator.rs
use crate::core::constants::PLAYERBOX_STAND_MINS;
use crate::core::error::{BotError, BotResult};
use crate::core::types::*;
use crate::world::aas::*;
use crate::world::collision::{BoxWorld, SolidBox};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::info;

pub const PLATFORM_HEIGHT: f32 = 40.0;
pub const WALL_HEIGHT: f32 = 256.0;
const BORDER_THICKNESS: f32 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Floor,
    Platform,
    Pillar,
    Lava,
}

impl CellKind {
    fn floor_z(self) -> Option<f32> {
        match self {
            CellKind::Floor | CellKind::Lava => Some(0.0),
            CellKind::Platform => Some(PLATFORM_HEIGHT),
            CellKind::Pillar => None,
        }
    }
}

/// A square-cell map description that gets turned into AAS and collision data.
#[derive(Debug, Clone)]
pub struct CellLayout {
    pub cells_x: usize,
    pub cells_y: usize,
    pub cell_side: f32,
    pub kinds: Vec<CellKind>,
    /// Pairs of (source cell, destination cell) indices.
    pub teleports: Vec<(usize, usize)>,
}

impl CellLayout {
    pub fn filled(cells_x: usize, cells_y: usize, cell_side: f32, kind: CellKind) -> Self {
        CellLayout { cells_x, cells_y, cell_side, kinds: vec![kind; cells_x * cells_y], teleports: Vec::new() }
    }

    #[inline]
    pub fn index(&self, ix: usize, iy: usize) -> usize {
        iy * self.cells_x + ix
    }

    pub fn set(&mut self, ix: usize, iy: usize, kind: CellKind) {
        let index = self.index(ix, iy);
        self.kinds[index] = kind;
    }

    fn cell_mins(&self, ix: usize, iy: usize) -> (f32, f32) {
        (ix as f32 * self.cell_side, iy as f32 * self.cell_side)
    }

    pub fn cell_center(&self, ix: usize, iy: usize) -> Vec3 {
        let (x, y) = self.cell_mins(ix, iy);
        let floor_z = self.kinds[self.index(ix, iy)].floor_z().unwrap_or(0.0);
        Vec3::new(x + 0.5 * self.cell_side, y + 0.5 * self.cell_side, floor_z - PLAYERBOX_STAND_MINS[2])
    }
}

pub struct GeneratedMap {
    pub name: String,
    pub layout: CellLayout,
    pub aas: Arc<AasWorld>,
    pub collision: Arc<BoxWorld>,
    /// Area number of each cell, 0 for cells without areas.
    pub cell_areas: Vec<AreaNum>,
    pub nav_entities: Vec<NavEntity>,
    pub spawn_points: Vec<Vec3>,
}

impl GeneratedMap {
    pub fn cell_area(&self, ix: usize, iy: usize) -> AreaNum {
        self.cell_areas[self.layout.index(ix, iy)]
    }
}

pub struct MapGenerator;

impl MapGenerator {
    /// A deterministic arena with platforms, pillars, a few lava pits, a teleporter and items.
    pub fn generate_arena(name: &str, cells_x: usize, cells_y: usize, cell_side: f32, seed: u64) -> BotResult<GeneratedMap> {
        if cells_x < 3 || cells_y < 3 {
            return Err(BotError::MapData(format!("An arena must be at least 3x3 cells, got {}x{}", cells_x, cells_y)));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut layout = CellLayout::filled(cells_x, cells_y, cell_side, CellKind::Floor);

        for iy in 0..cells_y {
            for ix in 0..cells_x {
                // Obstacles go on an isolated lattice only so the floor stays connected
                let on_lattice = ix % 3 == 1 && iy % 3 == 1;
                let roll: f32 = rng.gen();
                let kind = if on_lattice && roll < 0.35 {
                    CellKind::Pillar
                } else if on_lattice && roll < 0.45 {
                    CellKind::Lava
                } else if roll < 0.12 {
                    CellKind::Platform
                } else {
                    CellKind::Floor
                };
                layout.set(ix, iy, kind);
            }
        }

        let (first, last) = (layout.index(0, 0), layout.index(cells_x - 1, cells_y - 1));
        layout.kinds[first] = CellKind::Floor;
        layout.kinds[last] = CellKind::Floor;
        layout.teleports.push((first, last));

        let mut map = Self::build_from_layout(name, layout)?;
        Self::create_items_and_spawns(&mut map, &mut rng, 6, 8);
        info!(
            "Generated arena '{}': {}x{} cells, {} areas, {} items",
            name,
            cells_x,
            cells_y,
            map.aas.num_areas() - 1,
            map.nav_entities.len()
        );
        Ok(map)
    }

    /// A straight single-cell-wide floor corridor along +X.
    pub fn generate_corridor(name: &str, length_cells: usize, cell_side: f32) -> BotResult<GeneratedMap> {
        if length_cells < 2 {
            return Err(BotError::MapData("A corridor must be at least two cells long".into()));
        }
        let layout = CellLayout::filled(length_cells, 1, cell_side, CellKind::Floor);
        Self::build_from_layout(name, layout)
    }

    pub fn build_from_layout(name: &str, layout: CellLayout) -> BotResult<GeneratedMap> {
        if layout.kinds.len() != layout.cells_x * layout.cells_y {
            return Err(BotError::MapData("Cell layout size mismatch".into()));
        }

        let mut builder = AasWorldBuilder::new();
        let mut cell_areas = vec![0 as AreaNum; layout.kinds.len()];
        for iy in 0..layout.cells_y {
            for ix in 0..layout.cells_x {
                let index = layout.index(ix, iy);
                let kind = layout.kinds[index];
                let Some(floor_z) = kind.floor_z() else { continue };
                let (x, y) = layout.cell_mins(ix, iy);
                let contents = if kind == CellKind::Lava { CONTENTS_LAVA } else { 0 };
                cell_areas[index] = builder.add_area(
                    Vec3::new(x, y, floor_z),
                    Vec3::new(x + layout.cell_side, y + layout.cell_side, floor_z + AREA_VOLUME_HEIGHT),
                    AREA_GROUNDED,
                    contents,
                );
            }
        }

        Self::create_reachabilities(&layout, &cell_areas, &mut builder)?;
        let aas = Arc::new(builder.build()?);

        let mut boxes = Self::create_border_walls(&layout);
        boxes.extend(Self::create_cell_geometry(&layout));
        let collision = Arc::new(BoxWorld::new(boxes));

        Ok(GeneratedMap {
            name: name.to_string(),
            layout,
            aas,
            collision,
            cell_areas,
            nav_entities: Vec::new(),
            spawn_points: Vec::new(),
        })
    }

    fn create_reachabilities(layout: &CellLayout, cell_areas: &[AreaNum], builder: &mut AasWorldBuilder) -> BotResult<()> {
        let half = 0.5 * layout.cell_side;
        let standing_offset = -PLAYERBOX_STAND_MINS[2];
        for iy in 0..layout.cells_y {
            for ix in 0..layout.cells_x {
                let from_index = layout.index(ix, iy);
                let from_area = cell_areas[from_index];
                let Some(from_z) = layout.kinds[from_index].floor_z() else { continue };
                if from_area == 0 {
                    continue;
                }
                let (x, y) = layout.cell_mins(ix, iy);
                let neighbours: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
                for (dx, dy) in neighbours {
                    let (nx, ny) = (ix as i64 + dx, iy as i64 + dy);
                    if nx < 0 || ny < 0 || nx >= layout.cells_x as i64 || ny >= layout.cells_y as i64 {
                        continue;
                    }
                    let to_index = layout.index(nx as usize, ny as usize);
                    let to_area = cell_areas[to_index];
                    let Some(to_z) = layout.kinds[to_index].floor_z() else { continue };
                    if to_area == 0 {
                        continue;
                    }
                    let travel_type = if (to_z - from_z).abs() < 1.0 {
                        TravelType::Walk
                    } else if to_z > from_z {
                        TravelType::Jump
                    } else {
                        TravelType::WalkOffLedge
                    };
                    // Midpoint of the shared edge
                    let edge_x = x + half + dx as f32 * half;
                    let edge_y = y + half + dy as f32 * half;
                    let start = Vec3::new(edge_x, edge_y, from_z + standing_offset);
                    let end = Vec3::new(edge_x + dx as f32, edge_y + dy as f32, to_z + standing_offset);
                    builder.add_reach(from_area, to_area, travel_type, start, end)?;
                }
            }
        }

        for &(from_index, to_index) in &layout.teleports {
            let (from_area, to_area) = (cell_areas[from_index], cell_areas[to_index]);
            if from_area == 0 || to_area == 0 {
                return Err(BotError::MapData(format!("A teleporter connects cells {} and {} without areas", from_index, to_index)));
            }
            let start = layout.cell_center(from_index % layout.cells_x, from_index / layout.cells_x);
            let end = layout.cell_center(to_index % layout.cells_x, to_index / layout.cells_x);
            builder.add_reach(from_area, to_area, TravelType::Teleport, start, end)?;
        }
        Ok(())
    }

    fn create_border_walls(layout: &CellLayout) -> Vec<SolidBox> {
        let width = layout.cells_x as f32 * layout.cell_side;
        let height = layout.cells_y as f32 * layout.cell_side;
        let t = BORDER_THICKNESS;
        vec![
            // Ground slab under the whole map
            SolidBox::new(Vec3::new(-t, -t, -64.0), Vec3::new(width + t, height + t, 0.0), CONTENTS_SOLID),
            SolidBox::new(Vec3::new(-t, -t, 0.0), Vec3::new(width + t, 0.0, WALL_HEIGHT), CONTENTS_SOLID),
            SolidBox::new(Vec3::new(-t, height, 0.0), Vec3::new(width + t, height + t, WALL_HEIGHT), CONTENTS_SOLID),
            SolidBox::new(Vec3::new(-t, 0.0, 0.0), Vec3::new(0.0, height, WALL_HEIGHT), CONTENTS_SOLID),
            SolidBox::new(Vec3::new(width, 0.0, 0.0), Vec3::new(width + t, height, WALL_HEIGHT), CONTENTS_SOLID),
        ]
    }

    fn create_cell_geometry(layout: &CellLayout) -> Vec<SolidBox> {
        let mut boxes = Vec::new();
        for iy in 0..layout.cells_y {
            for ix in 0..layout.cells_x {
                let (x, y) = layout.cell_mins(ix, iy);
                let mins = Vec3::new(x, y, 0.0);
                let side = layout.cell_side;
                match layout.kinds[layout.index(ix, iy)] {
                    CellKind::Floor => {}
                    CellKind::Platform => {
                        boxes.push(SolidBox::new(mins, Vec3::new(x + side, y + side, PLATFORM_HEIGHT), CONTENTS_SOLID));
                    }
                    CellKind::Pillar => {
                        boxes.push(SolidBox::new(mins, Vec3::new(x + side, y + side, WALL_HEIGHT), CONTENTS_SOLID));
                    }
                    CellKind::Lava => {
                        boxes.push(SolidBox::new(mins, Vec3::new(x + side, y + side, 8.0), CONTENTS_LAVA));
                    }
                }
            }
        }
        boxes
    }

    fn create_items_and_spawns(map: &mut GeneratedMap, rng: &mut impl Rng, num_items: usize, num_spawns: usize) {
        let candidates: Vec<usize> = (0..map.layout.kinds.len())
            .filter(|&i| matches!(map.layout.kinds[i], CellKind::Floor | CellKind::Platform) && map.cell_areas[i] != 0)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let kinds = [ItemKind::Health, ItemKind::Armor, ItemKind::Weapon, ItemKind::Ammo, ItemKind::Powerup];
        for i in 0..num_items {
            let index = candidates[rng.gen_range(0..candidates.len())];
            let origin = map.layout.cell_center(index % map.layout.cells_x, index / map.layout.cells_x);
            map.nav_entities.push(NavEntity {
                id: i as u32 + 1,
                origin,
                kind: kinds[i % kinds.len()],
                area_num: map.cell_areas[index],
            });
        }
        for _ in 0..num_spawns {
            let index = candidates[rng.gen_range(0..candidates.len())];
            let center = map.layout.cell_center(index % map.layout.cells_x, index / map.layout.cells_x);
            let jitter = 0.25 * map.layout.cell_side;
            map.spawn_points.push(center + Vec3::new(rng.gen_range(-jitter..jitter), rng.gen_range(-jitter..jitter), 0.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::collision::CollisionWorld;
    use crate::world::route_cache::{AasRouteCache, RouteCache};

    #[test]
    fn arena_generation_is_deterministic() {
        let a = MapGenerator::generate_arena("arena", 9, 9, 192.0, 42).unwrap();
        let b = MapGenerator::generate_arena("arena", 9, 9, 192.0, 42).unwrap();
        assert_eq!(a.layout.kinds, b.layout.kinds);
        assert_eq!(a.aas.num_areas(), b.aas.num_areas());
        assert_eq!(a.nav_entities.len(), 6);
        assert_eq!(a.spawn_points.len(), 8);
    }

    #[test]
    fn arena_floor_is_connected() {
        let map = MapGenerator::generate_arena("arena", 9, 9, 192.0, 7).unwrap();
        let route_cache = AasRouteCache::new(map.aas.clone());
        let goal = map.cell_area(0, 0);
        for (index, &area_num) in map.cell_areas.iter().enumerate() {
            if area_num == 0 || map.layout.kinds[index] == CellKind::Lava {
                continue;
            }
            assert_ne!(route_cache.travel_time_to_area(area_num, goal, TFL_DEFAULT), 0, "cell {} is isolated", index);
        }
    }

    #[test]
    fn corridor_has_solid_floor_and_walls() {
        let map = MapGenerator::generate_corridor("corridor", 6, 192.0).unwrap();
        assert_eq!(map.aas.num_areas(), 7);
        assert_eq!(map.aas.num_floor_clusters(), 1);
        let center = map.layout.cell_center(2, 0);
        assert_eq!(map.aas.find_area_num(center), map.cell_area(2, 0));
        let down = map.collision.trace_line(center, center - Vec3::new(0.0, 0.0, 100.0));
        assert!(down.fraction < 1.0);
    }
}
