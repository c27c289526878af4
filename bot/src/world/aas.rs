// tactical_bot_core/bot/src/world/aas.rs
use crate::core::error::{BotError, BotResult};
use crate::core::types::*;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

// Travel flags
pub const TFL_WALK: u32 = 1 << 1;
pub const TFL_WALKOFFLEDGE: u32 = 1 << 2;
pub const TFL_JUMP: u32 = 1 << 3;
pub const TFL_STRAFEJUMP: u32 = 1 << 4;
pub const TFL_BARRIERJUMP: u32 = 1 << 5;
pub const TFL_TELEPORT: u32 = 1 << 6;
pub const TFL_JUMPPAD: u32 = 1 << 7;
pub const TFL_ELEVATOR: u32 = 1 << 8;
pub const TFL_LADDER: u32 = 1 << 9;

pub const TFL_GROUND_ONLY: u32 = TFL_WALK | TFL_WALKOFFLEDGE;
pub const TFL_DEFAULT: u32 = TFL_WALK
    | TFL_WALKOFFLEDGE
    | TFL_JUMP
    | TFL_STRAFEJUMP
    | TFL_BARRIERJUMP
    | TFL_TELEPORT
    | TFL_JUMPPAD
    | TFL_ELEVATOR
    | TFL_LADDER;

// Area flags
pub const AREA_GROUNDED: u32 = 1 << 0;
pub const AREA_DISABLED: u32 = 1 << 1;
pub const AREA_NOFALL: u32 = 1 << 2;
pub const AREA_LADDER: u32 = 1 << 3;

/// Height of the origin volume of an area above its floor.
pub const AREA_VOLUME_HEIGHT: f32 = 96.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TravelType {
    Walk,
    WalkOffLedge,
    Jump,
    StrafeJump,
    BarrierJump,
    Teleport,
    JumpPad,
    Elevator,
    Ladder,
}

impl TravelType {
    pub fn flag(self) -> u32 {
        match self {
            TravelType::Walk => TFL_WALK,
            TravelType::WalkOffLedge => TFL_WALKOFFLEDGE,
            TravelType::Jump => TFL_JUMP,
            TravelType::StrafeJump => TFL_STRAFEJUMP,
            TravelType::BarrierJump => TFL_BARRIERJUMP,
            TravelType::Teleport => TFL_TELEPORT,
            TravelType::JumpPad => TFL_JUMPPAD,
            TravelType::Elevator => TFL_ELEVATOR,
            TravelType::Ladder => TFL_LADDER,
        }
    }

    /// Reachabilities that are passed by touching a trigger entity.
    pub fn is_trigger(self) -> bool {
        matches!(self, TravelType::Teleport | TravelType::JumpPad | TravelType::Elevator)
    }

    /// Extra centiseconds on top of the straight-line run time.
    fn travel_time_penalty(self) -> u16 {
        match self {
            TravelType::Walk => 0,
            TravelType::WalkOffLedge => 10,
            TravelType::Jump => 30,
            TravelType::StrafeJump => 40,
            TravelType::BarrierJump => 40,
            TravelType::Teleport => 10,
            TravelType::JumpPad => 20,
            TravelType::Elevator => 50,
            TravelType::Ladder => 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AasArea {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub center: Vec3,
    pub flags: u32,
    pub contents: u32,
    pub floor_cluster: FloorClusterNum,
    first_reach: u32,
    num_reach: u32,
}

impl AasArea {
    fn dummy() -> Self {
        AasArea {
            mins: Vec3::ZERO,
            maxs: Vec3::ZERO,
            center: Vec3::ZERO,
            flags: 0,
            contents: 0,
            floor_cluster: 0,
            first_reach: 0,
            num_reach: 0,
        }
    }

    #[inline]
    pub fn is_grounded(&self) -> bool { self.flags & AREA_GROUNDED != 0 }
    #[inline]
    pub fn is_disabled(&self) -> bool { self.flags & AREA_DISABLED != 0 }
    #[inline]
    pub fn is_do_not_enter(&self) -> bool { self.contents & BAD_CONTENTS != 0 }

    #[inline]
    pub fn floor_z(&self) -> f32 { self.mins.z }

    /// A point an idle player standing in the area center would have as an origin.
    pub fn standing_point(&self) -> Vec3 {
        Vec3::new(self.center.x, self.center.y, self.mins.z - crate::core::constants::PLAYERBOX_STAND_MINS[2])
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.mins.x && p.x <= self.maxs.x
            && p.y >= self.mins.y && p.y <= self.maxs.y
            && p.z >= self.mins.z && p.z <= self.maxs.z
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AasReach {
    pub start_area: AreaNum,
    /// The area this reachability leads to.
    pub area_num: AreaNum,
    pub start: Vec3,
    pub end: Vec3,
    pub travel_type: TravelType,
    /// Centiseconds.
    pub travel_time: u16,
}

#[derive(Clone, Debug)]
struct SpatialArea {
    area_num: AreaNum,
    mins: [f32; 3],
    maxs: [f32; 3],
}

impl RTreeObject for SpatialArea {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.mins, self.maxs)
    }
}

/// Static navigation graph: areas connected by typed reachabilities.
pub struct AasWorld {
    areas: Vec<AasArea>,
    reaches: Vec<AasReach>,
    area_tree: RTree<SpatialArea>,
    num_floor_clusters: usize,
    world_mins: Vec3,
    world_maxs: Vec3,
}

impl AasWorld {
    #[inline]
    pub fn num_areas(&self) -> usize { self.areas.len() }
    #[inline]
    pub fn num_reaches(&self) -> usize { self.reaches.len() }
    #[inline]
    pub fn num_floor_clusters(&self) -> usize { self.num_floor_clusters }

    /// Returns the dummy area for out-of-range numbers.
    #[inline]
    pub fn area(&self, area_num: AreaNum) -> &AasArea {
        self.areas.get(area_num as usize).unwrap_or(&self.areas[0])
    }

    #[inline]
    pub fn reach(&self, reach_num: ReachNum) -> &AasReach {
        self.reaches.get(reach_num as usize).unwrap_or(&self.reaches[0])
    }

    pub fn area_reach_nums(&self, area_num: AreaNum) -> Range<ReachNum> {
        let area = self.area(area_num);
        area.first_reach..area.first_reach + area.num_reach
    }

    pub fn area_nums(&self) -> Range<AreaNum> {
        1..self.areas.len() as AreaNum
    }

    #[inline]
    pub fn floor_cluster_num(&self, area_num: AreaNum) -> FloorClusterNum {
        self.area(area_num).floor_cluster
    }

    pub fn world_bounds(&self) -> (Vec3, Vec3) {
        (self.world_mins, self.world_maxs)
    }

    /// Area containing the point, 0 if the point is outside of the navigable volume.
    pub fn find_area_num(&self, point: Vec3) -> AreaNum {
        let query = AABB::from_point([point.x, point.y, point.z]);
        self.area_tree
            .locate_in_envelope_intersecting(&query)
            .map(|spatial_area| spatial_area.area_num)
            .min()
            .unwrap_or(0)
    }

    pub fn find_areas_in_box(&self, mins: Vec3, maxs: Vec3) -> Vec<AreaNum> {
        let query = AABB::from_corners(mins.to_array(), maxs.to_array());
        let mut result: Vec<AreaNum> = self
            .area_tree
            .locate_in_envelope_intersecting(&query)
            .map(|spatial_area| spatial_area.area_num)
            .collect();
        result.sort_unstable();
        result
    }

    /// A 2D raycast that must stay within the floor cluster of both areas.
    pub fn is_area_walkable_in_floor_cluster(&self, start_area_num: AreaNum, target_area_num: AreaNum) -> bool {
        let cluster_num = self.floor_cluster_num(start_area_num);
        if cluster_num == 0 || cluster_num != self.floor_cluster_num(target_area_num) {
            return false;
        }
        if start_area_num == target_area_num {
            return true;
        }

        let from = self.area(start_area_num).center;
        let to = self.area(target_area_num).center;
        let distance = square_distance_2d(from, to).sqrt();
        let num_steps = (distance / 16.0).ceil().max(1.0) as usize;
        let sample_z = self.area(start_area_num).floor_z() + 1.0;
        for i in 1..num_steps {
            let t = i as f32 / num_steps as f32;
            let mut point = from.lerp(to, t);
            point.z = sample_z;
            let area_num = self.find_area_num(point);
            if area_num == 0 || self.floor_cluster_num(area_num) != cluster_num {
                return false;
            }
        }
        true
    }
}

/// Incrementally collects areas and reachabilities and produces an immutable `AasWorld`.
pub struct AasWorldBuilder {
    areas: Vec<AasArea>,
    pending_reaches: Vec<AasReach>,
    run_speed: f32,
}

impl AasWorldBuilder {
    pub fn new() -> Self {
        AasWorldBuilder { areas: vec![AasArea::dummy()], pending_reaches: Vec::new(), run_speed: 320.0 }
    }

    pub fn add_area(&mut self, mins: Vec3, maxs: Vec3, flags: u32, contents: u32) -> AreaNum {
        let center = (mins + maxs) * 0.5;
        self.areas.push(AasArea {
            mins,
            maxs,
            center,
            flags,
            contents,
            floor_cluster: 0,
            first_reach: 0,
            num_reach: 0,
        });
        (self.areas.len() - 1) as AreaNum
    }

    pub fn num_areas(&self) -> usize { self.areas.len() }

    /// Adds a reachability with a travel time derived from the covered distance.
    pub fn add_reach(&mut self, from: AreaNum, to: AreaNum, travel_type: TravelType, start: Vec3, end: Vec3) -> BotResult<()> {
        self.check_area_num(from)?;
        self.check_area_num(to)?;
        let from_center = self.areas[from as usize].center;
        let covered = if matches!(travel_type, TravelType::Teleport) {
            from_center.distance(start)
        } else {
            from_center.distance(start) + start.distance(end)
        };
        let run_time = (covered / self.run_speed * 100.0).round() as u32;
        let travel_time = (run_time + travel_type.travel_time_penalty() as u32).clamp(1, i16::MAX as u32) as u16;
        self.add_reach_with_time(from, to, travel_type, start, end, travel_time)
    }

    pub fn add_reach_with_time(
        &mut self,
        from: AreaNum,
        to: AreaNum,
        travel_type: TravelType,
        start: Vec3,
        end: Vec3,
        travel_time: u16,
    ) -> BotResult<()> {
        self.check_area_num(from)?;
        self.check_area_num(to)?;
        if from == to {
            return Err(BotError::MapData(format!("A reachability from area {} to itself", from)));
        }
        self.pending_reaches.push(AasReach {
            start_area: from,
            area_num: to,
            start,
            end,
            travel_type,
            travel_time: travel_time.max(1),
        });
        Ok(())
    }

    fn check_area_num(&self, area_num: AreaNum) -> BotResult<()> {
        if area_num == 0 || area_num as usize >= self.areas.len() {
            return Err(BotError::MapData(format!("Illegal area number {}", area_num)));
        }
        Ok(())
    }

    pub fn build(mut self) -> BotResult<AasWorld> {
        if self.areas.len() < 2 {
            return Err(BotError::MapData("An AAS world must have at least one area".into()));
        }

        // Group reachabilities by the start area so each area owns a contiguous range
        self.pending_reaches.sort_by_key(|r| r.start_area);
        let mut reaches = Vec::with_capacity(self.pending_reaches.len() + 1);
        reaches.push(AasReach {
            start_area: 0,
            area_num: 0,
            start: Vec3::ZERO,
            end: Vec3::ZERO,
            travel_type: TravelType::Walk,
            travel_time: 0,
        });
        for reach in self.pending_reaches.drain(..) {
            let reach_num = reaches.len() as u32;
            let area = &mut self.areas[reach.start_area as usize];
            if area.num_reach == 0 {
                area.first_reach = reach_num;
            }
            area.num_reach += 1;
            reaches.push(reach);
        }

        let num_floor_clusters = Self::compute_floor_clusters(&mut self.areas, &reaches);

        let mut world_mins = Vec3::splat(f32::MAX);
        let mut world_maxs = Vec3::splat(f32::MIN);
        let spatial_areas: Vec<SpatialArea> = self
            .areas
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, area)| {
                world_mins = world_mins.min(area.mins);
                world_maxs = world_maxs.max(area.maxs);
                SpatialArea { area_num: i as AreaNum, mins: area.mins.to_array(), maxs: area.maxs.to_array() }
            })
            .collect();
        let area_tree = RTree::bulk_load(spatial_areas);

        debug!(
            "AAS world built: {} areas, {} reachabilities, {} floor clusters",
            self.areas.len() - 1,
            reaches.len() - 1,
            num_floor_clusters
        );

        Ok(AasWorld {
            areas: self.areas,
            reaches,
            area_tree,
            num_floor_clusters,
            world_mins,
            world_maxs,
        })
    }

    /// Floor clusters are connected components of grounded areas joined by walk reachabilities
    /// on the same floor height.
    fn compute_floor_clusters(areas: &mut [AasArea], reaches: &[AasReach]) -> usize {
        let mut parent: Vec<usize> = (0..areas.len()).collect();

        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        for reach in reaches.iter().skip(1) {
            if reach.travel_type != TravelType::Walk {
                continue;
            }
            let (a, b) = (reach.start_area as usize, reach.area_num as usize);
            if !areas[a].is_grounded() || !areas[b].is_grounded() {
                continue;
            }
            if areas[a].is_do_not_enter() || areas[b].is_do_not_enter() {
                continue;
            }
            if (areas[a].floor_z() - areas[b].floor_z()).abs() > 1.0 {
                continue;
            }
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }

        let mut cluster_of_root = vec![0 as FloorClusterNum; areas.len()];
        let mut num_clusters = 0usize;
        for i in 1..areas.len() {
            if !areas[i].is_grounded() || areas[i].is_do_not_enter() {
                continue;
            }
            let root = find(&mut parent, i);
            if cluster_of_root[root] == 0 {
                num_clusters += 1;
                cluster_of_root[root] = num_clusters as FloorClusterNum;
            }
            areas[i].floor_cluster = cluster_of_root[root];
        }
        num_clusters
    }
}

impl Default for AasWorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}
