// tactical_bot_core/bot/src/world/route_cache.rs
use crate::core::constants::MAX_REACH_CHAIN_LEN;
use crate::core::types::*;
use crate::world::aas::AasWorld;
use ahash::AHashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::trace;

/// One hop of a route: the reachability to take and the remaining travel time from its start area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteStep {
    pub reach_num: ReachNum,
    /// The area the reachability leads to.
    pub area_num: AreaNum,
    /// Centiseconds from the start area of the step to the goal area.
    pub travel_time: u32,
}

pub type ReachChain = SmallVec<[RouteStep; MAX_REACH_CHAIN_LEN]>;

/// Area-to-area travel time oracle.
///
/// Travel times are AAS centiseconds. Zero means "unreachable" and a route
/// inside the goal area itself costs 1.
pub trait RouteCache: Send + Sync {
    fn travel_time_to_area(&self, from_area: AreaNum, to_area: AreaNum, travel_flags: u32) -> u32;

    fn next_route_step(&self, from_area: AreaNum, to_area: AreaNum, travel_flags: u32) -> Option<RouteStep>;

    /// Fills `chain` with up to `MAX_REACH_CHAIN_LEN` steps toward the goal area.
    /// Returns false if the goal area can't be reached at all.
    fn reach_chain(&self, from_area: AreaNum, to_area: AreaNum, travel_flags: u32, chain: &mut ReachChain) -> bool {
        chain.clear();
        if from_area == 0 || to_area == 0 {
            return false;
        }
        let mut area_num = from_area;
        while area_num != to_area && chain.len() < MAX_REACH_CHAIN_LEN {
            match self.next_route_step(area_num, to_area, travel_flags) {
                Some(step) => {
                    chain.push(step);
                    area_num = step.area_num;
                }
                None => return !chain.is_empty(),
            }
        }
        true
    }
}

struct RouteTable {
    /// Indexed by the start area number.
    travel_times: Vec<u32>,
    next_reach: Vec<ReachNum>,
}

/// Dijkstra-backed route cache shared by all bots of a map.
pub struct AasRouteCache {
    aas: Arc<AasWorld>,
    incoming_reaches: Vec<Vec<ReachNum>>,
    tables: RwLock<AHashMap<(AreaNum, u32), Arc<RouteTable>>>,
}

impl AasRouteCache {
    pub fn new(aas: Arc<AasWorld>) -> Self {
        let mut incoming_reaches = vec![Vec::new(); aas.num_areas()];
        for reach_num in 1..aas.num_reaches() as ReachNum {
            let reach = aas.reach(reach_num);
            incoming_reaches[reach.area_num as usize].push(reach_num);
        }
        AasRouteCache { aas, incoming_reaches, tables: RwLock::new(AHashMap::new()) }
    }

    pub fn aas(&self) -> &AasWorld {
        &self.aas
    }

    pub fn num_cached_tables(&self) -> usize {
        self.tables.read().len()
    }

    fn table_for(&self, to_area: AreaNum, travel_flags: u32) -> Arc<RouteTable> {
        if let Some(table) = self.tables.read().get(&(to_area, travel_flags)) {
            return table.clone();
        }
        let table = Arc::new(self.compute_table(to_area, travel_flags));
        self.tables.write().entry((to_area, travel_flags)).or_insert(table).clone()
    }

    fn is_area_passable(&self, area_num: AreaNum, goal_area: AreaNum) -> bool {
        let area = self.aas.area(area_num);
        if area.is_disabled() {
            return false;
        }
        area_num == goal_area || !area.is_do_not_enter()
    }

    /// Reverse Dijkstra from the goal area over reachabilities allowed by the flags.
    fn compute_table(&self, to_area: AreaNum, travel_flags: u32) -> RouteTable {
        let num_areas = self.aas.num_areas();
        let mut travel_times = vec![0u32; num_areas];
        let mut next_reach = vec![0 as ReachNum; num_areas];

        if to_area == 0 || to_area as usize >= num_areas || self.aas.area(to_area).is_disabled() {
            return RouteTable { travel_times, next_reach };
        }

        let mut heap = BinaryHeap::new();
        travel_times[to_area as usize] = 1;
        heap.push(Reverse((1u32, to_area)));

        while let Some(Reverse((time, area_num))) = heap.pop() {
            if time > travel_times[area_num as usize] {
                continue;
            }
            for &reach_num in &self.incoming_reaches[area_num as usize] {
                let reach = self.aas.reach(reach_num);
                if reach.travel_type.flag() & travel_flags == 0 {
                    continue;
                }
                let start_area = reach.start_area;
                if !self.is_area_passable(start_area, to_area) {
                    continue;
                }
                let new_time = time + reach.travel_time as u32;
                let old_time = travel_times[start_area as usize];
                if old_time == 0 || new_time < old_time {
                    travel_times[start_area as usize] = new_time;
                    next_reach[start_area as usize] = reach_num;
                    heap.push(Reverse((new_time, start_area)));
                }
            }
        }

        trace!("Computed a route table for area {} with travel flags {:#x}", to_area, travel_flags);
        RouteTable { travel_times, next_reach }
    }
}

impl RouteCache for AasRouteCache {
    fn travel_time_to_area(&self, from_area: AreaNum, to_area: AreaNum, travel_flags: u32) -> u32 {
        if from_area == 0 || to_area == 0 {
            return 0;
        }
        if from_area as usize >= self.aas.num_areas() {
            return 0;
        }
        if from_area == to_area {
            return 1;
        }
        self.table_for(to_area, travel_flags).travel_times[from_area as usize]
    }

    fn next_route_step(&self, from_area: AreaNum, to_area: AreaNum, travel_flags: u32) -> Option<RouteStep> {
        if from_area == 0 || to_area == 0 || from_area == to_area || from_area as usize >= self.aas.num_areas() {
            return None;
        }
        let table = self.table_for(to_area, travel_flags);
        let reach_num = table.next_reach[from_area as usize];
        if reach_num == 0 {
            return None;
        }
        Some(RouteStep {
            reach_num,
            area_num: self.aas.reach(reach_num).area_num,
            travel_time: table.travel_times[from_area as usize],
        })
    }
}
