// tactical_bot_core/bot/src/systems/ai/movement/trace_cache.rs
use crate::core::constants::*;
use crate::core::frame_cache::FrameCached;
use crate::core::types::*;
use crate::world::collision::{CollisionWorld, TraceResult};

const TRACE_DEPTH: f32 = 32.0;
const NUM_DIRS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDir {
    Front,
    Back,
    Left,
    Right,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl TraceDir {
    pub const ALL: [TraceDir; NUM_DIRS] = [
        TraceDir::Front,
        TraceDir::Back,
        TraceDir::Left,
        TraceDir::Right,
        TraceDir::FrontLeft,
        TraceDir::FrontRight,
        TraceDir::BackLeft,
        TraceDir::BackRight,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    /// The direction relative to a normalized 2D front direction.
    fn apply_to(self, front: Vec3) -> Vec3 {
        let right = Vec3::new(front.y, -front.x, 0.0);
        let dir = match self {
            TraceDir::Front => front,
            TraceDir::Back => -front,
            TraceDir::Left => -right,
            TraceDir::Right => right,
            TraceDir::FrontLeft => front - right,
            TraceDir::FrontRight => front + right,
            TraceDir::BackLeft => -front - right,
            TraceDir::BackRight => -front + right,
        };
        dir.normalize_or_zero()
    }
}

/// A probe in one of the fixed directions, either over the full player height
/// (ignoring steps) or only above the jumpable height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceQuery {
    pub dir: TraceDir,
    pub jumpable_height: bool,
}

impl TraceQuery {
    pub const fn front() -> Self { TraceQuery { dir: TraceDir::Front, jumpable_height: false } }
    pub const fn back() -> Self { TraceQuery { dir: TraceDir::Back, jumpable_height: false } }
    pub const fn left() -> Self { TraceQuery { dir: TraceDir::Left, jumpable_height: false } }
    pub const fn right() -> Self { TraceQuery { dir: TraceDir::Right, jumpable_height: false } }
    pub const fn front_left() -> Self { TraceQuery { dir: TraceDir::FrontLeft, jumpable_height: false } }
    pub const fn front_right() -> Self { TraceQuery { dir: TraceDir::FrontRight, jumpable_height: false } }

    pub const fn jumpable_height(self) -> Self {
        TraceQuery { dir: self.dir, jumpable_height: true }
    }

    #[inline]
    fn slot(self) -> usize {
        self.dir.index() + if self.jumpable_height { NUM_DIRS } else { 0 }
    }

    #[inline]
    pub fn mask(self) -> u32 {
        1 << self.slot()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceCacheEntry {
    pub trace: TraceResult,
    pub trace_dir: Vec3,
}

#[derive(Debug, Clone, Default)]
struct CachedProbes {
    entries: [Option<TraceCacheEntry>; 2 * NUM_DIRS],
}

/// Environment probes around the player, computed lazily and kept for one prediction frame.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentTraceCache {
    probes: FrameCached<CachedProbes>,
}

fn front_dir(physics: &EntityPhysicsState) -> Vec3 {
    physics
        .velocity_dir_2d()
        .filter(|_| physics.square_speed_2d() > 1.0)
        .unwrap_or_else(|| flat(physics.forward_dir).normalize_or_zero())
}

fn probe(query: TraceQuery, physics: &EntityPhysicsState, collision: &dyn CollisionWorld) -> TraceCacheEntry {
    let mut mins = vec3(PLAYERBOX_STAND_MINS);
    let maxs = vec3(PLAYERBOX_STAND_MAXS);
    mins.z += if query.jumpable_height { AI_JUMPABLE_HEIGHT } else { AI_STEPSIZE };
    let mut front = front_dir(physics);
    if front == Vec3::ZERO {
        front = Vec3::X;
    }
    let trace_dir = query.dir.apply_to(front);
    let trace = collision.trace(physics.origin, mins, maxs, physics.origin + trace_dir * TRACE_DEPTH);
    TraceCacheEntry { trace, trace_dir }
}

impl EnvironmentTraceCache {
    pub fn new() -> Self {
        EnvironmentTraceCache { probes: FrameCached::new() }
    }

    pub fn invalidate(&mut self) {
        self.probes.invalidate();
    }

    pub fn test_for_query(
        &mut self,
        frame: u64,
        physics: &EntityPhysicsState,
        query: TraceQuery,
        collision: &dyn CollisionWorld,
    ) -> TraceCacheEntry {
        let probes = self.probes.get_or_compute_mut(frame, CachedProbes::default);
        *probes.entries[query.slot()].get_or_insert_with(|| probe(query, physics, collision))
    }

    /// Computes every probe selected by the mask that has not been computed this frame.
    pub fn test_for_results_mask(&mut self, frame: u64, physics: &EntityPhysicsState, mask: u32, collision: &dyn CollisionWorld) {
        let probes = self.probes.get_or_compute_mut(frame, CachedProbes::default);
        for (slot, entry) in probes.entries.iter_mut().enumerate() {
            if mask & (1 << slot) == 0 || entry.is_some() {
                continue;
            }
            let query = TraceQuery { dir: TraceDir::ALL[slot % NUM_DIRS], jumpable_height: slot >= NUM_DIRS };
            *entry = Some(probe(query, physics, collision));
        }
    }

    pub fn result_for_query(&self, frame: u64, query: TraceQuery) -> Option<TraceCacheEntry> {
        self.probes.peek(frame).and_then(|probes| probes.entries[query.slot()])
    }
}
