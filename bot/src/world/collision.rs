// tactical_bot_core/bot/src/world/collision.rs
use crate::core::types::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::debug;

const TRACE_DIST_EPSILON: f32 = 0.03125;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceResult {
    pub fraction: f32,
    pub endpos: Vec3,
    pub normal: Vec3,
    pub contents: u32,
    pub start_solid: bool,
}

impl TraceResult {
    fn clear(end: Vec3) -> Self {
        TraceResult { fraction: 1.0, endpos: end, normal: Vec3::ZERO, contents: 0, start_solid: false }
    }

    #[inline]
    pub fn is_clear(&self) -> bool {
        self.fraction >= 1.0 && !self.start_solid
    }
}

/// Black-box collision queries of the game engine.
pub trait CollisionWorld: Send + Sync {
    /// Sweeps a box from `start` to `end` against solid geometry.
    fn trace(&self, start: Vec3, mins: Vec3, maxs: Vec3, end: Vec3) -> TraceResult;

    /// Union of contents of all brushes containing the point.
    fn point_contents(&self, point: Vec3) -> u32;

    fn trace_line(&self, start: Vec3, end: Vec3) -> TraceResult {
        self.trace(start, Vec3::ZERO, Vec3::ZERO, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolidBox {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub contents: u32,
}

impl SolidBox {
    pub fn new(mins: Vec3, maxs: Vec3, contents: u32) -> Self {
        SolidBox { mins, maxs, contents }
    }

    fn contains_point(&self, p: Vec3) -> bool {
        p.cmpgt(self.mins).all() && p.cmplt(self.maxs).all()
    }
}

impl RTreeObject for SolidBox {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.mins.to_array(), self.maxs.to_array())
    }
}

enum SweepHit {
    Miss,
    StartSolid,
    Hit { t: f32, normal: Vec3 },
}

/// Slab test of a ray against a box that has been expanded by the traced box extents.
/// Touching a face without moving into it is not a hit.
fn sweep_against_box(start: Vec3, delta: Vec3, bmin: Vec3, bmax: Vec3) -> SweepHit {
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let s = start[axis];
        let d = delta[axis];
        let (lo, hi) = (bmin[axis], bmax[axis]);
        if d.abs() < 1e-6 {
            if s <= lo || s >= hi {
                return SweepHit::Miss;
            }
            continue;
        }
        let (t0, t1, n) = if d > 0.0 { ((lo - s) / d, (hi - s) / d, -1.0) } else { ((hi - s) / d, (lo - s) / d, 1.0) };
        if t0 > t_enter {
            t_enter = t0;
            normal = Vec3::ZERO;
            normal[axis] = n;
        }
        t_exit = t_exit.min(t1);
    }

    if t_enter == f32::NEG_INFINITY {
        return SweepHit::StartSolid;
    }
    if t_enter >= t_exit || t_exit <= 0.0 || t_enter > 1.0 {
        return SweepHit::Miss;
    }
    if t_enter < 0.0 {
        return SweepHit::StartSolid;
    }
    SweepHit::Hit { t: t_enter, normal }
}

/// A collision world made of axis-aligned boxes.
pub struct BoxWorld {
    tree: RTree<SolidBox>,
}

impl BoxWorld {
    pub fn new(boxes: Vec<SolidBox>) -> Self {
        let tree = RTree::bulk_load(boxes);
        debug!("Box collision world built with {} boxes", tree.size());
        BoxWorld { tree }
    }

    pub fn size(&self) -> usize {
        self.tree.size()
    }

    pub fn boxes(&self) -> impl Iterator<Item = &SolidBox> {
        self.tree.iter()
    }
}

impl CollisionWorld for BoxWorld {
    fn trace(&self, start: Vec3, mins: Vec3, maxs: Vec3, end: Vec3) -> TraceResult {
        let delta = end - start;
        let swept_mins = start.min(end) + mins - Vec3::ONE;
        let swept_maxs = start.max(end) + maxs + Vec3::ONE;
        let envelope = AABB::from_corners(swept_mins.to_array(), swept_maxs.to_array());

        let mut best = TraceResult::clear(end);
        let mut best_t = f32::INFINITY;
        for solid in self.tree.locate_in_envelope_intersecting(&envelope) {
            if solid.contents & CONTENTS_SOLID == 0 {
                continue;
            }
            match sweep_against_box(start, delta, solid.mins - maxs, solid.maxs - mins) {
                SweepHit::Miss => {}
                SweepHit::StartSolid => {
                    return TraceResult {
                        fraction: 0.0,
                        endpos: start,
                        normal: Vec3::ZERO,
                        contents: solid.contents,
                        start_solid: true,
                    };
                }
                SweepHit::Hit { t, normal } => {
                    if t < best_t {
                        best_t = t;
                        best.normal = normal;
                        best.contents = solid.contents;
                    }
                }
            }
        }

        if best_t.is_finite() {
            let length = delta.length();
            let backoff = if length > 0.0 { TRACE_DIST_EPSILON / length } else { 0.0 };
            best.fraction = (best_t - backoff).max(0.0);
            best.endpos = start + delta * best.fraction;
        }
        best
    }

    fn point_contents(&self, point: Vec3) -> u32 {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point(point.to_array()))
            .filter(|solid| solid.contains_point(point))
            .fold(0, |acc, solid| acc | solid.contents)
    }
}
