// tactical_bot_core/bot/src/core/types.rs
use serde::{Deserialize, Serialize};

pub use glam::Vec3;

/// AAS area number. Area 0 is the dummy "solid" area and is never a valid result.
pub type AreaNum = u32;
/// AAS reachability number. Reachability 0 is reserved.
pub type ReachNum = u32;
pub type SpotNum = u16;
pub type FloorClusterNum = u16;
/// Level time in milliseconds.
pub type LevelTime = u64;
pub type BotId = u32;

// --- Collision contents ---
pub const CONTENTS_SOLID: u32 = 1 << 0;
pub const CONTENTS_LAVA: u32 = 1 << 3;
pub const CONTENTS_SLIME: u32 = 1 << 4;
pub const CONTENTS_DONOTENTER: u32 = 1 << 21;
pub const CONTENTS_TRIGGER: u32 = 1 << 30;
pub const BAD_CONTENTS: u32 = CONTENTS_LAVA | CONTENTS_SLIME | CONTENTS_DONOTENTER;

#[inline]
pub fn vec3(a: [f32; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}

#[inline]
pub fn square_distance_2d(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

#[inline]
pub fn flat(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, 0.0)
}

#[inline]
pub fn bounded_fraction(value: f32, bound: f32) -> f32 {
    (value / bound).clamp(0.0, 1.0)
}

// --- Entity physics ---
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityPhysicsState {
    pub origin: Vec3,
    pub velocity: Vec3,
    pub forward_dir: Vec3,
    pub on_ground: bool,
    /// Distance from the feet to the ground below; infinite if nothing is below within the probe range.
    pub height_over_ground: f32,
    pub ground_normal: Vec3,
}

impl EntityPhysicsState {
    pub fn new(origin: Vec3) -> Self {
        EntityPhysicsState {
            origin,
            velocity: Vec3::ZERO,
            forward_dir: Vec3::X,
            on_ground: true,
            height_over_ground: 0.0,
            ground_normal: Vec3::Z,
        }
    }

    #[inline]
    pub fn speed(&self) -> f32 { self.velocity.length() }
    #[inline]
    pub fn square_speed_2d(&self) -> f32 { self.velocity.x * self.velocity.x + self.velocity.y * self.velocity.y }
    #[inline]
    pub fn speed_2d(&self) -> f32 { self.square_speed_2d().sqrt() }

    pub fn velocity_dir_2d(&self) -> Option<Vec3> {
        let speed_2d = self.speed_2d();
        if speed_2d < 0.001 {
            return None;
        }
        Some(Vec3::new(self.velocity.x / speed_2d, self.velocity.y / speed_2d, 0.0))
    }

    pub fn velocity_dir(&self) -> Option<Vec3> {
        let speed = self.speed();
        if speed < 0.001 {
            return None;
        }
        Some(self.velocity / speed)
    }
}

// --- Player move (pmove) stats ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerMoveStats {
    pub features: u16,
    /// Remaining millis before another dash is allowed.
    pub dash_time: u16,
    pub walljump_time: u16,
    pub stun_time: u16,
    /// Set by the physics step when the player skims along a wall after stepping up.
    pub skim_time: u16,
}

impl PlayerMoveStats {
    pub fn with_features(features: u16) -> Self {
        PlayerMoveStats { features, ..Default::default() }
    }

    #[inline]
    pub fn has_feature(&self, feature: u16) -> bool { self.features & feature != 0 }
}

// --- Bot input produced every think frame ---
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BotInput {
    pub forward_movement: i8,
    pub right_movement: i8,
    /// 1 = jump, -1 = crouch.
    pub up_movement: i8,
    /// Dash on ground, walljump in air.
    pub special_button: bool,
    pub intended_look_dir: Vec3,
    pub can_override_look_vec: bool,
    pub can_override_pitch: bool,
    /// Velocity the engine should set before moving the player this frame.
    pub modified_velocity: Option<Vec3>,
}

impl BotInput {
    pub fn clear_movement_directions(&mut self) {
        self.forward_movement = 0;
        self.right_movement = 0;
        self.up_movement = 0;
    }

    pub fn has_movement(&self) -> bool {
        self.forward_movement != 0 || self.right_movement != 0 || self.up_movement != 0 || self.special_button
    }
}

/// Where a bot is heading to; set by activated plan records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavTarget {
    pub origin: Vec3,
    pub area_num: AreaNum,
    /// Whether touching the target has a pickup effect (items) or it is a plain spot.
    pub is_entity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Health,
    Armor,
    Weapon,
    Ammo,
    Powerup,
}

/// An item the external item selector wants the bot to pick up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavEntity {
    pub id: u32,
    pub origin: Vec3,
    pub kind: ItemKind,
    pub area_num: AreaNum,
}
