// tactical_bot_core/bot/src/systems/ai/planning/world_state.rs
use crate::core::constants::{ORIGIN_VAR_MAX_ROUNDING_SQUARE_DISTANCE_ERROR, ORIGIN_VAR_QUANTUM};
use crate::core::types::*;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginVarName {
    BotOrigin,
    NavTargetOrigin,
    EnemyOrigin,
    CoverSpot,
    AdvantageSpot,
    RunAwaySpot,
    DodgeSpot,
    RoamSpot,
}

pub const NUM_ORIGIN_VARS: usize = 8;

impl OriginVarName {
    pub const ALL: [OriginVarName; NUM_ORIGIN_VARS] = [
        OriginVarName::BotOrigin,
        OriginVarName::NavTargetOrigin,
        OriginVarName::EnemyOrigin,
        OriginVarName::CoverSpot,
        OriginVarName::AdvantageSpot,
        OriginVarName::RunAwaySpot,
        OriginVarName::DodgeSpot,
        OriginVarName::RoamSpot,
    ];

    pub const TACTICAL_SPOTS: [OriginVarName; 5] = [
        OriginVarName::CoverSpot,
        OriginVarName::AdvantageSpot,
        OriginVarName::RunAwaySpot,
        OriginVarName::DodgeSpot,
        OriginVarName::RoamSpot,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortVarName {
    Health,
    Armor,
}

pub const NUM_SHORT_VARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolVarName {
    HasJustPickedGoalItem,
    HasJustKilledEnemy,
    HasPositionalAdvantage,
    CanHitEnemy,
    EnemyCanHit,
    HasThreateningEnemy,
    IsRunningAway,
    HasRunAway,
    HasReactedToHazard,
}

pub const NUM_BOOL_VARS: usize = 9;

impl BoolVarName {
    pub const ALL: [BoolVarName; NUM_BOOL_VARS] = [
        BoolVarName::HasJustPickedGoalItem,
        BoolVarName::HasJustKilledEnemy,
        BoolVarName::HasPositionalAdvantage,
        BoolVarName::CanHitEnemy,
        BoolVarName::EnemyCanHit,
        BoolVarName::HasThreateningEnemy,
        BoolVarName::IsRunningAway,
        BoolVarName::HasRunAway,
        BoolVarName::HasReactedToHazard,
    ];
}

/// An origin rounded to `ORIGIN_VAR_QUANTUM` units so nearly equal positions compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedOrigin([i16; 3]);

impl PackedOrigin {
    pub fn from_vec3(v: Vec3) -> Self {
        let pack = |x: f32| (x / ORIGIN_VAR_QUANTUM).round() as i16;
        PackedOrigin([pack(v.x), pack(v.y), pack(v.z)])
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.0[0] as f32, self.0[1] as f32, self.0[2] as f32) * ORIGIN_VAR_QUANTUM
    }
}

/// A symbolic snapshot of what the planner knows about the bot and its surroundings.
///
/// Every variable may be absent ("ignored"). An ignored variable carries no
/// value, so equality and `hash_value()` agree: states that compare equal
/// produce equal hashes. Satisfaction radii only matter for desired states and
/// take no part in equality.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    origins: [Option<PackedOrigin>; NUM_ORIGIN_VARS],
    satisfy_radii: [u16; NUM_ORIGIN_VARS],
    shorts: [Option<i16>; NUM_SHORT_VARS],
    bools: [Option<bool>; NUM_BOOL_VARS],
}

impl PartialEq for WorldState {
    fn eq(&self, other: &Self) -> bool {
        self.origins == other.origins && self.shorts == other.shorts && self.bools == other.bools
    }
}

impl Eq for WorldState {}

impl WorldState {
    /// A state with every variable ignored.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self, name: OriginVarName) -> Option<Vec3> {
        self.origins[name as usize].map(PackedOrigin::to_vec3)
    }

    pub fn packed_origin(&self, name: OriginVarName) -> Option<PackedOrigin> {
        self.origins[name as usize]
    }

    pub fn set_origin(&mut self, name: OriginVarName, value: Vec3) {
        self.origins[name as usize] = Some(PackedOrigin::from_vec3(value));
    }

    pub fn set_origin_opt(&mut self, name: OriginVarName, value: Option<Vec3>) {
        self.origins[name as usize] = value.map(PackedOrigin::from_vec3);
    }

    pub fn ignore_origin(&mut self, name: OriginVarName) {
        self.origins[name as usize] = None;
    }

    /// A desired origin is satisfied by any origin within the radius. Zero requires an exact match.
    pub fn set_satisfy_radius(&mut self, name: OriginVarName, radius: f32) {
        self.satisfy_radii[name as usize] = radius.clamp(0.0, u16::MAX as f32) as u16;
    }

    pub fn short_var(&self, name: ShortVarName) -> Option<i16> {
        self.shorts[name as usize]
    }

    pub fn set_short(&mut self, name: ShortVarName, value: i16) {
        self.shorts[name as usize] = Some(value);
    }

    pub fn bool_var(&self, name: BoolVarName) -> Option<bool> {
        self.bools[name as usize]
    }

    /// Ignored flags read as false.
    #[inline]
    pub fn is_set(&self, name: BoolVarName) -> bool {
        self.bools[name as usize] == Some(true)
    }

    pub fn set_bool(&mut self, name: BoolVarName, value: bool) {
        self.bools[name as usize] = Some(value);
    }

    pub fn ignore_bool(&mut self, name: BoolVarName) {
        self.bools[name as usize] = None;
    }

    /// Spots depend on the bot origin and must be dropped once an action moves the bot.
    pub fn reset_tactical_spots(&mut self) {
        for name in OriginVarName::TACTICAL_SPOTS {
            self.ignore_origin(name);
        }
    }

    pub fn distance_to_nav_target(&self) -> f32 {
        match (self.origin(OriginVarName::BotOrigin), self.origin(OriginVarName::NavTargetOrigin)) {
            (Some(bot_origin), Some(nav_target)) => bot_origin.distance(nav_target),
            _ => f32::INFINITY,
        }
    }

    /// Both origins are present and equal up to the rounding error.
    pub fn origins_coincide(&self, a: OriginVarName, b: OriginVarName) -> bool {
        match (self.origin(a), self.origin(b)) {
            (Some(a), Some(b)) => a.distance_squared(b) < ORIGIN_VAR_MAX_ROUNDING_SQUARE_DISTANCE_ERROR,
            _ => false,
        }
    }

    pub fn hash_value(&self) -> u32 {
        let mut bytes = [0u8; NUM_ORIGIN_VARS * 7 + NUM_SHORT_VARS * 3 + NUM_BOOL_VARS];
        let mut offset = 0;
        for origin in &self.origins {
            if let Some(PackedOrigin(packed)) = origin {
                bytes[offset] = 1;
                for (i, component) in packed.iter().enumerate() {
                    bytes[offset + 1 + 2 * i..offset + 3 + 2 * i].copy_from_slice(&component.to_le_bytes());
                }
            }
            offset += 7;
        }
        for short in &self.shorts {
            if let Some(value) = short {
                bytes[offset] = 1;
                bytes[offset + 1..offset + 3].copy_from_slice(&value.to_le_bytes());
            }
            offset += 3;
        }
        for flag in &self.bools {
            bytes[offset] = match flag {
                None => 0,
                Some(false) => 1,
                Some(true) => 2,
            };
            offset += 1;
        }
        let hash = seahash::hash(&bytes);
        (hash ^ (hash >> 32)) as u32
    }

    /// Partial match: every variable that is present in `self` must match `other`.
    pub fn is_satisfied_by(&self, other: &WorldState) -> bool {
        for i in 0..NUM_ORIGIN_VARS {
            let Some(desired) = self.origins[i] else { continue };
            let Some(actual) = other.origins[i] else { return false };
            let radius = self.satisfy_radii[i] as f32;
            if radius > 0.0 {
                if desired.to_vec3().distance_squared(actual.to_vec3()) > radius * radius {
                    return false;
                }
            } else if desired != actual {
                return false;
            }
        }
        for i in 0..NUM_SHORT_VARS {
            if self.shorts[i].is_some() && self.shorts[i] != other.shorts[i] {
                return false;
            }
        }
        for i in 0..NUM_BOOL_VARS {
            if self.bools[i].is_some() && self.bools[i] != other.bools[i] {
                return false;
            }
        }
        true
    }

    /// Names of variables that differ, for diagnostics.
    pub fn diff(&self, other: &WorldState) -> Vec<String> {
        let mut result = Vec::new();
        for name in OriginVarName::ALL {
            if self.origins[name as usize] != other.origins[name as usize] {
                result.push(format!("{:?}: {:?} vs {:?}", name, self.origin(name), other.origin(name)));
            }
        }
        for name in BoolVarName::ALL {
            if self.bools[name as usize] != other.bools[name as usize] {
                result.push(format!("{:?}: {:?} vs {:?}", name, self.bool_var(name), other.bool_var(name)));
            }
        }
        if self.shorts != other.shorts {
            result.push(format!("shorts: {:?} vs {:?}", self.shorts, other.shorts));
        }
        result
    }
}

impl fmt::Display for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for name in OriginVarName::ALL {
            if let Some(v) = self.origin(name) {
                write!(f, "{}{:?}: ({:.0} {:.0} {:.0})", if first { "" } else { ", " }, name, v.x, v.y, v.z)?;
                first = false;
            }
        }
        for name in BoolVarName::ALL {
            if let Some(value) = self.bool_var(name) {
                write!(f, "{}{:?}: {}", if first { "" } else { ", " }, name, value)?;
                first = false;
            }
        }
        write!(f, "}}")
    }
}
