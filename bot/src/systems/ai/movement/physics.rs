// tactical_bot_core/bot/src/systems/ai/movement/physics.rs
use crate::core::config::MovementConfig;
use crate::core::constants::*;
use crate::core::types::*;
use crate::world::collision::{CollisionWorld, TraceResult};

const GROUND_ACCEL: f32 = 10.0;
const AIR_ACCEL: f32 = 1.0;
const FRICTION: f32 = 6.0;
const STOP_SPEED: f32 = 100.0;
const DASH_UP_SPEED: f32 = 174.0;
const WALLJUMP_UP_SPEED: f32 = 330.0;
const WALLJUMP_PROBE_DISTANCE: f32 = 12.0;
const DASH_DELAY_MILLIS: u16 = 1000;
const WALLJUMP_DELAY_MILLIS: u16 = 1300;
const SKIM_MILLIS: u16 = 250;
const GROUND_PROBE_DEPTH: f32 = 0.25;
const HEIGHT_PROBE_DEPTH: f32 = 1024.0;
const MIN_WALKABLE_NORMAL_Z: f32 = 0.7;
/// A player moving up faster than this is never considered grounded.
const MAX_GROUNDED_UP_SPEED: f32 = 180.0;
const MAX_CLIP_PLANES: usize = 4;

/// The part of a player state the movement code predicts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerMoveState {
    pub physics: EntityPhysicsState,
    pub stats: PlayerMoveStats,
}

impl PlayerMoveState {
    pub fn new(origin: Vec3, features: u16) -> Self {
        PlayerMoveState { physics: EntityPhysicsState::new(origin), stats: PlayerMoveStats::with_features(features) }
    }

    #[inline]
    pub fn is_skimming_since(&self, old: &PlayerMoveState) -> bool {
        self.stats.skim_time != 0 && self.stats.skim_time != old.stats.skim_time
    }
}

/// Things that happened during a single move step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameEvents {
    pub has_jumped: bool,
    pub has_dashed: bool,
    pub has_walljumped: bool,
    pub has_touched_nav_target: bool,
    pub has_touched_trigger: bool,
}

/// Steps a player state forward by applying an input.
pub trait PlayerMovePredictor: Send + Sync {
    fn predict(&self, state: &PlayerMoveState, input: &BotInput, millis: u32, collision: &dyn CollisionWorld) -> (PlayerMoveState, FrameEvents);

    fn run_speed(&self) -> f32;
    fn dash_speed(&self) -> f32;
    fn gravity(&self) -> f32;
}

/// A small Quake-like player move: ground acceleration and friction, gravity,
/// jumps, dashes and walljumps, sliding along solid geometry with step-ups.
#[derive(Debug, Clone)]
pub struct SimplePmove {
    pub run_speed: f32,
    pub dash_speed: f32,
    pub jump_speed: f32,
    pub gravity: f32,
}

impl Default for SimplePmove {
    fn default() -> Self {
        SimplePmove::from_config(&MovementConfig::default())
    }
}

fn player_box() -> (Vec3, Vec3) {
    (vec3(PLAYERBOX_STAND_MINS), vec3(PLAYERBOX_STAND_MAXS))
}

fn clip_velocity(velocity: Vec3, normal: Vec3) -> Vec3 {
    let backoff = velocity.dot(normal) * 1.001;
    velocity - normal * backoff
}

fn accelerate(velocity: &mut Vec3, wish_dir: Vec3, wish_speed: f32, accel: f32, dt: f32) {
    let current_speed = velocity.dot(wish_dir);
    let add_speed = wish_speed - current_speed;
    if add_speed <= 0.0 {
        return;
    }
    let accel_speed = (accel * dt * wish_speed).min(add_speed);
    *velocity += wish_dir * accel_speed;
}

fn apply_friction(velocity: &mut Vec3, dt: f32) {
    let speed = velocity.length();
    if speed < 1.0 {
        velocity.x = 0.0;
        velocity.y = 0.0;
        return;
    }
    let drop = speed.max(STOP_SPEED) * FRICTION * dt;
    let new_speed = (speed - drop).max(0.0);
    *velocity *= new_speed / speed;
}

impl SimplePmove {
    pub fn from_config(config: &MovementConfig) -> Self {
        SimplePmove {
            run_speed: config.run_speed,
            dash_speed: config.dash_speed,
            jump_speed: config.jump_speed,
            gravity: DEFAULT_GRAVITY,
        }
    }

    fn find_walljump_normal(&self, physics: &EntityPhysicsState, collision: &dyn CollisionWorld) -> Option<Vec3> {
        let (mins, maxs) = player_box();
        let forward = physics.velocity_dir_2d().unwrap_or_else(|| flat(physics.forward_dir).normalize_or_zero());
        if forward == Vec3::ZERO {
            return None;
        }
        let right = Vec3::new(forward.y, -forward.x, 0.0);
        for dir in [forward, right, -right, (forward + right).normalize(), (forward - right).normalize()] {
            let tr = collision.trace(physics.origin, mins, maxs, physics.origin + dir * WALLJUMP_PROBE_DISTANCE);
            if tr.fraction < 1.0 && !tr.start_solid && tr.normal.z.abs() < MIN_WALKABLE_NORMAL_Z {
                return Some(tr.normal);
            }
        }
        None
    }

    fn try_step_up(&self, origin: Vec3, velocity: Vec3, time_left: f32, collision: &dyn CollisionWorld) -> Option<Vec3> {
        let (mins, maxs) = player_box();
        let up = collision.trace(origin, mins, maxs, origin + Vec3::Z * AI_STEPSIZE);
        if up.start_solid {
            return None;
        }
        let shift = flat(velocity) * time_left;
        let forward = collision.trace(up.endpos, mins, maxs, up.endpos + shift);
        if forward.start_solid || square_distance_2d(forward.endpos, up.endpos) < 1.0 {
            return None;
        }
        let down = collision.trace(forward.endpos, mins, maxs, forward.endpos - Vec3::Z * AI_STEPSIZE);
        if down.start_solid || down.fraction >= 1.0 || down.normal.z < MIN_WALKABLE_NORMAL_Z {
            return None;
        }
        Some(down.endpos)
    }

    /// Returns true if the move has been performed as a step-up.
    fn slide_move(&self, physics: &mut EntityPhysicsState, dt: f32, collision: &dyn CollisionWorld) -> bool {
        let (mins, maxs) = player_box();
        let mut time_left = dt;
        for _ in 0..MAX_CLIP_PLANES {
            if time_left <= 0.0 {
                break;
            }
            let end = physics.origin + physics.velocity * time_left;
            let tr: TraceResult = collision.trace(physics.origin, mins, maxs, end);
            if tr.start_solid {
                physics.velocity = Vec3::ZERO;
                return false;
            }
            physics.origin = tr.endpos;
            if tr.fraction >= 1.0 {
                break;
            }
            time_left *= 1.0 - tr.fraction;
            if tr.normal.z.abs() < MIN_WALKABLE_NORMAL_Z {
                if let Some(stepped) = self.try_step_up(physics.origin, physics.velocity, time_left, collision) {
                    physics.origin = stepped;
                    return true;
                }
            }
            physics.velocity = clip_velocity(physics.velocity, tr.normal);
        }
        false
    }

    fn categorize_position(&self, physics: &mut EntityPhysicsState, has_jumped: bool, collision: &dyn CollisionWorld) {
        let (mins, maxs) = player_box();
        let origin = physics.origin;
        let ground = collision.trace(origin, mins, maxs, origin - Vec3::Z * GROUND_PROBE_DEPTH);
        let on_ground = !has_jumped
            && physics.velocity.z <= MAX_GROUNDED_UP_SPEED
            && ground.fraction < 1.0
            && ground.normal.z >= MIN_WALKABLE_NORMAL_Z;
        physics.on_ground = on_ground;
        if on_ground {
            physics.velocity.z = 0.0;
            physics.ground_normal = ground.normal;
            physics.height_over_ground = 0.0;
            return;
        }
        physics.ground_normal = Vec3::Z;
        let probe = collision.trace(origin, mins, maxs, origin - Vec3::Z * HEIGHT_PROBE_DEPTH);
        physics.height_over_ground = if probe.fraction < 1.0 { origin.z - probe.endpos.z } else { f32::INFINITY };
    }
}

impl PlayerMovePredictor for SimplePmove {
    fn predict(&self, state: &PlayerMoveState, input: &BotInput, millis: u32, collision: &dyn CollisionWorld) -> (PlayerMoveState, FrameEvents) {
        let dt = millis as f32 * 0.001;
        let elapsed = millis.min(u16::MAX as u32) as u16;
        let mut physics = state.physics;
        let mut stats = state.stats;
        let mut events = FrameEvents::default();
        stats.dash_time = stats.dash_time.saturating_sub(elapsed);
        stats.walljump_time = stats.walljump_time.saturating_sub(elapsed);
        stats.stun_time = stats.stun_time.saturating_sub(elapsed);
        stats.skim_time = stats.skim_time.saturating_sub(elapsed);

        if let Some(velocity) = input.modified_velocity {
            physics.velocity = velocity;
        }

        let look_2d = flat(input.intended_look_dir).normalize_or_zero();
        if look_2d != Vec3::ZERO {
            physics.forward_dir = input.intended_look_dir.normalize_or_zero();
        }
        let forward = flat(physics.forward_dir).normalize_or_zero();
        let right = Vec3::new(forward.y, -forward.x, 0.0);
        let wish_dir = (forward * input.forward_movement as f32 + right * input.right_movement as f32).normalize_or_zero();

        if physics.on_ground {
            if input.up_movement > 0 && stats.has_feature(PMFEAT_JUMP) {
                physics.velocity.z = physics.velocity.z.max(self.jump_speed);
                physics.on_ground = false;
                events.has_jumped = true;
            } else if input.special_button && stats.has_feature(PMFEAT_DASH) && stats.dash_time == 0 {
                let dash_dir = if wish_dir != Vec3::ZERO { wish_dir } else { forward };
                let speed_2d = physics.speed_2d().max(self.dash_speed);
                physics.velocity = dash_dir * speed_2d + Vec3::Z * DASH_UP_SPEED;
                physics.on_ground = false;
                stats.dash_time = DASH_DELAY_MILLIS;
                events.has_dashed = true;
            } else {
                apply_friction(&mut physics.velocity, dt);
                accelerate(&mut physics.velocity, wish_dir, self.run_speed, GROUND_ACCEL, dt);
            }
        } else {
            let may_walljump = input.special_button
                && stats.has_feature(PMFEAT_WALLJUMP)
                && stats.walljump_time == 0
                && stats.stun_time == 0;
            if may_walljump {
                if let Some(normal) = self.find_walljump_normal(&physics, collision) {
                    let velocity_2d = flat(physics.velocity);
                    let speed_2d = velocity_2d.length();
                    let bounced = (velocity_2d - normal * 2.0 * velocity_2d.dot(normal)).normalize_or_zero();
                    physics.velocity = bounced * speed_2d + Vec3::Z * WALLJUMP_UP_SPEED;
                    stats.walljump_time = WALLJUMP_DELAY_MILLIS;
                    events.has_walljumped = true;
                }
            }
            accelerate(&mut physics.velocity, wish_dir, self.run_speed, AIR_ACCEL, dt);
        }

        if !physics.on_ground {
            physics.velocity.z -= self.gravity * dt;
        }

        if self.slide_move(&mut physics, dt, collision) && !physics.on_ground {
            stats.skim_time = SKIM_MILLIS;
        }
        self.categorize_position(&mut physics, events.has_jumped, collision);

        (PlayerMoveState { physics, stats }, events)
    }

    fn run_speed(&self) -> f32 {
        self.run_speed
    }

    fn dash_speed(&self) -> f32 {
        self.dash_speed
    }

    fn gravity(&self) -> f32 {
        self.gravity
    }
}
