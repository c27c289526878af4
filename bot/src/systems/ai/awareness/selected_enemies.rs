// tactical_bot_core/bot/src/systems/ai/awareness/selected_enemies.rs
use crate::core::constants::PLAYERBOX_STAND_VIEWHEIGHT;
use crate::core::frame_cache::FrameCached;
use crate::core::types::*;
use crate::world::collision::CollisionWorld;
use smallvec::SmallVec;

pub const MAX_SELECTED_ENEMIES: usize = 4;
const MIDDLE_RANGE_MAX: f32 = 768.0;

type PerEnemy<T> = SmallVec<[T; MAX_SELECTED_ENEMIES]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyWeapon {
    Electrobolt,
    Instagun,
    Lasergun,
    Plasmagun,
    RocketLauncher,
    Shockwave,
    Other,
}

/// What the enemy tracker knows about an enemy. Supplied by the caller every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyFacts {
    pub id: u32,
    pub last_seen_origin: Vec3,
    pub last_seen_velocity: Vec3,
    pub look_dir: Vec3,
    pub damage_to_kill: f32,
    pub has_quad: bool,
    pub has_shell: bool,
    pub is_carrier: bool,
    /// Millis until the enemy's weapon can fire again.
    pub fire_delay_millis: u32,
    pub weapon: EnemyWeapon,
    pub is_zooming: bool,
    pub total_inflicted_damage: f32,
    pub last_attacked_bot_at: Option<LevelTime>,
}

impl EnemyFacts {
    pub fn new(id: u32, origin: Vec3) -> Self {
        EnemyFacts {
            id,
            last_seen_origin: origin,
            last_seen_velocity: Vec3::ZERO,
            look_dir: Vec3::X,
            damage_to_kill: 100.0,
            has_quad: false,
            has_shell: false,
            is_carrier: false,
            fire_delay_millis: 0,
            weapon: EnemyWeapon::Other,
            is_zooming: false,
            total_inflicted_damage: 0.0,
            last_attacked_bot_at: None,
        }
    }
}

/// The bot point of view the cached values are computed for.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BotView {
    origin: Vec3,
    forward_dir: Vec3,
    /// The attacker of the primary hazard and the hazard damage.
    hazard_attacker: Option<(u32, f32)>,
}

/// Enemies chosen by the external enemy selector plus lazily computed per-frame facts about them.
#[derive(Debug, Clone)]
pub struct SelectedEnemies {
    enemies: PerEnemy<EnemyFacts>,
    timeout_at: LevelTime,
    view: BotView,
    threat_factors: FrameCached<PerEnemy<f32>>,
    max_threat_factor: FrameCached<f32>,
    can_enemy_hit: FrameCached<PerEnemy<bool>>,
    could_hit_if_turns: FrameCached<bool>,
    potentially_hittable: FrameCached<bool>,
    bot_view_dots: FrameCached<PerEnemy<f32>>,
    enemy_view_dots: FrameCached<PerEnemy<f32>>,
}

impl Default for SelectedEnemies {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectedEnemies {
    pub fn new() -> Self {
        SelectedEnemies {
            enemies: PerEnemy::new(),
            timeout_at: 0,
            view: BotView { origin: Vec3::ZERO, forward_dir: Vec3::X, hazard_attacker: None },
            threat_factors: FrameCached::new(),
            max_threat_factor: FrameCached::new(),
            can_enemy_hit: FrameCached::new(),
            could_hit_if_turns: FrameCached::new(),
            potentially_hittable: FrameCached::new(),
            bot_view_dots: FrameCached::new(),
            enemy_view_dots: FrameCached::new(),
        }
    }

    /// Replaces the selection. The first enemy is the primary one.
    pub fn set(&mut self, enemies: &[EnemyFacts], level_time: LevelTime, timeout_millis: u64) {
        self.invalidate();
        self.enemies.extend(enemies.iter().take(MAX_SELECTED_ENEMIES).copied());
        if !self.enemies.is_empty() {
            self.timeout_at = level_time + timeout_millis;
        }
    }

    pub fn invalidate(&mut self) {
        self.enemies.clear();
        self.timeout_at = 0;
        self.invalidate_caches();
    }

    fn invalidate_caches(&mut self) {
        self.threat_factors.invalidate();
        self.max_threat_factor.invalidate();
        self.can_enemy_hit.invalidate();
        self.could_hit_if_turns.invalidate();
        self.potentially_hittable.invalidate();
        self.bot_view_dots.invalidate();
        self.enemy_view_dots.invalidate();
    }

    /// Must be called once per frame before any cached query.
    pub fn update_bot_view(&mut self, origin: Vec3, forward_dir: Vec3, hazard_attacker: Option<(u32, f32)>) {
        let view = BotView { origin, forward_dir, hazard_attacker };
        if view != self.view {
            self.view = view;
            self.invalidate_caches();
        }
    }

    #[inline]
    pub fn are_valid(&self, level_time: LevelTime) -> bool {
        !self.enemies.is_empty() && self.timeout_at > level_time
    }

    pub fn enemies(&self) -> &[EnemyFacts] {
        &self.enemies
    }

    pub fn primary(&self) -> Option<&EnemyFacts> {
        self.enemies.first()
    }

    pub fn closest_enemy_origin(&self, relatively_to: Vec3) -> Option<Vec3> {
        self.enemies
            .iter()
            .map(|enemy| enemy.last_seen_origin)
            .min_by(|a, b| a.distance_squared(relatively_to).total_cmp(&b.distance_squared(relatively_to)))
    }

    /// Shells quadruple the damage an enemy can take.
    pub fn damage_to_kill(&self) -> f32 {
        self.enemies
            .iter()
            .map(|enemy| if enemy.has_shell { 4.0 * enemy.damage_to_kill } else { enemy.damage_to_kill })
            .sum()
    }

    pub fn fire_delay(&self) -> u32 {
        self.enemies.iter().map(|enemy| enemy.fire_delay_millis).min().unwrap_or(u32::MAX)
    }

    pub fn have_quad(&self) -> bool {
        self.enemies.iter().any(|enemy| enemy.has_quad)
    }

    pub fn have_carrier(&self) -> bool {
        self.enemies.iter().any(|enemy| enemy.is_carrier)
    }

    pub fn total_inflicted_damage(&self) -> f32 {
        self.enemies.iter().map(|enemy| enemy.total_inflicted_damage).sum()
    }

    /// Dot products of the bot view dir and directions to enemies.
    pub fn bot_view_dir_dots(&mut self, tick: LevelTime) -> &[f32] {
        let (enemies, view) = (&self.enemies, self.view);
        self.bot_view_dots.get_or_compute(tick, || {
            enemies
                .iter()
                .map(|enemy| {
                    let mut to_enemy = enemy.last_seen_origin - view.origin;
                    to_enemy.z -= PLAYERBOX_STAND_VIEWHEIGHT;
                    view.forward_dir.dot(to_enemy.normalize_or_zero())
                })
                .collect()
        })
    }

    /// Dot products of enemy look dirs and directions from enemies to the bot.
    pub fn enemy_view_dir_dots(&mut self, tick: LevelTime) -> &[f32] {
        let (enemies, view) = (&self.enemies, self.view);
        self.enemy_view_dots.get_or_compute(tick, || {
            enemies
                .iter()
                .map(|enemy| {
                    let mut to_bot = view.origin - enemy.last_seen_origin;
                    to_bot.z -= PLAYERBOX_STAND_VIEWHEIGHT;
                    enemy.look_dir.dot(to_bot.normalize_or_zero())
                })
                .collect()
        })
    }

    fn test_can_hit(collision: &dyn CollisionWorld, attacker_origin: Vec3, victim_origin: Vec3, view_dot: f32) -> bool {
        if view_dot < 0.7 {
            return false;
        }
        let trace_start = attacker_origin + Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);
        if collision.trace_line(trace_start, victim_origin).is_clear() {
            return true;
        }
        // The chest point
        let chest = victim_origin + Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);
        collision.trace_line(trace_start, chest).is_clear()
    }

    /// Whether each enemy can hit the bot right now.
    pub fn can_enemies_hit(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> &[bool] {
        let dots: PerEnemy<f32> = self.enemy_view_dir_dots(tick).iter().copied().collect();
        let (enemies, view) = (&self.enemies, self.view);
        self.can_enemy_hit.get_or_compute(tick, || {
            enemies
                .iter()
                .zip(dots.iter())
                .map(|(enemy, &dot)| Self::test_can_hit(collision, enemy.last_seen_origin, view.origin, dot))
                .collect()
        })
    }

    pub fn can_hit(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> bool {
        self.can_enemies_hit(tick, collision).iter().any(|&can_hit| can_hit)
    }

    /// Whether the bot could hit the primary enemy after turning to it.
    pub fn could_be_hit_if_bot_turns(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> bool {
        let (primary, view) = (self.enemies.first().copied(), self.view);
        *self.could_hit_if_turns.get_or_compute(tick, || match primary {
            Some(enemy) => Self::test_can_hit(collision, view.origin, enemy.last_seen_origin, 1.0),
            None => false,
        })
    }

    pub fn can_be_hit(&mut self, tick: LevelTime, collision: &dyn CollisionWorld, fov_dot_factor: f32) -> bool {
        if !self.could_be_hit_if_bot_turns(tick, collision) {
            return false;
        }
        self.bot_view_dir_dots(tick).first().is_some_and(|&dot| dot > fov_dot_factor)
    }

    /// Some enemy is roughly in front of the bot and nothing solid is in between.
    pub fn are_potentially_hittable(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> bool {
        let dots: PerEnemy<f32> = self.bot_view_dir_dots(tick).iter().copied().collect();
        let (enemies, view) = (&self.enemies, self.view);
        *self.potentially_hittable.get_or_compute(tick, || {
            let view_point = view.origin + Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);
            enemies
                .iter()
                .zip(dots.iter())
                .any(|(enemy, &dot)| dot >= 0.7 && collision.trace_line(view_point, enemy.last_seen_origin).is_clear())
        })
    }

    fn compute_threat_factor(&self, enemy: &EnemyFacts, view_dot: f32, can_hit: bool, tick: LevelTime) -> f32 {
        // Can't shoot soon
        if enemy.fire_delay_millis > 800 {
            return 0.0;
        }
        // The bot is out of the enemy fov
        if view_dot < 0.2 {
            return 0.0;
        }
        let mut factor = if enemy.has_quad || enemy.is_carrier {
            1.0
        } else if let Some((_, damage)) = self.view.hazard_attacker.filter(|&(attacker_id, _)| attacker_id == enemy.id) {
            0.5 + 0.5 * bounded_fraction(damage, 75.0)
        } else if view_dot < 0.7 {
            0.5 * view_dot
        } else if can_hit {
            view_dot.sqrt()
        } else {
            (0.5 * view_dot).sqrt()
        };

        if enemy.last_attacked_bot_at.is_some_and(|at| tick.saturating_sub(at) < 1000) {
            factor = factor.sqrt();
        }
        factor
    }

    pub fn threat_factors(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> &[f32] {
        if !self.threat_factors.is_valid_for(tick) {
            let dots: PerEnemy<f32> = self.enemy_view_dir_dots(tick).iter().copied().collect();
            let can_hit: PerEnemy<bool> = self.can_enemies_hit(tick, collision).iter().copied().collect();
            let values: PerEnemy<f32> = self
                .enemies
                .iter()
                .enumerate()
                .map(|(i, enemy)| self.compute_threat_factor(enemy, dots[i], can_hit[i], tick))
                .collect();
            self.threat_factors.get_or_compute(tick, || values);
        }
        self.threat_factors.peek(tick).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn max_threat_factor(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> f32 {
        if let Some(&value) = self.max_threat_factor.peek(tick) {
            return value;
        }
        let max = self.threat_factors(tick, collision).iter().copied().fold(0.0f32, f32::max);
        *self.max_threat_factor.get_or_compute(tick, || max)
    }

    pub fn are_threatening(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> bool {
        self.max_threat_factor(tick, collision) > 0.3
    }

    /// Electrobolt or instagun users that are about to put the crosshair on the bot.
    pub fn is_about_to_hit_eb_or_ig(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> bool {
        let dots: PerEnemy<f32> = self.enemy_view_dir_dots(tick).iter().copied().collect();
        let bot_origin = self.view.origin;
        self.enemies.iter().zip(dots.iter()).any(|(enemy, &dot)| {
            if !matches!(enemy.weapon, EnemyWeapon::Electrobolt | EnemyWeapon::Instagun) {
                return false;
            }
            if enemy.fire_delay_millis > 333 || dot < 0.85 {
                return false;
            }
            let square_speed = enemy.last_seen_velocity.length_squared();
            if square_speed > 650.0 * 650.0 {
                return false;
            }
            if enemy.is_zooming {
                if square_speed > 400.0 * 400.0 {
                    return false;
                }
            } else if enemy.last_seen_origin.distance_squared(bot_origin) > 1250.0 * 1250.0 {
                return false;
            }
            let trace_start = enemy.last_seen_origin + Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);
            collision.trace_line(trace_start, bot_origin).is_clear()
        })
    }

    pub fn is_about_to_hit_lg_or_pg(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> bool {
        let dots: PerEnemy<f32> = self.enemy_view_dir_dots(tick).iter().copied().collect();
        let bot_origin = self.view.origin;
        self.enemies.iter().zip(dots.iter()).any(|(enemy, &dot)| {
            if enemy.last_seen_origin.distance_squared(bot_origin) > MIDDLE_RANGE_MAX * MIDDLE_RANGE_MAX {
                return false;
            }
            if !matches!(enemy.weapon, EnemyWeapon::Lasergun | EnemyWeapon::Plasmagun) {
                return false;
            }
            if enemy.fire_delay_millis > 333 || dot < 0.85 {
                return false;
            }
            let trace_start = enemy.last_seen_origin + Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);
            collision.trace_line(trace_start, bot_origin).is_clear()
        })
    }

    pub fn is_about_to_hit_rl_or_sw(&mut self, tick: LevelTime, collision: &dyn CollisionWorld) -> bool {
        let dots: PerEnemy<f32> = self.enemy_view_dir_dots(tick).iter().copied().collect();
        let bot_origin = self.view.origin;
        self.enemies.iter().zip(dots.iter()).any(|(enemy, &dot)| {
            let mut distance_threshold = 512.0;
            let delta_z = enemy.last_seen_origin.z - bot_origin.z;
            if delta_z > 16.0 {
                distance_threshold += 2.0 * bounded_fraction(delta_z, 128.0);
            } else if delta_z < -16.0 {
                distance_threshold -= bounded_fraction(delta_z, 128.0);
            }
            let square_distance = enemy.last_seen_origin.distance_squared(bot_origin);
            if square_distance > distance_threshold * distance_threshold {
                return false;
            }
            if !matches!(enemy.weapon, EnemyWeapon::RocketLauncher | EnemyWeapon::Shockwave) {
                return false;
            }
            let distance_fraction = square_distance.sqrt().min(distance_threshold) / distance_threshold;
            // Splash damage makes dodging at close range pointless, react earlier
            if enemy.fire_delay_millis as f32 > 750.0 - (750.0 - 333.0) * distance_fraction {
                return false;
            }
            if dot < 0.3 + 0.4 * distance_fraction {
                return false;
            }
            let view_origin = enemy.last_seen_origin + Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT);
            if collision.trace_line(view_origin, bot_origin).is_clear() {
                return true;
            }
            // Walls around the bot the enemy can put a rocket into
            for (x, y) in [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
                let side_point = bot_origin + Vec3::new(64.0 * x, 64.0 * y, 0.0);
                let side_trace = collision.trace_line(bot_origin, side_point);
                if side_trace.fraction >= 1.0 {
                    continue;
                }
                let impact = side_trace.endpos;
                let enemy_trace = collision.trace_line(view_origin, impact);
                if enemy_trace.fraction >= 1.0 || impact.distance_squared(enemy_trace.endpos) < 8.0 * 8.0 {
                    return true;
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::collision::{BoxWorld, SolidBox};

    fn open_world() -> BoxWorld {
        BoxWorld::new(vec![SolidBox::new(Vec3::new(-2048.0, -2048.0, -64.0), Vec3::new(2048.0, 2048.0, 0.0), CONTENTS_SOLID)])
    }

    fn enemy_looking_at(origin: Vec3, target: Vec3) -> EnemyFacts {
        let mut enemy = EnemyFacts::new(7, origin);
        enemy.look_dir = (target - origin - Vec3::new(0.0, 0.0, PLAYERBOX_STAND_VIEWHEIGHT)).normalize();
        enemy
    }

    #[test]
    fn validity_expires_with_timeout() {
        let mut selected = SelectedEnemies::new();
        assert!(!selected.are_valid(0));
        selected.set(&[EnemyFacts::new(1, Vec3::ZERO)], 1000, 500);
        assert!(selected.are_valid(1499));
        assert!(!selected.are_valid(1500));
    }

    #[test]
    fn facing_enemy_is_a_threat_and_turned_one_is_not() {
        let world = open_world();
        let bot_origin = Vec3::new(0.0, 0.0, 24.0);
        let mut selected = SelectedEnemies::new();
        selected.update_bot_view(bot_origin, Vec3::X, None);

        let facing = enemy_looking_at(Vec3::new(500.0, 0.0, 24.0), bot_origin);
        selected.set(&[facing], 0, 1000);
        let threat = selected.max_threat_factor(1, &world);
        assert!(threat > 0.9, "threat {}", threat);
        assert!(selected.can_hit(1, &world));

        let mut turned = facing;
        turned.look_dir = Vec3::X;
        selected.set(&[turned], 0, 1000);
        assert_eq!(selected.max_threat_factor(2, &world), 0.0);
    }

    #[test]
    fn reloading_enemy_is_not_a_threat_but_quad_is() {
        let world = open_world();
        let bot_origin = Vec3::new(0.0, 0.0, 24.0);
        let mut selected = SelectedEnemies::new();
        selected.update_bot_view(bot_origin, Vec3::X, None);

        let mut enemy = enemy_looking_at(Vec3::new(300.0, 300.0, 24.0), bot_origin);
        enemy.fire_delay_millis = 1200;
        selected.set(&[enemy], 0, 1000);
        assert_eq!(selected.max_threat_factor(1, &world), 0.0);

        enemy.fire_delay_millis = 0;
        enemy.has_quad = true;
        selected.set(&[enemy], 0, 1000);
        assert_eq!(selected.max_threat_factor(2, &world), 1.0);
    }

    #[test]
    fn cached_values_are_recomputed_on_next_tick() {
        let world = open_world();
        let bot_origin = Vec3::new(0.0, 0.0, 24.0);
        let mut selected = SelectedEnemies::new();
        selected.update_bot_view(bot_origin, Vec3::X, None);
        selected.set(&[enemy_looking_at(Vec3::new(400.0, 0.0, 24.0), bot_origin)], 0, 1000);

        assert!(selected.bot_view_dir_dots(5)[0] > 0.9);
        selected.update_bot_view(bot_origin, -Vec3::X, None);
        assert!(selected.bot_view_dir_dots(5)[0] < -0.9);
    }

    #[test]
    fn instagun_user_about_to_hit() {
        let world = open_world();
        let bot_origin = Vec3::new(0.0, 0.0, 24.0);
        let mut selected = SelectedEnemies::new();
        selected.update_bot_view(bot_origin, Vec3::X, None);
        let mut enemy = enemy_looking_at(Vec3::new(600.0, 0.0, 24.0), bot_origin);
        enemy.weapon = EnemyWeapon::Instagun;
        selected.set(&[enemy], 0, 1000);
        assert!(selected.is_about_to_hit_eb_or_ig(1, &world));
        assert!(!selected.is_about_to_hit_lg_or_pg(1, &world));
        assert_eq!(selected.damage_to_kill(), 100.0);
    }
}
