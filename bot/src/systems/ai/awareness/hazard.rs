// tactical_bot_core/bot/src/systems/ai/awareness/hazard.rs
use crate::core::types::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HazardKind {
    /// An explosion around the hit point.
    Splash { radius: f32 },
    /// An instant-hit beam from the shot origin to the hit point.
    Beam { width: f32 },
}

/// Something that is about to deal damage to the bot, e.g. an incoming rocket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hazard {
    pub kind: HazardKind,
    pub shot_origin: Vec3,
    pub hit_point: Vec3,
    pub damage: f32,
    pub attacker_id: Option<u32>,
    pub timeout_at: LevelTime,
}

impl Hazard {
    pub fn splash(hit_point: Vec3, radius: f32, damage: f32, timeout_at: LevelTime) -> Self {
        Hazard {
            kind: HazardKind::Splash { radius },
            shot_origin: hit_point,
            hit_point,
            damage,
            attacker_id: None,
            timeout_at,
        }
    }

    pub fn beam(shot_origin: Vec3, hit_point: Vec3, width: f32, damage: f32, timeout_at: LevelTime) -> Self {
        Hazard {
            kind: HazardKind::Beam { width },
            shot_origin,
            hit_point,
            damage,
            attacker_id: None,
            timeout_at,
        }
    }

    pub fn with_attacker(mut self, attacker_id: u32) -> Self {
        self.attacker_id = Some(attacker_id);
        self
    }

    #[inline]
    pub fn is_valid(&self, level_time: LevelTime) -> bool {
        self.timeout_at > level_time
    }

    /// Degenerate hazards can't tell safe points from affected ones.
    pub fn supports_impact_tests(&self) -> bool {
        match self.kind {
            HazardKind::Splash { radius } => radius > 0.0,
            HazardKind::Beam { width } => width > 0.0 && self.shot_origin.distance_squared(self.hit_point) > 1.0,
        }
    }

    pub fn has_impact_on_point(&self, point: Vec3) -> bool {
        match self.kind {
            HazardKind::Splash { radius } => point.distance_squared(self.hit_point) < radius * radius,
            HazardKind::Beam { width } => {
                let segment = self.hit_point - self.shot_origin;
                let square_length = segment.length_squared();
                if square_length < 1.0 {
                    return point.distance_squared(self.hit_point) < width * width;
                }
                let t = ((point - self.shot_origin).dot(segment) / square_length).clamp(0.0, 1.0);
                let closest = self.shot_origin + segment * t;
                point.distance_squared(closest) < width * width
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splash_impact_is_radial() {
        let hazard = Hazard::splash(Vec3::new(100.0, 0.0, 0.0), 96.0, 80.0, 1000);
        assert!(hazard.supports_impact_tests());
        assert!(hazard.has_impact_on_point(Vec3::new(150.0, 20.0, 0.0)));
        assert!(!hazard.has_impact_on_point(Vec3::new(300.0, 0.0, 0.0)));
        assert!(hazard.is_valid(999));
        assert!(!hazard.is_valid(1000));
    }

    #[test]
    fn beam_impact_follows_segment() {
        let hazard = Hazard::beam(Vec3::ZERO, Vec3::new(1000.0, 0.0, 0.0), 32.0, 75.0, 500);
        assert!(hazard.has_impact_on_point(Vec3::new(500.0, 20.0, 0.0)));
        assert!(!hazard.has_impact_on_point(Vec3::new(500.0, 64.0, 0.0)));
        assert!(!hazard.has_impact_on_point(Vec3::new(1100.0, 0.0, 0.0)));

        let degenerate = Hazard::beam(Vec3::ZERO, Vec3::ZERO, 32.0, 75.0, 500);
        assert!(!degenerate.supports_impact_tests());
    }
}
