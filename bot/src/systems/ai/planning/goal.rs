// tactical_bot_core/bot/src/systems/ai/planning/goal.rs
use crate::core::config::PlannerConfig;
use crate::core::types::*;
use crate::systems::ai::planning::action::PlanningAction;
use crate::systems::ai::planning::world_state::{BoolVarName, OriginVarName, WorldState};
use crate::systems::ai::planning::BotFacts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalKind {
    GrabItem,
    KillEnemy,
    RunAway,
    ReactToHazard,
    Roam,
}

impl GoalKind {
    pub const ALL: [GoalKind; 5] =
        [GoalKind::GrabItem, GoalKind::KillEnemy, GoalKind::RunAway, GoalKind::ReactToHazard, GoalKind::Roam];

    pub fn name(self) -> &'static str {
        match self {
            GoalKind::GrabItem => "GrabItemGoal",
            GoalKind::KillEnemy => "KillEnemyGoal",
            GoalKind::RunAway => "RunAwayGoal",
            GoalKind::ReactToHazard => "ReactToHazardGoal",
            GoalKind::Roam => "RoamGoal",
        }
    }

    /// Actions the planner may chain to satisfy the goal.
    pub fn actions(self) -> &'static [PlanningAction] {
        match self {
            GoalKind::GrabItem => &[PlanningAction::RunToNavEntity, PlanningAction::PickupNavEntity],
            GoalKind::KillEnemy => &[PlanningAction::AdvanceToGoodPosition, PlanningAction::AttackFromCurrentPosition],
            GoalKind::RunAway => &[
                PlanningAction::StartRunningAway,
                PlanningAction::FleeToSpot,
                PlanningAction::StartGotoCover,
                PlanningAction::TakeCover,
            ],
            GoalKind::ReactToHazard => &[PlanningAction::DodgeToSpot],
            GoalKind::Roam => &[PlanningAction::RoamToSpot],
        }
    }

    pub fn update_period_millis(self, config: &PlannerConfig) -> u64 {
        let millis = match self {
            GoalKind::GrabItem => config.grab_item_update_period_millis,
            GoalKind::KillEnemy => config.kill_enemy_update_period_millis,
            GoalKind::RunAway => config.run_away_update_period_millis,
            GoalKind::ReactToHazard => config.react_to_hazard_update_period_millis,
            GoalKind::Roam => config.roam_update_period_millis,
        };
        millis as u64
    }
}

/// A goal and its relevance weight for the current planning pass.
#[derive(Debug, Clone, Copy)]
pub struct Goal {
    pub kind: GoalKind,
    pub weight: f32,
}

impl Goal {
    pub fn new(kind: GoalKind) -> Self {
        Goal { kind, weight: 0.0 }
    }

    #[inline]
    pub fn is_relevant(&self) -> bool {
        self.weight > 0.0
    }

    pub fn update_weight(&mut self, ws: &WorldState, facts: &BotFacts, config: &PlannerConfig) {
        let weights = &config.goal_weights;
        self.weight = match self.kind {
            GoalKind::GrabItem => {
                match (facts.selected_nav_entity, facts.nav_entity_travel_time_millis) {
                    (Some(_), Some(travel_time)) if travel_time > 0 => {
                        let seconds = travel_time as f32 / 1000.0;
                        let falloff = weights.grab_item_travel_time_falloff_seconds.max(0.001);
                        weights.grab_item_max_weight * (1.0 - 0.75 * bounded_fraction(seconds, falloff))
                    }
                    _ => 0.0,
                }
            }
            GoalKind::KillEnemy => {
                if !facts.enemies_valid {
                    0.0
                } else {
                    // Offensiveness grows as the bot gets stronger than its enemies
                    let ratio = facts.damage_to_be_killed() / facts.enemies_damage_to_kill.max(1.0);
                    let offensiveness = bounded_fraction(ratio, 2.0);
                    weights.kill_enemy_base_weight + (weights.kill_enemy_max_weight - weights.kill_enemy_base_weight) * offensiveness
                }
            }
            GoalKind::RunAway => {
                if !facts.enemies_valid {
                    0.0
                } else {
                    let weakness = 1.0 - bounded_fraction(facts.damage_to_be_killed(), 2.0 * weights.weak_bot_damage_to_kill);
                    let threat = facts.max_threat_factor.clamp(0.0, 1.0);
                    let weight = weights.run_away_base_weight
                        + (weights.run_away_max_weight - weights.run_away_base_weight) * weakness * threat;
                    if ws.is_set(BoolVarName::HasThreateningEnemy) { weight } else { 0.5 * weight }
                }
            }
            GoalKind::ReactToHazard => match facts.hazard {
                Some(hazard) if hazard.is_valid(facts.level_time) => {
                    weights.react_to_hazard_weight * (0.5 + 0.5 * bounded_fraction(hazard.damage, 75.0))
                }
                _ => 0.0,
            },
            GoalKind::Roam => weights.roam_weight,
        };
    }

    /// The partial world state a plan must reach. `None` if the goal can't be stated for the current state.
    pub fn desired_world_state(&self, curr: &WorldState, config: &PlannerConfig) -> Option<WorldState> {
        let mut desired = WorldState::new();
        match self.kind {
            GoalKind::GrabItem => desired.set_bool(BoolVarName::HasJustPickedGoalItem, true),
            GoalKind::KillEnemy => desired.set_bool(BoolVarName::HasJustKilledEnemy, true),
            GoalKind::RunAway => desired.set_bool(BoolVarName::HasRunAway, true),
            GoalKind::ReactToHazard => desired.set_bool(BoolVarName::HasReactedToHazard, true),
            GoalKind::Roam => {
                let spot = curr.origin(OriginVarName::RoamSpot)?;
                desired.set_origin(OriginVarName::BotOrigin, spot);
                desired.set_satisfy_radius(OriginVarName::BotOrigin, config.goal_pickup_action_radius);
            }
        }
        Some(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::ai::awareness::Hazard;

    #[test]
    fn weak_bot_prefers_running_away() {
        let config = PlannerConfig::default();
        let mut ws = WorldState::new();
        ws.set_bool(BoolVarName::HasThreateningEnemy, true);
        let mut facts = BotFacts {
            enemies_valid: true,
            max_threat_factor: 1.0,
            enemies_damage_to_kill: 150.0,
            health: 20.0,
            armor: 0.0,
            ..BotFacts::default()
        };
        let mut kill = Goal::new(GoalKind::KillEnemy);
        let mut run_away = Goal::new(GoalKind::RunAway);
        kill.update_weight(&ws, &facts, &config);
        run_away.update_weight(&ws, &facts, &config);
        assert!(run_away.weight > kill.weight);

        facts.health = 200.0;
        facts.armor = 100.0;
        kill.update_weight(&ws, &facts, &config);
        run_away.update_weight(&ws, &facts, &config);
        assert!(kill.weight > run_away.weight);
    }

    #[test]
    fn hazard_goal_is_relevant_only_with_live_hazard() {
        let config = PlannerConfig::default();
        let ws = WorldState::new();
        let mut facts = BotFacts { level_time: 1000, ..BotFacts::default() };
        let mut goal = Goal::new(GoalKind::ReactToHazard);
        goal.update_weight(&ws, &facts, &config);
        assert!(!goal.is_relevant());

        facts.hazard = Some(Hazard::splash(Vec3::ZERO, 120.0, 100.0, 1500));
        goal.update_weight(&ws, &facts, &config);
        assert!(goal.is_relevant());
        facts.level_time = 2000;
        goal.update_weight(&ws, &facts, &config);
        assert!(!goal.is_relevant());
    }

    #[test]
    fn roam_desires_to_be_near_the_spot() {
        let config = PlannerConfig::default();
        let mut curr = WorldState::new();
        curr.set_origin(OriginVarName::RoamSpot, Vec3::new(400.0, 0.0, 24.0));
        let desired = Goal::new(GoalKind::Roam).desired_world_state(&curr, &config).unwrap();

        let mut arrived = WorldState::new();
        arrived.set_origin(OriginVarName::BotOrigin, Vec3::new(420.0, 0.0, 24.0));
        assert!(desired.is_satisfied_by(&arrived));
        assert!(Goal::new(GoalKind::Roam).desired_world_state(&WorldState::new(), &config).is_none());
    }
}
