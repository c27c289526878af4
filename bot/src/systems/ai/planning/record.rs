// tactical_bot_core/bot/src/systems/ai/planning/record.rs
use crate::core::types::*;
use crate::systems::ai::planning::world_state::WorldState;
use crate::systems::ai::planning::BotFacts;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Valid,
    Invalid,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MiscTactics {
    pub prefer_attack_rather_than_run: bool,
    pub will_retreat: bool,
    pub should_keep_crosshair_on_enemy: bool,
}

impl MiscTactics {
    pub fn prefer_attack_rather_than_run(&mut self) {
        self.prefer_attack_rather_than_run = true;
    }

    pub fn prefer_run_rather_than_attack(&mut self) {
        self.prefer_attack_rather_than_run = false;
    }

    pub fn clear(&mut self) {
        *self = MiscTactics::default();
    }
}

/// What the active plan head tells the rest of the bot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionState {
    pub nav_target: Option<NavTarget>,
    pub misc_tactics: MiscTactics,
}

/// The executable counterpart of a planning action, stored in a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRecord {
    RunToNavEntity { entity: NavEntity },
    PickupNavEntity { entity: NavEntity },
    FleeToSpot { spot: NavTarget },
    StartRunningAway,
    StartGotoCover,
    TakeCover { spot: NavTarget },
    AdvanceToGoodPosition { spot: NavTarget },
    AttackFromCurrentPosition { enemy_origin: Vec3 },
    DodgeToSpot { spot: NavTarget },
    RoamToSpot { spot: NavTarget },
}

fn entity_nav_target(entity: &NavEntity) -> NavTarget {
    NavTarget { origin: entity.origin, area_num: entity.area_num, is_entity: true }
}

impl ActionRecord {
    pub fn name(&self) -> &'static str {
        match self {
            ActionRecord::RunToNavEntity { .. } => "RunToNavEntity",
            ActionRecord::PickupNavEntity { .. } => "PickupNavEntity",
            ActionRecord::FleeToSpot { .. } => "FleeToSpot",
            ActionRecord::StartRunningAway => "StartRunningAway",
            ActionRecord::StartGotoCover => "StartGotoCover",
            ActionRecord::TakeCover { .. } => "TakeCover",
            ActionRecord::AdvanceToGoodPosition { .. } => "AdvanceToGoodPosition",
            ActionRecord::AttackFromCurrentPosition { .. } => "AttackFromCurrentPosition",
            ActionRecord::DodgeToSpot { .. } => "DodgeToSpot",
            ActionRecord::RoamToSpot { .. } => "RoamToSpot",
        }
    }

    /// Called when the record becomes the plan head.
    pub fn activate(&self, exec: &mut ExecutionState) {
        debug!("Activating {}", self.name());
        match self {
            ActionRecord::RunToNavEntity { entity } | ActionRecord::PickupNavEntity { entity } => {
                exec.nav_target = Some(entity_nav_target(entity));
            }
            ActionRecord::FleeToSpot { spot } => {
                exec.misc_tactics.prefer_attack_rather_than_run();
                exec.nav_target = Some(*spot);
            }
            ActionRecord::StartRunningAway | ActionRecord::StartGotoCover => {
                exec.misc_tactics.will_retreat = true;
                exec.misc_tactics.prefer_run_rather_than_attack();
            }
            ActionRecord::TakeCover { spot } => {
                exec.misc_tactics.will_retreat = true;
                exec.nav_target = Some(*spot);
            }
            ActionRecord::AdvanceToGoodPosition { spot } => {
                exec.misc_tactics.prefer_attack_rather_than_run();
                exec.nav_target = Some(*spot);
            }
            ActionRecord::AttackFromCurrentPosition { .. } => {
                exec.misc_tactics.prefer_attack_rather_than_run();
                exec.misc_tactics.should_keep_crosshair_on_enemy = true;
                exec.nav_target = None;
            }
            ActionRecord::DodgeToSpot { spot } | ActionRecord::RoamToSpot { spot } => {
                exec.nav_target = Some(*spot);
            }
        }
    }

    pub fn deactivate(&self, exec: &mut ExecutionState) {
        debug!("Deactivating {}", self.name());
        exec.nav_target = None;
        exec.misc_tactics.clear();
    }

    fn spot_reached(spot: &NavTarget, facts: &BotFacts) -> bool {
        spot.origin.distance(facts.origin) <= facts.goal_pickup_action_radius
    }

    /// Checks the record against the current situation. May adjust tactics as a side effect.
    pub fn check_status(&self, _curr_world_state: &WorldState, facts: &BotFacts, exec: &mut ExecutionState) -> RecordStatus {
        match self {
            ActionRecord::RunToNavEntity { entity } => {
                if facts.selected_nav_entity.map(|e| e.id) != Some(entity.id) {
                    return RecordStatus::Invalid;
                }
                if entity.origin.distance(facts.origin) <= facts.goal_pickup_action_radius {
                    return RecordStatus::Completed;
                }
                RecordStatus::Valid
            }
            ActionRecord::PickupNavEntity { entity } => {
                // The item selector drops the entity once it has been picked up
                if facts.selected_nav_entity.map(|e| e.id) != Some(entity.id) {
                    return RecordStatus::Completed;
                }
                if entity.origin.distance(facts.origin) > 2.0 * facts.goal_pickup_action_radius {
                    return RecordStatus::Invalid;
                }
                RecordStatus::Valid
            }
            ActionRecord::FleeToSpot { spot } => {
                if facts.enemies_valid && facts.could_be_hit_if_bot_turns {
                    exec.misc_tactics.prefer_attack_rather_than_run();
                } else {
                    exec.misc_tactics.prefer_run_rather_than_attack();
                }
                // Gets invalidated on goal reevaluation
                if Self::spot_reached(spot, facts) {
                    return RecordStatus::Completed;
                }
                RecordStatus::Valid
            }
            ActionRecord::StartRunningAway | ActionRecord::StartGotoCover => RecordStatus::Completed,
            ActionRecord::TakeCover { spot } | ActionRecord::AdvanceToGoodPosition { spot } => {
                if !facts.enemies_valid {
                    return RecordStatus::Invalid;
                }
                if Self::spot_reached(spot, facts) {
                    return RecordStatus::Completed;
                }
                RecordStatus::Valid
            }
            ActionRecord::AttackFromCurrentPosition { .. } => {
                if !facts.enemies_valid {
                    return RecordStatus::Completed;
                }
                if !facts.could_be_hit_if_bot_turns {
                    return RecordStatus::Invalid;
                }
                RecordStatus::Valid
            }
            ActionRecord::DodgeToSpot { spot } => {
                if facts.hazard.is_none() || Self::spot_reached(spot, facts) {
                    return RecordStatus::Completed;
                }
                RecordStatus::Valid
            }
            ActionRecord::RoamToSpot { spot } => {
                if Self::spot_reached(spot, facts) {
                    return RecordStatus::Completed;
                }
                RecordStatus::Valid
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts_at(origin: Vec3) -> BotFacts {
        BotFacts { origin, ..BotFacts::default() }
    }

    #[test]
    fn flee_record_sets_nav_target_and_completes_near_spot() {
        let spot = NavTarget { origin: Vec3::new(300.0, 0.0, 24.0), area_num: 3, is_entity: false };
        let record = ActionRecord::FleeToSpot { spot };
        let mut exec = ExecutionState::default();
        record.activate(&mut exec);
        assert_eq!(exec.nav_target, Some(spot));

        let ws = WorldState::new();
        assert_eq!(record.check_status(&ws, &facts_at(Vec3::new(0.0, 0.0, 24.0)), &mut exec), RecordStatus::Valid);
        // Nobody can be hit, so running is preferred
        assert!(!exec.misc_tactics.prefer_attack_rather_than_run);
        assert_eq!(
            record.check_status(&ws, &facts_at(Vec3::new(280.0, 0.0, 24.0)), &mut exec),
            RecordStatus::Completed
        );

        record.deactivate(&mut exec);
        assert_eq!(exec.nav_target, None);
    }

    #[test]
    fn pickup_completes_when_item_is_gone() {
        let entity = NavEntity { id: 9, origin: Vec3::ZERO, kind: ItemKind::Health, area_num: 1 };
        let record = ActionRecord::PickupNavEntity { entity };
        let mut exec = ExecutionState::default();
        let ws = WorldState::new();
        let mut facts = facts_at(Vec3::ZERO);
        facts.selected_nav_entity = Some(entity);
        assert_eq!(record.check_status(&ws, &facts, &mut exec), RecordStatus::Valid);
        facts.selected_nav_entity = None;
        assert_eq!(record.check_status(&ws, &facts, &mut exec), RecordStatus::Completed);
    }

    #[test]
    fn attack_keeps_crosshair_and_clears_nav_target() {
        let mut exec = ExecutionState {
            nav_target: Some(NavTarget { origin: Vec3::X, area_num: 1, is_entity: false }),
            ..Default::default()
        };
        ActionRecord::AttackFromCurrentPosition { enemy_origin: Vec3::Y }.activate(&mut exec);
        assert_eq!(exec.nav_target, None);
        assert!(exec.misc_tactics.should_keep_crosshair_on_enemy);
    }
}
