// tactical_bot_core/bot/src/systems/ai/awareness/mod.rs
//! Read-only facts about enemies and hazards supplied by the enemy tracker.
pub mod hazard;
pub mod selected_enemies;

pub use hazard::{Hazard, HazardKind};
pub use selected_enemies::{EnemyFacts, EnemyWeapon, SelectedEnemies};
