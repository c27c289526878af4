// tactical_bot_core/bot/src/systems/mod.rs
pub mod ai;
