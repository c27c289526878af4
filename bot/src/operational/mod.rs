// tactical_bot_core/bot/src/operational/mod.rs
pub mod monitoring;
