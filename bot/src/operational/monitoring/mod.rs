// tactical_bot_core/bot/src/operational/monitoring/mod.rs
pub mod metrics;
