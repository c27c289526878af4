// tactical_bot_core/bot/src/core/mod.rs
pub mod config;
pub mod constants;
pub mod error;
pub mod frame_cache;
pub mod types;
