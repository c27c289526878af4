// tactical_bot_core/bot/src/lib.rs

pub mod core;
pub mod operational;
pub mod systems;
pub mod world;

pub use crate::core::config::BotAiConfig;
pub use crate::core::error::{BotError, BotResult};
pub use crate::systems::ai::{Bot, BotPerception, BotWorld};
