// tactical_bot_core/bot/src/systems/ai/mod.rs
pub mod awareness;
pub mod bot;
pub mod movement;
pub mod planning;
pub mod world_state_builder;

pub use bot::{Bot, BotPerception, BotWorld};
