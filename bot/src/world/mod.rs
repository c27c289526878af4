// tactical_bot_core/bot/src/world/mod.rs
pub mod aas;
pub mod collision;
pub mod map_generator;
pub mod route_cache;
pub mod tactical_spots;
