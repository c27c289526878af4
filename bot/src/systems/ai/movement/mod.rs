// tactical_bot_core/bot/src/systems/ai/movement/mod.rs
//! Frame-stepped movement prediction: bunnying actions are simulated ahead,
//! checked step by step and rolled back to a savepoint on rejection.
pub mod action;
pub mod bunnying;
pub mod context;
pub mod fallback;
pub mod module;
pub mod physics;
pub mod reach_chain;
pub mod trace_cache;

pub use action::{MovementActionKind, MovementActions};
pub use context::{MovementEnv, MovementFacts, MovementPredictionContext, PredictedFrame, SequenceStopReason};
pub use module::{BotMovementModule, MovementSource};
pub use physics::{FrameEvents, PlayerMovePredictor, PlayerMoveState, SimplePmove};
