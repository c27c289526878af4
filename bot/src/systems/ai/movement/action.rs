// tactical_bot_core/bot/src/systems/ai/movement/action.rs
use crate::core::config::MovementConfig;
use crate::systems::ai::movement::bunnying::BunnyToNextReachAction;
use crate::systems::ai::movement::context::{MovementFacts, MovementPredictionContext, SequenceStopReason};
use crate::systems::ai::movement::fallback;
use crate::systems::ai::movement::reach_chain::BunnyStraighteningReachChainAction;
use std::fmt;

/// The movement actions a prediction may chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementActionKind {
    BunnyStraighteningReachChain,
    BunnyToNextReach,
    WalkFallback,
}

impl fmt::Display for MovementActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovementActionKind::BunnyStraighteningReachChain => BunnyStraighteningReachChainAction::NAME,
            MovementActionKind::BunnyToNextReach => BunnyToNextReachAction::NAME,
            MovementActionKind::WalkFallback => "WalkFallbackAction",
        };
        f.write_str(name)
    }
}

/// Per-bot state of every movement action, dispatched by kind.
#[derive(Debug, Clone)]
pub struct MovementActions {
    pub straightening: BunnyStraighteningReachChainAction,
    pub to_next_reach: BunnyToNextReachAction,
}

impl MovementActions {
    pub fn new(config: &MovementConfig) -> Self {
        MovementActions {
            straightening: BunnyStraighteningReachChainAction::new(config),
            to_next_reach: BunnyToNextReachAction::new(config),
        }
    }

    pub fn before_planning(&mut self, facts: &MovementFacts, config: &MovementConfig) {
        self.straightening.before_planning(facts, config);
        self.to_next_reach.generic.before_planning();
    }

    pub fn plan_prediction_step(&mut self, kind: MovementActionKind, ctx: &mut MovementPredictionContext) {
        match kind {
            MovementActionKind::BunnyStraighteningReachChain => self.straightening.plan_prediction_step(ctx),
            MovementActionKind::BunnyToNextReach => self.to_next_reach.plan_prediction_step(ctx),
            MovementActionKind::WalkFallback => fallback::plan_prediction_step(ctx),
        }
    }

    pub fn check_prediction_step_results(&mut self, kind: MovementActionKind, ctx: &mut MovementPredictionContext) {
        match kind {
            MovementActionKind::BunnyStraighteningReachChain => self.straightening.generic.check_prediction_step_results(ctx, kind),
            MovementActionKind::BunnyToNextReach => self.to_next_reach.generic.check_prediction_step_results(ctx, kind),
            MovementActionKind::WalkFallback => fallback::check_prediction_step_results(ctx),
        }
    }

    pub fn on_application_sequence_started(&mut self, kind: MovementActionKind, ctx: &mut MovementPredictionContext) {
        match kind {
            MovementActionKind::BunnyStraighteningReachChain => self.straightening.on_application_sequence_started(ctx),
            MovementActionKind::BunnyToNextReach => self.to_next_reach.on_application_sequence_started(ctx),
            MovementActionKind::WalkFallback => ctx.mark_savepoint(ctx.top_of_stack_index()),
        }
    }

    pub fn on_application_sequence_stopped(
        &mut self,
        kind: MovementActionKind,
        ctx: &mut MovementPredictionContext,
        reason: SequenceStopReason,
        stopped_at_frame: usize,
    ) {
        tracing::trace!("{} sequence stopped at frame {}: {:?}", kind, stopped_at_frame, reason);
        match kind {
            MovementActionKind::BunnyStraighteningReachChain => self.straightening.on_application_sequence_stopped(ctx, reason),
            MovementActionKind::BunnyToNextReach => self.to_next_reach.generic.on_application_sequence_stopped(ctx, kind, reason),
            MovementActionKind::WalkFallback => {}
        }
    }
}
