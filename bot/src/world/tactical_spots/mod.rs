// tactical_bot_core/bot/src/world/tactical_spots/mod.rs
pub mod builder;
pub mod grid;
pub mod precomputed;
pub mod registry;
pub mod solvers;

pub use grid::{SpotsExclusionMask, SpotsGrid};
pub use registry::{SpotsQuery, SpotsQueryScratch, TacticalSpot, TacticalSpotsRegistry};
pub use solvers::{ProblemParams, SpotSolution, SpotsSolverEnv, TacticalSpotsProblemSolver};
