//! Exploration engine and fitness oracle for candidate mechanics.

pub mod engine;
pub mod fitness;

pub use engine::{ExplorationResult, ExploreError, ExplorePhase, GoExplore};
pub use fitness::{Evaluation, FITNESS_FLOOR, FitnessOracle, fitness_from_result};
