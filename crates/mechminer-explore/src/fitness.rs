//! Converts exploration results into a scalar fitness.

use mechminer_core::{Environment, ExplorationConfig};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::warn;

use crate::engine::{ExplorationResult, ExploreError, GoExplore};

/// Fitness assigned to every failed or unsuccessful evaluation.
///
/// Strictly positive so roulette selection keeps some mass on every candidate.
pub const FITNESS_FLOOR: f64 = 1e-6;

/// Fraction of the level interior covered by archived cells.
///
/// Runs that never reached a terminal state, or levels with no interior,
/// score [`FITNESS_FLOOR`].
#[must_use]
pub fn fitness_from_result(result: &ExplorationResult, interior_size: usize) -> f64 {
    if !result.reached_terminal() || interior_size == 0 {
        return FITNESS_FLOOR;
    }
    let coverage = result.archive.len() as f64 / interior_size as f64;
    coverage.clamp(FITNESS_FLOOR, 1.0)
}

/// Cached outcome of evaluating one candidate.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub fitness: f64,
    /// Absent when the evaluation failed before exploring.
    pub result: Option<ExplorationResult>,
}

impl Evaluation {
    #[must_use]
    pub fn failed() -> Self {
        Self {
            fitness: FITNESS_FLOOR,
            result: None,
        }
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.result.as_ref().map_or(0, |result| result.total_steps)
    }
}

/// Runs exploration on configured environments and scores the outcome.
#[derive(Debug, Clone)]
pub struct FitnessOracle {
    config: ExplorationConfig,
    cancel: Arc<AtomicBool>,
}

impl FitnessOracle {
    #[must_use]
    pub fn new(config: ExplorationConfig, cancel: Arc<AtomicBool>) -> Self {
        Self { config, cancel }
    }

    #[must_use]
    pub fn config(&self) -> &ExplorationConfig {
        &self.config
    }

    /// Explore `env` with an engine seeded by `seed`.
    ///
    /// Failures never propagate; they collapse to [`FITNESS_FLOOR`].
    pub fn evaluate(&self, env: &mut dyn Environment, seed: u64) -> Evaluation {
        let engine =
            GoExplore::with_cancellation(self.config.clone(), seed, Arc::clone(&self.cancel));
        match engine.run(env) {
            Ok(result) => {
                let fitness = fitness_from_result(&result, env.level_interior_size());
                Evaluation {
                    fitness,
                    result: Some(result),
                }
            }
            Err(ExploreError::Cancelled) => Evaluation::failed(),
            Err(error) => {
                warn!(%error, "exploration failed");
                Evaluation::failed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mechminer_archive::{Cell, CellArchive};
    use mechminer_core::{Action, GridPosition, StepResult};

    fn archive_with(cells: i32) -> CellArchive {
        let mut archive = CellArchive::new(1e-6);
        for x in 0..cells {
            let step = StepResult {
                action: Action(0),
                position: GridPosition::new(x % 10, x / 10),
                reward: 0.5,
                is_terminal: false,
                can_repeat: true,
                iteration: 0,
            };
            archive.upsert(Cell::from_trajectory(&[step]).expect("cell"));
        }
        archive
    }

    #[test]
    fn forty_cells_in_ten_by_ten_interior_scores_point_four() {
        let result = ExplorationResult {
            archive: archive_with(40),
            terminal_attempts: Some(12),
            ..ExplorationResult::default()
        };
        assert!((fitness_from_result(&result, 100) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn never_terminal_scores_floor() {
        let result = ExplorationResult {
            archive: archive_with(40),
            terminal_attempts: None,
            ..ExplorationResult::default()
        };
        assert_eq!(fitness_from_result(&result, 100), FITNESS_FLOOR);
    }

    #[test]
    fn coverage_is_clamped() {
        let result = ExplorationResult {
            archive: archive_with(30),
            terminal_attempts: Some(1),
            ..ExplorationResult::default()
        };
        assert_eq!(fitness_from_result(&result, 10), 1.0);
        assert_eq!(fitness_from_result(&result, 0), FITNESS_FLOOR);
    }
}
