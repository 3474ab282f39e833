//! Archive-driven exploration of a single configured environment.

use mechminer_archive::{ArchiveError, Cell, CellArchive};
use mechminer_core::{Action, Environment, ExplorationConfig, StepResult, Trajectory};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that abort an exploration run.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ExploreError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// The shared cancellation flag was raised mid-run.
    #[error("exploration cancelled")]
    Cancelled,
}

/// Lifecycle of one exploration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplorePhase {
    #[default]
    Init,
    Restore,
    Rollout,
    Done,
}

/// Everything an exploration run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExplorationResult {
    pub archive: CellArchive,
    /// Every environment step taken, including initialization and replays.
    pub total_steps: u64,
    /// Number of rollouts that reached a terminal state; `None` if none did.
    pub terminal_attempts: Option<u32>,
    pub terminal_trajectories: Vec<Trajectory>,
    /// Restores that did not land on the archived position.
    pub replay_mismatches: u32,
}

impl ExplorationResult {
    #[must_use]
    pub fn reached_terminal(&self) -> bool {
        self.terminal_attempts.is_some()
    }
}

/// Go-Explore engine: restore a promising cell, then roll out a sticky random policy.
#[derive(Debug)]
pub struct GoExplore {
    config: ExplorationConfig,
    rng: SmallRng,
    cancel: Arc<AtomicBool>,
    phase: ExplorePhase,
    result: ExplorationResult,
}

impl GoExplore {
    #[must_use]
    pub fn new(config: ExplorationConfig, seed: u64) -> Self {
        Self::with_cancellation(config, seed, Arc::new(AtomicBool::new(false)))
    }

    /// Engine that aborts as soon as `cancel` is set.
    #[must_use]
    pub fn with_cancellation(
        config: ExplorationConfig,
        seed: u64,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let archive = CellArchive::new(config.reward_epsilon);
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
            cancel,
            phase: ExplorePhase::Init,
            result: ExplorationResult {
                archive,
                ..ExplorationResult::default()
            },
        }
    }

    #[must_use]
    pub fn phase(&self) -> ExplorePhase {
        self.phase
    }

    fn check_cancelled(&self) -> Result<(), ExploreError> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(ExploreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run the full attempt budget against `env` and hand back the results.
    pub fn run(mut self, env: &mut dyn Environment) -> Result<ExplorationResult, ExploreError> {
        self.initialize(env)?;
        for _ in 0..self.config.max_attempts {
            self.check_cancelled()?;
            self.phase = ExplorePhase::Restore;
            let trajectory = self.restore(env)?;
            self.phase = ExplorePhase::Rollout;
            self.rollout(env, trajectory)?;
        }
        self.phase = ExplorePhase::Done;
        debug!(
            cells = self.result.archive.len(),
            steps = self.result.total_steps,
            terminal = ?self.result.terminal_attempts,
            "exploration finished"
        );
        Ok(self.result)
    }

    fn step(&mut self, env: &mut dyn Environment, action: Action, iteration: u32) -> StepResult {
        let outcome = env.step(action, iteration);
        self.result.total_steps += 1;
        StepResult::from_outcome(action, iteration, outcome)
    }

    fn initialize(&mut self, env: &mut dyn Environment) -> Result<(), ExploreError> {
        self.check_cancelled()?;
        env.reset();
        let idle = env.idle_action();
        let start = self.step(env, idle, 0);
        if let Some(cell) = Cell::from_trajectory(&[start]) {
            self.result.archive.upsert(cell);
        }
        self.result.archive.visit(start.position);
        Ok(())
    }

    /// Select a cell, reset the environment and replay the cell's trajectory.
    fn restore(&mut self, env: &mut dyn Environment) -> Result<Trajectory, ExploreError> {
        let archive = &mut self.result.archive;
        let position = archive.select_weighted(&mut self.rng)?;
        archive.choose(position);
        let trajectory = archive
            .get(position)
            .map(|cell| cell.trajectory.clone())
            .ok_or(ArchiveError::Degenerate)?;

        env.reset();
        for recorded in &trajectory {
            self.check_cancelled()?;
            self.step(env, recorded.action, recorded.iteration);
        }

        let reached = env.current_position();
        if reached != position {
            self.result.replay_mismatches += 1;
            warn!(
                expected = %position,
                reached = %reached,
                steps = trajectory.len(),
                "replay diverged from archived trajectory"
            );
        } else {
            debug!(cell = %position, steps = trajectory.len(), "restored cell");
        }
        Ok(trajectory)
    }

    fn should_switch(&mut self, last: &StepResult, previous_hash: Option<u64>) -> bool {
        let noisy = self.rng.random::<f64>() < self.config.exploration_noise;
        let forced = !last.can_repeat
            || last.reward <= 0.0
            || previous_hash == Some(last.stuck_hash());
        forced || noisy
    }

    fn switch_action(&mut self, env: &dyn Environment, current: Action) -> Action {
        let alternatives: Vec<Action> = env
            .action_space()
            .iter()
            .copied()
            .filter(|action| *action != current)
            .collect();
        if alternatives.is_empty() {
            current
        } else {
            alternatives[self.rng.random_range(0..alternatives.len())]
        }
    }

    fn rollout(
        &mut self,
        env: &mut dyn Environment,
        mut working: Trajectory,
    ) -> Result<(), ExploreError> {
        let Some(mut last) = working.last().copied() else {
            return Ok(());
        };
        // Cells that already end at a terminal state have nothing left to explore.
        if last.is_terminal {
            return Ok(());
        }
        let mut previous_hash = working
            .len()
            .checked_sub(2)
            .map(|index| working[index].stuck_hash());
        let mut action = last.action;

        for _ in 0..self.config.max_rollout_length {
            self.check_cancelled()?;
            if self.should_switch(&last, previous_hash) {
                action = self.switch_action(env, action);
            }
            let iteration = u32::try_from(working.len()).unwrap_or(u32::MAX);
            let result = self.step(env, action, iteration);
            working.push(result);

            let archive = &mut self.result.archive;
            if let Some(cell) = Cell::from_trajectory(&working) {
                archive.upsert(cell);
            }
            archive.visit(result.position);

            previous_hash = Some(last.stuck_hash());
            last = result;
            if result.is_terminal {
                *self.result.terminal_attempts.get_or_insert(0) += 1;
                self.result.terminal_trajectories.push(working);
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explore_error_wraps_archive_error() {
        let error: ExploreError = ArchiveError::Degenerate.into();
        assert_eq!(error, ExploreError::Archive(ArchiveError::Degenerate));
        assert_eq!(ExploreError::Cancelled.to_string(), "exploration cancelled");
    }

    #[test]
    fn fresh_engine_starts_in_init() {
        let engine = GoExplore::new(ExplorationConfig::default(), 3);
        assert_eq!(engine.phase(), ExplorePhase::Init);
    }
}
