//! Position-keyed cell archive used by the exploration engine.
//!
//! Each cell remembers the best known trajectory reaching one grid position
//! together with visit counters that drive count-based novelty scoring.

use mechminer_core::{GridPosition, StepResult, Trajectory};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors emitted by archive operations.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ArchiveError {
    /// Selection was requested from an archive with no cells.
    #[error("cannot select from an empty archive")]
    Degenerate,
}

/// Weight and exponent of one visit counter in the novelty score.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CounterWeight {
    weight: f64,
    power: f64,
}

const SEEN_WEIGHT: CounterWeight = CounterWeight {
    weight: 0.3,
    power: 0.5,
};
const CHOSEN_WEIGHT: CounterWeight = CounterWeight {
    weight: 0.1,
    power: 0.5,
};
const CHOSEN_SINCE_NEW_WEIGHT: CounterWeight = CounterWeight {
    weight: 0.0,
    power: 0.5,
};
const COUNT_EPSILON: f64 = 0.001;
const POWER_EPSILON: f64 = 0.000_01;

/// Visit statistics for a cell.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitCounters {
    pub times_seen: u32,
    pub times_chosen: u32,
    pub times_chosen_since_new: u32,
}

impl VisitCounters {
    fn term(count: u32, weight: CounterWeight) -> f64 {
        weight.weight / (f64::from(count) + COUNT_EPSILON).powf(weight.power + POWER_EPSILON)
    }

    /// Count-based novelty score; rarely seen or chosen cells score higher.
    #[must_use]
    pub fn score(&self) -> f64 {
        1.0 + Self::term(self.times_seen, SEEN_WEIGHT)
            + Self::term(self.times_chosen, CHOSEN_WEIGHT)
            + Self::term(self.times_chosen_since_new, CHOSEN_SINCE_NEW_WEIGHT)
    }
}

/// Best known way to reach one grid position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cell {
    pub position: GridPosition,
    pub reward: f64,
    pub trajectory: Trajectory,
    pub counters: VisitCounters,
}

impl Cell {
    /// Fresh cell for the last step of `trajectory`; `None` for an empty trajectory.
    #[must_use]
    pub fn from_trajectory(trajectory: &[StepResult]) -> Option<Self> {
        let last = trajectory.last()?;
        Some(Self {
            position: last.position,
            reward: last.reward,
            trajectory: trajectory.to_vec(),
            counters: VisitCounters::default(),
        })
    }

    /// Whether `self` should replace `incumbent` at the same position.
    ///
    /// Rewards within `epsilon` tie and the shorter trajectory wins; otherwise
    /// only a strictly greater reward wins.
    #[must_use]
    pub fn is_better_than(&self, incumbent: &Cell, epsilon: f64) -> bool {
        if (self.reward - incumbent.reward).abs() < epsilon {
            self.trajectory.len() < incumbent.trajectory.len()
        } else {
            self.reward > incumbent.reward
        }
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.counters.score()
    }
}

/// Outcome of [`CellArchive::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
    Kept,
}

/// Insertion-ordered map from grid position to [`Cell`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Cell>", into = "Vec<Cell>")]
pub struct CellArchive {
    cells: Vec<Cell>,
    slots: HashMap<GridPosition, usize>,
    reward_epsilon: f64,
}

impl From<Vec<Cell>> for CellArchive {
    fn from(cells: Vec<Cell>) -> Self {
        let mut archive = CellArchive::new(0.0);
        for cell in cells {
            archive.upsert(cell);
        }
        archive
    }
}

impl From<CellArchive> for Vec<Cell> {
    fn from(archive: CellArchive) -> Self {
        archive.cells
    }
}

impl CellArchive {
    /// Empty archive; rewards closer than `reward_epsilon` are treated as equal.
    #[must_use]
    pub fn new(reward_epsilon: f64) -> Self {
        Self {
            cells: Vec::new(),
            slots: HashMap::new(),
            reward_epsilon,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells in insertion order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[must_use]
    pub fn get(&self, position: GridPosition) -> Option<&Cell> {
        self.slots.get(&position).map(|&slot| &self.cells[slot])
    }

    /// Insert `candidate`, or replace the incumbent at its position if the candidate is better.
    ///
    /// A replacement keeps the incumbent's `times_seen` and `times_chosen` and
    /// restarts `times_chosen_since_new`.
    pub fn upsert(&mut self, mut candidate: Cell) -> Upsert {
        match self.slots.get(&candidate.position).copied() {
            None => {
                self.slots.insert(candidate.position, self.cells.len());
                self.cells.push(candidate);
                Upsert::Inserted
            }
            Some(slot) => {
                let incumbent = &mut self.cells[slot];
                if !candidate.is_better_than(incumbent, self.reward_epsilon) {
                    return Upsert::Kept;
                }
                candidate.counters = VisitCounters {
                    times_seen: incumbent.counters.times_seen,
                    times_chosen: incumbent.counters.times_chosen,
                    times_chosen_since_new: 0,
                };
                *incumbent = candidate;
                Upsert::Replaced
            }
        }
    }

    /// Record that the agent passed through `position`.
    pub fn visit(&mut self, position: GridPosition) {
        if let Some(cell) = self.cell_mut(position) {
            cell.counters.times_seen = cell.counters.times_seen.saturating_add(1);
        }
    }

    /// Record that `position` was selected as an exploration start.
    pub fn choose(&mut self, position: GridPosition) {
        if let Some(cell) = self.cell_mut(position) {
            let counters = &mut cell.counters;
            counters.times_chosen = counters.times_chosen.saturating_add(1);
            counters.times_chosen_since_new = counters.times_chosen_since_new.saturating_add(1);
        }
    }

    fn cell_mut(&mut self, position: GridPosition) -> Option<&mut Cell> {
        let slot = *self.slots.get(&position)?;
        self.cells.get_mut(slot)
    }

    /// Roulette-wheel draw proportional to cell scores.
    ///
    /// A single-cell archive returns that cell without touching `rng`.
    pub fn select_weighted(&self, rng: &mut dyn RngCore) -> Result<GridPosition, ArchiveError> {
        let (first, rest) = self.cells.split_first().ok_or(ArchiveError::Degenerate)?;
        if rest.is_empty() {
            return Ok(first.position);
        }
        let scores: Vec<f64> = self.cells.iter().map(Cell::score).collect();
        let total: f64 = scores.iter().sum();
        let threshold = rng.random::<f64>() * total;
        let mut cumulative = 0.0;
        for (cell, score) in self.cells.iter().zip(&scores) {
            cumulative += score;
            if cumulative > threshold {
                return Ok(cell.position);
            }
        }
        Ok(self.cells[self.cells.len() - 1].position)
    }

    /// Largest reward held by any cell.
    #[must_use]
    pub fn max_reward(&self) -> Option<f64> {
        self.cells
            .iter()
            .map(|cell| cell.reward)
            .reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mechminer_core::Action;

    fn step(x: i32, reward: f64) -> StepResult {
        StepResult {
            action: Action(1),
            position: GridPosition::new(x, 0),
            reward,
            is_terminal: false,
            can_repeat: true,
            iteration: 0,
        }
    }

    fn cell(x: i32, reward: f64, len: usize) -> Cell {
        let trajectory: Trajectory = (0..len).map(|_| step(x, reward)).collect();
        Cell::from_trajectory(&trajectory).expect("non-empty trajectory")
    }

    #[test]
    fn score_decreases_with_visits() {
        let fresh = VisitCounters::default();
        let seen = VisitCounters {
            times_seen: 10,
            ..VisitCounters::default()
        };
        assert!(fresh.score() > seen.score());
        assert!(seen.score() > 1.0);
    }

    #[test]
    fn greater_reward_replaces_and_keeps_counters() {
        let mut archive = CellArchive::new(1e-6);
        assert_eq!(archive.upsert(cell(2, 0.2, 3)), Upsert::Inserted);
        archive.visit(GridPosition::new(2, 0));
        archive.choose(GridPosition::new(2, 0));

        assert_eq!(archive.upsert(cell(2, 0.5, 8)), Upsert::Replaced);
        let incumbent = archive.get(GridPosition::new(2, 0)).expect("cell");
        assert_eq!(incumbent.reward, 0.5);
        assert_eq!(incumbent.trajectory.len(), 8);
        assert_eq!(
            incumbent.counters,
            VisitCounters {
                times_seen: 1,
                times_chosen: 1,
                times_chosen_since_new: 0,
            }
        );
    }

    #[test]
    fn tied_reward_prefers_shorter_trajectory() {
        let mut archive = CellArchive::new(1e-6);
        archive.upsert(cell(1, 0.3, 5));
        assert_eq!(archive.upsert(cell(1, 0.3, 7)), Upsert::Kept);
        assert_eq!(archive.upsert(cell(1, 0.3, 5)), Upsert::Kept);
        assert_eq!(archive.upsert(cell(1, 0.3, 2)), Upsert::Replaced);
        assert_eq!(archive.upsert(cell(1, 0.1, 1)), Upsert::Kept);
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn preserves_insertion_order() {
        let mut archive = CellArchive::new(1e-6);
        for x in [5, 1, 3] {
            archive.upsert(cell(x, 0.1, 1));
        }
        archive.upsert(cell(1, 0.9, 1));
        let order: Vec<i32> = archive.cells().iter().map(|cell| cell.position.x).collect();
        assert_eq!(order, vec![5, 1, 3]);
        assert_eq!(archive.max_reward(), Some(0.9));
    }

    #[test]
    fn serializes_as_cell_list() {
        let mut archive = CellArchive::new(1e-6);
        archive.upsert(cell(4, 0.25, 2));
        let json = serde_json::to_string(&archive).expect("serialize");
        assert!(json.starts_with('['));
        let restored: CellArchive = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.cells(), archive.cells());
    }
}
