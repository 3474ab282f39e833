#![allow(dead_code)]

use mechminer_core::{
    Action, Environment, FieldDescriptor, FieldValue, Genotype, GenotypeError, GridPosition,
    StepOutcome, TargetCatalog,
};
use std::collections::HashMap;

pub const LEFT: Action = Action(0);
pub const RIGHT: Action = Action(1);
pub const IDLE: Action = Action(2);

/// One-dimensional corridor `0..length` with an exit tile.
pub struct LineEnvironment {
    length: i32,
    exit: Option<i32>,
    interior: usize,
    position: i32,
    /// Positions are shifted by this much after each reset, breaking determinism.
    drift_per_reset: i32,
    resets: i32,
    /// Rewards after a LEFT step are halved, so a tile's reward depends on the path.
    left_penalty: bool,
    /// Lowest and highest reward returned per tile.
    observed: HashMap<i32, (f64, f64)>,
    actions: Vec<Action>,
    catalog: TargetCatalog,
}

impl LineEnvironment {
    pub fn new(length: i32, exit: Option<i32>, interior: usize) -> Self {
        Self {
            length,
            exit,
            interior,
            position: 0,
            drift_per_reset: 0,
            resets: 0,
            left_penalty: false,
            observed: HashMap::new(),
            actions: vec![LEFT, RIGHT, IDLE],
            catalog: TargetCatalog::new(vec![FieldDescriptor::new(
                "walker",
                "Mover",
                "stride",
                FieldValue::Number(1.0),
            )]),
        }
    }

    pub fn drifting(mut self, drift_per_reset: i32) -> Self {
        self.drift_per_reset = drift_per_reset;
        self
    }

    pub fn penalizing_left(mut self) -> Self {
        self.left_penalty = true;
        self
    }

    /// `(lowest, highest)` reward handed out at tile `x` so far.
    pub fn observed_rewards(&self, x: i32) -> Option<(f64, f64)> {
        self.observed.get(&x).copied()
    }

    pub fn reward_at(&self, x: i32) -> f64 {
        match self.exit {
            Some(exit) => 1.0 / (1.0 + f64::from((exit - x).abs())),
            None => 1.0 / (1.0 + f64::from(self.length - x)),
        }
    }
}

impl Environment for LineEnvironment {
    fn reset(&mut self) {
        self.position = (self.resets * self.drift_per_reset).rem_euclid(self.length);
        self.resets += 1;
    }

    fn step(&mut self, action: Action, _iteration: u32) -> StepOutcome {
        let delta = match action {
            LEFT => -1,
            RIGHT => 1,
            _ => 0,
        };
        self.position = (self.position + delta).clamp(0, self.length - 1);
        let mut reward = self.reward_at(self.position);
        if self.left_penalty && action == LEFT {
            reward *= 0.5;
        }
        let seen = self.observed.entry(self.position).or_insert((reward, reward));
        seen.0 = seen.0.min(reward);
        seen.1 = seen.1.max(reward);
        StepOutcome {
            position: GridPosition::new(self.position, 0),
            reward,
            is_terminal: self.exit == Some(self.position),
            can_repeat: true,
        }
    }

    fn teleport_to(&mut self, position: GridPosition) {
        self.position = position.x.clamp(0, self.length - 1);
    }

    fn current_position(&self) -> GridPosition {
        GridPosition::new(self.position, 0)
    }

    fn action_space(&self) -> &[Action] {
        &self.actions
    }

    fn idle_action(&self) -> Action {
        IDLE
    }

    fn level_interior_size(&self) -> usize {
        self.interior
    }

    fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    fn apply_genotype(&mut self, genotype: &Genotype) -> Result<(), GenotypeError> {
        mechminer_core::replay_genotype(&self.catalog, genotype).map(|_| ())
    }
}
