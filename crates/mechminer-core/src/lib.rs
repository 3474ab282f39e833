//! Core types shared across the MechMiner workspace.

pub mod capability;
pub mod genotype;

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

pub use capability::{
    FieldDescriptor, FieldValue, ModifierKind, Rect, TargetCatalog, UnknownModifier, ValueKind,
};
pub use genotype::{
    Genotype, GenotypeError, Locus, Pick, replay_genotype, sample_genotype, select_modifier,
    select_target_component, select_target_field, select_target_object, target_kind,
};

/// Rewards are rounded to this precision before hashing step results.
const REWARD_HASH_SCALE: f64 = 1_000.0;

/// Discretized agent position used as the archive key.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in tiles.
    #[must_use]
    pub fn distance(self, other: GridPosition) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Opaque action identifier drawn from an environment's action space.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Action(pub u8);

/// Raw result of one environment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub position: GridPosition,
    /// Progress-toward-goal proxy for the resulting position.
    pub reward: f64,
    pub is_terminal: bool,
    /// False for actions whose repetition would undo them (e.g. toggles).
    pub can_repeat: bool,
}

/// Step recorded in a trajectory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub action: Action,
    pub position: GridPosition,
    pub reward: f64,
    pub is_terminal: bool,
    pub can_repeat: bool,
    pub iteration: u32,
}

impl StepResult {
    #[must_use]
    pub fn from_outcome(action: Action, iteration: u32, outcome: StepOutcome) -> Self {
        Self {
            action,
            position: outcome.position,
            reward: outcome.reward,
            is_terminal: outcome.is_terminal,
            can_repeat: outcome.can_repeat,
            iteration,
        }
    }

    fn rounded_reward(&self) -> i64 {
        (self.reward * REWARD_HASH_SCALE).round() as i64
    }

    /// Hash over `(position, action, rounded reward)`; equal for repeated no-progress steps.
    #[must_use]
    pub fn stuck_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for StepResult {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.position.hash(state);
        self.action.hash(state);
        self.rounded_reward().hash(state);
    }
}

/// Ordered steps from level start.
pub type Trajectory = Vec<StepResult>;

/// Errors raised by environment hosts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    /// The host could not build a simulation instance.
    #[error("failed to construct environment: {0}")]
    Construction(String),
}

/// One simulated level instance driven by the search core.
///
/// Implementations must be deterministic: `reset` followed by the same action
/// sequence always reaches the same positions.
pub trait Environment: Send {
    /// Return the agent to the level entry and restore default field values.
    fn reset(&mut self);

    /// Execute `action`; may block for a bounded time while the agent settles.
    fn step(&mut self, action: Action, iteration: u32) -> StepOutcome;

    /// Move the agent directly to `position`.
    fn teleport_to(&mut self, position: GridPosition);

    fn current_position(&self) -> GridPosition;

    /// Fixed, finite set of actions.
    fn action_space(&self) -> &[Action];

    /// Action that leaves the agent in place; used to read the start reward.
    fn idle_action(&self) -> Action;

    /// Number of traversable interior tiles used to normalize fitness.
    fn level_interior_size(&self) -> usize;

    /// Editable fields published by this instance.
    fn catalog(&self) -> &TargetCatalog;

    /// Configure the mechanic described by `genotype`.
    fn apply_genotype(&mut self, genotype: &Genotype) -> Result<(), GenotypeError>;
}

/// Builds isolated environment instances for chromosomes.
pub trait EnvironmentFactory: Send + Sync {
    fn build(&self, seed: u64) -> Result<Box<dyn Environment>, EnvironmentError>;

    /// Catalog captured once at configuration time.
    fn catalog(&self) -> &TargetCatalog;
}

/// Errors raised when validating configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Parameters of one exploration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Restore→rollout cycles per evaluation.
    pub max_attempts: u32,
    /// Steps appended per rollout before it is cut off.
    pub max_rollout_length: u32,
    /// Probability of switching action on any step.
    pub exploration_noise: f64,
    /// Rewards closer than this are considered equal when comparing cells.
    pub reward_epsilon: f64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            max_rollout_length: 20,
            exploration_noise: 0.05,
            reward_epsilon: 1e-6,
        }
    }
}

/// Parameters of the evolutionary search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvolutionConfig {
    pub min_population: usize,
    pub max_population: usize,
    /// Generation cap.
    pub max_generations: u32,
    /// Generations without improvement before stopping; 0 disables.
    pub stagnation_window: u32,
    pub stagnation_tolerance: f64,
    /// Stop once the best fitness reaches this value.
    pub fitness_threshold: f64,
    pub elite_fraction: f64,
    pub fresh_fraction: f64,
    pub crossover_probability: f64,
    /// Probability that a locus keeps its own parent's gene during crossover.
    pub mix_probability: f64,
    pub mutation_probability: f64,
    pub min_workers: usize,
    pub max_workers: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            min_population: 20,
            max_population: 20,
            max_generations: 15,
            stagnation_window: 5,
            stagnation_tolerance: 1e-9,
            fitness_threshold: 1.0,
            elite_fraction: 0.1,
            fresh_fraction: 0.1,
            crossover_probability: 0.75,
            mix_probability: 0.5,
            mutation_probability: 0.1,
            min_workers: 1,
            max_workers: 8,
        }
    }
}

/// Top-level configuration for a mining run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MinerConfig {
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    pub exploration: ExplorationConfig,
    pub evolution: EvolutionConfig,
}

fn unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl MinerConfig {
    /// Check every parameter for usable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let exploration = &self.exploration;
        if exploration.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig("max_attempts must be positive"));
        }
        if exploration.max_rollout_length == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_rollout_length must be positive",
            ));
        }
        if !unit_interval(exploration.exploration_noise) {
            return Err(ConfigError::InvalidConfig(
                "exploration_noise must be within [0, 1]",
            ));
        }
        if !(exploration.reward_epsilon >= 0.0) {
            return Err(ConfigError::InvalidConfig(
                "reward_epsilon must be non-negative",
            ));
        }

        let evolution = &self.evolution;
        if evolution.min_population < 2 {
            return Err(ConfigError::InvalidConfig(
                "min_population must be at least 2",
            ));
        }
        if evolution.max_population < evolution.min_population {
            return Err(ConfigError::InvalidConfig(
                "max_population must be >= min_population",
            ));
        }
        if evolution.max_generations == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_generations must be positive",
            ));
        }
        for (value, message) in [
            (evolution.elite_fraction, "elite_fraction must be within [0, 1]"),
            (evolution.fresh_fraction, "fresh_fraction must be within [0, 1]"),
            (
                evolution.crossover_probability,
                "crossover_probability must be within [0, 1]",
            ),
            (evolution.mix_probability, "mix_probability must be within [0, 1]"),
            (
                evolution.mutation_probability,
                "mutation_probability must be within [0, 1]",
            ),
        ] {
            if !unit_interval(value) {
                return Err(ConfigError::InvalidConfig(message));
            }
        }
        if evolution.elite_fraction + evolution.fresh_fraction > 1.0 {
            return Err(ConfigError::InvalidConfig(
                "elite_fraction + fresh_fraction must not exceed 1",
            ));
        }
        if evolution.min_workers == 0 || evolution.max_workers < evolution.min_workers {
            return Err(ConfigError::InvalidConfig(
                "worker bounds must satisfy 1 <= min_workers <= max_workers",
            ));
        }
        Ok(())
    }

    /// Seed used for the run; a fixed default when none is configured.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.rng_seed.unwrap_or(0x5EED_7A61_C0DE_0001)
    }

    /// Deterministic RNG derived from the configured seed.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.seed())
    }
}

/// Flat per-chromosome, per-generation record handed to persistence sinks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRecord {
    pub generation: u32,
    pub lineage_id: String,
    pub id: String,
    pub hash: u64,
    pub fitness: f64,
    pub object_id: Option<String>,
    pub component_id: Option<String>,
    pub field_id: Option<String>,
    pub modifier: Option<String>,
    pub value_kind: Option<String>,
    pub step_count: u64,
    pub archive_len: usize,
    /// JSON array of archived cells.
    pub archive_json: String,
    /// JSON array of trajectories that reached a terminal state.
    pub terminal_trajectories_json: String,
}

/// Persistence sink invoked once per evaluated generation.
pub trait GenerationSink: Send {
    fn on_generation(&mut self, records: &[GenerationRecord]);
}

/// No-op persistence sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl GenerationSink for NullSink {
    fn on_generation(&mut self, _records: &[GenerationRecord]) {}
}
