//! Evolutionary search over toggleable-mechanic genotypes.
//!
//! Each [`Chromosome`] owns one environment instance while it is evaluated.
//! The [`EvolutionController`] evaluates whole generations on a rayon pool,
//! releases the environments afterwards and breeds the next generation with
//! elitism, roulette selection, gated crossover and mutation.

pub mod chromosome;
pub mod controller;
pub mod operators;

pub use chromosome::Chromosome;
pub use controller::{
    ControllerError, EvolutionController, EvolutionReport, GenerationSummary, Population,
    TerminationReason,
};
pub use operators::{
    FRESH_SAMPLE_ATTEMPTS, Mutation, crossover, maybe_mutate, mutate_genotype, next_generation,
    roulette_select, slice_len, sort_by_fitness,
};
