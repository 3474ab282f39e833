//! Generation loop: evaluate, record, check termination, breed.

use mechminer_core::{
    ConfigError, EnvironmentFactory, GenerationSink, MinerConfig, NullSink, TargetCatalog,
};
use mechminer_explore::FitnessOracle;
use rand::{RngCore, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info};

use crate::chromosome::Chromosome;
use crate::operators::{next_generation, sort_by_fitness};

/// Errors raised while setting up or running the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    Cancelled,
    FitnessThreshold,
    Stagnation,
    GenerationCap,
}

/// Fitness statistics of one evaluated generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationSummary {
    pub generation: u32,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    /// Best fitness over this and all earlier generations.
    pub best_so_far: f64,
}

/// Final outcome of a run.
#[derive(Debug, Clone)]
pub struct EvolutionReport {
    pub reason: TerminationReason,
    pub generations: u32,
    pub best: Option<Chromosome>,
    pub history: Vec<GenerationSummary>,
}

impl EvolutionReport {
    #[must_use]
    pub fn best_fitness(&self) -> f64 {
        self.best.as_ref().map_or(0.0, Chromosome::fitness)
    }
}

/// The current generation.
#[derive(Debug, Default)]
pub struct Population {
    pub generation: u32,
    pub chromosomes: Vec<Chromosome>,
}

/// Releases every environment of a generation when dropped, including on unwind.
struct GenerationScope<'a> {
    chromosomes: &'a mut [Chromosome],
}

impl Drop for GenerationScope<'_> {
    fn drop(&mut self) {
        for chromosome in self.chromosomes.iter_mut() {
            chromosome.release_environment();
        }
    }
}

/// Seed of the master RNG for `generation`.
fn generation_seed(run_seed: u64, generation: u32) -> u64 {
    run_seed ^ u64::from(generation).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Drives the evolutionary search over mechanic genotypes.
pub struct EvolutionController {
    config: MinerConfig,
    factory: Arc<dyn EnvironmentFactory>,
    oracle: FitnessOracle,
    pool: rayon::ThreadPool,
    cancel: Arc<AtomicBool>,
    sink: Box<dyn GenerationSink>,
    population: Population,
}

impl EvolutionController {
    /// Validate `config` and spin up the evaluation worker pool.
    pub fn new(
        config: MinerConfig,
        factory: Arc<dyn EnvironmentFactory>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        let evolution = &config.evolution;
        let workers = std::thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .clamp(evolution.min_workers, evolution.max_workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("mechminer-eval-{index}"))
            .build()?;
        debug!(workers, "evaluation pool ready");

        let cancel = Arc::new(AtomicBool::new(false));
        let oracle = FitnessOracle::new(config.exploration.clone(), Arc::clone(&cancel));
        Ok(Self {
            config,
            factory,
            oracle,
            pool,
            cancel,
            sink: Box::new(NullSink),
            population: Population::default(),
        })
    }

    /// Route per-generation records to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn GenerationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Shared flag; setting it stops the run at the next check.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn catalog(&self) -> &TargetCatalog {
        self.factory.catalog()
    }

    /// Sample the first generation.
    ///
    /// Up to `max_population` chromosomes with a valid genotype are kept; if
    /// sampling fails too often the population is padded with genotype-free
    /// chromosomes up to `min_population`.
    fn initial_population(&self, rng: &mut dyn RngCore) -> Vec<Chromosome> {
        let evolution = &self.config.evolution;
        let catalog = self.catalog();
        let mut chromosomes = Vec::with_capacity(evolution.max_population);
        let mut failures = Vec::new();
        for _ in 0..evolution.max_population.saturating_mul(4) {
            if chromosomes.len() == evolution.max_population {
                break;
            }
            let chromosome = Chromosome::fresh(catalog, rng);
            if chromosome.genotype.is_some() {
                chromosomes.push(chromosome);
            } else {
                failures.push(chromosome);
            }
        }
        let shortfall = evolution.min_population.saturating_sub(chromosomes.len());
        chromosomes.extend(failures.into_iter().take(shortfall));
        chromosomes
    }

    /// Evaluate every chromosome on the worker pool, then release all environments.
    fn evaluate(&mut self) {
        let factory: &dyn EnvironmentFactory = self.factory.as_ref();
        let oracle = &self.oracle;
        let scope = GenerationScope {
            chromosomes: &mut self.population.chromosomes,
        };
        self.pool.install(|| {
            scope.chromosomes.par_iter_mut().for_each(|chromosome| {
                chromosome.evaluate(factory, oracle);
            });
        });
        drop(scope);
    }

    fn summarize(&self, best_so_far: f64) -> GenerationSummary {
        let chromosomes = &self.population.chromosomes;
        let best_fitness = chromosomes
            .iter()
            .map(Chromosome::fitness)
            .fold(0.0, f64::max);
        let mean_fitness = if chromosomes.is_empty() {
            0.0
        } else {
            chromosomes.iter().map(Chromosome::fitness).sum::<f64>() / chromosomes.len() as f64
        };
        GenerationSummary {
            generation: self.population.generation,
            best_fitness,
            mean_fitness,
            best_so_far: best_so_far.max(best_fitness),
        }
    }

    fn termination(&self, history: &[GenerationSummary]) -> Option<TerminationReason> {
        let evolution = &self.config.evolution;
        let latest = history.last()?;
        if self.cancel.load(Ordering::Relaxed) {
            return Some(TerminationReason::Cancelled);
        }
        if latest.best_so_far >= evolution.fitness_threshold {
            return Some(TerminationReason::FitnessThreshold);
        }
        let window = evolution.stagnation_window as usize;
        if window > 0 && history.len() > window {
            let earlier = history[history.len() - 1 - window].best_so_far;
            if latest.best_so_far - earlier <= evolution.stagnation_tolerance {
                return Some(TerminationReason::Stagnation);
            }
        }
        if latest.generation + 1 >= evolution.max_generations {
            return Some(TerminationReason::GenerationCap);
        }
        None
    }

    /// Run generations until a termination condition triggers.
    pub fn run(&mut self) -> EvolutionReport {
        let run_seed = self.config.seed();
        let mut history: Vec<GenerationSummary> = Vec::new();
        let mut best: Option<Chromosome> = None;
        let mut generation = 0;

        let reason = loop {
            let mut master = SmallRng::seed_from_u64(generation_seed(run_seed, generation));
            let chromosomes = if generation == 0 {
                self.initial_population(&mut master)
            } else {
                let previous = std::mem::take(&mut self.population.chromosomes);
                next_generation(previous, &self.config.evolution, self.catalog(), &mut master)
            };
            self.population = Population {
                generation,
                chromosomes,
            };

            self.evaluate();
            sort_by_fitness(&mut self.population.chromosomes);

            // Interrupted evaluations are not real scores; keep them out of the sink.
            if self.cancel.load(Ordering::Relaxed) {
                debug!(generation, "cancelled; generation records not emitted");
            } else {
                let records: Vec<_> = self
                    .population
                    .chromosomes
                    .iter()
                    .map(|chromosome| chromosome.record(generation))
                    .collect();
                self.sink.on_generation(&records);
            }

            let best_so_far = history.last().map_or(0.0, |summary| summary.best_so_far);
            let summary = self.summarize(best_so_far);
            if let Some(leader) = self.population.chromosomes.first() {
                if best.as_ref().is_none_or(|best| leader.fitness() > best.fitness()) {
                    best = Some(leader.clone());
                }
                info!(
                    generation,
                    best_fitness = summary.best_fitness,
                    mean_fitness = summary.mean_fitness,
                    best = %leader
                        .genotype
                        .as_ref()
                        .map_or_else(|| "<none>".to_string(), ToString::to_string),
                    "generation evaluated"
                );
            }
            history.push(summary);

            if let Some(reason) = self.termination(&history) {
                break reason;
            }
            generation += 1;
        };

        let report = EvolutionReport {
            reason,
            generations: generation + 1,
            best,
            history,
        };
        info!(
            ?reason,
            generations = report.generations,
            best_fitness = report.best_fitness(),
            best = ?report.best.as_ref().and_then(|best| best.genotype.as_ref()),
            "evolution finished"
        );
        report
    }
}
