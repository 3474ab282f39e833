//! Candidate mechanics and their evaluation lifecycle.

use mechminer_core::{
    Environment, EnvironmentFactory, GenerationRecord, Genotype, TargetCatalog, ValueKind,
    sample_genotype, target_kind,
};
use mechminer_explore::{Evaluation, FITNESS_FLOOR, FitnessOracle};
use rand::{Rng, RngCore};
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::{debug, error, warn};

/// One candidate mechanic plus the environment and evaluation it owns.
pub struct Chromosome {
    pub id: String,
    /// Id of the chromosome this one descends from; its own id for fresh samples.
    pub lineage_id: String,
    pub seed: u64,
    /// `None` when sampling failed.
    pub genotype: Option<Genotype>,
    pub value_kind: Option<ValueKind>,
    environment: Option<Box<dyn Environment>>,
    evaluation: Option<Evaluation>,
}

fn fresh_id(rng: &mut dyn RngCore) -> String {
    format!("{:016x}", rng.random::<u64>())
}

impl Chromosome {
    /// Chromosome with a freshly sampled genotype.
    ///
    /// A sampling failure is logged and yields a chromosome without genotype,
    /// which evaluates to the fitness floor.
    pub fn fresh(catalog: &TargetCatalog, rng: &mut dyn RngCore) -> Self {
        Self::fresh_retrying(catalog, rng, 1)
    }

    /// Like [`Chromosome::fresh`], but re-samples up to `attempts` times
    /// before settling for a chromosome without genotype.
    pub fn fresh_retrying(
        catalog: &TargetCatalog,
        rng: &mut dyn RngCore,
        attempts: usize,
    ) -> Self {
        let id = fresh_id(rng);
        let seed = rng.random::<u64>();
        let mut last_error = None;
        for _ in 0..attempts.max(1) {
            match sample_genotype(catalog, rng) {
                Ok(genotype) => {
                    return Self::assemble(id.clone(), id, seed, Some(genotype), catalog);
                }
                Err(error) => last_error = Some(error),
            }
        }
        if let Some(error) = last_error {
            warn!(%error, chromosome = %id, attempts, "genotype sampling failed");
        }
        Self::assemble(id.clone(), id, seed, None, catalog)
    }

    /// Unevaluated descendant of `parent` carrying `genotype`.
    pub fn offspring(
        parent: &Chromosome,
        genotype: Option<Genotype>,
        catalog: &TargetCatalog,
        rng: &mut dyn RngCore,
    ) -> Self {
        let id = fresh_id(rng);
        let seed = rng.random::<u64>();
        Self::assemble(id, parent.id.clone(), seed, genotype, catalog)
    }

    /// Chromosome for a known genotype, e.g. when replaying a recorded result.
    pub fn with_genotype(
        genotype: Genotype,
        catalog: &TargetCatalog,
        rng: &mut dyn RngCore,
    ) -> Self {
        let id = fresh_id(rng);
        let seed = rng.random::<u64>();
        Self::assemble(id.clone(), id, seed, Some(genotype), catalog)
    }

    fn assemble(
        id: String,
        lineage_id: String,
        seed: u64,
        genotype: Option<Genotype>,
        catalog: &TargetCatalog,
    ) -> Self {
        let value_kind = genotype
            .as_ref()
            .and_then(|genotype| target_kind(catalog, genotype));
        Self {
            id,
            lineage_id,
            seed,
            genotype,
            value_kind,
            environment: None,
            evaluation: None,
        }
    }

    /// Refresh the cached value kind after the genotype changed.
    pub(crate) fn refresh_kind(&mut self, catalog: &TargetCatalog) {
        self.value_kind = self
            .genotype
            .as_ref()
            .and_then(|genotype| target_kind(catalog, genotype));
    }

    #[cfg(test)]
    pub(crate) fn with_fitness(mut self, fitness: f64) -> Self {
        self.evaluation = Some(Evaluation {
            fitness,
            result: None,
        });
        self
    }

    #[must_use]
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.evaluation.is_some()
    }

    /// Cached fitness, or the floor before evaluation.
    #[must_use]
    pub fn fitness(&self) -> f64 {
        self.evaluation
            .as_ref()
            .map_or(FITNESS_FLOOR, |evaluation| evaluation.fitness)
    }

    #[must_use]
    pub fn has_environment(&self) -> bool {
        self.environment.is_some()
    }

    /// Build this chromosome's environment if needed and install its mechanic.
    fn prepare(&mut self, factory: &dyn EnvironmentFactory) -> Option<&mut Box<dyn Environment>> {
        let genotype = self.genotype.as_ref()?;
        if self.environment.is_none() {
            match factory.build(self.seed) {
                Ok(mut environment) => {
                    if let Err(error) = environment.apply_genotype(genotype) {
                        error!(%error, %genotype, chromosome = %self.id, "genotype replay failed");
                        return None;
                    }
                    self.environment = Some(environment);
                }
                Err(error) => {
                    warn!(%error, chromosome = %self.id, "environment construction failed");
                    return None;
                }
            }
        }
        self.environment.as_mut()
    }

    /// Evaluate once and cache the result; later calls return the cached fitness.
    pub fn evaluate(&mut self, factory: &dyn EnvironmentFactory, oracle: &FitnessOracle) -> f64 {
        if let Some(evaluation) = &self.evaluation {
            return evaluation.fitness;
        }
        let seed = self.seed;
        let evaluation = match self.prepare(factory) {
            Some(environment) => oracle.evaluate(environment.as_mut(), seed),
            None => Evaluation::failed(),
        };
        let fitness = evaluation.fitness;
        self.evaluation = Some(evaluation);
        fitness
    }

    /// Drop the owned environment, if any.
    pub fn release_environment(&mut self) {
        if self.environment.take().is_some() {
            debug!(chromosome = %self.id, "released environment");
        }
    }

    /// Flat record of this chromosome for persistence.
    #[must_use]
    pub fn record(&self, generation: u32) -> GenerationRecord {
        let result = self
            .evaluation
            .as_ref()
            .and_then(|evaluation| evaluation.result.as_ref());
        let (archive_len, archive_json, terminal_trajectories_json) = match result {
            Some(result) => (
                result.archive.len(),
                to_json(&result.archive),
                to_json(&result.terminal_trajectories),
            ),
            None => (0, "[]".to_string(), "[]".to_string()),
        };
        let genotype = self.genotype.as_ref();
        GenerationRecord {
            generation,
            lineage_id: self.lineage_id.clone(),
            id: self.id.clone(),
            hash: self.combined_hash(),
            fitness: self.fitness(),
            object_id: genotype.map(|genotype| genotype.object_id.clone()),
            component_id: genotype.map(|genotype| genotype.component_id.clone()),
            field_id: genotype.map(|genotype| genotype.field_id.clone()),
            modifier: genotype.map(|genotype| genotype.modifier.to_string()),
            value_kind: self.value_kind.map(|kind| kind.to_string()),
            step_count: self
                .evaluation
                .as_ref()
                .map_or(0, Evaluation::step_count),
            archive_len,
            archive_json,
            terminal_trajectories_json,
        }
    }

    /// Genotype hash used for equality; zero without a genotype.
    #[must_use]
    pub fn combined_hash(&self) -> u64 {
        self.genotype.as_ref().map_or(0, Genotype::combined_hash)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|error| {
        warn!(%error, "failed to serialize exploration output");
        "[]".to_string()
    })
}

impl Clone for Chromosome {
    /// Clones never share the owned environment.
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            lineage_id: self.lineage_id.clone(),
            seed: self.seed,
            genotype: self.genotype.clone(),
            value_kind: self.value_kind,
            environment: None,
            evaluation: self.evaluation.clone(),
        }
    }
}

impl fmt::Debug for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chromosome")
            .field("id", &self.id)
            .field("lineage_id", &self.lineage_id)
            .field("genotype", &self.genotype)
            .field("fitness", &self.fitness())
            .field("has_environment", &self.environment.is_some())
            .finish()
    }
}

impl PartialEq for Chromosome {
    fn eq(&self, other: &Self) -> bool {
        self.combined_hash() == other.combined_hash()
    }
}

impl Eq for Chromosome {}

impl Hash for Chromosome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.combined_hash().hash(state);
    }
}
