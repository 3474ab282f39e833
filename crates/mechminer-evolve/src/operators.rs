//! Selection, crossover and mutation over chromosomes.

use mechminer_core::{
    EvolutionConfig, Genotype, Locus, Pick, TargetCatalog, select_modifier, select_target_field,
};
use ordered_float::OrderedFloat;
use rand::{Rng, RngCore};
use std::cmp::Reverse;
use tracing::debug;

use crate::chromosome::Chromosome;

/// Sampling tries per fresh chromosome before it is kept without genotype.
pub const FRESH_SAMPLE_ATTEMPTS: usize = 32;

/// Stable sort, fittest first.
pub fn sort_by_fitness(chromosomes: &mut [Chromosome]) {
    chromosomes.sort_by_key(|chromosome| Reverse(OrderedFloat(chromosome.fitness())));
}

/// Slice size for `fraction` of a population of `size`, rounded to nearest.
#[must_use]
pub fn slice_len(size: usize, fraction: f64) -> usize {
    ((size as f64 * fraction).round() as usize).min(size)
}

/// Draw `count` parents with replacement, proportionally to fitness.
pub fn roulette_select<'a>(
    candidates: &'a [Chromosome],
    count: usize,
    rng: &mut dyn RngCore,
) -> Vec<&'a Chromosome> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let total: f64 = candidates.iter().map(Chromosome::fitness).sum();
    (0..count)
        .map(|_| {
            let threshold = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            candidates
                .iter()
                .find(|candidate| {
                    cumulative += candidate.fitness();
                    cumulative > threshold
                })
                .unwrap_or(&candidates[candidates.len() - 1])
        })
        .collect()
}

/// Type-gated uniform crossover.
///
/// Genes are exchanged only when both parents target the same component and
/// field. Each locus is swapped with probability `1 - mix_probability`;
/// otherwise every child copies its own parent.
pub fn crossover(
    first: &Chromosome,
    second: &Chromosome,
    mix_probability: f64,
    catalog: &TargetCatalog,
    rng: &mut dyn RngCore,
) -> (Chromosome, Chromosome) {
    let genotypes = match (&first.genotype, &second.genotype) {
        (Some(a), Some(b)) if a.same_target_type(b) => {
            let mut left = a.clone();
            let mut right = b.clone();
            for locus in Locus::ALL {
                if rng.random::<f64>() >= mix_probability {
                    left.take_gene(b, locus);
                    right.take_gene(a, locus);
                }
            }
            (Some(left), Some(right))
        }
        _ => (first.genotype.clone(), second.genotype.clone()),
    };
    (
        Chromosome::offspring(first, genotypes.0, catalog, rng),
        Chromosome::offspring(second, genotypes.1, catalog, rng),
    )
}

/// Which gene a mutation rewrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Field,
    Modifier,
}

/// Re-sample the field or the modifier gene of `genotype` in place.
///
/// Object and component genes never change. A new field gets its modifier
/// repaired when the old one is no longer valid or no longer changes the value.
/// Returns `None` when the catalog offered no replacement.
pub fn mutate_genotype(
    genotype: &mut Genotype,
    catalog: &TargetCatalog,
    rng: &mut dyn RngCore,
) -> Option<Mutation> {
    if rng.random_bool(0.5) {
        let field = select_target_field(
            catalog,
            &genotype.object_id,
            &genotype.component_id,
            Pick::Random(&mut *rng),
        )
        .ok()?;
        let descriptor = catalog.field(&genotype.object_id, &genotype.component_id, &field)?;
        let modifier_fits = descriptor.value.changes_under(genotype.modifier);
        if !modifier_fits {
            genotype.modifier = select_modifier(
                catalog,
                &genotype.object_id,
                &genotype.component_id,
                &field,
                Pick::Random(rng),
            )
            .ok()?;
        }
        genotype.field_id = field;
        Some(Mutation::Field)
    } else {
        genotype.modifier = select_modifier(
            catalog,
            &genotype.object_id,
            &genotype.component_id,
            &genotype.field_id,
            Pick::Random(rng),
        )
        .ok()?;
        Some(Mutation::Modifier)
    }
}

/// Mutate `chromosome` with the configured probability.
pub fn maybe_mutate(
    chromosome: &mut Chromosome,
    probability: f64,
    catalog: &TargetCatalog,
    rng: &mut dyn RngCore,
) -> Option<Mutation> {
    if rng.random::<f64>() >= probability {
        return None;
    }
    let genotype = chromosome.genotype.as_mut()?;
    let mutation = mutate_genotype(genotype, catalog, rng)?;
    chromosome.refresh_kind(catalog);
    debug!(chromosome = %chromosome.id, ?mutation, "mutated");
    Some(mutation)
}

/// Build the next generation from an evaluated one.
///
/// The population keeps its size: elites pass through with their cached
/// evaluation, the bottom slice is replaced by fresh samples and the middle
/// slice breeds the remainder through roulette selection.
pub fn next_generation(
    mut population: Vec<Chromosome>,
    config: &EvolutionConfig,
    catalog: &TargetCatalog,
    rng: &mut dyn RngCore,
) -> Vec<Chromosome> {
    let size = population.len();
    sort_by_fitness(&mut population);
    let elites = slice_len(size, config.elite_fraction);
    let fresh = slice_len(size, config.fresh_fraction).min(size - elites);

    let middle = &population[elites..size - fresh];
    let parents = roulette_select(middle, middle.len(), rng);

    let mut offspring = Vec::with_capacity(parents.len());
    for pair in parents.chunks(2) {
        match pair {
            [first, second] => {
                if rng.random::<f64>() < config.crossover_probability {
                    let (left, right) =
                        crossover(first, second, config.mix_probability, catalog, rng);
                    offspring.push(left);
                    offspring.push(right);
                } else {
                    offspring.push(Chromosome::offspring(
                        first,
                        first.genotype.clone(),
                        catalog,
                        rng,
                    ));
                    offspring.push(Chromosome::offspring(
                        second,
                        second.genotype.clone(),
                        catalog,
                        rng,
                    ));
                }
            }
            [single] => {
                offspring.push(Chromosome::offspring(
                    single,
                    single.genotype.clone(),
                    catalog,
                    rng,
                ));
            }
            _ => {}
        }
    }
    for child in &mut offspring {
        maybe_mutate(child, config.mutation_probability, catalog, rng);
    }

    let mut next: Vec<Chromosome> = population.drain(..elites).collect();
    next.append(&mut offspring);
    next.extend(
        (0..fresh).map(|_| Chromosome::fresh_retrying(catalog, rng, FRESH_SAMPLE_ATTEMPTS)),
    );
    next
}
