//! Genotype descriptors and the selectors used to sample or replay them.

use rand::{Rng, RngCore, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::capability::{ModifierKind, TargetCatalog, ValueKind};

/// Gene positions within a [`Genotype`], in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Locus {
    Object,
    Component,
    Field,
    Modifier,
}

impl Locus {
    pub const ALL: [Locus; 4] = [Locus::Object, Locus::Component, Locus::Field, Locus::Modifier];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Component => "component",
            Self::Field => "field",
            Self::Modifier => "modifier",
        }
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while sampling or replaying genotypes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenotypeError {
    /// The catalog exposes no fields at all.
    #[error("target catalog is empty")]
    EmptyCatalog,
    /// Every candidate field was rejected.
    #[error("no toggle-capable field on {object}/{component}")]
    NoQualifyingField { object: String, component: String },
    /// A fixed-name lookup found no match.
    #[error("replay failed: no {locus} named `{name}`")]
    InvalidReplay { locus: Locus, name: String },
    /// The modifier cannot be applied to the field's value kind.
    #[error("modifier {modifier} is not valid for {kind} field {field}")]
    InvalidModifier {
        field: String,
        kind: ValueKind,
        modifier: ModifierKind,
    },
}

/// How a selector chooses its result: fresh sampling or a fixed name.
pub enum Pick<'a> {
    Random(&'a mut dyn RngCore),
    Named(&'a str),
}

impl fmt::Debug for Pick<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random(_) => f.write_str("Pick::Random"),
            Self::Named(name) => f.debug_tuple("Pick::Named").field(name).finish(),
        }
    }
}

/// Four-gene descriptor of a single mechanic edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Genotype {
    pub object_id: String,
    pub component_id: String,
    pub field_id: String,
    pub modifier: ModifierKind,
}

impl Genotype {
    #[must_use]
    pub fn new(
        object_id: impl Into<String>,
        component_id: impl Into<String>,
        field_id: impl Into<String>,
        modifier: ModifierKind,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            component_id: component_id.into(),
            field_id: field_id.into(),
            modifier,
        }
    }

    /// Identifier stored at `locus`.
    #[must_use]
    pub fn gene(&self, locus: Locus) -> &str {
        match locus {
            Locus::Object => &self.object_id,
            Locus::Component => &self.component_id,
            Locus::Field => &self.field_id,
            Locus::Modifier => self.modifier.as_str(),
        }
    }

    /// Copy the gene at `locus` from `other`.
    pub fn take_gene(&mut self, other: &Genotype, locus: Locus) {
        match locus {
            Locus::Object => self.object_id.clone_from(&other.object_id),
            Locus::Component => self.component_id.clone_from(&other.component_id),
            Locus::Field => self.field_id.clone_from(&other.field_id),
            Locus::Modifier => self.modifier = other.modifier,
        }
    }

    /// Stable hash of a single gene.
    #[must_use]
    pub fn gene_hash(&self, locus: Locus) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.gene(locus).hash(&mut hasher);
        hasher.finish()
    }

    /// Order-sensitive combination of the four gene hashes (nested Cantor pairing).
    #[must_use]
    pub fn combined_hash(&self) -> u64 {
        let [object, component, field, modifier] = Locus::ALL.map(|locus| self.gene_hash(locus));
        cantor(cantor(object, component), cantor(field, modifier))
    }

    /// Whether crossover may exchange genes with `other`.
    #[must_use]
    pub fn same_target_type(&self, other: &Genotype) -> bool {
        self.component_id == other.component_id && self.field_id == other.field_id
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.object_id, self.component_id, self.field_id, self.modifier
        )
    }
}

fn cantor(a: u64, b: u64) -> u64 {
    let sum = a.wrapping_add(b);
    sum.wrapping_add(1)
        .wrapping_mul(sum)
        .wrapping_div(2)
        .wrapping_add(b)
}

fn index_of(len: usize, rng: &mut dyn RngCore) -> usize {
    rng.random_range(0..len)
}

/// Choose one addressable object from the catalog.
pub fn select_target_object(
    catalog: &TargetCatalog,
    pick: Pick<'_>,
) -> Result<String, GenotypeError> {
    let objects = catalog.objects();
    if objects.is_empty() {
        return Err(GenotypeError::EmptyCatalog);
    }
    match pick {
        Pick::Random(rng) => Ok(objects[index_of(objects.len(), rng)].to_string()),
        Pick::Named(name) => objects
            .into_iter()
            .find(|object| *object == name)
            .map(str::to_string)
            .ok_or_else(|| GenotypeError::InvalidReplay {
                locus: Locus::Object,
                name: name.to_string(),
            }),
    }
}

/// Choose a component, returning `(object, component)`.
///
/// Without an object, random picks sample uniformly over every component in the
/// catalog and derive the owning object from it.
pub fn select_target_component(
    catalog: &TargetCatalog,
    object: Option<&str>,
    pick: Pick<'_>,
) -> Result<(String, String), GenotypeError> {
    if catalog.is_empty() {
        return Err(GenotypeError::EmptyCatalog);
    }
    let candidates: Vec<(&str, &str)> = catalog
        .components()
        .into_iter()
        .filter(|(owner, _)| object.is_none_or(|object| *owner == object))
        .collect();
    let found = match pick {
        Pick::Random(rng) => {
            if candidates.is_empty() {
                return Err(GenotypeError::NoQualifyingField {
                    object: object.unwrap_or_default().to_string(),
                    component: "*".to_string(),
                });
            }
            candidates[index_of(candidates.len(), rng)]
        }
        Pick::Named(name) => candidates
            .into_iter()
            .find(|(_, component)| *component == name)
            .ok_or_else(|| GenotypeError::InvalidReplay {
                locus: Locus::Component,
                name: name.to_string(),
            })?,
    };
    Ok((found.0.to_string(), found.1.to_string()))
}

/// Choose a toggle-capable field of `object/component`.
///
/// Random picks visit candidates without replacement and return the first whose
/// value changes under at least one valid modifier. Named picks must match a
/// field exactly; a named field that is not toggleable is still returned so a
/// replay reproduces the recorded mechanic.
pub fn select_target_field(
    catalog: &TargetCatalog,
    object: &str,
    component: &str,
    pick: Pick<'_>,
) -> Result<String, GenotypeError> {
    match pick {
        Pick::Named(name) => catalog
            .field(object, component, name)
            .map(|field| field.field_id.clone())
            .ok_or_else(|| GenotypeError::InvalidReplay {
                locus: Locus::Field,
                name: name.to_string(),
            }),
        Pick::Random(rng) => {
            let mut candidates: Vec<_> = catalog.fields_of(object, component).collect();
            candidates.shuffle(rng);
            candidates
                .into_iter()
                .find(|field| field.is_toggleable())
                .map(|field| field.field_id.clone())
                .ok_or_else(|| GenotypeError::NoQualifyingField {
                    object: object.to_string(),
                    component: component.to_string(),
                })
        }
    }
}

/// Choose a modifier valid for the field's value kind.
///
/// Random picks prefer modifiers that change the field's current value.
pub fn select_modifier(
    catalog: &TargetCatalog,
    object: &str,
    component: &str,
    field: &str,
    pick: Pick<'_>,
) -> Result<ModifierKind, GenotypeError> {
    let descriptor =
        catalog
            .field(object, component, field)
            .ok_or_else(|| GenotypeError::InvalidReplay {
                locus: Locus::Field,
                name: field.to_string(),
            })?;
    let kind = descriptor.value.kind();
    match pick {
        Pick::Random(rng) => {
            let effective = descriptor.value.effective_modifiers();
            let pool: &[ModifierKind] = if effective.is_empty() {
                kind.valid_modifiers()
            } else {
                &effective
            };
            Ok(pool[index_of(pool.len(), rng)])
        }
        Pick::Named(name) => {
            let modifier = name
                .parse::<ModifierKind>()
                .map_err(|_| GenotypeError::InvalidReplay {
                    locus: Locus::Modifier,
                    name: name.to_string(),
                })?;
            if kind.accepts(modifier) {
                Ok(modifier)
            } else {
                Err(GenotypeError::InvalidModifier {
                    field: field.to_string(),
                    kind,
                    modifier,
                })
            }
        }
    }
}

/// Sample a complete genotype from scratch.
pub fn sample_genotype(
    catalog: &TargetCatalog,
    rng: &mut dyn RngCore,
) -> Result<Genotype, GenotypeError> {
    let object = select_target_object(catalog, Pick::Random(&mut *rng))?;
    let (object, component) =
        select_target_component(catalog, Some(&object), Pick::Random(&mut *rng))?;
    let field = select_target_field(catalog, &object, &component, Pick::Random(&mut *rng))?;
    let modifier = select_modifier(catalog, &object, &component, &field, Pick::Random(rng))?;
    Ok(Genotype::new(object, component, field, modifier))
}

/// Re-resolve every gene of `genotype` against `catalog` by name.
///
/// Fails on the first gene that has no exact match; nothing is substituted.
pub fn replay_genotype(
    catalog: &TargetCatalog,
    genotype: &Genotype,
) -> Result<Genotype, GenotypeError> {
    let object = select_target_object(catalog, Pick::Named(&genotype.object_id))?;
    let (object, component) =
        select_target_component(catalog, Some(&object), Pick::Named(&genotype.component_id))?;
    let field = select_target_field(
        catalog,
        &object,
        &component,
        Pick::Named(&genotype.field_id),
    )?;
    let modifier = select_modifier(
        catalog,
        &object,
        &component,
        &field,
        Pick::Named(genotype.modifier.as_str()),
    )?;
    Ok(Genotype::new(object, component, field, modifier))
}

/// Value kind of the field a genotype targets, if the catalog has it.
#[must_use]
pub fn target_kind(catalog: &TargetCatalog, genotype: &Genotype) -> Option<ValueKind> {
    catalog
        .field(&genotype.object_id, &genotype.component_id, &genotype.field_id)
        .map(|field| field.value.kind())
}
