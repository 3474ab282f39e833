//! Wiring shared by the `mechminer` binary and its tests.

use anyhow::{Context, Result};
use mechminer_core::{EnvironmentFactory, GenerationSink, MinerConfig, NullSink};
use mechminer_evolve::{EvolutionController, GenerationSummary, TerminationReason};
use mechminer_level::{LevelFactory, LevelLayout};
use mechminer_storage::{BestRecord, GenerationFitness, SharedStorage, Storage};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Where the level comes from.
#[derive(Debug, Clone)]
pub enum LevelSource {
    Generated {
        seed: u64,
        width: usize,
        height: usize,
    },
    Ascii(PathBuf),
}

/// Everything a run needs beyond the miner configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: MinerConfig,
    pub level: LevelSource,
    pub database: Option<PathBuf>,
    /// Number of stored records listed in the report.
    pub top: usize,
}

/// Best genotype found, in report form.
#[derive(Debug, Clone, Serialize)]
pub struct BestMechanic {
    pub id: String,
    pub lineage_id: String,
    pub fitness: f64,
    pub genotype: Option<String>,
    pub value_kind: Option<String>,
}

/// Machine-readable outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub reason: TerminationReason,
    pub generations: u32,
    pub level: String,
    pub best: Option<BestMechanic>,
    pub history: Vec<GenerationSummary>,
    /// Aggregates read back from the database, when one was configured.
    pub stored_fitness: Vec<GenerationFitness>,
    pub stored_best: Vec<BestRecord>,
}

impl RunReport {
    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("failed to serialize run report")?;
        Ok(())
    }
}

/// Read a JSON configuration file; missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<MinerConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("config file {} is not valid JSON", path.display()))
}

fn build_factory(source: &LevelSource) -> Result<LevelFactory> {
    match source {
        LevelSource::Generated {
            seed,
            width,
            height,
        } => LevelFactory::generated(*seed, *width, *height)
            .with_context(|| format!("failed to generate {width}x{height} level from seed {seed}")),
        LevelSource::Ascii(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read layout {}", path.display()))?;
            let layout = LevelLayout::parse(&raw)
                .with_context(|| format!("layout {} is malformed", path.display()))?;
            Ok(LevelFactory::new(layout))
        }
    }
}

/// Build the level, run the evolutionary search and collect a report.
pub fn run(options: RunOptions) -> Result<RunReport> {
    let factory = Arc::new(build_factory(&options.level)?);
    let level = factory.layout().render();
    info!(
        interior = factory.layout().interior_size(),
        fields = factory.catalog().len(),
        "level ready"
    );

    let storage = options
        .database
        .as_ref()
        .map(|path| {
            Storage::open(path)
                .map(|storage| Arc::new(Mutex::new(storage)))
                .with_context(|| format!("failed to open database {}", path.display()))
        })
        .transpose()?;
    let sink: Box<dyn GenerationSink> = match &storage {
        Some(storage) => Box::new(SharedStorage::new(Arc::clone(storage))),
        None => Box::new(NullSink),
    };

    let mut controller = EvolutionController::new(options.config, factory)
        .context("invalid miner configuration")?
        .with_sink(sink);
    info!(workers = controller.worker_count(), "starting evolution");
    let outcome = controller.run();

    let (stored_fitness, stored_best) = match &storage {
        Some(storage) => {
            let mut guard = storage
                .lock()
                .map_err(|_| anyhow::anyhow!("storage mutex poisoned"))?;
            (
                guard
                    .fitness_by_generation()
                    .context("failed to summarize stored fitness")?,
                guard
                    .best_records(options.top)
                    .context("failed to query best records")?,
            )
        }
        None => (Vec::new(), Vec::new()),
    };
    if outcome.best.is_none() {
        warn!("search finished without any evaluated chromosome");
    }

    Ok(RunReport {
        reason: outcome.reason,
        generations: outcome.generations,
        level,
        best: outcome.best.map(|best| BestMechanic {
            fitness: best.fitness(),
            genotype: best.genotype.as_ref().map(ToString::to_string),
            value_kind: best.value_kind.map(|kind| kind.to_string()),
            id: best.id,
            lineage_id: best.lineage_id,
        }),
        history: outcome.history,
        stored_fitness,
        stored_best,
    })
}
