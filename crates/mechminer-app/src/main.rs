use anyhow::{Context, Result};
use clap::Parser;
use mechminer_app::{LevelSource, RunOptions, load_config, run};
use mechminer_core::MinerConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "mechminer",
    version,
    about = "Search a level for toggleable mechanics that open up new ground"
)]
struct Cli {
    /// JSON miner configuration; flags below override its values.
    #[arg(long, env = "MECHMINER_CONFIG")]
    config: Option<PathBuf>,

    /// Master seed for the evolutionary run.
    #[arg(long)]
    seed: Option<u64>,

    /// ASCII level layout (`#` solid, `^` spike, `S` entry, `E` exit).
    #[arg(long, conflicts_with = "level_seed")]
    layout: Option<PathBuf>,

    /// Seed used to generate the level when no layout is given.
    #[arg(long, default_value_t = 1)]
    level_seed: u64,

    #[arg(long, default_value_t = 12)]
    level_width: usize,

    #[arg(long, default_value_t = 8)]
    level_height: usize,

    /// Fixed population size (sets both bounds).
    #[arg(long)]
    population: Option<usize>,

    #[arg(long)]
    generations: Option<u32>,

    /// Go-Explore attempts per fitness evaluation.
    #[arg(long)]
    attempts: Option<u32>,

    /// Upper bound on evaluation worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// DuckDB file receiving one row per chromosome per generation.
    #[arg(long, env = "MECHMINER_DB")]
    db: Option<PathBuf>,

    /// Number of stored top records listed in the report.
    #[arg(long, default_value_t = 5)]
    top: usize,

    /// Write the run report as JSON instead of printing it.
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn miner_config(&self) -> Result<MinerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => MinerConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(population) = self.population {
            config.evolution.min_population = population;
            config.evolution.max_population = population;
        }
        if let Some(generations) = self.generations {
            config.evolution.max_generations = generations;
        }
        if let Some(attempts) = self.attempts {
            config.exploration.max_attempts = attempts;
        }
        if let Some(workers) = self.workers {
            config.evolution.max_workers = workers;
            config.evolution.min_workers = config.evolution.min_workers.min(workers);
        }
        config.validate().context("invalid miner configuration")?;
        Ok(config)
    }

    fn level_source(&self) -> LevelSource {
        match &self.layout {
            Some(path) => LevelSource::Ascii(path.clone()),
            None => LevelSource::Generated {
                seed: self.level_seed,
                width: self.level_width,
                height: self.level_height,
            },
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let options = RunOptions {
        config: cli.miner_config()?,
        level: cli.level_source(),
        database: cli.db.clone(),
        top: cli.top,
    };
    info!(
        seed = options.config.seed(),
        db = ?options.database,
        "mechminer starting"
    );

    let report = run(options)?;
    info!(
        reason = ?report.reason,
        generations = report.generations,
        best_fitness = report.best.as_ref().map(|best| best.fitness),
        "mechminer finished"
    );

    match &cli.report {
        Some(path) => report.write_json(path)?,
        None => {
            let json =
                serde_json::to_string_pretty(&report).context("failed to serialize run report")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
