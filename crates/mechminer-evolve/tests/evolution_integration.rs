use mechminer_core::{
    Environment, EnvironmentError, EnvironmentFactory, EvolutionConfig, ExplorationConfig,
    GenerationRecord, GenerationSink, MinerConfig, TargetCatalog,
};
use mechminer_evolve::{ControllerError, EvolutionController, TerminationReason};
use mechminer_explore::FITNESS_FLOOR;
use mechminer_level::{LevelFactory, LevelLayout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const LEVEL: &str = "
    ..........
    ....##....
    ..........
    S..^^^...E
";

#[derive(Clone, Default)]
struct RecordingSink {
    records: Arc<Mutex<Vec<GenerationRecord>>>,
}

impl GenerationSink for RecordingSink {
    fn on_generation(&mut self, records: &[GenerationRecord]) {
        self.records
            .lock()
            .expect("sink lock")
            .extend_from_slice(records);
    }
}

/// Wraps a level factory, failing every `fail_every`th build.
struct FlakyFactory {
    inner: LevelFactory,
    builds: AtomicUsize,
    fail_every: usize,
}

impl EnvironmentFactory for FlakyFactory {
    fn build(&self, seed: u64) -> Result<Box<dyn Environment>, EnvironmentError> {
        let count = self.builds.fetch_add(1, Ordering::Relaxed);
        if count % self.fail_every == 0 {
            return Err(EnvironmentError::Construction("simulated failure".into()));
        }
        self.inner.build(seed)
    }

    fn catalog(&self) -> &TargetCatalog {
        self.inner.catalog()
    }
}

fn config(generations: u32) -> MinerConfig {
    MinerConfig {
        rng_seed: Some(0xC0FFEE),
        exploration: ExplorationConfig {
            max_attempts: 30,
            max_rollout_length: 15,
            ..ExplorationConfig::default()
        },
        evolution: EvolutionConfig {
            min_population: 6,
            max_population: 10,
            max_generations: generations,
            stagnation_window: 0,
            fitness_threshold: 2.0,
            min_workers: 2,
            max_workers: 2,
            ..EvolutionConfig::default()
        },
    }
}

fn factory() -> Arc<LevelFactory> {
    Arc::new(LevelFactory::new(LevelLayout::parse(LEVEL).expect("layout")))
}

#[test]
fn run_records_every_generation_and_stops_at_the_cap() {
    let sink = RecordingSink::default();
    let mut controller = EvolutionController::new(config(3), factory())
        .expect("controller")
        .with_sink(Box::new(sink.clone()));
    assert_eq!(controller.worker_count(), 2);

    let report = controller.run();
    assert_eq!(report.reason, TerminationReason::GenerationCap);
    assert_eq!(report.generations, 3);
    assert_eq!(report.history.len(), 3);

    let records = sink.records.lock().expect("sink lock");
    assert_eq!(records.len(), 30);
    for generation in 0..3 {
        assert_eq!(
            records.iter().filter(|r| r.generation == generation).count(),
            10
        );
    }
    assert!(records.iter().all(|r| r.fitness >= FITNESS_FLOOR));

    let population = controller.population();
    assert_eq!(population.generation, 2);
    assert!(
        population
            .chromosomes
            .iter()
            .all(|chromosome| !chromosome.has_environment() && chromosome.is_evaluated())
    );

    let best = report.best.expect("best chromosome");
    assert!(
        report
            .history
            .iter()
            .all(|summary| summary.best_fitness <= best.fitness())
    );
}

#[test]
fn identical_seeds_reproduce_the_search() {
    let first = EvolutionController::new(config(2), factory())
        .expect("controller")
        .run();
    let second = EvolutionController::new(config(2), factory())
        .expect("controller")
        .run();
    assert_eq!(first.history, second.history);
    assert_eq!(
        first.best.and_then(|best| best.genotype),
        second.best.and_then(|best| best.genotype)
    );
}

#[test]
fn reaching_the_threshold_stops_early() {
    let mut config = config(10);
    config.evolution.fitness_threshold = FITNESS_FLOOR;
    let report = EvolutionController::new(config, factory())
        .expect("controller")
        .run();
    assert_eq!(report.reason, TerminationReason::FitnessThreshold);
    assert_eq!(report.generations, 1);
}

#[test]
fn flat_fitness_triggers_stagnation() {
    let mut config = config(20);
    config.evolution.stagnation_window = 2;
    config.evolution.stagnation_tolerance = 1.0;
    let report = EvolutionController::new(config, factory())
        .expect("controller")
        .run();
    assert_eq!(report.reason, TerminationReason::Stagnation);
    assert_eq!(report.generations, 3);
}

#[test]
fn cancellation_wins_over_other_conditions() {
    let sink = RecordingSink::default();
    let mut controller = EvolutionController::new(config(5), factory())
        .expect("controller")
        .with_sink(Box::new(sink.clone()));
    controller.cancel_handle().store(true, Ordering::Relaxed);
    let report = controller.run();
    assert_eq!(report.reason, TerminationReason::Cancelled);
    assert!(report.history.iter().all(|s| s.best_fitness == FITNESS_FLOOR));
    // Interrupted evaluations never reach the sink.
    assert!(sink.records.lock().expect("sink lock").is_empty());
}

#[test]
fn construction_failures_only_affect_their_chromosome() {
    let flaky = Arc::new(FlakyFactory {
        inner: LevelFactory::new(LevelLayout::parse(LEVEL).expect("layout")),
        builds: AtomicUsize::new(0),
        fail_every: 3,
    });
    let sink = RecordingSink::default();
    let mut controller = EvolutionController::new(config(1), flaky)
        .expect("controller")
        .with_sink(Box::new(sink.clone()));
    let report = controller.run();
    assert_eq!(report.generations, 1);
    let records = sink.records.lock().expect("sink lock");
    assert_eq!(records.len(), 10);
    assert!(records.iter().any(|record| record.archive_len == 0));
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = config(1);
    config.evolution.max_workers = 0;
    assert!(matches!(
        EvolutionController::new(config, factory()),
        Err(ControllerError::Config(_))
    ));
}
