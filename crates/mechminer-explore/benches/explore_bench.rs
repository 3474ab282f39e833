use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use mechminer_core::{EnvironmentFactory, ExplorationConfig};
use mechminer_explore::GoExplore;
use mechminer_level::LevelFactory;
use std::time::Duration;

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn bench_exploration(c: &mut Criterion) {
    let mut group = c.benchmark_group("exploration");
    group.sample_size(env_usize("MM_BENCH_SAMPLES", 20));
    group.measurement_time(Duration::from_secs(10));

    let attempts = env_usize("MM_BENCH_ATTEMPTS", 100);
    for size in [10_usize, 20, 40] {
        let factory = LevelFactory::generated(0xBEEF, size, size).expect("level");
        group.bench_function(format!("attempts{attempts}_level{size}x{size}"), |b| {
            b.iter_batched(
                || factory.build(0).expect("environment"),
                |mut env| {
                    let config = ExplorationConfig {
                        max_attempts: attempts as u32,
                        ..ExplorationConfig::default()
                    };
                    GoExplore::new(config, 7)
                        .run(env.as_mut())
                        .expect("exploration")
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_exploration);
criterion_main!(benches);
