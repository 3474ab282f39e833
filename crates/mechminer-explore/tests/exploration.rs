mod common;

use common::LineEnvironment;
use mechminer_core::{Environment, ExplorationConfig};
use mechminer_explore::{ExploreError, FITNESS_FLOOR, FitnessOracle, GoExplore};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn config() -> ExplorationConfig {
    ExplorationConfig {
        max_attempts: 100,
        max_rollout_length: 20,
        exploration_noise: 0.05,
        reward_epsilon: 1e-6,
    }
}

#[test]
fn same_seed_produces_identical_archives() {
    let mut first_env = LineEnvironment::new(30, Some(25), 30);
    let mut second_env = LineEnvironment::new(30, Some(25), 30);
    let first = GoExplore::new(config(), 42)
        .run(&mut first_env)
        .expect("first run");
    let second = GoExplore::new(config(), 42)
        .run(&mut second_env)
        .expect("second run");

    assert_eq!(first.archive.cells(), second.archive.cells());
    assert_eq!(first.total_steps, second.total_steps);
    assert_eq!(first.terminal_attempts, second.terminal_attempts);
}

#[test]
fn archived_trajectories_replay_to_their_cells() {
    let mut env = LineEnvironment::new(30, Some(25), 30);
    let result = GoExplore::new(config(), 7).run(&mut env).expect("run");
    assert_eq!(result.replay_mismatches, 0);

    for cell in result.archive.cells() {
        env.reset();
        for step in &cell.trajectory {
            env.step(step.action, step.iteration);
        }
        assert_eq!(env.current_position(), cell.position);
        let last = cell.trajectory.last().expect("non-empty trajectory");
        assert_eq!(last.position, cell.position);
        assert_eq!(last.reward, cell.reward);
    }
}

#[test]
fn cells_hold_the_best_reward_seen_at_their_position() {
    let mut env = LineEnvironment::new(40, Some(39), 40).penalizing_left();
    let result = GoExplore::new(config(), 11).run(&mut env).expect("run");

    let mut penalized_tiles = 0;
    for cell in result.archive.cells() {
        let (lowest, highest) = env
            .observed_rewards(cell.position.x)
            .expect("archived tile was visited");
        assert_eq!(cell.reward, highest);
        if lowest < highest {
            penalized_tiles += 1;
        }
    }
    // Some tiles were reached both with and without the penalty.
    assert!(penalized_tiles > 0);
}

#[test]
fn terminal_runs_record_trajectories_and_step_counts() {
    let mut env = LineEnvironment::new(12, Some(6), 12);
    let result = GoExplore::new(config(), 5).run(&mut env).expect("run");
    assert!(result.reached_terminal());
    assert!(!result.terminal_trajectories.is_empty());
    for trajectory in &result.terminal_trajectories {
        assert!(trajectory.last().expect("step").is_terminal);
    }
    // One count per rollout that ended on the exit.
    assert_eq!(
        result.terminal_attempts,
        Some(result.terminal_trajectories.len() as u32)
    );
    // At least the initialization step and one replay step per attempt.
    assert!(result.total_steps > u64::from(config().max_attempts));
}

#[test]
fn covering_forty_tiles_of_a_hundred_scores_point_four() {
    let mut env = LineEnvironment::new(40, Some(39), 100);
    let oracle = FitnessOracle::new(
        ExplorationConfig {
            max_attempts: 400,
            ..config()
        },
        Arc::new(AtomicBool::new(false)),
    );
    let evaluation = oracle.evaluate(&mut env, 3);
    let result = evaluation.result.expect("result");
    assert!(result.reached_terminal());
    assert_eq!(result.archive.len(), 40);
    assert!((evaluation.fitness - 0.4).abs() < 1e-12);
}

#[test]
fn never_terminal_scores_floor() {
    let mut env = LineEnvironment::new(20, None, 20);
    let oracle = FitnessOracle::new(config(), Arc::new(AtomicBool::new(false)));
    let evaluation = oracle.evaluate(&mut env, 9);
    assert_eq!(evaluation.fitness, FITNESS_FLOOR);
    assert!(evaluation.result.expect("result").terminal_attempts.is_none());
}

#[test]
fn diverging_replays_are_counted() {
    let mut env = LineEnvironment::new(30, Some(29), 30).drifting(3);
    let result = GoExplore::new(config(), 13).run(&mut env).expect("run");
    assert!(result.replay_mismatches > 0);
}

#[test]
fn raised_cancellation_flag_aborts_the_run() {
    let mut env = LineEnvironment::new(30, Some(29), 30);
    let cancel = Arc::new(AtomicBool::new(true));
    let outcome = GoExplore::with_cancellation(config(), 1, cancel).run(&mut env);
    assert_eq!(outcome.err(), Some(ExploreError::Cancelled));
}
