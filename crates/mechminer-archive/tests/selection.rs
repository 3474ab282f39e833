use mechminer_archive::{ArchiveError, Cell, CellArchive};
use mechminer_core::{Action, GridPosition, StepResult};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

struct CountingRng {
    inner: SmallRng,
    calls: usize,
}

impl RngCore for CountingRng {
    fn next_u32(&mut self) -> u32 {
        self.calls += 1;
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.calls += 1;
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.calls += 1;
        self.inner.fill_bytes(dest);
    }
}

fn cell_at(x: i32) -> Cell {
    let step = StepResult {
        action: Action(0),
        position: GridPosition::new(x, 0),
        reward: 0.1,
        is_terminal: false,
        can_repeat: true,
        iteration: 0,
    };
    Cell::from_trajectory(&[step]).expect("cell")
}

#[test]
fn empty_archive_is_degenerate() {
    let archive = CellArchive::new(1e-6);
    let mut rng = SmallRng::seed_from_u64(1);
    assert_eq!(
        archive.select_weighted(&mut rng),
        Err(ArchiveError::Degenerate)
    );
}

#[test]
fn single_cell_selection_consumes_no_randomness() {
    let mut archive = CellArchive::new(1e-6);
    archive.upsert(cell_at(3));
    let mut rng = CountingRng {
        inner: SmallRng::seed_from_u64(9),
        calls: 0,
    };
    for _ in 0..10 {
        let chosen = archive.select_weighted(&mut rng).expect("selection");
        assert_eq!(chosen, GridPosition::new(3, 0));
    }
    assert_eq!(rng.calls, 0);
}

#[test]
fn selection_frequencies_follow_scores() {
    let mut archive = CellArchive::new(1e-6);
    for x in 0..4 {
        archive.upsert(cell_at(x));
    }
    // Skew the counters so the scores differ noticeably.
    for _ in 0..50 {
        archive.visit(GridPosition::new(1, 0));
    }
    for _ in 0..5 {
        archive.visit(GridPosition::new(2, 0));
        archive.choose(GridPosition::new(2, 0));
    }
    archive.visit(GridPosition::new(3, 0));

    let scores: Vec<f64> = archive.cells().iter().map(Cell::score).collect();
    let total: f64 = scores.iter().sum();

    let draws = 100_000;
    let mut counts = [0usize; 4];
    let mut rng = SmallRng::seed_from_u64(0xA11CE);
    for _ in 0..draws {
        let position = archive.select_weighted(&mut rng).expect("selection");
        counts[position.x as usize] += 1;
    }

    for (count, score) in counts.iter().zip(&scores) {
        let observed = *count as f64 / f64::from(draws);
        let expected = score / total;
        assert!(
            (observed - expected).abs() < 0.01,
            "observed {observed:.4} vs expected {expected:.4}"
        );
    }
}
