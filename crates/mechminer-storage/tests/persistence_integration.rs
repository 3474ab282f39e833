use mechminer_core::{GenerationRecord, GenerationSink};
use mechminer_storage::{SharedStorage, Storage};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn record(generation: u32, index: usize, fitness: f64) -> GenerationRecord {
    GenerationRecord {
        generation,
        lineage_id: format!("lineage-{index}"),
        id: format!("g{generation}-c{index}"),
        hash: index as u64 * 7919,
        fitness,
        object_id: Some("physics".into()),
        component_id: Some("Physics2D".into()),
        field_id: Some("gravity_scale".into()),
        modifier: Some("invert".into()),
        value_kind: Some("number".into()),
        step_count: 500,
        archive_len: index,
        archive_json: "[]".into(),
        terminal_trajectories_json: "[]".into(),
    }
}

#[test]
fn buffered_records_survive_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("mechminer.duckdb");

    {
        let storage = Arc::new(Mutex::new(Storage::with_threshold(&path, 100)?));
        let mut sink = SharedStorage::new(Arc::clone(&storage));
        for generation in 0..3 {
            let records: Vec<_> = (0..4)
                .map(|index| record(generation, index, 0.1 * (index + 1) as f64))
                .collect();
            sink.on_generation(&records);
        }
        // Dropping the last handle flushes the buffer.
    }

    let mut storage = Storage::open(&path)?;
    let summary = storage.fitness_by_generation()?;
    assert_eq!(summary.len(), 3);
    for (generation, row) in summary.iter().enumerate() {
        assert_eq!(row.generation as usize, generation);
        assert_eq!(row.chromosomes, 4);
        assert!((row.best_fitness - 0.4).abs() < 1e-9);
        assert!((row.mean_fitness - 0.25).abs() < 1e-9);
    }

    let best = storage.best_records(3)?;
    assert_eq!(best.len(), 3);
    assert!(best.iter().all(|record| (record.fitness - 0.4).abs() < 1e-9));
    assert_eq!(best[0].id, "g0-c3");
    Ok(())
}
