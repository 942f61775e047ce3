//! End-to-end batch runs over synthetic capture CSVs.

use std::fs;
use std::path::PathBuf;

use flowsentry_core::coordinator::{WorkerPool, run_batch, run_batch_resident};
use flowsentry_core::report::{self, BLOCKLIST_FILE, RESULTS_FILE};
use flowsentry_core::{DetectorSet, RunConfig};

const HEADER: &str = "Source IP,Destination IP,Source Port,Destination Port,Protocol,\
                      Flow Duration,Total Fwd Packets,Total Backward Packets,\
                      Flow Bytes/s,Flow Packets/s,Packet Length Mean,SYN Flag Count,Label";

// Every categorical column distinct, so the entropy deficit stays zero.
fn benign_row(index: usize) -> String {
    format!(
        "10.0.{0}.{1},8.8.{0}.{1},{2},{3},17,1.0,5,5,1000.0,10.0,100.0,0,BENIGN",
        index / 256,
        index % 256,
        10_000 + index,
        20_000 + index
    )
}

fn attack_row() -> String {
    "1.2.3.4,9.9.9.9,4444,80,6,0.5,50,1,90000.0,500.0,60.0,5,DDoS_SYN".to_string()
}

fn write_capture(dir: &std::path::Path, name: &str, rows: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut text = String::from(HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    fs::write(&path, text).expect("write capture");
    path
}

#[test]
fn benign_windows_produce_a_clean_confusion_matrix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rows: Vec<String> = (0..8).map(benign_row).collect();
    let input = write_capture(dir.path(), "benign.csv", &rows);

    let config = RunConfig {
        window_size: 4,
        ..RunConfig::default()
    }
    .with_input(&input);
    let pool = WorkerPool::spawn(&config, 2);
    let outcome = run_batch(&config, &pool, &input).expect("batch");
    pool.shutdown();

    assert_eq!(outcome.results.len(), 2);
    for (index, result) in outcome.results.iter().enumerate() {
        assert_eq!(result.window_id, index as i64);
        // Every categorical feature is distinct, so the deficit is zero.
        assert!(result.entropy_score < 1e-9);
        assert!(!result.combined_pred);
        assert!(!result.ground_truth);
    }
    assert_eq!(outcome.metrics.combined.true_negatives, 2);
    assert_eq!(outcome.metrics.combined.total(), 2);
    assert!(outcome.suspects.is_empty());
}

#[test]
fn single_source_attack_window_is_flagged_with_suspects() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rows: Vec<String> = (0..10).map(|_| attack_row()).collect();
    let input = write_capture(dir.path(), "attack.csv", &rows);

    let config = RunConfig {
        window_size: 10,
        ..RunConfig::default()
    }
    .with_input(&input);
    let pool = WorkerPool::spawn(&config, 1);
    let outcome = run_batch(&config, &pool, &input).expect("batch");
    pool.shutdown();

    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert_eq!(result.norm_entropy_src, 0.0);
    assert!((result.entropy_score - 1.0).abs() < 1e-9);
    assert!(result.entropy_pred);
    assert!(result.combined_pred);
    assert!(result.ground_truth);
    assert_eq!(result.suspects.entries()[0].addr, "1.2.3.4");
    assert_eq!(result.suspects.entries()[0].count, 10);

    // Cross-window aggregation counts windows of detection, not flows.
    assert_eq!(outcome.suspects.entries()[0].count, 1);
    assert_eq!(outcome.metrics.combined.true_positives, 1);
    assert!(outcome.metrics.detection_lead_time_ms >= 0.0);
}

#[test]
fn results_land_at_their_window_id_regardless_of_worker_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rows: Vec<String> = (0..50).map(benign_row).collect();
    let input = write_capture(dir.path(), "many.csv", &rows);

    let config = RunConfig {
        window_size: 10,
        detectors: DetectorSet {
            entropy: true,
            pca: false,
            cusum: false,
        },
        ..RunConfig::default()
    }
    .with_input(&input);
    let pool = WorkerPool::spawn(&config, 2);
    let outcome = run_batch(&config, &pool, &input).expect("batch");
    pool.shutdown();

    assert_eq!(outcome.results.len(), 5);
    for (index, result) in outcome.results.iter().enumerate() {
        assert_eq!(result.window_id, index as i64);
        assert_eq!(result.start_row, index as i64 * 10);
        assert_eq!(result.flow_count, 10);
    }
}

#[test]
fn surplus_workers_are_drained_without_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rows: Vec<String> = (0..3).map(benign_row).collect();
    let input = write_capture(dir.path(), "small.csv", &rows);

    let config = RunConfig {
        window_size: 500,
        ..RunConfig::default()
    }
    .with_input(&input);
    let pool = WorkerPool::spawn(&config, 4);
    let outcome = run_batch(&config, &pool, &input).expect("batch");
    pool.shutdown();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].flow_count, 3);
}

#[test]
fn resident_workers_survive_successive_batches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first_rows: Vec<String> = (0..4).map(benign_row).collect();
    let second_rows: Vec<String> = (0..10).map(|_| attack_row()).collect();
    let first = write_capture(dir.path(), "capture_0001.csv", &first_rows);
    let second = write_capture(dir.path(), "capture_0002.csv", &second_rows);

    let config = RunConfig {
        window_size: 500,
        ..RunConfig::default()
    };
    let pool = WorkerPool::spawn(&config, 2);

    let outcome = run_batch_resident(&config, &pool, &first).expect("first batch");
    assert_eq!(outcome.results.len(), 1);
    assert!(!outcome.results[0].combined_pred);

    let outcome = run_batch_resident(&config, &pool, &second).expect("second batch");
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].combined_pred);

    pool.shutdown();
}

#[test]
fn reports_are_written_from_a_batch_outcome() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut rows: Vec<String> = (0..5).map(benign_row).collect();
    rows.extend((0..5).map(|_| attack_row()));
    let input = write_capture(dir.path(), "mixed.csv", &rows);

    let config = RunConfig {
        window_size: 5,
        min_addr_count: 1,
        ..RunConfig::default()
    }
    .with_input(&input);
    let pool = WorkerPool::spawn(&config, 2);
    let outcome = run_batch(&config, &pool, &input).expect("batch");
    pool.shutdown();

    let results_path = dir.path().join(RESULTS_FILE);
    let blocklist_path = dir.path().join(BLOCKLIST_FILE);
    report::write_results(&results_path, &outcome.results, &outcome.metrics).expect("results");
    report::write_blocklist(&blocklist_path, &outcome.suspects, config.min_addr_count, "combined")
        .expect("blocklist");

    let results_text = fs::read_to_string(&results_path).expect("read results");
    assert!(results_text.starts_with("window_id,start_row,end_row,flow_count,"));
    assert!(results_text.contains("# summary"));
    assert!(results_text.contains("total_windows,2"));

    let blocklist_text = fs::read_to_string(&blocklist_path).expect("read blocklist");
    assert!(blocklist_text.contains("1.2.3.4,1,combined"));
}
