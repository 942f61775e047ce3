//! Report writers: per-window results CSV and the suspect blocklist.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::WindowResult;
use crate::metrics::RunMetrics;
use crate::suspects::SuspectList;

/// Results file name inside the output directory.
pub const RESULTS_FILE: &str = "detection_results.csv";
/// Blocklist file name inside the output directory.
pub const BLOCKLIST_FILE: &str = "merged_blocklist.csv";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of the results table. Scores are rounded to the documented
/// report precision before serialisation.
#[derive(Debug, Serialize)]
struct ResultRow {
    window_id: i64,
    start_row: i64,
    end_row: i64,
    flow_count: u32,
    entropy_score: f64,
    entropy_pred: u8,
    pca_score: f64,
    pca_pred: u8,
    cusum_score: f64,
    cusum_pred: u8,
    combined_pred: u8,
    ground_truth: u8,
    processing_time_ms: f64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl From<&WindowResult> for ResultRow {
    fn from(result: &WindowResult) -> Self {
        ResultRow {
            window_id: result.window_id,
            start_row: result.start_row,
            end_row: result.end_row,
            flow_count: result.flow_count,
            entropy_score: round_to(result.entropy_score, 6),
            entropy_pred: u8::from(result.entropy_pred),
            pca_score: round_to(result.pca_score, 6),
            pca_pred: u8::from(result.pca_pred),
            cusum_score: round_to(result.cusum_score, 6),
            cusum_pred: u8::from(result.cusum_pred),
            combined_pred: u8::from(result.combined_pred),
            ground_truth: u8::from(result.ground_truth),
            processing_time_ms: round_to(result.processing_time_ms, 3),
        }
    }
}

/// Writes the results table in window-id order followed by the `# summary`
/// block of `key,value` pairs. The file lands atomically via a temp-rename.
pub fn write_results(
    path: &Path,
    results: &[WindowResult],
    metrics: &RunMetrics,
) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for result in results {
        writer.serialize(ResultRow::from(result))?;
    }
    let mut buffer = writer
        .into_inner()
        .map_err(|err| ReportError::Io(err.into_error()))?;

    buffer.extend_from_slice(b"\n# summary\n");
    let generated = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());
    buffer.extend_from_slice(format!("# generated {generated}\n").as_bytes());
    for (key, value) in metrics.summary_pairs() {
        buffer.extend_from_slice(format!("{key},{value}\n").as_bytes());
    }

    write_atomic(path, &buffer)
}

/// Writes the blocklist: addresses whose detection count reaches
/// `min_count`, in insertion order.
pub fn write_blocklist(
    path: &Path,
    suspects: &SuspectList,
    min_count: u32,
    detector: &str,
) -> Result<usize, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["ip", "count", "detector"])?;
    let mut written = 0usize;
    for entry in suspects.filtered(min_count) {
        let count = entry.count.to_string();
        writer.write_record([entry.addr.as_str(), count.as_str(), detector])?;
        written += 1;
    }
    let buffer = writer
        .into_inner()
        .map_err(|err| ReportError::Io(err.into_error()))?;
    write_atomic(path, &buffer)?;
    Ok(written)
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
