//! Flow sources for analysis.
//!
//! Sources turn capture CSVs into in-memory [`FlowWindow`](crate::FlowWindow)
//! batches and keep file I/O separate from detection. Column discovery is
//! tolerant of the many header dialects of flow exporters; unusable rows are
//! skipped rather than aborting a window.

mod csv;

pub use self::csv::{CsvSchema, load_windows, read_windows};

use thiserror::Error;

/// Errors produced while reading a flow source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("input has no header row")]
    EmptyInput,
    #[error("CSV missing mandatory column(s): {0}")]
    MissingColumns(String),
}
