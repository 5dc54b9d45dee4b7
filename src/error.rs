// ⚠️ Error taxonomy for the scraping pipeline and the dataset store

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the extraction / aggregation pipeline.
///
/// Only `Discovery` and the I/O family are fatal to a run. The per-entity
/// variants are logged by the orchestrator and the run moves on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no universities discovered: {0}")]
    Discovery(String),

    #[error("element for '{entity}' not found with selector {selector}")]
    ElementNotFound { entity: String, selector: String },

    #[error("results table for '{entity}' did not appear within {timeout:?}")]
    TableTimeout { entity: String, timeout: Duration },

    #[error("results table for '{entity}' has no parseable rows")]
    EmptyTable { entity: String },

    #[error("browser session error: {0}")]
    Browser(String),

    #[error("row {row} requested for field {field} but the report only has {rows} rows")]
    RowOutOfRange { row: usize, field: String, rows: usize },

    #[error("t1 is zero for year '{year}', per-student indicators undefined")]
    ZeroDivisor { year: String },

    #[error("year column '{0}' not present in report")]
    MissingYear(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("external tool failed: {0}")]
    ExternalTool(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading the canonical dataset for the read API.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read data file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse data file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
