// UniSkor - Core Library
// University efficiency-score pipeline: scrape the YÖKAK report portal,
// normalize indicators, hand off to the statistical step, publish the
// canonical dataset, serve it read-only.

pub mod error;
pub mod text;
pub mod config;
pub mod logging;

pub mod session;    // Browser seam (PortalSession, ChromeSession)
pub mod discovery;  // Entity discovery strategies
pub mod table;      // Report table extraction
pub mod retrieval;  // Per-entity state machine
pub mod normalizer; // Row map + derived fields

pub mod pipeline;
pub mod workbook;
pub mod stats;

pub mod dataset;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::Config;
pub use error::{PipelineError, PipelineResult, StoreError};
pub use session::{Candidate, PortalSession};
#[cfg(feature = "browser")]
pub use session::ChromeSession;
pub use discovery::{
    DiscoveryStrategy, EmbeddedJsonStrategy, Entity, EntityDiscoverer, MarkupLineStrategy,
};
pub use table::{NumberLocale, RawReportTable, ReportRow, TableExtractor};
pub use retrieval::{EntityRetriever, RetrievalState};
pub use normalizer::{FieldKey, NormalizedRecord, RecordNormalizer, RowMap, RowMapping};
pub use pipeline::{ingest, AggregationPipeline, RunSummary, YearCollection};
pub use stats::StatisticalStep;
pub use dataset::{slugify, CanonicalDataset, ScorePair, University};
pub use store::DatasetStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
