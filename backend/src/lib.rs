//! # Rowclean - streaming ingestion and cleaning of contact-record files
//!
//! Rowclean reads large delimited files of semi-structured records (names,
//! phone numbers, dates, addresses), infers a type per column and splits
//! the rows into normalized clean rows and exception rows annotated with
//! per-field errors, with bounded memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐
//! │ CSV bytes │──▶│  Parser   │──▶│   Infer   │──▶│ Transform │──▶│   Sinks   │
//! │ (UTF8/GBK)│   │ (auto-enc)│   │ (type map)│   │ (batches) │   │(clean/err)│
//! └───────────┘   └───────────┘   └───────────┘   └───────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowclean::{IngestPipeline, MemorySink, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut clean = MemorySink::new();
//!     let mut errors = MemorySink::new();
//!     let report = IngestPipeline::new(PipelineConfig::default(), &mut clean, &mut errors)
//!         .run_file("staff.csv")
//!         .await
//!         .unwrap();
//!     println!("{} exception rows", report.statistics.error_rows);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Rows, column types, results and statistics
//! - [`parser`] - Encoding/delimiter detection and row sources
//! - [`clean`] - Field cleaners
//! - [`infer`] - Column type inference
//! - [`transform`] - Row engine, sinks, progress and pipeline
//! - [`config`] - Environment configuration
//! - [`logs`] - Log broadcaster

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Parsing
pub mod parser;

// Cleaning
pub mod clean;
pub mod infer;

// Pipeline
pub mod transform;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, PipelineError, PipelineFailure, SinkError, CsvResult, SinkResult, ConfigResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CleanResult, CleanedRow, ColumnType, ColumnTypeMap, ExceptionRow, FieldError, Phase, ProgressSnapshot,
    RawRow, RowOutcome, StreamStatistics, PROCESSING_ERROR,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    detect_delimiter, detect_encoding, detect_format, estimate_total_rows, CsvRowSource, DetectedFormat,
    MemoryRowSource, RowRange, RowSource,
};

// =============================================================================
// Re-exports - Cleaning
// =============================================================================

pub use clean::{
    clean_address, clean_date, clean_number, clean_phone, clean_text, clean_value, AddressParts, FieldCleaner,
    PassThrough, StandardCleaner,
};

pub use infer::{infer_column_types, AliasTable, CanonicalField, ColumnInferencer, ColumnProfile, InferenceReport};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use config::{InferenceConfig, PipelineConfig};

pub use transform::{
    partition_rows, read_exception_rows, CancelToken, CleaningStrategy, FlushFailure, IngestPipeline,
    JsonLinesSink, MemorySink, NoProgress, PipelineReport, ProgressSink, ProgressTracker, RowCleaner, RowSink,
    SinkKind,
};
