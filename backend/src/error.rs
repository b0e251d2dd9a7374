//! Error types for the rowclean ingestion pipeline.
//!
//! - [`CsvError`] - format errors and row-source read failures (fatal)
//! - [`SinkError`] - a batch flush that the sink rejected
//! - [`ConfigError`] - unusable configuration values
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Field validation failures are *not* errors in this sense: they travel as
//! [`crate::models::CleanResult::Failure`] and end up as
//! [`crate::models::FieldError`] entries on an exception row.

use thiserror::Error;

use crate::models::StreamStatistics;

// =============================================================================
// CSV / Format Errors
// =============================================================================

/// Errors while reading the file structure or the row stream.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Malformed record at a given data row.
    #[error("Invalid CSV format at row {row}: {message}")]
    ParseError { row: u64, message: String },
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let row = err
            .position()
            .map(|p| p.record().saturating_sub(1))
            .unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => CsvError::IoError(io),
            other => CsvError::ParseError {
                row,
                message: format!("{:?}", other),
            },
        }
    }
}

// =============================================================================
// Sink Errors
// =============================================================================

/// A batch sink refused or failed to persist a batch.
#[derive(Debug, Clone, Error)]
#[error("Sink '{sink}' failed: {message}")]
pub struct SinkError {
    pub sink: String,
    pub message: String,
}

impl SinkError {
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::new("io", err.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::new("json", err.to_string())
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading [`crate::config::PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Value present but not parseable.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// Value parsed but outside the accepted range.
    #[error("{key} out of range: {message}")]
    OutOfRange { key: String, message: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Format or row-source error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Sink failure after retries, when the run is configured to abort.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Run stopped by its cancel token.
    #[error("Run cancelled")]
    Cancelled,

    /// A row reached the cleaning engine before the type map was frozen.
    #[error("Column types were not inferred before cleaning")]
    InferenceNotReady,
}

/// A failed run: the error plus everything counted before it happened.
#[derive(Debug, Error)]
#[error("Task {task_id} failed: {error}")]
pub struct PipelineFailure {
    pub task_id: String,
    #[source]
    pub error: PipelineError,
    pub statistics: StreamStatistics,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let sink_err = SinkError::new("clean", "disk full");
        let pipeline_err: PipelineError = sink_err.into();
        assert!(pipeline_err.to_string().contains("disk full"));
    }

    #[test]
    fn test_failure_keeps_statistics() {
        let failure = PipelineFailure {
            task_id: "t-1".into(),
            error: PipelineError::Cancelled,
            statistics: StreamStatistics {
                total_rows: 4,
                processed_rows: 3,
                error_rows: 1,
                ..StreamStatistics::default()
            },
        };
        assert!(failure.to_string().contains("cancelled"));
        assert_eq!(failure.statistics.total_rows, 4);
    }

    #[test]
    fn test_config_error_format() {
        let err = ConfigError::InvalidValue {
            key: "ROWCLEAN_BATCH_SIZE".into(),
            value: "lots".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ROWCLEAN_BATCH_SIZE"));
        assert!(msg.contains("lots"));
    }
}
