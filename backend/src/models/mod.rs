//! Domain models for the rowclean pipeline.
//!
//! - [`RawRow`] - one data row as read from the source
//! - [`ColumnType`] / [`ColumnTypeMap`] - inferred semantic type per column
//! - [`CleanResult`] - tagged outcome of a field cleaner
//! - [`FieldError`], [`CleanedRow`], [`ExceptionRow`] - cleaning output
//! - [`StreamStatistics`], [`ProgressSnapshot`], [`Phase`] - run reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Rows
// =============================================================================

/// Ordered column name → raw value mapping.
pub type RowFields = Map<String, Value>;

/// One data row. `row_number` is 1-based and excludes the header line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    pub row_number: u64,
    pub fields: RowFields,
}

impl RawRow {
    pub fn new(row_number: u64, fields: RowFields) -> Self {
        Self { row_number, fields }
    }

    /// Build a row from `(column, value)` string pairs.
    pub fn from_pairs<'a>(row_number: u64, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Self { row_number, fields }
    }
}

// =============================================================================
// Column Types
// =============================================================================

/// Semantic category of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Phone,
    Date,
    Address,
    Number,
    Text,
}

impl ColumnType {
    /// Inference priority order. TEXT is the fallback and is not scored.
    pub const SCORED: [ColumnType; 4] = [
        ColumnType::Phone,
        ColumnType::Date,
        ColumnType::Address,
        ColumnType::Number,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Phone => "PHONE",
            ColumnType::Date => "DATE",
            ColumnType::Address => "ADDRESS",
            ColumnType::Number => "NUMBER",
            ColumnType::Text => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phone" => Ok(ColumnType::Phone),
            "date" => Ok(ColumnType::Date),
            "address" => Ok(ColumnType::Address),
            "number" => Ok(ColumnType::Number),
            "text" => Ok(ColumnType::Text),
            other => Err(format!("unknown column type '{}'", other)),
        }
    }
}

/// Frozen column name → type mapping.
///
/// Built once per file by inference (or handed in by a chunk orchestrator)
/// and never mutated afterwards; there is no `insert` after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnTypeMap(BTreeMap<String, ColumnType>);

impl ColumnTypeMap {
    pub fn get(&self, column: &str) -> Option<ColumnType> {
        self.0.get(column).copied()
    }

    /// Type used for a column, TEXT when the column is unknown.
    pub fn type_of(&self, column: &str) -> ColumnType {
        self.get(column).unwrap_or(ColumnType::Text)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, ColumnType)> for ColumnTypeMap {
    fn from_iter<I: IntoIterator<Item = (String, ColumnType)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Cleaning Results
// =============================================================================

/// Outcome of a field cleaner. Expected validation failures are values,
/// never panics or `Err`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CleanResult<T> {
    Success { value: T },
    Failure { error: String },
}

impl<T> CleanResult<T> {
    pub fn success(value: T) -> Self {
        CleanResult::Success { value }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        CleanResult::Failure { error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CleanResult::Success { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            CleanResult::Success { value } => Some(value),
            CleanResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            CleanResult::Success { .. } => None,
            CleanResult::Failure { error } => Some(error),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            CleanResult::Success { value } => Some(value),
            CleanResult::Failure { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CleanResult<U> {
        match self {
            CleanResult::Success { value } => CleanResult::Success { value: f(value) },
            CleanResult::Failure { error } => CleanResult::Failure { error },
        }
    }
}

/// `errorType` used when a cleaner blew up instead of returning a result.
pub const PROCESSING_ERROR: &str = "PROCESSING_ERROR";

/// One failed field of one row. Persisted and read back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub original_value: Value,
    pub error_type: String,
    pub error_message: String,
}

/// A row without any field error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanedRow {
    pub row_number: u64,
    pub original_data: RowFields,
    pub cleaned_data: RowFields,
}

/// A row with at least one field error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRow {
    pub row_number: u64,
    pub original_data: RowFields,
    pub cleaned_data: RowFields,
    pub errors: Vec<FieldError>,
}

/// Result of cleaning one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Clean(CleanedRow),
    Exception(ExceptionRow),
}

impl RowOutcome {
    pub fn row_number(&self) -> u64 {
        match self {
            RowOutcome::Clean(r) => r.row_number,
            RowOutcome::Exception(r) => r.row_number,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, RowOutcome::Clean(_))
    }
}

// =============================================================================
// Run Reporting
// =============================================================================

/// Counters for one file run.
///
/// `total_rows == processed_rows + error_rows` holds at every point a
/// snapshot is taken; `persisted_*` only count rows a sink accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatistics {
    pub total_rows: u64,
    /// Clean rows.
    pub processed_rows: u64,
    pub error_rows: u64,
    pub persisted_clean_rows: u64,
    pub persisted_error_rows: u64,
    pub flushed_batches: u64,
    pub failed_batches: u64,
}

impl StreamStatistics {
    pub fn record(&mut self, outcome: &RowOutcome) {
        self.total_rows += 1;
        if outcome.is_clean() {
            self.processed_rows += 1;
        } else {
            self.error_rows += 1;
        }
    }

    /// Rows that went through the cleaning engine.
    pub fn seen(&self) -> u64 {
        self.processed_rows + self.error_rows
    }
}

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Estimating,
    Preparing,
    Parsing,
    Cleaning,
    SavingBatch,
    Finalizing,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

/// Progress report published to a [`crate::transform::ProgressSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub task_id: String,
    pub progress_percent: u8,
    pub processed_rows: u64,
    pub total_rows: u64,
    pub current_phase: Phase,
    pub estimated_time_remaining_ms: Option<u64>,
    pub last_updated: DateTime<Utc>,
}
