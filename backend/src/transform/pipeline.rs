//! Streaming ingestion pipeline.
//!
//! Drives one file through detection, inference and cleaning with bounded
//! memory:
//!
//! ```text
//! estimating → preparing → parsing → cleaning ⇄ saving_batch → finalizing → completed
//!                                                                        ↘ failed
//! ```
//!
//! The first `sample_rows` rows are buffered and inferred once; the frozen
//! type map then cleans the buffered rows followed by the rest of the
//! stream. Clean and exception rows collect in two independent batches
//! that are flushed to their sinks whenever one reaches `batch_size`.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowclean::transform::{IngestPipeline, JsonLinesSink};
//!
//! let mut clean = JsonLinesSink::create("clean.jsonl").await?;
//! let mut errors = JsonLinesSink::create("errors.jsonl").await?;
//! let report = IngestPipeline::new(config, &mut clean, &mut errors)
//!     .run_file("staff.csv")
//!     .await?;
//! println!("{} exception rows", report.statistics.error_rows);
//! ```

use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::engine::{CleaningStrategy, RowCleaner};
use super::progress::ProgressTracker;
use super::sink::{NoProgress, ProgressSink, RowSink};
use crate::config::PipelineConfig;
use crate::error::{CsvError, PipelineError, PipelineFailure, SinkError};
use crate::infer::{ColumnInferencer, ColumnProfile};
use crate::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::models::{
    CleanedRow, ColumnTypeMap, ExceptionRow, Phase, RawRow, RowOutcome, StreamStatistics,
};
use crate::parser::{estimate_total_rows, format_delimiter, CsvRowSource, DetectedFormat, RowRange, RowSource};

// =============================================================================
// Cancellation
// =============================================================================

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Report
// =============================================================================

/// Which sink a flush was meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Clean,
    Error,
}

/// A batch that could not be persisted after every attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushFailure {
    pub sink: SinkKind,
    pub first_row: u64,
    pub last_row: u64,
    pub rows: usize,
    pub attempts: u32,
    pub error: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub task_id: String,
    /// `None` when rows came from a caller-supplied source.
    pub format: Option<DetectedFormat>,
    pub headers: Vec<String>,
    pub type_map: ColumnTypeMap,
    /// Empty when the type map was handed in rather than inferred.
    pub profiles: Vec<ColumnProfile>,
    pub statistics: StreamStatistics,
    pub flush_failures: Vec<FlushFailure>,
    pub elapsed_ms: u64,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Per-run mutable state.
struct RunState {
    stats: StreamStatistics,
    tracker: ProgressTracker,
    clean_batch: Vec<CleanedRow>,
    error_batch: Vec<ExceptionRow>,
    flush_failures: Vec<FlushFailure>,
    started: Instant,
}

/// One file-processing run. Owns its type map and statistics; several
/// pipelines may run concurrently on different files.
pub struct IngestPipeline<'a, C, E> {
    config: PipelineConfig,
    task_id: String,
    clean_sink: &'a mut C,
    error_sink: &'a mut E,
    progress: Box<dyn ProgressSink + Send + 'a>,
    strategy: CleaningStrategy,
    cancel: CancelToken,
    type_map: Option<ColumnTypeMap>,
    range: Option<RowRange>,
}

impl<'a, C, E> IngestPipeline<'a, C, E>
where
    C: RowSink<CleanedRow>,
    E: RowSink<ExceptionRow>,
{
    pub fn new(config: PipelineConfig, clean_sink: &'a mut C, error_sink: &'a mut E) -> Self {
        Self {
            config,
            task_id: uuid::Uuid::new_v4().to_string(),
            clean_sink,
            error_sink,
            progress: Box::new(NoProgress),
            strategy: CleaningStrategy::standard(),
            cancel: CancelToken::new(),
            type_map: None,
            range: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + Send + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn with_strategy(mut self, strategy: CleaningStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Skip inference and clean with a map inferred elsewhere (chunk workers).
    pub fn with_type_map(mut self, type_map: ColumnTypeMap) -> Self {
        self.type_map = Some(type_map);
        self
    }

    /// Only process data rows in `range` (file and byte inputs).
    pub fn with_range(mut self, range: RowRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Process a delimited file on disk.
    pub async fn run_file(mut self, path: impl AsRef<Path>) -> Result<PipelineReport, PipelineFailure> {
        let path = path.as_ref();
        let mut state = self.start_state(0);
        self.publish(&mut state, Phase::Estimating);

        let file_size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) => return Err(self.fail(&mut state, CsvError::from(e).into())),
        };
        let estimate = self.estimate(file_size);
        state.tracker.revise_total(estimate);
        log_info(format!("📖 Reading {} ({} bytes, ~{} rows)", path.display(), file_size, estimate));

        self.publish(&mut state, Phase::Preparing);
        let opened = CsvRowSource::open(path).and_then(|(source, format)| match self.range {
            Some(range) => Ok((source.with_range(range)?, format)),
            None => Ok((source, format)),
        });
        match opened {
            Ok((source, format)) => self.drive(state, source, Some(format)).await,
            Err(e) => Err(self.fail(&mut state, e.into())),
        }
    }

    /// Process delimited bytes already in memory.
    pub async fn run_bytes(mut self, bytes: &[u8]) -> Result<PipelineReport, PipelineFailure> {
        let mut state = self.start_state(0);
        self.publish(&mut state, Phase::Estimating);
        let estimate = self.estimate(bytes.len() as u64);
        state.tracker.revise_total(estimate);

        self.publish(&mut state, Phase::Preparing);
        let opened = CsvRowSource::from_bytes(bytes).and_then(|(source, format)| match self.range {
            Some(range) => Ok((source.with_range(range)?, format)),
            None => Ok((source, format)),
        });
        match opened {
            Ok((source, format)) => self.drive(state, source, Some(format)).await,
            Err(e) => Err(self.fail(&mut state, e.into())),
        }
    }

    /// Process any row source; `estimated_total` seeds the progress total.
    pub async fn run_source<S: RowSource>(
        mut self,
        source: S,
        estimated_total: u64,
    ) -> Result<PipelineReport, PipelineFailure> {
        let mut state = self.start_state(estimated_total);
        self.publish(&mut state, Phase::Estimating);
        self.publish(&mut state, Phase::Preparing);
        self.drive(state, source, None).await
    }

    fn start_state(&self, estimated_total: u64) -> RunState {
        RunState {
            stats: StreamStatistics::default(),
            tracker: ProgressTracker::new(self.task_id.clone(), estimated_total)
                .with_cadence(self.config.progress_every_rows, self.config.progress_interval()),
            clean_batch: Vec::new(),
            error_batch: Vec::new(),
            flush_failures: Vec::new(),
            started: Instant::now(),
        }
    }

    fn estimate(&self, byte_len: u64) -> u64 {
        match self.range {
            Some(range) => range.len(),
            None => estimate_total_rows(byte_len, self.config.avg_row_bytes, self.config.estimate_buffer),
        }
    }

    async fn drive<S: RowSource>(
        &mut self,
        mut state: RunState,
        mut source: S,
        format: Option<DetectedFormat>,
    ) -> Result<PipelineReport, PipelineFailure> {
        if let Some(format) = &format {
            log_success(format!("Detected encoding: {}", format.encoding_name()));
            log_success(format!("Detected separator: '{}'", format_delimiter(format.delimiter_char())));
        }
        let headers = source.headers().to_vec();
        log_info(format!("📋 {} columns: {}", headers.len(), headers.join(", ")));

        // Parsing: buffer the sample and freeze the type map.
        self.publish(&mut state, Phase::Parsing);
        let mut sample = Vec::new();
        let mut exhausted = false;
        let (type_map, profiles) = match self.type_map.clone() {
            Some(map) => (map, Vec::new()),
            None => {
                let sample_rows = self.config.inference.sample_rows;
                while sample.len() < sample_rows {
                    if self.cancel.is_cancelled() {
                        return Err(self.cancelled(&mut state).await);
                    }
                    match source.next_row() {
                        Some(Ok(row)) => sample.push(row),
                        Some(Err(e)) => return Err(self.fail(&mut state, e.into())),
                        None => {
                            exhausted = true;
                            break;
                        }
                    }
                }
                let report = ColumnInferencer::new(self.config.inference.clone()).infer(&headers, &sample);
                (report.type_map, report.profiles)
            }
        };

        if type_map.is_empty() && !(exhausted && sample.is_empty()) {
            return Err(self.fail(&mut state, PipelineError::InferenceNotReady));
        }
        log_info("🔎 Column types:");
        for (column, ty) in type_map.iter() {
            log_info_indent(format!("{} → {}", column, ty), 1);
        }
        if exhausted {
            // The whole input fit in the sample, so the total is exact.
            state.tracker.revise_total(sample.len() as u64);
        }

        // Cleaning: buffered sample first, then the rest of the stream.
        let cleaner = RowCleaner::new(type_map.clone(), self.strategy.clone());
        self.publish(&mut state, Phase::Cleaning);
        let mut buffered = sample.into_iter();
        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(&mut state).await);
            }
            let row = match buffered.next() {
                Some(row) => row,
                None if exhausted => break,
                None => match source.next_row() {
                    Some(Ok(row)) => row,
                    Some(Err(e)) => return Err(self.fail(&mut state, e.into())),
                    None => break,
                },
            };
            self.process_row(&mut state, &cleaner, &row).await?;
        }

        // Finalizing: flush partial batches.
        self.flush_all(&mut state).await?;
        self.publish(&mut state, Phase::Finalizing);
        self.publish(&mut state, Phase::Completed);

        let stats = &state.stats;
        log_success(format!(
            "Processed {} rows: {} clean, {} exceptions",
            stats.total_rows, stats.processed_rows, stats.error_rows
        ));
        if !state.flush_failures.is_empty() {
            log_warning(format!("{} batches could not be persisted", state.flush_failures.len()));
        }

        Ok(PipelineReport {
            task_id: self.task_id.clone(),
            format,
            headers,
            type_map,
            profiles,
            elapsed_ms: state.started.elapsed().as_millis() as u64,
            statistics: state.stats,
            flush_failures: state.flush_failures,
        })
    }

    async fn process_row(
        &mut self,
        state: &mut RunState,
        cleaner: &RowCleaner,
        row: &RawRow,
    ) -> Result<(), PipelineFailure> {
        let outcome = cleaner.clean_row(row);
        state.stats.record(&outcome);
        match outcome {
            RowOutcome::Clean(clean) => state.clean_batch.push(clean),
            RowOutcome::Exception(exception) => state.error_batch.push(exception),
        }

        let batch_size = self.config.batch_size;
        if state.clean_batch.len() >= batch_size {
            self.publish(state, Phase::SavingBatch);
            self.flush_clean(state).await?;
            self.publish(state, Phase::Cleaning);
        }
        if state.error_batch.len() >= batch_size {
            self.publish(state, Phase::SavingBatch);
            self.flush_errors(state).await?;
            self.publish(state, Phase::Cleaning);
        }

        if state.tracker.is_due(state.stats.seen(), Instant::now()) {
            self.publish(state, Phase::Cleaning);
        }
        Ok(())
    }

    async fn flush_all(&mut self, state: &mut RunState) -> Result<(), PipelineFailure> {
        if state.clean_batch.is_empty() && state.error_batch.is_empty() {
            return Ok(());
        }
        self.publish(state, Phase::SavingBatch);
        self.flush_clean(state).await?;
        self.flush_errors(state).await
    }

    async fn flush_clean(&mut self, state: &mut RunState) -> Result<(), PipelineFailure> {
        if state.clean_batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut state.clean_batch);
        let result = flush_with_retry(&mut *self.clean_sink, &batch, &self.config).await;
        let (first, last) = row_span(batch.iter().map(|r| r.row_number));
        match result {
            Ok(()) => {
                state.stats.persisted_clean_rows += batch.len() as u64;
                state.stats.flushed_batches += 1;
                Ok(())
            }
            Err((error, attempts)) => {
                self.record_flush_failure(state, SinkKind::Clean, (first, last), batch.len(), attempts, error)
            }
        }
    }

    async fn flush_errors(&mut self, state: &mut RunState) -> Result<(), PipelineFailure> {
        if state.error_batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut state.error_batch);
        let result = flush_with_retry(&mut *self.error_sink, &batch, &self.config).await;
        let (first, last) = row_span(batch.iter().map(|r| r.row_number));
        match result {
            Ok(()) => {
                state.stats.persisted_error_rows += batch.len() as u64;
                state.stats.flushed_batches += 1;
                Ok(())
            }
            Err((error, attempts)) => {
                self.record_flush_failure(state, SinkKind::Error, (first, last), batch.len(), attempts, error)
            }
        }
    }

    fn record_flush_failure(
        &mut self,
        state: &mut RunState,
        sink: SinkKind,
        (first_row, last_row): (u64, u64),
        rows: usize,
        attempts: u32,
        error: SinkError,
    ) -> Result<(), PipelineFailure> {
        state.stats.failed_batches += 1;
        log_error(format!(
            "Batch of rows {}-{} lost after {} attempts: {}",
            first_row, last_row, attempts, error
        ));
        state.flush_failures.push(FlushFailure {
            sink,
            first_row,
            last_row,
            rows,
            attempts,
            error: error.to_string(),
        });
        if self.config.abort_on_sink_failure {
            return Err(self.fail(state, error.into()));
        }
        Ok(())
    }

    /// Flush whatever was accumulated, then report the cancellation.
    async fn cancelled(&mut self, state: &mut RunState) -> PipelineFailure {
        log_warning(format!("Task {} cancelled after {} rows", self.task_id, state.stats.seen()));
        if let Err(failure) = self.flush_all(state).await {
            return failure;
        }
        self.fail(state, PipelineError::Cancelled)
    }

    fn fail(&mut self, state: &mut RunState, error: PipelineError) -> PipelineFailure {
        log_error(format!("Task {} failed: {}", self.task_id, error));
        self.publish(state, Phase::Failed);
        PipelineFailure {
            task_id: self.task_id.clone(),
            error,
            statistics: state.stats.clone(),
        }
    }

    fn publish(&mut self, state: &mut RunState, phase: Phase) {
        let snapshot = state.tracker.snapshot(state.stats.seen(), phase);
        self.progress.publish(snapshot);
    }
}

/// Flush one batch, retrying with a fixed delay. On failure returns the
/// last error and the number of attempts made.
async fn flush_with_retry<T, S>(sink: &mut S, rows: &[T], config: &PipelineConfig) -> Result<(), (SinkError, u32)>
where
    T: Sync,
    S: RowSink<T>,
{
    let max_attempts = config.sink_max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match sink.flush(rows).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= max_attempts => return Err((e, attempt)),
            Err(e) => {
                log_warning(format!(
                    "Flush to {} failed (attempt {}/{}): {}",
                    sink.name(),
                    attempt,
                    max_attempts,
                    e
                ));
                tokio::time::sleep(config.sink_retry_delay()).await;
            }
        }
    }
}

fn row_span(mut rows: impl Iterator<Item = u64>) -> (u64, u64) {
    let first = rows.next().unwrap_or(0);
    let last = rows.last().unwrap_or(first);
    (first, last)
}
