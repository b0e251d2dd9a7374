//! Row processing.
//!
//! - Engine: cleans one row against a frozen type map
//! - Progress: percentage and ETA for a run
//! - Sink: batch, error and progress outputs
//! - Pipeline: the streaming state machine tying it together
//! - Chunk: row range planning for parallel workers

pub mod chunk;
pub mod engine;
pub mod pipeline;
pub mod progress;
pub mod sink;

pub use chunk::partition_rows;
pub use engine::{CleaningStrategy, RowCleaner};
pub use pipeline::{CancelToken, FlushFailure, IngestPipeline, PipelineReport, SinkKind};
pub use progress::ProgressTracker;
pub use sink::{
    read_exception_rows, read_json_lines, JsonLinesSink, MemorySink, NoProgress, ProgressSink, RowSink,
};
