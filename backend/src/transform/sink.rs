//! Output sinks for clean rows, exception rows and progress snapshots.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::io;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::error::{SinkError, SinkResult};
use crate::models::{ExceptionRow, ProgressSnapshot};

// =============================================================================
// Row sinks
// =============================================================================

/// Receives bounded batches of rows.
///
/// A flush either persists the whole batch or fails without persisting any
/// of it; the pipeline may call it again with the same batch after a failure.
pub trait RowSink<T> {
    /// Name used in errors and logs.
    fn name(&self) -> &str;

    fn flush(&mut self, rows: &[T]) -> impl Future<Output = SinkResult<()>> + Send;
}

/// Keeps every flushed batch in memory.
#[derive(Debug, Clone)]
pub struct MemorySink<T> {
    batches: Vec<Vec<T>>,
    failures_left: u32,
}

impl<T: Clone> MemorySink<T> {
    pub fn new() -> Self {
        Self {
            batches: Vec::new(),
            failures_left: 0,
        }
    }

    /// Make the next `attempts` flushes fail.
    pub fn failing(mut self, attempts: u32) -> Self {
        self.failures_left = attempts;
        self
    }

    pub fn batches(&self) -> &[Vec<T>] {
        &self.batches
    }

    pub fn rows(&self) -> Vec<T> {
        self.batches.iter().flatten().cloned().collect()
    }

    pub fn row_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

impl<T: Clone> Default for MemorySink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> RowSink<T> for MemorySink<T> {
    fn name(&self) -> &str {
        "memory"
    }

    async fn flush(&mut self, rows: &[T]) -> SinkResult<()> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(SinkError::new("memory", "simulated flush failure"));
        }
        self.batches.push(rows.to_vec());
        Ok(())
    }
}

/// Appends one JSON object per row to a file.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
    name: String,
}

impl JsonLinesSink {
    /// Create (or truncate) the output file.
    pub async fn create(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, b"").await?;
        Ok(Self::append_to(path))
    }

    /// Append to an existing file, e.g. one chunk worker's share of a
    /// shared output.
    pub fn append_to(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Serialize + Sync> RowSink<T> for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn flush(&mut self, rows: &[T]) -> SinkResult<()> {
        let mut buf = Vec::with_capacity(rows.len() * 128);
        for row in rows {
            serde_json::to_writer(&mut buf, row).map_err(|e| SinkError::new(&self.name, e.to_string()))?;
            buf.push(b'\n');
        }

        let io_err = |e: io::Error| SinkError::new(&self.name, e.to_string());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        append_all_or_nothing(&mut file, &buf).await.map_err(io_err)
    }
}

/// An append target that can be cut back to an earlier length.
trait Truncate: AsyncWrite + Unpin + Send {
    fn current_len(&mut self) -> impl Future<Output = io::Result<u64>> + Send;

    fn truncate_to(&mut self, len: u64) -> impl Future<Output = io::Result<()>> + Send;
}

impl Truncate for File {
    async fn current_len(&mut self) -> io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len).await
    }
}

/// Append `buf`, or leave the target at its previous length on failure so a
/// retried batch is never written twice.
async fn append_all_or_nothing<W: Truncate>(target: &mut W, buf: &[u8]) -> io::Result<()> {
    let start = target.current_len().await?;
    let mut written = target.write_all(buf).await;
    if written.is_ok() {
        written = target.flush().await;
    }

    if let Err(e) = written {
        if let Err(undo) = target.truncate_to(start).await {
            return Err(io::Error::new(e.kind(), format!("{}; rollback failed: {}", e, undo)));
        }
        return Err(e);
    }
    Ok(())
}

/// Read a JSON Lines file back, one value per non-blank line.
pub async fn read_json_lines<T: DeserializeOwned>(path: impl AsRef<Path>) -> SinkResult<Vec<T>> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| SinkError::new(&name, e.to_string()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| SinkError::new(&name, format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// Exception rows exactly as an error sink wrote them.
pub async fn read_exception_rows(path: impl AsRef<Path>) -> SinkResult<Vec<ExceptionRow>> {
    read_json_lines(path).await
}

// =============================================================================
// Progress sinks
// =============================================================================

/// Receives progress snapshots. Publishing never fails the run.
pub trait ProgressSink {
    fn publish(&mut self, snapshot: ProgressSnapshot);
}

/// Discards snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn publish(&mut self, _snapshot: ProgressSnapshot) {}
}

impl ProgressSink for Vec<ProgressSnapshot> {
    fn publish(&mut self, snapshot: ProgressSnapshot) {
        self.push(snapshot);
    }
}

impl<P: ProgressSink + ?Sized> ProgressSink for &mut P {
    fn publish(&mut self, snapshot: ProgressSnapshot) {
        (**self).publish(snapshot);
    }
}

impl ProgressSink for broadcast::Sender<ProgressSnapshot> {
    fn publish(&mut self, snapshot: ProgressSnapshot) {
        // Nobody listening is fine.
        let _ = self.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldError, Phase, RowFields};
    use chrono::Utc;
    use serde_json::json;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// In-memory target that accepts `capacity` more bytes, then errors.
    struct TornTarget {
        data: Vec<u8>,
        capacity: usize,
    }

    impl AsyncWrite for TornTarget {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            if self.capacity == 0 {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "no space left on device")));
            }
            let n = buf.len().min(self.capacity);
            self.capacity -= n;
            self.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl Truncate for TornTarget {
        async fn current_len(&mut self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        async fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    fn exception(row_number: u64) -> ExceptionRow {
        let mut original = RowFields::new();
        original.insert("手机号码".into(), json!("138-1234-5678"));
        ExceptionRow {
            row_number,
            original_data: original.clone(),
            cleaned_data: original,
            errors: vec![FieldError {
                field: "手机号码".into(),
                original_value: json!("138-1234-5678"),
                error_type: "PHONE".into(),
                error_message: "invalid phone number".into(),
            }],
        }
    }

    #[tokio::test]
    async fn test_memory_sink_failures() {
        let mut sink = MemorySink::<i32>::new().failing(1);
        assert!(sink.flush(&[1, 2]).await.is_err());
        sink.flush(&[1, 2]).await.unwrap();
        sink.flush(&[3]).await.unwrap();
        assert_eq!(sink.batches().len(), 2);
        assert_eq!(sink.rows(), vec![1, 2, 3]);
        assert_eq!(sink.row_count(), 3);
    }

    #[tokio::test]
    async fn test_json_lines_round_trip_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/errors.jsonl");

        let mut sink = JsonLinesSink::create(&path).await.unwrap();
        sink.flush(&[exception(2), exception(5)][..]).await.unwrap();
        sink.flush(&[exception(9)][..]).await.unwrap();

        let rows = read_exception_rows(&path).await.unwrap();
        assert_eq!(rows, vec![exception(2), exception(5), exception(9)]);

        let raw = std::fs::read_to_string(&path).unwrap();
        let first: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(first["rowNumber"], 2);
        assert_eq!(first["errors"][0]["errorType"], "PHONE");
        assert_eq!(first["errors"][0]["originalValue"], "138-1234-5678");
    }

    #[tokio::test]
    async fn test_create_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.jsonl");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = JsonLinesSink::create(&path).await.unwrap();
        RowSink::<serde_json::Value>::flush(&mut sink, &[json!({"a": 1})]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}\n");
    }

    #[tokio::test]
    async fn test_partial_append_is_rolled_back() {
        let mut target = TornTarget {
            data: b"{\"a\":1}\n".to_vec(),
            capacity: 5,
        };
        let err = append_all_or_nothing(&mut target, b"{\"a\":2}\n{\"a\":3}\n").await.unwrap_err();
        assert!(err.to_string().contains("no space"));
        assert_eq!(target.data, b"{\"a\":1}\n");

        // Room again: the retried batch lands exactly once.
        target.capacity = usize::MAX;
        append_all_or_nothing(&mut target, b"{\"a\":2}\n{\"a\":3}\n").await.unwrap();
        assert_eq!(target.data, b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");
    }

    #[tokio::test]
    async fn test_read_rejects_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"rowNumber\": 1}\n").unwrap();
        let err = read_exception_rows(&path).await.unwrap_err();
        assert!(err.message.contains("line 1"));
    }

    #[test]
    fn test_broadcast_progress_sink() {
        let (mut tx, mut rx) = broadcast::channel(4);
        tx.publish(ProgressSnapshot {
            task_id: "t".into(),
            progress_percent: 10,
            processed_rows: 1,
            total_rows: 10,
            current_phase: Phase::Cleaning,
            estimated_time_remaining_ms: None,
            last_updated: Utc::now(),
        });
        assert_eq!(rx.try_recv().unwrap().progress_percent, 10);
    }
}
