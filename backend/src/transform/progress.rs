//! Progress tracking for one run.
//!
//! Turns row counters into [`ProgressSnapshot`]s. The reported percentage
//! never goes down within a run, and snapshots are only due at the
//! configured cadence (every N rows or every interval, whichever first).

use chrono::Utc;
use std::time::{Duration, Instant};

use crate::models::{Phase, ProgressSnapshot};

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    task_id: String,
    total_rows: u64,
    started: Instant,
    last_percent: u8,
    every_rows: u64,
    interval: Duration,
    last_published_rows: u64,
    last_published_at: Instant,
}

impl ProgressTracker {
    pub fn new(task_id: impl Into<String>, total_rows: u64) -> Self {
        Self::starting_at(task_id, total_rows, Instant::now())
    }

    pub fn starting_at(task_id: impl Into<String>, total_rows: u64, started: Instant) -> Self {
        Self {
            task_id: task_id.into(),
            total_rows,
            started,
            last_percent: 0,
            every_rows: 500,
            interval: Duration::from_secs(2),
            last_published_rows: 0,
            last_published_at: started,
        }
    }

    pub fn with_cadence(mut self, every_rows: u64, interval: Duration) -> Self {
        self.every_rows = every_rows.max(1);
        self.interval = interval;
        self
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Replace the row estimate. A smaller total can only hold the
    /// percentage where it is, never push it back.
    pub fn revise_total(&mut self, total_rows: u64) {
        self.total_rows = total_rows;
    }

    /// Whether a snapshot is due for `processed` rows.
    pub fn is_due(&self, processed: u64, now: Instant) -> bool {
        processed.saturating_sub(self.last_published_rows) >= self.every_rows
            || now.saturating_duration_since(self.last_published_at) >= self.interval
    }

    pub fn snapshot(&mut self, processed: u64, phase: Phase) -> ProgressSnapshot {
        self.snapshot_at(processed, phase, Instant::now())
    }

    /// Build a snapshot and mark it as published.
    pub fn snapshot_at(&mut self, processed: u64, phase: Phase, now: Instant) -> ProgressSnapshot {
        let percent = match phase {
            Phase::Completed => 100,
            _ => self.percent_for(processed),
        };
        self.last_percent = self.last_percent.max(percent);
        self.last_published_rows = processed;
        self.last_published_at = now;

        ProgressSnapshot {
            task_id: self.task_id.clone(),
            progress_percent: self.last_percent,
            processed_rows: processed,
            total_rows: self.total_rows,
            current_phase: phase,
            estimated_time_remaining_ms: match phase {
                Phase::Completed | Phase::Failed => Some(0),
                _ => self.eta_ms(processed, now),
            },
            last_updated: Utc::now(),
        }
    }

    /// `round(processed / total * 100)`, held below 100 until the run completes.
    fn percent_for(&self, processed: u64) -> u8 {
        if self.total_rows == 0 {
            return 0;
        }
        let raw = (processed as f64 / self.total_rows as f64 * 100.0).round();
        raw.clamp(0.0, 99.0) as u8
    }

    fn eta_ms(&self, processed: u64, now: Instant) -> Option<u64> {
        if processed == 0 {
            return None;
        }
        let remaining = self.total_rows.saturating_sub(processed);
        let elapsed = now.saturating_duration_since(self.started).as_millis() as f64;
        Some((elapsed * remaining as f64 / processed as f64).round().max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_and_eta() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at("t1", 200, start);

        let first = tracker.snapshot_at(0, Phase::Cleaning, start);
        assert_eq!(first.progress_percent, 0);
        assert_eq!(first.estimated_time_remaining_ms, None);

        let snap = tracker.snapshot_at(50, Phase::Cleaning, start + Duration::from_millis(1000));
        assert_eq!(snap.progress_percent, 25);
        assert_eq!(snap.estimated_time_remaining_ms, Some(3000));
        assert_eq!(snap.total_rows, 200);
        assert_eq!(snap.task_id, "t1");
    }

    #[test]
    fn test_percent_never_regresses() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at("t2", 100, start);
        assert_eq!(tracker.snapshot_at(60, Phase::Cleaning, start).progress_percent, 60);

        tracker.revise_total(1000);
        let snap = tracker.snapshot_at(70, Phase::Cleaning, start);
        assert_eq!(snap.progress_percent, 60);
        assert_eq!(snap.total_rows, 1000);
    }

    #[test]
    fn test_overrun_estimate_stays_below_100_until_completed() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at("t3", 10, start);
        let snap = tracker.snapshot_at(25, Phase::Cleaning, start + Duration::from_millis(10));
        assert_eq!(snap.progress_percent, 99);
        assert_eq!(snap.estimated_time_remaining_ms, Some(0));

        let done = tracker.snapshot_at(25, Phase::Completed, start);
        assert_eq!(done.progress_percent, 100);
    }

    #[test]
    fn test_zero_total() {
        let mut tracker = ProgressTracker::new("t4", 0);
        assert_eq!(tracker.snapshot(0, Phase::Preparing).progress_percent, 0);
        assert_eq!(tracker.snapshot(0, Phase::Completed).progress_percent, 100);
    }

    #[test]
    fn test_cadence() {
        let start = Instant::now();
        let mut tracker =
            ProgressTracker::starting_at("t5", 1000, start).with_cadence(100, Duration::from_millis(500));

        assert!(!tracker.is_due(99, start));
        assert!(tracker.is_due(100, start));
        assert!(tracker.is_due(1, start + Duration::from_millis(500)));

        tracker.snapshot_at(100, Phase::Cleaning, start + Duration::from_millis(10));
        assert!(!tracker.is_due(150, start + Duration::from_millis(20)));
        assert!(tracker.is_due(200, start + Duration::from_millis(20)));
    }
}
