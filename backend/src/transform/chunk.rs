//! Chunk planning for parallel workers.
//!
//! Each worker gets one contiguous [`RowRange`] and runs its own pipeline
//! with a shared, pre-inferred type map. Spawning and supervising the
//! workers belongs to the orchestrator.

use crate::parser::RowRange;

/// Split rows `1..=row_count` into at most `workers` contiguous ranges.
///
/// Range sizes differ by at most one, larger ranges first. Workers beyond
/// `row_count` get nothing, so no range is empty; zero workers is treated
/// as one.
pub fn partition_rows(row_count: u64, workers: u64) -> Vec<RowRange> {
    if row_count == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, row_count);
    let base = row_count / workers;
    let extra = row_count % workers;

    let mut ranges = Vec::with_capacity(workers as usize);
    let mut start = 1;
    for i in 0..workers {
        let len = base + u64::from(i < extra);
        ranges.push(RowRange::new(start, start + len - 1));
        start += len;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(row_count: u64, workers: u64) {
        let ranges = partition_rows(row_count, workers);
        if row_count == 0 {
            assert!(ranges.is_empty());
            return;
        }

        let sizes: Vec<u64> = ranges.iter().map(RowRange::len).collect();
        let min = *sizes.iter().min().unwrap();
        let max = *sizes.iter().max().unwrap();
        assert!(max - min <= 1, "{row_count}/{workers}: sizes {sizes:?}");
        assert!(min >= 1);

        assert_eq!(ranges.first().unwrap().start_row, 1);
        assert_eq!(ranges.last().unwrap().end_row, row_count);
        for pair in ranges.windows(2) {
            assert_eq!(pair[1].start_row, pair[0].end_row + 1, "gap or overlap");
        }
        assert_eq!(sizes.iter().sum::<u64>(), row_count);
    }

    #[test]
    fn test_even_and_uneven_splits() {
        assert_eq!(
            partition_rows(10, 3),
            vec![RowRange::new(1, 4), RowRange::new(5, 7), RowRange::new(8, 10)]
        );
        assert_eq!(partition_rows(9, 3), vec![RowRange::new(1, 3), RowRange::new(4, 6), RowRange::new(7, 9)]);
    }

    #[test]
    fn test_more_workers_than_rows() {
        assert_eq!(partition_rows(2, 5), vec![RowRange::new(1, 1), RowRange::new(2, 2)]);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(partition_rows(0, 4).is_empty());
        assert_eq!(partition_rows(7, 0), vec![RowRange::new(1, 7)]);
    }

    #[test]
    fn test_partition_invariants() {
        for row_count in 0..=60 {
            for workers in 0..=12 {
                assert_partition(row_count, workers);
            }
        }
        assert_partition(1_000_003, 7);
    }
}
