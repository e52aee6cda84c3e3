//! Range planning for pan-dl
//!
//! Splits a resource of known length into contiguous, non-overlapping byte
//! ranges. Ranges are half-open `[start, end)`; only the HTTP header uses the
//! inclusive last byte.

use std::fmt;

use crate::core::error::{Error, Result};

/// Per-worker share below which a rebalanced plan collapses into one range
pub const MIN_SPLIT_SIZE: u64 = 64 * 1024;

/// A half-open byte range `[start, end)` of the target resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Range` header value; HTTP byte ranges name the last byte inclusively
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Lazy, ordered sequence of ranges covering `[0, total)`
#[derive(Debug, Clone)]
pub struct RangePlan {
    total: u64,
    block_size: u64,
    next: u64,
}

impl Iterator for RangePlan {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        if self.next >= self.total {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.block_size).min(self.total);
        self.next = end;
        Some(ChunkRange::new(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = range_count(self.total - self.next, self.block_size);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RangePlan {}

/// Plan the ranges for a resource of `total` bytes.
///
/// Yields `total / block_size` full blocks followed by a single trailing range
/// for the remainder, if any. A zero-length resource yields nothing.
pub fn plan_ranges(total: u64, block_size: u64) -> Result<RangePlan> {
    if block_size == 0 {
        return Err(Error::InvalidInput("block size must be greater than zero".to_string()));
    }
    Ok(RangePlan { total, block_size, next: 0 })
}

/// Number of ranges `plan_ranges(total, block_size)` yields
pub fn range_count(total: u64, block_size: u64) -> u64 {
    if block_size == 0 {
        return 0;
    }
    total.div_ceil(block_size)
}

/// Shrink the block size so a small file is spread over all workers.
///
/// Only applies when `total < block_size * workers`. A per-worker share under
/// [`MIN_SPLIT_SIZE`] is not worth splitting, so the whole file becomes a
/// single range.
pub fn balanced_block_size(total: u64, block_size: u64, workers: usize) -> u64 {
    let workers = workers.max(1) as u64;
    if total >= block_size.saturating_mul(workers) {
        return block_size;
    }

    let share = total.div_ceil(workers);
    if share < MIN_SPLIT_SIZE {
        total.max(1)
    } else {
        share
    }
}

/// Number of workers actually worth starting for a plan
pub fn effective_workers(requested: usize, ranges: u64) -> usize {
    let ranges = usize::try_from(ranges).unwrap_or(usize::MAX);
    requested.min(ranges).max(1)
}
