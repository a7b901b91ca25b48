//! Bounded path window.
//!
//! A ring buffer of `PathPoint`s ordered oldest -> newest. Storage starts
//! small and doubles as points arrive, up to `max_len`. Once `max_len` points
//! are held, the oldest point is evicted before the new one is stored, so the
//! retained points are always the most recent `max_len` in arrival order.

use std::fmt;

use contracts::PathPoint;
use ringbuf::{traits::*, HeapRb};

/// Slots allocated for a fresh path
const INITIAL_CAPACITY: usize = 64;

/// Per-vehicle path history
pub struct PathBuffer {
    points: HeapRb<PathPoint>,
    max_len: usize,
    evicted_count: u64,
}

impl fmt::Debug for PathBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathBuffer")
            .field("len", &self.points.occupied_len())
            .field("max_len", &self.max_len)
            .field("evicted", &self.evicted_count)
            .finish()
    }
}

impl PathBuffer {
    /// Create a path buffer holding at most `max_len` points (at least 1)
    #[inline]
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            points: HeapRb::new(max_len.min(INITIAL_CAPACITY)),
            max_len,
            evicted_count: 0,
        }
    }

    /// Append a point, returning the evicted oldest point if the window was full
    #[inline]
    pub fn push(&mut self, point: PathPoint) -> Option<PathPoint> {
        if self.points.is_full() && self.points.occupied_len() < self.max_len {
            self.grow();
        }
        let evicted = if self.points.is_full() {
            self.evicted_count += 1;
            self.points.try_pop()
        } else {
            None
        };
        let _ = self.points.try_push(point);
        evicted
    }

    fn grow(&mut self) {
        let len = self.points.occupied_len();
        let capacity = len.saturating_mul(2).clamp(1, self.max_len);
        let mut grown = HeapRb::new(capacity);
        while let Some(point) = self.points.try_pop() {
            let _ = grown.try_push(point);
        }
        self.points = grown;
    }

    /// Oldest -> newest
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PathPoint> + '_ {
        self.points.iter()
    }

    /// Copy out the path, oldest first
    pub fn to_vec(&self) -> Vec<PathPoint> {
        self.points.iter().copied().collect()
    }

    /// Most recent point
    pub fn last(&self) -> Option<&PathPoint> {
        self.points.iter().last()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Points evicted since creation
    #[inline]
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count
    }

    /// Drop all points, keeping capacity
    pub fn clear(&mut self) {
        while self.points.try_pop().is_some() {}
    }
}
