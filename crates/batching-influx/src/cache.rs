// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending point cache.
//!
//! Accumulates points between flushes. A flush takes the whole batch in one
//! swap, so the batch being written is never the one accepting new points.

use crate::point::Point;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Points waiting for the next flush.
///
/// The cache reports when it is full:
/// - `add` returns `true` once the pending count reaches `max_size`
/// - the caller decides when to `take` the batch
pub struct PointCache {
    points: Mutex<Vec<Point>>,
    max_size: AtomicUsize,
}

impl PointCache {
    /// Create an empty cache that reports full at `max_size` points.
    pub fn new(max_size: usize) -> Self {
        Self {
            points: Mutex::new(Vec::new()),
            max_size: AtomicUsize::new(max_size),
        }
    }

    /// Append points in order.
    ///
    /// Returns `true` if the cache now holds at least `max_size` points and
    /// should be flushed.
    pub fn add<I>(&self, points: I) -> bool
    where
        I: IntoIterator<Item = Point>,
    {
        let mut pending = self.points.lock();
        pending.extend(points);
        pending.len() >= self.max_size()
    }

    /// Swap the pending batch for an empty one, returning it.
    pub fn take(&self) -> Vec<Point> {
        std::mem::take(&mut *self.points.lock())
    }

    /// Get the current number of pending points.
    pub fn len(&self) -> usize {
        self.points.lock().len()
    }

    /// Check if there is nothing to flush.
    pub fn is_empty(&self) -> bool {
        self.points.lock().is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Relaxed)
    }

    /// Change the flush threshold. Takes effect on the next `add`.
    pub fn set_max_size(&self, max_size: usize) {
        self.max_size.store(max_size, Ordering::Relaxed);
    }
}
