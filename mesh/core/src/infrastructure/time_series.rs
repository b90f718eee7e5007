// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fixed-capacity ring buffer and the time-series buffer built on it.
//!
//! Window queries scan every stored point (bounded by capacity) and keep those
//! with `ts >= now - window_ms`. There is no index.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Circular buffer that overwrites its oldest element once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint<T> {
    /// Epoch milliseconds
    pub ts: i64,
    pub value: T,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer<T> {
    points: RingBuffer<TimePoint<T>>,
}

impl<T> TimeSeriesBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: RingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, ts: i64, value: T) {
        self.points.push(TimePoint { ts, value });
    }

    /// Most recently pushed point, regardless of its timestamp.
    pub fn latest(&self) -> Option<&TimePoint<T>> {
        self.points.latest()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points with `ts >= now - window_ms`, oldest pushed first.
    pub fn window(&self, window_ms: i64, now: i64) -> impl Iterator<Item = &TimePoint<T>> {
        let cutoff = now.saturating_sub(window_ms);
        self.points.iter().filter(move |p| p.ts >= cutoff)
    }

    pub fn for_each_in_window<F>(&self, window_ms: i64, now: i64, mut f: F)
    where
        F: FnMut(&TimePoint<T>),
    {
        for point in self.window(window_ms, now) {
            f(point);
        }
    }
}

impl<T: Copy + Into<f64>> TimeSeriesBuffer<T> {
    /// Min/max/avg over the finite values in the window. Returns all zeros
    /// when nothing qualifies.
    pub fn numeric_stats(&self, window_ms: i64, now: i64) -> NumericStats {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count = 0usize;

        for point in self.window(window_ms, now) {
            let v: f64 = point.value.into();
            if !v.is_finite() {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }

        if count == 0 {
            return NumericStats::default();
        }

        NumericStats {
            min,
            max,
            avg: sum / count as f64,
            count,
        }
    }
}
