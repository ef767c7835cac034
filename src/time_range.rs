//! Enumeration of the months covered by a run.

use crate::error::HarvestError;
use crate::models::TimeUnit;
use std::iter::FusedIterator;

/// An inclusive, validated `[start, end]` range of months.
///
/// Iterating is lazy and has no side effects; calling [`TimeRange::iter`]
/// again restarts from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: TimeUnit,
    end: TimeUnit,
}

impl TimeRange {
    /// # Errors
    ///
    /// Returns [`HarvestError::Configuration`] when `end` precedes `start`.
    pub fn new(start: TimeUnit, end: TimeUnit) -> Result<Self, HarvestError> {
        if end < start {
            return Err(HarvestError::Configuration(format!(
                "end of range {end} precedes start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> TimeUnit {
        self.start
    }

    pub fn end(&self) -> TimeUnit {
        self.end
    }

    /// Number of months in the range.
    pub fn len(&self) -> usize {
        let months = (self.end.year() - self.start.year()) * 12 + self.end.month() as i32
            - self.start.month() as i32;
        months as usize + 1
    }

    pub fn iter(&self) -> TimeRangeIter {
        TimeRangeIter {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl IntoIterator for &TimeRange {
    type Item = TimeUnit;
    type IntoIter = TimeRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TimeRangeIter {
    next: Option<TimeUnit>,
    end: TimeUnit,
}

impl Iterator for TimeRangeIter {
    type Item = TimeUnit;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = (current < self.end).then(|| current.succ());
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .next
            .map(|n| TimeRange { start: n, end: self.end }.len())
            .unwrap_or(0);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TimeRangeIter {}

impl FusedIterator for TimeRangeIter {}
