//! Calendar primitives: date ranges, half-day blocks, time of day.
//!
//! # Time Model
//! Scheduling works at half-day granularity. A [`Block`] is one AM or PM
//! slot on a calendar date. Date ranges are closed intervals `[start, end]`
//! of calendar dates (both ends inclusive), matching how duty periods and
//! absences are declared.

use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// A closed interval of calendar dates `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First date (inclusive).
    pub start: NaiveDate,
    /// Last date (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new date range. Does not validate ordering; see [`DateRange::is_valid`].
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// A single-day range.
    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// Whether `start <= end`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Number of days covered (0 for an inverted range).
    pub fn days(&self) -> i64 {
        if !self.is_valid() {
            return 0;
        }
        (self.end - self.start).num_days() + 1
    }

    /// Whether a date falls within this range.
    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Whether two ranges share at least one date.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Shared dates of two ranges, if any.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(Self { start, end })
    }

    /// Grows the range by `before` days at the start and `after` days at the end.
    pub fn extend(&self, before: i64, after: i64) -> Self {
        Self {
            start: self.start - Duration::days(before),
            end: self.end + Duration::days(after),
        }
    }

    /// Iterates over every date in the range.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.days()).map(move |offset| start + Duration::days(offset))
    }

    /// Zero-based day offset of `date` from the range start.
    #[inline]
    pub fn offset_of(&self, date: NaiveDate) -> i64 {
        (date - self.start).num_days()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Half-day period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeOfDay {
    /// Morning block.
    AM,
    /// Afternoon block.
    PM,
}

impl TimeOfDay {
    /// Both periods in chronological order.
    pub const ALL: [TimeOfDay; 2] = [TimeOfDay::AM, TimeOfDay::PM];

    /// Short label used in block identifiers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AM => "AM",
            Self::PM => "PM",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schedulable half-day slot.
///
/// Unique per `(date, time_of_day)`. Created once per schedule horizon and
/// never mutated afterwards except for soft deactivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Stable identifier (`YYYY-MM-DD-AM`).
    pub id: String,
    /// Calendar date.
    pub date: NaiveDate,
    /// Morning or afternoon.
    pub time_of_day: TimeOfDay,
    /// Ordering key (chronological within a horizon).
    pub sequence: u32,
    /// Soft-deactivated blocks receive no demand.
    pub active: bool,
}

impl Block {
    /// Creates an active block.
    pub fn new(date: NaiveDate, time_of_day: TimeOfDay, sequence: u32) -> Self {
        Self {
            id: Self::id_for(date, time_of_day),
            date,
            time_of_day,
            sequence,
            active: true,
        }
    }

    /// Identifier for a date/time-of-day pair.
    pub fn id_for(date: NaiveDate, time_of_day: TimeOfDay) -> String {
        format!("{}-{}", date.format("%Y-%m-%d"), time_of_day)
    }

    /// Generates the AM/PM blocks of every date in `range`, sequenced from 0.
    pub fn horizon(range: DateRange) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(range.days().max(0) as usize * 2);
        for date in range.iter_days() {
            for tod in TimeOfDay::ALL {
                let seq = blocks.len() as u32;
                blocks.push(Block::new(date, tod, seq));
            }
        }
        blocks
    }

    /// Soft-deactivates the block.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_range_basics() {
        let r = DateRange::new(d(2025, 1, 1), d(2025, 1, 28));
        assert!(r.is_valid());
        assert_eq!(r.days(), 28);
        assert!(r.contains(d(2025, 1, 1)));
        assert!(r.contains(d(2025, 1, 28)));
        assert!(!r.contains(d(2025, 1, 29)));
        assert_eq!(r.iter_days().count(), 28);
        assert_eq!(r.offset_of(d(2025, 1, 10)), 9);
    }

    #[test]
    fn test_inverted_range() {
        let r = DateRange::new(d(2025, 2, 1), d(2025, 1, 1));
        assert!(!r.is_valid());
        assert_eq!(r.days(), 0);
        assert_eq!(r.iter_days().count(), 0);
    }

    #[test]
    fn test_overlap_inclusive_ends() {
        let a = DateRange::new(d(2025, 1, 1), d(2025, 1, 10));
        let b = DateRange::new(d(2025, 1, 10), d(2025, 1, 20));
        let c = DateRange::new(d(2025, 1, 11), d(2025, 1, 20));
        assert!(a.overlaps(&b)); // shared end date
        assert!(!a.overlaps(&c));
        assert_eq!(a.intersection(&b), Some(DateRange::single(d(2025, 1, 10))));
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn test_extend() {
        let r = DateRange::single(d(2025, 1, 28)).extend(27, 0);
        assert_eq!(r.start, d(2025, 1, 1));
        assert_eq!(r.days(), 28);
    }

    #[test]
    fn test_block_horizon() {
        let blocks = Block::horizon(DateRange::new(d(2025, 1, 1), d(2025, 1, 3)));
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks[0].id, "2025-01-01-AM");
        assert_eq!(blocks[1].id, "2025-01-01-PM");
        assert_eq!(blocks[5].sequence, 5);
        assert!(blocks.iter().all(|b| b.active));
    }
}
