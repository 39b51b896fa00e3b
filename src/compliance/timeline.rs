//! Per-person duty timelines.
//!
//! Rules see a person's schedule as duty hours per calendar date. Backup
//! assignments carry no hours and do not make a date a duty day;
//! superseded assignments are ignored.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

use crate::models::{Assignment, DateRange};

/// Duty hours per date for one person.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonTimeline {
    /// Duty hours keyed by date (only dates with duty appear).
    pub hours: BTreeMap<NaiveDate, f64>,
}

impl PersonTimeline {
    /// Records duty on `date`.
    pub fn add(&mut self, date: NaiveDate, hours: f64) {
        *self.hours.entry(date).or_insert(0.0) += hours;
    }

    /// Whether the person has any duty on `date`.
    #[inline]
    pub fn is_duty_day(&self, date: NaiveDate) -> bool {
        self.hours.contains_key(&date)
    }

    /// Total hours over `range`.
    pub fn hours_in(&self, range: &DateRange) -> f64 {
        self.hours
            .range(range.start..=range.end)
            .map(|(_, h)| *h)
            .sum()
    }

    /// Maximal runs of consecutive duty days, chronological.
    pub fn duty_runs(&self) -> Vec<DateRange> {
        let mut runs = Vec::new();
        let mut current: Option<DateRange> = None;
        for &date in self.hours.keys() {
            current = match current {
                Some(run) if run.end + Duration::days(1) == date => {
                    Some(DateRange::new(run.start, date))
                }
                Some(run) => {
                    runs.push(run);
                    Some(DateRange::single(date))
                }
                None => Some(DateRange::single(date)),
            };
        }
        runs.extend(current);
        runs
    }
}

/// Builds timelines for every person appearing in `assignments`.
pub fn build_timelines(assignments: &[Assignment]) -> BTreeMap<String, PersonTimeline> {
    let mut timelines: BTreeMap<String, PersonTimeline> = BTreeMap::new();
    for a in assignments.iter().filter(|a| a.is_active() && a.is_duty()) {
        timelines
            .entry(a.person_id.clone())
            .or_default()
            .add(a.date, a.hours);
    }
    timelines
}
