//! Incremental duty bookkeeping shared by every strategy.
//!
//! [`LoadTracker`] answers "can person `p` take slot `s` right now?"
//! against the hard limits: one non-backup and one backup assignment per
//! person per block, the trailing-window hour cap and the longest run of
//! consecutive duty days. Fixed duties are loaded once at construction.

use super::problem::ProblemInstance;

const EPS: f64 = 1e-9;
const DUTY: u8 = 0b01;
const BACKUP: u8 = 0b10;

/// Per-person occupancy and hours on the instance day axis.
#[derive(Debug, Clone)]
pub struct LoadTracker {
    days: usize,
    cells: usize,
    occupancy: Vec<u8>,
    hours: Vec<f64>,
    duty: Vec<u16>,
    assigned: Vec<f64>,
}

impl LoadTracker {
    /// Creates a tracker preloaded with the instance's fixed duties.
    pub fn new(instance: &ProblemInstance) -> Self {
        let people = instance.people.len();
        let days = instance.day_count;
        let cells = days * 2;
        let mut tracker = Self {
            days,
            cells,
            occupancy: vec![0; people * cells],
            hours: vec![0.0; people * days],
            duty: vec![0; people * days],
            assigned: vec![0.0; people],
        };
        for f in &instance.fixed {
            let bit = if f.backup { BACKUP } else { DUTY };
            tracker.occupancy[f.person * cells + f.cell] |= bit;
            if !f.backup {
                tracker.hours[f.person * days + f.day] += f.hours;
                tracker.duty[f.person * days + f.day] += 1;
            }
        }
        tracker
    }

    /// Creates a tracker with `picks` applied on top of fixed duties.
    ///
    /// Picks are applied without feasibility checks.
    pub fn with_picks(instance: &ProblemInstance, picks: &[Option<usize>]) -> Self {
        let mut tracker = Self::new(instance);
        for (s, pick) in picks.iter().enumerate() {
            if let Some(p) = *pick {
                tracker.take(instance, s, p);
            }
        }
        tracker
    }

    /// Whether `person` can take `slot` without breaking a hard limit.
    pub fn can_take(&self, instance: &ProblemInstance, slot: usize, person: usize) -> bool {
        let s = &instance.slots[slot];
        let backup = s.role.is_backup();
        let bit = if backup { BACKUP } else { DUTY };
        if self.occupancy[person * self.cells + s.cell] & bit != 0 {
            return false;
        }
        if backup {
            return true;
        }
        if let Some(max) = instance.limits.max_consecutive {
            if self.run_if_added(person, s.day) > max {
                return false;
            }
        }
        self.fits_hour_cap(instance, person, s.day, s.hours)
    }

    /// Records `person` on `slot`.
    pub fn take(&mut self, instance: &ProblemInstance, slot: usize, person: usize) {
        let s = &instance.slots[slot];
        if s.role.is_backup() {
            self.occupancy[person * self.cells + s.cell] |= BACKUP;
            return;
        }
        self.occupancy[person * self.cells + s.cell] |= DUTY;
        self.hours[person * self.days + s.day] += s.hours;
        self.duty[person * self.days + s.day] += 1;
        self.assigned[person] += s.hours;
    }

    /// Undoes [`LoadTracker::take`].
    pub fn release(&mut self, instance: &ProblemInstance, slot: usize, person: usize) {
        let s = &instance.slots[slot];
        if s.role.is_backup() {
            self.occupancy[person * self.cells + s.cell] &= !BACKUP;
            return;
        }
        self.occupancy[person * self.cells + s.cell] &= !DUTY;
        self.hours[person * self.days + s.day] -= s.hours;
        self.duty[person * self.days + s.day] -= 1;
        self.assigned[person] -= s.hours;
    }

    /// Hours assigned to `person` by picks (fixed duties excluded).
    #[inline]
    pub fn assigned_hours(&self, person: usize) -> f64 {
        self.assigned[person]
    }

    /// Whether `person` has duty on `day`.
    #[inline]
    pub fn is_duty_day(&self, person: usize, day: usize) -> bool {
        self.duty[person * self.days + day] > 0
    }

    /// Length of the duty run through `day` if `person` worked it.
    pub fn run_if_added(&self, person: usize, day: usize) -> usize {
        let mut left = 0;
        while left < day && self.is_duty_day(person, day - left - 1) {
            left += 1;
        }
        let mut right = 0;
        while day + right + 1 < self.days && self.is_duty_day(person, day + right + 1) {
            right += 1;
        }
        left + right + 1
    }

    /// Whether adding `extra` hours on `day` keeps every trailing window
    /// containing `day` within the cap. Days off the axis count as zero.
    fn fits_hour_cap(
        &self,
        instance: &ProblemInstance,
        person: usize,
        day: usize,
        extra: f64,
    ) -> bool {
        let cap = instance.limits.window_hours;
        if !cap.is_finite() || extra <= 0.0 {
            return true;
        }
        let w = instance.limits.window_days.max(1) as i64;
        let day = day as i64;
        let hours_at = |d: i64| -> f64 {
            if d < 0 || d >= self.days as i64 {
                0.0
            } else {
                self.hours[person * self.days + d as usize]
            }
        };

        // Windows [start, start + w - 1] for start in [day - w + 1, day].
        let first = day - w + 1;
        let mut sum: f64 = (first..first + w).map(|d| hours_at(d)).sum();
        if sum + extra > cap + EPS {
            return false;
        }
        for start in first + 1..=day {
            sum += hours_at(start + w - 1) - hours_at(start - 1);
            if sum + extra > cap + EPS {
                return false;
            }
        }
        true
    }
}

/// Withdraws residents a group's supervisors cannot cover.
///
/// For each supervision group, if filled residents exceed
/// `supervisors × ratio`, the last filled resident slots are emptied until
/// the ratio holds. Fixed residents are never withdrawn. Returns the number
/// of withdrawn picks.
pub fn enforce_supervision(instance: &ProblemInstance, picks: &mut [Option<usize>]) -> usize {
    let mut withdrawn = 0;
    for group in &instance.groups {
        let supervisors = group.fixed_supervisors
            + group
                .supervisors
                .iter()
                .filter(|&&s| picks[s].is_some())
                .count() as u32;
        let capacity = supervisors * group.ratio;
        let mut residents = group.fixed_residents
            + group
                .residents
                .iter()
                .filter(|&&s| picks[s].is_some())
                .count() as u32;
        for &slot in group.residents.iter().rev() {
            if residents <= capacity {
                break;
            }
            if picks[slot].take().is_some() {
                residents -= 1;
                withdrawn += 1;
            }
        }
    }
    withdrawn
}
