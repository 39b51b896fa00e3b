//! Schedule (solution) model.
//!
//! A schedule is the set of active assignments over a date range, plus the
//! required positions that could not be filled (coverage gaps).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Assignment, AssignmentRole, DateRange, TimeOfDay};

/// A set of assignments with the coverage gaps left by the run that built it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    /// Active assignments.
    pub assignments: Vec<Assignment>,
    /// Required positions left unfilled.
    pub gaps: Vec<CoverageGap>,
}

/// A required position left unassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    /// Block id.
    pub block_id: String,
    /// Block date.
    pub date: NaiveDate,
    /// Block period.
    pub time_of_day: TimeOfDay,
    /// Missing role.
    pub role: AssignmentRole,
    /// Activity needing coverage.
    pub template_id: String,
    /// Why the position is open.
    pub reason: String,
    /// Whether a human must resolve it.
    pub requires_manual_review: bool,
    /// Ranked replacement suggestions (best first).
    pub suggestions: Vec<ReplacementSuggestion>,
}

/// A candidate for filling a gap, ranked by conflict score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementSuggestion {
    /// Candidate person.
    pub person_id: String,
    /// Conflict score in [0, 1]; lower is a better fit.
    pub conflict_score: f64,
    /// What the candidate would conflict with.
    pub conflicts: Vec<String>,
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schedule from assignments.
    pub fn from_assignments(assignments: Vec<Assignment>) -> Self {
        Self {
            assignments,
            gaps: Vec::new(),
        }
    }

    /// Adds an assignment.
    pub fn add_assignment(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
    }

    /// Adds a gap.
    pub fn add_gap(&mut self, gap: CoverageGap) {
        self.gaps.push(gap);
    }

    /// Whether every required position is filled.
    pub fn is_fully_covered(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Number of assignments.
    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// All assignments of one person.
    pub fn assignments_for_person(&self, person_id: &str) -> Vec<&Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.person_id == person_id)
            .collect()
    }

    /// All assignments in one block.
    pub fn assignments_for_block(&self, block_id: &str) -> Vec<&Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.block_id == block_id)
            .collect()
    }

    /// Assignments whose date lies in `range`.
    pub fn assignments_in(&self, range: &DateRange) -> Vec<&Assignment> {
        self.assignments
            .iter()
            .filter(|a| range.contains(a.date))
            .collect()
    }

    /// Duty hours per person.
    pub fn hours_by_person(&self) -> HashMap<String, f64> {
        let mut hours: HashMap<String, f64> = HashMap::new();
        for a in &self.assignments {
            *hours.entry(a.person_id.clone()).or_insert(0.0) += a.hours;
        }
        hours
    }

    /// Coverage ratio `assigned / (assigned + gaps)`, counting only non-backup
    /// positions. Returns `None` for an empty schedule.
    pub fn coverage_ratio(&self) -> Option<f64> {
        let assigned = self.assignments.iter().filter(|a| a.is_duty()).count();
        let total = assigned + self.gaps.len();
        if total == 0 {
            return None;
        }
        Some(assigned as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Block;

    fn sample_schedule() -> Schedule {
        let d = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let am = Block::new(d, TimeOfDay::AM, 0);
        let pm = Block::new(d, TimeOfDay::PM, 1);
        let mut s = Schedule::new();
        s.add_assignment(Assignment::new(&am, "R1", AssignmentRole::Primary, "clinic", 6.0));
        s.add_assignment(Assignment::new(&am, "F1", AssignmentRole::Supervising, "clinic", 6.0));
        s.add_assignment(Assignment::new(&pm, "R1", AssignmentRole::Primary, "clinic", 4.0));
        s
    }

    #[test]
    fn test_queries() {
        let s = sample_schedule();
        assert_eq!(s.assignment_count(), 3);
        assert_eq!(s.assignments_for_person("R1").len(), 2);
        assert_eq!(s.assignments_for_block("2025-01-01-AM").len(), 2);
        let hours = s.hours_by_person();
        assert!((hours["R1"] - 10.0).abs() < 1e-10);
        assert!((hours["F1"] - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_coverage_ratio() {
        let mut s = sample_schedule();
        assert!(s.is_fully_covered());
        assert_eq!(s.coverage_ratio(), Some(1.0));

        s.add_gap(CoverageGap {
            block_id: "2025-01-01-PM".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            time_of_day: TimeOfDay::PM,
            role: AssignmentRole::Supervising,
            template_id: "clinic".into(),
            reason: "no qualified faculty".into(),
            requires_manual_review: true,
            suggestions: Vec::new(),
        });
        assert!(!s.is_fully_covered());
        assert!((s.coverage_ratio().unwrap() - 0.75).abs() < 1e-10);
    }

    #[test]
    fn test_empty_schedule() {
        let s = Schedule::new();
        assert_eq!(s.coverage_ratio(), None);
        assert!(s.assignments_in(&DateRange::single(NaiveDate::MIN)).is_empty());
    }
}
