//! Compliance rule engine.
//!
//! Evaluates a set of assignments against a [`RuleSet`] and reports
//! violations (blocking or not, by severity), warnings and double-booking
//! conflicts. Evaluation is pure: the same inputs always yield the same
//! report, regardless of input order.
//!
//! # Rules
//!
//! | Kind | Check |
//! |------|-------|
//! | `WorkHours` | trailing-window weekly average ≤ limit |
//! | `RestDay` | every `period` consecutive days include a day off |
//! | `SupervisionRatio` | faculty ≥ ⌈Σ 1/ratio⌉ per supervised block |
//! | `ConsecutiveDuty` | duty runs ≤ `max_days` |
//! | `AbsenceOverlap` | no assignment on an absent date |
//!
//! Double-booking (two non-backup or two backup assignments of one person
//! in one block) is a conflict, not a rule violation.
//!
//! # Example
//!
//! ```ignore
//! let engine = ComplianceEngine::new(&people, &templates);
//! let report = engine.evaluate(&assignments, &absences, &RuleSet::standard(), range);
//! assert!(!report.has_blocking_violations());
//! ```

mod evaluators;
mod timeline;

pub use timeline::{build_timelines, PersonTimeline};

pub(crate) use evaluators::required_supervisors;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{
    Absence, Assignment, AssignmentId, DateRange, Enforcement, Person, RotationTemplate, RuleSet,
    Severity,
};
use evaluators::{evaluate_rule, EvalContext};

/// One rule finding with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Name of the rule that produced the finding.
    pub rule: String,
    /// Rule kind code (`work_hours`, `rest_day`, ...).
    pub code: String,
    /// Severity.
    pub severity: Severity,
    /// Person concerned, for person-level rules.
    pub person_id: Option<String>,
    /// Block concerned, for block-level rules.
    pub block_id: Option<String>,
    /// Offending date window.
    pub window: DateRange,
    /// Measured value.
    pub measured: f64,
    /// Threshold the measured value was compared to.
    pub threshold: f64,
    /// Human-readable summary.
    pub message: String,
}

impl Finding {
    /// Whether this finding blocks a compliant outcome.
    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }
}

/// A person booked twice in one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Double-booked person.
    pub person_id: String,
    /// Block.
    pub block_id: String,
    /// Block date.
    pub date: NaiveDate,
    /// Whether the clash is between backup assignments.
    pub backup: bool,
    /// The clashing records.
    pub assignments: Vec<AssignmentId>,
}

/// Result of a compliance evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Breaches of violation-enforced rules.
    pub violations: Vec<Finding>,
    /// Breaches of warning-enforced rules and advisories.
    pub warnings: Vec<Finding>,
    /// Double-bookings.
    pub conflicts: Vec<Conflict>,
}

impl ComplianceReport {
    /// Violations of severity high or critical.
    pub fn blocking_violations(&self) -> impl Iterator<Item = &Finding> {
        self.violations.iter().filter(|f| f.is_blocking())
    }

    /// Whether any high/critical violation exists.
    pub fn has_blocking_violations(&self) -> bool {
        self.blocking_violations().next().is_some()
    }

    /// No violations and no conflicts.
    pub fn is_compliant(&self) -> bool {
        self.violations.is_empty() && self.conflicts.is_empty()
    }
}

/// Evaluates assignments against compliance rules.
#[derive(Debug, Clone)]
pub struct ComplianceEngine<'a> {
    people: HashMap<&'a str, &'a Person>,
    templates: HashMap<&'a str, &'a RotationTemplate>,
    scope: Option<HashSet<String>>,
}

impl<'a> ComplianceEngine<'a> {
    /// Creates an engine over the given reference data.
    pub fn new(people: &'a [Person], templates: &'a [RotationTemplate]) -> Self {
        Self {
            people: people.iter().map(|p| (p.id.as_str(), p)).collect(),
            templates: templates.iter().map(|t| (t.id.as_str(), t)).collect(),
            scope: None,
        }
    }

    /// Restricts findings to the given people.
    ///
    /// Person-level rules report only scoped people; block-level rules
    /// report only blocks where a scoped person is assigned.
    pub fn with_person_scope(mut self, scope: HashSet<String>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Evaluates `rules` over `window`.
    ///
    /// `assignments` may extend beyond `window` (trailing windows and duty
    /// runs need history); findings are reported only for dates inside it.
    /// Superseded assignments are ignored.
    pub fn evaluate(
        &self,
        assignments: &[Assignment],
        absences: &[Absence],
        rules: &RuleSet,
        window: DateRange,
    ) -> ComplianceReport {
        let mut report = ComplianceReport::default();
        if !window.is_valid() {
            return report;
        }

        let active: Vec<&Assignment> = assignments.iter().filter(|a| a.is_active()).collect();
        let timelines = build_timelines(assignments);
        let ctx = EvalContext {
            assignments: &active,
            absences,
            timelines: &timelines,
            people: &self.people,
            templates: &self.templates,
            window,
            scope: self.scope.as_ref(),
        };

        for rule in &rules.rules {
            let output = evaluate_rule(rule, &ctx);
            match rule.enforcement {
                Enforcement::Violation => report.violations.extend(output.breaches),
                Enforcement::Warning => report.warnings.extend(output.breaches),
            }
            report.warnings.extend(output.advisories);
        }

        report.conflicts = self.conflicts(&active, window);

        sort_findings(&mut report.violations);
        sort_findings(&mut report.warnings);
        report
    }

    fn conflicts(&self, active: &[&Assignment], window: DateRange) -> Vec<Conflict> {
        let mut groups: BTreeMap<(&str, &str, bool), Vec<&Assignment>> = BTreeMap::new();
        for a in active.iter().copied().filter(|a| window.contains(a.date)) {
            if let Some(scope) = &self.scope {
                if !scope.contains(&a.person_id) {
                    continue;
                }
            }
            groups
                .entry((a.person_id.as_str(), a.block_id.as_str(), a.role.is_backup()))
                .or_default()
                .push(a);
        }

        groups
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|((person_id, block_id, backup), members)| {
                let mut ids: Vec<AssignmentId> = members.iter().map(|a| a.id).collect();
                ids.sort();
                Conflict {
                    person_id: person_id.to_string(),
                    block_id: block_id.to_string(),
                    date: members[0].date,
                    backup,
                    assignments: ids,
                }
            })
            .collect()
    }
}

/// Canonical order: severity (most severe first), person, window start,
/// rule, block.
fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.person_id.cmp(&b.person_id))
            .then_with(|| a.window.start.cmp(&b.window.start))
            .then_with(|| a.rule.cmp(&b.rule))
            .then_with(|| a.block_id.cmp(&b.block_id))
    });
}
