//! Input validation for roster requests and reference data.
//!
//! Checks structural integrity before anything reaches a solver.
//! Detects:
//! - Inverted or oversized date ranges
//! - Missing tenant / idempotency key, zero time budgets
//! - Template filters naming unknown templates
//! - Duplicate person, template and block IDs
//! - Two blocks on the same date and period
//! - Templates with an unusable supervision ratio or duty hours
//! - Rule sets with duplicate names or degenerate parameters
//!
//! All problems are collected; callers get the full list, not just the first.

use crate::coordinator::GenerationRequest;
use crate::models::{Block, DateRange, Person, RotationTemplate, RuleKind, RuleSet};
use crate::repair::RepairRequest;
use std::collections::HashSet;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two entities share the same ID.
    DuplicateId,
    /// Two blocks share a date and period.
    DuplicateBlock,
    /// Range start is after its end.
    InvalidRange,
    /// Range longer than the configured maximum.
    RangeTooLong,
    /// Zero time budget.
    InvalidBudget,
    /// Empty tenant or idempotency key.
    MissingKey,
    /// Filter or request references a template that doesn't exist.
    UnknownTemplate,
    /// Request references a person that doesn't exist.
    UnknownPerson,
    /// Template parameters make demand unsatisfiable or meaningless.
    InvalidTemplate,
    /// Rule parameters make the rule unsatisfiable or meaningless.
    InvalidRule,
}

impl ValidationError {
    /// Creates an error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates a generation request against the known templates.
///
/// Checks:
/// 1. Tenant and idempotency key are non-empty
/// 2. `start <= end` and the range is at most `max_range_days` long
/// 3. A supplied time budget is non-zero
/// 4. Every template in the filter exists
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_request(
    request: &GenerationRequest,
    templates: &[RotationTemplate],
    max_range_days: i64,
) -> ValidationResult {
    let mut errors = Vec::new();

    if request.tenant.trim().is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingKey,
            "Tenant must not be empty",
        ));
    }
    if request.idempotency_key.trim().is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingKey,
            "Idempotency key must not be empty",
        ));
    }

    check_range(&request.range, max_range_days, &mut errors);

    if request.time_budget_ms == Some(0) {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidBudget,
            "Time budget must be greater than zero",
        ));
    }

    let known: HashSet<&str> = templates.iter().map(|t| t.id.as_str()).collect();
    for id in &request.template_ids {
        if !known.contains(id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnknownTemplate,
                format!("Template filter references unknown template '{id}'"),
            ));
        }
    }

    finish(errors)
}

/// Validates a repair request.
///
/// The absent person must exist and the window must be a valid range no
/// longer than `max_range_days`.
pub fn validate_repair(
    request: &RepairRequest,
    people: &[Person],
    max_range_days: i64,
) -> ValidationResult {
    let mut errors = Vec::new();

    if request.tenant.trim().is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingKey,
            "Tenant must not be empty",
        ));
    }
    check_range(&request.window, max_range_days, &mut errors);
    if !people.iter().any(|p| p.id == request.person_id) {
        errors.push(ValidationError::new(
            ValidationErrorKind::UnknownPerson,
            format!("Unknown person '{}'", request.person_id),
        ));
    }

    finish(errors)
}

/// Validates reference data loaded for a run.
///
/// Checks:
/// 1. No duplicate person IDs
/// 2. No duplicate template IDs
/// 3. No duplicate block IDs, and at most one block per date and period
/// 4. Supervised templates have a ratio of at least 1
/// 5. Duty hours are finite and non-negative
pub fn validate_reference_data(
    people: &[Person],
    templates: &[RotationTemplate],
    blocks: &[Block],
) -> ValidationResult {
    let mut errors = Vec::new();

    let mut person_ids = HashSet::new();
    for p in people {
        if !person_ids.insert(p.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate person ID: {}", p.id),
            ));
        }
    }

    let mut template_ids = HashSet::new();
    for t in templates {
        if !template_ids.insert(t.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate template ID: {}", t.id),
            ));
        }
        if t.supervision_required && t.max_supervision_ratio == 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidTemplate,
                format!("Template '{}' requires supervision with a zero ratio", t.id),
            ));
        }
        if !t.hours_per_block.is_finite() || t.hours_per_block < 0.0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidTemplate,
                format!(
                    "Template '{}' has invalid hours per block: {}",
                    t.id, t.hours_per_block
                ),
            ));
        }
    }

    let mut block_ids = HashSet::new();
    let mut slots = HashSet::new();
    for b in blocks {
        if !block_ids.insert(b.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate block ID: {}", b.id),
            ));
        }
        if !slots.insert((b.date, b.time_of_day)) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateBlock,
                format!("More than one block on {} {}", b.date, b.time_of_day),
            ));
        }
    }

    finish(errors)
}

/// Validates a compliance rule set.
///
/// Checks:
/// 1. Rule names are unique
/// 2. Work-hour limits are positive and finite, windows at least one day,
///    warning ratios in `(0, 1]`
/// 3. Rest-day periods are at least two days
/// 4. Consecutive-duty limits are at least one day
/// 5. Tier supervision ratios are at least 1
pub fn validate_rules(rules: &RuleSet) -> ValidationResult {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for rule in &rules.rules {
        let name = rule.name.as_str();
        if !names.insert(name) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate rule name: {name}"),
            ));
        }
        let mut invalid = |message: String| {
            errors.push(ValidationError::new(ValidationErrorKind::InvalidRule, message));
        };
        match &rule.kind {
            RuleKind::WorkHours {
                max_average_weekly_hours,
                window_days,
                warning_ratio,
            } => {
                if !max_average_weekly_hours.is_finite() || *max_average_weekly_hours <= 0.0 {
                    invalid(format!(
                        "Rule '{name}' has invalid weekly hour limit: {max_average_weekly_hours}"
                    ));
                }
                if *window_days == 0 {
                    invalid(format!("Rule '{name}' has a zero-day window"));
                }
                if let Some(ratio) = warning_ratio {
                    if !(*ratio > 0.0 && *ratio <= 1.0) {
                        invalid(format!("Rule '{name}' has invalid warning ratio: {ratio}"));
                    }
                }
            }
            RuleKind::RestDay { period_days } => {
                if *period_days < 2 {
                    invalid(format!(
                        "Rule '{name}' needs a rest period of at least 2 days, got {period_days}"
                    ));
                }
            }
            RuleKind::ConsecutiveDuty { max_days } => {
                if *max_days == 0 {
                    invalid(format!("Rule '{name}' allows no duty days"));
                }
            }
            RuleKind::SupervisionRatio { tiers } => {
                for tier in tiers.iter().filter(|t| t.residents_per_faculty == 0) {
                    invalid(format!(
                        "Rule '{name}' has a zero supervision ratio for PGY-{}",
                        tier.pgy_level.year()
                    ));
                }
            }
            RuleKind::AbsenceOverlap => {}
        }
    }

    finish(errors)
}

/// Validates a query range: `start <= end` and at most `max_range_days`.
pub fn validate_range(range: &DateRange, max_range_days: i64) -> ValidationResult {
    let mut errors = Vec::new();
    check_range(range, max_range_days, &mut errors);
    finish(errors)
}

fn check_range(range: &DateRange, max_range_days: i64, errors: &mut Vec<ValidationError>) {
    if !range.is_valid() {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidRange,
            format!("Range start {} is after end {}", range.start, range.end),
        ));
    } else if range.days() > max_range_days {
        errors.push(ValidationError::new(
            ValidationErrorKind::RangeTooLong,
            format!(
                "Range covers {} days; at most {max_range_days} allowed",
                range.days()
            ),
        ));
    }
}

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AbsenceKind, PgyLevel, TimeOfDay};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn templates() -> Vec<RotationTemplate> {
        vec![
            RotationTemplate::new("clinic", "clinic").with_supervision(2),
            RotationTemplate::new("inpatient", "inpatient"),
        ]
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("tenant", "key-1", DateRange::new(d(1), d(28)))
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_request(&request(), &templates(), 366).is_ok());
    }

    #[test]
    fn test_inverted_range() {
        let mut req = request();
        req.range = DateRange::new(d(10), d(1));
        let errors = validate_request(&req, &templates(), 366).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::InvalidRange));
    }

    #[test]
    fn test_range_too_long() {
        let errors = validate_request(&request(), &templates(), 7).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::RangeTooLong));
    }

    #[test]
    fn test_unknown_template_filter() {
        let req = request().with_templates(vec!["clinic".into(), "surgery".into()]);
        let errors = validate_request(&req, &templates(), 366).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::UnknownTemplate);
        assert!(errors[0].message.contains("surgery"));
    }

    #[test]
    fn test_multiple_request_errors() {
        let mut req = GenerationRequest::new("", "", DateRange::new(d(5), d(1)));
        req.time_budget_ms = Some(0);
        let errors = validate_request(&req, &templates(), 366).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_repair_unknown_person() {
        let people = vec![Person::faculty("F1", "im")];
        let req = RepairRequest::new("tenant", "F9", DateRange::new(d(1), d(3)), AbsenceKind::Sick);
        let errors = validate_repair(&req, &people, 366).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::UnknownPerson));
    }

    #[test]
    fn test_duplicate_people_and_templates() {
        let people = vec![
            Person::resident("R1", PgyLevel::Pgy1),
            Person::resident("R1", PgyLevel::Pgy2),
        ];
        let mut tpl = templates();
        tpl.push(RotationTemplate::new("clinic", "clinic"));
        let errors = validate_reference_data(&people, &tpl, &[]).unwrap_err();
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.kind == ValidationErrorKind::DuplicateId)
                .count(),
            2
        );
    }

    #[test]
    fn test_duplicate_block_slot() {
        let blocks = vec![
            Block::new(d(1), TimeOfDay::AM, 0),
            Block::new(d(1), TimeOfDay::AM, 1),
        ];
        let errors = validate_reference_data(&[], &[], &blocks).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DuplicateBlock));
    }

    #[test]
    fn test_invalid_template_parameters() {
        let tpl = vec![
            RotationTemplate::new("a", "clinic").with_supervision(0),
            RotationTemplate::new("b", "clinic").with_hours(f64::NAN),
        ];
        let errors = validate_reference_data(&[], &tpl, &[]).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| e.kind == ValidationErrorKind::InvalidTemplate));
    }

    #[test]
    fn test_standard_rules_are_valid() {
        assert!(validate_rules(&RuleSet::standard()).is_ok());
    }

    #[test]
    fn test_degenerate_rule_parameters() {
        use crate::models::{ComplianceRule, TierRatio};

        let rules = RuleSet::new(vec![
            ComplianceRule::rest_day(0),
            ComplianceRule::consecutive_duty(0),
            ComplianceRule::work_hours(80.0, 0),
            ComplianceRule::supervision_ratio(vec![TierRatio {
                pgy_level: PgyLevel::Pgy1,
                residents_per_faculty: 0,
            }]),
            ComplianceRule::consecutive_duty(5),
        ]);
        let errors = validate_rules(&rules).unwrap_err();
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.kind == ValidationErrorKind::InvalidRule)
                .count(),
            4
        );
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DuplicateId
                && e.message.contains("max_consecutive_duty")));
    }

    #[test]
    fn test_rules_from_json_are_checked() {
        let json = r#"{"rules": [{"name": "rest", "kind": {"RestDay": {"period_days": 1}},
            "severity": "High", "enforcement": "Violation"}]}"#;
        let rules = RuleSet::from_json(json).unwrap();
        let errors = validate_rules(&rules).unwrap_err();
        assert_eq!(errors[0].kind, ValidationErrorKind::InvalidRule);
        assert!(errors[0].message.contains("rest"));
    }

    #[test]
    fn test_horizon_is_valid_reference_data() {
        let blocks = Block::horizon(DateRange::new(d(1), d(28)));
        assert!(validate_reference_data(&[], &templates(), &blocks).is_ok());
    }
}
