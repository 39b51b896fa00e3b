//! Compliance rule descriptors.
//!
//! Rules are data, not code: each rule is a small parameterized descriptor
//! (kind, window, threshold, severity) interpreted by a fixed set of
//! evaluators in [`crate::compliance`]. Rule sets serialize to JSON so they
//! can be reconfigured without redeploying the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::PgyLevel;

/// Finding severity, ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational.
    Low,
    /// Should be fixed.
    Medium,
    /// Blocks a fully compliant outcome.
    High,
    /// Blocks a fully compliant outcome; regulatory breach.
    Critical,
}

impl Severity {
    /// Whether a violation of this severity prevents `succeeded`/`partial`.
    #[inline]
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Whether a breach is reported as a violation or a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Enforcement {
    /// Reported in `violations`.
    Violation,
    /// Reported in `warnings`; never blocks.
    Warning,
}

/// Residents-per-faculty limit for one training tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRatio {
    /// Training tier.
    pub pgy_level: PgyLevel,
    /// Maximum residents of this tier per supervising faculty.
    pub residents_per_faculty: u32,
}

/// Rule kind and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Average weekly duty hours over a trailing window must not exceed the limit.
    WorkHours {
        /// Limit on the windowed weekly average.
        max_average_weekly_hours: f64,
        /// Trailing window length in days (inclusive of the evaluation date).
        window_days: u32,
        /// Averages at or above `ratio × limit` produce low-severity warnings.
        warning_ratio: Option<f64>,
    },
    /// Every `period_days` consecutive days must include a day without duty.
    RestDay {
        /// Period length (7 for one-in-seven).
        period_days: u32,
    },
    /// Faculty supervision ratio per block by resident tier.
    SupervisionRatio {
        /// Per-tier limits; tiers without an entry use the template ratio only.
        tiers: Vec<TierRatio>,
    },
    /// No more than `max_days` consecutive duty days.
    ConsecutiveDuty {
        /// Longest allowed run.
        max_days: u32,
    },
    /// No duty on a date covered by the person's absence.
    AbsenceOverlap,
}

impl RuleKind {
    /// Short machine name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WorkHours { .. } => "work_hours",
            Self::RestDay { .. } => "rest_day",
            Self::SupervisionRatio { .. } => "supervision_ratio",
            Self::ConsecutiveDuty { .. } => "consecutive_duty",
            Self::AbsenceOverlap => "absence_overlap",
        }
    }
}

/// A named, parameterized compliance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRule {
    /// Unique rule name (appears in findings).
    pub name: String,
    /// Evaluator and parameters.
    pub kind: RuleKind,
    /// Severity of a breach.
    pub severity: Severity,
    /// Violation or warning.
    pub enforcement: Enforcement,
}

impl ComplianceRule {
    /// Creates a rule reported as a violation.
    pub fn new(name: impl Into<String>, kind: RuleKind, severity: Severity) -> Self {
        Self {
            name: name.into(),
            kind,
            severity,
            enforcement: Enforcement::Violation,
        }
    }

    /// Downgrades breaches to warnings.
    pub fn as_warning(mut self) -> Self {
        self.enforcement = Enforcement::Warning;
        self
    }

    /// 80 hours averaged over a trailing 28-day window.
    pub fn work_hours(max_average_weekly_hours: f64, window_days: u32) -> Self {
        Self::new(
            "work_hours_80",
            RuleKind::WorkHours {
                max_average_weekly_hours,
                window_days,
                warning_ratio: Some(0.9),
            },
            Severity::Critical,
        )
    }

    /// One day off in every `period_days`.
    pub fn rest_day(period_days: u32) -> Self {
        Self::new(
            "one_in_seven",
            RuleKind::RestDay { period_days },
            Severity::High,
        )
    }

    /// Supervision ratios per tier.
    pub fn supervision_ratio(tiers: Vec<TierRatio>) -> Self {
        Self::new(
            "supervision_ratio",
            RuleKind::SupervisionRatio { tiers },
            Severity::High,
        )
    }

    /// Maximum consecutive duty days.
    pub fn consecutive_duty(max_days: u32) -> Self {
        Self::new(
            "max_consecutive_duty",
            RuleKind::ConsecutiveDuty { max_days },
            Severity::Medium,
        )
    }

    /// No duty during absences.
    pub fn absence_overlap() -> Self {
        Self::new("absence_overlap", RuleKind::AbsenceOverlap, Severity::Critical)
    }
}

/// An ordered collection of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Rules, evaluated independently of each other.
    pub rules: Vec<ComplianceRule>,
}

impl RuleSet {
    /// Creates a rule set.
    pub fn new(rules: Vec<ComplianceRule>) -> Self {
        Self { rules }
    }

    /// Standard residency duty rules.
    ///
    /// | Rule | Parameters | Severity |
    /// |------|-----------|----------|
    /// | work hours | 80 h/week averaged over 28 days | critical |
    /// | rest day | 1 day in 7 | high |
    /// | supervision | PGY-1 1:2, PGY-2/3 1:4 | high |
    /// | consecutive duty | 6 days | medium |
    /// | absence overlap | n/a | critical |
    pub fn standard() -> Self {
        Self::new(vec![
            ComplianceRule::work_hours(80.0, 28),
            ComplianceRule::rest_day(7),
            ComplianceRule::supervision_ratio(vec![
                TierRatio {
                    pgy_level: PgyLevel::Pgy1,
                    residents_per_faculty: 2,
                },
                TierRatio {
                    pgy_level: PgyLevel::Pgy2,
                    residents_per_faculty: 4,
                },
                TierRatio {
                    pgy_level: PgyLevel::Pgy3,
                    residents_per_faculty: 4,
                },
            ]),
            ComplianceRule::consecutive_duty(6),
            ComplianceRule::absence_overlap(),
        ])
    }

    /// Parses a rule set from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Finds a rule by name.
    pub fn get(&self, name: &str) -> Option<&ComplianceRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Tightest duty-hour cap per trailing window: `(window_days, max_hours)`.
    ///
    /// Only rules enforced as violations constrain solving.
    pub fn window_hour_cap(&self) -> Option<(u32, f64)> {
        self.enforced()
            .filter_map(|r| match r.kind {
                RuleKind::WorkHours {
                    max_average_weekly_hours,
                    window_days,
                    ..
                } if window_days > 0 => Some((
                    window_days,
                    max_average_weekly_hours * window_days as f64 / 7.0,
                )),
                _ => None,
            })
            .min_by(|a, b| {
                (a.1 / a.0 as f64)
                    .partial_cmp(&(b.1 / b.0 as f64))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Longest allowed run of consecutive duty days.
    pub fn max_consecutive_days(&self) -> Option<u32> {
        self.enforced()
            .filter_map(|r| match r.kind {
                RuleKind::RestDay { period_days } => Some(period_days.saturating_sub(1)),
                RuleKind::ConsecutiveDuty { max_days } => Some(max_days),
                _ => None,
            })
            .min()
    }

    /// Supervision limit for a tier, if any rule sets one.
    pub fn tier_ratio(&self, level: PgyLevel) -> Option<u32> {
        self.enforced()
            .filter_map(|r| match &r.kind {
                RuleKind::SupervisionRatio { tiers } => tiers
                    .iter()
                    .find(|t| t.pgy_level == level)
                    .map(|t| t.residents_per_faculty),
                _ => None,
            })
            .min()
    }

    fn enforced(&self) -> impl Iterator<Item = &ComplianceRule> {
        self.rules
            .iter()
            .filter(|r| r.enforcement == Enforcement::Violation)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::High.is_blocking());
        assert!(!Severity::Medium.is_blocking());
    }

    #[test]
    fn test_standard_limits() {
        let rules = RuleSet::standard();
        let (days, hours) = rules.window_hour_cap().unwrap();
        assert_eq!(days, 28);
        assert!((hours - 320.0).abs() < 1e-9);
        assert_eq!(rules.max_consecutive_days(), Some(6));
        assert_eq!(rules.tier_ratio(PgyLevel::Pgy1), Some(2));
        assert_eq!(rules.tier_ratio(PgyLevel::Pgy3), Some(4));
    }

    #[test]
    fn test_warning_rules_do_not_constrain() {
        let rules = RuleSet::new(vec![ComplianceRule::rest_day(7).as_warning()]);
        assert_eq!(rules.max_consecutive_days(), None);
        assert_eq!(rules.window_hour_cap(), None);
    }

    #[test]
    fn test_rule_set_json() {
        let json = serde_json::to_string(&RuleSet::standard()).unwrap();
        let parsed = RuleSet::from_json(&json).unwrap();
        assert_eq!(parsed, RuleSet::standard());
        assert!(parsed.get("one_in_seven").is_some());
        assert!(parsed.get("missing").is_none());
    }
}
