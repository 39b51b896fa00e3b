//! Fixed evaluators, one per [`RuleKind`].
//!
//! Each evaluator is a pure function of the evaluation context and one rule
//! descriptor. Evaluators never look at other rules' output.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::timeline::PersonTimeline;
use super::Finding;
use crate::models::{
    is_absent, Absence, Assignment, AssignmentRole, ComplianceRule, DateRange, Person,
    RotationTemplate, RuleKind, Severity, TierRatio,
};

const EPS: f64 = 1e-9;

/// Everything an evaluator may read.
pub(crate) struct EvalContext<'a> {
    pub assignments: &'a [&'a Assignment],
    pub absences: &'a [Absence],
    pub timelines: &'a BTreeMap<String, PersonTimeline>,
    pub people: &'a HashMap<&'a str, &'a Person>,
    pub templates: &'a HashMap<&'a str, &'a RotationTemplate>,
    pub window: DateRange,
    pub scope: Option<&'a HashSet<String>>,
}

impl EvalContext<'_> {
    fn in_scope(&self, person_id: &str) -> bool {
        self.scope.map_or(true, |s| s.contains(person_id))
    }

    fn scoped_timelines(&self) -> Vec<(&String, &PersonTimeline)> {
        self.timelines
            .iter()
            .filter(|(id, _)| self.in_scope(id))
            .collect()
    }
}

/// Output of one evaluator.
#[derive(Debug, Default)]
pub(crate) struct RuleOutput {
    /// Breaches of the rule, reported per the rule's enforcement.
    pub breaches: Vec<Finding>,
    /// Advisory findings, always reported as warnings.
    pub advisories: Vec<Finding>,
}

/// Runs the evaluator matching `rule.kind`.
pub(crate) fn evaluate_rule(rule: &ComplianceRule, ctx: &EvalContext<'_>) -> RuleOutput {
    let mut out = RuleOutput::default();
    match &rule.kind {
        RuleKind::WorkHours {
            max_average_weekly_hours,
            window_days,
            warning_ratio,
        } => work_hours(
            rule,
            *max_average_weekly_hours,
            *window_days,
            *warning_ratio,
            ctx,
            &mut out,
        ),
        RuleKind::RestDay { period_days } => {
            let period = *period_days as i64;
            let allowed = period_days.saturating_sub(1);
            duty_runs(rule, ctx, |len| len >= period, allowed, &mut out)
        }
        RuleKind::ConsecutiveDuty { max_days } => {
            let max = *max_days as i64;
            duty_runs(rule, ctx, |len| len > max, *max_days, &mut out)
        }
        RuleKind::SupervisionRatio { tiers } => supervision(rule, tiers, ctx, &mut out),
        RuleKind::AbsenceOverlap => absence_overlap(rule, ctx, &mut out),
    }
    out
}

/// Trailing-window average weekly hours.
///
/// For every date `d` in the evaluation window, sums duty hours over
/// `[d - (window_days - 1), d]` and divides by `window_days / 7`.
/// Consecutive offending dates collapse into one finding with the peak
/// average; its window spans from the first offending trailing window's
/// start to the last offending date.
fn work_hours(
    rule: &ComplianceRule,
    limit: f64,
    window_days: u32,
    warning_ratio: Option<f64>,
    ctx: &EvalContext<'_>,
    out: &mut RuleOutput,
) {
    if window_days == 0 {
        return;
    }
    let span = window_days as i64;
    let weeks = window_days as f64 / 7.0;
    let lookback = DateRange::new(ctx.window.start - Duration::days(span - 1), ctx.window.end);

    for (person_id, timeline) in ctx.scoped_timelines() {
        let daily: Vec<f64> = lookback
            .iter_days()
            .map(|d| timeline.hours.get(&d).copied().unwrap_or(0.0))
            .collect();
        let mut sum: f64 = daily[..(span - 1) as usize].iter().sum();

        let mut over = StretchMerger::default();
        let mut near = StretchMerger::default();
        for (i, date) in ctx.window.iter_days().enumerate() {
            let idx = i + (span - 1) as usize;
            sum += daily[idx];
            let average = sum / weeks;
            if average > limit + EPS {
                over.push(date, average);
                near.close();
            } else if warning_ratio.is_some_and(|r| average + EPS >= r * limit) {
                near.push(date, average);
                over.close();
            } else {
                over.close();
                near.close();
            }
            sum -= daily[i];
        }

        for (first, last, peak) in over.finish() {
            out.breaches.push(Finding {
                rule: rule.name.clone(),
                code: rule.kind.code().to_string(),
                severity: rule.severity,
                person_id: Some(person_id.clone()),
                block_id: None,
                window: DateRange::new(first - Duration::days(span - 1), last),
                measured: peak,
                threshold: limit,
                message: format!(
                    "{person_id} averages {peak:.1} h/week over {window_days} days \
                     (limit {limit:.1})"
                ),
            });
        }
        for (first, last, peak) in near.finish() {
            out.advisories.push(Finding {
                rule: rule.name.clone(),
                code: rule.kind.code().to_string(),
                severity: Severity::Low,
                person_id: Some(person_id.clone()),
                block_id: None,
                window: DateRange::new(first - Duration::days(span - 1), last),
                measured: peak,
                threshold: limit,
                message: format!(
                    "{person_id} is near the weekly hour limit: {peak:.1} of {limit:.1} h/week"
                ),
            });
        }
    }
}

/// Reports maximal duty runs for which `offends(len)` holds.
///
/// Used for both the rest-day rule (run of `period` days has no day off)
/// and the consecutive-duty rule. The finding window is the exact run.
fn duty_runs(
    rule: &ComplianceRule,
    ctx: &EvalContext<'_>,
    offends: impl Fn(i64) -> bool,
    allowed: u32,
    out: &mut RuleOutput,
) {
    for (person_id, timeline) in ctx.scoped_timelines() {
        for run in timeline.duty_runs() {
            if !run.overlaps(&ctx.window) || !offends(run.days()) {
                continue;
            }
            out.breaches.push(Finding {
                rule: rule.name.clone(),
                code: rule.kind.code().to_string(),
                severity: rule.severity,
                person_id: Some(person_id.clone()),
                block_id: None,
                window: run,
                measured: run.days() as f64,
                threshold: allowed as f64,
                message: format!(
                    "{person_id} has {} consecutive duty days ({run}); at most {allowed} allowed",
                    run.days()
                ),
            });
        }
    }
}

/// Faculty supervision per block and supervised template.
///
/// A resident of tier `t` on a template with ratio `n` consumes `1/r` of a
/// supervisor where `r = min(n, tier ratio of t)`. Required faculty is the
/// ceiling of the sum, computed exactly over the least common multiple of
/// the ratios involved.
fn supervision(
    rule: &ComplianceRule,
    tiers: &[TierRatio],
    ctx: &EvalContext<'_>,
    out: &mut RuleOutput,
) {
    let mut groups: BTreeMap<(&str, &str), Vec<&Assignment>> = BTreeMap::new();
    for a in ctx.assignments.iter().copied().filter(|a| ctx.window.contains(a.date)) {
        groups
            .entry((a.block_id.as_str(), a.template_id.as_str()))
            .or_default()
            .push(a);
    }

    for ((block_id, template_id), members) in groups {
        let Some(template) = ctx.templates.get(template_id) else {
            continue;
        };
        if !template.supervision_required {
            continue;
        }
        if ctx.scope.is_some() && !members.iter().any(|a| ctx.in_scope(&a.person_id)) {
            continue;
        }

        let ratios: Vec<u64> = members
            .iter()
            .filter(|a| a.role == AssignmentRole::Primary)
            .map(|a| {
                let tier = ctx
                    .people
                    .get(a.person_id.as_str())
                    .and_then(|p| p.pgy_level())
                    .and_then(|level| tiers.iter().find(|t| t.pgy_level == level))
                    .map(|t| t.residents_per_faculty);
                let template_ratio = template.max_supervision_ratio.max(1);
                tier.map_or(template_ratio, |r| r.max(1).min(template_ratio)) as u64
            })
            .collect();
        if ratios.is_empty() {
            continue;
        }

        let required = required_supervisors(&ratios);
        let present = members
            .iter()
            .filter(|a| a.role == AssignmentRole::Supervising)
            .count() as u64;
        if present >= required {
            continue;
        }

        let date = members[0].date;
        out.breaches.push(Finding {
            rule: rule.name.clone(),
            code: rule.kind.code().to_string(),
            severity: rule.severity,
            person_id: None,
            block_id: Some(block_id.to_string()),
            window: DateRange::single(date),
            measured: present as f64,
            threshold: required as f64,
            message: format!(
                "{block_id} {template_id}: {} residents need {required} supervising faculty, \
                 {present} assigned",
                ratios.len()
            ),
        });
    }
}

/// `ceil(Σ 1/r)`, exact unless the common multiple overflows `u64`.
pub(crate) fn required_supervisors(ratios: &[u64]) -> u64 {
    exact_supervisors(ratios).unwrap_or_else(|| {
        let load: f64 = ratios.iter().map(|&r| 1.0 / r.max(1) as f64).sum();
        (load * (1.0 - 1e-12)).ceil() as u64
    })
}

fn exact_supervisors(ratios: &[u64]) -> Option<u64> {
    let lcm = ratios
        .iter()
        .try_fold(1u64, |acc, &r| lcm(acc, r.max(1)))?;
    let units = ratios
        .iter()
        .try_fold(0u64, |acc, &r| acc.checked_add(lcm / r.max(1)))?;
    Some(units.div_ceil(lcm))
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u64, b: u64) -> Option<u64> {
    (a / gcd(a, b)).checked_mul(b)
}

fn absence_overlap(rule: &ComplianceRule, ctx: &EvalContext<'_>, out: &mut RuleOutput) {
    for a in ctx.assignments.iter().filter(|a| ctx.window.contains(a.date)) {
        if !ctx.in_scope(&a.person_id) || !is_absent(ctx.absences, &a.person_id, a.date) {
            continue;
        }
        out.breaches.push(Finding {
            rule: rule.name.clone(),
            code: rule.kind.code().to_string(),
            severity: rule.severity,
            person_id: Some(a.person_id.clone()),
            block_id: Some(a.block_id.clone()),
            window: DateRange::single(a.date),
            measured: 1.0,
            threshold: 0.0,
            message: format!(
                "{} is assigned to {} ({}) while absent",
                a.person_id, a.block_id, a.role
            ),
        });
    }
}

/// Collapses consecutive dates into `(first, last, peak)` stretches.
#[derive(Default)]
struct StretchMerger {
    open: Option<(NaiveDate, NaiveDate, f64)>,
    done: Vec<(NaiveDate, NaiveDate, f64)>,
}

impl StretchMerger {
    fn push(&mut self, date: NaiveDate, value: f64) {
        self.open = Some(match self.open.take() {
            Some((first, _, peak)) => (first, date, peak.max(value)),
            None => (date, date, value),
        });
    }

    fn close(&mut self) {
        if let Some(stretch) = self.open.take() {
            self.done.push(stretch);
        }
    }

    fn finish(mut self) -> Vec<(NaiveDate, NaiveDate, f64)> {
        self.close();
        self.done
    }
}
