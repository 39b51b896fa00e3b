//! Shared objective.
//!
//! ```text
//! value = W_cov · covered_required + W_backup · covered_backup
//!       − Σ assignment cost
//!       − W_consec · Σ run excess over the soft threshold
//!       − W_fair · Σ_kind variance(hours)
//! ```
//!
//! Higher is better. Every strategy is scored with this function after the
//! supervision pass, so scores are comparable across strategies.

use serde::{Deserialize, Serialize};

use super::problem::ProblemInstance;

/// Objective breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Objective value.
    pub value: f64,
    /// Filled required slots.
    pub covered_required: usize,
    /// Filled backup slots.
    pub covered_backup: usize,
    /// Sum of assignment-level costs.
    pub assignment_cost: f64,
    /// Duty days beyond the soft consecutive threshold.
    pub consecutive_excess: usize,
    /// Sum of per-kind hour variances.
    pub hour_variance: f64,
}

/// Scores `picks`.
pub fn evaluate(instance: &ProblemInstance, picks: &[Option<usize>]) -> Evaluation {
    let w = &instance.weights;
    let people = instance.people.len();
    let mut eval = Evaluation::default();

    let mut hours = vec![0.0; people];
    let mut duty_days = vec![false; people * instance.day_count];
    for f in instance.fixed.iter().filter(|f| !f.backup) {
        duty_days[f.person * instance.day_count + f.day] = true;
    }

    for (s, pick) in picks.iter().enumerate() {
        let Some(p) = *pick else {
            continue;
        };
        let slot = &instance.slots[s];
        if slot.required {
            eval.covered_required += 1;
        } else {
            eval.covered_backup += 1;
        }
        eval.assignment_cost += instance.static_cost(s, p);
        if !slot.role.is_backup() {
            hours[p] += slot.hours;
            duty_days[p * instance.day_count + slot.day] = true;
        }
    }

    let soft = instance.soft_consecutive;
    for p in 0..people {
        let row = &duty_days[p * instance.day_count..(p + 1) * instance.day_count];
        let mut run = 0usize;
        for &on in row.iter().chain(std::iter::once(&false)) {
            if on {
                run += 1;
            } else {
                eval.consecutive_excess += run.saturating_sub(soft);
                run = 0;
            }
        }
    }

    for pool in &instance.pools {
        if pool.len() < 2 {
            continue;
        }
        let n = pool.len() as f64;
        let mean = pool.iter().map(|&p| hours[p]).sum::<f64>() / n;
        eval.hour_variance += pool.iter().map(|&p| (hours[p] - mean).powi(2)).sum::<f64>() / n;
    }

    eval.value = w.coverage * eval.covered_required as f64 + w.backup * eval.covered_backup as f64
        - eval.assignment_cost
        - w.consecutive * eval.consecutive_excess as f64
        - w.fairness * eval.hour_variance;
    eval
}

/// Objective value of `picks`.
#[inline]
pub fn score(instance: &ProblemInstance, picks: &[Option<usize>]) -> f64 {
    evaluate(instance, picks).value
}
