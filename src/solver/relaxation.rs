//! Linear relaxation with deterministic rounding.
//!
//! # Formulation
//!
//! ```text
//! max  Σ (reward_s − cost_sp) · x_sp
//! s.t. Σ_p x_sp ≤ 1                       (demand: one person per slot)
//!      Σ_{s ∈ cell} x_sp ≤ 1 − fixed_pc   (one duty per person per block)
//!      Σ_s hours_s · x_sp ≤ H_p           (hour share)
//!      0 ≤ x_sp ≤ 1
//! ```
//!
//! `H_p = fair_share_p · hour_share_slack`. Backup slots enter only the
//! demand row. The program is solved with `good_lp` on the pure-Rust
//! `microlp` backend.
//!
//! # Rounding
//!
//! Pairs are visited by fractional value (desc), cost (asc), slot, person;
//! each is accepted if the slot is still open and the pair passes the
//! [`LoadTracker`]. Remaining slots take the feasible candidate with the
//! highest fractional value, then lowest cost, then lowest index.
//!
//! # Reference
//! - Wolsey (1998), "Integer Programming", ch. 2 (LP relaxations)
//! - Raghavan & Thompson (1987), "Randomized rounding" (rounding of
//!   fractional assignments)

use std::collections::BTreeMap;
use std::time::Instant;

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, Solution, SolverModel,
    Variable,
};
use tracing::debug;

use super::greedy::scarcity_order;
use super::problem::ProblemInstance;
use super::state::{enforce_supervision, LoadTracker};
use super::{Algorithm, SolveContext, SolveOutcome, SolveStats};
use crate::error::SolverError;

const EPS: f64 = 1e-9;

/// Fractional solution: one value per candidate of each slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FractionalSolution {
    /// `values[s][i]` is the value of `slots[s].candidates[i]`.
    pub values: Vec<Vec<f64>>,
    /// Columns of the linear program.
    pub variables: usize,
    /// Rows of the linear program.
    pub rows: usize,
    /// Stopped before the program was solved.
    pub interrupted: bool,
}

/// Runs the relaxation strategy.
///
/// # Errors
/// [`SolverError::NumericalFailure`] if the hour-share slack is not a
/// positive finite number, the LP backend fails, or it returns a
/// non-finite value.
pub fn solve(instance: &ProblemInstance, ctx: &SolveContext) -> Result<SolveOutcome, SolverError> {
    let started = Instant::now();
    let mut stats = SolveStats::new(Algorithm::Relaxation);

    let fractional = relax(instance, ctx)?;
    stats.iterations = u32::from(!fractional.interrupted);

    let (mut picks, confidence) = round(instance, &fractional);
    enforce_supervision(instance, &mut picks);
    stats.nodes = fractional.variables as u64;

    Ok(SolveOutcome::finish(
        instance,
        picks,
        confidence,
        !fractional.interrupted,
        stats,
        started,
        ctx,
    ))
}

/// Builds and solves the linear relaxation.
pub fn relax(
    instance: &ProblemInstance,
    ctx: &SolveContext,
) -> Result<FractionalSolution, SolverError> {
    let slack = ctx.config.hour_share_slack;
    if !slack.is_finite() || slack <= 0.0 {
        return Err(SolverError::NumericalFailure {
            stage: "setup",
            detail: format!("hour share slack {slack}"),
        });
    }

    let mut values: Vec<Vec<f64>> = instance
        .slots
        .iter()
        .map(|s| vec![0.0; s.candidates.len()])
        .collect();
    let variables = instance.candidate_pairs();
    if ctx.should_stop() {
        return Ok(FractionalSolution {
            values,
            variables,
            rows: 0,
            interrupted: true,
        });
    }
    if variables == 0 {
        return Ok(FractionalSolution {
            values,
            variables,
            rows: 0,
            interrupted: false,
        });
    }

    let mut vars = ProblemVariables::new();
    let x: Vec<Vec<Variable>> = instance
        .slots
        .iter()
        .map(|slot| {
            slot.candidates
                .iter()
                .map(|_| vars.add(variable().min(0.0).max(1.0)))
                .collect()
        })
        .collect();

    let mut objective = Expression::from(0.0);
    let mut cell_rows: BTreeMap<(usize, usize), Expression> = BTreeMap::new();
    let mut hour_rows: BTreeMap<usize, Expression> = BTreeMap::new();
    for (s, slot) in instance.slots.iter().enumerate() {
        let duty = !slot.role.is_backup();
        for (i, &p) in slot.candidates.iter().enumerate() {
            let gain = instance.reward(s) - instance.static_cost(s, p);
            objective += gain * x[s][i];
            if duty {
                *cell_rows
                    .entry((p, slot.cell))
                    .or_insert_with(|| Expression::from(0.0)) += x[s][i];
                *hour_rows
                    .entry(p)
                    .or_insert_with(|| Expression::from(0.0)) += slot.hours * x[s][i];
            }
        }
    }

    let mut fixed_cells: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for duty in instance.fixed.iter().filter(|d| !d.backup) {
        *fixed_cells.entry((duty.person, duty.cell)).or_insert(0.0) += 1.0;
    }

    let mut problem = vars.maximise(objective).using(default_solver);
    let mut rows = 0usize;
    for row in &x {
        if row.is_empty() {
            continue;
        }
        let demand = row
            .iter()
            .fold(Expression::from(0.0), |acc, &v| acc + v);
        problem = problem.with(constraint!(demand <= 1.0));
        rows += 1;
    }
    for (key, row) in cell_rows {
        let capacity = (1.0 - fixed_cells.get(&key).copied().unwrap_or(0.0)).max(0.0);
        problem = problem.with(constraint!(row <= capacity));
        rows += 1;
    }
    for (p, row) in hour_rows {
        let share = (instance.fair_share[p] * slack).max(EPS);
        problem = problem.with(constraint!(row <= share));
        rows += 1;
    }

    debug!(variables, rows, "solving linear relaxation");
    let solution = problem.solve().map_err(|err| SolverError::NumericalFailure {
        stage: "lp",
        detail: err.to_string(),
    })?;

    for (s, row) in x.iter().enumerate() {
        for (i, &var) in row.iter().enumerate() {
            let v = solution.value(var);
            if !v.is_finite() {
                return Err(SolverError::NumericalFailure {
                    stage: "primal",
                    detail: format!("fractional value {v} at slot {s}"),
                });
            }
            values[s][i] = v.clamp(0.0, 1.0);
        }
    }
    Ok(FractionalSolution {
        values,
        variables,
        rows,
        interrupted: false,
    })
}

/// Rounds a fractional solution into feasible picks and per-slot confidence.
pub fn round(
    instance: &ProblemInstance,
    fractional: &FractionalSolution,
) -> (Vec<Option<usize>>, Vec<f64>) {
    let n = instance.slot_count();
    let mut picks: Vec<Option<usize>> = vec![None; n];
    let mut confidence = vec![0.0; n];
    let mut tracker = LoadTracker::new(instance);

    let mut pairs: Vec<(usize, usize, f64, f64)> = Vec::new();
    for (s, slot) in instance.slots.iter().enumerate() {
        for (i, &p) in slot.candidates.iter().enumerate() {
            let value = fractional.values[s][i];
            if value > EPS {
                pairs.push((s, i, value, instance.static_cost(s, p)));
            }
        }
    }
    pairs.sort_by(|a, b| {
        b.2.total_cmp(&a.2)
            .then(a.3.total_cmp(&b.3))
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });

    for (s, i, value, _) in pairs {
        if picks[s].is_some() {
            continue;
        }
        let p = instance.slots[s].candidates[i];
        if tracker.can_take(instance, s, p) {
            tracker.take(instance, s, p);
            picks[s] = Some(p);
            confidence[s] = value.clamp(0.0, 1.0);
        }
    }

    // Fix-up.
    let open = scarcity_order(instance, (0..n).filter(|&s| picks[s].is_none()));
    for s in open {
        let slot = &instance.slots[s];
        let mut best: Option<(f64, f64, usize, usize)> = None;
        for (i, &p) in slot.candidates.iter().enumerate() {
            if !tracker.can_take(instance, s, p) {
                continue;
            }
            let value = fractional.values[s][i];
            let cost = instance.static_cost(s, p);
            let better = best.map_or(true, |(bv, bc, _, _)| {
                value > bv + EPS || ((value - bv).abs() <= EPS && cost < bc)
            });
            if better {
                best = Some((value, cost, i, p));
            }
        }
        if let Some((value, _, _, p)) = best {
            tracker.take(instance, s, p);
            picks[s] = Some(p);
            confidence[s] = value.clamp(0.0, 1.0);
        }
    }

    (picks, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::control::CancellationToken;
    use crate::solver::testing::*;
    use std::time::Duration;

    #[test]
    fn test_relaxation_feasible_and_covering() {
        let instance = clinic(7, 6, 3);
        let outcome = solve(&instance, &ctx()).unwrap();
        assert!(outcome.exhausted);
        assert_eq!(outcome.stats.iterations, 1);
        assert_eq!(outcome.stats.nodes, instance.candidate_pairs() as u64);
        assert_eq!(outcome.stats.covered, instance.required_count());
        assert_feasible(&instance, &outcome.picks);
        assert!(outcome.confidence.iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[test]
    fn test_fractional_values_bounded() {
        let instance = clinic(3, 6, 2);
        let fractional = relax(&instance, &ctx()).unwrap();
        for (s, values) in fractional.values.iter().enumerate() {
            assert_eq!(values.len(), instance.slots[s].candidates.len());
            let total: f64 = values.iter().sum();
            assert!(total <= 1.0 + 1e-6);
            assert!(values.iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn test_lp_fills_required_demand() {
        let instance = clinic(3, 9, 3);
        let fractional = relax(&instance, &ctx()).unwrap();
        assert!(!fractional.interrupted);
        assert_eq!(fractional.variables, instance.candidate_pairs());
        for (s, slot) in instance.slots.iter().enumerate() {
            if slot.required {
                let total: f64 = fractional.values[s].iter().sum();
                assert!((total - 1.0).abs() < 1e-6, "slot {s} filled {total}");
            }
        }
    }

    #[test]
    fn test_cancelled_before_solve() {
        let instance = clinic(2, 3, 1);
        let token = CancellationToken::new();
        token.cancel();
        let ctx = SolveContext::new(Duration::from_secs(5), token, SolverConfig::default());
        let fractional = relax(&instance, &ctx).unwrap();
        assert!(fractional.interrupted);
        assert!(fractional.values.iter().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn test_deterministic_rounding() {
        let instance = clinic(7, 6, 2);
        let a = solve(&instance, &ctx()).unwrap();
        let b = solve(&instance, &ctx()).unwrap();
        assert_eq!(a.picks, b.picks);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_rounding_order() {
        let instance = clinic(1, 3, 1);
        // Put all weight on the last candidate of each slot.
        let values: Vec<Vec<f64>> = instance
            .slots
            .iter()
            .map(|s| {
                let mut v = vec![0.0; s.candidates.len()];
                if let Some(last) = v.last_mut() {
                    *last = 0.9;
                }
                v
            })
            .collect();
        let fractional = FractionalSolution {
            values,
            variables: instance.candidate_pairs(),
            rows: 0,
            interrupted: false,
        };
        let (picks, confidence) = round(&instance, &fractional);
        let first_resident = instance
            .slots
            .iter()
            .position(|s| s.role == crate::models::AssignmentRole::Primary)
            .unwrap();
        let slot = &instance.slots[first_resident];
        assert_eq!(picks[first_resident], slot.candidates.last().copied());
        assert!((confidence[first_resident] - 0.9).abs() < 1e-12);
        assert_feasible(&instance, &picks);
    }

    #[test]
    fn test_numerical_failure() {
        let instance = clinic(2, 3, 1);
        let mut config = SolverConfig::default();
        config.hour_share_slack = f64::NAN;
        let ctx = SolveContext::new(Duration::from_secs(5), CancellationToken::new(), config);
        let err = solve(&instance, &ctx).unwrap_err();
        assert!(matches!(err, SolverError::NumericalFailure { stage: "setup", .. }));
    }
}
