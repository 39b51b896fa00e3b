//! Scarcity-ordered greedy construction.
//!
//! # Algorithm
//!
//! 1. Order slots by ascending candidate count, then block sequence.
//! 2. For each slot, pick the feasible candidate with the lowest composite
//!    cost (workload relative to fair share, preference penalty,
//!    consecutive-duty penalty). Ties go to the lowest person index.
//! 3. Decisions are irrevocable; supervision is reconciled at the end.
//!
//! # Complexity
//! O(s log s + s · c · w) where s=slots, c=candidates/slot, w=window days.
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 4: Priority Dispatching

use std::time::Instant;

use super::problem::ProblemInstance;
use super::state::{enforce_supervision, LoadTracker};
use super::{Algorithm, SolveContext, SolveOutcome, SolveStats};

/// Runs the greedy strategy.
pub fn solve(instance: &ProblemInstance, ctx: &SolveContext) -> SolveOutcome {
    let started = Instant::now();
    let mut stats = SolveStats::new(Algorithm::Greedy);
    let mut picks = vec![None; instance.slot_count()];
    let mut tracker = LoadTracker::new(instance);

    let order = scarcity_order(instance, 0..instance.slot_count());
    let completed = fill(instance, ctx, &mut tracker, &mut picks, &order, &mut stats);
    enforce_supervision(instance, &mut picks);

    let confidence = vec![1.0; picks.len()];
    SolveOutcome::finish(instance, picks, confidence, completed, stats, started, ctx)
}

/// Slots sorted by candidate count, block sequence, slot index.
pub(crate) fn scarcity_order(
    instance: &ProblemInstance,
    slots: impl IntoIterator<Item = usize>,
) -> Vec<usize> {
    let mut order: Vec<usize> = slots.into_iter().collect();
    order.sort_by_key(|&s| {
        let slot = &instance.slots[s];
        (
            slot.candidates.len(),
            instance.blocks[slot.block].sequence,
            s,
        )
    });
    order
}

/// Cost of giving `slot` to `person` given the current load.
pub(crate) fn composite_cost(
    instance: &ProblemInstance,
    tracker: &LoadTracker,
    slot: usize,
    person: usize,
) -> f64 {
    let s = &instance.slots[slot];
    let w = &instance.weights;
    let share = instance.fair_share[person].max(1.0);
    let workload = w.workload * (tracker.assigned_hours(person) + s.hours) / share;
    let excess = if s.role.is_backup() {
        0
    } else {
        tracker
            .run_if_added(person, s.day)
            .saturating_sub(instance.soft_consecutive)
    };
    workload + instance.static_cost(slot, person) + w.consecutive * excess as f64
}

/// Cheapest feasible candidate for `slot`.
pub(crate) fn best_candidate(
    instance: &ProblemInstance,
    tracker: &LoadTracker,
    slot: usize,
) -> Option<usize> {
    let mut best: Option<(f64, usize)> = None;
    for &p in &instance.slots[slot].candidates {
        if !tracker.can_take(instance, slot, p) {
            continue;
        }
        let cost = composite_cost(instance, tracker, slot, p);
        if best.map_or(true, |(c, _)| cost < c) {
            best = Some((cost, p));
        }
    }
    best.map(|(_, p)| p)
}

/// Fills the undecided slots of `order` greedily.
///
/// Returns `false` if interrupted by the context before finishing.
pub(crate) fn fill(
    instance: &ProblemInstance,
    ctx: &SolveContext,
    tracker: &mut LoadTracker,
    picks: &mut [Option<usize>],
    order: &[usize],
    stats: &mut SolveStats,
) -> bool {
    let poll = ctx.config.poll_interval.max(1);
    for &slot in order {
        stats.nodes += 1;
        if stats.nodes % poll == 0 && ctx.should_stop() {
            return false;
        }
        if picks[slot].is_some() {
            continue;
        }
        if let Some(p) = best_candidate(instance, tracker, slot) {
            tracker.take(instance, slot, p);
            picks[slot] = Some(p);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::control::CancellationToken;
    use crate::models::AssignmentRole;
    use crate::solver::testing::*;
    use std::time::Duration;

    #[test]
    fn test_full_coverage_when_staffed() {
        let instance = clinic(7, 6, 3);
        let outcome = solve(&instance, &ctx());
        assert!(outcome.exhausted);
        assert_eq!(outcome.stats.covered, instance.required_count());
        assert_feasible(&instance, &outcome.picks);
    }

    #[test]
    fn test_deterministic() {
        let instance = clinic(10, 6, 2);
        let a = solve(&instance, &ctx());
        let b = solve(&instance, &ctx());
        assert_eq!(a.picks, b.picks);
    }

    #[test]
    fn test_single_faculty_hits_consecutive_cap() {
        let instance = clinic(7, 6, 1);
        let outcome = solve(&instance, &ctx());
        assert_feasible(&instance, &outcome.picks);
        // Day 7 has neither supervisor nor residents.
        let last = instance.range.end;
        for (s, slot) in instance.slots.iter().enumerate() {
            if instance.blocks[slot.block].date == last && slot.role != AssignmentRole::Backup {
                assert_eq!(outcome.picks[s], None);
            }
        }
        assert_eq!(outcome.stats.covered, 6 * 2 * 3);
    }

    #[test]
    fn test_scarcity_order() {
        let instance = clinic(2, 6, 2);
        let order = scarcity_order(&instance, 0..instance.slot_count());
        // Supervising slots (2 candidates) come before resident slots (6).
        let first_resident = order
            .iter()
            .position(|&s| instance.slots[s].role == AssignmentRole::Primary)
            .unwrap();
        assert!(order[..first_resident]
            .iter()
            .all(|&s| instance.slots[s].role == AssignmentRole::Supervising));
    }

    #[test]
    fn test_spreads_workload() {
        let instance = clinic(7, 6, 2);
        let outcome = solve(&instance, &ctx());
        let mut hours = vec![0.0; instance.people.len()];
        for (s, pick) in outcome.picks.iter().enumerate() {
            if let Some(p) = pick {
                hours[*p] += instance.slots[s].hours;
            }
        }
        let residents = &instance.pools[0];
        let max = residents.iter().map(|&p| hours[p]).fold(0.0, f64::max);
        let min = residents.iter().map(|&p| hours[p]).fold(f64::MAX, f64::min);
        assert!(max - min <= 12.0 + 1e-9);
    }

    #[test]
    fn test_cancelled_returns_incumbent() {
        let instance = clinic(7, 6, 2);
        let token = CancellationToken::new();
        token.cancel();
        let ctx = SolveContext::new(
            Duration::from_secs(10),
            token,
            SolverConfig::default().with_poll_interval(1),
        );
        let outcome = solve(&instance, &ctx);
        assert!(!outcome.exhausted);
        assert!(outcome.stats.cancelled);
        assert!(outcome.picks.iter().all(|p| p.is_none()));
    }
}
