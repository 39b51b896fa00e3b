//! Hybrid strategy: best seed of greedy and relaxation, refined by search.
//!
//! Relaxation faults degrade the strategy to the greedy seed alone and are
//! reported as a notice. Search only accepts strict improvements, so the
//! result never scores below either seed.

use std::time::Instant;
use tracing::warn;

use super::problem::ProblemInstance;
use super::{greedy, relaxation, search, Algorithm, SolveContext, SolveOutcome, SolveStats};

/// Runs the hybrid strategy.
pub fn solve(instance: &ProblemInstance, ctx: &SolveContext) -> SolveOutcome {
    let started = Instant::now();
    let mut stats = SolveStats::new(Algorithm::Hybrid);

    let greedy = greedy::solve(instance, ctx);
    stats.nodes += greedy.stats.nodes;
    let mut seed = greedy.picks;
    let mut seed_value = greedy.stats.objective;

    if ctx.should_stop() {
        let confidence = vec![1.0; seed.len()];
        return SolveOutcome::finish(instance, seed, confidence, false, stats, started, ctx);
    }

    match relaxation::solve(instance, ctx) {
        Ok(relaxed) => {
            stats.iterations = relaxed.stats.iterations;
            if relaxed.stats.objective > seed_value {
                seed = relaxed.picks;
                seed_value = relaxed.stats.objective;
            }
        }
        Err(err) => {
            warn!(error = %err, "relaxation failed; continuing from the greedy seed");
            stats
                .notices
                .push(format!("StrategyDegraded: relaxation failed ({err}); greedy seed used"));
        }
    }

    let mut refined = search::refine(instance, ctx, seed, stats, started);
    debug_assert!(refined.stats.objective + 1e-9 >= seed_value);
    refined.stats.algorithm = Algorithm::Hybrid;
    refined
}
