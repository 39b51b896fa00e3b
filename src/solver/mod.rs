//! Roster solvers.
//!
//! Every strategy consumes a [`ProblemInstance`] and returns one pick per
//! slot (a person index or nothing). Hard limits are enforced through the
//! shared [`LoadTracker`]; supervision is reconciled by
//! [`enforce_supervision`]; every outcome is scored by the same
//! [`objective`](objective::evaluate).
//!
//! # Strategies
//!
//! | Algorithm | Approach | Proves optimality |
//! |-----------|----------|-------------------|
//! | [`Algorithm::Greedy`] | scarcity-ordered, cheapest feasible candidate | no |
//! | [`Algorithm::Search`] | branch-and-bound; neighbourhood search when large | small instances |
//! | [`Algorithm::Relaxation`] | LP relaxation (`good_lp`) + deterministic rounding | no |
//! | [`Algorithm::Hybrid`] | best of greedy/relaxation, refined by search | small instances |
//!
//! Solvers are synchronous and poll [`SolveContext::should_stop`] at a
//! bounded cadence; on expiry they return their incumbent.
//!
//! # Reference
//! - Wolsey (1998), "Integer Programming" (LP relaxation and rounding)
//! - Shaw (1998), "Using Constraint Programming and Local Search Methods to
//!   Solve Vehicle Routing Problems" (large neighbourhood search)

pub mod greedy;
pub mod hybrid;
pub mod objective;
pub mod problem;
pub mod relaxation;
pub mod search;
pub mod state;

pub use objective::{evaluate, Evaluation};
pub use problem::{DemandSpec, ProblemBuilder, ProblemInstance, Slot, SupervisionGroup};
pub use state::{enforce_supervision, LoadTracker};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::SolverConfig;
use crate::control::CancellationToken;
use crate::error::SolverError;
use crate::telemetry::solve_span;

/// Solver strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Scarcity-ordered greedy construction.
    #[default]
    Greedy,
    /// Constraint-propagation search.
    Search,
    /// Linear relaxation with rounding.
    Relaxation,
    /// Greedy and relaxation seeds refined by search.
    Hybrid,
}

impl Algorithm {
    /// All strategies.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Greedy,
        Algorithm::Search,
        Algorithm::Relaxation,
        Algorithm::Hybrid,
    ];

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Greedy => "greedy",
            Algorithm::Search => "search",
            Algorithm::Relaxation => "relaxation",
            Algorithm::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown algorithm '{s}'"))
    }
}

/// Deadline, cancellation and tuning for one solve.
#[derive(Debug, Clone)]
pub struct SolveContext {
    deadline: Instant,
    cancel: CancellationToken,
    /// Solver tuning.
    pub config: SolverConfig,
}

impl SolveContext {
    /// Creates a context expiring `budget` from now.
    pub fn new(budget: Duration, cancel: CancellationToken, config: SolverConfig) -> Self {
        let now = Instant::now();
        Self {
            deadline: now.checked_add(budget).unwrap_or(now + Duration::from_secs(86_400)),
            cancel,
            config,
        }
    }

    /// Whether the solver must return its incumbent now.
    #[inline]
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.timed_out()
    }

    /// Whether the deadline passed.
    #[inline]
    pub fn timed_out(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Solve statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveStats {
    /// Strategy that produced the outcome.
    pub algorithm: Algorithm,
    /// Search nodes (or greedy decisions) visited.
    pub nodes: u64,
    /// Linear programs solved.
    pub iterations: u32,
    /// Neighbourhood rounds.
    pub rounds: u32,
    /// Wall time.
    pub elapsed_ms: u64,
    /// Objective value of the returned picks.
    pub objective: f64,
    /// Filled required slots.
    pub covered: usize,
    /// Required slots.
    pub required: usize,
    /// Stopped by the deadline.
    pub timed_out: bool,
    /// Stopped by cancellation.
    pub cancelled: bool,
    /// Strategy notices (degradation and similar).
    pub notices: Vec<String>,
}

impl SolveStats {
    /// Empty statistics for `algorithm`.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            nodes: 0,
            iterations: 0,
            rounds: 0,
            elapsed_ms: 0,
            objective: 0.0,
            covered: 0,
            required: 0,
            timed_out: false,
            cancelled: false,
            notices: Vec::new(),
        }
    }
}

/// Result of one solve.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    /// One pick per slot.
    pub picks: Vec<Option<usize>>,
    /// Confidence per slot in `[0, 1]`.
    pub confidence: Vec<f64>,
    /// Statistics.
    pub stats: SolveStats,
    /// Search space fully explored (optimal for search).
    pub exhausted: bool,
}

impl SolveOutcome {
    /// Scores `picks` and fills the summary statistics.
    pub(crate) fn finish(
        instance: &ProblemInstance,
        picks: Vec<Option<usize>>,
        confidence: Vec<f64>,
        exhausted: bool,
        mut stats: SolveStats,
        started: Instant,
        ctx: &SolveContext,
    ) -> Self {
        let eval = evaluate(instance, &picks);
        stats.objective = eval.value;
        stats.covered = eval.covered_required;
        stats.required = instance.required_count();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        if !exhausted {
            stats.cancelled |= ctx.cancelled();
            stats.timed_out |= !ctx.cancelled() && ctx.timed_out();
        }
        Self {
            picks,
            confidence,
            stats,
            exhausted,
        }
    }
}

/// Runs `algorithm` on `instance`.
///
/// # Errors
/// [`SolverError::NumericalFailure`] from the relaxation strategy.
/// Hybrid degrades instead of failing.
pub fn solve(
    algorithm: Algorithm,
    instance: &ProblemInstance,
    ctx: &SolveContext,
) -> Result<SolveOutcome, SolverError> {
    let span = solve_span(algorithm, instance.slot_count(), instance.candidate_pairs());
    let _enter = span.enter();

    let outcome = match algorithm {
        Algorithm::Greedy => greedy::solve(instance, ctx),
        Algorithm::Search => search::solve(instance, ctx),
        Algorithm::Relaxation => relaxation::solve(instance, ctx)?,
        Algorithm::Hybrid => hybrid::solve(instance, ctx),
    };

    debug!(
        algorithm = %algorithm,
        nodes = outcome.stats.nodes,
        iterations = outcome.stats.iterations,
        rounds = outcome.stats.rounds,
        objective = outcome.stats.objective,
        covered = outcome.stats.covered,
        required = outcome.stats.required,
        exhausted = outcome.exhausted,
        elapsed_ms = outcome.stats.elapsed_ms,
        "solve finished"
    );
    Ok(outcome)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for strategy tests.

    use super::*;
    use crate::config::CostWeights;
    use crate::models::{Block, DateRange, Person, PgyLevel, RotationTemplate, RuleSet};
    use chrono::NaiveDate;

    pub fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    pub fn ctx() -> SolveContext {
        SolveContext::new(
            Duration::from_secs(10),
            CancellationToken::new(),
            SolverConfig::default(),
        )
    }

    /// `days` days, `residents` residents (cycling PGY 1..3), `faculty`
    /// faculty, one supervised clinic with two residents per block.
    pub fn clinic(days: u32, residents: usize, faculty: usize) -> ProblemInstance {
        let range = DateRange::new(d(1), d(days));
        let mut people = Vec::new();
        for i in 0..residents {
            let level = PgyLevel::ALL[i % 3];
            people.push(Person::resident(format!("R{:02}", i + 1), level));
        }
        for i in 0..faculty {
            people.push(Person::faculty(format!("F{}", i + 1), "im"));
        }
        let rules = RuleSet::standard();
        let weights = CostWeights::default();
        ProblemBuilder::new(range, &rules, &weights)
            .with_people(people)
            .with_templates(vec![RotationTemplate::new("clinic", "clinic")
                .with_supervision(4)
                .with_residents_per_block(2)])
            .with_blocks(Block::horizon(range))
            .build()
            .unwrap()
    }

    /// Asserts hard limits hold for `picks`.
    pub fn assert_feasible(instance: &ProblemInstance, picks: &[Option<usize>]) {
        let mut tracker = LoadTracker::new(instance);
        for (s, pick) in picks.iter().enumerate() {
            if let Some(p) = *pick {
                assert!(instance.slots[s].candidates.contains(&p));
                assert!(tracker.can_take(instance, s, p), "slot {s} person {p}");
                tracker.take(instance, s, p);
            }
        }
        let mut check = picks.to_vec();
        assert_eq!(enforce_supervision(instance, &mut check), 0);
    }
}
