//! Constraint-propagation search.
//!
//! Slots are decision variables whose domain is their feasible candidates
//! plus "unfilled". Depth-first branch-and-bound with:
//!
//! - **Forward checking**: domains are recomputed against the
//!   [`LoadTracker`], so a person assigned in a block disappears from the
//!   block's other slots and from days where they would exceed a limit.
//! - **First-fail**: branch on the undecided slot with the smallest domain.
//! - **Cost-ordered values**: cheapest composite cost first, "unfilled" last.
//! - **Optimistic bound**: current value plus the reward of every undecided
//!   slot that still has a candidate; prune when it cannot beat the incumbent.
//!
//! Instances up to `exact_slot_limit` slots are searched whole; a complete
//! search proves optimality. Larger instances are improved by large
//! neighbourhood search: date windows of `neighbourhood_days` are released
//! and re-searched in a seeded shuffled order.
//!
//! # Reference
//! - Haralick & Elliott (1980), "Increasing Tree Search Efficiency for
//!   Constraint Satisfaction Problems"
//! - Shaw (1998), large neighbourhood search

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::time::Instant;

use super::greedy::{self, composite_cost, scarcity_order};
use super::objective::score;
use super::problem::ProblemInstance;
use super::state::{enforce_supervision, LoadTracker};
use super::{Algorithm, SolveContext, SolveOutcome, SolveStats};

const EPS: f64 = 1e-9;

/// Runs the search strategy, seeded by greedy.
pub fn solve(instance: &ProblemInstance, ctx: &SolveContext) -> SolveOutcome {
    let started = Instant::now();
    let mut stats = SolveStats::new(Algorithm::Search);
    let seed = greedy_seed(instance, ctx, &mut stats);
    refine(instance, ctx, seed, stats, started)
}

/// Improves `seed` within the remaining budget.
///
/// `seed` must satisfy the hard limits and supervision. The result never
/// scores below it.
pub fn refine(
    instance: &ProblemInstance,
    ctx: &SolveContext,
    seed: Vec<Option<usize>>,
    mut stats: SolveStats,
    started: Instant,
) -> SolveOutcome {
    let (picks, exhausted) = if instance.slot_count() <= ctx.config.exact_slot_limit {
        exact(instance, ctx, seed, &mut stats)
    } else {
        neighbourhoods(instance, ctx, seed, &mut stats)
    };
    let confidence = vec![1.0; picks.len()];
    SolveOutcome::finish(instance, picks, confidence, exhausted, stats, started, ctx)
}

fn greedy_seed(
    instance: &ProblemInstance,
    ctx: &SolveContext,
    stats: &mut SolveStats,
) -> Vec<Option<usize>> {
    let mut picks = vec![None; instance.slot_count()];
    let mut tracker = LoadTracker::new(instance);
    let order = scarcity_order(instance, 0..instance.slot_count());
    greedy::fill(instance, ctx, &mut tracker, &mut picks, &order, stats);
    enforce_supervision(instance, &mut picks);
    picks
}

fn exact(
    instance: &ProblemInstance,
    ctx: &SolveContext,
    seed: Vec<Option<usize>>,
    stats: &mut SolveStats,
) -> (Vec<Option<usize>>, bool) {
    let seed_value = score(instance, &seed);
    let free: Vec<usize> = (0..instance.slot_count()).collect();
    let base = vec![None; instance.slot_count()];
    let limit = ctx.config.max_nodes.saturating_sub(stats.nodes);
    let mut bb = BranchAndBound::new(instance, ctx, free, base, seed, seed_value, limit);
    bb.run();
    stats.nodes += bb.nodes;
    let complete = bb.complete();
    (bb.best, complete)
}

fn neighbourhoods(
    instance: &ProblemInstance,
    ctx: &SolveContext,
    mut best: Vec<Option<usize>>,
    stats: &mut SolveStats,
) -> (Vec<Option<usize>>, bool) {
    let config = &ctx.config;
    let span = config.neighbourhood_days.max(1) as usize;
    let mut windows: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (s, slot) in instance.slots.iter().enumerate() {
        windows.entry(slot.day / span).or_default().push(s);
    }
    let windows: Vec<Vec<usize>> = windows.into_values().collect();
    if windows.is_empty() {
        return (best, true);
    }

    let mut best_value = score(instance, &best);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let round_nodes = (config.max_nodes / u64::from(config.max_neighbourhood_rounds.max(1)))
        .max(config.poll_interval.max(1));
    let mut order: Vec<usize> = (0..windows.len()).collect();
    // Windows searched since the last improvement, and whether all of
    // those searches completed.
    let mut stale = 0usize;
    let mut stale_complete = true;

    while stats.rounds < config.max_neighbourhood_rounds {
        order.shuffle(&mut rng);
        for &w in &order {
            if stats.rounds >= config.max_neighbourhood_rounds
                || stats.nodes >= config.max_nodes
                || ctx.should_stop()
            {
                return (best, false);
            }
            stats.rounds += 1;

            let mut free = windows[w].clone();
            if free.len() > config.exact_slot_limit {
                free.shuffle(&mut rng);
                free.truncate(config.exact_slot_limit);
                free.sort_unstable();
            }
            let mut base = best.clone();
            for &s in &free {
                base[s] = None;
            }
            let mut bb = BranchAndBound::new(
                instance,
                ctx,
                free,
                base,
                best.clone(),
                best_value,
                round_nodes.min(config.max_nodes.saturating_sub(stats.nodes)),
            );
            bb.run();
            stats.nodes += bb.nodes;

            if bb.best_value > best_value + EPS {
                best_value = bb.best_value;
                best = bb.best;
                stale = 0;
                stale_complete = true;
            } else {
                stale += 1;
                stale_complete &= bb.complete();
                if stale >= windows.len() {
                    return (best, stale_complete);
                }
            }
        }
    }
    (best, false)
}

/// Depth-first branch-and-bound over a subset of slots.
struct BranchAndBound<'a> {
    instance: &'a ProblemInstance,
    ctx: &'a SolveContext,
    free: Vec<usize>,
    decided: Vec<bool>,
    tracker: LoadTracker,
    picks: Vec<Option<usize>>,
    /// Reward minus cost of everything decided so far.
    value: f64,
    best: Vec<Option<usize>>,
    best_value: f64,
    nodes: u64,
    node_limit: u64,
    stopped: bool,
}

impl<'a> BranchAndBound<'a> {
    /// `base` holds the non-free picks; `incumbent` is the solution to beat.
    fn new(
        instance: &'a ProblemInstance,
        ctx: &'a SolveContext,
        free: Vec<usize>,
        base: Vec<Option<usize>>,
        incumbent: Vec<Option<usize>>,
        incumbent_value: f64,
        node_limit: u64,
    ) -> Self {
        let tracker = LoadTracker::with_picks(instance, &base);
        let value = base
            .iter()
            .enumerate()
            .filter_map(|(s, p)| p.map(|p| instance.reward(s) - instance.static_cost(s, p)))
            .sum();
        Self {
            instance,
            ctx,
            decided: vec![false; free.len()],
            free,
            tracker,
            picks: base,
            value,
            best: incumbent,
            best_value: incumbent_value,
            nodes: 0,
            node_limit,
            stopped: false,
        }
    }

    fn run(&mut self) {
        self.branch();
    }

    fn complete(&self) -> bool {
        !self.stopped
    }

    fn branch(&mut self) {
        self.nodes += 1;
        let poll = self.ctx.config.poll_interval.max(1);
        if self.nodes > self.node_limit || (self.nodes % poll == 0 && self.ctx.should_stop()) {
            self.stopped = true;
        }
        if self.stopped {
            return;
        }

        let instance = self.instance;
        let mut bound = self.value;
        let mut choice: Option<(usize, Vec<usize>)> = None;
        for (i, &slot) in self.free.iter().enumerate() {
            if self.decided[i] {
                continue;
            }
            let domain: Vec<usize> = instance.slots[slot]
                .candidates
                .iter()
                .copied()
                .filter(|&p| self.tracker.can_take(instance, slot, p))
                .collect();
            if !domain.is_empty() {
                bound += instance.reward(slot);
            }
            if choice.as_ref().map_or(true, |(_, d)| domain.len() < d.len()) {
                choice = Some((i, domain));
            }
        }

        let Some((pos, domain)) = choice else {
            self.leaf();
            return;
        };
        if bound <= self.best_value + EPS {
            return;
        }

        let slot = self.free[pos];
        let mut values: Vec<(f64, usize)> = domain
            .into_iter()
            .map(|p| (composite_cost(instance, &self.tracker, slot, p), p))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        self.decided[pos] = true;
        for (_, p) in values {
            let gain = instance.reward(slot) - instance.static_cost(slot, p);
            self.tracker.take(instance, slot, p);
            self.picks[slot] = Some(p);
            self.value += gain;

            self.branch();

            self.value -= gain;
            self.picks[slot] = None;
            self.tracker.release(instance, slot, p);
            if self.stopped {
                break;
            }
        }
        if !self.stopped {
            self.branch();
        }
        self.decided[pos] = false;
    }

    fn leaf(&mut self) {
        let mut candidate = self.picks.clone();
        enforce_supervision(self.instance, &mut candidate);
        let value = score(self.instance, &candidate);
        if value > self.best_value + EPS {
            self.best_value = value;
            self.best = candidate;
        }
    }
}
