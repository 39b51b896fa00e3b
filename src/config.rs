//! Engine configuration.
//!
//! All settings have defaults suitable for a single residency program; a
//! deployment overrides them from JSON (`EngineConfig::from_json`) or with
//! the `with_*` builders. Missing JSON fields fall back to defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::RuleSet;
use crate::solver::Algorithm;

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Solver tuning.
    pub solver: SolverConfig,
    /// Objective weights.
    pub weights: CostWeights,
    /// Compliance rules applied to every run.
    pub rules: RuleSet,
    /// Budget used when a request does not name one.
    pub default_time_budget_ms: u64,
    /// Largest budget a request may ask for.
    pub max_time_budget_ms: u64,
    /// Extra time granted past the budget before the coordinator cancels.
    pub timeout_grace_ms: u64,
    /// How long a request waits for an overlapping lease before conflicting
    /// (0 = fail immediately).
    pub lock_wait_ms: u64,
    /// Lease lifetime; expired leases are reclaimed by the sweep.
    pub lease_ttl_secs: u64,
    /// How long terminal idempotency entries are kept in memory.
    pub idempotency_ttl_secs: u64,
    /// Replacement suggestions listed per coverage gap.
    pub suggestions_per_gap: usize,
    /// Longest range a single request may cover.
    pub max_range_days: i64,
    /// Strategy used by repair runs.
    pub repair_algorithm: Algorithm,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            weights: CostWeights::default(),
            rules: RuleSet::standard(),
            default_time_budget_ms: 5_000,
            max_time_budget_ms: 120_000,
            timeout_grace_ms: 500,
            lock_wait_ms: 0,
            lease_ttl_secs: 900,
            idempotency_ttl_secs: 86_400,
            suggestions_per_gap: 3,
            max_range_days: 366,
            repair_algorithm: Algorithm::Greedy,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets solver tuning.
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Sets objective weights.
    pub fn with_weights(mut self, weights: CostWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the rule set.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the default time budget in milliseconds.
    pub fn with_default_time_budget(mut self, ms: u64) -> Self {
        self.default_time_budget_ms = ms;
        self
    }

    /// Sets how long to wait for an overlapping lease.
    pub fn with_lock_wait(mut self, ms: u64) -> Self {
        self.lock_wait_ms = ms;
        self
    }

    /// Sets the lease lifetime in seconds.
    pub fn with_lease_ttl(mut self, secs: u64) -> Self {
        self.lease_ttl_secs = secs;
        self
    }

    /// Sets the idempotency retention in seconds.
    pub fn with_idempotency_ttl(mut self, secs: u64) -> Self {
        self.idempotency_ttl_secs = secs;
        self
    }

    /// Sets the number of suggestions per gap.
    pub fn with_suggestions_per_gap(mut self, n: usize) -> Self {
        self.suggestions_per_gap = n;
        self
    }

    /// Sets the repair strategy.
    pub fn with_repair_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.repair_algorithm = algorithm;
        self
    }

    /// Lease lifetime as a chrono duration.
    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_secs as i64)
    }

    /// Idempotency retention as a std duration.
    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    /// Resolves the budget for a request, clamped to the configured maximum.
    pub fn time_budget(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .unwrap_or(self.default_time_budget_ms)
            .min(self.max_time_budget_ms);
        Duration::from_millis(ms)
    }
}

/// Solver tuning shared by all strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Search nodes between cancellation/deadline checks.
    pub poll_interval: u64,
    /// Instances with at most this many open slots are searched exhaustively.
    pub exact_slot_limit: usize,
    /// Hard cap on explored nodes per search call.
    pub max_nodes: u64,
    /// Dates per large-neighbourhood window.
    pub neighbourhood_days: u32,
    /// Upper bound on neighbourhood rounds.
    pub max_neighbourhood_rounds: u32,
    /// Slack over the fair hour share allowed per person in the relaxation.
    pub hour_share_slack: f64,
    /// Consecutive duty days tolerated before the soft penalty applies.
    pub consecutive_soft_threshold: u32,
    /// Seed for neighbourhood ordering.
    pub seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            poll_interval: 256,
            exact_slot_limit: 40,
            max_nodes: 2_000_000,
            neighbourhood_days: 3,
            max_neighbourhood_rounds: 400,
            hour_share_slack: 1.25,
            consecutive_soft_threshold: 4,
            seed: 42,
        }
    }
}

impl SolverConfig {
    /// Sets the polling cadence.
    pub fn with_poll_interval(mut self, nodes: u64) -> Self {
        self.poll_interval = nodes.max(1);
        self
    }

    /// Sets the exhaustive-search threshold.
    pub fn with_exact_slot_limit(mut self, slots: usize) -> Self {
        self.exact_slot_limit = slots;
        self
    }

    /// Sets the node cap.
    pub fn with_max_nodes(mut self, nodes: u64) -> Self {
        self.max_nodes = nodes;
        self
    }

    /// Sets the hour-share slack of the relaxation.
    pub fn with_hour_share_slack(mut self, slack: f64) -> Self {
        self.hour_share_slack = slack;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Objective weights.
///
/// Coverage dominates: one filled required slot outweighs any combination
/// of soft penalties a single assignment can cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Reward per filled required slot.
    pub coverage: f64,
    /// Reward per filled backup slot.
    pub backup: f64,
    /// Penalty per assignment on an avoided weekday.
    pub preference: f64,
    /// Penalty per day of duty run beyond the soft threshold.
    pub consecutive: f64,
    /// Penalty per unit of hour variance within a person kind.
    pub fairness: f64,
    /// Greedy workload term (multiplies hours / fair share).
    pub workload: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            coverage: 1_000.0,
            backup: 50.0,
            preference: 5.0,
            consecutive: 2.0,
            fairness: 0.02,
            workload: 1.0,
        }
    }
}
