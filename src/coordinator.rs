//! Generation coordinator.
//!
//! Drives one generation request end to end:
//!
//! 1. Validate the request and reference data (no run is created on error)
//! 2. Reserve the idempotency key; replay or reject reuse
//! 3. Lease the date range; overlapping runs are rejected
//! 4. Build the instance and solve on a blocking thread under a deadline
//! 5. Enforce post-conditions, re-run compliance, classify
//! 6. Commit atomically (succeeded / partial only) and record the run
//!
//! | Status | Condition | Code |
//! |--------|-----------|------|
//! | `succeeded` | no gaps, no high/critical violations | 200 |
//! | `partial` | gaps, no high/critical violations | 207 |
//! | `failed` | violations, cancellation, solver or storage fault | 422 |

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument, Span};

use crate::compliance::{ComplianceEngine, ComplianceReport, Conflict, Finding};
use crate::config::EngineConfig;
use crate::control::{
    parameter_hash, ActiveRuns, CancellationToken, IdempotencyRegistry, RangeLockTable,
    Reservation, RunGuard,
};
use crate::error::{EngineError, EngineResult, RepositoryError};
use crate::models::{
    is_absent, Assignment, AssignmentChangeSet, Block, CoverageGap, DateRange, GenerationRun,
    PeopleFilter, Person, PgyLevel, RotationTemplate, RunId, RunKind, RunStatus, Schedule,
    Severity,
};
use crate::repair::RepairResponse;
use crate::repository::Repository;
use crate::solver::{
    self, enforce_supervision, Algorithm, ProblemBuilder, ProblemInstance, SolveContext,
    SolveOutcome, SolveStats,
};
use crate::telemetry::{generation_span, validation_span};
use crate::validation::{
    validate_range, validate_reference_data, validate_request, validate_rules,
};

/// A request to generate assignments for a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Tenant namespace for idempotency keys.
    pub tenant: String,
    /// Client deduplication token.
    pub idempotency_key: String,
    /// Dates to fill (inclusive).
    pub range: DateRange,
    /// Strategy.
    pub algorithm: Algorithm,
    /// Resident tiers to schedule (empty = all).
    pub pgy_levels: Vec<PgyLevel>,
    /// Templates to schedule (empty = all).
    pub template_ids: Vec<String>,
    /// Solve budget; the configured default applies when absent.
    pub time_budget_ms: Option<u64>,
}

impl GenerationRequest {
    /// Creates a greedy request over `range`.
    pub fn new(tenant: impl Into<String>, key: impl Into<String>, range: DateRange) -> Self {
        Self {
            tenant: tenant.into(),
            idempotency_key: key.into(),
            range,
            algorithm: Algorithm::Greedy,
            pgy_levels: Vec::new(),
            template_ids: Vec::new(),
            time_budget_ms: None,
        }
    }

    /// Sets the strategy.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Restricts residents to these tiers.
    pub fn with_pgy_levels(mut self, levels: Vec<PgyLevel>) -> Self {
        self.pgy_levels = levels;
        self
    }

    /// Restricts demand to these templates.
    pub fn with_templates(mut self, template_ids: Vec<String>) -> Self {
        self.template_ids = template_ids;
        self
    }

    /// Sets the solve budget.
    pub fn with_time_budget(mut self, ms: u64) -> Self {
        self.time_budget_ms = Some(ms);
        self
    }

    /// Parameters covered by the idempotency hash, in canonical order.
    fn parameters(&self) -> RequestParameters<'_> {
        let mut pgy_levels: Vec<u8> = self.pgy_levels.iter().map(|l| l.year()).collect();
        pgy_levels.sort_unstable();
        pgy_levels.dedup();
        let mut template_ids: Vec<&str> = self.template_ids.iter().map(String::as_str).collect();
        template_ids.sort_unstable();
        template_ids.dedup();
        RequestParameters {
            range: self.range,
            algorithm: self.algorithm,
            pgy_levels,
            template_ids,
            time_budget_ms: self.time_budget_ms,
        }
    }
}

#[derive(Serialize)]
struct RequestParameters<'a> {
    range: DateRange,
    algorithm: Algorithm,
    pgy_levels: Vec<u8>,
    template_ids: Vec<&'a str>,
    time_budget_ms: Option<u64>,
}

/// A rule instance left unsatisfied by a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsatisfiedConstraint {
    /// Rule name.
    pub rule: String,
    /// Person concerned.
    pub person_id: Option<String>,
    /// Block concerned.
    pub block_id: Option<String>,
    /// Offending window.
    pub window: DateRange,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// High or critical violations remain.
    Infeasible {
        /// The violated rule instances.
        unsatisfied: Vec<UnsatisfiedConstraint>,
    },
    /// Cancelled on request.
    Cancelled,
    /// Internal solver error (details are logged, not returned).
    SolverFault,
    /// Storage failure after the run started.
    Repository,
    /// The caller went away, or the process stopped, before the run finished.
    Abandoned,
}

/// Failure summary attached to a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Classification.
    pub reason: FailureReason,
    /// Caller-safe message.
    pub message: String,
}

/// Outcome of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Run id.
    pub run_id: RunId,
    /// Terminal status.
    pub status: RunStatus,
    /// HTTP-style status code (200 / 207 / 422).
    pub http_status: u16,
    /// Filled required slots.
    pub assigned: usize,
    /// Required slots.
    pub total: usize,
    /// Blocking and non-blocking rule violations.
    pub violations: Vec<Finding>,
    /// Warnings and advisories.
    pub warnings: Vec<Finding>,
    /// Double-bookings.
    pub conflicts: Vec<Conflict>,
    /// Unfilled required slots.
    pub gaps: Vec<CoverageGap>,
    /// Operational notices (timeouts, degradation, stripped picks).
    pub notices: Vec<String>,
    /// Present when `status` is failed.
    pub failure: Option<FailureReport>,
    /// Solver statistics, when the solver ran.
    pub stats: Option<SolveStats>,
}

impl GenerationResponse {
    fn failed(
        run_id: RunId,
        reason: FailureReason,
        message: impl Into<String>,
        total: usize,
        notices: Vec<String>,
    ) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            http_status: http_status(RunStatus::Failed),
            assigned: 0,
            total,
            violations: Vec::new(),
            warnings: Vec::new(),
            conflicts: Vec::new(),
            gaps: Vec::new(),
            notices,
            failure: Some(FailureReport {
                reason,
                message: message.into(),
            }),
            stats: None,
        }
    }

    /// Whether every required slot was filled.
    pub fn is_fully_assigned(&self) -> bool {
        self.assigned == self.total
    }
}

/// HTTP-style code for a terminal status.
pub fn http_status(status: RunStatus) -> u16 {
    match status {
        RunStatus::Succeeded => 200,
        RunStatus::Partial => 207,
        _ => 422,
    }
}

/// Result of a crash-recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Expired range leases removed.
    pub expired_leases: usize,
    /// Idempotency entries evicted.
    pub evicted_keys: usize,
    /// Unfinished run records with no executing run, marked failed.
    pub abandoned_runs: usize,
}

/// Orchestrates generation, repair and read-only queries.
///
/// # Example
/// ```ignore
/// let coordinator = Coordinator::new(Arc::new(repo), EngineConfig::default());
/// let request = GenerationRequest::new("clinic-a", "2025-01", range)
///     .with_algorithm(Algorithm::Hybrid);
/// let response = coordinator.generate(request).await?;
/// ```
pub struct Coordinator<R: Repository> {
    pub(crate) repo: Arc<R>,
    pub(crate) config: EngineConfig,
    pub(crate) locks: RangeLockTable,
    pub(crate) registry: IdempotencyRegistry,
    pub(crate) active: ActiveRuns,
}

impl<R: Repository + 'static> Coordinator<R> {
    /// Creates a coordinator over `repo`.
    pub fn new(repo: Arc<R>, config: EngineConfig) -> Self {
        let registry = IdempotencyRegistry::new(config.idempotency_ttl());
        Self {
            repo,
            config,
            locks: RangeLockTable::new(),
            registry,
            active: ActiveRuns::new(),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Range lease table.
    pub fn locks(&self) -> &RangeLockTable {
        &self.locks
    }

    /// Runs currently executing.
    pub fn active_runs(&self) -> Vec<RunId> {
        self.active.ids()
    }

    /// Requests cooperative cancellation of a running run.
    ///
    /// Returns `false` if the run is not executing.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let cancelled = self.active.cancel(run_id);
        if cancelled {
            info!(run_id = %run_id, "cancellation requested");
        }
        cancelled
    }

    /// Generates assignments for `request.range`.
    ///
    /// Infeasible, cancelled and faulted runs return `Ok` with status
    /// `failed`. Dropping the returned future cancels the solve and records
    /// the run as `failed` with [`FailureReason::Abandoned`].
    ///
    /// # Errors
    /// - [`EngineError::Input`] for malformed requests, reference data or rules
    /// - [`EngineError::Conflict`] when an intersecting run holds the range
    /// - [`EngineError::IdempotencyMismatch`] / [`EngineError::InProgress`]
    ///   on key reuse
    /// - [`EngineError::Repository`] when storage fails before the run starts
    pub async fn generate(&self, request: GenerationRequest) -> EngineResult<GenerationResponse> {
        let templates = self.repo.load_rotation_templates().await?;
        validate_request(&request, &templates, self.config.max_range_days)
            .map_err(EngineError::Input)?;
        let people = self.repo.load_people(&PeopleFilter::default()).await?;
        let blocks = self.repo.load_blocks(request.range).await?;
        validate_reference_data(&people, &templates, &blocks).map_err(EngineError::Input)?;
        validate_rules(&self.config.rules).map_err(EngineError::Input)?;

        let hash = parameter_hash(&request.parameters()).map_err(RepositoryError::from)?;
        self.sweep().await;

        let run_id = RunId::new();
        let tenant = request.tenant.as_str();
        let key = request.idempotency_key.as_str();
        match self
            .registry
            .reserve(self.repo.as_ref(), tenant, key, &hash, run_id)
            .await?
        {
            Reservation::Fresh => {}
            Reservation::Replay(payload) => {
                info!(tenant, key, "replaying stored response");
                return serde_json::from_value(payload)
                    .map_err(|err| EngineError::Repository(err.into()));
            }
            Reservation::InProgress(holder) => {
                return Err(EngineError::InProgress { run_id: holder });
            }
            Reservation::Mismatch => {
                warn!(tenant, key, "idempotency key reused with different parameters");
                return Err(EngineError::IdempotencyMismatch {
                    key: key.to_string(),
                });
            }
        }

        let abandoned = GenerationResponse::failed(
            run_id,
            FailureReason::Abandoned,
            "request was dropped before the run finished",
            0,
            Vec::new(),
        );
        let mut lifecycle = RunGuard::new(
            Arc::clone(&self.repo),
            &self.active,
            run_id,
            to_payload(&abandoned),
        )
        .with_key(&self.registry, tenant, key);

        let guard = match self
            .locks
            .acquire(
                request.range,
                run_id,
                self.config.lease_ttl(),
                Duration::from_millis(self.config.lock_wait_ms),
            )
            .await
        {
            Ok(guard) => guard,
            Err(blocking) => {
                lifecycle.release().await;
                warn!(
                    range = %request.range,
                    holder = %blocking.holder,
                    "range held by another run"
                );
                return Err(EngineError::Conflict {
                    range: request.range,
                    holder: blocking.holder,
                });
            }
        };

        let mut run = GenerationRun::new(
            run_id,
            RunKind::Generation,
            tenant,
            key,
            hash,
            request.range,
        );
        if let Err(err) = self.start_run(&mut run).await {
            lifecycle.release().await;
            return Err(err.into());
        }
        lifecycle.attach(run);

        let token = lifecycle.token().clone();
        let span = generation_span(run_id, request.range, request.algorithm);
        let response = self
            .execute(&request, run_id, people, templates, blocks, &token)
            .instrument(span.clone())
            .await;

        let payload = to_payload(&response);
        span.in_scope(|| {
            info!(
                status = %response.status,
                assigned = response.assigned,
                total = response.total,
                violations = response.violations.len(),
                "generation finished"
            )
        });
        lifecycle.finish(response.status, payload).await;
        drop(guard);
        Ok(response)
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        run_id: RunId,
        people: Vec<Person>,
        templates: Vec<RotationTemplate>,
        blocks: Vec<Block>,
        token: &CancellationToken,
    ) -> GenerationResponse {
        let rules = &self.config.rules;
        let lookback = ProblemBuilder::lookback_days(rules);
        let extended = request.range.extend(lookback, lookback);

        let existing = match self.repo.load_assignments(extended).await {
            Ok(existing) => existing,
            Err(err) => return repository_failure(run_id, &err, 0, Vec::new()),
        };
        let absences = match self.repo.load_absences(extended).await {
            Ok(absences) => absences,
            Err(err) => return repository_failure(run_id, &err, 0, Vec::new()),
        };

        // In-range assignments of the solved templates are regenerated;
        // everything else is held fixed.
        let solved: HashSet<&str> = templates
            .iter()
            .map(|t| t.id.as_str())
            .filter(|id| {
                request.template_ids.is_empty()
                    || request.template_ids.iter().any(|t| t.as_str() == *id)
            })
            .collect();
        let tier_in_scope = |person_id: &str| {
            people
                .iter()
                .find(|p| p.id == person_id)
                .and_then(Person::pgy_level)
                .map_or(true, |level| {
                    request.pgy_levels.is_empty() || request.pgy_levels.contains(&level)
                })
        };
        let (replaced, fixed): (Vec<Assignment>, Vec<Assignment>) =
            existing.into_iter().partition(|a| {
                request.range.contains(a.date)
                    && solved.contains(a.template_id.as_str())
                    && tier_in_scope(&a.person_id)
            });

        let instance = match ProblemBuilder::new(request.range, rules, &self.config.weights)
            .with_people(people.clone())
            .with_templates(templates.clone())
            .with_blocks(blocks)
            .with_absences(absences.clone())
            .with_fixed_assignments(fixed.clone())
            .with_pgy_levels(request.pgy_levels.clone())
            .with_template_ids(request.template_ids.clone())
            .with_soft_consecutive(self.config.solver.consecutive_soft_threshold)
            .build()
        {
            Ok(instance) => Arc::new(instance),
            Err(err) => {
                error!(run_id = %run_id, error = %err, "instance construction failed");
                return GenerationResponse::failed(
                    run_id,
                    FailureReason::SolverFault,
                    "internal solver error",
                    0,
                    Vec::new(),
                );
            }
        };
        let total = instance.required_count();

        let budget = self.config.time_budget(request.time_budget_ms);
        let (result, overran) = self
            .solve_blocking(request.algorithm, Arc::clone(&instance), budget, token)
            .await;

        let mut notices = Vec::new();
        if overran {
            notices.push(format!(
                "TimeoutExceeded: solver overran its {} ms budget and was cancelled",
                budget.as_millis()
            ));
        }
        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(detail) => {
                error!(run_id = %run_id, detail = %detail, "solver fault");
                return GenerationResponse::failed(
                    run_id,
                    FailureReason::SolverFault,
                    "internal solver error",
                    total,
                    notices,
                );
            }
        };
        if token.is_cancelled() && !overran {
            info!(run_id = %run_id, "run cancelled; nothing committed");
            let mut response = GenerationResponse::failed(
                run_id,
                FailureReason::Cancelled,
                "run was cancelled",
                total,
                notices,
            );
            response.stats = Some(outcome.stats);
            return response;
        }
        if outcome.stats.timed_out && !overran {
            notices.push(format!(
                "TimeoutExceeded: {} ms budget exhausted; best solution found is returned",
                budget.as_millis()
            ));
        }
        notices.extend(outcome.stats.notices.iter().cloned());

        let stripped = enforce_post_conditions(&instance, &mut outcome.picks, &fixed);
        for finding in &stripped {
            notices.push(format!("PostConditionStripped: {}", finding.message));
        }
        let (assignments, gaps) = instance.decode(&outcome.picks, &outcome.confidence, run_id);

        let mut combined = fixed;
        combined.extend(assignments.iter().cloned());
        let mut report = ComplianceEngine::new(&people, &templates).evaluate(
            &combined,
            &absences,
            rules,
            request.range,
        );
        report.warnings.extend(stripped);

        let (status, failure) = classify(&report, gaps.len());
        if status != RunStatus::Failed {
            let changes = AssignmentChangeSet {
                supersede: replaced.iter().map(|a| a.id).collect(),
                insert: assignments,
            };
            let inserted = changes.insert.len();
            if let Err(err) = self.repo.commit_assignments(run_id, changes).await {
                return repository_failure(run_id, &err, total, notices);
            }
            info!(run_id = %run_id, inserted, superseded = replaced.len(), "assignments committed");
        }

        GenerationResponse {
            run_id,
            status,
            http_status: http_status(status),
            assigned: total.saturating_sub(gaps.len()),
            total,
            violations: report.violations,
            warnings: report.warnings,
            conflicts: report.conflicts,
            gaps,
            notices,
            failure,
            stats: Some(outcome.stats),
        }
    }

    /// Runs the solver on a blocking thread, cancelling it if it overruns
    /// `budget` plus the configured grace. Returns the outcome (or an
    /// internal error description) and whether the overrun fired.
    pub(crate) async fn solve_blocking(
        &self,
        algorithm: Algorithm,
        instance: Arc<ProblemInstance>,
        budget: Duration,
        token: &CancellationToken,
    ) -> (Result<SolveOutcome, String>, bool) {
        let ctx = SolveContext::new(budget, token.clone(), self.config.solver.clone());
        let span = Span::current();
        let mut handle = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            solver::solve(algorithm, &instance, &ctx)
        });

        let limit = budget + Duration::from_millis(self.config.timeout_grace_ms);
        let (joined, overran) = match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => (joined, false),
            Err(_) => {
                warn!(
                    budget_ms = budget.as_millis() as u64,
                    "solver overran its budget; cancelling"
                );
                token.cancel();
                (handle.await, true)
            }
        };
        let result = match joined {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(err.to_string()),
            Err(err) => Err(format!("solver task failed: {err}")),
        };
        (result, overran)
    }

    pub(crate) async fn start_run(&self, run: &mut GenerationRun) -> Result<(), RepositoryError> {
        self.repo.save_run(run).await?;
        run.transition(RunStatus::Running);
        self.repo.save_run(run).await?;
        info!(run_id = %run.id, kind = ?run.kind, range = %run.range, "run started");
        Ok(())
    }

    /// Evaluates stored assignments over `range` without mutating anything.
    ///
    /// # Errors
    /// [`EngineError::Input`] for an invalid range or rule set; repository
    /// failures.
    pub async fn validate(&self, range: DateRange) -> EngineResult<ComplianceReport> {
        validate_range(&range, self.config.max_range_days).map_err(EngineError::Input)?;
        validate_rules(&self.config.rules).map_err(EngineError::Input)?;
        let span = validation_span(range);
        async {
            let rules = &self.config.rules;
            let lookback = ProblemBuilder::lookback_days(rules);
            let extended = range.extend(lookback, lookback);
            let people = self.repo.load_people(&PeopleFilter::default()).await?;
            let templates = self.repo.load_rotation_templates().await?;
            let assignments = self.repo.load_assignments(extended).await?;
            let absences = self.repo.load_absences(extended).await?;
            let report = ComplianceEngine::new(&people, &templates).evaluate(
                &assignments,
                &absences,
                rules,
                range,
            );
            info!(
                violations = report.violations.len(),
                warnings = report.warnings.len(),
                conflicts = report.conflicts.len(),
                "validation finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Active assignments in `range`.
    ///
    /// # Errors
    /// [`EngineError::Input`] for an invalid range; repository failures.
    pub async fn schedule(&self, range: DateRange) -> EngineResult<Schedule> {
        validate_range(&range, self.config.max_range_days).map_err(EngineError::Input)?;
        let assignments = self.repo.load_assignments(range).await?;
        Ok(Schedule::from_assignments(assignments))
    }

    /// Run record by id.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] for unknown runs; repository failures.
    pub async fn run(&self, run_id: RunId) -> EngineResult<GenerationRun> {
        self.repo
            .load_run_by_id(run_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("run {run_id}")))
    }

    /// Drops expired range leases and idempotency entries, and fails
    /// persisted runs that no longer execute (left over from a crash or a
    /// guard that dropped outside a runtime).
    pub async fn sweep(&self) -> SweepReport {
        let expired_leases = self.locks.sweep_expired().len();
        let evicted_keys = self.registry.evict_expired().await;
        let abandoned_runs = self.fail_orphaned_runs().await;
        if expired_leases > 0 || evicted_keys > 0 || abandoned_runs > 0 {
            info!(expired_leases, evicted_keys, abandoned_runs, "sweep reclaimed state");
        }
        SweepReport {
            expired_leases,
            evicted_keys,
            abandoned_runs,
        }
    }

    async fn fail_orphaned_runs(&self) -> usize {
        let unfinished = match self.repo.load_unfinished_runs().await {
            Ok(runs) => runs,
            Err(err) => {
                warn!(error = %err, "could not list unfinished runs");
                return 0;
            }
        };
        let leased: HashSet<RunId> = self.locks.leases().iter().map(|l| l.holder).collect();
        let mut failed = 0;
        for mut run in unfinished {
            if self.active.contains(run.id) || leased.contains(&run.id) {
                continue;
            }
            let message = "run was abandoned before it finished";
            let payload = match run.kind {
                RunKind::Generation => to_payload(&GenerationResponse::failed(
                    run.id,
                    FailureReason::Abandoned,
                    message,
                    0,
                    Vec::new(),
                )),
                RunKind::Repair => to_payload(&RepairResponse::failed(
                    run.id,
                    FailureReason::Abandoned,
                    message,
                    Vec::new(),
                )),
            };
            run.finish(RunStatus::Failed, payload);
            match self.repo.save_run(&run).await {
                Ok(()) => {
                    warn!(run_id = %run.id, kind = ?run.kind, "failed orphaned run");
                    failed += 1;
                }
                Err(err) => error!(run_id = %run.id, error = %err, "failed to close orphaned run"),
            }
        }
        failed
    }
}

/// Strips picks that break qualification, absence or single booking.
///
/// Checks are independent of the strategy that produced the picks. Returns
/// one warning per stripped pick; supervision is reconciled afterwards.
pub(crate) fn enforce_post_conditions(
    instance: &ProblemInstance,
    picks: &mut [Option<usize>],
    fixed: &[Assignment],
) -> Vec<Finding> {
    let mut booked: HashSet<(&str, &str, bool)> = fixed
        .iter()
        .filter(|a| a.is_active())
        .map(|a| (a.person_id.as_str(), a.block_id.as_str(), a.role.is_backup()))
        .collect();

    let mut stripped = Vec::new();
    for (s, pick) in picks.iter_mut().enumerate() {
        let Some(p) = *pick else {
            continue;
        };
        let slot = &instance.slots[s];
        let person = &instance.people[p];
        let block = &instance.blocks[slot.block];
        let template = &instance.templates[slot.template];

        let problem = if !person.qualifies_for(template, slot.role) {
            Some("not qualified")
        } else if is_absent(&instance.absences, &person.id, block.date) {
            Some("absent")
        } else if !booked.insert((person.id.as_str(), block.id.as_str(), slot.role.is_backup())) {
            Some("double-booked")
        } else {
            None
        };

        if let Some(problem) = problem {
            warn!(
                person = %person.id,
                block = %block.id,
                role = %slot.role,
                problem,
                "stripping invalid pick"
            );
            *pick = None;
            stripped.push(Finding {
                rule: "post_condition".to_string(),
                code: "post_condition".to_string(),
                severity: Severity::Medium,
                person_id: Some(person.id.clone()),
                block_id: Some(block.id.clone()),
                window: DateRange::single(block.date),
                measured: 1.0,
                threshold: 0.0,
                message: format!(
                    "{} removed from {} ({}): {problem}",
                    person.id, block.id, slot.role
                ),
            });
        }
    }
    if !stripped.is_empty() {
        enforce_supervision(instance, picks);
    }
    stripped
}

/// Status and failure report for a compliance outcome.
pub(crate) fn classify(
    report: &ComplianceReport,
    gaps: usize,
) -> (RunStatus, Option<FailureReport>) {
    let unsatisfied: Vec<UnsatisfiedConstraint> = report
        .blocking_violations()
        .map(|f| UnsatisfiedConstraint {
            rule: f.rule.clone(),
            person_id: f.person_id.clone(),
            block_id: f.block_id.clone(),
            window: f.window,
        })
        .collect();
    if !unsatisfied.is_empty() {
        let message = format!("{} high or critical violations remain", unsatisfied.len());
        return (
            RunStatus::Failed,
            Some(FailureReport {
                reason: FailureReason::Infeasible { unsatisfied },
                message,
            }),
        );
    }
    if gaps == 0 {
        (RunStatus::Succeeded, None)
    } else {
        (RunStatus::Partial, None)
    }
}

pub(crate) fn repository_failure(
    run_id: RunId,
    err: &RepositoryError,
    total: usize,
    notices: Vec<String>,
) -> GenerationResponse {
    error!(run_id = %run_id, error = %err, "repository failure during run");
    GenerationResponse::failed(
        run_id,
        FailureReason::Repository,
        "storage unavailable; nothing was committed",
        total,
        notices,
    )
}

pub(crate) fn to_payload<T: Serialize>(response: &T) -> serde_json::Value {
    serde_json::to_value(response).unwrap_or_else(|err| {
        error!(error = %err, "response could not be encoded");
        serde_json::Value::Null
    })
}
