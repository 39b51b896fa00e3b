//! Absence repair.
//!
//! Re-solves only the slots a newly absent person held inside the absence
//! window. Everything else stays fixed, so a repair never changes an
//! assignment outside the window.
//!
//! # Algorithm
//!
//! 1. Affected set: the person's active assignments dated in the window
//! 2. Reduced instance: one slot per affected (block, template, role), the
//!    absent person excluded, all other active assignments fixed
//! 3. Solve with the configured repair strategy, then enforce
//!    post-conditions
//! 4. Unfilled slots become gaps flagged for manual review, each with
//!    replacement suggestions ranked by conflict score
//! 5. Re-validate the absent person and every replacement over the window
//!    widened by the rule lookback
//! 6. Commit: supersede the affected assignments, insert replacements
//!
//! # Conflict score
//!
//! | Conflict | Weight |
//! |----------|--------|
//! | absent on the date | 0.5 |
//! | not qualified for the template | 0.4 |
//! | already booked in the block | 0.3 |
//! | would breach a duty limit | 0.2 |
//! | current workload | 0.1 × load fraction |
//!
//! Scores are clamped to `[0, 1]`; lower is a better fit.

use chrono::{Duration as Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{error, info, Instrument};

use crate::compliance::{ComplianceEngine, Conflict, Finding};
use crate::control::{parameter_hash, CancellationToken, RunGuard};
use crate::coordinator::{
    classify, enforce_post_conditions, http_status, to_payload, Coordinator, FailureReason,
    FailureReport,
};
use crate::error::{EngineError, EngineResult, RepositoryError};
use crate::models::{
    is_absent, Absence, AbsenceKind, Assignment, AssignmentChangeSet, AssignmentRole, CoverageGap,
    DateRange, GenerationRun, PeopleFilter, Person, ReplacementSuggestion, RotationTemplate,
    RuleSet, RunId, RunKind, RunStatus,
};
use crate::repository::Repository;
use crate::solver::{DemandSpec, ProblemBuilder};
use crate::telemetry::repair_span;
use crate::validation::{validate_repair, validate_rules};

const ABSENT_WEIGHT: f64 = 0.5;
const UNQUALIFIED_WEIGHT: f64 = 0.4;
const BOOKED_WEIGHT: f64 = 0.3;
const LIMIT_WEIGHT: f64 = 0.2;
const WORKLOAD_WEIGHT: f64 = 0.1;

/// A sudden absence to repair around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRequest {
    /// Tenant namespace.
    pub tenant: String,
    /// Absent person.
    pub person_id: String,
    /// Absence window (inclusive).
    pub window: DateRange,
    /// Reason for the absence.
    pub reason: AbsenceKind,
}

impl RepairRequest {
    /// Creates a repair request.
    pub fn new(
        tenant: impl Into<String>,
        person_id: impl Into<String>,
        window: DateRange,
        reason: AbsenceKind,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            person_id: person_id.into(),
            window,
            reason,
        }
    }

    fn absence(&self) -> Absence {
        Absence::new(self.person_id.clone(), self.window, self.reason.clone())
    }
}

/// One reassigned slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    /// Block.
    pub block_id: String,
    /// Block date.
    pub date: NaiveDate,
    /// Template.
    pub template_id: String,
    /// Role.
    pub role: AssignmentRole,
    /// Absent person.
    pub from: String,
    /// Replacement.
    pub to: String,
}

/// Outcome of a repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairResponse {
    /// Run id.
    pub run_id: RunId,
    /// `succeeded`, `partial` (gaps or violations left for review) or
    /// `failed` (nothing committed).
    pub status: RunStatus,
    /// HTTP-style status code.
    pub http_status: u16,
    /// Reassigned slots.
    pub replacements: Vec<Replacement>,
    /// `replacements.len()`.
    pub replacement_count: usize,
    /// Slots nobody could take; always flagged for manual review.
    pub gaps: Vec<CoverageGap>,
    /// Violations for the absent person and replacements.
    pub violations: Vec<Finding>,
    /// Warnings for the absent person and replacements.
    pub warnings: Vec<Finding>,
    /// Double-bookings involving the same people.
    pub conflicts: Vec<Conflict>,
    /// Operational notices.
    pub notices: Vec<String>,
    /// Present when `status` is failed.
    pub failure: Option<FailureReport>,
}

impl RepairResponse {
    pub(crate) fn failed(
        run_id: RunId,
        reason: FailureReason,
        message: &str,
        notices: Vec<String>,
    ) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            http_status: http_status(RunStatus::Failed),
            replacements: Vec::new(),
            replacement_count: 0,
            gaps: Vec::new(),
            violations: Vec::new(),
            warnings: Vec::new(),
            conflicts: Vec::new(),
            notices,
            failure: Some(FailureReport {
                reason,
                message: message.to_string(),
            }),
        }
    }
}

#[derive(Serialize)]
struct RepairParameters<'a> {
    person_id: &'a str,
    window: DateRange,
    reason: &'a AbsenceKind,
}

impl<R: Repository + 'static> Coordinator<R> {
    /// Reassigns the slots `request.person_id` holds inside the window.
    ///
    /// Gaps and remaining violations produce a `partial` run that still
    /// commits: removing an absent person never makes the roster worse.
    ///
    /// # Errors
    /// - [`EngineError::Input`] for an unknown person or invalid window
    /// - [`EngineError::Conflict`] when a run holds an intersecting range
    /// - [`EngineError::Repository`] when storage fails before the run starts
    pub async fn repair(&self, request: RepairRequest) -> EngineResult<RepairResponse> {
        let people = self.repo.load_people(&PeopleFilter::default()).await?;
        validate_repair(&request, &people, self.config.max_range_days)
            .map_err(EngineError::Input)?;
        validate_rules(&self.config.rules).map_err(EngineError::Input)?;
        let templates = self.repo.load_rotation_templates().await?;

        let parameters = RepairParameters {
            person_id: &request.person_id,
            window: request.window,
            reason: &request.reason,
        };
        let hash = parameter_hash(&parameters).map_err(RepositoryError::from)?;
        self.sweep().await;

        let run_id = RunId::new();
        let abandoned = RepairResponse::failed(
            run_id,
            FailureReason::Abandoned,
            "request was dropped before the run finished",
            Vec::new(),
        );
        let mut lifecycle =
            RunGuard::new(Arc::clone(&self.repo), &self.active, run_id, to_payload(&abandoned));
        let guard = match self
            .locks
            .acquire(
                request.window,
                run_id,
                self.config.lease_ttl(),
                std::time::Duration::from_millis(self.config.lock_wait_ms),
            )
            .await
        {
            Ok(guard) => guard,
            Err(blocking) => {
                lifecycle.release().await;
                return Err(EngineError::Conflict {
                    range: request.window,
                    holder: blocking.holder,
                });
            }
        };

        let mut run = GenerationRun::new(
            run_id,
            RunKind::Repair,
            request.tenant.as_str(),
            format!("repair:{run_id}"),
            hash,
            request.window,
        );
        if let Err(err) = self.start_run(&mut run).await {
            lifecycle.release().await;
            return Err(err.into());
        }
        lifecycle.attach(run);

        let token = lifecycle.token().clone();
        let span = repair_span(run_id, &request.person_id, request.window);
        let response = self
            .execute_repair(&request, run_id, people, templates, &token)
            .instrument(span.clone())
            .await;

        span.in_scope(|| {
            info!(
                status = %response.status,
                replacements = response.replacement_count,
                gaps = response.gaps.len(),
                "repair finished"
            )
        });
        lifecycle.finish(response.status, to_payload(&response)).await;
        drop(guard);
        Ok(response)
    }

    async fn execute_repair(
        &self,
        request: &RepairRequest,
        run_id: RunId,
        people: Vec<Person>,
        templates: Vec<RotationTemplate>,
        token: &CancellationToken,
    ) -> RepairResponse {
        let rules = &self.config.rules;
        let lookback = ProblemBuilder::lookback_days(rules);
        let checked = request.window.extend(lookback, lookback);
        let history = checked.extend(lookback, lookback);

        let loaded = match (
            self.repo.load_assignments(history).await,
            self.repo.load_absences(history).await,
            self.repo.load_blocks(request.window).await,
        ) {
            (Ok(a), Ok(b), Ok(c)) => (a, b, c),
            (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => {
                error!(run_id = %run_id, error = %err, "repository failure during repair");
                return RepairResponse::failed(
                    run_id,
                    FailureReason::Repository,
                    "storage unavailable; nothing was committed",
                    Vec::new(),
                );
            }
        };
        let (existing, mut absences, blocks) = loaded;
        absences.push(request.absence());

        let (affected, fixed): (Vec<Assignment>, Vec<Assignment>) =
            existing.into_iter().partition(|a| {
                a.person_id == request.person_id && request.window.contains(a.date)
            });
        info!(affected = affected.len(), "repair scope resolved");

        let demand: Vec<DemandSpec> = affected
            .iter()
            .map(|a| DemandSpec {
                block_id: a.block_id.clone(),
                template_id: a.template_id.clone(),
                role: a.role,
            })
            .collect();

        let instance = match ProblemBuilder::new(request.window, rules, &self.config.weights)
            .with_people(people.clone())
            .with_templates(templates.clone())
            .with_blocks(blocks)
            .with_absences(absences.clone())
            .with_fixed_assignments(fixed.clone())
            .with_demand(demand)
            .excluding(request.person_id.clone())
            .with_soft_consecutive(self.config.solver.consecutive_soft_threshold)
            .build()
        {
            Ok(instance) => Arc::new(instance),
            Err(err) => {
                error!(run_id = %run_id, error = %err, "repair instance construction failed");
                return RepairResponse::failed(
                    run_id,
                    FailureReason::SolverFault,
                    "internal solver error",
                    Vec::new(),
                );
            }
        };

        let budget = self.config.time_budget(None);
        let (result, overran) = self
            .solve_blocking(self.config.repair_algorithm, Arc::clone(&instance), budget, token)
            .await;
        let mut notices = Vec::new();
        if overran {
            notices.push(format!(
                "TimeoutExceeded: repair overran its {} ms budget and was cancelled",
                budget.as_millis()
            ));
        }
        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(detail) => {
                error!(run_id = %run_id, detail = %detail, "repair solver fault");
                return RepairResponse::failed(
                    run_id,
                    FailureReason::SolverFault,
                    "internal solver error",
                    notices,
                );
            }
        };
        if token.is_cancelled() && !overran {
            return RepairResponse::failed(
                run_id,
                FailureReason::Cancelled,
                "run was cancelled",
                notices,
            );
        }
        notices.extend(outcome.stats.notices.iter().cloned());

        let stripped = enforce_post_conditions(&instance, &mut outcome.picks, &fixed);
        for finding in &stripped {
            notices.push(format!("PostConditionStripped: {}", finding.message));
        }
        let (assignments, mut gaps) =
            instance.decode(&outcome.picks, &outcome.confidence, run_id);

        let mut combined = fixed;
        combined.extend(assignments.iter().cloned());
        for gap in &mut gaps {
            gap.requires_manual_review = true;
            gap.suggestions = rank_suggestions(
                gap,
                &people,
                &templates,
                &combined,
                &absences,
                rules,
                &request.person_id,
                self.config.suggestions_per_gap,
            );
        }

        let replacements: Vec<Replacement> = assignments
            .iter()
            .map(|a| Replacement {
                block_id: a.block_id.clone(),
                date: a.date,
                template_id: a.template_id.clone(),
                role: a.role,
                from: request.person_id.clone(),
                to: a.person_id.clone(),
            })
            .collect();

        let scope: HashSet<String> = std::iter::once(request.person_id.clone())
            .chain(replacements.iter().map(|r| r.to.clone()))
            .collect();
        let mut report = ComplianceEngine::new(&people, &templates)
            .with_person_scope(scope)
            .evaluate(&combined, &absences, rules, checked);
        report.warnings.extend(stripped);

        let (classified, _) = classify(&report, gaps.len());
        let status = if classified == RunStatus::Succeeded {
            RunStatus::Succeeded
        } else {
            RunStatus::Partial
        };

        let changes = AssignmentChangeSet {
            supersede: affected.iter().map(|a| a.id).collect(),
            insert: assignments,
        };
        if !changes.is_empty() {
            if let Err(err) = self.repo.commit_assignments(run_id, changes).await {
                error!(run_id = %run_id, error = %err, "repair commit failed");
                return RepairResponse::failed(
                    run_id,
                    FailureReason::Repository,
                    "storage unavailable; nothing was committed",
                    notices,
                );
            }
            info!(
                superseded = affected.len(),
                replaced = replacements.len(),
                "repair committed"
            );
        }

        RepairResponse {
            run_id,
            status,
            http_status: http_status(status),
            replacement_count: replacements.len(),
            replacements,
            gaps,
            violations: report.violations,
            warnings: report.warnings,
            conflicts: report.conflicts,
            notices,
            failure: None,
        }
    }
}

/// Ranks people who could take `gap` by conflict score, best first.
///
/// Only people of the right kind for the role are considered (residents
/// for primary slots, faculty otherwise); the absent person never is.
#[allow(clippy::too_many_arguments)]
pub(crate) fn rank_suggestions(
    gap: &CoverageGap,
    people: &[Person],
    templates: &[RotationTemplate],
    assignments: &[Assignment],
    absences: &[Absence],
    rules: &RuleSet,
    absent_id: &str,
    limit: usize,
) -> Vec<ReplacementSuggestion> {
    let Some(template) = templates.iter().find(|t| t.id == gap.template_id) else {
        return Vec::new();
    };
    let hours = if gap.role.is_backup() {
        0.0
    } else {
        template.hours_per_block
    };
    let cap = rules.window_hour_cap();
    let max_run = rules.max_consecutive_days();

    let mut ranked: Vec<ReplacementSuggestion> = people
        .iter()
        .filter(|p| p.active && p.id != absent_id)
        .filter(|p| match gap.role {
            AssignmentRole::Primary => p.is_resident(),
            AssignmentRole::Supervising | AssignmentRole::Backup => p.is_faculty(),
        })
        .map(|person| {
            let mine: Vec<&Assignment> = assignments
                .iter()
                .filter(|a| a.is_active() && a.person_id == person.id)
                .collect();
            let mut score = 0.0;
            let mut conflicts = Vec::new();

            if is_absent(absences, &person.id, gap.date) {
                score += ABSENT_WEIGHT;
                conflicts.push("absent".to_string());
            }
            if !person.qualifies_for(template, gap.role) {
                score += UNQUALIFIED_WEIGHT;
                conflicts.push("not qualified".to_string());
            }
            if mine
                .iter()
                .any(|a| a.block_id == gap.block_id && a.role.is_backup() == gap.role.is_backup())
            {
                score += BOOKED_WEIGHT;
                conflicts.push(format!("already booked in {}", gap.block_id));
            }

            let load = cap.map(|(days, limit)| {
                let from = gap.date - Days::days(i64::from(days.saturating_sub(1)));
                let recent: f64 = mine
                    .iter()
                    .filter(|a| a.is_duty() && a.date >= from && a.date <= gap.date)
                    .map(|a| a.hours)
                    .sum();
                (recent, limit)
            });
            let over_hours = load.is_some_and(|(recent, limit)| recent + hours > limit);
            let duty_days: BTreeSet<NaiveDate> = mine
                .iter()
                .filter(|a| a.is_duty())
                .map(|a| a.date)
                .collect();
            let over_run = !gap.role.is_backup()
                && max_run.is_some_and(|max| run_through(&duty_days, gap.date) > max as usize);
            if over_hours || over_run {
                score += LIMIT_WEIGHT;
                conflicts.push("would breach duty limits".to_string());
            }
            if let Some((recent, limit)) = load {
                if limit.is_finite() && limit > 0.0 {
                    score += WORKLOAD_WEIGHT * (recent / limit).min(1.0);
                }
            }

            ReplacementSuggestion {
                person_id: person.id.clone(),
                conflict_score: f64::clamp(score, 0.0, 1.0),
                conflicts,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.conflict_score
            .total_cmp(&b.conflict_score)
            .then_with(|| a.person_id.cmp(&b.person_id))
    });
    ranked.truncate(limit);
    ranked
}

/// Length of the duty run through `date` if it became a duty day.
fn run_through(duty_days: &BTreeSet<NaiveDate>, date: NaiveDate) -> usize {
    let mut run = 1;
    let mut d = date - Days::days(1);
    while duty_days.contains(&d) {
        run += 1;
        d -= Days::days(1);
    }
    let mut d = date + Days::days(1);
    while duty_days.contains(&d) {
        run += 1;
        d += Days::days(1);
    }
    run
}
