//! Cross-cutting guarantees: idempotent replays, strategy monotonicity,
//! booking integrity, post-run compliance and commit atomicity.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use u_roster::control::CancellationToken;
use u_roster::models::{Block, RuleSet, RunStatus};
use u_roster::solver::{self, evaluate, Algorithm, ProblemBuilder, SolveContext};
use u_roster::{CostWeights, EngineError, FailureReason, GenerationRequest, SolverConfig};

#[tokio::test]
async fn test_replay_returns_identical_payload() {
    let range = four_weeks();
    let repo = Arc::new(program(range, 9, 2));
    let coordinator = coordinator(&repo);
    let request = GenerationRequest::new("clinic-a", "jan", range)
        .with_algorithm(Algorithm::Hybrid)
        .with_time_budget(2_000);

    let first = coordinator.generate(request.clone()).await.unwrap();
    let history = repo.assignment_history();
    let second = coordinator.generate(request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(repo.run_count(), 1);
    assert_eq!(repo.assignment_history(), history);
}

#[tokio::test]
async fn test_every_strategy_commits_a_valid_roster() {
    let range = four_weeks();
    for algorithm in Algorithm::ALL {
        let repo = Arc::new(program(range, 12, 3));
        let coordinator = coordinator(&repo);
        let response = coordinator
            .generate(
                GenerationRequest::new("clinic-a", algorithm.name(), range)
                    .with_algorithm(algorithm)
                    .with_time_budget(3_000),
            )
            .await
            .unwrap();

        assert_ne!(response.status, RunStatus::Failed, "{algorithm}");
        assert_no_double_booking(&repo.active_assignments());
        let report = coordinator.validate(range).await.unwrap();
        assert!(report.conflicts.is_empty(), "{algorithm}");
        if response.status == RunStatus::Succeeded {
            assert!(!report.has_blocking_violations(), "{algorithm}");
        }
    }
}

#[test]
fn test_hybrid_never_worse_than_its_seeds() {
    let range = four_weeks();
    let rules = RuleSet::standard();
    let weights = CostWeights::default();
    let mut people = residents(9);
    people.extend(faculty(2));
    let instance = ProblemBuilder::new(range, &rules, &weights)
        .with_people(people)
        .with_templates(vec![clinic()])
        .with_blocks(Block::horizon(range))
        .build()
        .unwrap();

    let value = |algorithm| {
        let ctx = SolveContext::new(
            Duration::from_secs(10),
            CancellationToken::new(),
            SolverConfig::default(),
        );
        let outcome = solver::solve(algorithm, &instance, &ctx).unwrap();
        evaluate(&instance, &outcome.picks).value
    };
    let greedy = value(Algorithm::Greedy);
    let relaxation = value(Algorithm::Relaxation);
    let hybrid = value(Algorithm::Hybrid);
    assert!(hybrid + 1e-9 >= greedy, "hybrid {hybrid} < greedy {greedy}");
    assert!(hybrid + 1e-9 >= relaxation, "hybrid {hybrid} < relaxation {relaxation}");
}

#[tokio::test]
async fn test_rejected_commit_leaves_store_untouched() {
    let range = four_weeks();
    let repo = Arc::new(program(range, 15, 3));
    repo.set_reject_commits(true);
    let coordinator = coordinator(&repo);

    let response = coordinator
        .generate(GenerationRequest::new("clinic-a", "jan", range))
        .await
        .unwrap();

    assert_eq!(response.status, RunStatus::Failed);
    assert_eq!(response.http_status, 422);
    let failure = response.failure.unwrap();
    assert_eq!(failure.reason, FailureReason::Repository);
    assert!(repo.assignment_history().is_empty());
    assert_eq!(repo.runs()[0].status, RunStatus::Failed);
    assert!(coordinator.locks().is_empty());
}

#[tokio::test]
async fn test_unavailable_store_creates_no_run() {
    let range = four_weeks();
    let repo = Arc::new(program(range, 3, 1));
    repo.set_unavailable(true);
    let coordinator = coordinator(&repo);

    let err = coordinator
        .generate(GenerationRequest::new("clinic-a", "jan", range))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Repository(_)));

    repo.set_unavailable(false);
    assert_eq!(repo.run_count(), 0);
    assert!(coordinator.locks().is_empty());
}

#[tokio::test]
async fn test_regeneration_supersedes_previous_roster() {
    let range = four_weeks();
    let repo = Arc::new(program(range, 15, 3));
    let coordinator = coordinator(&repo);

    let first = coordinator
        .generate(GenerationRequest::new("clinic-a", "v1", range))
        .await
        .unwrap();
    let second = coordinator
        .generate(GenerationRequest::new("clinic-a", "v2", range))
        .await
        .unwrap();

    assert_eq!(second.status, RunStatus::Succeeded);
    let active = repo.active_assignments();
    assert_eq!(active.len(), second.total);
    assert!(active.iter().all(|a| a.run_id == Some(second.run_id)));
    let history = repo.assignment_history();
    assert_eq!(history.len(), first.total + second.total);
    assert!(history
        .iter()
        .filter(|a| a.run_id == Some(first.run_id))
        .all(|a| a.superseded_by == Some(second.run_id)));
}
