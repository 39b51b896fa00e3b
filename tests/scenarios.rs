//! End-to-end roster scenarios through the coordinator.
//!
//! Covers full coverage, supervision shortage, rest-day detection, range
//! conflicts, idempotency key misuse and absence repair.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;
use common::*;
use u_roster::models::{
    Absence, AbsenceKind, AssignmentRole, Block, DateRange, Person, RotationTemplate, RunStatus,
    Severity, TimeOfDay,
};
use u_roster::{EngineError, GenerationRequest, InMemoryRepository, RepairRequest};

#[tokio::test]
async fn test_full_coverage_with_enough_staff() {
    let range = four_weeks();
    let repo = Arc::new(program(range, 15, 3));
    let coordinator = coordinator(&repo);

    let response = coordinator
        .generate(GenerationRequest::new("clinic-a", "jan", range))
        .await
        .unwrap();

    assert_eq!(response.status, RunStatus::Succeeded);
    assert_eq!(response.http_status, 200);
    // 56 half-days x (2 residents + 1 supervisor)
    assert_eq!(response.total, 168);
    assert_eq!(response.assigned, 168);
    assert!(response.gaps.is_empty());
    assert!(response.failure.is_none());

    let schedule = coordinator.schedule(range).await.unwrap();
    assert_eq!(schedule.assignment_count(), response.total);

    let report = coordinator.validate(range).await.unwrap();
    assert!(!report.has_blocking_violations());
    assert!(report.conflicts.is_empty());
}

#[tokio::test]
async fn test_single_faculty_leaves_supervision_gaps() {
    let range = four_weeks();
    let repo = Arc::new(program(range, 15, 1));
    let coordinator = coordinator(&repo);

    let response = coordinator
        .generate(GenerationRequest::new("clinic-a", "jan", range))
        .await
        .unwrap();

    assert_eq!(response.status, RunStatus::Partial);
    assert_eq!(response.http_status, 207);
    assert!(response.assigned < response.total);
    assert!(response.violations.iter().all(|v| !v.is_blocking()));

    // The lone supervisor works six days and must rest on the seventh.
    let supervision_gaps: Vec<_> = response
        .gaps
        .iter()
        .filter(|g| g.role == AssignmentRole::Supervising)
        .collect();
    assert_eq!(supervision_gaps.len(), 8);
    let rest_days: BTreeSet<_> = supervision_gaps.iter().map(|g| g.date).collect();
    let expected: BTreeSet<_> = [date(1, 12), date(1, 19), date(1, 26), date(2, 2)]
        .into_iter()
        .collect();
    assert_eq!(rest_days, expected);

    // Residents are never left unsupervised.
    assert!(response
        .gaps
        .iter()
        .filter(|g| g.role == AssignmentRole::Primary)
        .all(|g| expected.contains(&g.date)));
    let report = coordinator.validate(range).await.unwrap();
    assert!(!report.has_blocking_violations());
}

#[tokio::test]
async fn test_nine_consecutive_days_breach_rest_rule() {
    let streak = DateRange::new(date(1, 6), date(1, 14));
    let assignments = streak
        .iter_days()
        .map(|d| assign(d, TimeOfDay::AM, "R01", AssignmentRole::Primary, "clinic"))
        .collect();
    let repo = Arc::new(
        InMemoryRepository::new()
            .with_people(residents(1))
            .with_templates(vec![RotationTemplate::new("clinic", "clinic")])
            .with_horizon(DateRange::new(date(1, 1), date(1, 31)))
            .with_assignments(assignments),
    );
    let coordinator = coordinator(&repo);

    let report = coordinator
        .validate(DateRange::new(date(1, 1), date(1, 31)))
        .await
        .unwrap();

    let rest = report
        .violations
        .iter()
        .find(|v| v.rule == "one_in_seven")
        .expect("rest-day violation");
    assert_eq!(rest.severity, Severity::High);
    assert_eq!(rest.person_id.as_deref(), Some("R01"));
    assert_eq!(rest.window, streak);
    assert_eq!(rest.measured, 9.0);

    let run = report
        .violations
        .iter()
        .find(|v| v.rule == "max_consecutive_duty")
        .expect("consecutive-duty violation");
    assert_eq!(run.severity, Severity::Medium);
    assert_eq!(run.window, streak);

    // Validation never mutates.
    assert_eq!(repo.run_count(), 0);
    assert_eq!(repo.assignment_history().len(), 9);
}

#[tokio::test]
async fn test_overlapping_run_conflicts() {
    let range = four_weeks();
    let (repo, coordinator) = gated_program(range);

    let first = {
        let c = Arc::clone(&coordinator);
        tokio::spawn(async move {
            c.generate(GenerationRequest::new("clinic-a", "month", range))
                .await
        })
    };
    repo.parked().await;
    let holder = coordinator.active_runs()[0];

    let overlapping = DateRange::new(date(1, 20), date(1, 26));
    let err = coordinator
        .generate(GenerationRequest::new("clinic-a", "week-3", overlapping))
        .await
        .unwrap_err();
    match err {
        EngineError::Conflict { range: r, holder: h } => {
            assert_eq!(r, overlapping);
            assert_eq!(h, holder);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(repo.inner.run_count(), 1);

    repo.open();
    let month = first.await.unwrap().unwrap();
    assert_eq!(month.run_id, holder);
    assert_ne!(month.status, RunStatus::Failed);

    // The rejected key is free again once the range is.
    let response = coordinator
        .generate(GenerationRequest::new("clinic-a", "week-3", overlapping))
        .await
        .unwrap();
    assert_ne!(response.status, RunStatus::Failed);
    assert!(coordinator.locks().is_empty());
}

#[tokio::test]
async fn test_disjoint_ranges_run_concurrently() {
    let range = four_weeks();
    let repo = Arc::new(program(range, 6, 2));
    let coordinator = Arc::new(coordinator(&repo));

    let first = DateRange::new(date(1, 6), date(1, 12));
    let second = DateRange::new(date(1, 27), date(2, 2));
    let a = {
        let c = Arc::clone(&coordinator);
        tokio::spawn(async move { c.generate(GenerationRequest::new("t", "a", first)).await })
    };
    let b = {
        let c = Arc::clone(&coordinator);
        tokio::spawn(async move { c.generate(GenerationRequest::new("t", "b", second)).await })
    };
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_ne!(a.status, RunStatus::Failed);
    assert_ne!(b.status, RunStatus::Failed);
    assert_eq!(repo.run_count(), 2);
    assert!(coordinator.locks().is_empty());
}

#[tokio::test]
async fn test_key_reuse_with_different_range_is_rejected() {
    let range = four_weeks();
    let repo = Arc::new(program(range, 15, 3));
    let coordinator = coordinator(&repo);

    let first = coordinator
        .generate(GenerationRequest::new("clinic-a", "jan", range))
        .await
        .unwrap();
    let stored = repo.assignment_history();

    let shorter = DateRange::new(range.start, range.end - Duration::days(1));
    let err = coordinator
        .generate(GenerationRequest::new("clinic-a", "jan", shorter))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IdempotencyMismatch { ref key } if key == "jan"));

    assert_eq!(repo.run_count(), 1);
    assert_eq!(repo.assignment_history(), stored);
    let run = coordinator.run(first.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_repair_absent_supervisor() {
    let window = DateRange::new(date(1, 6), date(1, 10));
    let mut people = residents(1);
    people.push(Person::faculty("F1", "surgery").with_credential("sedation"));
    people.extend((2..=5).map(|i| Person::faculty(format!("F{i}"), "surgery")));
    let templates = vec![
        RotationTemplate::new("clinic", "clinic")
            .with_supervision(4)
            .only(TimeOfDay::AM),
        RotationTemplate::new("procedures", "procedures")
            .with_supervision(4)
            .with_required_credential("sedation")
            .only(TimeOfDay::PM),
    ];

    let mut seeded = Vec::new();
    for day in 6..=9 {
        let block = date(1, day);
        seeded.push(assign(block, TimeOfDay::AM, "R01", AssignmentRole::Primary, "clinic"));
        seeded.push(assign(block, TimeOfDay::AM, "F1", AssignmentRole::Supervising, "clinic"));
    }
    let friday = date(1, 10);
    seeded.push(assign(friday, TimeOfDay::PM, "R01", AssignmentRole::Primary, "procedures"));
    seeded.push(assign(friday, TimeOfDay::PM, "F1", AssignmentRole::Supervising, "procedures"));
    // Outside the absence window.
    seeded.push(assign(date(1, 13), TimeOfDay::AM, "R01", AssignmentRole::Primary, "clinic"));
    seeded.push(assign(date(1, 13), TimeOfDay::AM, "F1", AssignmentRole::Supervising, "clinic"));

    let repo = Arc::new(
        InMemoryRepository::new()
            .with_people(people)
            .with_templates(templates)
            .with_horizon(DateRange::new(date(1, 1), date(1, 20)))
            .with_assignments(seeded.clone()),
    );
    let coordinator = coordinator(&repo);

    let response = coordinator
        .repair(RepairRequest::new("clinic-a", "F1", window, AbsenceKind::Sick))
        .await
        .unwrap();

    assert_eq!(response.status, RunStatus::Partial);
    assert_eq!(response.http_status, 207);
    assert_eq!(response.replacement_count, 4);
    assert!(response
        .replacements
        .iter()
        .all(|r| r.from == "F1" && r.to != "F1" && r.role == AssignmentRole::Supervising));

    assert_eq!(response.gaps.len(), 1);
    let gap = &response.gaps[0];
    assert_eq!(gap.block_id, Block::id_for(date(1, 10), TimeOfDay::PM));
    assert_eq!(gap.role, AssignmentRole::Supervising);
    assert!(gap.requires_manual_review);
    assert_eq!(gap.suggestions.len(), 3);
    assert!(gap
        .suggestions
        .windows(2)
        .all(|w| w[0].conflict_score <= w[1].conflict_score));
    assert!(gap
        .suggestions
        .iter()
        .all(|s| s.conflicts.contains(&"not qualified".to_string())));

    // Nothing outside the window changed.
    let active = repo.active_assignments();
    let outside = |a: &&u_roster::models::Assignment| !window.contains(a.date);
    let before: Vec<_> = seeded.iter().filter(outside).map(|a| a.id).collect();
    let after: Vec<_> = active.iter().filter(outside).map(|a| a.id).collect();
    assert_eq!(before, after);
    assert!(active
        .iter()
        .filter(|a| window.contains(a.date))
        .all(|a| a.person_id != "F1"));
    assert_no_double_booking(&active);

    let run = coordinator.run(response.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Partial);
}

#[tokio::test]
async fn test_repair_uncovered_backup_duty_is_reported() {
    let day = DateRange::new(date(1, 6), date(1, 6));
    let mut people = residents(1);
    people.extend(faculty(2));
    let repo = Arc::new(
        InMemoryRepository::new()
            .with_people(people)
            .with_templates(vec![
                RotationTemplate::new("clinic", "clinic").with_backup_per_block(1)
            ])
            .with_horizon(DateRange::new(date(1, 1), date(1, 20)))
            .with_absences(vec![Absence::new("F2", day, AbsenceKind::Vacation)])
            .with_assignments(vec![assign(
                date(1, 6),
                TimeOfDay::AM,
                "F1",
                AssignmentRole::Backup,
                "clinic",
            )]),
    );
    let coordinator = coordinator(&repo);

    let response = coordinator
        .repair(RepairRequest::new("clinic-a", "F1", day, AbsenceKind::Sick))
        .await
        .unwrap();

    assert_eq!(response.status, RunStatus::Partial);
    assert_eq!(response.replacement_count, 0);
    assert_eq!(response.replacement_count + response.gaps.len(), 1);
    let gap = &response.gaps[0];
    assert_eq!(gap.role, AssignmentRole::Backup);
    assert_eq!(gap.block_id, Block::id_for(date(1, 6), TimeOfDay::AM));
    assert!(gap.requires_manual_review);
    assert_eq!(gap.suggestions.len(), 1);
    assert_eq!(gap.suggestions[0].person_id, "F2");
    assert!(gap.suggestions[0].conflicts.contains(&"absent".to_string()));
    assert!(repo.active_assignments().is_empty());
}
