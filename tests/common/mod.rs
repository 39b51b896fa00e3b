//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Notify, Semaphore};
use u_roster::models::{
    Absence, Assignment, AssignmentChangeSet, AssignmentRole, Block, DateRange, GenerationRun,
    PeopleFilter, Person, PgyLevel, RotationTemplate, RunId, TimeOfDay,
};
use u_roster::repository::RepositoryResult;
use u_roster::{Coordinator, EngineConfig, InMemoryRepository, Repository};

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

/// Four weeks starting Monday 2025-01-06.
pub fn four_weeks() -> DateRange {
    DateRange::new(date(1, 6), date(2, 2))
}

/// `R01..` residents cycling PGY-1/2/3.
pub fn residents(count: usize) -> Vec<Person> {
    (0..count)
        .map(|i| Person::resident(format!("R{:02}", i + 1), PgyLevel::ALL[i % 3]))
        .collect()
}

/// `F1..` faculty.
pub fn faculty(count: usize) -> Vec<Person> {
    (0..count)
        .map(|i| Person::faculty(format!("F{}", i + 1), "internal medicine"))
        .collect()
}

/// Supervised clinic: two residents and one faculty per half-day.
pub fn clinic() -> RotationTemplate {
    RotationTemplate::new("clinic", "clinic")
        .with_supervision(4)
        .with_residents_per_block(2)
}

/// Repository holding a clinic program over `range`.
pub fn program(
    range: DateRange,
    resident_count: usize,
    faculty_count: usize,
) -> InMemoryRepository {
    let mut people = residents(resident_count);
    people.extend(faculty(faculty_count));
    InMemoryRepository::new()
        .with_people(people)
        .with_templates(vec![clinic()])
        .with_horizon(range)
}

pub fn coordinator(repo: &Arc<InMemoryRepository>) -> Coordinator<InMemoryRepository> {
    Coordinator::new(Arc::clone(repo), EngineConfig::default())
}

pub fn block(date: NaiveDate, time_of_day: TimeOfDay) -> Block {
    Block::new(date, time_of_day, 0)
}

pub fn assign(
    date: NaiveDate,
    time_of_day: TimeOfDay,
    person: &str,
    role: AssignmentRole,
    template: &str,
) -> Assignment {
    Assignment::new(&block(date, time_of_day), person, role, template, 6.0)
}

/// Panics if a person holds two active duties (or two backups) in a block.
pub fn assert_no_double_booking(assignments: &[Assignment]) {
    let mut seen = HashSet::new();
    for a in assignments.iter().filter(|a| a.is_active()) {
        assert!(
            seen.insert((a.person_id.clone(), a.block_id.clone(), a.role.is_backup())),
            "{} double-booked in {}",
            a.person_id,
            a.block_id
        );
    }
}

/// Wraps a repository and parks every `load_assignments` call until
/// [`GatedRepository::open`]. Runs reach that call after taking their
/// range lease and recording themselves as running.
pub struct GatedRepository {
    pub inner: InMemoryRepository,
    gate: Semaphore,
    entered: Notify,
}

impl GatedRepository {
    pub fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    /// Resolves once a caller is parked at the gate.
    pub async fn parked(&self) {
        self.entered.notified().await;
    }

    /// Lets every parked and future call through.
    pub fn open(&self) {
        self.gate.close();
    }
}

#[async_trait]
impl Repository for GatedRepository {
    async fn load_people(&self, filter: &PeopleFilter) -> RepositoryResult<Vec<Person>> {
        self.inner.load_people(filter).await
    }

    async fn load_blocks(&self, range: DateRange) -> RepositoryResult<Vec<Block>> {
        self.inner.load_blocks(range).await
    }

    async fn load_rotation_templates(&self) -> RepositoryResult<Vec<RotationTemplate>> {
        self.inner.load_rotation_templates().await
    }

    async fn load_absences(&self, range: DateRange) -> RepositoryResult<Vec<Absence>> {
        self.inner.load_absences(range).await
    }

    async fn load_assignments(&self, range: DateRange) -> RepositoryResult<Vec<Assignment>> {
        self.entered.notify_one();
        // A closed semaphore means the gate is open.
        let _ = self.gate.acquire().await;
        self.inner.load_assignments(range).await
    }

    async fn commit_assignments(
        &self,
        run_id: RunId,
        changes: AssignmentChangeSet,
    ) -> RepositoryResult<()> {
        self.inner.commit_assignments(run_id, changes).await
    }

    async fn load_run(&self, tenant: &str, key: &str) -> RepositoryResult<Option<GenerationRun>> {
        self.inner.load_run(tenant, key).await
    }

    async fn load_run_by_id(&self, run_id: RunId) -> RepositoryResult<Option<GenerationRun>> {
        self.inner.load_run_by_id(run_id).await
    }

    async fn save_run(&self, run: &GenerationRun) -> RepositoryResult<()> {
        self.inner.save_run(run).await
    }

    async fn load_unfinished_runs(&self) -> RepositoryResult<Vec<GenerationRun>> {
        self.inner.load_unfinished_runs().await
    }
}

/// A clinic program behind a closed gate, with its coordinator.
pub fn gated_program(
    range: DateRange,
) -> (Arc<GatedRepository>, Arc<Coordinator<GatedRepository>>) {
    let repo = Arc::new(GatedRepository::new(program(range, 6, 2)));
    let coordinator = Arc::new(Coordinator::new(Arc::clone(&repo), EngineConfig::default()));
    (repo, coordinator)
}
