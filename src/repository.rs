//! Storage boundary.
//!
//! The engine reads reference data and writes assignments and run records
//! only through [`Repository`]. [`InMemoryRepository`] backs tests and
//! embedded use.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::RepositoryError;
use crate::models::{
    Absence, Assignment, AssignmentChangeSet, Block, DateRange, GenerationRun, PeopleFilter, Person,
    RotationTemplate, RunId,
};

/// Result alias for repository calls.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistence consumed by the coordinator and repair engine.
///
/// `commit_assignments` must be atomic: either every supersede and insert
/// of the change set is applied or none is.
#[async_trait]
pub trait Repository: Send + Sync {
    /// People matching `filter`.
    async fn load_people(&self, filter: &PeopleFilter) -> RepositoryResult<Vec<Person>>;

    /// Blocks dated within `range`.
    async fn load_blocks(&self, range: DateRange) -> RepositoryResult<Vec<Block>>;

    /// All rotation templates.
    async fn load_rotation_templates(&self) -> RepositoryResult<Vec<RotationTemplate>>;

    /// Absences intersecting `range`.
    async fn load_absences(&self, range: DateRange) -> RepositoryResult<Vec<Absence>>;

    /// Active assignments dated within `range`.
    async fn load_assignments(&self, range: DateRange) -> RepositoryResult<Vec<Assignment>>;

    /// Atomically supersedes and inserts assignments on behalf of `run_id`.
    async fn commit_assignments(
        &self,
        run_id: RunId,
        changes: AssignmentChangeSet,
    ) -> RepositoryResult<()>;

    /// Latest run recorded for `(tenant, idempotency_key)`.
    async fn load_run(&self, tenant: &str, key: &str) -> RepositoryResult<Option<GenerationRun>>;

    /// Run by id.
    async fn load_run_by_id(&self, run_id: RunId) -> RepositoryResult<Option<GenerationRun>>;

    /// Inserts or replaces a run record.
    async fn save_run(&self, run: &GenerationRun) -> RepositoryResult<()>;

    /// Runs not yet in a terminal state, oldest first.
    async fn load_unfinished_runs(&self) -> RepositoryResult<Vec<GenerationRun>>;
}

#[derive(Debug, Default)]
struct Store {
    people: Vec<Person>,
    blocks: Vec<Block>,
    templates: Vec<RotationTemplate>,
    absences: Vec<Absence>,
    assignments: Vec<Assignment>,
    runs: HashMap<RunId, GenerationRun>,
    keys: HashMap<(String, String), RunId>,
    unavailable: bool,
    reject_commits: bool,
}

/// Repository held in memory behind a `parking_lot` lock.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds people.
    pub fn with_people(self, people: Vec<Person>) -> Self {
        self.store.write().people = people;
        self
    }

    /// Seeds blocks.
    pub fn with_blocks(self, blocks: Vec<Block>) -> Self {
        self.store.write().blocks = blocks;
        self
    }

    /// Seeds the AM/PM blocks of every date in `range`.
    pub fn with_horizon(self, range: DateRange) -> Self {
        self.with_blocks(Block::horizon(range))
    }

    /// Seeds rotation templates.
    pub fn with_templates(self, templates: Vec<RotationTemplate>) -> Self {
        self.store.write().templates = templates;
        self
    }

    /// Seeds absences.
    pub fn with_absences(self, absences: Vec<Absence>) -> Self {
        self.store.write().absences = absences;
        self
    }

    /// Seeds assignments.
    pub fn with_assignments(self, assignments: Vec<Assignment>) -> Self {
        self.store.write().assignments = assignments;
        self
    }

    /// Records a new absence.
    pub fn add_absence(&self, absence: Absence) {
        self.store.write().absences.push(absence);
    }

    /// Makes every call fail with [`RepositoryError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.store.write().unavailable = unavailable;
    }

    /// Makes commits fail with [`RepositoryError::CommitRejected`].
    pub fn set_reject_commits(&self, reject: bool) {
        self.store.write().reject_commits = reject;
    }

    /// Number of run records.
    pub fn run_count(&self) -> usize {
        self.store.read().runs.len()
    }

    /// Every run record, oldest first.
    pub fn runs(&self) -> Vec<GenerationRun> {
        let mut runs: Vec<GenerationRun> = self.store.read().runs.values().cloned().collect();
        runs.sort_by_key(|r| r.id);
        runs
    }

    /// Every assignment ever stored, superseded ones included.
    pub fn assignment_history(&self) -> Vec<Assignment> {
        self.store.read().assignments.clone()
    }

    /// Active assignments.
    pub fn active_assignments(&self) -> Vec<Assignment> {
        self.store
            .read()
            .assignments
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    fn check(&self) -> RepositoryResult<()> {
        if self.store.read().unavailable {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn load_people(&self, filter: &PeopleFilter) -> RepositoryResult<Vec<Person>> {
        self.check()?;
        Ok(self
            .store
            .read()
            .people
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn load_blocks(&self, range: DateRange) -> RepositoryResult<Vec<Block>> {
        self.check()?;
        Ok(self
            .store
            .read()
            .blocks
            .iter()
            .filter(|b| range.contains(b.date))
            .cloned()
            .collect())
    }

    async fn load_rotation_templates(&self) -> RepositoryResult<Vec<RotationTemplate>> {
        self.check()?;
        Ok(self.store.read().templates.clone())
    }

    async fn load_absences(&self, range: DateRange) -> RepositoryResult<Vec<Absence>> {
        self.check()?;
        Ok(self
            .store
            .read()
            .absences
            .iter()
            .filter(|a| a.range.overlaps(&range))
            .cloned()
            .collect())
    }

    async fn load_assignments(&self, range: DateRange) -> RepositoryResult<Vec<Assignment>> {
        self.check()?;
        Ok(self
            .store
            .read()
            .assignments
            .iter()
            .filter(|a| a.is_active() && range.contains(a.date))
            .cloned()
            .collect())
    }

    async fn commit_assignments(
        &self,
        run_id: RunId,
        changes: AssignmentChangeSet,
    ) -> RepositoryResult<()> {
        self.check()?;
        let mut store = self.store.write();
        if store.reject_commits {
            return Err(RepositoryError::CommitRejected {
                run_id,
                reason: "commits disabled".to_string(),
            });
        }

        let mut targets = Vec::with_capacity(changes.supersede.len());
        for id in &changes.supersede {
            let position = store
                .assignments
                .iter()
                .position(|a| a.id == *id && a.is_active())
                .ok_or_else(|| RepositoryError::CommitRejected {
                    run_id,
                    reason: format!("assignment {id} is missing or already superseded"),
                })?;
            targets.push(position);
        }

        for position in targets {
            store.assignments[position].superseded_by = Some(run_id);
        }
        store.assignments.extend(changes.insert);
        Ok(())
    }

    async fn load_run(&self, tenant: &str, key: &str) -> RepositoryResult<Option<GenerationRun>> {
        self.check()?;
        let store = self.store.read();
        Ok(store
            .keys
            .get(&(tenant.to_string(), key.to_string()))
            .and_then(|id| store.runs.get(id))
            .cloned())
    }

    async fn load_run_by_id(&self, run_id: RunId) -> RepositoryResult<Option<GenerationRun>> {
        self.check()?;
        Ok(self.store.read().runs.get(&run_id).cloned())
    }

    async fn save_run(&self, run: &GenerationRun) -> RepositoryResult<()> {
        self.check()?;
        let mut store = self.store.write();
        store
            .keys
            .insert((run.tenant.clone(), run.idempotency_key.clone()), run.id);
        store.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn load_unfinished_runs(&self) -> RepositoryResult<Vec<GenerationRun>> {
        self.check()?;
        let mut runs: Vec<GenerationRun> = self
            .store
            .read()
            .runs
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.id);
        Ok(runs)
    }
}
