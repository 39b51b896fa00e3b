//! Executing runs and their lifecycle guard.
//!
//! A [`RunGuard`] owns everything a run claims besides its range lease:
//! the cancellation token in [`ActiveRuns`], the idempotency reservation
//! and the persisted run record. Dropping an armed guard (the caller went
//! away, an outer timeout fired or the task was aborted) cancels the solve
//! and records a terminal state on a background task, so retries with the
//! same key never wait on a run that no longer exists.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

use super::{CancellationToken, IdempotencyRegistry};
use crate::models::{GenerationRun, RunId, RunStatus};
use crate::repository::Repository;

/// Cancellation tokens of executing runs. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ActiveRuns {
    tokens: Arc<Mutex<HashMap<RunId, CancellationToken>>>,
}

impl ActiveRuns {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `run_id` and returns its token.
    pub fn register(&self, run_id: RunId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(run_id, token.clone());
        token
    }

    /// Cancels `run_id`; `false` if it is not executing.
    pub fn cancel(&self, run_id: RunId) -> bool {
        match self.tokens.lock().get(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether `run_id` is executing.
    pub fn contains(&self, run_id: RunId) -> bool {
        self.tokens.lock().contains_key(&run_id)
    }

    /// Executing run ids, sorted.
    pub fn ids(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.tokens.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    fn remove(&self, run_id: RunId) {
        self.tokens.lock().remove(&run_id);
    }
}

struct KeyClaim {
    registry: IdempotencyRegistry,
    tenant: String,
    key: String,
}

/// Lifecycle of one executing run.
///
/// Consume it with [`RunGuard::finish`] or [`RunGuard::release`]; dropping
/// it armed records `abandoned` as a failed result.
pub struct RunGuard<R: Repository + 'static> {
    repo: Arc<R>,
    active: ActiveRuns,
    run_id: RunId,
    token: CancellationToken,
    claim: Option<KeyClaim>,
    run: Option<GenerationRun>,
    outcome: Option<(RunStatus, serde_json::Value)>,
    abandoned: serde_json::Value,
    armed: bool,
}

impl<R: Repository + 'static> RunGuard<R> {
    /// Registers `run_id` as executing.
    ///
    /// `abandoned` is the payload stored if the guard drops unfinished.
    pub fn new(
        repo: Arc<R>,
        active: &ActiveRuns,
        run_id: RunId,
        abandoned: serde_json::Value,
    ) -> Self {
        let token = active.register(run_id);
        Self {
            repo,
            active: active.clone(),
            run_id,
            token,
            claim: None,
            run: None,
            outcome: None,
            abandoned,
            armed: true,
        }
    }

    /// Takes over the reservation of `(tenant, key)` made for this run.
    pub fn with_key(
        mut self,
        registry: &IdempotencyRegistry,
        tenant: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.claim = Some(KeyClaim {
            registry: registry.clone(),
            tenant: tenant.into(),
            key: key.into(),
        });
        self
    }

    /// Run id.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Cancellation token observed by the solver.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Attaches the persisted `Running` record.
    pub fn attach(&mut self, run: GenerationRun) {
        self.run = Some(run);
    }

    /// Records the terminal state and stores the response for the key.
    pub async fn finish(mut self, status: RunStatus, payload: serde_json::Value) {
        self.outcome = Some((status, payload.clone()));
        if let Some(mut run) = self.run.clone() {
            run.finish(status, payload.clone());
            if let Err(err) = self.repo.save_run(&run).await {
                error!(run_id = %run.id, error = %err, "failed to record terminal run state");
            }
        }
        self.active.remove(self.run_id);
        if let Some(claim) = &self.claim {
            claim
                .registry
                .complete(&claim.tenant, &claim.key, payload)
                .await;
        }
        self.armed = false;
    }

    /// Gives the key back for a request rejected before its run started.
    pub async fn release(mut self) {
        self.active.remove(self.run_id);
        if let Some(claim) = &self.claim {
            claim
                .registry
                .abandon(&claim.tenant, &claim.key, self.run_id)
                .await;
        }
        self.armed = false;
    }
}

impl<R: Repository + 'static> Drop for RunGuard<R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.token.cancel();

        let run_id = self.run_id;
        let active = self.active.clone();
        let repo = Arc::clone(&self.repo);
        let claim = self.claim.take();
        let run = self.run.take();
        let (status, payload) = self
            .outcome
            .take()
            .unwrap_or_else(|| (RunStatus::Failed, self.abandoned.clone()));

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            active.remove(run_id);
            warn!(run_id = %run_id, "run dropped outside a runtime; the sweep will close it");
            return;
        };
        warn!(run_id = %run_id, status = %status, "run dropped before completion");
        handle.spawn(async move {
            match run {
                Some(mut run) => {
                    run.finish(status, payload.clone());
                    if let Err(err) = repo.save_run(&run).await {
                        error!(run_id = %run_id, error = %err, "failed to record abandoned run");
                    }
                    if let Some(claim) = claim {
                        claim
                            .registry
                            .complete(&claim.tenant, &claim.key, payload)
                            .await;
                    }
                }
                None => {
                    if let Some(claim) = claim {
                        claim
                            .registry
                            .abandon(&claim.tenant, &claim.key, run_id)
                            .await;
                    }
                }
            }
            // Removed last so a concurrent sweep never races the record.
            active.remove(run_id);
        });
    }
}
