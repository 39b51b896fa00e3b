//! Idempotency registry.
//!
//! Maps `(tenant, key)` to the parameter hash, run and stored response of
//! the first request that used the key:
//!
//! | Registry state | Same hash | Different hash |
//! |----------------|-----------|----------------|
//! | absent | reserve, run | reserve, run |
//! | running | [`Reservation::InProgress`] | [`Reservation::Mismatch`] |
//! | completed | [`Reservation::Replay`] | [`Reservation::Mismatch`] |
//!
//! Misses fall back to [`Repository::load_run`] so restarts and evictions
//! keep their guarantees within the TTL.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RepositoryError;
use crate::models::RunId;
use crate::repository::Repository;

/// Outcome of [`IdempotencyRegistry::reserve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// Key reserved for the caller's run.
    Fresh,
    /// Key already completed with the same parameters.
    Replay(serde_json::Value),
    /// Key is held by a running run with the same parameters.
    InProgress(RunId),
    /// Key was used with different parameters.
    Mismatch,
}

#[derive(Debug, Clone)]
struct Entry {
    parameter_hash: String,
    run_id: RunId,
    response: Option<serde_json::Value>,
    touched: Instant,
}

/// In-process idempotency table. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct IdempotencyRegistry {
    entries: Arc<Mutex<HashMap<(String, String), Entry>>>,
    ttl: Duration,
}

impl IdempotencyRegistry {
    /// Creates a registry whose completed entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Atomically reserves `(tenant, key)` for `run_id` or reports why not.
    ///
    /// # Errors
    /// Repository failures from the fallback lookup.
    pub async fn reserve<R: Repository + ?Sized>(
        &self,
        repo: &R,
        tenant: &str,
        key: &str,
        parameter_hash: &str,
        run_id: RunId,
    ) -> Result<Reservation, RepositoryError> {
        let mut entries = self.entries.lock().await;
        let slot = (tenant.to_string(), key.to_string());

        if let Some(entry) = entries.get(&slot) {
            let live = entry.response.is_none() || entry.touched.elapsed() < self.ttl;
            if live {
                return Ok(Self::classify(
                    &entry.parameter_hash,
                    entry.run_id,
                    entry.response.clone(),
                    parameter_hash,
                ));
            }
        }

        // Registry miss: consult persisted runs.
        if let Some(run) = repo.load_run(tenant, key).await? {
            let age = (Utc::now() - run.created_at).to_std().unwrap_or(Duration::ZERO);
            if age < self.ttl {
                let response = if run.status.is_terminal() {
                    Some(run.result.clone().unwrap_or(serde_json::Value::Null))
                } else {
                    None
                };
                let reservation =
                    Self::classify(&run.parameter_hash, run.id, response.clone(), parameter_hash);
                entries.insert(
                    slot,
                    Entry {
                        parameter_hash: run.parameter_hash,
                        run_id: run.id,
                        response,
                        touched: Instant::now(),
                    },
                );
                debug!(tenant, key, run_id = %run.id, "idempotency entry restored from repository");
                return Ok(reservation);
            }
        }

        entries.insert(
            slot,
            Entry {
                parameter_hash: parameter_hash.to_string(),
                run_id,
                response: None,
                touched: Instant::now(),
            },
        );
        Ok(Reservation::Fresh)
    }

    fn classify(
        stored_hash: &str,
        run_id: RunId,
        response: Option<serde_json::Value>,
        parameter_hash: &str,
    ) -> Reservation {
        if stored_hash != parameter_hash {
            return Reservation::Mismatch;
        }
        match response {
            Some(response) => Reservation::Replay(response),
            None => Reservation::InProgress(run_id),
        }
    }

    /// Stores the terminal response for a reserved key.
    pub async fn complete(&self, tenant: &str, key: &str, response: serde_json::Value) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&(tenant.to_string(), key.to_string())) {
            entry.response = Some(response);
            entry.touched = Instant::now();
        }
    }

    /// Releases a reservation whose request was rejected before running.
    pub async fn abandon(&self, tenant: &str, key: &str, run_id: RunId) {
        let mut entries = self.entries.lock().await;
        let slot = (tenant.to_string(), key.to_string());
        if entries.get(&slot).is_some_and(|e| e.run_id == run_id && e.response.is_none()) {
            entries.remove(&slot);
        }
    }

    /// Drops completed entries older than the TTL. Running entries stay.
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.response.is_none() || e.touched.elapsed() < ttl);
        before - entries.len()
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Canonical parameter hash: BLAKE3 over the canonical JSON encoding.
///
/// `serde_json` maps are ordered, so field and key order do not matter as
/// long as collections inside `params` are sorted by the caller.
pub fn parameter_hash<T: Serialize>(params: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(params)?;
    let bytes = serde_json::to_vec(&value)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, GenerationRun, RunKind, RunStatus};
    use crate::repository::InMemoryRepository;
    use chrono::NaiveDate;
    use serde_json::json;

    fn registry() -> IdempotencyRegistry {
        IdempotencyRegistry::new(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_reserve_then_replay() {
        let repo = InMemoryRepository::new();
        let reg = registry();
        let run = RunId::new();
        assert_eq!(reg.reserve(&repo, "t", "k", "h1", run).await.unwrap(), Reservation::Fresh);
        assert_eq!(
            reg.reserve(&repo, "t", "k", "h1", RunId::new()).await.unwrap(),
            Reservation::InProgress(run)
        );
        reg.complete("t", "k", json!({"status": "succeeded"})).await;
        assert_eq!(
            reg.reserve(&repo, "t", "k", "h1", RunId::new()).await.unwrap(),
            Reservation::Replay(json!({"status": "succeeded"}))
        );
        assert_eq!(
            reg.reserve(&repo, "t", "k", "h2", RunId::new()).await.unwrap(),
            Reservation::Mismatch
        );
        // Keys are per tenant.
        assert_eq!(
            reg.reserve(&repo, "other", "k", "h2", RunId::new()).await.unwrap(),
            Reservation::Fresh
        );
    }

    #[tokio::test]
    async fn test_abandon_frees_key() {
        let repo = InMemoryRepository::new();
        let reg = registry();
        let run = RunId::new();
        reg.reserve(&repo, "t", "k", "h", run).await.unwrap();
        reg.abandon("t", "k", RunId::new()).await;
        assert_eq!(reg.len().await, 1);
        reg.abandon("t", "k", run).await;
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_eviction_keeps_running_entries() {
        let repo = InMemoryRepository::new();
        let reg = IdempotencyRegistry::new(Duration::ZERO);
        reg.reserve(&repo, "t", "running", "h", RunId::new()).await.unwrap();
        reg.reserve(&repo, "t", "done", "h", RunId::new()).await.unwrap();
        reg.complete("t", "done", json!(1)).await;
        assert_eq!(reg.evict_expired().await, 1);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_repository() {
        let repo = InMemoryRepository::new();
        let d = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut run = GenerationRun::new(
            RunId::new(),
            RunKind::Generation,
            "t",
            "k",
            "h",
            DateRange::single(d),
        );
        run.transition(RunStatus::Running);
        run.finish(RunStatus::Succeeded, json!({"cached": true}));
        repo.save_run(&run).await.unwrap();

        let reg = registry();
        assert_eq!(
            reg.reserve(&repo, "t", "k", "h", RunId::new()).await.unwrap(),
            Reservation::Replay(json!({"cached": true}))
        );
        assert_eq!(
            reg.reserve(&repo, "t", "k", "other", RunId::new()).await.unwrap(),
            Reservation::Mismatch
        );
    }

    #[test]
    fn test_parameter_hash_canonical() {
        let a = parameter_hash(&json!({"a": 1, "b": [1, 2]})).unwrap();
        let b = parameter_hash(&json!({"b": [1, 2], "a": 1})).unwrap();
        let c = parameter_hash(&json!({"b": [2, 1], "a": 1})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
