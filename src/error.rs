//! Error taxonomy.
//!
//! Errors returned from the engine are for requests that never reached a
//! terminal run: malformed input, lock or idempotency conflicts, and storage
//! failures. An infeasible or cancelled run is not an error; it completes
//! with status `failed` and a [`crate::coordinator::FailureReport`].

use thiserror::Error;

use crate::models::{DateRange, RunId};
use crate::validation::ValidationError;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced to callers of the coordinator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or contradictory request. Never reaches the solver.
    #[error("invalid input: {}", summarize(.0))]
    Input(Vec<ValidationError>),

    /// Another run holds a lease on an intersecting date range.
    #[error("date range {range} conflicts with in-flight run {holder}")]
    Conflict {
        /// Requested range.
        range: DateRange,
        /// Run holding the overlapping lease.
        holder: RunId,
    },

    /// Idempotency key reused with different parameters.
    #[error("idempotency key '{key}' was used with different parameters")]
    IdempotencyMismatch {
        /// The reused key.
        key: String,
    },

    /// Idempotency key reused while its run is still executing.
    #[error("run {run_id} for this idempotency key is still in progress")]
    InProgress {
        /// The executing run.
        run_id: RunId,
    },

    /// Unknown run or person.
    #[error("{0} not found")]
    NotFound(String),

    /// Storage failure before a run record could be written.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    /// Whether the request was rejected because of concurrent activity.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::IdempotencyMismatch { .. } | Self::InProgress { .. }
        )
    }
}

/// Failures inside a solver strategy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// A non-finite value appeared in a numeric step.
    #[error("numerical failure in {stage}: {detail}")]
    NumericalFailure {
        /// Solver stage that produced the value.
        stage: &'static str,
        /// Internal diagnostic (never shown to callers).
        detail: String,
    },
    /// The instance handed to the solver is inconsistent.
    #[error("malformed problem instance: {0}")]
    MalformedInstance(String),
}

/// Failures reported by a [`crate::repository::Repository`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    /// Backend could not be reached or refused the operation.
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    /// Atomic commit was rejected; nothing was written.
    #[error("commit rejected for run {run_id}: {reason}")]
    CommitRejected {
        /// Committing run.
        run_id: RunId,
        /// Backend reason.
        reason: String,
    },
    /// Record could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationErrorKind;

    #[test]
    fn test_input_error_lists_messages() {
        let err = EngineError::Input(vec![
            ValidationError::new(ValidationErrorKind::InvalidRange, "start after end"),
            ValidationError::new(ValidationErrorKind::InvalidBudget, "budget is zero"),
        ]);
        assert_eq!(
            err.to_string(),
            "invalid input: start after end; budget is zero"
        );
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_conflict_classification() {
        let err = EngineError::InProgress {
            run_id: RunId::new(),
        };
        assert!(err.is_conflict());
        let err = EngineError::IdempotencyMismatch { key: "k".into() };
        assert!(err.is_conflict());
    }

    #[test]
    fn test_repository_error_converts() {
        let err: EngineError = RepositoryError::Unavailable("down".into()).into();
        assert_eq!(err.to_string(), "repository unavailable: down");
    }
}
