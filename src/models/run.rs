//! Generation run records.
//!
//! A run owns exclusive write access to its date range for its lifetime.
//! Lifecycle: `pending → running → {succeeded | partial | failed}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::DateRange;

/// Unique identifier of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Creates a new time-ordered run id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    /// Full generation over a date range.
    Generation,
    /// Absence repair over a window.
    Repair,
}

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Created, not started.
    Pending,
    /// Solving.
    Running,
    /// Full coverage, no blocking violations.
    Succeeded,
    /// No blocking violations, at least one coverage gap.
    Partial,
    /// Blocking violations, fault or cancellation.
    Failed,
}

impl RunStatus {
    /// Whether no further transitions are possible.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Partial | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Partial)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A persisted run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRun {
    /// Run id.
    pub id: RunId,
    /// Generation or repair.
    pub kind: RunKind,
    /// Requester / tenant scope of the idempotency key.
    pub tenant: String,
    /// Client-supplied idempotency key.
    pub idempotency_key: String,
    /// BLAKE3 hex digest of the canonical request parameters.
    pub parameter_hash: String,
    /// Owned date range.
    pub range: DateRange,
    /// Lifecycle state.
    pub status: RunStatus,
    /// Serialized response payload once terminal.
    pub result: Option<serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl GenerationRun {
    /// Creates a pending run.
    pub fn new(
        id: RunId,
        kind: RunKind,
        tenant: impl Into<String>,
        idempotency_key: impl Into<String>,
        parameter_hash: impl Into<String>,
        range: DateRange,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            tenant: tenant.into(),
            idempotency_key: idempotency_key.into(),
            parameter_hash: parameter_hash.into(),
            range,
            status: RunStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a transition. Returns `false` (and changes nothing) if illegal.
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    /// Moves to a terminal state and stores the payload.
    pub fn finish(&mut self, status: RunStatus, result: serde_json::Value) -> bool {
        if !status.is_terminal() || !self.transition(status) {
            return false;
        }
        self.result = Some(result);
        true
    }
}
