//! Assignment model.
//!
//! An assignment binds a person to a block with a role and an activity.
//! Assignments are created by generation runs, superseded (never deleted)
//! by repair runs so the audit trail survives.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Block, RunId, TimeOfDay};

/// Unique identifier of an assignment record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentId(pub Uuid);

impl AssignmentId {
    /// Creates a new time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a person plays in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssignmentRole {
    /// Resident doing the activity.
    Primary,
    /// Faculty supervising residents.
    Supervising,
    /// Faculty on backup; may overlap one non-backup assignment.
    Backup,
}

impl AssignmentRole {
    /// Whether the role is a backup role.
    #[inline]
    pub fn is_backup(&self) -> bool {
        matches!(self, Self::Backup)
    }
}

impl fmt::Display for AssignmentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Primary => "primary",
            Self::Supervising => "supervising",
            Self::Backup => "backup",
        };
        f.write_str(s)
    }
}

/// A person-block-role-activity binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Record id.
    pub id: AssignmentId,
    /// Assigned block.
    pub block_id: String,
    /// Block date (denormalized for rule evaluation).
    pub date: NaiveDate,
    /// Block period (denormalized).
    pub time_of_day: TimeOfDay,
    /// Assigned person.
    pub person_id: String,
    /// Role in the block.
    pub role: AssignmentRole,
    /// Activity.
    pub template_id: String,
    /// Duty hours credited (0 for backup).
    pub hours: f64,
    /// Solver confidence in [0, 1].
    pub confidence: f64,
    /// Fit score in (0, 1]; higher is a better fit.
    pub score: f64,
    /// Run that produced this record.
    pub run_id: Option<RunId>,
    /// Run that superseded this record, if any.
    pub superseded_by: Option<RunId>,
}

impl Assignment {
    /// Creates an assignment for a block.
    pub fn new(
        block: &Block,
        person_id: impl Into<String>,
        role: AssignmentRole,
        template_id: impl Into<String>,
        hours: f64,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            block_id: block.id.clone(),
            date: block.date,
            time_of_day: block.time_of_day,
            person_id: person_id.into(),
            role,
            template_id: template_id.into(),
            hours: if role.is_backup() { 0.0 } else { hours },
            confidence: 1.0,
            score: 1.0,
            run_id: None,
            superseded_by: None,
        }
    }

    /// Sets confidence (clamped to [0, 1]).
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Sets the fit score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Sets the producing run.
    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Whether the record is still in effect.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Whether this record counts as duty (non-backup).
    #[inline]
    pub fn is_duty(&self) -> bool {
        !self.role.is_backup()
    }
}

/// An atomic write: supersede existing records and insert new ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentChangeSet {
    /// Records to mark superseded by the committing run.
    pub supersede: Vec<AssignmentId>,
    /// Records to insert.
    pub insert: Vec<Assignment>,
}

impl AssignmentChangeSet {
    /// Whether the change set does nothing.
    pub fn is_empty(&self) -> bool {
        self.supersede.is_empty() && self.insert.is_empty()
    }
}
