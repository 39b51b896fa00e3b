//! Absence model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::DateRange;

/// Why a person is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsenceKind {
    /// Planned leave.
    Vacation,
    /// Illness.
    Sick,
    /// Educational leave.
    Conference,
    /// Military or humanitarian deployment.
    Deployment,
    /// Sudden emergency (family, personal).
    Emergency,
    /// Anything else.
    Other(String),
}

/// A period during which a person must not be scheduled.
///
/// External input to both generation and repair; read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absence {
    /// Absent person.
    pub person_id: String,
    /// Covered dates (inclusive).
    pub range: DateRange,
    /// Reason.
    pub kind: AbsenceKind,
}

impl Absence {
    /// Creates an absence.
    pub fn new(person_id: impl Into<String>, range: DateRange, kind: AbsenceKind) -> Self {
        Self {
            person_id: person_id.into(),
            range,
            kind,
        }
    }

    /// Whether `person_id` is absent on `date` under this record.
    #[inline]
    pub fn covers(&self, person_id: &str, date: NaiveDate) -> bool {
        self.person_id == person_id && self.range.contains(date)
    }
}

/// Whether any absence covers `person_id` on `date`.
pub fn is_absent(absences: &[Absence], person_id: &str, date: NaiveDate) -> bool {
    absences.iter().any(|a| a.covers(person_id, date))
}
