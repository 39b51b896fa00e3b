//! Person model.
//!
//! People are the schedulable workforce: residents (trainees, tiered by
//! post-graduate year) and faculty (supervisors with credentials and
//! qualified procedures). Identity is immutable; activity status may change.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::{AssignmentRole, RotationTemplate};

/// Post-graduate year of a resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PgyLevel {
    /// First year (intern).
    Pgy1,
    /// Second year.
    Pgy2,
    /// Third year.
    Pgy3,
}

impl PgyLevel {
    /// All tiers, junior first.
    pub const ALL: [PgyLevel; 3] = [PgyLevel::Pgy1, PgyLevel::Pgy2, PgyLevel::Pgy3];

    /// Numeric year (1..=3).
    pub fn year(&self) -> u8 {
        match self {
            Self::Pgy1 => 1,
            Self::Pgy2 => 2,
            Self::Pgy3 => 3,
        }
    }

    /// Parses a numeric year.
    pub fn from_year(year: u8) -> Option<Self> {
        match year {
            1 => Some(Self::Pgy1),
            2 => Some(Self::Pgy2),
            3 => Some(Self::Pgy3),
            _ => None,
        }
    }
}

/// Person classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersonKind {
    /// A trainee who needs supervision.
    Resident {
        /// Training tier.
        pgy_level: PgyLevel,
    },
    /// A supervising physician.
    Faculty {
        /// Clinical specialty.
        specialty: String,
        /// Held credentials (e.g., "board-certified", "bls").
        credentials: Vec<String>,
        /// Procedures the person may supervise.
        procedures: Vec<String>,
    },
}

/// A schedulable person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Resident or faculty.
    pub kind: PersonKind,
    /// Inactive people are never scheduled.
    pub active: bool,
    /// Weekdays the person prefers not to work (soft).
    pub avoid_weekdays: Vec<Weekday>,
}

impl Person {
    fn new(id: impl Into<String>, kind: PersonKind) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind,
            active: true,
            avoid_weekdays: Vec::new(),
        }
    }

    /// Creates a resident.
    pub fn resident(id: impl Into<String>, pgy_level: PgyLevel) -> Self {
        Self::new(id, PersonKind::Resident { pgy_level })
    }

    /// Creates a faculty member.
    pub fn faculty(id: impl Into<String>, specialty: impl Into<String>) -> Self {
        Self::new(
            id,
            PersonKind::Faculty {
                specialty: specialty.into(),
                credentials: Vec::new(),
                procedures: Vec::new(),
            },
        )
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a credential (faculty only; ignored for residents).
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        if let PersonKind::Faculty { credentials, .. } = &mut self.kind {
            credentials.push(credential.into());
        }
        self
    }

    /// Adds a qualified procedure (faculty only; ignored for residents).
    pub fn with_procedure(mut self, procedure: impl Into<String>) -> Self {
        if let PersonKind::Faculty { procedures, .. } = &mut self.kind {
            procedures.push(procedure.into());
        }
        self
    }

    /// Adds a weekday the person prefers to keep free.
    pub fn avoiding(mut self, weekday: Weekday) -> Self {
        self.avoid_weekdays.push(weekday);
        self
    }

    /// Marks the person inactive.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether this person is a resident.
    pub fn is_resident(&self) -> bool {
        matches!(self.kind, PersonKind::Resident { .. })
    }

    /// Whether this person is faculty.
    pub fn is_faculty(&self) -> bool {
        matches!(self.kind, PersonKind::Faculty { .. })
    }

    /// PGY level for residents.
    pub fn pgy_level(&self) -> Option<PgyLevel> {
        match &self.kind {
            PersonKind::Resident { pgy_level } => Some(*pgy_level),
            PersonKind::Faculty { .. } => None,
        }
    }

    /// Whether the person holds a credential.
    pub fn has_credential(&self, name: &str) -> bool {
        match &self.kind {
            PersonKind::Faculty { credentials, .. } => credentials.iter().any(|c| c == name),
            PersonKind::Resident { .. } => false,
        }
    }

    /// Whether the person is qualified for a procedure.
    pub fn has_procedure(&self, name: &str) -> bool {
        match &self.kind {
            PersonKind::Faculty { procedures, .. } => procedures.iter().any(|p| p == name),
            PersonKind::Resident { .. } => false,
        }
    }

    /// Hard qualification check for filling `role` on `template`.
    ///
    /// - Primary: an active resident whose tier the template admits.
    /// - Supervising / Backup: active faculty holding every required
    ///   credential and procedure of the template.
    pub fn qualifies_for(&self, template: &RotationTemplate, role: AssignmentRole) -> bool {
        if !self.active {
            return false;
        }
        match role {
            AssignmentRole::Primary => match self.pgy_level() {
                Some(level) => template.admits(level),
                None => false,
            },
            AssignmentRole::Supervising | AssignmentRole::Backup => {
                self.is_faculty()
                    && template
                        .required_credentials
                        .iter()
                        .all(|c| self.has_credential(c))
                    && template
                        .required_procedures
                        .iter()
                        .all(|p| self.has_procedure(p))
            }
        }
    }
}

/// Selection filter for [`crate::repository::Repository::load_people`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeopleFilter {
    /// Only active people.
    pub active_only: bool,
    /// Restrict residents to these tiers (empty = all). Faculty always pass.
    pub pgy_levels: Vec<PgyLevel>,
}

impl PeopleFilter {
    /// Active people of every tier.
    pub fn active() -> Self {
        Self {
            active_only: true,
            pgy_levels: Vec::new(),
        }
    }

    /// Restricts residents to the given tiers.
    pub fn with_pgy_levels(mut self, levels: Vec<PgyLevel>) -> Self {
        self.pgy_levels = levels;
        self
    }

    /// Whether a person passes the filter.
    pub fn matches(&self, person: &Person) -> bool {
        if self.active_only && !person.active {
            return false;
        }
        match person.pgy_level() {
            Some(level) => self.pgy_levels.is_empty() || self.pgy_levels.contains(&level),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_builders() {
        let f = Person::faculty("F1", "Family Medicine")
            .with_name("Dr. One")
            .with_credential("bls")
            .with_procedure("colposcopy")
            .avoiding(Weekday::Fri);

        assert!(f.is_faculty());
        assert!(f.has_credential("bls"));
        assert!(!f.has_credential("acls"));
        assert!(f.has_procedure("colposcopy"));
        assert_eq!(f.avoid_weekdays, vec![Weekday::Fri]);
        assert_eq!(f.pgy_level(), None);

        let r = Person::resident("R1", PgyLevel::Pgy2).with_credential("ignored");
        assert!(r.is_resident());
        assert!(!r.has_credential("ignored"));
        assert_eq!(r.pgy_level(), Some(PgyLevel::Pgy2));
    }

    #[test]
    fn test_qualification() {
        let clinic = RotationTemplate::new("clinic", "Clinic")
            .with_pgy_levels(vec![PgyLevel::Pgy1])
            .with_required_credential("bls");

        let r1 = Person::resident("R1", PgyLevel::Pgy1);
        let r2 = Person::resident("R2", PgyLevel::Pgy2);
        let f_ok = Person::faculty("F1", "FM").with_credential("bls");
        let f_missing = Person::faculty("F2", "FM");

        assert!(r1.qualifies_for(&clinic, AssignmentRole::Primary));
        assert!(!r2.qualifies_for(&clinic, AssignmentRole::Primary));
        assert!(!r1.qualifies_for(&clinic, AssignmentRole::Supervising));
        assert!(f_ok.qualifies_for(&clinic, AssignmentRole::Supervising));
        assert!(f_ok.qualifies_for(&clinic, AssignmentRole::Backup));
        assert!(!f_missing.qualifies_for(&clinic, AssignmentRole::Supervising));
        assert!(!f_ok.clone().deactivated().qualifies_for(&clinic, AssignmentRole::Supervising));
    }

    #[test]
    fn test_people_filter() {
        let filter = PeopleFilter::active().with_pgy_levels(vec![PgyLevel::Pgy3]);
        assert!(filter.matches(&Person::resident("R3", PgyLevel::Pgy3)));
        assert!(!filter.matches(&Person::resident("R1", PgyLevel::Pgy1)));
        assert!(filter.matches(&Person::faculty("F1", "FM")));
        assert!(!filter.matches(&Person::faculty("F2", "FM").deactivated()));
    }

    #[test]
    fn test_pgy_year_roundtrip() {
        for level in PgyLevel::ALL {
            assert_eq!(PgyLevel::from_year(level.year()), Some(level));
        }
        assert_eq!(PgyLevel::from_year(4), None);
    }
}
