//! Duty roster domain models.
//!
//! Provides the core data types for representing roster problems and
//! their solutions: who can work (people), when (blocks), on what
//! (rotation templates), under which rules, and what was produced
//! (assignments, runs, schedules).
//!
//! # Domain Mappings
//!
//! | u-roster | Residency program | General workforce |
//! |----------|-------------------|-------------------|
//! | Person | Resident / Faculty | Trainee / Supervisor |
//! | Block | AM/PM clinic session | Shift |
//! | RotationTemplate | Rotation (clinic, inpatient) | Post / Station |
//! | ComplianceRule | Duty-hour regulation | Labour rule |
//! | Schedule | Block schedule | Roster |

mod absence;
mod assignment;
mod calendar;
mod person;
mod rule;
mod run;
mod schedule;
mod template;

pub use absence::{is_absent, Absence, AbsenceKind};
pub use assignment::{Assignment, AssignmentChangeSet, AssignmentId, AssignmentRole};
pub use calendar::{Block, DateRange, TimeOfDay};
pub use person::{PeopleFilter, Person, PersonKind, PgyLevel};
pub use rule::{ComplianceRule, Enforcement, RuleKind, RuleSet, Severity, TierRatio};
pub use run::{GenerationRun, RunId, RunKind, RunStatus};
pub use schedule::{CoverageGap, ReplacementSuggestion, Schedule};
pub use template::RotationTemplate;
