//! Rotation templates.
//!
//! A template describes an activity that blocks are staffed for: which
//! residents it admits, how many it needs per block, whether faculty must
//! supervise and at what ratio. Templates are reference data and stay
//! read-only while solving.

use serde::{Deserialize, Serialize};

use super::{PgyLevel, TimeOfDay};

/// Reference data for one activity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationTemplate {
    /// Unique identifier.
    pub id: String,
    /// Activity type (e.g., "clinic", "inpatient", "procedures").
    pub activity_type: String,
    /// Short display label.
    pub abbreviation: String,
    /// Whether residents on this activity need faculty supervision.
    pub supervision_required: bool,
    /// Maximum residents per supervising faculty (1:N ratio → N).
    pub max_supervision_ratio: u32,
    /// Resident positions per block.
    pub residents_per_block: u32,
    /// Optional faculty backup positions per block (not required coverage).
    pub backup_per_block: u32,
    /// Admitted resident tiers (empty = all tiers).
    pub pgy_levels: Vec<PgyLevel>,
    /// Credentials every supervising/backup faculty must hold.
    pub required_credentials: Vec<String>,
    /// Procedures every supervising/backup faculty must be qualified for.
    pub required_procedures: Vec<String>,
    /// Restricts demand to AM or PM blocks (None = both).
    pub time_of_day: Option<TimeOfDay>,
    /// Duty hours credited per assigned block.
    pub hours_per_block: f64,
}

impl RotationTemplate {
    /// Creates a template with one resident per block and no supervision.
    pub fn new(id: impl Into<String>, activity_type: impl Into<String>) -> Self {
        let activity_type = activity_type.into();
        let abbreviation = activity_type.chars().take(3).collect::<String>().to_uppercase();
        Self {
            id: id.into(),
            activity_type,
            abbreviation,
            supervision_required: false,
            max_supervision_ratio: 1,
            residents_per_block: 1,
            backup_per_block: 0,
            pgy_levels: Vec::new(),
            required_credentials: Vec::new(),
            required_procedures: Vec::new(),
            time_of_day: None,
            hours_per_block: 6.0,
        }
    }

    /// Requires faculty supervision at `1:ratio`.
    pub fn with_supervision(mut self, ratio: u32) -> Self {
        self.supervision_required = true;
        self.max_supervision_ratio = ratio;
        self
    }

    /// Sets the abbreviation.
    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviation = abbreviation.into();
        self
    }

    /// Sets resident positions per block.
    pub fn with_residents_per_block(mut self, count: u32) -> Self {
        self.residents_per_block = count;
        self
    }

    /// Sets faculty backup positions per block.
    pub fn with_backup_per_block(mut self, count: u32) -> Self {
        self.backup_per_block = count;
        self
    }

    /// Restricts admitted tiers.
    pub fn with_pgy_levels(mut self, levels: Vec<PgyLevel>) -> Self {
        self.pgy_levels = levels;
        self
    }

    /// Adds a required faculty credential.
    pub fn with_required_credential(mut self, credential: impl Into<String>) -> Self {
        self.required_credentials.push(credential.into());
        self
    }

    /// Adds a required faculty procedure.
    pub fn with_required_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.required_procedures.push(procedure.into());
        self
    }

    /// Restricts demand to one half of the day.
    pub fn only(mut self, time_of_day: TimeOfDay) -> Self {
        self.time_of_day = Some(time_of_day);
        self
    }

    /// Sets duty hours per block.
    pub fn with_hours(mut self, hours: f64) -> Self {
        self.hours_per_block = hours;
        self
    }

    /// Whether residents of `level` may fill this template.
    pub fn admits(&self, level: PgyLevel) -> bool {
        self.pgy_levels.is_empty() || self.pgy_levels.contains(&level)
    }

    /// Whether the template generates demand on a block of the given period.
    pub fn runs_at(&self, time_of_day: TimeOfDay) -> bool {
        self.time_of_day.map_or(true, |t| t == time_of_day)
    }

    /// Supervising faculty needed for `residents` residents at `ratio`.
    ///
    /// Ceiling division: a ratio of 1:2 allows at most 2 residents per
    /// faculty, never more.
    pub fn supervisors_for(residents: u32, ratio: u32) -> u32 {
        if residents == 0 {
            return 0;
        }
        residents.div_ceil(ratio.max(1))
    }
}
