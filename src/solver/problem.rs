//! Problem instance construction.
//!
//! Translates people, blocks, templates, absences and fixed assignments
//! into demand **slots**: one `(block, template, role)` position each, with
//! a pre-filtered candidate list (qualification, tier filter, absence).
//! Strategies only ever choose a candidate (or nothing) per slot.
//!
//! # Time Axis
//! Duty limits look back and ahead of the solved range (a 28-day trailing
//! window, a duty run crossing the range edge). The instance therefore
//! indexes days on an axis extended by the rules' lookback on both sides;
//! fixed assignments on that axis count against the limits.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::CostWeights;
use crate::error::SolverError;
use crate::models::{
    is_absent, Absence, Assignment, AssignmentRole, Block, CoverageGap, DateRange, Person,
    PgyLevel, RotationTemplate, RuleSet, RunId, TimeOfDay,
};

/// One unit of demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    /// Index into [`ProblemInstance::blocks`].
    pub block: usize,
    /// Day index on the instance axis.
    pub day: usize,
    /// Half-day cell index on the instance axis (`day * 2 + period`).
    pub cell: usize,
    /// Index into [`ProblemInstance::templates`].
    pub template: usize,
    /// Role to fill.
    pub role: AssignmentRole,
    /// Duty hours credited (0 for backup).
    pub hours: f64,
    /// Whether an unfilled slot is a coverage gap.
    pub required: bool,
    /// Supervision group this slot belongs to.
    pub group: Option<usize>,
    /// Eligible people (indices into [`ProblemInstance::people`]), ascending.
    pub candidates: Vec<usize>,
}

/// Residents and supervisors of one supervised `(block, template)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisionGroup {
    /// Block index.
    pub block: usize,
    /// Template index.
    pub template: usize,
    /// Residents per supervisor, tightest over admitted tiers.
    pub ratio: u32,
    /// Primary slots, in slot order.
    pub residents: Vec<usize>,
    /// Supervising slots, in slot order.
    pub supervisors: Vec<usize>,
    /// Residents already assigned outside the instance.
    pub fixed_residents: u32,
    /// Supervisors already assigned outside the instance.
    pub fixed_supervisors: u32,
}

/// A pre-existing assignment that counts against duty limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDuty {
    /// Person index.
    pub person: usize,
    /// Day index.
    pub day: usize,
    /// Cell index.
    pub cell: usize,
    /// Hours credited.
    pub hours: f64,
    /// Backup role.
    pub backup: bool,
}

/// Hard duty limits derived from the rule set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyLimits {
    /// Trailing window length in days.
    pub window_days: usize,
    /// Hours allowed within any window (infinite when unconstrained).
    pub window_hours: f64,
    /// Longest allowed run of duty days.
    pub max_consecutive: Option<usize>,
}

/// Explicit demand entry (used by repair).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DemandSpec {
    /// Block id.
    pub block_id: String,
    /// Template id.
    pub template_id: String,
    /// Role to fill.
    pub role: AssignmentRole,
}

/// A solvable roster instance.
#[derive(Debug, Clone)]
pub struct ProblemInstance {
    /// Solved range.
    pub range: DateRange,
    /// First date of the day axis.
    pub origin: NaiveDate,
    /// Days on the axis.
    pub day_count: usize,
    /// Active blocks in range, by sequence.
    pub blocks: Vec<Block>,
    /// Eligible people, sorted by id.
    pub people: Vec<Person>,
    /// Applicable templates, sorted by id.
    pub templates: Vec<RotationTemplate>,
    /// Absences used for candidate filtering.
    pub absences: Vec<Absence>,
    /// Demand.
    pub slots: Vec<Slot>,
    /// Supervision groups.
    pub groups: Vec<SupervisionGroup>,
    /// Fixed duties on the axis.
    pub fixed: Vec<FixedDuty>,
    /// Hard limits.
    pub limits: DutyLimits,
    /// Objective weights.
    pub weights: CostWeights,
    /// Consecutive days tolerated before the soft penalty.
    pub soft_consecutive: usize,
    /// Expected hours per person if demand were spread evenly.
    pub fair_share: Vec<f64>,
    /// People grouped by kind (residents, faculty) for fairness.
    pub pools: Vec<Vec<usize>>,
}

impl ProblemInstance {
    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of required slots.
    pub fn required_count(&self) -> usize {
        self.slots.iter().filter(|s| s.required).count()
    }

    /// Total candidate pairs.
    pub fn candidate_pairs(&self) -> usize {
        self.slots.iter().map(|s| s.candidates.len()).sum()
    }

    /// Objective reward for filling a slot.
    #[inline]
    pub fn reward(&self, slot: usize) -> f64 {
        if self.slots[slot].required {
            self.weights.coverage
        } else {
            self.weights.backup
        }
    }

    /// Assignment-level soft cost (preferences).
    pub fn static_cost(&self, slot: usize, person: usize) -> f64 {
        let date = self.blocks[self.slots[slot].block].date;
        let weekday = chrono::Datelike::weekday(&date);
        if self.people[person].avoid_weekdays.contains(&weekday) {
            self.weights.preference
        } else {
            0.0
        }
    }

    /// Date of an axis day index.
    pub fn date_of(&self, day: usize) -> NaiveDate {
        self.origin + chrono::Duration::days(day as i64)
    }

    /// Converts picks into assignments and coverage gaps.
    ///
    /// `confidence` holds one value per slot. Unfilled optional slots
    /// (generated backups) are not gaps.
    pub fn decode(
        &self,
        picks: &[Option<usize>],
        confidence: &[f64],
        run_id: RunId,
    ) -> (Vec<Assignment>, Vec<CoverageGap>) {
        let mut assignments = Vec::new();
        let mut gaps = Vec::new();
        for (s, slot) in self.slots.iter().enumerate() {
            let block = &self.blocks[slot.block];
            let template = &self.templates[slot.template];
            match picks.get(s).copied().flatten() {
                Some(p) => {
                    let cost = self.static_cost(s, p);
                    assignments.push(
                        Assignment::new(
                            block,
                            self.people[p].id.clone(),
                            slot.role,
                            template.id.clone(),
                            slot.hours,
                        )
                        .with_confidence(confidence.get(s).copied().unwrap_or(1.0))
                        .with_score(1.0 / (1.0 + cost))
                        .with_run(run_id),
                    );
                }
                None if slot.required => gaps.push(CoverageGap {
                    block_id: block.id.clone(),
                    date: block.date,
                    time_of_day: block.time_of_day,
                    role: slot.role,
                    template_id: template.id.clone(),
                    reason: self.gap_reason(s, picks),
                    requires_manual_review: false,
                    suggestions: Vec::new(),
                }),
                None => {}
            }
        }
        (assignments, gaps)
    }

    /// Why a slot is unfilled under `picks`.
    pub fn gap_reason(&self, slot: usize, picks: &[Option<usize>]) -> String {
        let s = &self.slots[slot];
        if s.candidates.is_empty() {
            return "no qualified candidate available".to_string();
        }
        match s.role {
            AssignmentRole::Primary => {
                if let Some(g) = s.group {
                    let group = &self.groups[g];
                    let supervisors = group.fixed_supervisors
                        + group.supervisors.iter().filter(|&&i| picks[i].is_some()).count() as u32;
                    let residents = group.fixed_residents
                        + group.residents.iter().filter(|&&i| picks[i].is_some()).count() as u32;
                    if residents >= supervisors * group.ratio {
                        return "insufficient supervision capacity".to_string();
                    }
                }
                "all qualified residents unavailable or at duty limits".to_string()
            }
            AssignmentRole::Supervising => {
                "no supervising faculty available within duty limits".to_string()
            }
            AssignmentRole::Backup => "no backup faculty available".to_string(),
        }
    }
}

#[inline]
pub(crate) fn period_index(time_of_day: TimeOfDay) -> usize {
    match time_of_day {
        TimeOfDay::AM => 0,
        TimeOfDay::PM => 1,
    }
}

/// Builds a [`ProblemInstance`] from domain data.
///
/// # Example
/// ```ignore
/// let instance = ProblemBuilder::new(range, &rules, &weights)
///     .with_people(people)
///     .with_templates(templates)
///     .with_blocks(Block::horizon(range))
///     .with_absences(absences)
///     .build()?;
/// ```
pub struct ProblemBuilder<'a> {
    range: DateRange,
    rules: &'a RuleSet,
    weights: &'a CostWeights,
    soft_consecutive: u32,
    people: Vec<Person>,
    templates: Vec<RotationTemplate>,
    blocks: Vec<Block>,
    absences: Vec<Absence>,
    fixed: Vec<Assignment>,
    pgy_levels: Vec<PgyLevel>,
    template_ids: Vec<String>,
    demand: Option<Vec<DemandSpec>>,
    excluded: HashSet<String>,
}

impl<'a> ProblemBuilder<'a> {
    /// Creates a builder for `range`.
    pub fn new(range: DateRange, rules: &'a RuleSet, weights: &'a CostWeights) -> Self {
        Self {
            range,
            rules,
            weights,
            soft_consecutive: 4,
            people: Vec::new(),
            templates: Vec::new(),
            blocks: Vec::new(),
            absences: Vec::new(),
            fixed: Vec::new(),
            pgy_levels: Vec::new(),
            template_ids: Vec::new(),
            demand: None,
            excluded: HashSet::new(),
        }
    }

    /// Days of history (and future) duty limits need around a range.
    pub fn lookback_days(rules: &RuleSet) -> i64 {
        let window = rules
            .window_hour_cap()
            .map_or(0, |(days, _)| days.saturating_sub(1) as i64);
        let run = rules.max_consecutive_days().map_or(0, |d| d as i64);
        window.max(run)
    }

    /// Sets the workforce.
    pub fn with_people(mut self, people: Vec<Person>) -> Self {
        self.people = people;
        self
    }

    /// Sets rotation templates.
    pub fn with_templates(mut self, templates: Vec<RotationTemplate>) -> Self {
        self.templates = templates;
        self
    }

    /// Sets blocks (blocks outside the range or inactive are ignored).
    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Sets absences.
    pub fn with_absences(mut self, absences: Vec<Absence>) -> Self {
        self.absences = absences;
        self
    }

    /// Sets assignments held constant (count against limits).
    pub fn with_fixed_assignments(mut self, fixed: Vec<Assignment>) -> Self {
        self.fixed = fixed;
        self
    }

    /// Restricts residents to these tiers (empty = all).
    pub fn with_pgy_levels(mut self, levels: Vec<PgyLevel>) -> Self {
        self.pgy_levels = levels;
        self
    }

    /// Restricts demand to these templates (empty = all).
    pub fn with_template_ids(mut self, ids: Vec<String>) -> Self {
        self.template_ids = ids;
        self
    }

    /// Replaces generated demand with an explicit slot list.
    ///
    /// Every explicit slot is required, backups included: an unfilled one
    /// decodes to a coverage gap.
    pub fn with_demand(mut self, demand: Vec<DemandSpec>) -> Self {
        self.demand = Some(demand);
        self
    }

    /// Removes a person from every candidate list.
    pub fn excluding(mut self, person_id: impl Into<String>) -> Self {
        self.excluded.insert(person_id.into());
        self
    }

    /// Sets the soft consecutive-day threshold.
    pub fn with_soft_consecutive(mut self, days: u32) -> Self {
        self.soft_consecutive = days;
        self
    }

    /// Builds the instance.
    ///
    /// # Errors
    /// [`SolverError::MalformedInstance`] if the range is inverted or the
    /// explicit demand names an unknown block or template.
    pub fn build(self) -> Result<ProblemInstance, SolverError> {
        if !self.range.is_valid() {
            return Err(SolverError::MalformedInstance(format!(
                "inverted range {}",
                self.range
            )));
        }

        let lookback = Self::lookback_days(self.rules);
        let axis = self.range.extend(lookback, lookback);
        let origin = axis.start;
        let day_count = axis.days() as usize;

        let mut people: Vec<Person> = self
            .people
            .into_iter()
            .filter(|p| p.active && !self.excluded.contains(&p.id))
            .filter(|p| match p.pgy_level() {
                Some(level) => self.pgy_levels.is_empty() || self.pgy_levels.contains(&level),
                None => true,
            })
            .collect();
        people.sort_by(|a, b| a.id.cmp(&b.id));

        let mut templates: Vec<RotationTemplate> = self
            .templates
            .into_iter()
            .filter(|t| self.template_ids.is_empty() || self.template_ids.contains(&t.id))
            .collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));

        let range = self.range;
        let mut blocks: Vec<Block> = self
            .blocks
            .into_iter()
            .filter(|b| b.active && range.contains(b.date))
            .collect();
        blocks.sort_by_key(|b| (b.sequence, b.date, b.time_of_day));

        let person_index: HashMap<&str, usize> = people
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), i))
            .collect();
        let block_index: HashMap<&str, usize> = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.as_str(), i))
            .collect();
        let template_index: HashMap<&str, usize> = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();

        let day_of = |date: NaiveDate| -> Option<usize> {
            let offset = (date - origin).num_days();
            (offset >= 0 && (offset as usize) < day_count).then_some(offset as usize)
        };

        // Fixed duties and per-(block, template) fixed role counts.
        let mut fixed = Vec::new();
        let mut fixed_roles: HashMap<(&str, &str), (u32, u32)> = HashMap::new();
        for a in self.fixed.iter().filter(|a| a.is_active()) {
            let counts = fixed_roles
                .entry((a.block_id.as_str(), a.template_id.as_str()))
                .or_insert((0, 0));
            match a.role {
                AssignmentRole::Primary => counts.0 += 1,
                AssignmentRole::Supervising => counts.1 += 1,
                AssignmentRole::Backup => {}
            }
            if let (Some(&person), Some(day)) =
                (person_index.get(a.person_id.as_str()), day_of(a.date))
            {
                fixed.push(FixedDuty {
                    person,
                    day,
                    cell: day * 2 + period_index(a.time_of_day),
                    hours: a.hours,
                    backup: a.role.is_backup(),
                });
            }
        }

        // Demand entries as (block, template, role).
        let mut entries: Vec<(usize, usize, AssignmentRole, bool)> = Vec::new();
        match &self.demand {
            Some(specs) => {
                for spec in specs {
                    let block = *block_index.get(spec.block_id.as_str()).ok_or_else(|| {
                        SolverError::MalformedInstance(format!("unknown block {}", spec.block_id))
                    })?;
                    let template =
                        *template_index
                            .get(spec.template_id.as_str())
                            .ok_or_else(|| {
                                SolverError::MalformedInstance(format!(
                                    "unknown template {}",
                                    spec.template_id
                                ))
                            })?;
                    entries.push((block, template, spec.role, true));
                }
            }
            None => {
                for (b, block) in blocks.iter().enumerate() {
                    for (t, template) in templates.iter().enumerate() {
                        if !template.runs_at(block.time_of_day) {
                            continue;
                        }
                        let residents = template.residents_per_block;
                        for _ in 0..residents {
                            entries.push((b, t, AssignmentRole::Primary, true));
                        }
                        if template.supervision_required {
                            let ratio = effective_ratio(template, self.rules, &self.pgy_levels);
                            for _ in 0..RotationTemplate::supervisors_for(residents, ratio) {
                                entries.push((b, t, AssignmentRole::Supervising, true));
                            }
                        }
                        for _ in 0..template.backup_per_block {
                            entries.push((b, t, AssignmentRole::Backup, false));
                        }
                    }
                }
            }
        }

        let mut slots = Vec::with_capacity(entries.len());
        let mut group_of: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        let mut groups: Vec<SupervisionGroup> = Vec::new();
        for (b, t, role, required) in entries {
            let block = &blocks[b];
            let template = &templates[t];
            let Some(day) = day_of(block.date) else {
                continue;
            };
            let candidates: Vec<usize> = people
                .iter()
                .enumerate()
                .filter(|(_, p)| p.qualifies_for(template, role))
                .filter(|(_, p)| !is_absent(&self.absences, &p.id, block.date))
                .map(|(i, _)| i)
                .collect();

            let group = (template.supervision_required && !role.is_backup()).then(|| {
                *group_of.entry((b, t)).or_insert_with(|| {
                    let (fixed_residents, fixed_supervisors) = fixed_roles
                        .get(&(block.id.as_str(), template.id.as_str()))
                        .copied()
                        .unwrap_or((0, 0));
                    groups.push(SupervisionGroup {
                        block: b,
                        template: t,
                        ratio: effective_ratio(template, self.rules, &self.pgy_levels),
                        residents: Vec::new(),
                        supervisors: Vec::new(),
                        fixed_residents,
                        fixed_supervisors,
                    });
                    groups.len() - 1
                })
            });
            let index = slots.len();
            if let Some(g) = group {
                match role {
                    AssignmentRole::Primary => groups[g].residents.push(index),
                    AssignmentRole::Supervising => groups[g].supervisors.push(index),
                    AssignmentRole::Backup => {}
                }
            }

            slots.push(Slot {
                block: b,
                day,
                cell: day * 2 + period_index(block.time_of_day),
                template: t,
                role,
                hours: if role.is_backup() {
                    0.0
                } else {
                    template.hours_per_block
                },
                required,
                group,
                candidates,
            });
        }

        let mut fair_share = vec![0.0; people.len()];
        for slot in &slots {
            if slot.candidates.is_empty() {
                continue;
            }
            let share = slot.hours / slot.candidates.len() as f64;
            for &c in &slot.candidates {
                fair_share[c] += share;
            }
        }

        let mut pools = vec![Vec::new(), Vec::new()];
        let mut in_pool = vec![false; people.len()];
        for slot in &slots {
            for &c in &slot.candidates {
                in_pool[c] = true;
            }
        }
        for (i, p) in people.iter().enumerate() {
            if in_pool[i] {
                pools[usize::from(p.is_faculty())].push(i);
            }
        }

        let limits = match self.rules.window_hour_cap() {
            Some((days, hours)) => DutyLimits {
                window_days: days as usize,
                window_hours: hours,
                max_consecutive: self.rules.max_consecutive_days().map(|d| d as usize),
            },
            None => DutyLimits {
                window_days: 1,
                window_hours: f64::INFINITY,
                max_consecutive: self.rules.max_consecutive_days().map(|d| d as usize),
            },
        };

        Ok(ProblemInstance {
            range,
            origin,
            day_count,
            blocks,
            people,
            templates,
            absences: self.absences,
            slots,
            groups,
            fixed,
            limits,
            weights: self.weights.clone(),
            soft_consecutive: self.soft_consecutive as usize,
            fair_share,
            pools,
        })
    }
}

/// Residents per supervisor: the template ratio, tightened by the rule
/// tier ratio of every tier the template admits.
pub(crate) fn effective_ratio(
    template: &RotationTemplate,
    rules: &RuleSet,
    pgy_filter: &[PgyLevel],
) -> u32 {
    PgyLevel::ALL
        .iter()
        .filter(|level| template.admits(**level))
        .filter(|level| pgy_filter.is_empty() || pgy_filter.contains(level))
        .filter_map(|level| rules.tier_ratio(*level))
        .fold(template.max_supervision_ratio.max(1), |acc, r| acc.min(r.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn fixture() -> (DateRange, Vec<Person>, Vec<RotationTemplate>) {
        let range = DateRange::new(d(6), d(7));
        let people = vec![
            Person::resident("R1", PgyLevel::Pgy1),
            Person::resident("R2", PgyLevel::Pgy3),
            Person::faculty("F1", "im"),
            Person::faculty("F2", "im").deactivated(),
        ];
        let templates = vec![RotationTemplate::new("clinic", "clinic")
            .with_supervision(4)
            .with_residents_per_block(3)
            .with_backup_per_block(1)];
        (range, people, templates)
    }

    #[test]
    fn test_demand_and_groups() {
        let (range, people, templates) = fixture();
        let rules = RuleSet::standard();
        let weights = CostWeights::default();
        let instance = ProblemBuilder::new(range, &rules, &weights)
            .with_people(people)
            .with_templates(templates)
            .with_blocks(Block::horizon(range))
            .build()
            .unwrap();

        // 4 blocks × (3 residents + ceil(3/2) supervisors + 1 backup).
        assert_eq!(instance.blocks.len(), 4);
        assert_eq!(instance.slot_count(), 4 * 6);
        assert_eq!(instance.required_count(), 4 * 5);
        assert_eq!(instance.groups.len(), 4);
        assert_eq!(instance.groups[0].ratio, 2);
        assert_eq!(instance.groups[0].supervisors.len(), 2);
        // Inactive faculty is dropped; lookback widens the axis.
        assert_eq!(instance.people.len(), 3);
        assert_eq!(instance.origin, d(6) - chrono::Duration::days(27));
        assert_eq!(instance.day_count, 2 + 2 * 27);
    }

    #[test]
    fn test_candidates_respect_role_and_absence() {
        let (range, people, templates) = fixture();
        let rules = RuleSet::standard();
        let weights = CostWeights::default();
        let absences = vec![Absence::new(
            "R1",
            DateRange::single(d(6)),
            crate::models::AbsenceKind::Sick,
        )];
        let instance = ProblemBuilder::new(range, &rules, &weights)
            .with_people(people)
            .with_templates(templates)
            .with_blocks(Block::horizon(range))
            .with_absences(absences)
            .build()
            .unwrap();

        let r1 = instance.people.iter().position(|p| p.id == "R1").unwrap();
        let f1 = instance.people.iter().position(|p| p.id == "F1").unwrap();
        for slot in &instance.slots {
            let date = instance.blocks[slot.block].date;
            match slot.role {
                AssignmentRole::Primary => {
                    assert!(!slot.candidates.contains(&f1));
                    assert_eq!(slot.candidates.contains(&r1), date != d(6));
                }
                AssignmentRole::Supervising | AssignmentRole::Backup => {
                    assert_eq!(slot.candidates, vec![f1]);
                }
            }
        }
    }

    #[test]
    fn test_pgy_filter_relaxes_ratio() {
        let (range, people, templates) = fixture();
        let rules = RuleSet::standard();
        let weights = CostWeights::default();
        let instance = ProblemBuilder::new(range, &rules, &weights)
            .with_people(people)
            .with_templates(templates)
            .with_blocks(Block::horizon(range))
            .with_pgy_levels(vec![PgyLevel::Pgy3])
            .build()
            .unwrap();
        assert_eq!(instance.groups[0].ratio, 4);
        assert_eq!(instance.groups[0].supervisors.len(), 1);
    }

    #[test]
    fn test_explicit_demand_unknown_block() {
        let (range, people, templates) = fixture();
        let rules = RuleSet::standard();
        let weights = CostWeights::default();
        let result = ProblemBuilder::new(range, &rules, &weights)
            .with_people(people)
            .with_templates(templates)
            .with_blocks(Block::horizon(range))
            .with_demand(vec![DemandSpec {
                block_id: "2030-01-01-AM".into(),
                template_id: "clinic".into(),
                role: AssignmentRole::Supervising,
            }])
            .build();
        assert!(matches!(result, Err(SolverError::MalformedInstance(_))));
    }

    #[test]
    fn test_explicit_backup_demand_is_required() {
        let (range, people, templates) = fixture();
        let rules = RuleSet::standard();
        let weights = CostWeights::default();
        let block = Block::horizon(range).remove(0);
        let instance = ProblemBuilder::new(range, &rules, &weights)
            .with_people(people)
            .with_templates(templates)
            .with_blocks(Block::horizon(range))
            .with_demand(vec![DemandSpec {
                block_id: block.id.clone(),
                template_id: "clinic".into(),
                role: AssignmentRole::Backup,
            }])
            .build()
            .unwrap();
        assert_eq!(instance.slot_count(), 1);
        assert!(instance.slots[0].required);
        assert_eq!(instance.slots[0].hours, 0.0);

        let (assignments, gaps) = instance.decode(&[None], &[0.0], RunId::new());
        assert!(assignments.is_empty());
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].role, AssignmentRole::Backup);
        assert_eq!(gaps[0].block_id, block.id);
    }

    #[test]
    fn test_decode_gaps() {
        let (range, people, templates) = fixture();
        let rules = RuleSet::standard();
        let weights = CostWeights::default();
        let instance = ProblemBuilder::new(range, &rules, &weights)
            .with_people(people)
            .with_templates(templates)
            .with_blocks(Block::horizon(range))
            .build()
            .unwrap();
        let picks = vec![None; instance.slot_count()];
        let confidence = vec![1.0; instance.slot_count()];
        let (assignments, gaps) = instance.decode(&picks, &confidence, RunId::new());
        assert!(assignments.is_empty());
        // Backup slots are not gaps.
        assert_eq!(gaps.len(), instance.required_count());
        assert!(gaps
            .iter()
            .filter(|g| g.role == AssignmentRole::Primary)
            .all(|g| g.reason == "insufficient supervision capacity"));
    }
}
