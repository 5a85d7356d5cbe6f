use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

// Type aliases for clarity
pub type ClassId = u32;
pub type SubjectId = u32;
pub type TeacherId = u32;
pub type EntryId = u32;
pub type Day = u8;
pub type Period = u8;

pub const WORKING_DAYS: Day = 5;
pub const DAY_NAMES: [&str; WORKING_DAYS as usize] =
    ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

pub fn day_name(day: Day) -> &'static str {
    DAY_NAMES.get(day as usize).copied().unwrap_or("Unknown day")
}

/// A `(day, period)` coordinate without timing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct SlotKey {
    pub day: Day,
    pub period: Period,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} period {}", day_name(self.day), self.period)
    }
}

/// One cell of the weekly grid. Days run 0..5, periods start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub day: Day,
    pub period: Period,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl TimeSlot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            day: self.day,
            period: self.period,
        }
    }
}

/// One entry of a bell schedule, walked in order to time the periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BellItem {
    Lesson { minutes: u32 },
    Break { minutes: u32 },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BellSchedule {
    pub start_time: NaiveTime,
    pub items: Vec<BellItem>,
}

impl BellSchedule {
    pub fn lesson_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, BellItem::Lesson { .. }))
            .count()
    }
}

/// A school class (group of pupils) that receives lessons.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    #[serde(default)]
    pub daily_lessons: u32,
    #[serde(default)]
    pub bell_schedule: Option<BellSchedule>,
}

/// Weekly hours a teacher gives for a subject in a class.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRecord {
    pub teacher_id: TeacherId,
    pub subject_id: SubjectId,
    pub class_id: ClassId,
    pub hours: u32,
}

/// Subjects a teacher is qualified to teach.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherCapability {
    pub teacher_id: TeacherId,
    pub subject_ids: Vec<SubjectId>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAvailability {
    pub teacher_id: TeacherId,
    pub unavailable_slots: Vec<SlotKey>,
}

/// Weekly requirement for one (class, subject) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonDemand {
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub candidate_teacher_ids: BTreeSet<TeacherId>,
    pub required_quantity: u32,
}

/// Stable identity of a single required weekly occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct DemandUnitId(pub u32);

/// One required occurrence of a [`LessonDemand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandUnit {
    pub id: DemandUnitId,
    /// Index into the owning demand list.
    pub demand: usize,
    /// 1-based occurrence number within the demand.
    pub occurrence: u32,
}

/// A scheduled lesson. Never edited in place; re-slotting builds a new entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: EntryId,
    pub demand_unit: DemandUnitId,
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub time_slot: TimeSlot,
}

impl ScheduleEntry {
    pub fn with_slot(&self, time_slot: TimeSlot) -> Self {
        Self {
            time_slot,
            ..self.clone()
        }
    }

    pub fn slot_key(&self) -> SlotKey {
        self.time_slot.key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn penalty(self) -> u32 {
        match self {
            Severity::High => 100,
            Severity::Medium => 50,
            Severity::Low => 10,
        }
    }
}

/// A rule violation found by the constraint validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Conflict {
    TeacherOverlap {
        teacher_id: TeacherId,
        slot: SlotKey,
        entry_ids: [EntryId; 2],
    },
    ClassOverlap {
        class_id: ClassId,
        slot: SlotKey,
        entry_ids: [EntryId; 2],
    },
    ConsecutiveOverrun {
        class_id: ClassId,
        day: Day,
        run_length: usize,
        entry_ids: Vec<EntryId>,
    },
    WorkloadMismatch {
        class_id: ClassId,
        subject_id: SubjectId,
        target: u32,
        allocated: u32,
        entry_ids: Vec<EntryId>,
    },
    TeacherDailyOverload {
        teacher_id: TeacherId,
        day: Day,
        lessons: usize,
        entry_ids: Vec<EntryId>,
    },
    TeacherUnavailable {
        teacher_id: TeacherId,
        slot: SlotKey,
        entry_id: EntryId,
    },
}

impl Conflict {
    pub fn kind(&self) -> &'static str {
        match self {
            Conflict::TeacherOverlap { .. } => "teacher_overlap",
            Conflict::ClassOverlap { .. } => "class_overlap",
            Conflict::ConsecutiveOverrun { .. } => "consecutive_overrun",
            Conflict::WorkloadMismatch { .. } => "workload_mismatch",
            Conflict::TeacherDailyOverload { .. } => "teacher_daily_overload",
            Conflict::TeacherUnavailable { .. } => "teacher_unavailable",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Conflict::TeacherOverlap { .. }
            | Conflict::ClassOverlap { .. }
            | Conflict::TeacherUnavailable { .. } => Severity::High,
            Conflict::ConsecutiveOverrun { .. } => Severity::Medium,
            Conflict::WorkloadMismatch {
                target, allocated, ..
            } => {
                if allocated > target {
                    Severity::Medium
                } else {
                    Severity::Low
                }
            }
            Conflict::TeacherDailyOverload { .. } => Severity::Low,
        }
    }

    pub fn affected_entry_ids(&self) -> Vec<EntryId> {
        match self {
            Conflict::TeacherOverlap { entry_ids, .. } | Conflict::ClassOverlap { entry_ids, .. } => {
                entry_ids.to_vec()
            }
            Conflict::ConsecutiveOverrun { entry_ids, .. }
            | Conflict::WorkloadMismatch { entry_ids, .. }
            | Conflict::TeacherDailyOverload { entry_ids, .. } => entry_ids.clone(),
            Conflict::TeacherUnavailable { entry_id, .. } => vec![*entry_id],
        }
    }

    /// Renders the conflict for people, resolving class ids through `class_names`.
    pub fn describe(&self, class_names: &HashMap<ClassId, String>) -> String {
        let class = |id: &ClassId| {
            class_names
                .get(id)
                .cloned()
                .unwrap_or_else(|| format!("Class {}", id))
        };
        match self {
            Conflict::TeacherOverlap {
                teacher_id, slot, ..
            } => format!("Teacher {} has two lessons on {}.", teacher_id, slot),
            Conflict::ClassOverlap { class_id, slot, .. } => {
                format!("{} has two lessons on {}.", class(class_id), slot)
            }
            Conflict::ConsecutiveOverrun {
                class_id,
                day,
                run_length,
                ..
            } => format!(
                "{} has {} consecutive lessons on {} (at most 3 allowed).",
                class(class_id),
                run_length,
                day_name(*day)
            ),
            Conflict::WorkloadMismatch {
                class_id,
                subject_id,
                target,
                allocated,
                ..
            } => format!(
                "{} has {} lessons of subject {} per week, expected {}.",
                class(class_id),
                allocated,
                subject_id,
                target
            ),
            Conflict::TeacherDailyOverload {
                teacher_id,
                day,
                lessons,
                ..
            } => format!(
                "Teacher {} teaches {} lessons on {} (at most 4 recommended).",
                teacher_id,
                lessons,
                day_name(*day)
            ),
            Conflict::TeacherUnavailable {
                teacher_id, slot, ..
            } => format!(
                "Teacher {} is scheduled on {} but marked unavailable.",
                teacher_id, slot
            ),
        }
    }
}

/// A scored candidate solution. Owns its entries; clones never share storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Uuid,
    pub entries: Vec<ScheduleEntry>,
    pub conflicts: Vec<Conflict>,
    pub fitness_score: u32,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.conflicts
            .iter()
            .filter(|c| c.severity() == severity)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HardConstraints {
    pub avoid_teacher_clashes: bool,
    pub respect_availability: bool,
    pub fulfill_workload: bool,
}

impl Default for HardConstraints {
    fn default() -> Self {
        Self {
            avoid_teacher_clashes: true,
            respect_availability: true,
            fulfill_workload: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PedagogicalPreferences {
    /// 0 to 100, how strongly gaps in a teacher's day should be avoided.
    pub teacher_gaps: u8,
    pub group_double_lessons: bool,
    pub max_daily_lessons_per_class: u32,
}

impl Default for PedagogicalPreferences {
    fn default() -> Self {
        Self {
            teacher_gaps: 50,
            group_double_lessons: false,
            max_daily_lessons_per_class: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    pub hard_constraints: HardConstraints,
    pub pedagogical: PedagogicalPreferences,
    /// Secondary switches accepted from the UI; none of them affect scoring.
    pub advanced: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub elitism_rate: f64,
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            elitism_rate: 0.2,
            seed: None,
        }
    }
}

/// The complete input for the timetabling problem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingInput {
    pub classes: Vec<ClassInfo>,
    pub workload: Vec<WorkloadRecord>,
    pub capabilities: Vec<TeacherCapability>,
    #[serde(default)]
    pub availability: Vec<TeacherAvailability>,
    #[serde(default)]
    pub config: GenerationConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscheduledReason {
    NoCapableTeacher,
    NoTimeSlots,
}

/// Demand that never entered the grid. Reported separately from conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnscheduledRequirement {
    pub class_id: ClassId,
    pub class_name: String,
    pub subject_id: SubjectId,
    pub hours: u32,
    pub reason: UnscheduledReason,
}

impl fmt::Display for UnscheduledRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let why = match self.reason {
            UnscheduledReason::NoCapableTeacher => "no teacher is qualified for the subject",
            UnscheduledReason::NoTimeSlots => "the weekly grid has no periods",
        };
        write!(
            f,
            "{} hours of subject {} for {} were not scheduled: {}",
            self.hours, self.subject_id, self.class_name, why
        )
    }
}

/// Flattened, human-readable form of a [`Conflict`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    #[serde(rename = "type")]
    pub conflict_type: String,
    pub severity: Severity,
    pub description: String,
    pub affected_entry_ids: Vec<EntryId>,
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {}: {}",
            self.severity, self.conflict_type, self.description
        )
    }
}

/// Summary verdict so callers never mistake an empty schedule for a perfect one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleQuality {
    ConflictFree,
    SoftConflictsOnly,
    HardConflicts,
    Empty,
}

/// The final output of the solver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingOutput {
    pub schedule: Schedule,
    pub conflict_report: Vec<ConflictReport>,
    pub warnings: Vec<UnscheduledRequirement>,
    pub quality: ScheduleQuality,
    pub generations_run: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}
