use crate::data::{
    ClassId, DemandUnit, DemandUnitId, LessonDemand, SubjectId, TeacherCapability, TeacherId,
    UnscheduledReason, UnscheduledRequirement, WorkloadRecord,
};
use crate::grid::TimeSlotGrid;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub type CapabilityMap = HashMap<TeacherId, HashSet<SubjectId>>;

/// Most lesson units a single request may ask for, summed over all classes.
pub const MAX_LESSON_UNITS: u64 = 100_000;

pub fn capability_map(capabilities: &[TeacherCapability]) -> CapabilityMap {
    let mut map = CapabilityMap::new();
    for cap in capabilities {
        map.entry(cap.teacher_id)
            .or_default()
            .extend(cap.subject_ids.iter().copied());
    }
    map
}

/// Lesson demands plus the arena of single occurrences derived from them.
#[derive(Debug, Clone, Default)]
pub struct DemandSet {
    demands: Vec<LessonDemand>,
    units: Vec<DemandUnit>,
}

impl DemandSet {
    pub fn new(demands: Vec<LessonDemand>) -> Self {
        let mut units = Vec::new();
        for (index, demand) in demands.iter().enumerate() {
            for occurrence in 1..=demand.required_quantity {
                units.push(DemandUnit {
                    id: DemandUnitId(units.len() as u32),
                    demand: index,
                    occurrence,
                });
            }
        }
        Self { demands, units }
    }

    pub fn demands(&self) -> &[LessonDemand] {
        &self.demands
    }

    pub fn units(&self) -> &[DemandUnit] {
        &self.units
    }

    pub fn demand_of(&self, unit: &DemandUnit) -> &LessonDemand {
        &self.demands[unit.demand]
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Weekly target per (class, subject).
    pub fn targets(&self) -> HashMap<(ClassId, SubjectId), u32> {
        self.demands
            .iter()
            .map(|d| ((d.class_id, d.subject_id), d.required_quantity))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub demand: DemandSet,
    pub warnings: Vec<UnscheduledRequirement>,
}

/// Weekly hours per (class, subject), summing rows that share a pair.
///
/// Sums saturate at `u32::MAX` instead of wrapping.
pub fn summed_hours(workload: &[WorkloadRecord]) -> BTreeMap<(ClassId, SubjectId), u32> {
    let mut hours: BTreeMap<(ClassId, SubjectId), u32> = BTreeMap::new();
    for record in workload.iter().filter(|r| r.hours > 0) {
        let total = hours.entry((record.class_id, record.subject_id)).or_insert(0);
        *total = total.saturating_add(record.hours);
    }
    hours
}

/// Turns workload rows into one demand per (class, subject).
///
/// Hours of rows sharing a pair are summed. Every teacher qualified for the
/// subject is a candidate. Pairs nobody can teach, or everything when the grid
/// has no periods, come back as warnings instead of demand.
///
/// One unit is allocated per hour, so callers bound the total with
/// [`MAX_LESSON_UNITS`] first.
pub fn extract_demand(
    workload: &[WorkloadRecord],
    capabilities: &CapabilityMap,
    class_names: &HashMap<ClassId, String>,
    grid: &TimeSlotGrid,
) -> Extraction {
    let hours = summed_hours(workload);

    let mut demands = Vec::new();
    let mut warnings = Vec::new();
    for ((class_id, subject_id), required_quantity) in hours {
        let candidate_teacher_ids: BTreeSet<TeacherId> = capabilities
            .iter()
            .filter(|(_, subjects)| subjects.contains(&subject_id))
            .map(|(teacher_id, _)| *teacher_id)
            .collect();

        let reason = if candidate_teacher_ids.is_empty() {
            Some(UnscheduledReason::NoCapableTeacher)
        } else if grid.is_empty() {
            Some(UnscheduledReason::NoTimeSlots)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                let warning = UnscheduledRequirement {
                    class_id,
                    class_name: class_names
                        .get(&class_id)
                        .cloned()
                        .unwrap_or_else(|| format!("Class {}", class_id)),
                    subject_id,
                    hours: required_quantity,
                    reason,
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
            None => demands.push(LessonDemand {
                class_id,
                subject_id,
                candidate_teacher_ids,
                required_quantity,
            }),
        }
    }

    let demand = DemandSet::new(demands);
    debug!(
        "Extracted {} demands ({} lesson units), {} unscheduled requirements",
        demand.demands().len(),
        demand.units().len(),
        warnings.len()
    );
    Extraction { demand, warnings }
}
