//! Constraint validation and fitness scoring.
//!
//! The validator is a pure function of the entries and a [`ValidationContext`]:
//! it keeps no state between calls, so every changed schedule is re-scored in
//! full. Overlap rules group entries by key and report every colliding pair.

use crate::data::{
    ClassId, Conflict, HardConstraints, Schedule, ScheduleEntry, SlotKey, SubjectId,
    TeacherAvailability, TeacherId,
};
use crate::demand::DemandSet;
use chrono::Utc;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub const MAX_FITNESS: u32 = 1000;
/// Longest allowed run of back-to-back lessons for a class.
pub const MAX_CONSECUTIVE_LESSONS: usize = 3;
/// Lessons per day above which a teacher counts as overloaded.
pub const MAX_TEACHER_DAILY_LESSONS: usize = 4;

/// Everything the validator needs besides the entries themselves.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub targets: HashMap<(ClassId, SubjectId), u32>,
    pub unavailable: HashSet<(TeacherId, SlotKey)>,
    pub rules: HardConstraints,
}

impl ValidationContext {
    pub fn new(
        demand: &DemandSet,
        availability: &[TeacherAvailability],
        rules: HardConstraints,
    ) -> Self {
        let unavailable = availability
            .iter()
            .flat_map(|a| a.unavailable_slots.iter().map(move |slot| (a.teacher_id, *slot)))
            .collect();
        Self {
            targets: demand.targets(),
            unavailable,
            rules,
        }
    }
}

/// Scores a set of entries: returns the conflicts found and the resulting fitness.
pub fn evaluate(entries: &[ScheduleEntry], ctx: &ValidationContext) -> (Vec<Conflict>, u32) {
    let conflicts = find_conflicts(entries, ctx);
    let score = fitness(&conflicts);
    (conflicts, score)
}

pub fn find_conflicts(entries: &[ScheduleEntry], ctx: &ValidationContext) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    if ctx.rules.avoid_teacher_clashes {
        teacher_overlaps(entries, &mut conflicts);
    }
    class_overlaps(entries, &mut conflicts);
    consecutive_overruns(entries, &mut conflicts);
    if ctx.rules.fulfill_workload {
        workload_mismatches(entries, &ctx.targets, &mut conflicts);
    }
    teacher_daily_overloads(entries, &mut conflicts);
    if ctx.rules.respect_availability {
        unavailable_teachers(entries, &ctx.unavailable, &mut conflicts);
    }
    conflicts
}

/// 1000 minus the severity penalties, floored at 0.
pub fn fitness(conflicts: &[Conflict]) -> u32 {
    let penalty: u32 = conflicts.iter().map(|c| c.severity().penalty()).sum();
    MAX_FITNESS.saturating_sub(penalty)
}

/// Wraps freshly built entries into a new, fully scored [`Schedule`].
pub fn scored_schedule(entries: Vec<ScheduleEntry>, ctx: &ValidationContext) -> Schedule {
    let (conflicts, fitness_score) = evaluate(&entries, ctx);
    Schedule {
        id: Uuid::new_v4(),
        entries,
        conflicts,
        fitness_score,
        created_at: Utc::now(),
    }
}

// groups are visited in key order so repeated calls give identical output
fn grouped<K, F>(entries: &[ScheduleEntry], key: F) -> Vec<(K, Vec<&ScheduleEntry>)>
where
    K: Ord + Copy + std::hash::Hash,
    F: Fn(&ScheduleEntry) -> K,
{
    entries
        .iter()
        .map(|e| (key(e), e))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(k, _)| *k)
        .collect()
}

fn teacher_overlaps(entries: &[ScheduleEntry], out: &mut Vec<Conflict>) {
    for ((teacher_id, slot), group) in grouped(entries, |e| (e.teacher_id, e.slot_key())) {
        for (a, b) in group.iter().tuple_combinations() {
            out.push(Conflict::TeacherOverlap {
                teacher_id,
                slot,
                entry_ids: [a.id, b.id],
            });
        }
    }
}

fn class_overlaps(entries: &[ScheduleEntry], out: &mut Vec<Conflict>) {
    for ((class_id, slot), group) in grouped(entries, |e| (e.class_id, e.slot_key())) {
        for (a, b) in group.iter().tuple_combinations() {
            out.push(Conflict::ClassOverlap {
                class_id,
                slot,
                entry_ids: [a.id, b.id],
            });
        }
    }
}

fn consecutive_overruns(entries: &[ScheduleEntry], out: &mut Vec<Conflict>) {
    for ((class_id, day), group) in grouped(entries, |e| (e.class_id, e.time_slot.day)) {
        let periods: Vec<_> = group
            .iter()
            .map(|e| e.time_slot.period)
            .sorted()
            .dedup()
            .collect();
        let run_length = longest_run(&periods);
        if run_length > MAX_CONSECUTIVE_LESSONS {
            out.push(Conflict::ConsecutiveOverrun {
                class_id,
                day,
                run_length,
                entry_ids: group.iter().map(|e| e.id).collect(),
            });
        }
    }
}

fn longest_run(sorted_periods: &[u8]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<u8> = None;
    for &period in sorted_periods {
        current = match previous {
            Some(p) if p.checked_add(1) == Some(period) => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(period);
    }
    longest
}

fn workload_mismatches(
    entries: &[ScheduleEntry],
    targets: &HashMap<(ClassId, SubjectId), u32>,
    out: &mut Vec<Conflict>,
) {
    let allocated: HashMap<(ClassId, SubjectId), Vec<&ScheduleEntry>> = entries
        .iter()
        .map(|e| ((e.class_id, e.subject_id), e))
        .into_group_map();

    for (&(class_id, subject_id), &target) in targets.iter().sorted_by_key(|(k, _)| **k) {
        let placed = allocated
            .get(&(class_id, subject_id))
            .map(Vec::as_slice)
            .unwrap_or_default();
        if placed.len() as u32 != target {
            out.push(Conflict::WorkloadMismatch {
                class_id,
                subject_id,
                target,
                allocated: placed.len() as u32,
                entry_ids: placed.iter().map(|e| e.id).collect(),
            });
        }
    }
}

fn teacher_daily_overloads(entries: &[ScheduleEntry], out: &mut Vec<Conflict>) {
    for ((teacher_id, day), group) in grouped(entries, |e| (e.teacher_id, e.time_slot.day)) {
        if group.len() > MAX_TEACHER_DAILY_LESSONS {
            out.push(Conflict::TeacherDailyOverload {
                teacher_id,
                day,
                lessons: group.len(),
                entry_ids: group.iter().map(|e| e.id).collect(),
            });
        }
    }
}

fn unavailable_teachers(
    entries: &[ScheduleEntry],
    unavailable: &HashSet<(TeacherId, SlotKey)>,
    out: &mut Vec<Conflict>,
) {
    if unavailable.is_empty() {
        return;
    }
    for entry in entries {
        let slot = entry.slot_key();
        if unavailable.contains(&(entry.teacher_id, slot)) {
            out.push(Conflict::TeacherUnavailable {
                teacher_id: entry.teacher_id,
                slot,
                entry_id: entry.id,
            });
        }
    }
}
