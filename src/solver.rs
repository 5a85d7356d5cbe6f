use crate::data::{
    ClassId, ConflictReport, GenerationConfig, Schedule, ScheduleQuality, SchedulingInput,
    SchedulingOutput, Severity, TeacherAvailability,
};
use crate::demand::{Extraction, MAX_LESSON_UNITS, capability_map, extract_demand, summed_hours};
use crate::error::SolveError;
use crate::fitness::ValidationContext;
use crate::grid::TimeSlotGrid;
use crate::optimizer::{GeneticOptimizer, Progress};
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Builds a timetable with the genetic search, running to completion.
pub fn solve(input: &SchedulingInput) -> Result<SchedulingOutput, SolveError> {
    solve_with_controls(input, None, None)
}

/// Like [`solve`], but stoppable through `terminate` and reporting per-generation progress.
pub fn solve_with_controls(
    input: &SchedulingInput,
    terminate: Option<&AtomicBool>,
    progress: Option<&UnboundedSender<Progress>>,
) -> Result<SchedulingOutput, SolveError> {
    let start_time = Instant::now();
    validate_input(input)?;

    // lookups
    let class_names: HashMap<ClassId, String> = input
        .classes
        .iter()
        .map(|c| (c.id, c.name.clone()))
        .collect();
    let capabilities = capability_map(&input.capabilities);

    info!(
        "Setting up timetable search with {} classes, {} workload rows, {} teachers...",
        input.classes.len(),
        input.workload.len(),
        capabilities.len()
    );
    log_advisory_settings(&input.config);

    let grid = TimeSlotGrid::for_classes(
        &input.classes,
        input.config.pedagogical.max_daily_lessons_per_class,
    );
    validate_availability(&input.availability, &grid)?;

    let Extraction { demand, warnings } =
        extract_demand(&input.workload, &capabilities, &class_names, &grid);
    if demand.is_empty() {
        warn!("No lesson demand could be placed in the grid; the schedule will be empty.");
    }

    let ctx = ValidationContext::new(&demand, &input.availability, input.config.hard_constraints);
    let optimizer = GeneticOptimizer::new(&demand, &grid, &ctx, input.optimizer);
    let outcome = optimizer.run(terminate, progress);

    let schedule = outcome.best;
    let conflict_report = schedule
        .conflicts
        .iter()
        .map(|c| ConflictReport {
            conflict_type: c.kind().to_string(),
            severity: c.severity(),
            description: c.describe(&class_names),
            affected_entry_ids: c.affected_entry_ids(),
        })
        .collect();
    let quality = quality_of(&schedule);

    let duration = start_time.elapsed();
    info!(
        "Timetable built in {:.2?}: {} entries, fitness {}, {:?}",
        duration,
        schedule.entries.len(),
        schedule.fitness_score,
        quality
    );

    Ok(SchedulingOutput {
        schedule,
        conflict_report,
        warnings,
        quality,
        generations_run: outcome.generations_run,
        cancelled: outcome.cancelled,
        elapsed_ms: duration.as_millis() as u64,
    })
}

pub fn quality_of(schedule: &Schedule) -> ScheduleQuality {
    if schedule.entries.is_empty() {
        ScheduleQuality::Empty
    } else if schedule.count_by_severity(Severity::High) > 0 {
        ScheduleQuality::HardConflicts
    } else if !schedule.conflicts.is_empty() {
        ScheduleQuality::SoftConflictsOnly
    } else {
        ScheduleQuality::ConflictFree
    }
}

// rejects settings the optimizer would otherwise have to silently clamp
fn validate_input(input: &SchedulingInput) -> Result<(), SolveError> {
    let optimizer = &input.optimizer;
    if optimizer.population_size == 0 {
        return Err(SolveError::InvalidConfig(
            "populationSize must be at least 1".to_string(),
        ));
    }
    for (name, rate) in [
        ("mutationRate", optimizer.mutation_rate),
        ("elitismRate", optimizer.elitism_rate),
    ] {
        if !(0.0..=1.0).contains(&rate) {
            return Err(SolveError::InvalidConfig(format!(
                "{} must be between 0 and 1, got {}",
                name, rate
            )));
        }
    }
    if input.config.pedagogical.teacher_gaps > 100 {
        return Err(SolveError::InvalidConfig(format!(
            "teacherGaps must be between 0 and 100, got {}",
            input.config.pedagogical.teacher_gaps
        )));
    }

    if let Some(duplicate) = input.classes.iter().map(|c| c.id).duplicates().next() {
        return Err(SolveError::InvalidInput(format!(
            "duplicate class id {}",
            duplicate
        )));
    }

    let total_hours: u64 = summed_hours(&input.workload)
        .values()
        .map(|&hours| u64::from(hours))
        .sum();
    if total_hours > MAX_LESSON_UNITS {
        return Err(SolveError::InvalidInput(format!(
            "workload asks for {} weekly lessons, at most {} are supported",
            total_hours, MAX_LESSON_UNITS
        )));
    }
    Ok(())
}

fn validate_availability(
    availability: &[TeacherAvailability],
    grid: &TimeSlotGrid,
) -> Result<(), SolveError> {
    for entry in availability {
        if let Some(slot) = entry.unavailable_slots.iter().find(|s| !grid.contains(**s)) {
            return Err(SolveError::InvalidInput(format!(
                "teacher {} has an unavailable slot outside the grid (day {}, period {})",
                entry.teacher_id, slot.day, slot.period
            )));
        }
    }
    Ok(())
}

fn log_advisory_settings(config: &GenerationConfig) {
    debug!(
        "Advisory preferences (not scored): teacherGaps={}, groupDoubleLessons={}",
        config.pedagogical.teacher_gaps, config.pedagogical.group_double_lessons
    );
    for (name, enabled) in &config.advanced {
        debug!("Advisory option {}={} is accepted but not scored", name, enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        ClassInfo, OptimizerConfig, SlotKey, TeacherAvailability, TeacherCapability,
        UnscheduledReason, WorkloadRecord,
    };

    fn sample_input() -> SchedulingInput {
        SchedulingInput {
            classes: vec![
                ClassInfo {
                    id: 1,
                    name: "5A".to_string(),
                    daily_lessons: 5,
                    bell_schedule: None,
                },
                ClassInfo {
                    id: 2,
                    name: "5B".to_string(),
                    daily_lessons: 4,
                    bell_schedule: None,
                },
            ],
            workload: vec![
                WorkloadRecord { teacher_id: 1, subject_id: 10, class_id: 1, hours: 4 },
                WorkloadRecord { teacher_id: 1, subject_id: 10, class_id: 2, hours: 3 },
                WorkloadRecord { teacher_id: 2, subject_id: 11, class_id: 1, hours: 2 },
                WorkloadRecord { teacher_id: 3, subject_id: 12, class_id: 2, hours: 2 },
            ],
            capabilities: vec![
                TeacherCapability { teacher_id: 1, subject_ids: vec![10] },
                TeacherCapability { teacher_id: 2, subject_ids: vec![10, 11] },
            ],
            availability: Vec::new(),
            config: GenerationConfig::default(),
            optimizer: OptimizerConfig {
                population_size: 20,
                generations: 20,
                seed: Some(17),
                ..OptimizerConfig::default()
            },
        }
    }

    #[test]
    fn test_solve_schedules_demand_and_reports_gaps() {
        let output = solve(&sample_input()).unwrap();

        // subject 12 has no qualified teacher
        assert_eq!(output.schedule.entries.len(), 9);
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.warnings[0].subject_id, 12);
        assert_eq!(output.warnings[0].class_name, "5B");
        assert_eq!(output.warnings[0].reason, UnscheduledReason::NoCapableTeacher);
        assert_eq!(output.generations_run, 20);
        assert!(!output.cancelled);
        assert_eq!(output.conflict_report.len(), output.schedule.conflicts.len());
        assert_ne!(output.quality, ScheduleQuality::Empty);
    }

    #[test]
    fn test_empty_workload_is_flagged_empty() {
        let mut input = sample_input();
        input.workload.clear();
        let output = solve(&input).unwrap();
        assert!(output.schedule.entries.is_empty());
        assert_eq!(output.schedule.fitness_score, 1000);
        assert_eq!(output.quality, ScheduleQuality::Empty);
    }

    #[test]
    fn test_zero_classes_degrades_instead_of_failing() {
        let mut input = sample_input();
        input.classes.clear();
        let output = solve(&input).unwrap();
        assert_eq!(output.schedule.entries.len(), 9);
        assert!(output.warnings[0].class_name.starts_with("Class"));
    }

    #[test]
    fn test_unknown_class_is_scheduled_under_fallback_name() {
        let mut input = sample_input();
        input.workload.push(WorkloadRecord { teacher_id: 1, subject_id: 10, class_id: 99, hours: 2 });
        input.workload.push(WorkloadRecord { teacher_id: 1, subject_id: 12, class_id: 99, hours: 1 });
        let output = solve(&input).unwrap();

        let placed = output.schedule.entries.iter().filter(|e| e.class_id == 99).count();
        assert_eq!(placed, 2);
        let warning = output.warnings.iter().find(|w| w.class_id == 99).unwrap();
        assert_eq!(warning.class_name, "Class 99");
    }

    #[test]
    fn test_rejects_oversized_workload() {
        let mut input = sample_input();
        input.workload.push(WorkloadRecord { teacher_id: 1, subject_id: 10, class_id: 1, hours: 3_000_000_000 });
        input.workload.push(WorkloadRecord { teacher_id: 2, subject_id: 10, class_id: 1, hours: 3_000_000_000 });
        assert!(matches!(solve(&input), Err(SolveError::InvalidInput(_))));

        let mut input = sample_input();
        input.workload = vec![WorkloadRecord { teacher_id: 1, subject_id: 10, class_id: 1, hours: 4_000_000_000 }];
        assert!(matches!(solve(&input), Err(SolveError::InvalidInput(_))));

        let mut input = sample_input();
        input.workload = vec![WorkloadRecord {
            teacher_id: 1,
            subject_id: 10,
            class_id: 1,
            hours: MAX_LESSON_UNITS as u32 + 1,
        }];
        assert!(matches!(solve(&input), Err(SolveError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_bad_rates() {
        let mut input = sample_input();
        input.optimizer.mutation_rate = 1.5;
        assert!(matches!(solve(&input), Err(SolveError::InvalidConfig(_))));

        let mut input = sample_input();
        input.optimizer.population_size = 0;
        assert!(matches!(solve(&input), Err(SolveError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_malformed_input() {
        let mut input = sample_input();
        input.classes.push(input.classes[0].clone());
        assert!(matches!(solve(&input), Err(SolveError::InvalidInput(_))));

        let mut input = sample_input();
        input.availability.push(TeacherAvailability {
            teacher_id: 1,
            unavailable_slots: vec![SlotKey { day: 5, period: 1 }],
        });
        assert!(matches!(solve(&input), Err(SolveError::InvalidInput(_))));

        // the widest class has five periods
        let mut input = sample_input();
        input.availability.push(TeacherAvailability {
            teacher_id: 1,
            unavailable_slots: vec![SlotKey { day: 0, period: 5 }, SlotKey { day: 2, period: 6 }],
        });
        assert!(matches!(solve(&input), Err(SolveError::InvalidInput(_))));
        input.availability[0].unavailable_slots.pop();
        assert!(solve(&input).is_ok());
    }

    #[test]
    fn test_quality_levels() {
        let output = solve(&sample_input()).unwrap();
        let mut schedule = output.schedule;
        schedule.conflicts.clear();
        assert_eq!(quality_of(&schedule), ScheduleQuality::ConflictFree);
        schedule.conflicts.push(crate::data::Conflict::TeacherDailyOverload {
            teacher_id: 1,
            day: 0,
            lessons: 5,
            entry_ids: vec![],
        });
        assert_eq!(quality_of(&schedule), ScheduleQuality::SoftConflictsOnly);
        schedule.conflicts.push(crate::data::Conflict::TeacherUnavailable {
            teacher_id: 1,
            slot: SlotKey { day: 0, period: 1 },
            entry_id: 0,
        });
        assert_eq!(quality_of(&schedule), ScheduleQuality::HardConflicts);
    }

    #[test]
    fn test_output_serializes_to_camel_case() {
        let output = solve(&sample_input()).unwrap();
        let value = serde_json::to_value(&output).unwrap();
        assert!(value["schedule"]["fitnessScore"].is_number());
        assert!(value["schedule"]["entries"][0]["timeSlot"]["startTime"].is_string());
        assert_eq!(value["warnings"][0]["reason"], "no_capable_teacher");
        assert!(value["conflictReport"].is_array());
    }
}
