use crate::data::{Schedule, ScheduleEntry, TeacherId, TimeSlot};
use crate::demand::DemandSet;
use crate::fitness::{ValidationContext, scored_schedule};
use crate::grid::TimeSlotGrid;
use log::trace;
use rand::Rng;
use rand::prelude::IndexedRandom;
use rayon::prelude::*;

/// Builds random, structurally complete schedules.
///
/// Placement is deliberately loose: teachers and slots are drawn uniformly with
/// no collision avoidance, and the validator plus selection pressure sort out
/// the clashes afterwards.
pub struct CandidateGenerator<'a> {
    demand: &'a DemandSet,
    grid: &'a TimeSlotGrid,
    // candidate teachers per demand, indexable for uniform picks
    teachers: Vec<Vec<TeacherId>>,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(demand: &'a DemandSet, grid: &'a TimeSlotGrid) -> Self {
        let teachers = demand
            .demands()
            .iter()
            .map(|d| d.candidate_teacher_ids.iter().copied().collect())
            .collect();
        Self {
            demand,
            grid,
            teachers,
        }
    }

    /// One entry per demand unit, in unit order.
    ///
    /// Units whose demand has no teacher, or a grid without slots, are skipped;
    /// the demand extractor never lets either reach this point.
    pub fn random_entries<R: Rng>(&self, rng: &mut R) -> Vec<ScheduleEntry> {
        self.demand
            .units()
            .iter()
            .filter_map(|unit| {
                let demand = self.demand.demand_of(unit);
                let teacher_id = *self.teachers[unit.demand].choose(rng)?;
                let time_slot = *self.grid.slots().choose(rng)?;
                Some(ScheduleEntry {
                    id: unit.id.0,
                    demand_unit: unit.id,
                    class_id: demand.class_id,
                    subject_id: demand.subject_id,
                    teacher_id,
                    time_slot,
                })
            })
            .collect()
    }

    pub fn random_slot<R: Rng>(&self, rng: &mut R) -> Option<TimeSlot> {
        self.grid.slots().choose(rng).copied()
    }

    /// Builds `size` independent candidates and scores them in parallel.
    pub fn population<R: Rng>(
        &self,
        size: usize,
        ctx: &ValidationContext,
        rng: &mut R,
    ) -> Vec<Schedule> {
        let raw: Vec<Vec<ScheduleEntry>> = (0..size).map(|_| self.random_entries(rng)).collect();
        trace!(
            "Generated {} candidates with {} entries each",
            size,
            self.demand.units().len()
        );
        raw.into_par_iter()
            .map(|entries| scored_schedule(entries, ctx))
            .collect()
    }
}
