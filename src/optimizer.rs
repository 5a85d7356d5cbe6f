//! Generational genetic search over timetables.
//!
//! # Loop
//!
//! 1. Build `population_size` random candidates and score them.
//! 2. Each generation: sort by fitness, carry the elite slice over unchanged,
//!    then fill the rest with children bred only from elites (keyed crossover
//!    at the midpoint, per-entry slot mutation), each child re-scored in full.
//! 3. Stop after a fixed number of generations or when the terminate flag is
//!    raised, and return the best individual.
//!
//! Children are scored on the rayon pool. Progress is streamed over an
//! optional unbounded channel after every generation.

use crate::candidate::CandidateGenerator;
use crate::data::{DemandUnitId, OptimizerConfig, Schedule, ScheduleEntry, Severity};
use crate::demand::DemandSet;
use crate::fitness::{ValidationContext, scored_schedule};
use crate::grid::TimeSlotGrid;
use log::{debug, info};
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Snapshot sent after every completed generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub generation: usize,
    pub generations: usize,
    pub best_fitness: u32,
    pub high_conflicts: usize,
}

#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub best: Schedule,
    pub generations_run: usize,
    pub cancelled: bool,
}

pub struct GeneticOptimizer<'a> {
    config: OptimizerConfig,
    demand: &'a DemandSet,
    ctx: &'a ValidationContext,
    generator: CandidateGenerator<'a>,
}

impl<'a> GeneticOptimizer<'a> {
    /// Out-of-range settings are clamped; the optimizer itself never fails.
    pub fn new(
        demand: &'a DemandSet,
        grid: &'a TimeSlotGrid,
        ctx: &'a ValidationContext,
        config: OptimizerConfig,
    ) -> Self {
        let defaults = OptimizerConfig::default();
        let rate = |value: f64, fallback: f64| {
            if value.is_nan() {
                fallback
            } else {
                value.clamp(0.0, 1.0)
            }
        };
        let config = OptimizerConfig {
            population_size: config.population_size.max(1),
            mutation_rate: rate(config.mutation_rate, defaults.mutation_rate),
            elitism_rate: rate(config.elitism_rate, defaults.elitism_rate),
            ..config
        };
        Self {
            config,
            demand,
            ctx,
            generator: CandidateGenerator::new(demand, grid),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// `floor(population × elitism)`, but never fewer than one parent to breed from.
    pub fn elite_count(&self) -> usize {
        let elites = (self.config.population_size as f64 * self.config.elitism_rate).floor() as usize;
        elites.clamp(1, self.config.population_size)
    }

    pub fn initial_population<R: Rng>(&self, rng: &mut R) -> Vec<Schedule> {
        self.generator
            .population(self.config.population_size, self.ctx, rng)
    }

    /// Runs one generational step and returns the replacement population.
    pub fn next_generation<R: Rng>(&self, mut population: Vec<Schedule>, rng: &mut R) -> Vec<Schedule> {
        population.sort_by(|a, b| b.fitness_score.cmp(&a.fitness_score));
        population.truncate(self.elite_count());
        let elites = population;

        let wanted = self.config.population_size.saturating_sub(elites.len());
        let offspring: Vec<Vec<ScheduleEntry>> = (0..wanted)
            .filter_map(|_| {
                let first = elites.choose(rng)?;
                let second = elites.choose(rng)?;
                let child = self.crossover(first, second);
                Some(self.mutate(child, rng))
            })
            .collect();

        let children: Vec<Schedule> = offspring
            .into_par_iter()
            .map(|entries| scored_schedule(entries, self.ctx))
            .collect();

        let mut next = elites;
        next.extend(children);
        next
    }

    /// Keyed single-point crossover: units below the midpoint come from `first`,
    /// the rest from `second`. Entries are looked up by demand unit, so the
    /// parents' storage order does not matter.
    pub fn crossover(&self, first: &Schedule, second: &Schedule) -> Vec<ScheduleEntry> {
        let by_unit = |schedule: &Schedule| -> HashMap<DemandUnitId, ScheduleEntry> {
            schedule
                .entries
                .iter()
                .map(|e| (e.demand_unit, e.clone()))
                .collect()
        };
        let mut first = by_unit(first);
        let mut second = by_unit(second);
        let mid = self.demand.units().len() / 2;

        self.demand
            .units()
            .iter()
            .filter_map(|unit| {
                let (primary, fallback) = if (unit.id.0 as usize) < mid {
                    (&mut first, &mut second)
                } else {
                    (&mut second, &mut first)
                };
                primary
                    .remove(&unit.id)
                    .or_else(|| fallback.remove(&unit.id))
            })
            .collect()
    }

    /// Moves each entry to a random slot with probability `mutation_rate`.
    /// The teacher is never touched.
    pub fn mutate<R: Rng>(&self, entries: Vec<ScheduleEntry>, rng: &mut R) -> Vec<ScheduleEntry> {
        entries
            .into_iter()
            .map(|entry| {
                if rng.random_bool(self.config.mutation_rate) {
                    if let Some(slot) = self.generator.random_slot(rng) {
                        return entry.with_slot(slot);
                    }
                }
                entry
            })
            .collect()
    }

    /// Runs the whole search and returns the best schedule found.
    ///
    /// Raising `terminate` stops the loop between generations; the best
    /// individual so far is still returned.
    pub fn run(
        &self,
        terminate: Option<&AtomicBool>,
        progress: Option<&UnboundedSender<Progress>>,
    ) -> OptimizationOutcome {
        let start = Instant::now();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let generations = self.config.generations;

        info!(
            "Starting genetic search: {} lesson units, population {}, {} generations, {} elites",
            self.demand.units().len(),
            self.config.population_size,
            generations,
            self.elite_count()
        );

        let mut population = self.initial_population(&mut rng);
        if self.demand.is_empty() {
            info!("Nothing to schedule; skipping evolution.");
            return self.finish(population, 0, false, start);
        }

        let mut generations_run = 0;
        let mut cancelled = false;
        for generation in 1..=generations {
            if terminate.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                info!("Termination requested after {} generations.", generations_run);
                cancelled = true;
                break;
            }

            population = self.next_generation(population, &mut rng);
            generations_run = generation;

            if let Some(best) = select_best(&population) {
                let snapshot = Progress {
                    generation,
                    generations,
                    best_fitness: best.fitness_score,
                    high_conflicts: best.count_by_severity(Severity::High),
                };
                debug!(
                    "Generation {}/{}: best fitness {} ({} hard conflicts)",
                    generation, generations, snapshot.best_fitness, snapshot.high_conflicts
                );
                if let Some(tx) = progress {
                    // a dropped receiver only means nobody is watching
                    let _ = tx.send(snapshot);
                }
            }
        }

        self.finish(population, generations_run, cancelled, start)
    }

    fn finish(
        &self,
        population: Vec<Schedule>,
        generations_run: usize,
        cancelled: bool,
        start: Instant,
    ) -> OptimizationOutcome {
        let best = match select_best(&population) {
            Some(best) => best.clone(),
            None => scored_schedule(Vec::new(), self.ctx),
        };
        info!(
            "Genetic search finished in {:.2?}: fitness {}, {} conflicts",
            start.elapsed(),
            best.fitness_score,
            best.conflicts.len()
        );
        OptimizationOutcome {
            best,
            generations_run,
            cancelled,
        }
    }
}

/// Highest fitness wins; on ties the earliest individual is kept.
pub fn select_best(population: &[Schedule]) -> Option<&Schedule> {
    population
        .iter()
        .reduce(|best, s| if s.fitness_score > best.fitness_score { s } else { best })
}
