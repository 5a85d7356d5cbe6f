use crate::data::{BellItem, BellSchedule, ClassInfo, Period, SlotKey, TimeSlot, WORKING_DAYS};
use chrono::{NaiveTime, TimeDelta};
use log::debug;

const DEFAULT_START_HOUR: u32 = 8;
const LESSON_MINUTES: i64 = 45;
const CHANGEOVER_MINUTES: i64 = 5;

/// The weekly grid of lesson slots, ordered day-major then period-minor.
#[derive(Debug, Clone)]
pub struct TimeSlotGrid {
    slots: Vec<TimeSlot>,
    periods_per_day: Period,
}

impl TimeSlotGrid {
    /// Builds a grid with default timing: 08:00 start, 45 minute lessons, 5 minute changeover.
    pub fn new(periods_per_day: Period) -> Self {
        Self::build(periods_per_day, None)
    }

    pub fn with_bell_schedule(periods_per_day: Period, bell: &BellSchedule) -> Self {
        Self::build(periods_per_day, Some(bell))
    }

    /// Sizes the grid to the class with the most daily lessons.
    ///
    /// A bell schedule counts as that class's lesson count, and the longest bell
    /// schedule times the grid. Falls back to `fallback_periods` when no class
    /// gives a count.
    pub fn for_classes(classes: &[ClassInfo], fallback_periods: u32) -> Self {
        let lessons_of = |class: &ClassInfo| {
            let bell = class
                .bell_schedule
                .as_ref()
                .map(|b| b.lesson_count() as u32)
                .unwrap_or(0);
            class.daily_lessons.max(bell)
        };

        let widest = classes.iter().map(lessons_of).max().unwrap_or(0);
        let periods = if widest == 0 { fallback_periods } else { widest };
        let periods = periods.min(Period::MAX as u32) as Period;

        let bell = classes
            .iter()
            .filter_map(|c| c.bell_schedule.as_ref())
            .max_by_key(|b| b.lesson_count());

        debug!(
            "Building {}x{} slot grid ({})",
            WORKING_DAYS,
            periods,
            if bell.is_some() { "bell schedule" } else { "default timing" }
        );
        Self::build(periods, bell)
    }

    fn build(periods_per_day: Period, bell: Option<&BellSchedule>) -> Self {
        let times = period_times(periods_per_day, bell);
        let slots = (0..WORKING_DAYS)
            .flat_map(|day| {
                times
                    .iter()
                    .enumerate()
                    .map(move |(i, &(start_time, end_time))| TimeSlot {
                        day,
                        period: (i + 1) as Period,
                        start_time,
                        end_time,
                    })
            })
            .collect();
        Self {
            slots,
            periods_per_day,
        }
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn periods_per_day(&self) -> Period {
        self.periods_per_day
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        key.day < WORKING_DAYS && key.period >= 1 && key.period <= self.periods_per_day
    }
}

// start/end time per period, walking the bell schedule first when there is one
fn period_times(periods: Period, bell: Option<&BellSchedule>) -> Vec<(NaiveTime, NaiveTime)> {
    let periods = periods as usize;
    let mut times = Vec::with_capacity(periods);
    let mut clock = bell
        .map(|b| b.start_time)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(DEFAULT_START_HOUR, 0, 0).unwrap_or_default());
    let mut after_lesson = false;

    for item in bell.map(|b| b.items.as_slice()).unwrap_or_default() {
        if times.len() == periods {
            break;
        }
        match *item {
            BellItem::Lesson { minutes } => {
                let end = clock + TimeDelta::minutes(minutes as i64);
                times.push((clock, end));
                clock = end;
                after_lesson = true;
            }
            BellItem::Break { minutes } => {
                clock += TimeDelta::minutes(minutes as i64);
                after_lesson = false;
            }
        }
    }

    while times.len() < periods {
        if after_lesson {
            clock += TimeDelta::minutes(CHANGEOVER_MINUTES);
        }
        let end = clock + TimeDelta::minutes(LESSON_MINUTES);
        times.push((clock, end));
        clock = end;
        after_lesson = true;
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn class(id: u32, daily_lessons: u32) -> ClassInfo {
        ClassInfo {
            id,
            name: format!("Class {}", id),
            daily_lessons,
            bell_schedule: None,
        }
    }

    #[test]
    fn test_grid_is_day_major_and_unique() {
        let grid = TimeSlotGrid::new(3);
        assert_eq!(grid.len(), 15);
        let keys: Vec<(u8, u8)> = grid.slots().iter().map(|s| (s.day, s.period)).collect();
        assert_eq!(&keys[..4], &[(0, 1), (0, 2), (0, 3), (1, 1)]);
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, keys);
    }

    #[test]
    fn test_default_timing() {
        let grid = TimeSlotGrid::new(2);
        let first = grid.slots()[0];
        let second = grid.slots()[1];
        assert_eq!((first.start_time, first.end_time), (hm(8, 0), hm(8, 45)));
        assert_eq!((second.start_time, second.end_time), (hm(8, 50), hm(9, 35)));
    }

    #[test]
    fn test_sized_to_widest_class() {
        let grid = TimeSlotGrid::for_classes(&[class(1, 5), class(2, 7), class(3, 6)], 8);
        assert_eq!(grid.periods_per_day(), 7);
        assert_eq!(grid.len(), 35);
    }

    #[test]
    fn test_fallback_without_class_counts() {
        assert_eq!(TimeSlotGrid::for_classes(&[], 6).periods_per_day(), 6);
        assert_eq!(TimeSlotGrid::for_classes(&[class(1, 0)], 4).periods_per_day(), 4);
    }

    #[test]
    fn test_bell_schedule_timing() {
        let bell = BellSchedule {
            start_time: hm(7, 30),
            items: vec![
                BellItem::Lesson { minutes: 45 },
                BellItem::Break { minutes: 20 },
                BellItem::Lesson { minutes: 40 },
            ],
        };
        let grid = TimeSlotGrid::with_bell_schedule(3, &bell);
        let monday: Vec<_> = grid.slots().iter().take(3).collect();
        assert_eq!((monday[0].start_time, monday[0].end_time), (hm(7, 30), hm(8, 15)));
        assert_eq!((monday[1].start_time, monday[1].end_time), (hm(8, 35), hm(9, 15)));
        // past the bell schedule, default increments take over
        assert_eq!((monday[2].start_time, monday[2].end_time), (hm(9, 20), hm(10, 5)));
    }

    #[test]
    fn test_bell_schedule_counts_as_daily_lessons() {
        let mut with_bell = class(1, 2);
        with_bell.bell_schedule = Some(BellSchedule {
            start_time: hm(9, 0),
            items: vec![BellItem::Lesson { minutes: 45 }; 4],
        });
        let grid = TimeSlotGrid::for_classes(&[with_bell, class(2, 3)], 8);
        assert_eq!(grid.periods_per_day(), 4);
        assert_eq!(grid.slots()[0].start_time, hm(9, 0));
        assert_eq!(grid.slots()[1].start_time, hm(9, 45));
    }

    #[test]
    fn test_contains() {
        let grid = TimeSlotGrid::new(4);
        assert!(grid.contains(SlotKey { day: 4, period: 4 }));
        assert!(!grid.contains(SlotKey { day: 5, period: 1 }));
        assert!(!grid.contains(SlotKey { day: 0, period: 0 }));
        assert!(!grid.contains(SlotKey { day: 0, period: 5 }));
    }
}
