//! Weekly school timetable synthesis.
//!
//! Lesson demand (class × subject × weekly hours) is spread over a five-day
//! slot grid by a generational genetic search. A constraint validator doubles
//! as the fitness function; the best candidate comes back together with its
//! conflicts and any requirement that could not be scheduled at all.
//!
//! - **`grid`**: the weekly (day, period) grid
//! - **`demand`**: workload rows to lesson demands and demand units
//! - **`candidate`**: random initial schedules
//! - **`fitness`**: conflict detection and scoring
//! - **`optimizer`**: the genetic search and result selection
//! - **`solver`**: input checks and the end-to-end pipeline
//! - **`jobs`** / **`server`**: background jobs and the HTTP API

pub mod candidate;
pub mod config;
pub mod data;
pub mod demand;
pub mod error;
pub mod fitness;
pub mod grid;
pub mod jobs;
pub mod optimizer;
pub mod server;
pub mod solver;
