//! Background solve jobs.
//!
//! Each job runs on tokio's blocking pool, streams [`Progress`] back over an
//! unbounded channel and can be stopped through its terminate flag. Readers
//! always get cloned snapshots, never a reference into a running job.
//!
//! At most `max_running` jobs solve at once; the rest wait for a permit in the
//! `solving` state. Finished jobs are dropped once they are older than the
//! retention period, or oldest first when more than `max_retained` pile up.

use crate::config::ServerConfig;
use crate::data::{SchedulingInput, SchedulingOutput};
use crate::optimizer::Progress;
use crate::solver::solve_with_controls;
use itertools::Itertools;
use log::{debug, error, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Solving,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: Option<Progress>,
    pub result: Option<SchedulingOutput>,
    pub error: Option<String>,
}

struct JobState {
    status: JobStatus,
    progress: Option<Progress>,
    result: Option<SchedulingOutput>,
    error: Option<String>,
    terminate: Arc<AtomicBool>,
    finished_at: Option<Instant>,
}

#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, JobState>>>,
    running: Arc<Semaphore>,
    retention: Duration,
    max_retained: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl JobRegistry {
    pub fn new(max_running: usize, retention: Duration, max_retained: usize) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(Semaphore::new(max_running.max(1))),
            retention,
            max_retained,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.max_concurrent_solves,
            config.job_retention,
            config.max_retained_jobs,
        )
    }

    /// Starts solving `input` in the background and returns the job id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, input: SchedulingInput) -> Uuid {
        self.evict_finished();

        let job_id = Uuid::new_v4();
        let terminate = Arc::new(AtomicBool::new(false));
        self.jobs.lock().insert(
            job_id,
            JobState {
                status: JobStatus::Solving,
                progress: None,
                result: None,
                error: None,
                terminate: Arc::clone(&terminate),
                finished_at: None,
            },
        );
        info!("Started timetable job {}", job_id);

        let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
        let registry = self.clone();
        tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                registry.update(job_id, |job| job.progress = Some(progress));
            }
        });

        let registry = self.clone();
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let _permit = match running.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Timetable job {} could not be scheduled: {}", job_id, e);
                    registry.fail(job_id, format!("job queue closed: {}", e));
                    return;
                }
            };
            let handle = tokio::task::spawn_blocking(move || {
                solve_with_controls(&input, Some(terminate.as_ref()), Some(&tx))
            });
            match handle.await {
                Ok(Ok(output)) => {
                    let status = if output.cancelled {
                        JobStatus::Cancelled
                    } else {
                        JobStatus::Completed
                    };
                    info!("Timetable job {} finished: {:?}", job_id, status);
                    registry.update(job_id, |job| {
                        job.status = status;
                        job.result = Some(output);
                        job.finished_at = Some(Instant::now());
                    });
                }
                Ok(Err(e)) => {
                    error!("Timetable job {} rejected: {}", job_id, e);
                    registry.fail(job_id, e.to_string());
                }
                Err(e) => {
                    error!("Timetable job {} crashed: {}", job_id, e);
                    registry.fail(job_id, format!("solver task failed: {}", e));
                }
            }
        });

        job_id
    }

    pub fn snapshot(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.jobs.lock().get(&job_id).map(|job| JobSnapshot {
            job_id,
            status: job.status,
            progress: job.progress,
            result: job.result.clone(),
            error: job.error.clone(),
        })
    }

    /// Asks a job to stop after its current generation. Returns false for unknown ids.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.jobs.lock().get(&job_id) {
            Some(job) => {
                job.terminate.store(true, Ordering::Relaxed);
                info!("Cancellation requested for timetable job {}", job_id);
                true
            }
            None => false,
        }
    }

    fn update<F: FnOnce(&mut JobState)>(&self, job_id: Uuid, apply: F) {
        if let Some(job) = self.jobs.lock().get_mut(&job_id) {
            apply(job);
        }
    }

    fn fail(&self, job_id: Uuid, message: String) {
        self.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(message);
            job.finished_at = Some(Instant::now());
        });
    }

    // running jobs are never evicted
    fn evict_finished(&self) {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| {
            job.finished_at
                .is_none_or(|at| at.elapsed() < self.retention)
        });

        let finished = jobs
            .iter()
            .filter_map(|(id, job)| job.finished_at.map(|at| (at, *id)))
            .sorted_unstable()
            .collect::<Vec<_>>();
        let excess = finished.len().saturating_sub(self.max_retained);
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }

        if jobs.len() < before {
            debug!("Evicted {} finished timetable jobs", before - jobs.len());
        }
    }
}
