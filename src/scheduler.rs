//! Daily routine scheduler
//!
//! The scheduler owns its jobs and never looks at the clock itself: the host
//! loop passes `now` to [`Scheduler::tick`], which makes it deterministic to
//! drive from tests.

use crate::audit::AuditLog;
use crate::error::LedgerError;
use crate::routine::{Routine, RoutineReport};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use tracing::{error, info};

/// Parse a daily trigger time such as `"07:00"`.
pub fn parse_trigger_time(value: &str) -> Result<NaiveTime, LedgerError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| LedgerError::InvalidSchedule(format!("{:?} is not an HH:MM time: {}", value, e)))
}

/// First moment at `at` that is strictly later than `after`.
fn next_occurrence(at: NaiveTime, after: NaiveDateTime) -> NaiveDateTime {
    let today = after.date().and_time(at);
    if today > after {
        today
    } else {
        today + Duration::days(1)
    }
}

struct Job {
    at: NaiveTime,
    next_run: NaiveDateTime,
    routine: Routine,
}

/// Result of one job firing during a tick.
#[derive(Debug)]
pub struct JobRun {
    pub routine: String,
    pub scheduled_for: NaiveDateTime,
    pub result: Result<RoutineReport, LedgerError>,
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `routine` every day at `at`, starting with the first occurrence
    /// after `now`.
    pub fn every_day_at(&mut self, at: NaiveTime, now: NaiveDateTime, routine: Routine) {
        let next_run = next_occurrence(at, now);
        info!(routine = routine.name(), next_run = %next_run, "scheduled routine");
        self.jobs.push(Job { at, next_run, routine });
    }

    /// Fire every job that is due at `now`, once each, and reschedule it for
    /// its next daily slot. Missed days are not replayed.
    pub fn tick(&mut self, now: NaiveDateTime, log: &AuditLog) -> Vec<JobRun> {
        let mut runs = Vec::new();
        for job in self.jobs.iter_mut().filter(|job| job.next_run <= now) {
            let scheduled_for = job.next_run;
            info!(routine = job.routine.name(), scheduled_for = %scheduled_for, "running scheduled routine");
            let result = job.routine.run(log);
            if let Err(e) = &result {
                error!(routine = job.routine.name(), "scheduled routine failed: {}", e);
            }
            job.next_run = next_occurrence(job.at, now);
            runs.push(JobRun {
                routine: job.routine.name().to_string(),
                scheduled_for,
                result,
            });
        }
        runs
    }

    pub fn next_run(&self) -> Option<NaiveDateTime> {
        self.jobs.iter().map(|job| job.next_run).min()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
